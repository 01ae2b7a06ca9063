//! CLI Exit Code Registry
//!
//! Single source of truth for `polecheck` exit codes. Scripts and CI jobs
//! branch on these values, so treat them as a stable contract.
//!
//! | Code | Meaning                                                  |
//! |------|----------------------------------------------------------|
//! | 0    | Success                                                  |
//! | 2    | Usage error (bad arguments)                              |
//! | 3    | Cannot read the input or write a report                  |
//! | 4    | Invalid configuration                                    |
//! | 5    | Priority conflicts found and `--fail-on-priority` is set |
//!
//! # Adding New Exit Codes
//!
//! 1. Add the constant
//! 2. Document what triggers it
//! 3. Update the table above and `ALL_CODES`

/// Success - command completed without errors.
pub const EXIT_SUCCESS: u8 = 0;

/// Usage error - bad arguments, missing required options.
/// Also what clap returns on parse failure.
pub const EXIT_USAGE: u8 = 2;

/// The input could not be opened or read, or a report file could not be
/// written.
pub const EXIT_IO: u8 = 3;

/// The config file failed to parse or validate.
pub const EXIT_INVALID_CONFIG: u8 = 4;

/// At least one CRITICAL or HIGH conflict was found and the caller asked
/// for a failing exit (`--fail-on-priority`). Reports are still written.
pub const EXIT_PRIORITY_FOUND: u8 = 5;

#[cfg(test)]
pub const ALL_CODES: &[(u8, &str)] = &[
    (EXIT_SUCCESS, "EXIT_SUCCESS"),
    (EXIT_USAGE, "EXIT_USAGE"),
    (EXIT_IO, "EXIT_IO"),
    (EXIT_INVALID_CONFIG, "EXIT_INVALID_CONFIG"),
    (EXIT_PRIORITY_FOUND, "EXIT_PRIORITY_FOUND"),
];
