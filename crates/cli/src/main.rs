// polecheck CLI - pole-permission conflict analysis over exported records

mod analyze;
mod exit_codes;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use polecheck::config::{AnalysisConfig, Delimiter};
use polecheck::PolecheckError;

use exit_codes::{EXIT_INVALID_CONFIG, EXIT_IO, EXIT_SUCCESS, EXIT_USAGE};

#[derive(Parser)]
#[command(name = "polecheck")]
#[command(about = "Detect location, payment and bulk-entry conflicts in pole-permission exports")]
#[command(version)]
struct Cli {
    /// Log progress at info level (RUST_LOG takes precedence)
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Classify every pole in an export and write the report set
    #[command(after_help = "\
Examples:
  polecheck analyze permissions.csv
  polecheck analyze export.csv --out-dir reports/2025-05 --config polecheck.toml
  polecheck analyze export.csv --delimiter semicolon --json --quiet
  cat export.csv | polecheck analyze - --fail-on-priority")]
    Analyze {
        /// Input file (CSV/TSV export), or - for stdin
        input: PathBuf,

        /// TOML config file (defaults apply when omitted)
        #[arg(long, short = 'c')]
        config: Option<PathBuf>,

        /// Directory the reports are written to (created if missing)
        #[arg(long, short = 'o', default_value = "reports")]
        out_dir: PathBuf,

        /// Field delimiter: auto, comma, semicolon or tab (overrides the config)
        #[arg(long, short = 'd')]
        delimiter: Option<Delimiter>,

        /// Print the full analysis as JSON to stdout
        #[arg(long)]
        json: bool,

        /// Suppress the human summary on stderr
        #[arg(long, short = 'q')]
        quiet: bool,

        /// Exit with code 5 when CRITICAL or HIGH conflicts are found
        #[arg(long)]
        fail_on_priority: bool,
    },

    /// Inspect or generate analysis config files
    #[command(subcommand)]
    Config(ConfigCommands),
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Parse and validate a config file without running
    #[command(after_help = "\
Examples:
  polecheck config validate polecheck.toml")]
    Validate {
        /// Path to the TOML config file
        file: PathBuf,
    },

    /// Print the default config as TOML
    #[command(after_help = "\
Examples:
  polecheck config default > polecheck.toml")]
    Default,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = if cli.verbose {
        tracing::Level::INFO
    } else {
        tracing::Level::WARN
    };

    // stderr only: stdout carries --json output.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let result = match cli.command {
        Commands::Analyze {
            input,
            config,
            out_dir,
            delimiter,
            json,
            quiet,
            fail_on_priority,
        } => analyze::cmd_analyze(analyze::AnalyzeArgs {
            input,
            config,
            out_dir,
            delimiter,
            json,
            quiet,
            fail_on_priority,
        }),
        Commands::Config(ConfigCommands::Validate { file }) => cmd_config_validate(file),
        Commands::Config(ConfigCommands::Default) => cmd_config_default(),
    };

    match result {
        Ok(()) => ExitCode::from(EXIT_SUCCESS),
        Err(CliError { code, message, hint }) => {
            if !message.is_empty() {
                eprintln!("error: {}", message);
            }
            if let Some(hint) = hint {
                eprintln!("hint:  {}", hint);
            }
            ExitCode::from(code)
        }
    }
}

#[derive(Debug)]
pub struct CliError {
    pub code: u8,
    pub message: String,
    pub hint: Option<String>,
}

impl CliError {
    pub fn usage(msg: impl Into<String>) -> Self {
        Self { code: EXIT_USAGE, message: msg.into(), hint: None }
    }

    pub fn io(msg: impl Into<String>) -> Self {
        Self { code: EXIT_IO, message: msg.into(), hint: None }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self { code: EXIT_INVALID_CONFIG, message: msg.into(), hint: None }
    }

    /// Add a hint to an existing error.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

impl From<PolecheckError> for CliError {
    fn from(err: PolecheckError) -> Self {
        match err {
            PolecheckError::ConfigParse(_) | PolecheckError::ConfigValidation(_) => {
                CliError::config(err.to_string())
                    .with_hint("run `polecheck config default` for a valid starting point")
            }
            PolecheckError::Io { .. } => {
                CliError::io(err.to_string()).with_hint("check the input path and its permissions")
            }
            PolecheckError::Csv(_) => {
                CliError::io(err.to_string()).with_hint("is the input a delimited text export with a header row?")
            }
            PolecheckError::ReadInput(_) | PolecheckError::Json(_) | PolecheckError::Write(_) => {
                CliError::io(err.to_string())
            }
        }
    }
}

/// Load a config file, or defaults when no path is given.
pub fn load_config(path: Option<&std::path::Path>) -> Result<AnalysisConfig, CliError> {
    let Some(path) = path else {
        return Ok(AnalysisConfig::default());
    };
    let text = std::fs::read_to_string(path)
        .map_err(|e| CliError::io(format!("cannot read config {}: {e}", path.display())))?;
    AnalysisConfig::from_toml(&text).map_err(|e| {
        CliError::from(e).with_hint(format!("fix {} or omit --config to use defaults", path.display()))
    })
}

// ============================================================================
// config
// ============================================================================

fn cmd_config_validate(file: PathBuf) -> Result<(), CliError> {
    let config = load_config(Some(&file))?;
    println!(
        "{}: ok (delimiter {}, bulk_min_rows {}, proximity_review_m {})",
        file.display(),
        config.input.delimiter,
        config.thresholds.bulk_min_rows,
        config.thresholds.proximity_review_m,
    );
    Ok(())
}

fn cmd_config_default() -> Result<(), CliError> {
    let text = AnalysisConfig::default().to_toml()?;
    print!("{text}");
    Ok(())
}
