//! `polecheck analyze`: run the engine and write the report set.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use polecheck::config::Delimiter;
use polecheck::report;
use polecheck::{AnalysisResult, Result as EngineResult};
use tracing::info;

use crate::exit_codes::EXIT_PRIORITY_FOUND;
use crate::{load_config, CliError};

pub const FULL_CSV: &str = "conflicts_full.csv";
pub const PRIORITY_CSV: &str = "priority_verification.csv";
pub const PAYMENT_HOLDS_CSV: &str = "payment_holds.csv";
pub const CHECKLIST_CSV: &str = "field_checklist.csv";
pub const AGENTS_CSV: &str = "agent_conflicts.csv";
pub const BULK_CSV: &str = "bulk_anomalies.csv";
pub const ANALYSIS_JSON: &str = "analysis.json";
pub const SUMMARY_MD: &str = "summary.md";

pub struct AnalyzeArgs {
    pub input: PathBuf,
    pub config: Option<PathBuf>,
    pub out_dir: PathBuf,
    pub delimiter: Option<Delimiter>,
    pub json: bool,
    pub quiet: bool,
    pub fail_on_priority: bool,
}

pub fn cmd_analyze(args: AnalyzeArgs) -> Result<(), CliError> {
    let mut config = load_config(args.config.as_deref())?;
    if let Some(delimiter) = args.delimiter {
        config.input.delimiter = delimiter;
    }

    if args.out_dir.is_file() {
        return Err(CliError::usage(format!(
            "--out-dir {} is a file",
            args.out_dir.display()
        ))
        .with_hint("pass a directory; it is created if missing"));
    }

    let result = if args.input.as_os_str() == "-" {
        polecheck::run_reader(io::stdin().lock(), &config)?
    } else {
        polecheck::run_path(&args.input, &config)?
    };

    let written = write_reports(&result, &args.out_dir, config.report.sample_size)?;
    info!(dir = %args.out_dir.display(), files = written.len(), "reports written");

    if args.json {
        let stdout = io::stdout();
        let mut handle = stdout.lock();
        report::write_json(&result, &mut handle)?;
        writeln!(handle).map_err(|e| CliError::io(e.to_string()))?;
    }

    if !args.quiet {
        print_summary(&result, &args.out_dir);
    }

    if args.fail_on_priority && result.summary.priority > 0 {
        return Err(CliError {
            code: EXIT_PRIORITY_FOUND,
            message: format!("{} priority conflict(s) found", result.summary.priority),
            hint: Some(format!(
                "see {}",
                args.out_dir.join(PRIORITY_CSV).display()
            )),
        });
    }

    Ok(())
}

/// Write every report into `dir`, creating it if needed. Returns the paths
/// in write order.
pub fn write_reports(result: &AnalysisResult, dir: &Path, sample_size: usize) -> Result<Vec<PathBuf>, CliError> {
    std::fs::create_dir_all(dir)
        .map_err(|e| CliError::io(format!("cannot create {}: {e}", dir.display())))?;

    let conflicts = &result.conflicts;
    let mut written = Vec::new();

    written.push(write_file(dir, FULL_CSV, |w| report::write_full_csv(conflicts, w, sample_size))?);
    written.push(write_file(dir, PRIORITY_CSV, |w| report::write_priority_csv(conflicts, w, sample_size))?);
    written.push(write_file(dir, PAYMENT_HOLDS_CSV, |w| report::write_payment_holds_csv(conflicts, w))?);
    written.push(write_file(dir, CHECKLIST_CSV, |w| report::write_field_checklist_csv(conflicts, w))?);
    written.push(write_file(dir, AGENTS_CSV, |w| report::write_agent_summary_csv(conflicts, w, sample_size))?);
    written.push(write_file(dir, BULK_CSV, |w| {
        report::write_bulk_csv(&result.bulk_anomalies, w, sample_size)
    })?);
    written.push(write_file(dir, ANALYSIS_JSON, |w| report::write_json(result, w))?);
    written.push(write_file(dir, SUMMARY_MD, |w| {
        w.write_all(report::render_markdown(result, sample_size).as_bytes())?;
        Ok(())
    })?);

    Ok(written)
}

fn write_file<F>(dir: &Path, name: &str, render: F) -> Result<PathBuf, CliError>
where
    F: FnOnce(&mut BufWriter<File>) -> EngineResult<()>,
{
    let path = dir.join(name);
    let io_err = |e: &dyn std::fmt::Display| CliError::io(format!("cannot write {}: {e}", path.display()));

    let file = File::create(&path).map_err(|e| io_err(&e))?;
    let mut w = BufWriter::new(file);
    render(&mut w).map_err(|e| io_err(&e))?;
    w.flush().map_err(|e| io_err(&e))?;
    Ok(path)
}

fn print_summary(result: &AnalysisResult, out_dir: &Path) {
    let s = &result.summary;
    eprintln!(
        "{} rows, {} poles: {} priority, {} payment holds, {} address reviews, {} bulk anomalies",
        s.load.rows_loaded, s.total_poles, s.priority, s.payment_holds, s.address_reviews, s.bulk_anomalies,
    );
    if s.load.malformed_rows > 0 {
        eprintln!("  skipped {} malformed row(s)", s.load.malformed_rows);
    }
    eprintln!("  reports in {}", out_dir.display());
}
