use std::io::Read;
use std::path::Path;

use tracing::{info, warn};

use crate::classify::{classify_all, detect_bulk_anomalies};
use crate::config::AnalysisConfig;
use crate::error::Result;
use crate::index::PoleIndex;
use crate::loader::{open_path, open_reader, Records};
use crate::model::{AnalysisMeta, AnalysisResult, LoadStats, PermissionRecord};
use crate::report::{rank_order, summarize};

/// Classify pre-loaded records. Load counters are derived from the records
/// themselves (nothing can be malformed at this point).
pub fn run<I>(records: I, config: &AnalysisConfig) -> AnalysisResult
where
    I: IntoIterator<Item = PermissionRecord>,
{
    let mut load = LoadStats::default();
    let index = PoleIndex::build(records.into_iter().inspect(|r| {
        load.rows_read += 1;
        load.tally(r);
    }));
    analyze(&index, load, config, None)
}

/// Load and classify a delimited file.
pub fn run_path(path: &Path, config: &AnalysisConfig) -> Result<AnalysisResult> {
    let records = open_path(path, config)?;
    Ok(run_records(records, config, Some(path.display().to_string())))
}

/// Load and classify from any reader (stdin, in-memory buffers).
pub fn run_reader<R: Read>(reader: R, config: &AnalysisConfig) -> Result<AnalysisResult> {
    let records = open_reader(reader, config)?;
    Ok(run_records(records, config, None))
}

/// Drain a record stream into the indexes, then classify.
pub fn run_records<R: Read>(
    mut records: Records<R>,
    config: &AnalysisConfig,
    source: Option<String>,
) -> AnalysisResult {
    let index = PoleIndex::build(records.by_ref());
    let load = records.into_stats();
    analyze(&index, load, config, source)
}

fn analyze(
    index: &PoleIndex,
    load: LoadStats,
    config: &AnalysisConfig,
    source: Option<String>,
) -> AnalysisResult {
    let thresholds = &config.thresholds;

    let mut conflicts = classify_all(index, thresholds);
    conflicts.sort_by(rank_order);
    let bulk_anomalies = detect_bulk_anomalies(index, thresholds);

    let warnings = collect_warnings(&load);
    for w in &warnings {
        warn!("{w}");
    }

    let summary = summarize(&conflicts, &bulk_anomalies, load, index.property_workflow(), warnings);

    info!(
        poles = summary.total_poles,
        priority = summary.priority,
        payment_holds = summary.payment_holds,
        bulk = summary.bulk_anomalies,
        malformed = summary.load.malformed_rows,
        "analysis complete"
    );

    AnalysisResult {
        meta: AnalysisMeta {
            engine_version: env!("CARGO_PKG_VERSION").to_string(),
            run_at: chrono::Utc::now().to_rfc3339(),
            source,
        },
        summary,
        conflicts,
        bulk_anomalies,
    }
}

fn collect_warnings(load: &LoadStats) -> Vec<String> {
    let mut warnings = Vec::new();
    if load.rows_loaded == 0 {
        warnings.push("no usable rows in input".to_string());
    }
    if load.malformed_rows > 0 {
        warnings.push(format!("{} malformed row(s) skipped", load.malformed_rows));
    }
    if !load.missing_columns.is_empty() && load.rows_loaded > 0 {
        warnings.push(format!(
            "column(s) not found, values treated as empty: {}",
            load.missing_columns.join(", ")
        ));
    }
    warnings
}
