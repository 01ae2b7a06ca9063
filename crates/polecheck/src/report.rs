//! Report selection and rendering.
//!
//! Everything here reads [`ConflictRecord`]s and never mutates them. The
//! renderers write to any `io::Write`; choosing file names is the caller's job.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::io::Write;

use crate::error::Result;
use crate::model::{
    AnalysisResult, AnalysisSummary, BulkAnomaly, ConflictKind, ConflictRecord, LoadStats,
    PropertyWorkflow, RiskLevel,
};
use crate::status::categorize;

pub const FULL_LIST_COLUMNS: [&str; 8] = [
    "pole_number",
    "kind",
    "risk",
    "address_count",
    "agent_count",
    "max_gps_distance_m",
    "sample_addresses",
    "sample_agents",
];

const HOLD_ACTION: &str = "HOLD PAYMENT - VERIFY";
const FIELD_ACTION: &str = "FIELD VERIFICATION";
const REVIEW_ACTION: &str = "ADDRESS REVIEW";

// ---------------------------------------------------------------------------
// Selection
// ---------------------------------------------------------------------------

/// Risk descending, then address count, then agent count (both descending),
/// then pole number.
pub fn rank_order(a: &ConflictRecord, b: &ConflictRecord) -> Ordering {
    b.risk
        .cmp(&a.risk)
        .then_with(|| b.address_count().cmp(&a.address_count()))
        .then_with(|| b.agent_count().cmp(&a.agent_count()))
        .then_with(|| a.pole_number.cmp(&b.pole_number))
}

pub fn ranked(records: &[ConflictRecord]) -> Vec<&ConflictRecord> {
    let mut out: Vec<&ConflictRecord> = records.iter().collect();
    out.sort_by(|a, b| rank_order(a, b));
    out
}

/// CRITICAL and HIGH only, ranked.
pub fn priority(records: &[ConflictRecord]) -> Vec<&ConflictRecord> {
    ranked(records)
        .into_iter()
        .filter(|r| r.risk.is_priority())
        .collect()
}

/// Payment conflicts only, ranked.
pub fn payment_holds(records: &[ConflictRecord]) -> Vec<&ConflictRecord> {
    ranked(records)
        .into_iter()
        .filter(|r| r.kind == ConflictKind::PaymentConflict)
        .collect()
}

/// Aggregate counts. Every kind and risk tier appears, zero or not.
pub fn summarize(
    records: &[ConflictRecord],
    bulk: &[BulkAnomaly],
    load: LoadStats,
    workflow: PropertyWorkflow,
    warnings: Vec<String>,
) -> AnalysisSummary {
    let mut by_kind: BTreeMap<String, usize> =
        ConflictKind::ALL.iter().map(|k| (k.to_string(), 0)).collect();
    let mut by_risk: BTreeMap<String, usize> =
        RiskLevel::ALL.iter().map(|r| (r.to_string(), 0)).collect();
    let mut priority = 0;
    let mut payment_holds = 0;
    let mut address_reviews = 0;

    for r in records {
        *by_kind.entry(r.kind.to_string()).or_insert(0) += 1;
        *by_risk.entry(r.risk.to_string()).or_insert(0) += 1;
        if r.risk.is_priority() {
            priority += 1;
        }
        if r.kind == ConflictKind::PaymentConflict {
            payment_holds += 1;
        }
        if r.review.is_some() {
            address_reviews += 1;
        }
    }

    AnalysisSummary {
        total_poles: records.len(),
        by_kind,
        by_risk,
        priority,
        payment_holds,
        address_reviews,
        bulk_anomalies: bulk.len(),
        load,
        workflow,
        warnings,
    }
}

// ---------------------------------------------------------------------------
// Formatting helpers
// ---------------------------------------------------------------------------

fn sample<S: AsRef<str>>(items: &[S], n: usize) -> String {
    items
        .iter()
        .take(n)
        .map(|s| s.as_ref())
        .collect::<Vec<_>>()
        .join(" | ")
}

fn fmt_distance(d: Option<f64>) -> String {
    d.map(|m| format!("{m:.2}")).unwrap_or_default()
}

fn fmt_coord(c: Option<f64>) -> String {
    c.map(|v| v.to_string()).unwrap_or_default()
}

fn fmt_review(r: &ConflictRecord) -> String {
    r.review.map(|f| f.to_string()).unwrap_or_default()
}

fn full_row(r: &ConflictRecord, sample_size: usize) -> Vec<String> {
    vec![
        r.pole_number.clone(),
        r.kind.to_string(),
        r.risk.to_string(),
        r.address_count().to_string(),
        r.agent_count().to_string(),
        fmt_distance(r.max_gps_distance_m),
        sample(&r.locations, sample_size),
        sample(&r.agents, sample_size),
    ]
}

// ---------------------------------------------------------------------------
// CSV renderers
// ---------------------------------------------------------------------------

/// One row per pole, ranked.
pub fn write_full_csv<W: Write>(records: &[ConflictRecord], out: W, sample_size: usize) -> Result<()> {
    let mut w = csv::Writer::from_writer(out);
    w.write_record(FULL_LIST_COLUMNS)?;
    for r in ranked(records) {
        w.write_record(full_row(r, sample_size))?;
    }
    w.flush()?;
    Ok(())
}

/// CRITICAL/HIGH poles for field-verification assignment.
pub fn write_priority_csv<W: Write>(records: &[ConflictRecord], out: W, sample_size: usize) -> Result<()> {
    let mut w = csv::Writer::from_writer(out);
    let mut header: Vec<&str> = FULL_LIST_COLUMNS.to_vec();
    header.extend(["review", "action"]);
    w.write_record(&header)?;

    for r in priority(records) {
        let action = match (r.kind, r.review) {
            (ConflictKind::PaymentConflict, _) => HOLD_ACTION,
            (_, Some(_)) => REVIEW_ACTION,
            _ => FIELD_ACTION,
        };
        let mut row = full_row(r, sample_size);
        row.push(fmt_review(r));
        row.push(action.to_string());
        w.write_record(&row)?;
    }
    w.flush()?;
    Ok(())
}

/// One row per approved, named claim on a payment-conflict pole. Exactly
/// one row per pole is marked as the earliest claim.
pub fn write_payment_holds_csv<W: Write>(records: &[ConflictRecord], out: W) -> Result<()> {
    let mut w = csv::Writer::from_writer(out);
    w.write_record([
        "pole_number",
        "agent_name",
        "survey_date",
        "property_id",
        "latitude",
        "longitude",
        "address",
        "earliest_claim",
        "action",
    ])?;

    for r in payment_holds(records) {
        let earliest_index = r.earliest_claim.as_ref().map(|c| c.evidence_index);
        for (i, row) in r
            .evidence_rows
            .iter()
            .enumerate()
            .filter(|(_, row)| !row.agent_name.is_empty() && categorize(&row.status).is_payment_claim())
        {
            let earliest = if Some(i) == earliest_index { "yes" } else { "" };
            let lat = fmt_coord(row.latitude);
            let lon = fmt_coord(row.longitude);
            w.write_record([
                r.pole_number.as_str(),
                row.agent_name.as_str(),
                row.survey_date.as_str(),
                row.property_id.as_str(),
                lat.as_str(),
                lon.as_str(),
                row.address.as_str(),
                earliest,
                HOLD_ACTION,
            ])?;
        }
    }
    w.flush()?;
    Ok(())
}

/// Location conflicts by pole number, with blank columns for the field team.
pub fn write_field_checklist_csv<W: Write>(records: &[ConflictRecord], out: W) -> Result<()> {
    let mut w = csv::Writer::from_writer(out);
    w.write_record([
        "pole_number",
        "primary_address",
        "conflicting_addresses",
        "gps_available",
        "max_gps_distance_m",
        "review",
        "verified_location",
        "verified_gps",
        "verified_by",
        "verification_date",
        "notes",
    ])?;

    let mut conflicts: Vec<&ConflictRecord> = records
        .iter()
        .filter(|r| r.kind == ConflictKind::LocationConflict)
        .collect();
    conflicts.sort_by(|a, b| a.pole_number.cmp(&b.pole_number));

    for r in conflicts {
        let primary = r.locations.first().cloned().unwrap_or_default();
        let rest = r.locations.get(1..).unwrap_or(&[]).join(" | ");
        let gps = if r.gps_fix_count > 0 { "Yes" } else { "No" };
        w.write_record([
            r.pole_number.clone(),
            primary,
            rest,
            gps.to_string(),
            fmt_distance(r.max_gps_distance_m),
            fmt_review(r),
            String::new(),
            String::new(),
            String::new(),
            String::new(),
            String::new(),
        ])?;
    }
    w.flush()?;
    Ok(())
}

#[derive(Debug, Default)]
struct AgentTally {
    conflicts: usize,
    high_risk: usize,
    poles: Vec<String>,
}

/// Agents named on payment-conflict poles. Poles classified as location
/// conflicts are left out even when several agents approved them.
pub fn write_agent_summary_csv<W: Write>(records: &[ConflictRecord], out: W, sample_size: usize) -> Result<()> {
    let mut tallies: BTreeMap<&str, AgentTally> = BTreeMap::new();
    for r in payment_holds(records) {
        for agent in &r.agents {
            let t = tallies.entry(agent.as_str()).or_default();
            t.conflicts += 1;
            if r.risk.is_priority() {
                t.high_risk += 1;
            }
            t.poles.push(r.pole_number.clone());
        }
    }

    let mut rows: Vec<(&str, AgentTally)> = tallies.into_iter().collect();
    rows.sort_by(|a, b| {
        b.1.high_risk
            .cmp(&a.1.high_risk)
            .then_with(|| b.1.conflicts.cmp(&a.1.conflicts))
            .then_with(|| a.0.cmp(&b.0))
    });

    let mut w = csv::Writer::from_writer(out);
    w.write_record(["agent_name", "payment_conflicts", "high_risk_conflicts", "sample_poles", "action"])?;
    for (agent, t) in rows {
        let action = if t.high_risk > 3 { "URGENT REVIEW" } else { "REVIEW" };
        w.write_record([
            agent.to_string(),
            t.conflicts.to_string(),
            t.high_risk.to_string(),
            sample(&t.poles, sample_size),
            action.to_string(),
        ])?;
    }
    w.flush()?;
    Ok(())
}

pub fn write_bulk_csv<W: Write>(anomalies: &[BulkAnomaly], out: W, sample_size: usize) -> Result<()> {
    let mut w = csv::Writer::from_writer(out);
    w.write_record(["survey_date", "address", "row_count", "sample_poles", "sample_properties"])?;
    for a in anomalies {
        w.write_record([
            a.survey_date.clone(),
            a.address.clone(),
            a.row_count.to_string(),
            sample(&a.pole_numbers, sample_size),
            sample(&a.property_ids, sample_size),
        ])?;
    }
    w.flush()?;
    Ok(())
}

// ---------------------------------------------------------------------------
// JSON + Markdown
// ---------------------------------------------------------------------------

pub fn write_json<W: Write>(result: &AnalysisResult, out: W) -> Result<()> {
    serde_json::to_writer_pretty(out, result)?;
    Ok(())
}

/// Human-readable run summary.
pub fn render_markdown(result: &AnalysisResult, sample_size: usize) -> String {
    let s = &result.summary;
    let load = &s.load;
    let mut md = String::new();

    let _ = writeln!(md, "# Pole Permission Conflicts");
    let _ = writeln!(md);
    let _ = writeln!(md, "Generated: {}", result.meta.run_at);
    if let Some(ref source) = result.meta.source {
        let _ = writeln!(md, "Source: `{source}`");
    }

    let _ = writeln!(md, "\n## Input");
    let _ = writeln!(md, "- Rows read: {}", load.rows_read);
    let _ = writeln!(md, "- Rows loaded: {}", load.rows_loaded);
    let _ = writeln!(md, "- Malformed rows skipped: {}", load.malformed_rows);
    let _ = writeln!(md, "- Rows without GPS: {}", load.missing_coordinates);
    let _ = writeln!(md, "- Rows without pole number: {}", load.rows_without_pole);
    let _ = writeln!(md, "- Rows without agent: {}", load.missing_agents);
    let _ = writeln!(md, "- Rows without status: {}", load.missing_status);
    let _ = writeln!(
        md,
        "- Approved rows: {} ({} without agent)",
        load.approved_rows, load.approved_without_agent
    );
    if !load.missing_columns.is_empty() {
        let _ = writeln!(md, "- Missing columns: {}", load.missing_columns.join(", "));
    }

    let workflow = &s.workflow;
    if workflow.properties > 0 {
        let _ = writeln!(md, "\n## Property Workflow");
        let _ = writeln!(md, "- Properties: {}", workflow.properties);
        let _ = writeln!(md, "- Single update: {}", workflow.single_update);
        let _ = writeln!(md, "- Multiple updates: {}", workflow.multiple_updates);
        match workflow.busiest_property {
            Some(ref property) if workflow.max_updates > 1 => {
                let _ = writeln!(md, "- Most updates: {} (property {property})", workflow.max_updates);
            }
            _ => {
                let _ = writeln!(md, "- Most updates: {}", workflow.max_updates);
            }
        }
    }

    let _ = writeln!(md, "\n## Classification ({} poles)", s.total_poles);
    for kind in ConflictKind::ALL {
        let _ = writeln!(md, "- {kind}: {}", s.kind_count(kind));
    }
    let _ = writeln!(md, "\n## Risk");
    for risk in RiskLevel::ALL {
        let _ = writeln!(md, "- {risk}: {}", s.risk_count(risk));
    }
    let _ = writeln!(md, "\n- Field verification (CRITICAL/HIGH): {}", s.priority);
    let _ = writeln!(md, "- Payment holds: {}", s.payment_holds);
    let _ = writeln!(md, "- Address normalization reviews: {}", s.address_reviews);
    let _ = writeln!(md, "- Bulk-entry timestamps: {}", s.bulk_anomalies);

    let top: Vec<&ConflictRecord> = priority(&result.conflicts).into_iter().take(10).collect();
    if !top.is_empty() {
        let _ = writeln!(md, "\n## Top Conflicts");
        for r in top {
            let _ = writeln!(
                md,
                "\n**{}** ({}, {}): {} address(es), {} agent(s), spread {}",
                r.pole_number,
                r.kind,
                r.risk,
                r.address_count(),
                r.agent_count(),
                match r.max_gps_distance_m {
                    Some(m) => format!("{m:.1} m"),
                    None => "no GPS".to_string(),
                }
            );
            for (i, addr) in r.locations.iter().take(sample_size).enumerate() {
                let _ = writeln!(md, "  {}. {addr}", i + 1);
            }
            if r.address_count() > sample_size {
                let _ = writeln!(md, "  ... and {} more", r.address_count() - sample_size);
            }
            if !r.agents.is_empty() {
                let _ = writeln!(md, "  Agents: {}", r.agents.join(", "));
            }
        }
    }

    if !result.bulk_anomalies.is_empty() {
        let _ = writeln!(md, "\n## Bulk Entry Timestamps");
        for a in result.bulk_anomalies.iter().take(10) {
            let _ = writeln!(md, "- **{}** at {}: {} rows", a.survey_date, a.address, a.row_count);
        }
    }

    if !s.warnings.is_empty() {
        let _ = writeln!(md, "\n## Warnings");
        for w in &s.warnings {
            let _ = writeln!(md, "- {w}");
        }
    }

    md
}
