use std::collections::BTreeMap;

use serde::Serialize;

use crate::geo::GeoPoint;
use crate::status::{categorize, StatusCategory};

// ---------------------------------------------------------------------------
// Input
// ---------------------------------------------------------------------------

/// A single normalized row from the permissions export.
///
/// All text fields are trimmed at load. Coordinates that were absent or
/// unusable are `None`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PermissionRecord {
    /// 1-based source line (the header is line 1).
    pub line: usize,
    pub property_id: String,
    pub pole_number: String,
    pub status: String,
    pub agent_name: String,
    pub address: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub survey_date: String,
}

impl PermissionRecord {
    /// GPS fix for this row, if both coordinates are present.
    pub fn gps(&self) -> Option<GeoPoint> {
        match (self.latitude, self.longitude) {
            (Some(lat), Some(lon)) => Some(GeoPoint::new(lat, lon)),
            _ => None,
        }
    }
}

/// Counters collected while loading. Row-level defects end up here, never
/// as errors.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LoadStats {
    /// Data rows seen (excluding the header).
    pub rows_read: usize,
    pub rows_loaded: usize,
    pub malformed_rows: usize,
    pub missing_coordinates: usize,
    pub rows_without_pole: usize,
    pub missing_agents: usize,
    pub missing_status: usize,
    /// Rows whose status is an approved pole permission.
    pub approved_rows: usize,
    /// Approved rows with no agent name; these never count as claims.
    pub approved_without_agent: usize,
    /// Recognized fields whose column was not found in the header.
    pub missing_columns: Vec<String>,
}

impl LoadStats {
    /// Count one loaded row.
    pub fn tally(&mut self, record: &PermissionRecord) {
        self.rows_loaded += 1;
        if record.gps().is_none() {
            self.missing_coordinates += 1;
        }
        if record.pole_number.is_empty() {
            self.rows_without_pole += 1;
        }
        if record.agent_name.is_empty() {
            self.missing_agents += 1;
        }
        let category = categorize(&record.status);
        if category == StatusCategory::Missing {
            self.missing_status += 1;
        }
        if category.is_payment_claim() {
            self.approved_rows += 1;
            if record.agent_name.is_empty() {
                self.approved_without_agent += 1;
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConflictKind {
    None,
    WorkflowUpdate,
    LocationConflict,
    PaymentConflict,
    BulkAnomaly,
}

impl ConflictKind {
    pub const ALL: [ConflictKind; 5] = [
        Self::LocationConflict,
        Self::PaymentConflict,
        Self::BulkAnomaly,
        Self::WorkflowUpdate,
        Self::None,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "NONE",
            Self::WorkflowUpdate => "WORKFLOW_UPDATE",
            Self::LocationConflict => "LOCATION_CONFLICT",
            Self::PaymentConflict => "PAYMENT_CONFLICT",
            Self::BulkAnomaly => "BULK_ANOMALY",
        }
    }
}

impl std::fmt::Display for ConflictKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Risk tiers, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskLevel {
    None,
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    pub const ALL: [RiskLevel; 5] = [
        Self::Critical,
        Self::High,
        Self::Medium,
        Self::Low,
        Self::None,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "NONE",
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
            Self::Critical => "CRITICAL",
        }
    }

    /// CRITICAL and HIGH go to field verification.
    pub fn is_priority(&self) -> bool {
        matches!(self, Self::Critical | Self::High)
    }
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Triage hint attached to a conflict without changing its kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReviewFlag {
    /// Addresses disagree but every GPS fix sits within the proximity
    /// threshold; probably free-text address drift.
    AddressNormalization,
}

impl std::fmt::Display for ReviewFlag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AddressNormalization => write!(f, "ADDRESS_NORMALIZATION"),
        }
    }
}

/// The approved submission that came first for a pole.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Claim {
    pub agent_name: String,
    pub survey_date: String,
    pub property_id: String,
    pub line: usize,
    /// Position of the claiming row in the pole's `evidence_rows`.
    pub evidence_index: usize,
}

/// One classified pole. Built once per run, never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConflictRecord {
    pub pole_number: String,
    pub kind: ConflictKind,
    pub risk: RiskLevel,
    /// Distinct addresses, sorted.
    pub locations: Vec<String>,
    /// Distinct approved agents, sorted.
    pub agents: Vec<String>,
    pub max_gps_distance_m: Option<f64>,
    pub gps_fix_count: usize,
    pub row_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub review: Option<ReviewFlag>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub earliest_claim: Option<Claim>,
    pub evidence_rows: Vec<PermissionRecord>,
}

impl ConflictRecord {
    pub fn address_count(&self) -> usize {
        self.locations.len()
    }

    pub fn agent_count(&self) -> usize {
        self.agents.len()
    }
}

/// Many rows stamped at the identical instant at one address.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BulkAnomaly {
    pub survey_date: String,
    pub address: String,
    pub row_count: usize,
    /// Distinct non-empty pole numbers among the rows, sorted.
    pub pole_numbers: Vec<String>,
    /// Property ids in source order.
    pub property_ids: Vec<String>,
}

// ---------------------------------------------------------------------------
// Summary + Output
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct AnalysisSummary {
    pub total_poles: usize,
    pub by_kind: BTreeMap<String, usize>,
    pub by_risk: BTreeMap<String, usize>,
    pub priority: usize,
    pub payment_holds: usize,
    pub address_reviews: usize,
    pub bulk_anomalies: usize,
    pub load: LoadStats,
    pub workflow: PropertyWorkflow,
    pub warnings: Vec<String>,
}

/// Status updates per property id. Several updates for one property is
/// ordinary workflow, not a conflict.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PropertyWorkflow {
    pub properties: usize,
    pub single_update: usize,
    pub multiple_updates: usize,
    pub max_updates: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub busiest_property: Option<String>,
}

impl AnalysisSummary {
    pub fn kind_count(&self, kind: ConflictKind) -> usize {
        self.by_kind.get(kind.as_str()).copied().unwrap_or(0)
    }

    pub fn risk_count(&self, risk: RiskLevel) -> usize {
        self.by_risk.get(risk.as_str()).copied().unwrap_or(0)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AnalysisMeta {
    pub engine_version: String,
    pub run_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnalysisResult {
    pub meta: AnalysisMeta,
    pub summary: AnalysisSummary,
    /// All poles, ranked (see [`crate::report::ranked`]).
    pub conflicts: Vec<ConflictRecord>,
    pub bulk_anomalies: Vec<BulkAnomaly>,
}
