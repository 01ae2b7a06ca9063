//! Workflow status → category mapping.
//!
//! Statuses are free text ("Pole Permission: Approved", "Home Sign Ups:
//! Approved & Installation Scheduled", ...). Every status test in the crate
//! goes through [`categorize`]; nothing else pattern-matches status text.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusCategory {
    Missing,
    Declined,
    Pending,
    HomeSignUp,
    HomeInstallation,
    PermissionApproved,
    Other,
}

impl StatusCategory {
    /// Only approved pole permissions are payment claims.
    pub fn is_payment_claim(&self) -> bool {
        matches!(self, Self::PermissionApproved)
    }
}

#[derive(Debug, Clone, Copy)]
enum Pattern {
    Contains(&'static str),
    StartsWith(&'static str),
}

impl Pattern {
    fn matches(&self, status: &str) -> bool {
        match self {
            Self::Contains(needle) => status.contains(needle),
            Self::StartsWith(prefix) => status.starts_with(prefix),
        }
    }
}

/// Evaluated top to bottom against the lowercased status; first hit wins.
const STATUS_TABLE: &[(Pattern, StatusCategory)] = &[
    (Pattern::Contains("declined"), StatusCategory::Declined),
    (Pattern::Contains("rejected"), StatusCategory::Declined),
    (Pattern::Contains("refused"), StatusCategory::Declined),
    (Pattern::Contains("pending"), StatusCategory::Pending),
    (Pattern::Contains("awaiting"), StatusCategory::Pending),
    (Pattern::Contains("requested"), StatusCategory::Pending),
    (Pattern::StartsWith("home sign"), StatusCategory::HomeSignUp),
    (Pattern::StartsWith("home installation"), StatusCategory::HomeInstallation),
    (Pattern::Contains("approved"), StatusCategory::PermissionApproved),
    (Pattern::Contains("granted"), StatusCategory::PermissionApproved),
];

pub fn categorize(status: &str) -> StatusCategory {
    let normalized = status.trim().to_lowercase();
    if normalized.is_empty() {
        return StatusCategory::Missing;
    }
    STATUS_TABLE
        .iter()
        .find(|(pattern, _)| pattern.matches(&normalized))
        .map(|(_, category)| *category)
        .unwrap_or(StatusCategory::Other)
}
