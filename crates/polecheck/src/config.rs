use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{PolecheckError, Result};

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Analysis settings. Every section is optional; an empty TOML document
/// yields [`AnalysisConfig::default`].
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AnalysisConfig {
    #[serde(default)]
    pub input: InputConfig,
    #[serde(default)]
    pub columns: ColumnAliases,
    #[serde(default)]
    pub thresholds: Thresholds,
    #[serde(default)]
    pub report: ReportConfig,
}

// ---------------------------------------------------------------------------
// Input
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct InputConfig {
    #[serde(default)]
    pub delimiter: Delimiter,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Delimiter {
    /// Sniff from the first lines of the input.
    #[default]
    Auto,
    Comma,
    Semicolon,
    Tab,
}

impl Delimiter {
    /// Fixed byte, or `None` for [`Delimiter::Auto`].
    pub fn as_byte(&self) -> Option<u8> {
        match self {
            Self::Auto => None,
            Self::Comma => Some(b','),
            Self::Semicolon => Some(b';'),
            Self::Tab => Some(b'\t'),
        }
    }
}

impl FromStr for Delimiter {
    type Err = PolecheckError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "comma" | "," => Ok(Self::Comma),
            "semicolon" | ";" => Ok(Self::Semicolon),
            "tab" | "\\t" => Ok(Self::Tab),
            other => Err(PolecheckError::ConfigValidation(format!(
                "unknown delimiter '{other}' (expected auto, comma, semicolon or tab)"
            ))),
        }
    }
}

impl std::fmt::Display for Delimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Auto => write!(f, "auto"),
            Self::Comma => write!(f, "comma"),
            Self::Semicolon => write!(f, "semicolon"),
            Self::Tab => write!(f, "tab"),
        }
    }
}

// ---------------------------------------------------------------------------
// Column aliases
// ---------------------------------------------------------------------------

/// Record fields the loader looks for in the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Field {
    PoleNumber,
    PropertyId,
    Status,
    Address,
    Latitude,
    Longitude,
    SurveyDate,
    AgentName,
}

impl Field {
    pub const ALL: [Field; 8] = [
        Self::PoleNumber,
        Self::PropertyId,
        Self::Status,
        Self::Address,
        Self::Latitude,
        Self::Longitude,
        Self::SurveyDate,
        Self::AgentName,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::PoleNumber => "pole_number",
            Self::PropertyId => "property_id",
            Self::Status => "status",
            Self::Address => "address",
            Self::Latitude => "latitude",
            Self::Longitude => "longitude",
            Self::SurveyDate => "survey_date",
            Self::AgentName => "agent_name",
        }
    }
}

/// Accepted header names per field. Compared after normalization
/// (trimmed, lowercased, inner whitespace collapsed).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ColumnAliases {
    #[serde(default = "default_pole_number")]
    pub pole_number: Vec<String>,
    #[serde(default = "default_property_id")]
    pub property_id: Vec<String>,
    #[serde(default = "default_status")]
    pub status: Vec<String>,
    #[serde(default = "default_address")]
    pub address: Vec<String>,
    #[serde(default = "default_latitude")]
    pub latitude: Vec<String>,
    #[serde(default = "default_longitude")]
    pub longitude: Vec<String>,
    #[serde(default = "default_survey_date")]
    pub survey_date: Vec<String>,
    #[serde(default = "default_agent_name")]
    pub agent_name: Vec<String>,
}

fn aliases(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

fn default_pole_number() -> Vec<String> {
    aliases(&["pole number", "pole_number", "pole"])
}

fn default_property_id() -> Vec<String> {
    aliases(&["property id", "property_id"])
}

fn default_status() -> Vec<String> {
    aliases(&["status"])
}

fn default_address() -> Vec<String> {
    aliases(&["location address", "address"])
}

fn default_latitude() -> Vec<String> {
    aliases(&["latitude", "lat"])
}

fn default_longitude() -> Vec<String> {
    aliases(&["longitude", "lon", "lng"])
}

fn default_survey_date() -> Vec<String> {
    aliases(&["survey date", "survey_date", "date"])
}

fn default_agent_name() -> Vec<String> {
    aliases(&["field agent name", "field agent name (pole permission)", "agent"])
}

impl Default for ColumnAliases {
    fn default() -> Self {
        Self {
            pole_number: default_pole_number(),
            property_id: default_property_id(),
            status: default_status(),
            address: default_address(),
            latitude: default_latitude(),
            longitude: default_longitude(),
            survey_date: default_survey_date(),
            agent_name: default_agent_name(),
        }
    }
}

impl ColumnAliases {
    pub fn for_field(&self, field: Field) -> &[String] {
        match field {
            Field::PoleNumber => &self.pole_number,
            Field::PropertyId => &self.property_id,
            Field::Status => &self.status,
            Field::Address => &self.address,
            Field::Latitude => &self.latitude,
            Field::Longitude => &self.longitude,
            Field::SurveyDate => &self.survey_date,
            Field::AgentName => &self.agent_name,
        }
    }
}

// ---------------------------------------------------------------------------
// Thresholds + Report
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Thresholds {
    /// Distinct addresses at which a location conflict becomes CRITICAL.
    #[serde(default = "default_critical_address_count")]
    pub critical_address_count: usize,
    /// Distinct addresses at which a location conflict becomes HIGH.
    #[serde(default = "default_high_address_count")]
    pub high_address_count: usize,
    /// Rows sharing one (survey_date, address) before it counts as bulk entry.
    #[serde(default = "default_bulk_min_rows")]
    pub bulk_min_rows: usize,
    /// GPS spread under which a location conflict is flagged for address review.
    #[serde(default = "default_proximity_review_m")]
    pub proximity_review_m: f64,
}

fn default_critical_address_count() -> usize {
    5
}

fn default_high_address_count() -> usize {
    3
}

fn default_bulk_min_rows() -> usize {
    4
}

fn default_proximity_review_m() -> f64 {
    15.0
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            critical_address_count: default_critical_address_count(),
            high_address_count: default_high_address_count(),
            bulk_min_rows: default_bulk_min_rows(),
            proximity_review_m: default_proximity_review_m(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ReportConfig {
    /// Max addresses/agents/poles listed in a sample column.
    #[serde(default = "default_sample_size")]
    pub sample_size: usize,
}

fn default_sample_size() -> usize {
    3
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            sample_size: default_sample_size(),
        }
    }
}

// ---------------------------------------------------------------------------
// Parse + Validate
// ---------------------------------------------------------------------------

impl AnalysisConfig {
    pub fn from_toml(input: &str) -> Result<Self> {
        let config: AnalysisConfig =
            toml::from_str(input).map_err(|e| PolecheckError::ConfigParse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| PolecheckError::ConfigParse(e.to_string()))
    }

    pub fn validate(&self) -> Result<()> {
        let t = &self.thresholds;

        if t.high_address_count < 2 {
            return Err(PolecheckError::ConfigValidation(format!(
                "thresholds.high_address_count must be at least 2, got {}",
                t.high_address_count
            )));
        }

        if t.critical_address_count <= t.high_address_count {
            return Err(PolecheckError::ConfigValidation(format!(
                "thresholds.critical_address_count ({}) must exceed high_address_count ({})",
                t.critical_address_count, t.high_address_count
            )));
        }

        if t.bulk_min_rows < 2 {
            return Err(PolecheckError::ConfigValidation(format!(
                "thresholds.bulk_min_rows must be at least 2, got {}",
                t.bulk_min_rows
            )));
        }

        if !t.proximity_review_m.is_finite() || t.proximity_review_m < 0.0 {
            return Err(PolecheckError::ConfigValidation(format!(
                "thresholds.proximity_review_m must be a non-negative number, got {}",
                t.proximity_review_m
            )));
        }

        if self.report.sample_size == 0 {
            return Err(PolecheckError::ConfigValidation(
                "report.sample_size must be at least 1".into(),
            ));
        }

        for field in Field::ALL {
            let list = self.columns.for_field(field);
            if list.iter().all(|alias| alias.trim().is_empty()) {
                return Err(PolecheckError::ConfigValidation(format!(
                    "columns.{} needs at least one non-empty alias",
                    field.name()
                )));
            }
        }

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
