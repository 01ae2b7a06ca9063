use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use crate::geo::GeoPoint;
use crate::model::{PermissionRecord, PropertyWorkflow};
use crate::status::categorize;

/// Addresses and GPS fixes seen for one pole.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LocationEntry {
    pub addresses: BTreeSet<String>,
    /// Distinct fixes in first-seen order.
    pub fixes: Vec<GeoPoint>,
}

/// Key for same-instant bulk detection: (survey_date, address). Both parts
/// are non-empty.
pub type BulkKey = (String, String);

/// All per-run indexes, built in one pass and read-only afterwards.
///
/// Owns the loaded rows; every other map refers to them by position.
#[derive(Debug, Default)]
pub struct PoleIndex {
    rows: Vec<PermissionRecord>,
    /// pole → addresses + fixes
    locations: BTreeMap<String, LocationEntry>,
    /// pole → approved agents
    agents: BTreeMap<String, BTreeSet<String>>,
    /// pole → row positions (every row carrying that pole number)
    evidence: BTreeMap<String, Vec<usize>>,
    bulk: BTreeMap<BulkKey, Vec<usize>>,
    /// Size of each row's bulk group; 0 when the row has no bulk key.
    bulk_size: Vec<usize>,
}

impl PoleIndex {
    pub fn build<I>(records: I) -> Self
    where
        I: IntoIterator<Item = PermissionRecord>,
    {
        let mut index = PoleIndex::default();

        for record in records {
            let pos = index.rows.len();

            if !record.survey_date.is_empty() && !record.address.is_empty() {
                index
                    .bulk
                    .entry((record.survey_date.clone(), record.address.clone()))
                    .or_default()
                    .push(pos);
            }

            if !record.pole_number.is_empty() {
                let pole = &record.pole_number;
                index.evidence.entry(pole.clone()).or_default().push(pos);

                // Workflow updates at one address stay one address; status is irrelevant here.
                if !record.address.is_empty() {
                    index
                        .locations
                        .entry(pole.clone())
                        .or_default()
                        .addresses
                        .insert(record.address.clone());
                }
                if let Some(fix) = record.gps() {
                    let entry = index.locations.entry(pole.clone()).or_default();
                    if !entry.fixes.contains(&fix) {
                        entry.fixes.push(fix);
                    }
                }

                if !record.agent_name.is_empty() && categorize(&record.status).is_payment_claim() {
                    index
                        .agents
                        .entry(pole.clone())
                        .or_default()
                        .insert(record.agent_name.clone());
                }
            }

            index.rows.push(record);
        }

        let mut bulk_size = vec![0; index.rows.len()];
        for members in index.bulk.values() {
            for &pos in members {
                bulk_size[pos] = members.len();
            }
        }
        index.bulk_size = bulk_size;

        debug!(
            rows = index.rows.len(),
            poles = index.evidence.len(),
            located = index.locations.len(),
            with_agents = index.agents.len(),
            timestamps = index.bulk.len(),
            "indexes built"
        );

        index
    }

    pub fn rows(&self) -> &[PermissionRecord] {
        &self.rows
    }

    /// Every pole number seen, in sorted order.
    pub fn poles(&self) -> impl Iterator<Item = &str> {
        self.evidence.keys().map(String::as_str)
    }

    pub fn locations(&self, pole: &str) -> Option<&LocationEntry> {
        self.locations.get(pole)
    }

    pub fn agents(&self, pole: &str) -> Option<&BTreeSet<String>> {
        self.agents.get(pole)
    }

    /// Rows for a pole, in source order.
    pub fn rows_for<'a>(&'a self, pole: &str) -> impl Iterator<Item = (usize, &'a PermissionRecord)> + 'a {
        self.evidence
            .get(pole)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
            .iter()
            .map(move |&pos| (pos, &self.rows[pos]))
    }

    /// Updates per non-empty property id. The busiest property is the first
    /// in sorted order among those with the most updates.
    pub fn property_workflow(&self) -> PropertyWorkflow {
        let mut updates: BTreeMap<&str, usize> = BTreeMap::new();
        for record in &self.rows {
            if !record.property_id.is_empty() {
                *updates.entry(record.property_id.as_str()).or_default() += 1;
            }
        }

        let mut workflow = PropertyWorkflow {
            properties: updates.len(),
            ..PropertyWorkflow::default()
        };
        for (property, &n) in &updates {
            if n == 1 {
                workflow.single_update += 1;
            } else {
                workflow.multiple_updates += 1;
            }
            if n > workflow.max_updates {
                workflow.max_updates = n;
                workflow.busiest_property = Some((*property).to_string());
            }
        }
        workflow
    }

    /// True if the row shares its (survey_date, address) with at least
    /// `min_rows - 1` other rows.
    pub fn in_bulk_group(&self, pos: usize, min_rows: usize) -> bool {
        self.bulk_size.get(pos).is_some_and(|&n| n > 0 && n >= min_rows)
    }

    /// Bulk groups with at least `min_rows` members.
    pub fn bulk_groups(&self, min_rows: usize) -> impl Iterator<Item = (&BulkKey, &[usize])> {
        self.bulk
            .iter()
            .filter(move |(_, members)| members.len() >= min_rows)
            .map(|(key, members)| (key, members.as_slice()))
    }
}
