use std::collections::BTreeSet;

use chrono::{DateTime, NaiveDate, NaiveDateTime};

use crate::config::Thresholds;
use crate::geo::max_pairwise_distance;
use crate::index::PoleIndex;
use crate::model::{BulkAnomaly, Claim, ConflictKind, ConflictRecord, PermissionRecord, ReviewFlag, RiskLevel};
use crate::status::categorize;

/// Classify every pole the indexer saw. One record per pole, sorted by pole
/// number.
pub fn classify_all(index: &PoleIndex, thresholds: &Thresholds) -> Vec<ConflictRecord> {
    index
        .poles()
        .map(|pole| classify_pole(index, pole, thresholds))
        .collect()
}

/// Assign exactly one kind and risk to a pole.
///
/// Precedence (first hit wins):
/// 1. ≥2 distinct addresses → LOCATION_CONFLICT, risk by address count
/// 2. ≥2 distinct approved agents → PAYMENT_CONFLICT, HIGH
/// 3. any row in a same-instant bulk group → BULK_ANOMALY, MEDIUM
/// 4. indexable and ≥2 rows → WORKFLOW_UPDATE, LOW
/// 5. otherwise → NONE
pub fn classify_pole(index: &PoleIndex, pole: &str, thresholds: &Thresholds) -> ConflictRecord {
    let location = index.locations(pole);
    let locations: Vec<String> = location
        .map(|l| l.addresses.iter().cloned().collect())
        .unwrap_or_default();
    let fixes = location.map(|l| l.fixes.as_slice()).unwrap_or(&[]);
    let agents: Vec<String> = index
        .agents(pole)
        .map(|a| a.iter().cloned().collect())
        .unwrap_or_default();
    let rows: Vec<(usize, &PermissionRecord)> = index.rows_for(pole).collect();

    let indexable = !locations.is_empty() || !agents.is_empty();
    let in_bulk = rows
        .iter()
        .any(|(pos, _)| index.in_bulk_group(*pos, thresholds.bulk_min_rows));

    let kind = if locations.len() >= 2 {
        ConflictKind::LocationConflict
    } else if agents.len() >= 2 {
        ConflictKind::PaymentConflict
    } else if in_bulk {
        ConflictKind::BulkAnomaly
    } else if indexable && rows.len() >= 2 {
        ConflictKind::WorkflowUpdate
    } else {
        ConflictKind::None
    };

    let risk = match kind {
        ConflictKind::LocationConflict => location_risk(locations.len(), thresholds),
        ConflictKind::PaymentConflict => RiskLevel::High,
        ConflictKind::BulkAnomaly => RiskLevel::Medium,
        ConflictKind::WorkflowUpdate => RiskLevel::Low,
        ConflictKind::None => RiskLevel::None,
    };

    let max_gps_distance_m = max_pairwise_distance(fixes);

    let review = match (kind, max_gps_distance_m) {
        (ConflictKind::LocationConflict, Some(spread))
            if fixes.len() >= 2 && spread < thresholds.proximity_review_m =>
        {
            Some(ReviewFlag::AddressNormalization)
        }
        _ => None,
    };

    let earliest_claim = if kind == ConflictKind::PaymentConflict {
        earliest_claim(rows.iter().map(|(_, r)| *r))
    } else {
        None
    };

    ConflictRecord {
        pole_number: pole.to_string(),
        kind,
        risk,
        locations,
        agents,
        max_gps_distance_m,
        gps_fix_count: fixes.len(),
        row_count: rows.len(),
        review,
        earliest_claim,
        evidence_rows: rows.into_iter().map(|(_, r)| r.clone()).collect(),
    }
}

fn location_risk(address_count: usize, thresholds: &Thresholds) -> RiskLevel {
    if address_count >= thresholds.critical_address_count {
        RiskLevel::Critical
    } else if address_count >= thresholds.high_address_count {
        RiskLevel::High
    } else {
        RiskLevel::Medium
    }
}

/// First approved, named submission. Parseable dates sort before
/// unparseable ones; ties fall back to raw text, then source line, then
/// position in `rows`. `Claim::evidence_index` is that position.
pub fn earliest_claim<'a, I>(rows: I) -> Option<Claim>
where
    I: IntoIterator<Item = &'a PermissionRecord>,
{
    rows.into_iter()
        .enumerate()
        .filter(|(_, r)| !r.agent_name.is_empty() && categorize(&r.status).is_payment_claim())
        .min_by_key(|(i, r)| {
            let parsed = parse_survey_date(&r.survey_date);
            (parsed.is_none(), parsed, r.survey_date.clone(), r.line, *i)
        })
        .map(|(i, r)| Claim {
            agent_name: r.agent_name.clone(),
            survey_date: r.survey_date.clone(),
            property_id: r.property_id.clone(),
            line: r.line,
            evidence_index: i,
        })
}

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y/%m/%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%d/%m/%Y"];

/// Best-effort parse of the loosely formatted survey timestamps.
pub fn parse_survey_date(raw: &str) -> Option<NaiveDateTime> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.naive_utc());
    }
    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt);
        }
    }
    for fmt in DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
            return d.and_hms_opt(0, 0, 0);
        }
    }
    None
}

/// Timestamp-level findings: (survey_date, address) groups at or above the
/// bulk threshold, largest first.
pub fn detect_bulk_anomalies(index: &PoleIndex, thresholds: &Thresholds) -> Vec<BulkAnomaly> {
    let rows = index.rows();
    let mut anomalies: Vec<BulkAnomaly> = index
        .bulk_groups(thresholds.bulk_min_rows)
        .map(|((survey_date, address), members)| {
            let pole_numbers: BTreeSet<String> = members
                .iter()
                .map(|&pos| &rows[pos].pole_number)
                .filter(|p| !p.is_empty())
                .cloned()
                .collect();
            BulkAnomaly {
                survey_date: survey_date.clone(),
                address: address.clone(),
                row_count: members.len(),
                pole_numbers: pole_numbers.into_iter().collect(),
                property_ids: members
                    .iter()
                    .map(|&pos| rows[pos].property_id.clone())
                    .filter(|p| !p.is_empty())
                    .collect(),
            }
        })
        .collect();

    anomalies.sort_by(|a, b| {
        b.row_count
            .cmp(&a.row_count)
            .then_with(|| a.survey_date.cmp(&b.survey_date))
            .then_with(|| a.address.cmp(&b.address))
    });
    anomalies
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(
        pole: &str,
        address: &str,
        status: &str,
        agent: &str,
        gps: Option<(f64, f64)>,
    ) -> PermissionRecord {
        PermissionRecord {
            line: 0,
            property_id: String::new(),
            pole_number: pole.into(),
            status: status.into(),
            agent_name: agent.into(),
            address: address.into(),
            latitude: gps.map(|g| g.0),
            longitude: gps.map(|g| g.1),
            survey_date: String::new(),
        }
    }

    fn classify(rows: Vec<PermissionRecord>) -> Vec<ConflictRecord> {
        let index = PoleIndex::build(rows);
        classify_all(&index, &Thresholds::default())
    }

    #[test]
    fn location_risk_tiers() {
        let t = Thresholds::default();
        assert_eq!(location_risk(2, &t), RiskLevel::Medium);
        assert_eq!(location_risk(3, &t), RiskLevel::High);
        assert_eq!(location_risk(4, &t), RiskLevel::High);
        assert_eq!(location_risk(5, &t), RiskLevel::Critical);
        assert_eq!(location_risk(9, &t), RiskLevel::Critical);
    }

    #[test]
    fn location_beats_payment() {
        let out = classify(vec![
            rec("P1", "A1", "Approved", "Alice", None),
            rec("P1", "A2", "Approved", "Bob", None),
            rec("P1", "A3", "Approved", "Carol", None),
        ]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].kind, ConflictKind::LocationConflict);
        assert_eq!(out[0].risk, RiskLevel::High);
        assert_eq!(out[0].agent_count(), 3);
        assert!(out[0].earliest_claim.is_none());
    }

    #[test]
    fn payment_conflict_is_high_without_gps() {
        let out = classify(vec![
            rec("P1", "A1", "Pole Permission: Approved", "Alice", None),
            rec("P1", "A1", "Pole Permission: Approved", "Bob", None),
        ]);
        assert_eq!(out[0].kind, ConflictKind::PaymentConflict);
        assert_eq!(out[0].risk, RiskLevel::High);
        assert_eq!(out[0].max_gps_distance_m, None);
        assert_eq!(out[0].gps_fix_count, 0);
    }

    #[test]
    fn payment_conflict_without_address() {
        let out = classify(vec![
            rec("P1", "", "Approved", "Alice", None),
            rec("P1", "", "Approved", "Bob", None),
        ]);
        assert_eq!(out[0].kind, ConflictKind::PaymentConflict);
    }

    #[test]
    fn empty_agents_never_make_a_payment_conflict() {
        let out = classify(vec![
            rec("P1", "A1", "Approved", "X", None),
            rec("P1", "A1", "Approved", "", None),
            rec("P1", "A1", "Approved", "", None),
        ]);
        assert_eq!(out[0].kind, ConflictKind::WorkflowUpdate);
        assert_eq!(out[0].risk, RiskLevel::Low);
    }

    #[test]
    fn pending_agents_are_not_claims() {
        let out = classify(vec![
            rec("P1", "A1", "Pole Permission: Approved", "Alice", None),
            rec("P1", "A1", "Pole Permission: Pending", "Bob", None),
        ]);
        assert_eq!(out[0].kind, ConflictKind::WorkflowUpdate);
        assert_eq!(out[0].agents, vec!["Alice".to_string()]);
    }

    #[test]
    fn single_row_is_none() {
        let out = classify(vec![rec("P1", "A1", "Approved", "Alice", Some((-26.0, 27.0)))]);
        assert_eq!(out[0].kind, ConflictKind::None);
        assert_eq!(out[0].risk, RiskLevel::None);
        assert_eq!(out[0].max_gps_distance_m, Some(0.0));
    }

    #[test]
    fn unindexable_rows_are_none() {
        let out = classify(vec![
            rec("P1", "", "Pending", "", None),
            rec("P1", "", "Pending", "Bob", None),
        ]);
        assert_eq!(out[0].kind, ConflictKind::None);
        assert_eq!(out[0].row_count, 2);
    }

    #[test]
    fn nearby_fixes_flag_address_review() {
        let out = classify(vec![
            rec("P1", "12 Main Rd", "Approved", "Alice", Some((-26.00000, 27.0))),
            rec("P1", "12 Main Road", "Approved", "Alice", Some((-26.00005, 27.0))),
        ]);
        assert_eq!(out[0].kind, ConflictKind::LocationConflict);
        assert_eq!(out[0].review, Some(ReviewFlag::AddressNormalization));
        assert!(out[0].max_gps_distance_m.unwrap() < 15.0);
    }

    #[test]
    fn distant_fixes_not_flagged() {
        let out = classify(vec![
            rec("P1", "A1", "Approved", "Alice", Some((-26.0, 27.0))),
            rec("P1", "A2", "Approved", "Alice", Some((-26.001, 27.0))),
        ]);
        assert_eq!(out[0].review, None);
        assert!(out[0].max_gps_distance_m.unwrap() > 100.0);
    }

    #[test]
    fn single_fix_does_not_flag_review() {
        let out = classify(vec![
            rec("P1", "A1", "Approved", "Alice", Some((-26.0, 27.0))),
            rec("P1", "A2", "Approved", "Alice", None),
        ]);
        assert_eq!(out[0].kind, ConflictKind::LocationConflict);
        assert_eq!(out[0].review, None);
    }

    #[test]
    fn bulk_anomaly_below_payment_precedence() {
        let mut rows = Vec::new();
        for pole in ["P1", "P2", "P3", "P4"] {
            let mut r = rec(pole, "Block A", "Pole Permission: Pending", "", None);
            r.survey_date = "2025-05-01 08:00:00".into();
            rows.push(r);
        }
        // P1 also has a genuine payment conflict
        rows.push(rec("P1", "Block A", "Approved", "Alice", None));
        rows.push(rec("P1", "Block A", "Approved", "Bob", None));

        let index = PoleIndex::build(rows);
        let t = Thresholds::default();
        let out = classify_all(&index, &t);
        let by_pole = |p: &str| out.iter().find(|c| c.pole_number == p).unwrap();
        assert_eq!(by_pole("P1").kind, ConflictKind::PaymentConflict);
        assert_eq!(by_pole("P2").kind, ConflictKind::BulkAnomaly);
        assert_eq!(by_pole("P2").risk, RiskLevel::Medium);

        let anomalies = detect_bulk_anomalies(&index, &t);
        assert_eq!(anomalies.len(), 1);
        assert_eq!(anomalies[0].row_count, 4);
        assert_eq!(anomalies[0].pole_numbers, vec!["P1", "P2", "P3", "P4"]);
    }

    #[test]
    fn three_rows_at_one_instant_is_not_bulk() {
        let mut rows = Vec::new();
        for pole in ["P1", "P2", "P3"] {
            let mut r = rec(pole, "Block A", "Pending", "", None);
            r.survey_date = "2025-05-01 08:00:00".into();
            rows.push(r);
        }
        let index = PoleIndex::build(rows);
        let t = Thresholds::default();
        assert!(detect_bulk_anomalies(&index, &t).is_empty());
        assert!(classify_all(&index, &t).iter().all(|c| c.kind == ConflictKind::None));
    }

    #[test]
    fn earliest_claim_orders_by_parsed_date() {
        let mut a = rec("P1", "A1", "Approved", "Late", None);
        a.survey_date = "2025/06/02 09:00:00".into();
        a.line = 2;
        let mut b = rec("P1", "A1", "Approved", "Early", None);
        b.survey_date = "2025-06-01T17:30:00".into();
        b.line = 3;
        let mut c = rec("P1", "A1", "Approved", "Undated", None);
        c.survey_date = "sometime".into();
        c.line = 4;
        let out = classify(vec![a, b, c]);
        assert_eq!(out[0].kind, ConflictKind::PaymentConflict);
        let claim = out[0].earliest_claim.as_ref().unwrap();
        assert_eq!(claim.agent_name, "Early");
        assert_eq!(claim.line, 3);
        assert_eq!(claim.evidence_index, 1);
    }

    #[test]
    fn earliest_claim_position_without_source_lines() {
        let mut a = rec("P1", "A1", "Approved", "Bob", None);
        a.survey_date = "2025-05-09".into();
        let mut b = rec("P1", "A1", "Approved", "Alice", None);
        b.survey_date = "2025-05-01".into();
        let claim = earliest_claim([&a, &b]).unwrap();
        assert_eq!(claim.agent_name, "Alice");
        assert_eq!(claim.evidence_index, 1);

        // Identical keys keep the first row.
        let claim = earliest_claim([&a, &a.clone()]).unwrap();
        assert_eq!(claim.evidence_index, 0);
    }

    #[test]
    fn blank_addresses_sharing_a_timestamp_are_not_bulk() {
        let rows = (1..=4)
            .map(|i| {
                let mut r = rec(&format!("P{i}"), "", "Approved", "Alice", None);
                r.survey_date = "2025-05-01 08:00:00".into();
                r
            })
            .collect::<Vec<_>>();
        let index = PoleIndex::build(rows);
        let t = Thresholds::default();
        assert!(detect_bulk_anomalies(&index, &t).is_empty());
        assert!(classify_all(&index, &t).iter().all(|c| c.kind != ConflictKind::BulkAnomaly));
    }

    #[test]
    fn survey_date_formats() {
        assert!(parse_survey_date("2025-05-22T10:15:00+02:00").is_some());
        assert!(parse_survey_date("2025-05-22 10:15:00.123").is_some());
        assert!(parse_survey_date("2025/05/22 10:15").is_some());
        assert!(parse_survey_date("22/05/2025").is_some());
        assert!(parse_survey_date("").is_none());
        assert!(parse_survey_date("yesterday").is_none());
    }
}
