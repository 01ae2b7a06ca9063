// Property-based tests for the distance evaluator and classifier totals.
// CI: 256 cases (default). Soak: PROPTEST_CASES=10000 cargo test --release

use proptest::prelude::*;

use polecheck::config::AnalysisConfig;
use polecheck::geo::{haversine_m, max_pairwise_distance, GeoPoint, EARTH_RADIUS_M};
use polecheck::{run, PermissionRecord};

fn config() -> ProptestConfig {
    ProptestConfig {
        cases: std::env::var("PROPTEST_CASES")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(256),
        failure_persistence: None,
        ..ProptestConfig::default()
    }
}

fn arb_point() -> impl Strategy<Value = GeoPoint> {
    (-90.0..=90.0f64, -180.0..=180.0f64).prop_map(|(lat, lon)| GeoPoint::new(lat, lon))
}

fn arb_row() -> impl Strategy<Value = PermissionRecord> {
    (
        prop_oneof![Just(String::new()), "P[0-4]"],
        prop_oneof![Just(String::new()), "A[0-3]"],
        prop_oneof![
            Just("Pole Permission: Approved".to_string()),
            Just("Pole Permission: Pending".to_string()),
            Just("Home Sign Ups: Declined".to_string()),
        ],
        prop_oneof![Just(String::new()), "(Alice|Bob|Carol)"],
        prop_oneof![Just(String::new()), Just("2025-05-01 08:00:00".to_string())],
    )
        .prop_map(|(pole, address, status, agent, date)| PermissionRecord {
            line: 0,
            property_id: String::new(),
            pole_number: pole,
            status,
            agent_name: agent,
            address,
            latitude: None,
            longitude: None,
            survey_date: date,
        })
}

proptest! {
    #![proptest_config(config())]

    #[test]
    fn distance_is_symmetric(a in arb_point(), b in arb_point()) {
        let ab = haversine_m(a, b);
        let ba = haversine_m(b, a);
        prop_assert!((ab - ba).abs() < 1e-6, "{ab} vs {ba}");
    }

    #[test]
    fn distance_to_self_is_zero(a in arb_point()) {
        prop_assert_eq!(haversine_m(a, a), 0.0);
    }

    #[test]
    fn distance_is_bounded(a in arb_point(), b in arb_point()) {
        let d = haversine_m(a, b);
        prop_assert!(d >= 0.0);
        prop_assert!(d <= std::f64::consts::PI * EARTH_RADIUS_M + 1e-6);
    }

    #[test]
    fn spread_covers_every_pair(points in prop::collection::vec(arb_point(), 1..6)) {
        let spread = max_pairwise_distance(&points).unwrap();
        for a in &points {
            for b in &points {
                prop_assert!(haversine_m(*a, *b) <= spread + 1e-6);
            }
        }
    }

    #[test]
    fn one_record_per_pole(rows in prop::collection::vec(arb_row(), 0..40)) {
        let mut poles: Vec<String> = rows
            .iter()
            .filter(|r| !r.pole_number.is_empty())
            .map(|r| r.pole_number.clone())
            .collect();
        poles.sort();
        poles.dedup();

        let result = run(rows, &AnalysisConfig::default());
        let mut seen: Vec<String> = result.conflicts.iter().map(|c| c.pole_number.clone()).collect();
        seen.sort();
        prop_assert_eq!(seen, poles);

        let kinds: usize = result.summary.by_kind.values().sum();
        let risks: usize = result.summary.by_risk.values().sum();
        prop_assert_eq!(kinds, result.summary.total_poles);
        prop_assert_eq!(risks, result.summary.total_poles);
    }
}
