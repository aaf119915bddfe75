//! Integration tests for the anomaly-detection ensemble.
//!
//! These tests run the full pipeline over the CSV and Excel fixtures in
//! `tests/fixtures`.

use datasentry_core::{
    AnomalyEnsemble, Cardinality, Dataset, DetectionConfig, DetectionMode, Method,
    RelationshipSpec, analyze_relationship, analyze_relationships, detect, ingest,
};
use datasentry_core::types::issue;
use pretty_assertions::assert_eq;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

// ============================================================================
// Helper Functions
// ============================================================================

fn fixtures_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures")
}

fn load(filename: &str) -> Dataset {
    ingest::read_table_file(fixtures_path().join(filename)).expect("Failed to read fixture")
}

// ============================================================================
// Ensemble Properties
// ============================================================================

#[test]
fn test_detect_is_deterministic() {
    let ds = load("orders.csv");
    let first = detect(&ds, DetectionMode::Sql, 0.1).unwrap();
    let second = detect(&ds, DetectionMode::Sql, 0.1).unwrap();
    assert_eq!(first, second);
    assert_eq!(
        serde_json::to_string(&first).unwrap(),
        serde_json::to_string(&second).unwrap()
    );
}

#[test]
fn test_quality_score_bounds() {
    for mode in [DetectionMode::Sql, DetectionMode::Ml] {
        let report = detect(&load("orders.csv"), mode, 0.1).unwrap();
        let quality = report.quality_metrics.quality_score;
        assert!((0.0..=100.0).contains(&quality), "quality {quality} out of range");
    }

    let empty = detect(&Dataset::default(), DetectionMode::Sql, 0.1).unwrap();
    assert_eq!(empty.quality_metrics.quality_score, 100.0);
    assert_eq!(empty.anomaly_summary.total_anomalies, 0);
}

#[test]
fn test_confidence_floor_and_ranking() {
    let config = DetectionConfig::builder().min_confidence(0.75).build().unwrap();
    let run = AnomalyEnsemble::new(config).run(&load("orders.csv"), DetectionMode::Sql);

    assert!(!run.ranked.is_empty());
    assert!(run.ranked.iter().all(|f| f.confidence >= 0.75));
    assert!(
        run.ranked
            .windows(2)
            .all(|w| w[0].severity_score >= w[1].severity_score)
    );
    assert!(
        run.ranked
            .iter()
            .all(|f| (0.0..=1.0).contains(&f.severity_score))
    );
}

#[test]
fn test_ml_mode_has_no_mutation_findings() {
    let run = AnomalyEnsemble::default().run(&load("orders.csv"), DetectionMode::Ml);
    assert!(run.ranked.iter().all(|f| !f.method.is_mutation_family()));
    assert!(!run.report.method_breakdown.contains_key(&Method::Insertion));
}

#[test]
fn test_null_markers_behave_like_missing_cells() {
    let clean = load("orders.csv");
    let marked = load("orders_null_markers.csv");
    assert_eq!(clean, marked);

    let a = detect(&clean, DetectionMode::Sql, 0.1).unwrap();
    let b = detect(&marked, DetectionMode::Sql, 0.1).unwrap();
    assert_eq!(a, b);
}

#[test]
fn test_excel_workbook_runs_through_pipeline() {
    let ds = load("inventory.xlsx");
    let report = detect(&ds, DetectionMode::Sql, 0.1).unwrap();

    assert_eq!(report.dataset_info.total_rows, 4);
    assert_eq!(report.dataset_info.total_columns, 5);
    assert!((0.0..=100.0).contains(&report.quality_metrics.quality_score));
}

#[test]
fn test_orders_injected_anomalies() {
    let run = AnomalyEnsemble::default().run(&load("orders.csv"), DetectionMode::Sql);
    let has = |row: usize, issue_type: &str| {
        run.ranked
            .iter()
            .any(|f| f.row_index == row && f.issue_type == issue_type)
    };

    assert!(has(57, issue::NUMERIC_OUTLIER));
    assert!(has(120, issue::RARE_CATEGORY));
    assert!(has(33, issue::INVALID_FOREIGN_KEY));
    assert!(has(10, issue::DUPLICATE_RECORD));
    assert!(has(200, issue::DUPLICATE_RECORD));

    let report = &run.report;
    assert_eq!(report.dataset_info.total_rows, 201);
    assert_eq!(report.dataset_info.total_columns, 6);
    assert!(report.top_anomalies.len() <= 10);
    assert!(report.feature_importance.len() <= 10);
    assert!(!report.recommendations.is_empty());
    assert_eq!(report.anomaly_event_count, report.anomaly_summary.total_anomalies);
}

// ============================================================================
// Reference Scenarios
// ============================================================================

#[test]
fn test_single_extreme_value_is_an_outlier() {
    let report = detect(&load("small_outlier.csv"), DetectionMode::Ml, 0.1).unwrap();
    let outliers: Vec<_> = report
        .top_anomalies
        .iter()
        .filter(|f| f.issue_type == issue::NUMERIC_OUTLIER)
        .collect();
    assert_eq!(outliers.len(), 1);
    assert_eq!(outliers[0].row_index, 9);
    assert_eq!(outliers[0].value, "1000");
}

#[test]
fn test_identical_rows_are_duplicates() {
    let csv = b"a,b\n1,x\n1,x\n2,y\n";
    let ds = ingest::read_table("dupes.csv", csv).unwrap();
    let run = AnomalyEnsemble::default().run(&ds, DetectionMode::Sql);

    let duplicates: Vec<_> = run
        .ranked
        .iter()
        .filter(|f| f.issue_type == issue::DUPLICATE_RECORD)
        .collect();
    assert_eq!(duplicates.len(), 2);
    assert!(duplicates.iter().all(|f| f.confidence == 1.0));
    let mut rows: Vec<usize> = duplicates.iter().map(|f| f.row_index).collect();
    rows.sort_unstable();
    assert_eq!(rows, vec![0, 1]);
}

#[test]
fn test_one_to_one_violation_on_shared_order_id() {
    let payments = load("payments.csv");
    let orders = load("payment_orders.csv");
    let findings =
        analyze_relationship("payments", &payments, "orders", &orders, Cardinality::OneToOne)
            .unwrap();

    let violations: Vec<_> = findings
        .iter()
        .filter(|f| f.issue_type == issue::CARDINALITY_VIOLATION)
        .collect();
    assert_eq!(violations.len(), 2);
    assert!(violations.iter().all(|f| f.table.as_deref() == Some("payments")));
    assert_eq!(
        violations.iter().map(|f| f.row_index).collect::<Vec<_>>(),
        vec![4, 20]
    );
}

#[test]
fn test_two_row_cycle_is_circular() {
    let employees = load("employees.csv");
    let findings = analyze_relationship(
        "employees",
        &employees,
        "employees",
        &employees,
        Cardinality::OneToOne,
    )
    .unwrap();

    let circular: Vec<usize> = findings
        .iter()
        .filter(|f| f.issue_type == issue::CIRCULAR_REFERENCE)
        .map(|f| f.row_index)
        .collect();
    assert_eq!(circular, vec![0, 1]);

    let orphans: Vec<usize> = findings
        .iter()
        .filter(|f| f.issue_type == issue::ORPHANED_REFERENCE)
        .map(|f| f.row_index)
        .collect();
    assert_eq!(orphans, vec![4]);
}

#[test]
fn test_relationship_batch_over_registry() {
    let mut tables: HashMap<String, Arc<Dataset>> = HashMap::new();
    tables.insert("payments".to_string(), Arc::new(load("payments.csv")));
    tables.insert("orders".to_string(), Arc::new(load("payment_orders.csv")));
    tables.insert("employees".to_string(), Arc::new(load("employees.csv")));

    let specs = vec![
        RelationshipSpec::new("payments", "orders", Cardinality::OneToOne),
        RelationshipSpec::new("orders", "payments", Cardinality::OneToOne),
        RelationshipSpec::new("employees", "employees", Cardinality::OneToOne),
        RelationshipSpec::new("payments", "missing", Cardinality::OneToMany),
    ];
    let analysis = analyze_relationships(&tables, &specs);

    assert_eq!(analysis.pairs_analyzed, 2);
    assert_eq!(analysis.diagnostics.len(), 1);
    assert_eq!(analysis.diagnostics[0].code, "TABLE_NOT_FOUND");
    assert!(
        analysis
            .findings
            .iter()
            .all(|f| f.method == Method::Relationship && f.table.is_some())
    );
}

// ============================================================================
// Report Output
// ============================================================================

#[test]
fn test_report_json_has_expected_sections() {
    let report = detect(&load("orders.csv"), DetectionMode::Sql, 0.1).unwrap();
    let json = serde_json::to_value(&report).unwrap();

    for key in [
        "mode",
        "dataset_info",
        "anomaly_summary",
        "quality_metrics",
        "top_anomalies",
        "feature_importance",
        "unique_rows_flagged",
        "anomaly_event_count",
        "method_breakdown",
        "recommendations",
    ] {
        assert!(json.get(key).is_some(), "missing {key}");
    }
    assert_eq!(json["mode"], "sql");
    assert!(report.formatted_summary().contains("ANOMALY DETECTION REPORT"));
}
