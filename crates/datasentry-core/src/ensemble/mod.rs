//! Ensemble orchestration.
//!
//! [`AnomalyEnsemble`] infers the schema once, runs every detector that the
//! mode selects in a fixed order, isolates failures per detector, then hands
//! the merged findings to the scorer and the report builder.
//!
//! | Detector     | `ml` | `sql` |
//! |--------------|------|-------|
//! | numeric      | yes  | yes   |
//! | categorical  | yes  | yes   |
//! | lightgbm     | yes  | yes   |
//! | insertion    |      | yes   |
//! | deletion     |      | yes   |
//! | update       |      | yes   |

use std::time::Instant;

use tracing::{info, warn};

use crate::config::{DetectionConfig, DetectionMode};
use crate::dataset::Dataset;
use crate::detectors::{
    CategoricalRarityDetector, DeletionDetector, Detector, InsertionDetector,
    NumericOutlierDetector, UpdateDetector,
};
use crate::error::Result;
use crate::inference::InferredSchema;
use crate::learned::LearnedPatternDetector;
use crate::reporting::{AnomalyReport, ReportGenerator};
use crate::scoring::AnomalyScorer;
use crate::types::{Diagnostic, FeatureImportance, Finding, ScoredFinding};

/// Report plus the full ranking it was built from.
#[derive(Debug, Clone, PartialEq)]
pub struct EnsembleRun {
    pub report: AnomalyReport,
    pub ranked: Vec<ScoredFinding>,
}

pub struct AnomalyEnsemble {
    config: DetectionConfig,
    column_detectors: Vec<Box<dyn Detector>>,
    mutation_detectors: Vec<Box<dyn Detector>>,
}

static_assertions::assert_impl_all!(AnomalyEnsemble: Send, Sync);

impl std::fmt::Debug for AnomalyEnsemble {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnomalyEnsemble")
            .field("config", &self.config)
            .field(
                "detectors",
                &self.detectors(DetectionMode::Sql).map(|d| d.name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl Default for AnomalyEnsemble {
    fn default() -> Self {
        Self::new(DetectionConfig::default())
    }
}

impl AnomalyEnsemble {
    pub fn new(config: DetectionConfig) -> Self {
        let column_detectors: Vec<Box<dyn Detector>> = vec![
            Box::new(NumericOutlierDetector::new(config.z_threshold)),
            Box::new(CategoricalRarityDetector::new(config.min_category_frequency)),
            Box::new(LearnedPatternDetector::new(config.learned.clone(), config.seed)),
        ];
        let mutation_detectors: Vec<Box<dyn Detector>> = vec![
            Box::new(InsertionDetector),
            Box::new(DeletionDetector),
            Box::new(UpdateDetector),
        ];
        Self {
            config,
            column_detectors,
            mutation_detectors,
        }
    }

    /// Validate the configuration before building the ensemble.
    pub fn try_new(config: DetectionConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::new(config))
    }

    pub fn config(&self) -> &DetectionConfig {
        &self.config
    }

    fn detectors(&self, mode: DetectionMode) -> impl Iterator<Item = &dyn Detector> {
        let mutation: &[Box<dyn Detector>] = if mode.runs_mutation_rules() {
            &self.mutation_detectors
        } else {
            &[]
        };
        self.column_detectors
            .iter()
            .chain(mutation.iter())
            .map(|d| d.as_ref())
    }

    /// Run the detectors selected by `mode` and build the report.
    pub fn detect(&self, dataset: &Dataset, mode: DetectionMode) -> AnomalyReport {
        self.run(dataset, mode).report
    }

    /// Like [`detect`](Self::detect), also returning every ranked finding.
    pub fn run(&self, dataset: &Dataset, mode: DetectionMode) -> EnsembleRun {
        let start = Instant::now();
        info!(
            rows = dataset.height(),
            columns = dataset.width(),
            mode = %mode,
            "Starting anomaly detection"
        );

        if dataset.is_empty() {
            info!("Dataset has no rows, nothing to detect");
            return EnsembleRun {
                report: ReportGenerator::build(dataset, mode, Vec::new(), Vec::new(), Vec::new()),
                ranked: Vec::new(),
            };
        }

        let schema = InferredSchema::infer(dataset)
            .with_duplicate_subset(self.config.duplicate_subset.clone());

        let mut findings: Vec<Finding> = Vec::new();
        let mut feature_importance: Vec<FeatureImportance> = Vec::new();
        let mut diagnostics: Vec<Diagnostic> = Vec::new();

        for detector in self.detectors(mode) {
            match detector.detect(dataset, &schema) {
                Ok(output) => {
                    info!(
                        detector = detector.name(),
                        findings = output.findings.len(),
                        "Detector finished"
                    );
                    findings.extend(output.findings);
                    if !output.feature_importance.is_empty() {
                        feature_importance = output.feature_importance;
                    }
                    diagnostics.extend(output.diagnostics);
                }
                Err(e) => {
                    warn!(detector = detector.name(), error = %e, "Detector failed, skipping");
                    diagnostics.push(Diagnostic::from_error(detector.name(), None, &e));
                }
            }
        }

        let ranked = AnomalyScorer::new(self.config.min_confidence).score(findings);
        let report = ReportGenerator::build(
            dataset,
            mode,
            ranked.clone(),
            feature_importance,
            diagnostics,
        );

        info!(
            anomalies = report.anomaly_event_count,
            quality_score = report.quality_metrics.quality_score,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Anomaly detection complete"
        );

        EnsembleRun { report, ranked }
    }
}

/// Run the ensemble with the default configuration and the given contamination.
pub fn detect(dataset: &Dataset, mode: DetectionMode, contamination: f64) -> Result<AnomalyReport> {
    let config = DetectionConfig::builder().contamination(contamination).build()?;
    Ok(AnomalyEnsemble::new(config).detect(dataset, mode))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::Value;
    use crate::types::Method;
    use pretty_assertions::assert_eq;

    fn small_table() -> Dataset {
        let rows = (1..=9)
            .map(|i| vec![Value::Int(i), Value::Str(format!("name{i}"))])
            .chain(std::iter::once(vec![Value::Int(1000), Value::Str("name9".to_string())]))
            .collect();
        Dataset::from_rows(&["amount", "label"], rows).unwrap()
    }

    #[test]
    fn test_empty_dataset_report() {
        let report = AnomalyEnsemble::default().detect(&Dataset::default(), DetectionMode::Sql);
        assert_eq!(report.quality_metrics.quality_score, 100.0);
        assert_eq!(report.anomaly_event_count, 0);
        assert!(report.diagnostics.is_empty());
    }

    #[test]
    fn test_learned_failure_is_isolated() {
        // ten rows give one positive label, too few for a stratified split
        let run = AnomalyEnsemble::default().run(&small_table(), DetectionMode::Ml);
        assert!(
            run.report
                .diagnostics
                .iter()
                .any(|d| d.detector == "lightgbm" && d.code == "DEGENERATE_LABELS")
        );
        assert!(run.ranked.iter().any(|f| f.row_index == 9 && f.method == Method::Numeric));
    }

    #[test]
    fn test_ml_mode_skips_mutation_detectors() {
        let run = AnomalyEnsemble::default().run(&small_table(), DetectionMode::Ml);
        assert!(run.ranked.iter().all(|f| !f.method.is_mutation_family()));
    }

    #[test]
    fn test_detector_order() {
        let ensemble = AnomalyEnsemble::default();
        let names: Vec<&str> = ensemble.detectors(DetectionMode::Sql).map(|d| d.name()).collect();
        assert_eq!(
            names,
            vec!["numeric", "categorical", "lightgbm", "insertion", "deletion", "update"]
        );
        assert_eq!(ensemble.detectors(DetectionMode::Ml).count(), 3);
    }

    #[test]
    fn test_detect_rejects_bad_contamination() {
        assert!(detect(&small_table(), DetectionMode::Sql, 1.5).is_err());
    }

    #[test]
    fn test_duplicate_subset_from_config() {
        let config = DetectionConfig::builder()
            .duplicate_subset(["label"])
            .build()
            .unwrap();
        let run = AnomalyEnsemble::try_new(config).unwrap().run(&small_table(), DetectionMode::Sql);

        // rows 8 and 9 share "name9" but differ on amount
        let duplicates: Vec<usize> = run
            .ranked
            .iter()
            .filter(|f| f.issue_type == crate::types::issue::DUPLICATE_RECORD)
            .map(|f| f.row_index)
            .collect();
        assert_eq!(duplicates, vec![8, 9]);
    }

    #[test]
    fn test_unknown_duplicate_column_is_diagnosed() {
        let config = DetectionConfig::builder()
            .duplicate_subset(["ghost"])
            .build()
            .unwrap();
        let run = AnomalyEnsemble::try_new(config).unwrap().run(&small_table(), DetectionMode::Sql);
        assert!(run.report.diagnostics.iter().any(|d| {
            d.detector == "insertion"
                && d.rule.as_deref() == Some("duplicate_records")
                && d.code == "COLUMN_NOT_FOUND"
        }));
    }
}
