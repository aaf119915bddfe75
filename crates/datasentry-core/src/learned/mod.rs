//! Learned pattern detection.
//!
//! There is no ground truth for anomalies, so the detector synthesizes it:
//! a seeded draw marks `floor(contamination × rows)` rows as positive, a
//! stratified split keeps the class balance in the training portion, and a
//! gradient-boosted classifier is fit with class-imbalance weighting. Every
//! row is then scored; rows whose probability clears the threshold are
//! reported as `complex_pattern_anomaly`, and the model's per-feature split
//! gain is exposed as feature importance.
//!
//! # Example
//!
//! ```rust,ignore
//! use datasentry_core::learned::LearnedPatternDetector;
//!
//! let detector = LearnedPatternDetector::new(config.learned.clone(), config.seed);
//! let model = detector.train(&dataset)?;
//! let scored = detector.score(&model, &dataset)?;
//! println!("{} rows flagged", scored.findings.len());
//! ```

pub mod encoding;
pub mod gbdt;

pub use encoding::FeatureEncoder;
pub use gbdt::{Booster, BoosterParams};

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use tracing::{debug, info};

use crate::config::LearnedConfig;
use crate::dataset::Dataset;
use crate::detectors::{Detector, DetectorOutput};
use crate::error::{DetectionError, Result};
use crate::inference::InferredSchema;
use crate::types::{FeatureImportance, Finding, Method, issue};

/// Each class needs at least this many rows for the stratified split.
pub const MIN_CLASS_MEMBERS: usize = 2;

/// Model and encoding produced by [`LearnedPatternDetector::train`].
#[derive(Debug, Clone)]
pub struct TrainedModel {
    encoder: FeatureEncoder,
    booster: Booster,
}

impl TrainedModel {
    /// Gain importance per feature, highest first.
    pub fn feature_importance(&self) -> Vec<FeatureImportance> {
        let mut records: Vec<FeatureImportance> = self
            .encoder
            .feature_names()
            .into_iter()
            .zip(self.booster.feature_gain())
            .map(|(name, &gain)| FeatureImportance {
                feature: name.to_string(),
                importance: gain,
            })
            .collect();
        records.sort_by(|a, b| b.importance.total_cmp(&a.importance));
        records
    }

    pub fn booster(&self) -> &Booster {
        &self.booster
    }
}

/// Output of [`LearnedPatternDetector::score`].
#[derive(Debug, Clone)]
pub struct ScoredRows {
    pub findings: Vec<Finding>,
    pub probabilities: Vec<f64>,
}

#[derive(Debug, Clone)]
pub struct LearnedPatternDetector {
    config: LearnedConfig,
    seed: u64,
}

impl LearnedPatternDetector {
    pub fn new(config: LearnedConfig, seed: u64) -> Self {
        Self { config, seed }
    }

    pub fn train(&self, dataset: &Dataset) -> Result<TrainedModel> {
        if dataset.width() == 0 {
            return Err(DetectionError::insufficient("lightgbm", "dataset has no columns"));
        }

        let encoder = FeatureEncoder::fit(dataset);
        let features = encoder.transform(dataset)?;

        let mut rng = StdRng::seed_from_u64(self.seed);
        let labels = synthesize_labels(dataset.height(), self.config.contamination, &mut rng);
        let (train_rows, test_rows) =
            stratified_split(&labels, self.config.test_fraction, &mut rng)?;
        debug!(
            train = train_rows.len(),
            test = test_rows.len(),
            "Stratified split for learned detector"
        );

        let train_features: Vec<Vec<f64>> = features
            .iter()
            .map(|column| train_rows.iter().map(|&r| column[r]).collect())
            .collect();
        let train_labels: Vec<f64> = train_rows.iter().map(|&r| labels[r]).collect();

        let params = BoosterParams::from_config(&self.config, self.seed);
        let booster = Booster::train(&train_features, &train_labels, &params)?;

        Ok(TrainedModel { encoder, booster })
    }

    pub fn score(&self, model: &TrainedModel, dataset: &Dataset) -> Result<ScoredRows> {
        let features = model.encoder.transform(dataset)?;
        let probabilities: Vec<f64> = (0..dataset.height())
            .map(|row| model.booster.predict_proba(&features, row))
            .collect();

        let findings = probabilities
            .iter()
            .enumerate()
            .filter(|&(_, &p)| p > self.config.threshold)
            .map(|(row, &p)| {
                Finding::new(row, issue::COMPLEX_PATTERN_ANOMALY, Method::Lightgbm)
                    .value(format!("{p:.4}"))
                    .details(format!(
                        "Anomaly probability {p:.4} above {}",
                        self.config.threshold
                    ))
                    .confidence(p)
            })
            .collect();

        Ok(ScoredRows {
            findings,
            probabilities,
        })
    }
}

impl Detector for LearnedPatternDetector {
    fn name(&self) -> &'static str {
        "lightgbm"
    }

    fn method(&self) -> Method {
        Method::Lightgbm
    }

    fn detect(&self, dataset: &Dataset, _schema: &InferredSchema) -> Result<DetectorOutput> {
        let model = self.train(dataset)?;
        let scored = self.score(&model, dataset)?;
        info!(
            trees = model.booster.num_trees(),
            flagged = scored.findings.len(),
            "Learned pattern detector finished"
        );
        Ok(DetectorOutput {
            findings: scored.findings,
            feature_importance: model.feature_importance(),
            diagnostics: Vec::new(),
        })
    }
}

/// Mark `floor(contamination × n)` randomly chosen rows as positive.
pub fn synthesize_labels(n: usize, contamination: f64, rng: &mut StdRng) -> Vec<f64> {
    let positives = ((contamination * n as f64) as usize).min(n);
    let rows: Vec<usize> = (0..n).collect();
    let mut labels = vec![0.0; n];
    for &row in rows.choose_multiple(rng, positives) {
        labels[row] = 1.0;
    }
    labels
}

/// Split row indices into train and test, preserving class proportions.
///
/// Returns sorted `(train, test)` indices.
pub fn stratified_split(
    labels: &[f64],
    test_fraction: f64,
    rng: &mut StdRng,
) -> Result<(Vec<usize>, Vec<usize>)> {
    let (mut positives, mut negatives): (Vec<usize>, Vec<usize>) =
        (0..labels.len()).partition(|&i| labels[i] > 0.5);

    if positives.len() < MIN_CLASS_MEMBERS || negatives.len() < MIN_CLASS_MEMBERS {
        return Err(DetectionError::DegenerateLabels(format!(
            "need at least {MIN_CLASS_MEMBERS} rows per class, got {} positive and {} negative",
            positives.len(),
            negatives.len()
        )));
    }

    let mut train = Vec::with_capacity(labels.len());
    let mut test = Vec::new();
    for class in [&mut negatives, &mut positives] {
        class.shuffle(rng);
        let n_test =
            ((class.len() as f64 * test_fraction).round() as usize).clamp(1, class.len() - 1);
        test.extend_from_slice(&class[..n_test]);
        train.extend_from_slice(&class[n_test..]);
    }
    train.sort_unstable();
    test.sort_unstable();
    Ok((train, test))
}

#[cfg(test)]
mod tests {
    use super::*;
    use polars::prelude::*;

    fn synthetic(n: usize) -> Dataset {
        let amount: Vec<f64> = (0..n).map(|i| ((i * 37) % 101) as f64).collect();
        let qty: Vec<i64> = (0..n).map(|i| (i % 13) as i64).collect();
        let region: Vec<&str> = (0..n)
            .map(|i| ["north", "south", "east", "west"][i % 4])
            .collect();
        Dataset::from_frame(&df!["amount" => amount, "qty" => qty, "region" => region].unwrap())
            .unwrap()
    }

    #[test]
    fn test_synthesize_labels_count() {
        let mut rng = StdRng::seed_from_u64(42);
        let labels = synthesize_labels(95, 0.1, &mut rng);
        assert_eq!(labels.iter().filter(|&&y| y == 1.0).count(), 9);
    }

    #[test]
    fn test_stratified_split_keeps_classes() {
        let mut rng = StdRng::seed_from_u64(42);
        let labels = synthesize_labels(100, 0.1, &mut rng);
        let (train, test) = stratified_split(&labels, 0.2, &mut rng).unwrap();
        assert_eq!(train.len() + test.len(), 100);
        assert_eq!(test.iter().filter(|&&r| labels[r] == 1.0).count(), 2);
        assert_eq!(test.len(), 20);
    }

    #[test]
    fn test_stratified_split_rejects_tiny_class() {
        let labels = vec![0.0, 0.0, 0.0, 1.0];
        let mut rng = StdRng::seed_from_u64(1);
        assert!(matches!(
            stratified_split(&labels, 0.2, &mut rng),
            Err(DetectionError::DegenerateLabels(_))
        ));
    }

    #[test]
    fn test_detect_is_reproducible() {
        let ds = synthetic(300);
        let schema = InferredSchema::infer(&ds);
        let detector = LearnedPatternDetector::new(LearnedConfig::default(), 42);

        let a = detector.detect(&ds, &schema).unwrap();
        let b = detector.detect(&ds, &schema).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.feature_importance.len(), 3);
        assert!(
            a.feature_importance
                .windows(2)
                .all(|w| w[0].importance >= w[1].importance)
        );
        assert!(a.findings.iter().all(|f| f.confidence.unwrap() > 0.5));
    }

    #[test]
    fn test_too_few_rows_is_an_error() {
        let ds = synthetic(12);
        let detector = LearnedPatternDetector::new(LearnedConfig::default(), 42);
        assert!(detector.train(&ds).is_err());
    }
}
