use tracing::debug;

use crate::types::{Finding, ScoredFinding, issue};

/// Confidence assumed for findings emitted without one.
pub const DEFAULT_CONFIDENCE: f64 = 1.0;

/// Weight of issue types missing from the table.
pub const DEFAULT_WEIGHT: f64 = 0.5;

/// Severity weight of an issue type.
pub fn method_weight(issue_type: &str) -> f64 {
    match issue_type {
        issue::COMPLEX_PATTERN_ANOMALY => 1.0,
        issue::NUMERIC_OUTLIER => 0.8,
        issue::RARE_CATEGORY => 0.6,
        issue::DUPLICATE_RECORD => 1.0,
        issue::MISSING_REQUIRED_FIELD => 0.9,
        issue::INVALID_FOREIGN_KEY => 0.8,
        issue::POTENTIAL_ORPHANED_RECORD => 0.7,
        issue::REFERENTIAL_INTEGRITY_VIOLATION => 1.0,
        issue::POTENTIAL_ACCIDENTAL_DELETION => 0.7,
        issue::INCONSISTENT_UPDATE => 0.9,
        issue::PARTIAL_UPDATE => 0.7,
        issue::DATA_TYPE_VIOLATION => 0.9,
        issue::CIRCULAR_REFERENCE => 1.0,
        issue::ORPHANED_REFERENCE => 0.8,
        issue::EXCESSIVE_HIERARCHY_DEPTH => 0.6,
        issue::CARDINALITY_VIOLATION => 0.9,
        issue::REFERENTIAL_VIOLATION => 0.9,
        issue::UNREFERENCED_KEYS => 0.5,
        _ => DEFAULT_WEIGHT,
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnomalyScorer {
    min_confidence: f64,
}

impl Default for AnomalyScorer {
    fn default() -> Self {
        Self::new(0.3)
    }
}

impl AnomalyScorer {
    pub fn new(min_confidence: f64) -> Self {
        Self { min_confidence }
    }

    /// Normalize, filter and rank findings.
    ///
    /// The sort is stable, so findings with equal severity keep the order
    /// the detectors produced them in.
    pub fn score(&self, findings: Vec<Finding>) -> Vec<ScoredFinding> {
        let total = findings.len();
        let mut scored: Vec<ScoredFinding> = findings
            .into_iter()
            .map(Self::normalize)
            .filter(|f| f.confidence >= self.min_confidence)
            .collect();
        scored.sort_by(|a, b| b.severity_score.total_cmp(&a.severity_score));

        debug!(
            total,
            kept = scored.len(),
            min_confidence = self.min_confidence,
            "Scored findings"
        );
        scored
    }

    /// Fill in the confidence and attach the issue weight.
    pub fn normalize(finding: Finding) -> ScoredFinding {
        let confidence = match finding.confidence {
            Some(c) if c.is_nan() => 0.0,
            Some(c) => c.clamp(0.0, 1.0),
            None => DEFAULT_CONFIDENCE,
        };
        let weight = method_weight(&finding.issue_type);
        ScoredFinding::from_finding(finding, confidence, weight)
    }
}
