use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

/// Issue type names emitted by the detectors.
pub mod issue {
    pub const NUMERIC_OUTLIER: &str = "numeric_outlier";
    pub const RARE_CATEGORY: &str = "rare_category";
    pub const COMPLEX_PATTERN_ANOMALY: &str = "complex_pattern_anomaly";
    pub const FEATURE_IMPORTANCE: &str = "feature_importance";

    pub const DUPLICATE_RECORD: &str = "duplicate_record";
    pub const MISSING_REQUIRED_FIELD: &str = "missing_required_field";
    pub const INVALID_FOREIGN_KEY: &str = "invalid_foreign_key";

    pub const POTENTIAL_ORPHANED_RECORD: &str = "potential_orphaned_record";
    pub const REFERENTIAL_INTEGRITY_VIOLATION: &str = "referential_integrity_violation";
    pub const POTENTIAL_ACCIDENTAL_DELETION: &str = "potential_accidental_deletion";

    pub const INCONSISTENT_UPDATE: &str = "inconsistent_update";
    pub const PARTIAL_UPDATE: &str = "partial_update";
    pub const DATA_TYPE_VIOLATION: &str = "data_type_violation";

    pub const CIRCULAR_REFERENCE: &str = "circular_reference";
    pub const ORPHANED_REFERENCE: &str = "orphaned_reference";
    pub const EXCESSIVE_HIERARCHY_DEPTH: &str = "excessive_hierarchy_depth";
    pub const CARDINALITY_VIOLATION: &str = "cardinality_violation";
    pub const REFERENTIAL_VIOLATION: &str = "referential_violation";
    pub const UNREFERENCED_KEYS: &str = "unreferenced_keys";
}

/// Detector family that produced a finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Method {
    Numeric,
    Categorical,
    Lightgbm,
    Insertion,
    Deletion,
    Update,
    Relationship,
}

impl Method {
    pub fn as_str(self) -> &'static str {
        match self {
            Method::Numeric => "numeric",
            Method::Categorical => "categorical",
            Method::Lightgbm => "lightgbm",
            Method::Insertion => "insertion",
            Method::Deletion => "deletion",
            Method::Update => "update",
            Method::Relationship => "relationship",
        }
    }

    /// Whether findings of this method come from a mutation rule family.
    pub fn is_mutation_family(self) -> bool {
        matches!(self, Method::Insertion | Method::Deletion | Method::Update)
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One observation that a row (or row/column pair) looks anomalous.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    pub row_index: usize,
    pub issue_type: String,
    pub method: Method,
    pub value: String,
    pub details: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,
    /// Left unset when the detector has no opinion; the scorer fills it in.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

impl Finding {
    pub fn new(row_index: usize, issue_type: &str, method: Method) -> Self {
        Self {
            row_index,
            issue_type: issue_type.to_string(),
            method,
            value: String::new(),
            details: String::new(),
            column: None,
            table: None,
            confidence: None,
        }
    }

    pub fn value(mut self, value: impl Into<String>) -> Self {
        self.value = value.into();
        self
    }

    pub fn details(mut self, details: impl Into<String>) -> Self {
        self.details = details.into();
        self
    }

    pub fn column(mut self, column: impl Into<String>) -> Self {
        self.column = Some(column.into());
        self
    }

    pub fn table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    pub fn confidence(mut self, confidence: f64) -> Self {
        self.confidence = Some(confidence);
        self
    }
}

/// A finding after normalization by the scorer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredFinding {
    pub row_index: usize,
    pub issue_type: String,
    pub method: Method,
    pub value: String,
    pub details: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,
    #[serde(serialize_with = "finite_or_null")]
    pub confidence: f64,
    #[serde(serialize_with = "finite_or_null")]
    pub method_weight: f64,
    #[serde(serialize_with = "finite_or_null")]
    pub severity_score: f64,
}

impl ScoredFinding {
    pub fn from_finding(finding: Finding, confidence: f64, method_weight: f64) -> Self {
        Self {
            row_index: finding.row_index,
            issue_type: finding.issue_type,
            method: finding.method,
            value: finding.value,
            details: finding.details,
            column: finding.column,
            table: finding.table,
            confidence,
            method_weight,
            severity_score: confidence * method_weight,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureImportance {
    pub feature: String,
    #[serde(serialize_with = "finite_or_null")]
    pub importance: f64,
}

/// Record of a detector or rule that failed and was skipped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub detector: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rule: Option<String>,
    pub code: String,
    pub message: String,
}

impl Diagnostic {
    pub fn from_error(
        detector: impl Into<String>,
        rule: Option<&str>,
        error: &crate::error::DetectionError,
    ) -> Self {
        Self {
            detector: detector.into(),
            rule: rule.map(str::to_string),
            code: error.error_code().to_string(),
            message: error.to_string(),
        }
    }
}

/// Serialize an `f64`, writing `null` for NaN and infinities.
pub fn finite_or_null<S>(value: &f64, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    if value.is_finite() {
        serializer.serialize_f64(*value)
    } else {
        serializer.serialize_none()
    }
}

/// Round to two decimals for report output.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_finding_builder() {
        let finding = Finding::new(3, issue::NUMERIC_OUTLIER, Method::Numeric)
            .value("1000")
            .column("amount")
            .details("z-score 4.1");
        assert_eq!(finding.row_index, 3);
        assert_eq!(finding.issue_type, "numeric_outlier");
        assert_eq!(finding.column.as_deref(), Some("amount"));
        assert!(finding.confidence.is_none());
    }

    #[test]
    fn test_scored_finding_severity() {
        let finding = Finding::new(0, issue::RARE_CATEGORY, Method::Categorical);
        let scored = ScoredFinding::from_finding(finding, 0.5, 0.6);
        assert!((scored.severity_score - 0.3).abs() < 1e-12);
    }

    #[test]
    fn test_non_finite_serializes_as_null() {
        let record = FeatureImportance {
            feature: "x".to_string(),
            importance: f64::NAN,
        };
        let json = serde_json::to_value(&record).unwrap();
        assert!(json["importance"].is_null());
    }

    #[test]
    fn test_method_serialization() {
        let json = serde_json::to_string(&Method::Lightgbm).unwrap();
        assert_eq!(json, "\"lightgbm\"");
        assert!(Method::Update.is_mutation_family());
        assert!(!Method::Numeric.is_mutation_family());
    }

    #[test]
    fn test_round2() {
        assert_eq!(round2(12.3456), 12.35);
        assert_eq!(round2(100.0), 100.0);
    }
}
