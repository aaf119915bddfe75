//! Data-Quality Anomaly Detection Library
//!
//! An ensemble of anomaly detectors over tabular data, built with Rust and Polars.
//!
//! # Overview
//!
//! Every run takes an immutable [`Dataset`] and a [`DetectionMode`] and returns an
//! [`AnomalyReport`]:
//!
//! - **Column detectors**: z-score/IQR numeric outliers and rare categories
//! - **Learned detector**: a gradient-boosted classifier trained on synthetic labels,
//!   with gain-based feature importance
//! - **Mutation rules** (`sql` mode only): insertion, deletion and update anomalies
//! - **Scoring**: confidence defaults, per-issue weights, a confidence floor and a
//!   stable severity ranking
//! - **Reporting**: summary statistics, quality score and recommendations
//!
//! A failing detector or rule never aborts the run; it is logged and recorded as a
//! [`Diagnostic`] in the report.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use datasentry_core::{AnomalyEnsemble, DetectionConfig, DetectionMode, ingest};
//!
//! let dataset = ingest::read_table_file("orders.csv")?;
//!
//! let config = DetectionConfig::builder()
//!     .contamination(0.05)
//!     .min_confidence(0.5)
//!     .build()?;
//!
//! let report = AnomalyEnsemble::new(config).detect(&dataset, DetectionMode::Sql);
//! println!("Quality score: {}", report.quality_metrics.quality_score);
//! println!("{}", serde_json::to_string_pretty(&report)?);
//! ```
//!
//! # Relationships
//!
//! Tables can also be checked against each other, or against themselves when they
//! hold a parent reference:
//!
//! ```rust,ignore
//! use datasentry_core::relationships::{Cardinality, analyze_relationship};
//!
//! let findings =
//!     analyze_relationship("orders", &orders, "payments", &payments, Cardinality::OneToOne)?;
//! let hierarchy =
//!     analyze_relationship("staff", &staff, "staff", &staff, Cardinality::OneToOne)?;
//! ```

pub mod config;
pub mod dataset;
pub mod detectors;
pub mod ensemble;
pub mod error;
pub mod inference;
pub mod ingest;
pub mod learned;
pub mod relationships;
pub mod reporting;
pub mod scoring;
pub mod types;
pub mod utils;

// Re-exports for convenient access
pub use config::{
    ConfigValidationError, DetectionConfig, DetectionConfigBuilder, DetectionMode, LearnedConfig,
};
pub use dataset::{ColumnData, ColumnKind, ColumnSchema, Dataset, Value};
pub use detectors::{Detector, DetectorOutput};
pub use ensemble::{AnomalyEnsemble, EnsembleRun, detect};
pub use error::{DetectionError, Result as DetectionResult, ResultExt};
pub use inference::InferredSchema;
pub use learned::LearnedPatternDetector;
pub use relationships::{
    Cardinality, RelationshipAnalysis, RelationshipSpec, TableLookup, analyze_relationship,
    analyze_relationships,
};
pub use reporting::{AnomalyReport, ReportGenerator};
pub use scoring::AnomalyScorer;
pub use types::{Diagnostic, FeatureImportance, Finding, Method, ScoredFinding};
