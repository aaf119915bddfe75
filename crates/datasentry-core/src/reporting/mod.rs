//! Report generation module.
//!
//! Turns ranked findings into an [`AnomalyReport`] suitable for:
//! - JSON output to stdout (`--json` CLI flag)
//! - JSON file output (`--emit-report` CLI flag)
//! - HTTP responses, via [`AnomalyReport::formatted_summary`] for the
//!   plain-text rendering
//!
//! # Example
//!
//! ```rust,ignore
//! use datasentry_core::reporting::ReportGenerator;
//!
//! let report = ReportGenerator::build(&dataset, mode, ranked, importance, diagnostics);
//! println!("{}", serde_json::to_string_pretty(&report)?);
//!
//! let generator = ReportGenerator::new(PathBuf::from("output"));
//! generator.write_report_to_file(&report, "orders")?;
//! ```

mod generator;

pub use generator::{
    AnomalyReport, AnomalySummary, ConfidenceRange, DatasetInfo, IssueCount, QualityMetrics,
    ReportGenerator, TOP_ANOMALIES, TOP_FEATURES, TOP_ISSUES, recommendations,
};
