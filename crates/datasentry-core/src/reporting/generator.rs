use polars::prelude::*;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt::Write as _;
use std::fs::{self, File};
use std::io::Write;
use std::path::PathBuf;
use tracing::info;

use crate::config::DetectionMode;
use crate::dataset::Dataset;
use crate::error::Result;
use crate::types::{
    Diagnostic, FeatureImportance, Method, ScoredFinding, finite_or_null, issue, round2,
};

/// Number of findings listed in `top_anomalies`.
pub const TOP_ANOMALIES: usize = 10;

/// Number of features listed in `feature_importance`.
pub const TOP_FEATURES: usize = 10;

/// Number of issue types listed in `top_issues`.
pub const TOP_ISSUES: usize = 5;

// ============================================================================
// Report Types
// ============================================================================

/// Complete result of one detection run.
///
/// Used for JSON output (`--json`), report files (`--emit-report`) and the
/// HTTP responses.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnomalyReport {
    /// Mode the run used
    pub mode: DetectionMode,
    /// Shape and column kinds of the input
    pub dataset_info: DatasetInfo,
    /// Counts, methods, confidence range and most frequent issue types
    pub anomaly_summary: AnomalySummary,
    /// Anomaly percentage and quality score
    pub quality_metrics: QualityMetrics,
    /// Highest-severity findings
    pub top_anomalies: Vec<ScoredFinding>,
    /// Most important features of the learned detector
    pub feature_importance: Vec<FeatureImportance>,
    /// Distinct rows with at least one finding
    pub unique_rows_flagged: usize,
    /// Findings counted once per event, so a row can contribute several
    pub anomaly_event_count: usize,
    /// Findings per method
    pub method_breakdown: BTreeMap<Method, usize>,
    /// Plain-text advice derived from the metrics
    pub recommendations: Vec<String>,
    /// Detectors or rules that were skipped
    pub diagnostics: Vec<Diagnostic>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DatasetInfo {
    pub total_rows: usize,
    pub total_columns: usize,
    /// Column count per storage kind
    pub data_types: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ConfidenceRange {
    #[serde(serialize_with = "finite_or_null")]
    pub min: f64,
    #[serde(serialize_with = "finite_or_null")]
    pub max: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IssueCount {
    pub issue_type: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnomalySummary {
    pub total_anomalies: usize,
    /// Methods in order of first appearance in the ranking
    pub methods_used: Vec<Method>,
    pub confidence_range: ConfidenceRange,
    pub top_issues: Vec<IssueCount>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QualityMetrics {
    /// Findings per hundred rows, two decimals
    #[serde(serialize_with = "finite_or_null")]
    pub anomaly_percentage: f64,
    /// `max(0, 100 - anomaly_percentage)`, two decimals
    #[serde(serialize_with = "finite_or_null")]
    pub quality_score: f64,
    pub confidence_range: ConfidenceRange,
}

// ============================================================================
// Report Generator
// ============================================================================

/// Builds [`AnomalyReport`]s and writes them to disk.
#[derive(Debug, Clone)]
pub struct ReportGenerator {
    output_dir: PathBuf,
}

impl Default for ReportGenerator {
    fn default() -> Self {
        Self::new(PathBuf::from("output"))
    }
}

impl ReportGenerator {
    pub fn new(output_dir: PathBuf) -> Self {
        Self { output_dir }
    }

    /// Summarize ranked findings into a report.
    ///
    /// `feature_importance` findings are metadata and never count as anomalies.
    pub fn build(
        dataset: &Dataset,
        mode: DetectionMode,
        ranked: Vec<ScoredFinding>,
        feature_importance: Vec<FeatureImportance>,
        diagnostics: Vec<Diagnostic>,
    ) -> AnomalyReport {
        let findings: Vec<ScoredFinding> = ranked
            .into_iter()
            .filter(|f| f.issue_type != issue::FEATURE_IMPORTANCE)
            .collect();

        let total_rows = dataset.height();
        let summary = summarize(&findings);
        let anomaly_percentage = if total_rows > 0 {
            summary.total_anomalies as f64 / total_rows as f64 * 100.0
        } else {
            0.0
        };
        let quality_score = (100.0 - anomaly_percentage).max(0.0);

        let mut method_breakdown = BTreeMap::new();
        for finding in &findings {
            *method_breakdown.entry(finding.method).or_insert(0) += 1;
        }
        let unique_rows_flagged = findings
            .iter()
            .map(|f| (f.table.as_deref(), f.row_index))
            .collect::<HashSet<_>>()
            .len();

        let mut report = AnomalyReport {
            mode,
            dataset_info: DatasetInfo {
                total_rows,
                total_columns: dataset.width(),
                data_types: dataset.dtype_histogram(),
            },
            quality_metrics: QualityMetrics {
                anomaly_percentage: round2(anomaly_percentage),
                quality_score: round2(quality_score),
                confidence_range: summary.confidence_range,
            },
            anomaly_summary: summary,
            anomaly_event_count: findings.len(),
            top_anomalies: findings.into_iter().take(TOP_ANOMALIES).collect(),
            feature_importance: feature_importance.into_iter().take(TOP_FEATURES).collect(),
            unique_rows_flagged,
            method_breakdown,
            recommendations: Vec::new(),
            diagnostics,
        };
        report.recommendations = recommendations(&report);
        report
    }

    /// Write a report as pretty JSON to `<output_dir>/<base_name>_report.json`.
    pub fn write_report_to_file(&self, report: &AnomalyReport, base_name: &str) -> Result<PathBuf> {
        fs::create_dir_all(&self.output_dir)?;

        let report_path = self.output_dir.join(format!("{}_report.json", base_name));
        let mut file = File::create(&report_path)?;
        file.write_all(serde_json::to_string_pretty(report)?.as_bytes())?;

        info!("Report saved: {}", report_path.display());

        Ok(report_path)
    }

    /// Write every ranked finding to `<output_dir>/<base_name>_anomalies.csv`.
    pub fn write_findings_csv(&self, ranked: &[ScoredFinding], base_name: &str) -> Result<PathBuf> {
        let findings: Vec<&ScoredFinding> = ranked
            .iter()
            .filter(|f| f.issue_type != issue::FEATURE_IMPORTANCE)
            .collect();

        let mut df = df![
            "row_index" => findings.iter().map(|f| f.row_index as u64).collect::<Vec<_>>(),
            "table" => findings.iter().map(|f| f.table.clone()).collect::<Vec<_>>(),
            "issue_type" => findings.iter().map(|f| f.issue_type.as_str()).collect::<Vec<_>>(),
            "method" => findings.iter().map(|f| f.method.as_str()).collect::<Vec<_>>(),
            "column" => findings.iter().map(|f| f.column.clone()).collect::<Vec<_>>(),
            "value" => findings.iter().map(|f| f.value.as_str()).collect::<Vec<_>>(),
            "details" => findings.iter().map(|f| f.details.as_str()).collect::<Vec<_>>(),
            "confidence" => findings.iter().map(|f| f.confidence).collect::<Vec<_>>(),
            "method_weight" => findings.iter().map(|f| f.method_weight).collect::<Vec<_>>(),
            "severity_score" => findings.iter().map(|f| f.severity_score).collect::<Vec<_>>(),
        ]?;

        fs::create_dir_all(&self.output_dir)?;
        let output_path = self.output_dir.join(format!("{}_anomalies.csv", base_name));
        let mut file = File::create(&output_path)?;
        CsvWriter::new(&mut file)
            .include_header(true)
            .with_separator(b',')
            .with_quote_char(b'"')
            .finish(&mut df)?;

        info!(rows = findings.len(), "Anomaly details saved: {}", output_path.display());

        Ok(output_path)
    }
}

fn summarize(findings: &[ScoredFinding]) -> AnomalySummary {
    if findings.is_empty() {
        return AnomalySummary {
            total_anomalies: 0,
            methods_used: Vec::new(),
            confidence_range: ConfidenceRange { min: 0.0, max: 0.0 },
            top_issues: Vec::new(),
        };
    }

    let mut methods_used = Vec::new();
    for finding in findings {
        if !methods_used.contains(&finding.method) {
            methods_used.push(finding.method);
        }
    }

    let min = findings.iter().map(|f| f.confidence).fold(f64::INFINITY, f64::min);
    let max = findings
        .iter()
        .map(|f| f.confidence)
        .fold(f64::NEG_INFINITY, f64::max);

    // count per issue type, ties broken by first appearance
    let mut order: Vec<&str> = Vec::new();
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for finding in findings {
        let entry = counts.entry(finding.issue_type.as_str()).or_insert(0);
        if *entry == 0 {
            order.push(finding.issue_type.as_str());
        }
        *entry += 1;
    }
    let mut top_issues: Vec<IssueCount> = order
        .into_iter()
        .map(|issue_type| IssueCount {
            issue_type: issue_type.to_string(),
            count: counts.get(issue_type).copied().unwrap_or(0),
        })
        .collect();
    top_issues.sort_by(|a, b| b.count.cmp(&a.count));
    top_issues.truncate(TOP_ISSUES);

    AnomalySummary {
        total_anomalies: findings.len(),
        methods_used,
        confidence_range: ConfidenceRange { min, max },
        top_issues,
    }
}

/// Plain-text advice for a finished report.
pub fn recommendations(report: &AnomalyReport) -> Vec<String> {
    let mut recs = Vec::new();

    let quality_score = report.quality_metrics.quality_score;
    if quality_score < 50.0 {
        recs.push(
            "Critical: Data quality is very poor. Immediate data cleaning required.".to_string(),
        );
    } else if quality_score < 80.0 {
        recs.push("Warning: Data quality needs improvement. Consider data cleaning.".to_string());
    } else {
        recs.push("Good: Data quality is acceptable.".to_string());
    }

    let methods = &report.anomaly_summary.methods_used;
    let advice = [
        (
            Method::Numeric,
            "Numeric outliers detected. Review extreme values in numeric columns.",
        ),
        (
            Method::Categorical,
            "Rare categories found. Check for typos or inconsistent categories.",
        ),
        (
            Method::Lightgbm,
            "Complex pattern anomalies detected. \
             Review unusual combinations of values across columns.",
        ),
        (
            Method::Insertion,
            "Insertion anomalies detected. Check for duplicate records, \
             missing required fields, or invalid foreign keys.",
        ),
        (
            Method::Deletion,
            "Deletion anomalies detected. \
             Review orphaned records or referential integrity violations.",
        ),
        (
            Method::Update,
            "Update anomalies detected. Look for inconsistent updates, \
             partial updates, or data type violations.",
        ),
        (
            Method::Relationship,
            "Relationship anomalies detected. \
             Verify keys shared between tables and within hierarchies.",
        ),
    ];
    for (method, text) in advice {
        if methods.contains(&method) {
            recs.push(text.to_string());
        }
    }

    if let Some(top) = report.feature_importance.first() {
        recs.push(format!(
            "Focus on column '{}' - it contributes most to anomalies.",
            top.feature
        ));
    }

    recs
}

impl AnomalyReport {
    /// Plain-text rendering used by the CLI and the `formatted_output` field.
    pub fn formatted_summary(&self) -> String {
        let mut out = String::new();
        let rule = "=".repeat(60);
        let _ = writeln!(out, "{rule}");
        let _ = writeln!(out, "ANOMALY DETECTION REPORT ({} mode)", self.mode);
        let _ = writeln!(out, "{rule}");
        let _ = writeln!(
            out,
            "Dataset: {} rows x {} columns",
            self.dataset_info.total_rows, self.dataset_info.total_columns
        );
        let _ = writeln!(
            out,
            "Quality score: {:.2} ({:.2}% anomalous)",
            self.quality_metrics.quality_score, self.quality_metrics.anomaly_percentage
        );
        let _ = writeln!(
            out,
            "Anomalies: {} events across {} rows",
            self.anomaly_event_count, self.unique_rows_flagged
        );

        if !self.method_breakdown.is_empty() {
            let _ = writeln!(out, "\nBy method:");
            for (method, count) in &self.method_breakdown {
                let _ = writeln!(out, "  {method:<13} {count}");
            }
        }

        if !self.anomaly_summary.top_issues.is_empty() {
            let _ = writeln!(out, "\nTop issues:");
            for issue in &self.anomaly_summary.top_issues {
                let _ = writeln!(out, "  {:<32} {}", issue.issue_type, issue.count);
            }
        }

        if !self.top_anomalies.is_empty() {
            let _ = writeln!(out, "\nTop anomalies:");
            for finding in &self.top_anomalies {
                let location = match &finding.table {
                    Some(table) => format!("{table}[{}]", finding.row_index),
                    None => format!("row {}", finding.row_index),
                };
                let _ = writeln!(
                    out,
                    "  {location:<12} {:<32} severity {:.2}  {}",
                    finding.issue_type, finding.severity_score, finding.value
                );
            }
        }

        if !self.feature_importance.is_empty() {
            let _ = writeln!(out, "\nFeature importance:");
            for record in &self.feature_importance {
                let _ = writeln!(out, "  {:<24} {:.4}", record.feature, record.importance);
            }
        }

        if !self.diagnostics.is_empty() {
            let _ = writeln!(out, "\nSkipped checks:");
            for diagnostic in &self.diagnostics {
                let _ = writeln!(
                    out,
                    "  ! {}{}: {}",
                    diagnostic.detector,
                    diagnostic
                        .rule
                        .as_deref()
                        .map(|r| format!("/{r}"))
                        .unwrap_or_default(),
                    diagnostic.message
                );
            }
        }

        let _ = writeln!(out, "\nRecommendations:");
        for rec in &self.recommendations {
            let _ = writeln!(out, "  - {rec}");
        }
        let _ = write!(out, "{rule}");
        out
    }
}
