//! Numeric outlier detection.
//!
//! A value is an outlier when its population z-score exceeds the threshold
//! or when it falls outside the Tukey fences `[Q1 - 1.5·IQR, Q3 + 1.5·IQR]`.
//! Quartiles use linear interpolation between order statistics.

use polars::prelude::*;
use tracing::debug;

use super::{Detector, DetectorOutput};
use crate::dataset::Dataset;
use crate::error::{Result, ResultExt};
use crate::inference::InferredSchema;
use crate::types::{Finding, Method, issue};

/// Columns with fewer valid values than this are skipped.
pub const MIN_VALUES: usize = 10;

const IQR_MULTIPLIER: f64 = 1.5;

/// Moments and quartiles of a column's non-missing values.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColumnStats {
    pub count: usize,
    pub mean: f64,
    /// Population standard deviation (`ddof = 0`).
    pub std: f64,
    pub q1: f64,
    pub q3: f64,
}

impl ColumnStats {
    /// Statistics of a numeric series, `None` when it has no valid values.
    pub fn from_series(series: &Series) -> PolarsResult<Option<Self>> {
        let values = series.drop_nulls().cast(&DataType::Float64)?;
        let values = values.f64()?;

        let (Some(mean), Some(std)) = (values.mean(), values.std(0)) else {
            return Ok(None);
        };
        let q1 = values.quantile(0.25, QuantileMethod::Linear)?;
        let q3 = values.quantile(0.75, QuantileMethod::Linear)?;
        let (Some(q1), Some(q3)) = (q1, q3) else {
            return Ok(None);
        };

        Ok(Some(Self {
            count: values.len(),
            mean,
            std,
            q1,
            q3,
        }))
    }

    /// Tukey fences `[Q1 - 1.5·IQR, Q3 + 1.5·IQR]`.
    pub fn fences(&self) -> (f64, f64) {
        let iqr = self.q3 - self.q1;
        (self.q1 - IQR_MULTIPLIER * iqr, self.q3 + IQR_MULTIPLIER * iqr)
    }

    pub fn z_score(&self, value: f64) -> f64 {
        if self.std > 0.0 {
            (value - self.mean) / self.std
        } else {
            0.0
        }
    }
}

#[derive(Debug, Clone)]
pub struct NumericOutlierDetector {
    z_threshold: f64,
}

impl NumericOutlierDetector {
    pub fn new(z_threshold: f64) -> Self {
        Self { z_threshold }
    }
}

impl Default for NumericOutlierDetector {
    fn default() -> Self {
        Self::new(3.0)
    }
}

impl Detector for NumericOutlierDetector {
    fn name(&self) -> &'static str {
        "numeric"
    }

    fn method(&self) -> Method {
        Method::Numeric
    }

    fn detect(&self, dataset: &Dataset, _schema: &InferredSchema) -> Result<DetectorOutput> {
        let mut findings = Vec::new();

        for column in dataset.columns().iter().filter(|c| c.kind().is_numeric()) {
            let series = column.series();
            let stats = ColumnStats::from_series(series)
                .context(format!("Failed to summarize column '{}'", column.name()))?;
            let Some(stats) = stats.filter(|s| s.count >= MIN_VALUES) else {
                debug!(
                    column = column.name(),
                    count = series.len() - series.null_count(),
                    "Too few values for outlier test"
                );
                continue;
            };
            let (lower, upper) = stats.fences();

            let values = series
                .cast(&DataType::Float64)
                .context(format!("Failed to read column '{}'", column.name()))?;
            let values = values.f64()?;
            for (row, value) in values.into_iter().enumerate() {
                let Some(value) = value else { continue };
                let z = stats.z_score(value);
                let z_hit = z.abs() > self.z_threshold;
                let iqr_hit = value < lower || value > upper;
                if !(z_hit || iqr_hit) {
                    continue;
                }

                let mut reasons = Vec::with_capacity(2);
                if z_hit {
                    reasons.push(format!("|z|={:.2} > {}", z.abs(), self.z_threshold));
                }
                if iqr_hit {
                    reasons.push(format!("outside IQR fence [{lower:.2}, {upper:.2}]"));
                }

                let cell = column.get(row).map(ToString::to_string).unwrap_or_default();
                findings.push(
                    Finding::new(row, issue::NUMERIC_OUTLIER, Method::Numeric)
                        .column(column.name())
                        .value(cell)
                        .details(format!("{}: {}", column.name(), reasons.join("; "))),
                );
            }
        }

        Ok(DetectorOutput::from_findings(findings))
    }
}
