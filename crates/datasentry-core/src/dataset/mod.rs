//! Immutable tabular snapshot consumed by every detector.
//!
//! A [`Dataset`] is built once per run, either from a polars `DataFrame`
//! (the ingestion path) or from plain rows. Construction sanitizes column
//! names and normalizes missing values, so detectors never see a `"NULL"`
//! string or a NaN.
//!
//! The normalized cells are kept twice: as [`Value`]s for per-row rules and
//! as a typed polars frame for column statistics (null and unique counts,
//! moments, quantiles, value counts, duplicate rows).
//!
//! Row identity is the 0-based position, shared by all detectors in a run.

mod value;

pub use value::{ColumnKind, Value, ValueKey};

use polars::prelude::*;
use serde::Serialize;
use std::collections::BTreeMap;

use crate::error::{DetectionError, Result, ResultExt};
use crate::utils::{self, DtypeCategory};

/// One named column of a [`Dataset`].
#[derive(Debug, Clone)]
pub struct ColumnData {
    name: String,
    kind: ColumnKind,
    values: Vec<Value>,
    series: Series,
}

impl PartialEq for ColumnData {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.kind == other.kind && self.values == other.values
    }
}

impl ColumnData {
    /// Build a column, normalizing its cells.
    pub fn new(name: impl Into<String>, values: Vec<Value>) -> Self {
        let name = name.into();
        let (kind, values) = value::normalize(values);
        let series = typed_series(&name, kind, &values);
        Self {
            name,
            kind,
            values,
            series,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> ColumnKind {
        self.kind
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Typed polars view of the normalized cells.
    pub fn series(&self) -> &Series {
        &self.series
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, row: usize) -> Option<&Value> {
        self.values.get(row)
    }

    pub fn null_count(&self) -> usize {
        self.series.null_count()
    }

    /// Share of missing cells, 0.0 for an empty column.
    pub fn null_rate(&self) -> f64 {
        if self.series.is_empty() {
            0.0
        } else {
            self.null_count() as f64 / self.series.len() as f64
        }
    }

    /// Distinct non-missing values.
    pub fn unique_count(&self) -> usize {
        self.series.drop_nulls().n_unique().unwrap_or(0)
    }

    /// `(row, value)` pairs of non-missing cells.
    pub fn non_null(&self) -> impl Iterator<Item = (usize, &Value)> {
        self.values
            .iter()
            .enumerate()
            .filter(|(_, v)| !v.is_null())
    }
}

/// Typed series over normalized cells. Timestamps are stored as
/// microsecond datetimes; an all-missing column is a null string column.
fn typed_series(name: &str, kind: ColumnKind, values: &[Value]) -> Series {
    let name: PlSmallStr = name.into();
    match kind {
        ColumnKind::Integer => Int64Chunked::from_iter_options(
            name,
            values.iter().map(|v| match v {
                Value::Int(i) => Some(*i),
                _ => None,
            }),
        )
        .into_series(),
        ColumnKind::Float => {
            Float64Chunked::from_iter_options(name, values.iter().map(Value::as_f64)).into_series()
        }
        ColumnKind::Boolean => BooleanChunked::from_iter_options(
            name,
            values.iter().map(|v| match v {
                Value::Bool(b) => Some(*b),
                _ => None,
            }),
        )
        .into_series(),
        ColumnKind::Timestamp => Int64Chunked::from_iter_options(
            name,
            values.iter().map(|v| match v {
                Value::Timestamp(ts) => Some(ts.and_utc().timestamp_micros()),
                _ => None,
            }),
        )
        .into_datetime(TimeUnit::Microseconds, None)
        .into_series(),
        ColumnKind::Text => {
            StringChunked::from_iter_options(name, values.iter().map(Value::as_str)).into_series()
        }
        ColumnKind::Empty => Series::full_null(name, values.len(), &DataType::String),
    }
}

/// Column name and kind, as shown in API previews.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnSchema {
    pub name: String,
    pub dtype: ColumnKind,
}

/// Rows × named columns with a single missing-value sentinel.
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    columns: Vec<ColumnData>,
    frame: DataFrame,
    height: usize,
}

impl PartialEq for Dataset {
    fn eq(&self, other: &Self) -> bool {
        self.height == other.height && self.columns == other.columns
    }
}

impl Dataset {
    /// Convert a polars frame into a snapshot.
    pub fn from_frame(df: &DataFrame) -> Result<Self> {
        let raw_names: Vec<String> = df
            .get_column_names()
            .iter()
            .map(|n| n.to_string())
            .collect();
        let names = utils::sanitize_column_names(&raw_names);

        let mut columns = Vec::with_capacity(names.len());
        for (column, name) in df.get_columns().iter().zip(names) {
            let series = column.as_materialized_series();
            let values = series_values(series)
                .context(format!("Failed to read column '{}'", series.name()))?;
            columns.push(ColumnData::new(name, values));
        }

        Self::assemble(columns, df.height())
    }

    /// Build a snapshot from row-major cells.
    pub fn from_rows<S: AsRef<str>>(column_names: &[S], rows: Vec<Vec<Value>>) -> Result<Self> {
        let width = column_names.len();
        let height = rows.len();
        let mut per_column: Vec<Vec<Value>> =
            (0..width).map(|_| Vec::with_capacity(height)).collect();

        for (i, row) in rows.into_iter().enumerate() {
            if row.len() != width {
                return Err(DetectionError::Parse {
                    file: "rows".to_string(),
                    reason: format!("row {i} has {} cells, expected {width}", row.len()),
                });
            }
            for (cells, cell) in per_column.iter_mut().zip(row) {
                cells.push(cell);
            }
        }

        let names = utils::sanitize_column_names(column_names);
        let columns = names
            .into_iter()
            .zip(per_column)
            .map(|(name, values)| ColumnData::new(name, values))
            .collect();

        Self::assemble(columns, height)
    }

    fn assemble(columns: Vec<ColumnData>, height: usize) -> Result<Self> {
        let frame = DataFrame::new(
            columns
                .iter()
                .map(|c| c.series.clone().into_column())
                .collect(),
        )
        .context("Failed to assemble normalized frame")?;
        Ok(Self {
            columns,
            frame,
            height,
        })
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn width(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.height == 0
    }

    /// Normalized cells as a typed polars frame, one column per
    /// [`ColumnData`] in the same order.
    pub fn frame(&self) -> &DataFrame {
        &self.frame
    }

    pub fn columns(&self) -> &[ColumnData] {
        &self.columns
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(ColumnData::name).collect()
    }

    pub fn column(&self, name: &str) -> Result<&ColumnData> {
        self.columns
            .iter()
            .find(|c| c.name == name)
            .ok_or_else(|| DetectionError::ColumnNotFound(name.to_string()))
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c.name == name)
    }

    /// Column count per storage kind.
    pub fn dtype_histogram(&self) -> BTreeMap<String, usize> {
        let mut histogram = BTreeMap::new();
        for column in &self.columns {
            *histogram.entry(column.kind.to_string()).or_insert(0) += 1;
        }
        histogram
    }

    pub fn schema(&self) -> Vec<ColumnSchema> {
        self.columns
            .iter()
            .map(|c| ColumnSchema {
                name: c.name.clone(),
                dtype: c.kind,
            })
            .collect()
    }

    /// First `n` rows as JSON objects keyed by column name.
    pub fn sample_rows(&self, n: usize) -> Vec<serde_json::Map<String, serde_json::Value>> {
        (0..self.height.min(n))
            .map(|row| {
                self.columns
                    .iter()
                    .map(|c| {
                        let cell = c.values.get(row).unwrap_or(&Value::Null);
                        let json = serde_json::to_value(cell).unwrap_or(serde_json::Value::Null);
                        (c.name.clone(), json)
                    })
                    .collect()
            })
            .collect()
    }
}

/// Extract raw cells from a polars series.
fn series_values(series: &Series) -> PolarsResult<Vec<Value>> {
    let values = match utils::get_dtype_category(series.dtype()) {
        DtypeCategory::Integer => series
            .cast(&DataType::Int64)?
            .i64()?
            .into_iter()
            .map(|v| v.map_or(Value::Null, Value::Int))
            .collect(),
        DtypeCategory::Float => series
            .cast(&DataType::Float64)?
            .f64()?
            .into_iter()
            .map(|v| v.map_or(Value::Null, Value::Float))
            .collect(),
        DtypeCategory::Boolean => series
            .bool()?
            .into_iter()
            .map(|v| v.map_or(Value::Null, Value::Bool))
            .collect(),
        DtypeCategory::Datetime => series
            .cast(&DataType::String)?
            .str()?
            .into_iter()
            .map(|v| match v {
                Some(s) => utils::parse_datetime(s)
                    .map_or_else(|| Value::Str(s.to_string()), Value::Timestamp),
                None => Value::Null,
            })
            .collect(),
        DtypeCategory::String | DtypeCategory::Other => series
            .cast(&DataType::String)?
            .str()?
            .into_iter()
            .map(|v| v.map_or(Value::Null, |s| Value::Str(s.to_string())))
            .collect(),
    };
    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_from_frame_types() {
        let df = df![
            "id" => [1i64, 2, 3],
            "price" => [1.5f64, f64::NAN, 3.0],
            "name" => ["a", "NULL", "c"],
            "active" => [true, false, true],
        ]
        .unwrap();

        let ds = Dataset::from_frame(&df).unwrap();
        assert_eq!(ds.height(), 3);
        assert_eq!(ds.width(), 4);
        assert_eq!(ds.column("id").unwrap().kind(), ColumnKind::Integer);
        assert_eq!(ds.column("price").unwrap().kind(), ColumnKind::Float);
        assert_eq!(ds.column("price").unwrap().null_count(), 1);
        assert_eq!(ds.column("name").unwrap().kind(), ColumnKind::Text);
        assert_eq!(ds.column("name").unwrap().null_count(), 1);
        assert_eq!(ds.column("active").unwrap().kind(), ColumnKind::Boolean);
    }

    #[test]
    fn test_null_string_matches_missing_cell() {
        let with_marker = df!["amount" => ["10", "null", "30"]].unwrap();
        let with_null = df!["amount" => [Some(10i64), None, Some(30)]].unwrap();

        let a = Dataset::from_frame(&with_marker).unwrap();
        let b = Dataset::from_frame(&with_null).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_column_names_sanitized() {
        let df = df!["Order ID" => [1i64], "order-id" => [2i64]].unwrap();
        let ds = Dataset::from_frame(&df).unwrap();
        assert_eq!(ds.column_names(), vec!["Order_ID", "order_id"]);
    }

    #[test]
    fn test_from_rows_rejects_ragged_rows() {
        let result = Dataset::from_rows(&["a", "b"], vec![vec![Value::Int(1)]]);
        assert!(matches!(result, Err(DetectionError::Parse { .. })));
    }

    #[test]
    fn test_from_rows_and_helpers() {
        let ds = Dataset::from_rows(
            &["k", "v"],
            vec![
                vec![Value::Int(1), Value::Str("x".into())],
                vec![Value::Int(1), Value::Str("x".into())],
                vec![Value::Int(2), Value::Null],
            ],
        )
        .unwrap();

        assert_eq!(ds.frame().shape(), (3, 2));
        assert_eq!(ds.column("k").unwrap().unique_count(), 2);
        assert_eq!(ds.column("v").unwrap().unique_count(), 1);
        assert!((ds.column("v").unwrap().null_rate() - 1.0 / 3.0).abs() < 1e-12);

        let histogram = ds.dtype_histogram();
        assert_eq!(histogram.get("integer"), Some(&1));
        assert_eq!(histogram.get("string"), Some(&1));

        let sample = ds.sample_rows(10);
        assert_eq!(sample.len(), 3);
        assert_eq!(sample[2]["v"], serde_json::Value::Null);
    }

    #[test]
    fn test_frame_is_typed_after_normalization() {
        let df = df![
            "amount" => ["10", "NULL", "30"],
            "label" => ["a", "b", "null"],
        ]
        .unwrap();
        let ds = Dataset::from_frame(&df).unwrap();

        let frame = ds.frame();
        assert_eq!(frame.column("amount").unwrap().dtype(), &DataType::Int64);
        assert_eq!(frame.column("amount").unwrap().null_count(), 1);
        assert_eq!(frame.column("label").unwrap().dtype(), &DataType::String);
        assert_eq!(frame.column("label").unwrap().null_count(), 1);
    }

    #[test]
    fn test_timestamp_column_series() {
        let day = |d| {
            NaiveDate::from_ymd_opt(2024, 1, d)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap()
        };
        let ds = Dataset::from_rows(
            &["at"],
            vec![
                vec![Value::Timestamp(day(1))],
                vec![Value::Timestamp(day(2))],
                vec![Value::Null],
            ],
        )
        .unwrap();
        let series = ds.column("at").unwrap().series();
        assert!(matches!(
            series.dtype(),
            DataType::Datetime(TimeUnit::Microseconds, None)
        ));
        assert_eq!(series.null_count(), 1);
        assert_eq!(ds.column("at").unwrap().unique_count(), 2);
    }

    #[test]
    fn test_missing_column() {
        let ds = Dataset::default();
        assert!(matches!(
            ds.column("nope"),
            Err(DetectionError::ColumnNotFound(_))
        ));
    }
}
