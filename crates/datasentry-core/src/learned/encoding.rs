//! Feature encoding for the gradient-boosted model.
//!
//! Text columns are label-encoded against their sorted distinct values, with
//! missing cells mapped to a `MISSING` class. Every other column is numeric,
//! with missing cells mapped to [`MISSING_NUMERIC`]. The fitted encoding is
//! kept so scoring applies exactly the transform used for training.

use crate::dataset::{ColumnKind, Dataset, Value};
use crate::error::Result;

/// Placeholder class for missing text cells.
pub const MISSING_TOKEN: &str = "MISSING";

/// Placeholder for missing numeric cells.
pub const MISSING_NUMERIC: f64 = -999.0;

/// Code for text values that were not seen during fitting.
pub const UNSEEN_CODE: f64 = -1.0;

#[derive(Debug, Clone, PartialEq)]
enum Encoding {
    Numeric,
    Categorical { classes: Vec<String> },
}

#[derive(Debug, Clone, PartialEq)]
struct FeatureSpec {
    name: String,
    encoding: Encoding,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FeatureEncoder {
    features: Vec<FeatureSpec>,
}

impl FeatureEncoder {
    /// Learn the class list of every text column.
    pub fn fit(dataset: &Dataset) -> Self {
        let features = dataset
            .columns()
            .iter()
            .map(|column| {
                let encoding = if column.kind() == ColumnKind::Text {
                    let mut classes: Vec<String> = column
                        .values()
                        .iter()
                        .map(|v| match v {
                            Value::Null => MISSING_TOKEN.to_string(),
                            other => other.to_string(),
                        })
                        .collect();
                    classes.sort();
                    classes.dedup();
                    Encoding::Categorical { classes }
                } else {
                    Encoding::Numeric
                };
                FeatureSpec {
                    name: column.name().to_string(),
                    encoding,
                }
            })
            .collect();
        Self { features }
    }

    pub fn feature_names(&self) -> Vec<&str> {
        self.features.iter().map(|f| f.name.as_str()).collect()
    }

    pub fn num_features(&self) -> usize {
        self.features.len()
    }

    /// Encode a dataset into column-major feature vectors.
    pub fn transform(&self, dataset: &Dataset) -> Result<Vec<Vec<f64>>> {
        self.features
            .iter()
            .map(|spec| {
                let column = dataset.column(&spec.name)?;
                let encoded = column
                    .values()
                    .iter()
                    .map(|value| match &spec.encoding {
                        Encoding::Numeric => encode_numeric(value),
                        Encoding::Categorical { classes } => encode_categorical(value, classes),
                    })
                    .collect();
                Ok(encoded)
            })
            .collect()
    }
}

fn encode_numeric(value: &Value) -> f64 {
    match value {
        Value::Int(v) => *v as f64,
        Value::Float(v) => *v,
        Value::Bool(b) => f64::from(u8::from(*b)),
        Value::Timestamp(ts) => ts.and_utc().timestamp() as f64,
        Value::Str(s) => crate::utils::parse_float(s).unwrap_or(MISSING_NUMERIC),
        Value::Null => MISSING_NUMERIC,
    }
}

fn encode_categorical(value: &Value, classes: &[String]) -> f64 {
    let label = match value {
        Value::Null => MISSING_TOKEN.to_string(),
        other => other.to_string(),
    };
    classes
        .binary_search(&label)
        .map_or(UNSEEN_CODE, |code| code as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use polars::prelude::*;

    #[test]
    fn test_label_encoding_sorted() {
        let df = df![
            "city" => [Some("Rome"), None, Some("Austin"), Some("Rome")],
            "n" => [Some(1.5f64), None, Some(3.0), Some(4.0)],
        ]
        .unwrap();
        let ds = Dataset::from_frame(&df).unwrap();
        let encoder = FeatureEncoder::fit(&ds);
        let features = encoder.transform(&ds).unwrap();

        // classes: Austin, MISSING, Rome
        assert_eq!(features[0], vec![2.0, 1.0, 0.0, 2.0]);
        assert_eq!(features[1], vec![1.5, MISSING_NUMERIC, 3.0, 4.0]);
        assert_eq!(encoder.feature_names(), vec!["city", "n"]);
    }

    #[test]
    fn test_unseen_values_and_missing_columns() {
        let train = Dataset::from_frame(&df!["c" => ["a", "b"]].unwrap()).unwrap();
        let encoder = FeatureEncoder::fit(&train);

        let other = Dataset::from_frame(&df!["c" => ["z", "a"]].unwrap()).unwrap();
        assert_eq!(encoder.transform(&other).unwrap()[0], vec![UNSEEN_CODE, 0.0]);

        let wrong = Dataset::from_frame(&df!["d" => ["a"]].unwrap()).unwrap();
        assert!(encoder.transform(&wrong).is_err());
    }
}
