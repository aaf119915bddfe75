//! Shared utilities for the detection library.
//!
//! Helpers for polars dtypes, cell normalization, column-name sanitizing and
//! lenient number/date parsing used by ingestion and by several rules.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use once_cell::sync::Lazy;
use polars::prelude::*;
use regex::Regex;

// =============================================================================
// Data Type Utilities
// =============================================================================

/// Category of a polars data type for snapshot conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DtypeCategory {
    Integer,
    Float,
    Datetime,
    Boolean,
    String,
    Other,
}

/// Map a polars `DataType` to its conversion category.
pub fn get_dtype_category(dtype: &DataType) -> DtypeCategory {
    match dtype {
        DataType::Int8
        | DataType::Int16
        | DataType::Int32
        | DataType::Int64
        | DataType::UInt8
        | DataType::UInt16
        | DataType::UInt32
        | DataType::UInt64 => DtypeCategory::Integer,
        DataType::Float32 | DataType::Float64 => DtypeCategory::Float,
        DataType::Date | DataType::Datetime(_, _) => DtypeCategory::Datetime,
        DataType::Boolean => DtypeCategory::Boolean,
        DataType::String => DtypeCategory::String,
        _ => DtypeCategory::Other,
    }
}

// =============================================================================
// Null Markers
// =============================================================================

/// Check if a raw cell denotes a missing value.
///
/// Empty strings and the literal `null` in any case are treated as missing.
pub fn is_null_marker(s: &str) -> bool {
    let trimmed = s.trim();
    trimmed.is_empty() || trimmed.eq_ignore_ascii_case("null")
}

// =============================================================================
// Column Names
// =============================================================================

static INVALID_NAME_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^a-zA-Z0-9_]").expect("Invalid regex: name chars"));

static LEADING_INVALID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^a-zA-Z_]+").expect("Invalid regex: leading run"));

/// Sanitize a column name to `[A-Za-z0-9_]` with no leading digit.
///
/// A leading run of digits becomes a single `_`; an underscore that follows
/// the run is kept.
///
/// # Example
///
/// ```rust,ignore
/// assert_eq!(sanitize_column_name("Order Total ($)"), "Order_Total____");
/// assert_eq!(sanitize_column_name("2024 sales"), "__sales");
/// ```
pub fn sanitize_column_name(name: &str) -> String {
    let replaced = INVALID_NAME_CHARS.replace_all(name.trim(), "_");
    let sanitized = LEADING_INVALID.replace(&replaced, "_").into_owned();
    if sanitized.is_empty() {
        "column".to_string()
    } else {
        sanitized
    }
}

/// Sanitize all names, suffixing `_2`, `_3`, ... on collisions.
pub fn sanitize_column_names<S: AsRef<str>>(names: &[S]) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut result = Vec::with_capacity(names.len());
    for name in names {
        let base = sanitize_column_name(name.as_ref());
        let mut candidate = base.clone();
        let mut n = 2;
        while !seen.insert(candidate.clone()) {
            candidate = format!("{base}_{n}");
            n += 1;
        }
        result.push(candidate);
    }
    result
}

// =============================================================================
// String Parsing Utilities
// =============================================================================

/// Parse a trimmed string as an integer.
pub fn parse_int(s: &str) -> Option<i64> {
    s.trim().parse::<i64>().ok()
}

/// Parse a trimmed string as a finite float.
pub fn parse_float(s: &str) -> Option<f64> {
    s.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Check if a string can be parsed as a number.
pub fn is_numeric_string(s: &str) -> bool {
    parse_float(s).is_some()
}

static NUMBER_LITERAL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[+-]?(\d+\.?\d*|\.\d+)([eE][+-]?\d+)?$")
        .expect("Invalid regex: number literal")
});

/// Check if a string is written as a number, however large.
///
/// Unlike [`is_numeric_string`] this does not require the value to fit in
/// an `f64`.
pub fn is_number_literal(s: &str) -> bool {
    NUMBER_LITERAL.is_match(s.trim())
}

static DATE_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        Regex::new(r"^\d{4}[-/]\d{1,2}[-/]\d{1,2}$").expect("Invalid regex: YYYY-MM-DD"),
        Regex::new(r"^\d{1,2}[-/.]\d{1,2}[-/.]\d{4}$").expect("Invalid regex: MM-DD-YYYY"),
        Regex::new(r"^\d{4}[-/]\d{2}[-/]\d{2}\s\d{2}:\d{2}").expect("Invalid regex: datetime"),
        Regex::new(r"^\d{4}-\d{2}-\d{2}T\d{2}:\d{2}").expect("Invalid regex: ISO"),
    ]
});

const DATETIME_FORMATS: [&str; 6] = [
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%Y/%m/%d %H:%M",
];

const DATE_FORMATS: [&str; 6] = [
    "%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y", "%d/%m/%Y", "%m-%d-%Y", "%d.%m.%Y",
];

/// Check if a string has the shape of a date or datetime.
pub fn looks_like_datetime(s: &str) -> bool {
    let trimmed = s.trim();
    DATE_PATTERNS.iter().any(|p| p.is_match(trimmed))
}

/// Parse a string as a date or datetime.
///
/// Only strings shaped like a date are attempted, so plain numbers never
/// parse as timestamps.
pub fn parse_datetime(s: &str) -> Option<NaiveDateTime> {
    let trimmed = s.trim();
    if !looks_like_datetime(trimmed) {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(dt.naive_utc());
    }
    for format in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Some(dt);
        }
    }
    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(trimmed, format) {
            return date.and_hms_opt(0, 0, 0);
        }
    }
    None
}

// =============================================================================
// Tests
// =============================================================================
