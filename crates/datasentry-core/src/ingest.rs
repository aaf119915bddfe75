//! File ingestion: uploaded bytes to a [`Dataset`].
//!
//! CSV and JSON go through polars readers; Excel workbooks are read with
//! calamine (first sheet, first row as header). Every format ends in the
//! same [`Dataset`] normalization.

use std::io::Cursor;
use std::path::Path;

use calamine::{Data, Reader};
use polars::prelude::*;
use tracing::{debug, info};

use crate::dataset::{Dataset, Value};
use crate::error::{DetectionError, Result};
use crate::utils;

/// Rows polars samples to infer CSV column types.
const INFER_SCHEMA_ROWS: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TableFormat {
    Csv,
    Json,
    JsonLines,
    Excel,
}

fn format_for(filename: &str) -> Result<TableFormat> {
    let extension = Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase)
        .unwrap_or_default();
    match extension.as_str() {
        "csv" => Ok(TableFormat::Csv),
        "json" => Ok(TableFormat::Json),
        "jsonl" | "ndjson" => Ok(TableFormat::JsonLines),
        "xlsx" | "xlsm" | "xls" => Ok(TableFormat::Excel),
        _ => Err(DetectionError::UnsupportedFormat(filename.to_string())),
    }
}

/// Registry name for an uploaded file: stem, lowercased, `-` and spaces
/// replaced with `_`.
pub fn table_name_for(filename: &str) -> String {
    let stem = Path::new(filename)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(filename);
    stem.trim()
        .chars()
        .map(|c| if c == '-' || c == ' ' { '_' } else { c })
        .collect::<String>()
        .to_lowercase()
}

/// Parse an uploaded CSV, JSON or Excel file.
///
/// Files with no rows are rejected with [`DetectionError::EmptyDataset`].
pub fn read_table(filename: &str, bytes: &[u8]) -> Result<Dataset> {
    let format = format_for(filename)?;
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Err(DetectionError::EmptyDataset);
    }

    let frame = match format {
        TableFormat::Excel => {
            let dataset = read_workbook(filename, bytes)?;
            log_loaded(filename, &dataset);
            return Ok(dataset);
        }
        TableFormat::Csv => load_csv_with_fallbacks(bytes),
        TableFormat::Json => JsonReader::new(Cursor::new(bytes))
            .with_json_format(JsonFormat::Json)
            .finish(),
        TableFormat::JsonLines => JsonReader::new(Cursor::new(bytes))
            .with_json_format(JsonFormat::JsonLines)
            .finish(),
    }
    .map_err(|e| DetectionError::Parse {
        file: filename.to_string(),
        reason: e.to_string(),
    })?;

    if frame.height() == 0 {
        return Err(DetectionError::EmptyDataset);
    }

    let dataset = Dataset::from_frame(&frame)?;
    log_loaded(filename, &dataset);
    Ok(dataset)
}

fn log_loaded(filename: &str, dataset: &Dataset) {
    info!(
        file = filename,
        rows = dataset.height(),
        columns = dataset.width(),
        "Table loaded"
    );
}

/// Read a table from disk, inferring the format from the extension.
pub fn read_table_file(path: impl AsRef<Path>) -> Result<Dataset> {
    let path = path.as_ref();
    let bytes = std::fs::read(path)?;
    read_table(&path.to_string_lossy(), &bytes)
}

/// Load CSV with multiple fallback strategies
fn load_csv_with_fallbacks(bytes: &[u8]) -> PolarsResult<DataFrame> {
    // Strategy 1: Standard loading with quote handling
    match CsvReadOptions::default()
        .with_infer_schema_length(Some(INFER_SCHEMA_ROWS))
        .with_has_header(true)
        .with_parse_options(CsvParseOptions::default().with_quote_char(Some(b'"')))
        .into_reader_with_file_handle(Cursor::new(bytes))
        .finish()
    {
        Ok(df) => return Ok(df),
        Err(e) => {
            debug!("Standard CSV loading failed: {}", e);
        }
    }

    // Strategy 2: Without quote handling
    match CsvReadOptions::default()
        .with_infer_schema_length(Some(INFER_SCHEMA_ROWS))
        .with_has_header(true)
        .with_parse_options(CsvParseOptions::default().with_quote_char(None))
        .into_reader_with_file_handle(Cursor::new(bytes))
        .finish()
    {
        Ok(df) => return Ok(df),
        Err(e) => {
            debug!("CSV loading without quotes failed: {}", e);
        }
    }

    // Strategy 3: Pre-clean content, reading every column as text
    let cleaned = clean_csv_content(&String::from_utf8_lossy(bytes));
    CsvReadOptions::default()
        .with_infer_schema_length(Some(0))
        .with_has_header(true)
        .into_reader_with_file_handle(Cursor::new(cleaned.into_bytes()))
        .finish()
}

// ============================================================================
// Excel
// ============================================================================

/// First worksheet of an xlsx/xls workbook, first row as header.
fn read_workbook(filename: &str, bytes: &[u8]) -> Result<Dataset> {
    let parse_error = |reason: String| DetectionError::Parse {
        file: filename.to_string(),
        reason,
    };

    let mut workbook = calamine::open_workbook_auto_from_rs(Cursor::new(bytes))
        .map_err(|e| parse_error(e.to_string()))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or(DetectionError::EmptyDataset)?
        .map_err(|e| parse_error(e.to_string()))?;

    let mut rows = range.rows();
    let header: Vec<String> = rows
        .next()
        .ok_or(DetectionError::EmptyDataset)?
        .iter()
        .enumerate()
        .map(|(i, cell)| match cell {
            Data::Empty => format!("column_{}", i + 1),
            other => other.to_string(),
        })
        .collect();

    let body: Vec<Vec<Value>> = rows
        .map(|row| row.iter().map(cell_value).collect())
        .collect();
    if body.is_empty() {
        return Err(DetectionError::EmptyDataset);
    }

    debug!(file = filename, sheet_rows = body.len(), "Workbook sheet read");
    Dataset::from_rows(&header, body)
}

/// Convert a worksheet cell. Whole-number floats become integers, since
/// spreadsheets store every number as a float.
fn cell_value(cell: &Data) -> Value {
    match cell {
        Data::Int(v) => Value::Int(*v),
        Data::Float(v) if v.fract() == 0.0 && v.abs() < 9.0e15 => Value::Int(*v as i64),
        Data::Float(v) => Value::Float(*v),
        Data::Bool(b) => Value::Bool(*b),
        Data::String(s) => Value::Str(s.clone()),
        Data::DateTime(dt) => dt
            .as_datetime()
            .map_or_else(|| Value::Float(dt.as_f64()), Value::Timestamp),
        Data::DateTimeIso(s) => {
            utils::parse_datetime(s).map_or_else(|| Value::Str(s.clone()), Value::Timestamp)
        }
        Data::DurationIso(s) => Value::Str(s.clone()),
        Data::Error(_) | Data::Empty => Value::Null,
    }
}

/// Collapse doubled quotes and drop blank lines.
fn clean_csv_content(content: &str) -> String {
    content
        .replace("\"\"\"", "\"")
        .replace("\"\"", "\"")
        .lines()
        .filter(|line| !line.trim().is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{ColumnKind, Value};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_table_name_for() {
        assert_eq!(table_name_for("Sales Data-2024.csv"), "sales_data_2024");
        assert_eq!(table_name_for("/tmp/uploads/orders.JSON"), "orders");
    }

    #[test]
    fn test_read_csv() {
        let csv = b"id,amount,city\n1,10.5,Rome\n2,NULL,Oslo\n3,7,\n";
        let ds = read_table("orders.csv", csv).unwrap();
        assert_eq!(ds.height(), 3);
        assert_eq!(ds.column_names(), vec!["id", "amount", "city"]);
        let amount = ds.column("amount").unwrap();
        assert_eq!(amount.kind(), ColumnKind::Float);
        assert_eq!(amount.get(1), Some(&Value::Null));
        assert_eq!(ds.column("city").unwrap().get(2), Some(&Value::Null));
    }

    #[test]
    fn test_read_json_records() {
        let json = br#"[{"id": 1, "name": "a"}, {"id": 2, "name": null}]"#;
        let ds = read_table("people.json", json).unwrap();
        assert_eq!(ds.height(), 2);
        assert_eq!(ds.column("id").unwrap().kind(), ColumnKind::Integer);
        assert_eq!(ds.column("name").unwrap().null_count(), 1);
    }

    #[test]
    fn test_read_excel_workbook() {
        let bytes = include_bytes!("../tests/fixtures/inventory.xlsx");
        let ds = read_table("Inventory.xlsx", bytes).unwrap();

        assert_eq!(ds.height(), 4);
        assert_eq!(
            ds.column_names(),
            vec!["sku", "qty", "unit_price", "in_stock", "note"]
        );
        assert_eq!(ds.column("qty").unwrap().kind(), ColumnKind::Integer);
        let price = ds.column("unit_price").unwrap();
        assert_eq!(price.kind(), ColumnKind::Float);
        assert_eq!(price.get(1), Some(&Value::Null));
        assert_eq!(ds.column("in_stock").unwrap().kind(), ColumnKind::Boolean);
        assert_eq!(ds.column("note").unwrap().get(0), Some(&Value::Null));
        assert_eq!(
            ds.column("sku").unwrap().get(3),
            Some(&Value::Str("A4".to_string()))
        );
    }

    #[test]
    fn test_cell_value_conversion() {
        assert_eq!(cell_value(&Data::Float(3.0)), Value::Int(3));
        assert_eq!(cell_value(&Data::Float(2.5)), Value::Float(2.5));
        assert_eq!(cell_value(&Data::Empty), Value::Null);
        assert_eq!(
            cell_value(&Data::String("NULL".to_string())),
            Value::Str("NULL".to_string())
        );
    }

    #[test]
    fn test_corrupt_workbook_is_parse_error() {
        assert!(matches!(
            read_table("book.xlsx", b"not a zip archive"),
            Err(DetectionError::Parse { .. })
        ));
    }

    #[test]
    fn test_rejects_unsupported_and_empty() {
        assert!(matches!(
            read_table("deck.pptx", b"whatever"),
            Err(DetectionError::UnsupportedFormat(_))
        ));
        assert!(matches!(
            read_table("empty.csv", b""),
            Err(DetectionError::EmptyDataset)
        ));
        assert!(matches!(
            read_table("header_only.csv", b"a,b\n"),
            Err(DetectionError::EmptyDataset)
        ));
    }

    #[test]
    fn test_clean_csv_content() {
        let messy = "a,b\n\n\"\"\"x\"\"\",1\n";
        assert_eq!(clean_csv_content(messy), "a,b\n\"x\",1");
    }
}
