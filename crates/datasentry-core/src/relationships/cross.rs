//! Checks between two distinct tables joined on an inferred key.

use std::collections::{BTreeMap, HashMap, HashSet};

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use super::Cardinality;
use crate::dataset::{Dataset, Value, ValueKey};
use crate::error::{DetectionError, Result};
use crate::inference::{is_reference_name, shared_columns};
use crate::types::{Finding, Method, issue};

pub const CARDINALITY_CONFIDENCE: f64 = 0.9;
pub const REFERENTIAL_CONFIDENCE: f64 = 0.8;
pub const UNREFERENCED_CONFIDENCE: f64 = 0.5;
pub const CONFLICT_CONFIDENCE: f64 = 0.8;

/// `_id` in any case, or a camelCase `Id`/`ID` after a lowercase letter or
/// digit. Matched on the raw name so `paid` and `valid` keep their tails.
static KEY_SUFFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:_[iI][dD]|([a-z0-9])(?:Id|ID))$").expect("Invalid regex: key suffix")
});

/// Join column on each side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinKey {
    pub left: String,
    pub right: String,
}

fn is_identifier_like(name: &str) -> bool {
    is_reference_name(name) || name.eq_ignore_ascii_case("id") || name.ends_with("_key")
}

/// Drop a key suffix, then lowercase and drop separators:
/// `Customer_ID` -> `customer`.
fn normalize_key_name(name: &str) -> String {
    let stripped = KEY_SUFFIX.replace(name, "${1}");
    let base = if stripped.is_empty() { name } else { &stripped };
    base.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// Pick the column pair two tables join on.
///
/// Exact name matches win, identifier-like names first. Otherwise names are
/// compared after dropping key suffixes and separators.
pub fn infer_join_key(
    left_name: &str,
    left: &Dataset,
    right_name: &str,
    right: &Dataset,
) -> Result<JoinKey> {
    let shared = shared_columns(left, right);
    if let Some(name) = shared
        .iter()
        .find(|n| is_identifier_like(n))
        .or_else(|| shared.first())
    {
        return Ok(JoinKey {
            left: name.to_string(),
            right: name.to_string(),
        });
    }

    let right_by_token: Vec<(String, &str)> = right
        .column_names()
        .into_iter()
        .map(|n| (normalize_key_name(n), n))
        .collect();
    let mut fuzzy: Vec<JoinKey> = left
        .column_names()
        .into_iter()
        .filter_map(|l| {
            let token = normalize_key_name(l);
            right_by_token
                .iter()
                .find(|(t, _)| *t == token)
                .map(|(_, r)| JoinKey {
                    left: l.to_string(),
                    right: r.to_string(),
                })
        })
        .collect();
    // stable: identifier-like pairs first
    fuzzy.sort_by_key(|k| !(is_identifier_like(&k.left) || is_identifier_like(&k.right)));

    fuzzy.into_iter().next().ok_or_else(|| DetectionError::NoJoinKey {
        left: left_name.to_string(),
        right: right_name.to_string(),
    })
}

/// Rows per non-null key value, in first-appearance order.
fn rows_by_key(dataset: &Dataset, column: &str) -> Result<Vec<(ValueKey, Vec<usize>)>> {
    let mut index: HashMap<ValueKey, usize> = HashMap::new();
    let mut groups: Vec<(ValueKey, Vec<usize>)> = Vec::new();
    for (row, value) in dataset.column(column)?.non_null() {
        let key = value.key();
        match index.get(&key) {
            Some(&slot) => groups[slot].1.push(row),
            None => {
                index.insert(key.clone(), groups.len());
                groups.push((key, vec![row]));
            }
        }
    }
    Ok(groups)
}

fn cell(dataset: &Dataset, column: &str, row: usize) -> Value {
    dataset
        .column(column)
        .ok()
        .and_then(|c| c.get(row))
        .cloned()
        .unwrap_or(Value::Null)
}

fn duplicate_key_findings(
    table: &str,
    dataset: &Dataset,
    column: &str,
    groups: &[(ValueKey, Vec<usize>)],
    cardinality: Cardinality,
) -> Vec<Finding> {
    let mut findings = Vec::new();
    for (_, rows) in groups.iter().filter(|(_, rows)| rows.len() > 1) {
        for &row in rows {
            let value = cell(dataset, column, row);
            findings.push(
                Finding::new(row, issue::CARDINALITY_VIOLATION, Method::Relationship)
                    .table(table)
                    .column(column)
                    .value(format!("{column}={value}"))
                    .details(format!(
                        "{column} {value} appears {} times in '{table}', {cardinality} allows one",
                        rows.len()
                    ))
                    .confidence(CARDINALITY_CONFIDENCE),
            );
        }
    }
    findings
}

/// All checks between two distinct tables.
pub fn check_tables(
    left_name: &str,
    left: &Dataset,
    right_name: &str,
    right: &Dataset,
    cardinality: Cardinality,
) -> Result<Vec<Finding>> {
    let key = infer_join_key(left_name, left, right_name, right)?;
    debug!(
        left = left_name,
        right = right_name,
        left_key = %key.left,
        right_key = %key.right,
        "Join key inferred"
    );

    let left_groups = rows_by_key(left, &key.left)?;
    let right_groups = rows_by_key(right, &key.right)?;

    let mut findings = Vec::new();

    // cardinality
    if cardinality.left_is_unique() {
        findings.extend(duplicate_key_findings(
            left_name,
            left,
            &key.left,
            &left_groups,
            cardinality,
        ));
    }
    if cardinality.right_is_unique() {
        findings.extend(duplicate_key_findings(
            right_name,
            right,
            &key.right,
            &right_groups,
            cardinality,
        ));
    }

    // referential integrity, both directions
    let left_keys: HashSet<&ValueKey> = left_groups.iter().map(|(k, _)| k).collect();
    let right_keys: HashSet<&ValueKey> = right_groups.iter().map(|(k, _)| k).collect();
    for (k, rows) in &left_groups {
        if right_keys.contains(k) {
            continue;
        }
        for &row in rows {
            let value = cell(left, &key.left, row);
            findings.push(
                Finding::new(row, issue::REFERENTIAL_VIOLATION, Method::Relationship)
                    .table(left_name)
                    .column(&key.left)
                    .value(format!("{}={value}", key.left))
                    .details(format!("{} {value} has no match in '{right_name}'", key.left))
                    .confidence(REFERENTIAL_CONFIDENCE),
            );
        }
    }
    for (k, rows) in &right_groups {
        if left_keys.contains(k) {
            continue;
        }
        for &row in rows {
            let value = cell(right, &key.right, row);
            findings.push(
                Finding::new(row, issue::UNREFERENCED_KEYS, Method::Relationship)
                    .table(right_name)
                    .column(&key.right)
                    .value(format!("{}={value}", key.right))
                    .details(format!("{} {value} is not referenced by '{left_name}'", key.right))
                    .confidence(UNREFERENCED_CONFIDENCE),
            );
        }
    }

    findings.extend(conflicting_values(left_name, left, right, &key, &left_groups, &right_groups));
    Ok(findings)
}

/// Non-key columns present in both tables whose values disagree for the
/// same key. Compares against the first matching right row.
fn conflicting_values(
    left_name: &str,
    left: &Dataset,
    right: &Dataset,
    key: &JoinKey,
    left_groups: &[(ValueKey, Vec<usize>)],
    right_groups: &[(ValueKey, Vec<usize>)],
) -> Vec<Finding> {
    let overlap: Vec<&str> = shared_columns(left, right)
        .into_iter()
        .filter(|c| *c != key.left && *c != key.right)
        .collect();
    if overlap.is_empty() {
        return Vec::new();
    }

    let right_first: BTreeMap<&ValueKey, usize> =
        right_groups.iter().map(|(k, rows)| (k, rows[0])).collect();

    let mut findings = Vec::new();
    for (k, rows) in left_groups {
        let Some(&right_row) = right_first.get(k) else {
            continue;
        };
        for &row in rows {
            for column in &overlap {
                let a = cell(left, column, row);
                let b = cell(right, column, right_row);
                if a.is_null() || b.is_null() || a.key() == b.key() {
                    continue;
                }
                findings.push(
                    Finding::new(row, issue::INCONSISTENT_UPDATE, Method::Relationship)
                        .table(left_name)
                        .column(*column)
                        .value(format!("{column}: {a} vs {b}"))
                        .details(format!(
                            "{} {} has '{a}' here but '{b}' in the joined table",
                            key.left,
                            cell(left, &key.left, row)
                        ))
                        .confidence(CONFLICT_CONFIDENCE),
                );
            }
        }
    }
    findings
}
