//! Checks on a table that references itself (`id` / `parent_id`).

use std::collections::{HashMap, HashSet};

use tracing::debug;

use crate::dataset::{ColumnData, Dataset, ValueKey};
use crate::error::{DetectionError, Result};
use crate::inference::{infer_key_columns, is_reference_name};
use crate::types::{Finding, Method, issue};

/// Longest parent chain followed before a hierarchy is reported as too deep.
pub const MAX_HIERARCHY_DEPTH: usize = 100;

pub const CIRCULAR_CONFIDENCE: f64 = 0.9;
pub const DEPTH_CONFIDENCE: f64 = 0.7;
pub const ORPHAN_REFERENCE_CONFIDENCE: f64 = 0.8;

/// Name fragments of columns that point at a parent row.
const PARENT_HINTS: [&str; 5] = ["parent", "manager", "reports_to", "supervisor", "boss"];

/// Minimum share of a column's values that must be existing keys for it to
/// count as a parent column without a hinting name.
const MIN_KEY_OVERLAP: f64 = 0.5;

/// Key and parent column of a self-referencing table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelfReference {
    pub key: String,
    pub parent: String,
}

/// Find the `(key, parent)` column pair of a self-referencing table.
pub fn infer_self_reference(dataset: &Dataset) -> Option<SelfReference> {
    let key = dataset
        .column_names()
        .into_iter()
        .find(|n| n.eq_ignore_ascii_case("id"))
        .map(str::to_string)
        .or_else(|| infer_key_columns(dataset).into_iter().next())?;
    let key_column = dataset.column(&key).ok()?;
    let keys: HashSet<ValueKey> = key_column.non_null().map(|(_, v)| v.key()).collect();

    let candidates = || dataset.columns().iter().filter(|c| c.name() != key);

    let hinted = candidates().find(|c| {
        let lower = c.name().to_lowercase();
        PARENT_HINTS.iter().any(|hint| lower.contains(hint))
    });
    let parent = hinted.or_else(|| {
        candidates()
            .filter(|c| is_reference_name(c.name()))
            .find(|c| key_overlap(c, &keys) >= MIN_KEY_OVERLAP)
    })?;

    Some(SelfReference {
        key,
        parent: parent.name().to_string(),
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Parent {
    Root,
    Missing,
    Row(usize),
}

fn key_overlap(column: &ColumnData, keys: &HashSet<ValueKey>) -> f64 {
    let mut total = 0usize;
    let mut hits = 0usize;
    for (_, value) in column.non_null() {
        total += 1;
        if keys.contains(&value.key()) {
            hits += 1;
        }
    }
    if total == 0 { 0.0 } else { hits as f64 / total as f64 }
}

/// Walk every row's parent chain.
///
/// Rows whose chain returns to themselves are circular, chains longer than
/// [`MAX_HIERARCHY_DEPTH`] are too deep, and parents that match no key are
/// orphaned references.
pub fn check_hierarchy(table: &str, dataset: &Dataset) -> Result<Vec<Finding>> {
    let reference = infer_self_reference(dataset).ok_or_else(|| DetectionError::NoJoinKey {
        left: table.to_string(),
        right: table.to_string(),
    })?;
    debug!(table, key = %reference.key, parent = %reference.parent, "Self reference inferred");

    let key_column = dataset.column(&reference.key)?;
    let parent_column = dataset.column(&reference.parent)?;

    let mut row_of: HashMap<ValueKey, usize> = HashMap::new();
    for (row, value) in key_column.non_null() {
        row_of.entry(value.key()).or_insert(row);
    }
    let parent_of = |row: usize| -> Parent {
        match parent_column.get(row).filter(|v| !v.is_null()) {
            None => Parent::Root,
            Some(value) => row_of
                .get(&value.key())
                .map_or(Parent::Missing, |&r| Parent::Row(r)),
        }
    };

    let mut findings = Vec::new();
    for start in 0..dataset.height() {
        let parent_value = parent_column
            .get(start)
            .map(ToString::to_string)
            .unwrap_or_default();

        if parent_of(start) == Parent::Missing {
            findings.push(
                Finding::new(start, issue::ORPHANED_REFERENCE, Method::Relationship)
                    .table(table)
                    .column(&reference.parent)
                    .value(format!("{}={parent_value}", reference.parent))
                    .details(format!(
                        "{} {parent_value} matches no {}",
                        reference.parent, reference.key
                    ))
                    .confidence(ORPHAN_REFERENCE_CONFIDENCE),
            );
            continue;
        }

        let mut visited = HashSet::from([start]);
        let mut current = start;
        let mut depth = 0usize;
        while let Parent::Row(next) = parent_of(current) {
            if next == start {
                findings.push(
                    Finding::new(start, issue::CIRCULAR_REFERENCE, Method::Relationship)
                        .table(table)
                        .column(&reference.parent)
                        .value(format!("{}={parent_value}", reference.parent))
                        .details(format!(
                            "Parent chain returns to this row after {} step(s)",
                            depth + 1
                        ))
                        .confidence(CIRCULAR_CONFIDENCE),
                );
                break;
            }
            // a cycle this row does not belong to
            if !visited.insert(next) {
                break;
            }
            depth += 1;
            if depth > MAX_HIERARCHY_DEPTH {
                findings.push(
                    Finding::new(start, issue::EXCESSIVE_HIERARCHY_DEPTH, Method::Relationship)
                        .table(table)
                        .column(&reference.parent)
                        .value(format!("depth>{MAX_HIERARCHY_DEPTH}"))
                        .details(format!(
                            "Parent chain is deeper than {MAX_HIERARCHY_DEPTH} levels"
                        ))
                        .confidence(DEPTH_CONFIDENCE),
                );
                break;
            }
            current = next;
        }
    }
    Ok(findings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::Value;
    use pretty_assertions::assert_eq;

    fn tree(rows: Vec<(i64, Option<i64>)>) -> Dataset {
        let rows = rows
            .into_iter()
            .map(|(id, parent)| vec![Value::Int(id), parent.map_or(Value::Null, Value::Int)])
            .collect();
        Dataset::from_rows(&["id", "parent_id"], rows).unwrap()
    }

    #[test]
    fn test_infer_self_reference() {
        let ds = tree(vec![(1, None), (2, Some(1))]);
        assert_eq!(
            infer_self_reference(&ds),
            Some(SelfReference {
                key: "id".to_string(),
                parent: "parent_id".to_string()
            })
        );
    }

    #[test]
    fn test_two_row_cycle() {
        let ds = tree(vec![(1, Some(2)), (2, Some(1))]);
        let findings = check_hierarchy("nodes", &ds).unwrap();
        assert_eq!(findings.len(), 2);
        assert!(findings.iter().all(|f| f.issue_type == issue::CIRCULAR_REFERENCE));
        assert_eq!(findings[0].table.as_deref(), Some("nodes"));
        assert_eq!(findings[0].confidence, Some(CIRCULAR_CONFIDENCE));
    }

    #[test]
    fn test_row_leading_into_foreign_cycle_is_not_circular() {
        let ds = tree(vec![(1, Some(2)), (2, Some(1)), (3, Some(1))]);
        let findings = check_hierarchy("nodes", &ds).unwrap();
        let rows: Vec<usize> = findings.iter().map(|f| f.row_index).collect();
        assert_eq!(rows, vec![0, 1]);
    }

    #[test]
    fn test_orphaned_reference() {
        let ds = tree(vec![(1, None), (2, Some(1)), (3, Some(77))]);
        let findings = check_hierarchy("nodes", &ds).unwrap();
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].issue_type, issue::ORPHANED_REFERENCE);
        assert_eq!(findings[0].row_index, 2);
        assert_eq!(findings[0].value, "parent_id=77");
    }

    #[test]
    fn test_deep_chain() {
        let mut rows = vec![(0, None)];
        rows.extend((1..=120).map(|i| (i, Some(i - 1))));
        let ds = tree(rows);
        let findings = check_hierarchy("chain", &ds).unwrap();
        assert!(!findings.is_empty());
        assert!(findings.iter().all(|f| f.issue_type == issue::EXCESSIVE_HIERARCHY_DEPTH));
        // rows 0..=100 reach the root within the cap
        assert_eq!(findings[0].row_index, 101);
        assert_eq!(findings.len(), 20);
    }

    #[test]
    fn test_no_self_reference_is_an_error() {
        let ds = Dataset::from_rows(&["name"], vec![vec![Value::Str("a".to_string())]]).unwrap();
        assert!(matches!(
            check_hierarchy("plain", &ds),
            Err(DetectionError::NoJoinKey { .. })
        ));
    }
}
