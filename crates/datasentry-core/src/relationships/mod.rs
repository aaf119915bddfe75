//! Relationship analysis across tables and within self-referencing tables.
//!
//! A relationship between two distinct tables is checked on an inferred
//! join key: declared [`Cardinality`], keys missing in either direction and
//! shared columns that disagree. A table related to itself is checked as a
//! hierarchy instead (cycles, excessive depth, dangling parents).
//!
//! Findings carry the table they point into and use
//! [`Method::Relationship`](crate::types::Method::Relationship).

pub mod cross;
pub mod hierarchy;

pub use cross::{JoinKey, infer_join_key};
pub use hierarchy::{MAX_HIERARCHY_DEPTH, SelfReference, infer_self_reference};

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tracing::{info, warn};

use crate::dataset::Dataset;
use crate::error::{DetectionError, Result};
use crate::types::{Diagnostic, Finding};

/// Declared multiplicity between a left and a right table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Cardinality {
    #[default]
    OneToOne,
    OneToMany,
    ManyToOne,
}

impl Cardinality {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::OneToOne => "1:1",
            Self::OneToMany => "1:M",
            Self::ManyToOne => "M:1",
        }
    }

    /// Each key may appear at most once in the left table.
    pub fn left_is_unique(self) -> bool {
        matches!(self, Self::OneToOne | Self::OneToMany)
    }

    /// Each key may appear at most once in the right table.
    pub fn right_is_unique(self) -> bool {
        matches!(self, Self::OneToOne | Self::ManyToOne)
    }
}

impl fmt::Display for Cardinality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Cardinality {
    type Err = DetectionError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_uppercase().replace(' ', "").as_str() {
            "1:1" => Ok(Self::OneToOne),
            "1:M" | "1:N" => Ok(Self::OneToMany),
            "M:1" | "N:1" => Ok(Self::ManyToOne),
            _ => Err(DetectionError::InvalidCardinality(s.to_string())),
        }
    }
}

impl Serialize for Cardinality {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Cardinality {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// One requested relationship between two registered tables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationshipSpec {
    pub left: String,
    pub right: String,
    #[serde(default)]
    pub cardinality: Cardinality,
}

impl RelationshipSpec {
    pub fn new(
        left: impl Into<String>,
        right: impl Into<String>,
        cardinality: Cardinality,
    ) -> Self {
        Self {
            left: left.into(),
            right: right.into(),
            cardinality,
        }
    }

    pub fn is_self(&self) -> bool {
        self.left == self.right
    }

    fn identity(&self) -> PairIdentity {
        if self.is_self() {
            PairIdentity::SelfRelation(self.left.clone())
        } else if self.left <= self.right {
            PairIdentity::Between(self.left.clone(), self.right.clone())
        } else {
            PairIdentity::Between(self.right.clone(), self.left.clone())
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum PairIdentity {
    SelfRelation(String),
    Between(String, String),
}

/// Source of registered tables.
pub trait TableLookup {
    fn lookup(&self, name: &str) -> Option<Arc<Dataset>>;

    fn require(&self, name: &str) -> Result<Arc<Dataset>> {
        self.lookup(name)
            .ok_or_else(|| DetectionError::TableNotFound(name.to_string()))
    }
}

impl TableLookup for HashMap<String, Arc<Dataset>> {
    fn lookup(&self, name: &str) -> Option<Arc<Dataset>> {
        self.get(name).cloned()
    }
}

/// Check one relationship. Equal names run the hierarchy checks.
pub fn analyze_relationship(
    left_name: &str,
    left: &Dataset,
    right_name: &str,
    right: &Dataset,
    cardinality: Cardinality,
) -> Result<Vec<Finding>> {
    if left_name == right_name {
        hierarchy::check_hierarchy(left_name, left)
    } else {
        cross::check_tables(left_name, left, right_name, right, cardinality)
    }
}

/// Findings and skipped pairs of a batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RelationshipAnalysis {
    pub findings: Vec<Finding>,
    pub diagnostics: Vec<Diagnostic>,
    pub pairs_analyzed: usize,
}

/// Analyze every distinct relationship once.
///
/// `a~b` and `b~a` are the same pair; the first request wins. A failing pair
/// (unknown table, no join key) is recorded as a diagnostic.
pub fn analyze_relationships(
    lookup: &impl TableLookup,
    specs: &[RelationshipSpec],
) -> RelationshipAnalysis {
    let mut seen = HashSet::new();
    let mut analysis = RelationshipAnalysis::default();

    for spec in specs {
        if !seen.insert(spec.identity()) {
            continue;
        }
        let pair = format!("{}~{}", spec.left, spec.right);

        let result = lookup.require(&spec.left).and_then(|left| {
            let right = if spec.is_self() {
                Arc::clone(&left)
            } else {
                lookup.require(&spec.right)?
            };
            analyze_relationship(&spec.left, &left, &spec.right, &right, spec.cardinality)
        });

        match result {
            Ok(findings) => {
                info!(
                    pair = %pair,
                    cardinality = %spec.cardinality,
                    findings = findings.len(),
                    "Relationship analyzed"
                );
                analysis.pairs_analyzed += 1;
                analysis.findings.extend(findings);
            }
            Err(e) => {
                warn!(pair = %pair, error = %e, "Relationship analysis failed, skipping");
                analysis
                    .diagnostics
                    .push(Diagnostic::from_error("relationship", Some(&pair), &e));
            }
        }
    }
    analysis
}
