//! Detectors run by the ensemble.
//!
//! Column-type detectors look at one column at a time. The mutation
//! families (insertion, deletion, update) are lists of independent
//! [`Rule`]s; [`run_rules`] executes them so that a failing rule yields a
//! [`Diagnostic`] instead of aborting its siblings.

pub mod categorical;
pub mod deletion;
pub mod insertion;
pub mod numeric;
pub mod update;

pub use categorical::CategoricalRarityDetector;
pub use deletion::DeletionDetector;
pub use insertion::InsertionDetector;
pub use numeric::NumericOutlierDetector;
pub use update::UpdateDetector;

use tracing::{debug, warn};

use crate::dataset::Dataset;
use crate::error::Result;
use crate::inference::InferredSchema;
use crate::types::{Diagnostic, FeatureImportance, Finding, Method};

/// Output of one detector.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DetectorOutput {
    pub findings: Vec<Finding>,
    pub feature_importance: Vec<FeatureImportance>,
    pub diagnostics: Vec<Diagnostic>,
}

impl DetectorOutput {
    pub fn from_findings(findings: Vec<Finding>) -> Self {
        Self {
            findings,
            ..Self::default()
        }
    }
}

/// A detector over a whole dataset.
pub trait Detector: Send + Sync {
    /// Name used in logs and diagnostics.
    fn name(&self) -> &'static str;

    /// Method tag of the findings it emits.
    fn method(&self) -> Method;

    fn detect(&self, dataset: &Dataset, schema: &InferredSchema) -> Result<DetectorOutput>;
}

/// Signature of one rule check.
pub type RuleFn = fn(&Dataset, &InferredSchema) -> Result<Vec<Finding>>;

/// A named, independently failing check.
#[derive(Clone, Copy)]
pub struct Rule {
    pub name: &'static str,
    pub check: RuleFn,
}

impl std::fmt::Debug for Rule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rule").field("name", &self.name).finish()
    }
}

/// Run every rule, isolating failures.
pub fn run_rules(
    detector: &str,
    rules: &[Rule],
    dataset: &Dataset,
    schema: &InferredSchema,
) -> DetectorOutput {
    let mut output = DetectorOutput::default();
    for rule in rules {
        match (rule.check)(dataset, schema) {
            Ok(findings) => {
                debug!(detector, rule = rule.name, count = findings.len(), "Rule finished");
                output.findings.extend(findings);
            }
            Err(e) => {
                warn!(detector, rule = rule.name, error = %e, "Rule failed, skipping");
                output
                    .diagnostics
                    .push(Diagnostic::from_error(detector, Some(rule.name), &e));
            }
        }
    }
    output
}
