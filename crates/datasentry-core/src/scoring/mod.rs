//! Finding normalization and ranking.
//!
//! Detectors emit findings with optional confidences and no notion of how
//! much an issue type matters. The scorer fills in missing confidences,
//! attaches a fixed per-issue-type weight, drops low-confidence findings and
//! ranks the rest by `confidence × weight`.

mod scorer;

pub use scorer::{AnomalyScorer, DEFAULT_CONFIDENCE, DEFAULT_WEIGHT, method_weight};
