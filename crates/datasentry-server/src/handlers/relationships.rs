//! Relationship analysis handler

use axum::{Json, extract::State};
use datasentry_core::{
    AnomalyScorer, Diagnostic, RelationshipSpec, ScoredFinding, analyze_relationships,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct RelationshipRequest {
    pub relationships: Vec<RelationshipSpec>,
    /// Defaults to the server's configured confidence floor
    pub min_confidence: Option<f64>,
}

#[derive(Debug, Serialize)]
pub struct RelationshipResponse {
    pub pairs_analyzed: usize,
    pub total_anomalies: usize,
    pub anomalies: Vec<ScoredFinding>,
    pub diagnostics: Vec<Diagnostic>,
}

/// `POST /relationships`: check every requested table pair.
pub async fn analyze(
    State(state): State<AppState>,
    Json(request): Json<RelationshipRequest>,
) -> ApiResult<Json<RelationshipResponse>> {
    if request.relationships.is_empty() {
        return Err(ApiError::BadRequest(
            "At least one relationship is required".to_string(),
        ));
    }
    let min_confidence = request
        .min_confidence
        .unwrap_or(state.config.min_confidence);
    if !(0.0..=1.0).contains(&min_confidence) {
        return Err(ApiError::BadRequest(format!(
            "min_confidence must be between 0 and 1, got {min_confidence}"
        )));
    }

    let store = Arc::clone(&state.store);
    let analysis = tokio::task::spawn_blocking(move || {
        analyze_relationships(store.as_ref(), &request.relationships)
    })
    .await?;

    let anomalies = AnomalyScorer::new(min_confidence).score(analysis.findings);
    Ok(Json(RelationshipResponse {
        pairs_analyzed: analysis.pairs_analyzed,
        total_anomalies: anomalies.len(),
        anomalies,
        diagnostics: analysis.diagnostics,
    }))
}
