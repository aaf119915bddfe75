//! Table registry handlers

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};

use crate::error::ApiResult;
use crate::state::{AppState, TableSummary};

pub async fn list(State(state): State<AppState>) -> Json<Vec<TableSummary>> {
    Json(state.store.list())
}

pub async fn delete(
    State(state): State<AppState>,
    Path(table): Path<String>,
) -> ApiResult<StatusCode> {
    state.store.remove(&table)?;
    Ok(StatusCode::NO_CONTENT)
}
