//! Upload and analysis handlers

use std::sync::Arc;

use axum::{
    Json,
    extract::{Multipart, Path, Query, State},
};
use datasentry_core::{
    AnomalyEnsemble, AnomalyReport, ColumnSchema, Dataset, DetectionConfig, DetectionError,
    DetectionMode, ingest,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Rows included in the response preview.
pub const SAMPLE_ROWS: usize = 10;

/// Multipart field holding the uploaded file.
const FILE_FIELD: &str = "file";

#[derive(Debug, Default, Deserialize)]
pub struct AnalyzeQuery {
    /// `sql` (default) or `ml`
    pub mode: Option<String>,
    /// Overrides the learned detector's contamination for this request
    pub contamination: Option<f64>,
}

impl AnalyzeQuery {
    fn resolve(
        &self,
        base: &DetectionConfig,
    ) -> Result<(DetectionConfig, DetectionMode), DetectionError> {
        let mode = match &self.mode {
            Some(raw) => raw.parse()?,
            None => DetectionMode::default(),
        };
        let mut config = base.clone();
        if let Some(contamination) = self.contamination {
            config.learned.contamination = contamination;
        }
        config.validate()?;
        Ok((config, mode))
    }
}

#[derive(Debug, Serialize)]
pub struct AnalysisResponse {
    pub table_name: String,
    pub row_count: usize,
    pub schema: Vec<ColumnSchema>,
    pub sample: Vec<serde_json::Map<String, serde_json::Value>>,
    #[serde(flatten)]
    pub report: AnomalyReport,
    pub formatted_output: String,
}

async fn analyze(
    table_name: String,
    dataset: Arc<Dataset>,
    config: DetectionConfig,
    mode: DetectionMode,
) -> ApiResult<Json<AnalysisResponse>> {
    let report = tokio::task::spawn_blocking({
        let dataset = Arc::clone(&dataset);
        move || AnomalyEnsemble::new(config).detect(&dataset, mode)
    })
    .await?;

    info!(
        table = %table_name,
        anomalies = report.anomaly_event_count,
        quality_score = report.quality_metrics.quality_score,
        "Analysis served"
    );

    Ok(Json(AnalysisResponse {
        row_count: dataset.height(),
        schema: dataset.schema(),
        sample: dataset.sample_rows(SAMPLE_ROWS),
        formatted_output: report.formatted_summary(),
        report,
        table_name,
    }))
}

/// `POST /upload`: register a CSV, JSON or Excel file and analyze it.
pub async fn upload(
    State(state): State<AppState>,
    Query(query): Query<AnalyzeQuery>,
    mut multipart: Multipart,
) -> ApiResult<Json<AnalysisResponse>> {
    let (config, mode) = query.resolve(&state.config)?;

    let mut upload = None;
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }
        let filename = field
            .file_name()
            .map(str::to_string)
            .ok_or_else(|| ApiError::BadRequest("Uploaded file has no filename".to_string()))?;
        let bytes = field.bytes().await?;
        upload = Some((filename, bytes));
    }
    let (filename, bytes) = upload.ok_or_else(|| {
        ApiError::BadRequest(format!("Missing multipart field '{FILE_FIELD}'"))
    })?;

    let table_name = ingest::table_name_for(&filename);
    info!(file = %filename, table = %table_name, bytes = bytes.len(), "Upload received");

    let dataset =
        tokio::task::spawn_blocking(move || ingest::read_table(&filename, &bytes)).await??;
    let dataset = state.store.insert(table_name.clone(), dataset);

    analyze(table_name, dataset, config, mode).await
}

/// `GET /analyze/:table`: analyze a registered table.
pub async fn analyze_table(
    State(state): State<AppState>,
    Path(table): Path<String>,
    Query(query): Query<AnalyzeQuery>,
) -> ApiResult<Json<AnalysisResponse>> {
    let (config, mode) = query.resolve(&state.config)?;
    let dataset = state.store.get(&table)?;
    analyze(table, dataset, config, mode).await
}
