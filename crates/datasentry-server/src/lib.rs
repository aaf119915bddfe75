//! HTTP surface for datasentry anomaly detection.
//!
//! # Routes
//!
//! | Method   | Path              | Handler                                  |
//! |----------|-------------------|------------------------------------------|
//! | `POST`   | `/upload`         | register a table file and analyze it     |
//! | `GET`    | `/analyze/:table` | analyze a registered table               |
//! | `GET`    | `/tables`         | list registered tables                   |
//! | `DELETE` | `/tables/:table`  | drop a registered table                  |
//! | `POST`   | `/relationships`  | cross-table and hierarchy checks         |
//! | `GET`    | `/health`         | liveness                                 |
//!
//! `mode` (`sql` | `ml`) and `contamination` are accepted as query parameters
//! on `/upload` and `/analyze/:table`.

pub mod error;
pub mod handlers;
pub mod state;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{delete, get, post},
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

pub use error::{ApiError, ApiResult};
pub use state::{AppState, TableStore, TableSummary};

/// Default upload limit in bytes.
pub const DEFAULT_BODY_LIMIT: usize = 50 * 1024 * 1024;

/// Create the main router with all routes
pub fn create_router(state: AppState, body_limit: usize) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handlers::health::check))
        .route("/upload", post(handlers::analyze::upload))
        .route("/analyze/:table", get(handlers::analyze::analyze_table))
        .route("/tables", get(handlers::tables::list))
        .route("/tables/:table", delete(handlers::tables::delete))
        .route("/relationships", post(handlers::relationships::analyze))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
