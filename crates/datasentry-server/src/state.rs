//! Application State Management
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │                  AppState                    │
//! ├──────────────────────────────────────────────┤
//! │  store: Arc<TableStore>                      │
//! │  ┌────────────────────────────────────────┐  │
//! │  │ RwLock<HashMap<String, Arc<Dataset>>>  │  │
//! │  └────────────────────────────────────────┘  │
//! │  config: Arc<DetectionConfig>                │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! # Thread Safety
//!
//! The registry is wrapped in `RwLock` from `parking_lot`. Datasets are
//! immutable once registered and handed out as `Arc`s, so the lock is only
//! held for map lookups and never while a detector runs.
//!
//! # Session-Only State
//!
//! Registered tables live in memory for the lifetime of the process.

use std::collections::HashMap;
use std::sync::Arc;

use datasentry_core::relationships::TableLookup;
use datasentry_core::{Dataset, DetectionConfig, DetectionError};
use parking_lot::RwLock;
use serde::Serialize;
use tracing::info;

/// Row and column counts of a registered table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableSummary {
    pub name: String,
    pub row_count: usize,
    pub column_count: usize,
}

/// In-memory registry of uploaded tables, keyed by table name.
#[derive(Debug, Default)]
pub struct TableStore {
    tables: RwLock<HashMap<String, Arc<Dataset>>>,
}

static_assertions::assert_impl_all!(TableStore: Send, Sync);

impl TableStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a table, replacing any table with the same name.
    pub fn insert(&self, name: impl Into<String>, dataset: Dataset) -> Arc<Dataset> {
        let name = name.into();
        let dataset = Arc::new(dataset);
        let replaced = self
            .tables
            .write()
            .insert(name.clone(), Arc::clone(&dataset))
            .is_some();
        info!(table = %name, rows = dataset.height(), replaced, "Table registered");
        dataset
    }

    pub fn get(&self, name: &str) -> Result<Arc<Dataset>, DetectionError> {
        self.require(name)
    }

    /// All tables, sorted by name.
    pub fn list(&self) -> Vec<TableSummary> {
        let mut tables: Vec<TableSummary> = self
            .tables
            .read()
            .iter()
            .map(|(name, dataset)| TableSummary {
                name: name.clone(),
                row_count: dataset.height(),
                column_count: dataset.width(),
            })
            .collect();
        tables.sort_by(|a, b| a.name.cmp(&b.name));
        tables
    }

    pub fn remove(&self, name: &str) -> Result<Arc<Dataset>, DetectionError> {
        let removed = self
            .tables
            .write()
            .remove(name)
            .ok_or_else(|| DetectionError::TableNotFound(name.to_string()))?;
        info!(table = %name, "Table removed");
        Ok(removed)
    }

    pub fn len(&self) -> usize {
        self.tables.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.read().is_empty()
    }
}

impl TableLookup for TableStore {
    fn lookup(&self, name: &str) -> Option<Arc<Dataset>> {
        self.tables.read().get(name).cloned()
    }
}

/// Shared application state
#[derive(Debug, Clone)]
pub struct AppState {
    pub store: Arc<TableStore>,
    pub config: Arc<DetectionConfig>,
}

impl AppState {
    pub fn new(config: DetectionConfig) -> Self {
        Self {
            store: Arc::new(TableStore::new()),
            config: Arc::new(config),
        }
    }
}
