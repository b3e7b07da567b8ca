use std::sync::Arc;

use anyhow::{Context, Result};
use visit_tracker_core::{VisitTracker, VisitTrackerResult};

use super::{config::Config, error::ApiError};

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub tracker: VisitTracker,
    pub config: Arc<Config>,
}

impl AppState {
    /// Open the configured database.
    pub fn open(config: Config) -> Result<Self> {
        let tracker = VisitTracker::open(&config.db_path)
            .with_context(|| format!("Failed to open database at {}", config.db_path))?;

        Ok(Self::new(tracker, config))
    }

    pub fn new(tracker: VisitTracker, config: Config) -> Self {
        Self {
            tracker,
            config: Arc::new(config),
        }
    }

    /// Run a store operation on the blocking pool.
    ///
    /// SQLite calls block, so they never run on the async executor.
    pub async fn run<T, F>(&self, op: F) -> Result<T, ApiError>
    where
        F: FnOnce(&VisitTracker) -> VisitTrackerResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let tracker = self.tracker.clone();
        tokio::task::spawn_blocking(move || op(&tracker))
            .await
            .map_err(|e| ApiError::Internal(format!("Store task failed: {e}")))?
            .map_err(ApiError::from)
    }
}
