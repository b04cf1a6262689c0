use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{debug, info};
use triad_models::DataConfig;

use crate::aggregator::DataAggregator;
use crate::error::DataError;
use crate::snapshot::SnapshotReader;

/// Lifecycle owner for the data layer.
///
/// A run acquires the aggregator through `initialize_all` and must release
/// it through `close_all` on every exit path. Both calls are idempotent so
/// the release can sit on the unconditional path of the loop controller.
pub struct DataSourceRegistry {
    config: DataConfig,
    aggregator: Mutex<Option<Arc<DataAggregator>>>,
}

impl DataSourceRegistry {
    pub fn new(config: DataConfig) -> Self {
        Self {
            config,
            aggregator: Mutex::new(None),
        }
    }

    /// Pre-initialized registry over an existing reader. Used by tests to
    /// run against a seeded in-memory database.
    pub fn from_reader(reader: SnapshotReader, config: DataConfig) -> Self {
        let aggregator = DataAggregator::new(
            reader,
            config.memory_max_capacity,
            Duration::from_secs(config.memory_ttl_seconds),
        );
        Self {
            config,
            aggregator: Mutex::new(Some(Arc::new(aggregator))),
        }
    }

    /// Open the snapshot database and build the shared aggregator.
    /// Calling again while initialized is a no-op.
    pub async fn initialize_all(&self) -> Result<(), DataError> {
        let mut slot = self.aggregator.lock().await;
        if slot.is_some() {
            debug!("Data sources already initialized");
            return Ok(());
        }

        let reader = SnapshotReader::open(&self.config.snapshot_path)?;
        info!(path = %self.config.snapshot_path, "Snapshot database opened");
        *slot = Some(Arc::new(DataAggregator::new(
            reader,
            self.config.memory_max_capacity,
            Duration::from_secs(self.config.memory_ttl_seconds),
        )));
        Ok(())
    }

    /// Release the aggregator and its SQLite connection. Idempotent.
    pub async fn close_all(&self) {
        let mut slot = self.aggregator.lock().await;
        if slot.take().is_some() {
            info!("Data sources closed");
        }
    }

    /// The shared aggregator. `Unavailable` before `initialize_all` or after
    /// `close_all`.
    pub async fn aggregator(&self) -> Result<Arc<DataAggregator>, DataError> {
        self.aggregator
            .lock()
            .await
            .as_ref()
            .cloned()
            .ok_or_else(|| DataError::Unavailable("data sources not initialized".to_string()))
    }

    pub async fn is_initialized(&self) -> bool {
        self.aggregator.lock().await.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn aggregator_unavailable_before_init() {
        let registry = DataSourceRegistry::new(DataConfig::default());
        assert!(!registry.is_initialized().await);
        assert!(registry.aggregator().await.is_err());
    }

    #[tokio::test]
    async fn from_reader_is_initialized() {
        let reader = SnapshotReader::open_in_memory().unwrap();
        let registry = DataSourceRegistry::from_reader(reader, DataConfig::default());

        assert!(registry.is_initialized().await);
        let aggregator = registry.aggregator().await.unwrap();
        let records = aggregator.get_batch_data(&["NVDA".to_string()]).await;
        assert_eq!(records.len(), 1);
    }

    #[tokio::test]
    async fn close_all_is_idempotent() {
        let reader = SnapshotReader::open_in_memory().unwrap();
        let registry = DataSourceRegistry::from_reader(reader, DataConfig::default());

        registry.close_all().await;
        registry.close_all().await;
        assert!(!registry.is_initialized().await);
        assert!(registry.aggregator().await.is_err());
    }
}
