//! Application tracker -- the composition root.
//!
//! Wires the mail auth source, the encryption codec, the result store and the
//! optional SQLite progress mirror into one cloneable handle. Fetch control is
//! delegated to the [`TaskRegistry`]; the visualization flow (load, decrypt,
//! count, bucket, select, label) lives in [`ApplicationTracker::chart`].

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio_stream::wrappers::BroadcastStream;

use crate::aggregation::{self, BucketedCounts, ChartData, ResolutionPolicy};
use crate::codec::EncryptionCodec;
use crate::config::Config;
use crate::db::Database;
use crate::error::Result;
use crate::provider::{MailAuth, StaticTokenAuth};
use crate::registry::TaskRegistry;
use crate::store::{FetchMetadata, KeyValueStore, ResultStore};
use crate::types::{EmailRecord, Event, Progress, TaskId};

/// How long shutdown waits for cancelled tasks to record a terminal status
pub const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// Main tracker instance (cloneable - all fields are Arc-wrapped)
#[derive(Clone)]
pub struct ApplicationTracker {
    registry: Arc<TaskRegistry>,
    codec: Arc<EncryptionCodec>,
    store: Arc<ResultStore>,
    config: Arc<Config>,
    db: Option<Arc<Database>>,
}

impl ApplicationTracker {
    /// Create a tracker from explicit collaborators
    ///
    /// Validates `config` and, when `storage.kv_database_path` is set, opens
    /// (and migrates) the SQLite database used to mirror task progress.
    pub async fn new(
        config: Config,
        auth: Arc<dyn MailAuth>,
        codec: EncryptionCodec,
    ) -> Result<Self> {
        config.validate()?;

        let db = match &config.storage.kv_database_path {
            Some(path) => Some(Arc::new(Database::new(path).await?)),
            None => None,
        };

        let codec = Arc::new(codec);
        let store = Arc::new(ResultStore::from_config(&config.storage));
        let config = Arc::new(config);

        let mut registry =
            TaskRegistry::new(auth, codec.clone(), store.clone(), config.clone());
        if let Some(db) = &db {
            let kv: Arc<dyn KeyValueStore> = db.clone();
            registry = registry.with_kv_store(kv);
        }

        tracing::info!(
            results_path = %store.results_path().display(),
            kv_mirror = db.is_some(),
            "Application tracker ready"
        );

        Ok(Self {
            registry: Arc::new(registry),
            codec,
            store,
            config,
            db,
        })
    }

    /// Create a tracker with secrets taken from the environment
    ///
    /// Fails when `ENCRYPTION_KEY` is missing or not 32 bytes long. A missing
    /// `GMAIL_ACCESS_TOKEN` only leaves the tracker unauthenticated; starting a
    /// fetch then fails with [`Error::NotAuthenticated`](crate::Error::NotAuthenticated).
    pub async fn from_env(config: Config) -> Result<Self> {
        let codec = EncryptionCodec::from_env()?;
        let auth = StaticTokenAuth::from_env(&config.gmail)?;
        Self::new(config, Arc::new(auth), codec).await
    }

    /// The underlying task registry
    pub fn registry(&self) -> &TaskRegistry {
        &self.registry
    }

    /// Active configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Start a fetch under `task_id`; see [`TaskRegistry::start`]
    pub async fn start(&self, task_id: TaskId, amount: Option<u64>) -> Result<()> {
        self.registry.start(task_id, amount).await
    }

    /// Start a fetch under a generated id
    pub async fn start_new(&self, amount: Option<u64>) -> Result<TaskId> {
        self.registry.start_new(amount).await
    }

    /// Signal cancellation; see [`TaskRegistry::stop`]
    pub async fn stop(&self, task_id: &TaskId) -> bool {
        self.registry.stop(task_id).await
    }

    /// Latest progress snapshot of a task
    pub async fn get_progress(&self, task_id: &TaskId) -> Result<Option<Progress>> {
        self.registry.get_progress(task_id).await
    }

    /// Forget a task
    pub async fn cleanup(&self, task_id: &TaskId) -> Result<()> {
        self.registry.cleanup(task_id).await
    }

    /// Wait for a task's terminal snapshot
    pub async fn wait(&self, task_id: &TaskId) -> Result<Progress> {
        self.registry.wait(task_id).await
    }

    /// Latest-snapshot receiver of one task
    pub async fn subscribe(&self, task_id: &TaskId) -> Option<watch::Receiver<Progress>> {
        self.registry.subscribe(task_id).await
    }

    /// Subscribe to lifecycle events
    pub fn subscribe_events(&self) -> broadcast::Receiver<Event> {
        self.registry.subscribe_events()
    }

    /// Lifecycle events as a stream
    pub fn subscribe_stream(&self) -> BroadcastStream<Event> {
        self.registry.subscribe_stream()
    }

    /// Summary of the last successful fetch
    pub async fn metadata(&self) -> FetchMetadata {
        self.store.load_metadata().await
    }

    /// Load and decrypt the persisted result set
    pub async fn load_records(&self) -> Result<Vec<EmailRecord>> {
        self.store.load_records(&self.codec).await
    }

    /// Application counts at every resolution
    pub async fn buckets(&self) -> Result<BucketedCounts> {
        let records = self.load_records().await?;
        let day_counts = aggregation::count_by_day(
            &records,
            aggregation::snippet_contains(&self.config.aggregation.marker),
        );
        tracing::debug!(
            records = records.len(),
            days = day_counts.len(),
            "Counted applications"
        );
        Ok(aggregation::aggregate(&day_counts))
    }

    /// Chart payload of the persisted results
    ///
    /// `None` selects automatically within the configured point budget.
    pub async fn chart(&self, policy: Option<ResolutionPolicy>) -> Result<ChartData> {
        let buckets = self.buckets().await?;
        let policy = policy.unwrap_or(ResolutionPolicy::Auto {
            max_points: self.config.aggregation.max_points,
        });
        let resolution = aggregation::select_resolution(&buckets, policy)?;
        tracing::info!(resolution = %resolution, total = buckets.total(), "Chart data ready");
        Ok(aggregation::plot_data(&buckets, resolution))
    }

    /// Gracefully shut down
    ///
    /// Stops accepting tasks, cancels running ones, waits up to
    /// [`SHUTDOWN_TIMEOUT`] for them to persist partial results, then closes
    /// the progress database.
    pub async fn shutdown(&self) -> Result<()> {
        self.registry.shutdown(SHUTDOWN_TIMEOUT).await;
        if let Some(db) = &self.db {
            db.pool().close().await;
            tracing::info!("Progress database closed");
        }
        Ok(())
    }
}
