//! Task registry -- maps task ids to running or finished fetches.
//!
//! Each task owns a cancellation token and a `watch` channel holding its
//! latest progress snapshot. The engine is the only writer of that channel;
//! pollers clone the receiver and read consistent snapshots without blocking
//! the writer. With a [`KeyValueStore`] attached, every snapshot is also
//! mirrored under `task:{id}` so other processes can read it.
//!
//! Split into focused submodules:
//! - [`control`] - Start, stop, progress queries and cleanup
//! - [`lifecycle`] - Waiting for tasks and graceful shutdown
//! - [`sink`] - The progress sink handed to the engine

mod control;
mod lifecycle;
mod sink;


pub use sink::{ProgressSink, TaskProgressSink};

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use tokio::sync::{Mutex, broadcast, watch};
use tokio_stream::wrappers::BroadcastStream;
use tokio_util::sync::CancellationToken;

use crate::codec::EncryptionCodec;
use crate::config::Config;
use crate::provider::MailAuth;
use crate::store::{KeyValueStore, ResultStore};
use crate::types::{Event, Progress, TaskId};

/// Capacity of the lifecycle event broadcast
const EVENT_CHANNEL_CAPACITY: usize = 1000;

/// Registry entry of one task
struct TaskHandle {
    cancel: CancellationToken,
    progress: watch::Receiver<Progress>,
}

/// Registry of fetch tasks
pub struct TaskRegistry {
    tasks: Mutex<HashMap<TaskId, TaskHandle>>,
    event_tx: broadcast::Sender<Event>,
    kv: Option<Arc<dyn KeyValueStore>>,
    auth: Arc<dyn MailAuth>,
    codec: Arc<EncryptionCodec>,
    store: Arc<ResultStore>,
    config: Arc<Config>,
    accepting_new: AtomicBool,
}

impl TaskRegistry {
    /// Create a registry whose tasks fetch through `auth` and persist via `store`
    pub fn new(
        auth: Arc<dyn MailAuth>,
        codec: Arc<EncryptionCodec>,
        store: Arc<ResultStore>,
        config: Arc<Config>,
    ) -> Self {
        let (event_tx, _rx) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            tasks: Mutex::new(HashMap::new()),
            event_tx,
            kv: None,
            auth,
            codec,
            store,
            config,
            accepting_new: AtomicBool::new(true),
        }
    }

    /// Mirror progress snapshots into `kv`
    pub fn with_kv_store(mut self, kv: Arc<dyn KeyValueStore>) -> Self {
        self.kv = Some(kv);
        self
    }

    /// Subscribe to lifecycle events of every task
    pub fn subscribe_events(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Lifecycle events as a [`Stream`](tokio_stream::Stream)
    ///
    /// A subscriber that falls behind by more than the channel capacity
    /// receives a `Lagged` error item and continues with newer events.
    pub fn subscribe_stream(&self) -> BroadcastStream<Event> {
        BroadcastStream::new(self.event_tx.subscribe())
    }

    /// Latest-snapshot receiver of one in-memory task
    pub async fn subscribe(&self, task_id: &TaskId) -> Option<watch::Receiver<Progress>> {
        self.tasks
            .lock()
            .await
            .get(task_id)
            .map(|handle| handle.progress.clone())
    }

    /// Ids of all tasks held in memory, sorted
    pub async fn task_ids(&self) -> Vec<TaskId> {
        let mut ids: Vec<TaskId> = self.tasks.lock().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Ids of all tasks mirrored in the key-value store, sorted
    ///
    /// Empty when no store is attached.
    pub async fn stored_task_ids(&self) -> crate::Result<Vec<TaskId>> {
        let Some(kv) = &self.kv else {
            return Ok(Vec::new());
        };
        let mut ids: Vec<TaskId> = kv
            .scan_all_keys()
            .await?
            .iter()
            .filter_map(|key| TaskId::from_storage_key(key))
            .collect();
        ids.sort();
        Ok(ids)
    }

    /// Number of tasks that have not reached a terminal state
    pub async fn running_count(&self) -> usize {
        self.tasks
            .lock()
            .await
            .values()
            .filter(|handle| !handle.progress.borrow().is_terminal())
            .count()
    }
}
