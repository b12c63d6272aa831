//! Progress sinks -- where the fetch engine pushes its snapshots.

use std::sync::Arc;
use tokio::sync::{broadcast, watch};

use crate::store::KeyValueStore;
use crate::types::{Event, Progress, TaskId};

/// Receiver of a task's progress snapshots
///
/// The engine awaits every publish before continuing, so snapshots of one task
/// arrive in order.
#[async_trait::async_trait]
pub trait ProgressSink: Send + Sync {
    /// Record the latest snapshot
    async fn publish(&self, progress: &Progress);
}

/// Registry-side sink of one task
///
/// Fans each snapshot out to the task's watch channel, the event broadcast and,
/// when configured, the key-value mirror under `task:{id}`.
pub struct TaskProgressSink {
    task_id: TaskId,
    latest: watch::Sender<Progress>,
    event_tx: broadcast::Sender<Event>,
    kv: Option<Arc<dyn KeyValueStore>>,
}

impl TaskProgressSink {
    pub(crate) fn new(
        task_id: TaskId,
        latest: watch::Sender<Progress>,
        event_tx: broadcast::Sender<Event>,
        kv: Option<Arc<dyn KeyValueStore>>,
    ) -> Self {
        Self {
            task_id,
            latest,
            event_tx,
            kv,
        }
    }

    /// Read-merge-write of the snapshot into the key-value mirror
    ///
    /// Fields already stored but unknown to [`Progress`] are preserved. Not
    /// atomic: two writers on the same task can lose each other's updates.
    async fn mirror(&self, kv: &dyn KeyValueStore, progress: &Progress) -> crate::Result<()> {
        let key = self.task_id.storage_key();

        let mut merged = match kv.get(&key).await? {
            Some(existing) => match serde_json::from_str::<serde_json::Value>(&existing) {
                Ok(serde_json::Value::Object(map)) => map,
                _ => serde_json::Map::new(),
            },
            None => serde_json::Map::new(),
        };

        if let serde_json::Value::Object(update) = serde_json::to_value(progress)? {
            merged.extend(update);
        }

        let value = serde_json::to_string(&serde_json::Value::Object(merged))?;
        kv.set(&key, &value).await
    }
}

#[async_trait::async_trait]
impl ProgressSink for TaskProgressSink {
    async fn publish(&self, progress: &Progress) {
        // Mirror first: a waiter woken by the watch channel must find the same
        // snapshot in the store
        if let Some(kv) = &self.kv
            && let Err(e) = self.mirror(kv.as_ref(), progress).await
        {
            tracing::warn!(
                task_id = %self.task_id,
                error = %e,
                "Failed to mirror progress to key-value store"
            );
        }

        self.latest.send_replace(progress.clone());

        // No subscribers is not an error
        let _ = self.event_tx.send(Event::Progress {
            task_id: self.task_id.clone(),
            progress: progress.clone(),
        });
    }
}
