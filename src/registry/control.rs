//! Task control: start, stop, progress queries and cleanup.

use std::sync::atomic::Ordering;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use super::sink::{ProgressSink, TaskProgressSink};
use super::{TaskHandle, TaskRegistry};
use crate::error::{Error, Result};
use crate::fetcher::{FetchEngine, RetryingMailClient};
use crate::types::{Event, Progress, TaskId, TaskStatus};

impl TaskRegistry {
    /// Start a fetch of up to `amount` messages under `task_id`
    ///
    /// Submitting an id that is already registered is a no-op (logged, not an
    /// error), whatever the registry's state. Otherwise fails with
    /// [`Error::ShuttingDown`] after shutdown began and with
    /// [`Error::NotAuthenticated`] when no mail client is available.
    pub async fn start(&self, task_id: TaskId, amount: Option<u64>) -> Result<()> {
        let cancel = CancellationToken::new();
        let (progress_tx, progress_rx) = watch::channel(Progress::starting());

        let client = {
            let mut tasks = self.tasks.lock().await;
            if tasks.contains_key(&task_id) {
                tracing::warn!(task_id = %task_id, "Task already registered, ignoring start");
                return Ok(());
            }

            if !self.accepting_new.load(Ordering::SeqCst) {
                return Err(Error::ShuttingDown);
            }

            let client = match self.auth.client() {
                Some(client) if self.auth.is_authenticated() => client,
                _ => return Err(Error::NotAuthenticated),
            };

            tasks.insert(
                task_id.clone(),
                TaskHandle {
                    cancel: cancel.clone(),
                    progress: progress_rx,
                },
            );
            client
        };

        let engine = FetchEngine::new(
            RetryingMailClient::new(client, self.config.retry.clone()),
            self.codec.clone(),
            self.store.clone(),
            self.config.fetch.clone(),
        );
        let sink = TaskProgressSink::new(
            task_id.clone(),
            progress_tx,
            self.event_tx.clone(),
            self.kv.clone(),
        );
        let event_tx = self.event_tx.clone();

        let _ = self.event_tx.send(Event::TaskStarted {
            task_id: task_id.clone(),
            amount,
        });
        tracing::info!(task_id = %task_id, amount = ?amount, "Task started");

        tokio::spawn(async move {
            sink.publish(&Progress::starting()).await;

            let terminal = engine.run(&task_id, amount, &cancel, &sink).await;

            let event = match terminal.status {
                TaskStatus::Completed => Event::TaskCompleted {
                    task_id,
                    processed: terminal.processed,
                },
                TaskStatus::Aborted => Event::TaskAborted {
                    task_id,
                    processed: terminal.processed,
                },
                TaskStatus::Error | TaskStatus::Running => Event::TaskFailed {
                    task_id,
                    error: terminal.error.unwrap_or_default(),
                },
            };
            let _ = event_tx.send(event);
        });

        Ok(())
    }

    /// Start a fetch under a freshly generated id and return that id
    pub async fn start_new(&self, amount: Option<u64>) -> Result<TaskId> {
        let task_id = TaskId::generate();
        self.start(task_id.clone(), amount).await?;
        Ok(task_id)
    }

    /// Signal cancellation to a running task
    ///
    /// Returns whether a running task was found and signalled. The task stops
    /// at its next checkpoint, persists what it has and ends `aborted`.
    pub async fn stop(&self, task_id: &TaskId) -> bool {
        let tasks = self.tasks.lock().await;
        let Some(handle) = tasks.get(task_id) else {
            tracing::debug!(task_id = %task_id, "Stop requested for unknown task");
            return false;
        };

        if handle.progress.borrow().is_terminal() || handle.cancel.is_cancelled() {
            return false;
        }

        handle.cancel.cancel();
        tracing::info!(task_id = %task_id, "Cancellation signalled");
        true
    }

    /// Latest progress snapshot of a task
    ///
    /// In-memory tasks answer from their watch channel; otherwise the
    /// key-value mirror is consulted. `None` when the task is unknown.
    pub async fn get_progress(&self, task_id: &TaskId) -> Result<Option<Progress>> {
        if let Some(handle) = self.tasks.lock().await.get(task_id) {
            return Ok(Some(handle.progress.borrow().clone()));
        }

        let Some(kv) = &self.kv else {
            return Ok(None);
        };
        match kv.get(&task_id.storage_key()).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    /// Remove a task from the registry and from the key-value mirror
    ///
    /// Does not cancel a running task; call [`stop`](Self::stop) first for that.
    pub async fn cleanup(&self, task_id: &TaskId) -> Result<()> {
        let removed = self.tasks.lock().await.remove(task_id);

        if let Some(handle) = &removed
            && !handle.progress.borrow().is_terminal()
        {
            tracing::warn!(task_id = %task_id, "Removing a task that is still running");
        }

        if let Some(kv) = &self.kv {
            kv.delete(&task_id.storage_key()).await?;
        }

        if removed.is_some() {
            let _ = self.event_tx.send(Event::TaskRemoved {
                task_id: task_id.clone(),
            });
            tracing::debug!(task_id = %task_id, "Task removed");
        }

        Ok(())
    }
}
