//! Waiting for tasks and graceful shutdown.

use std::sync::atomic::Ordering;
use std::time::Duration;
use tokio::sync::watch;

use super::TaskRegistry;
use crate::error::{Error, Result};
use crate::types::{Event, Progress, TaskId};

impl TaskRegistry {
    /// Wait until an in-memory task reaches a terminal state and return its final snapshot
    pub async fn wait(&self, task_id: &TaskId) -> Result<Progress> {
        let rx = self
            .subscribe(task_id)
            .await
            .ok_or_else(|| Error::NotFound(format!("task {}", task_id)))?;
        wait_terminal(rx).await
    }

    /// Gracefully shut down the registry
    ///
    /// 1. Stops accepting new tasks
    /// 2. Cancels every running task
    /// 3. Waits up to `timeout` for them to persist partial results and record a terminal status
    /// 4. Emits [`Event::Shutdown`]
    pub async fn shutdown(&self, timeout: Duration) {
        tracing::info!("Initiating graceful shutdown");

        self.accepting_new.store(false, Ordering::SeqCst);
        tracing::info!("Stopped accepting new tasks");

        let receivers: Vec<(TaskId, watch::Receiver<Progress>)> = {
            let tasks = self.tasks.lock().await;
            tasks
                .iter()
                .filter(|(_, handle)| !handle.progress.borrow().is_terminal())
                .map(|(id, handle)| {
                    tracing::debug!(task_id = %id, "Signaling cancellation");
                    handle.cancel.cancel();
                    (id.clone(), handle.progress.clone())
                })
                .collect()
        };
        tracing::info!(active_count = receivers.len(), "Cancelled all running tasks");

        let wait_all = async {
            for (id, rx) in receivers {
                if let Err(e) = wait_terminal(rx).await {
                    tracing::warn!(
                        task_id = %id,
                        error = %e,
                        "Task ended without a terminal status"
                    );
                }
            }
        };

        match tokio::time::timeout(timeout, wait_all).await {
            Ok(()) => tracing::info!("All running tasks finished"),
            Err(_) => {
                tracing::warn!("Timeout waiting for tasks to finish, proceeding with shutdown")
            }
        }

        let _ = self.event_tx.send(Event::Shutdown);
        tracing::info!("Graceful shutdown complete");
    }

    /// Whether new tasks are still accepted
    pub fn is_accepting(&self) -> bool {
        self.accepting_new.load(Ordering::SeqCst)
    }
}

async fn wait_terminal(mut rx: watch::Receiver<Progress>) -> Result<Progress> {
    match rx.wait_for(|progress| progress.is_terminal()).await {
        Ok(progress) => Ok(progress.clone()),
        Err(_) => Err(Error::Other(
            "task ended without recording a terminal status".to_string(),
        )),
    }
}
