//! Fetch task orchestration -- pagination, per-item fetch, progress and persistence.

use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use super::adapter::RetryingMailClient;
use super::progress::ProgressTracker;
use crate::codec::EncryptionCodec;
use crate::config::FetchConfig;
use crate::error::{Error, Result};
use crate::registry::ProgressSink;
use crate::store::ResultStore;
use crate::types::{EmailRecord, Progress, TaskId, TaskStatus};

/// Drives one fetch from the first listing call to the persisted result set
pub struct FetchEngine {
    client: RetryingMailClient,
    codec: Arc<EncryptionCodec>,
    store: Arc<ResultStore>,
    config: FetchConfig,
}

/// State accumulated by one run
struct RunState {
    tracker: ProgressTracker,
    records: Vec<EmailRecord>,
}

impl FetchEngine {
    /// Create an engine over a retrying client, codec and result store
    pub fn new(
        client: RetryingMailClient,
        codec: Arc<EncryptionCodec>,
        store: Arc<ResultStore>,
        config: FetchConfig,
    ) -> Self {
        Self {
            client,
            codec,
            store,
            config,
        }
    }

    /// Run a fetch of up to `amount` messages (`None` = until the provider runs out)
    ///
    /// Never fails: every outcome is reported as the returned terminal snapshot,
    /// which is also the last snapshot published to `sink`.
    ///
    /// Phases:
    /// 1. Estimate the total with a single-item listing call
    /// 2. Page through the listing, fetching every message and publishing progress per item
    /// 3. Encrypt and persist what was accumulated (also when cancelled)
    /// 4. Publish the terminal snapshot
    pub async fn run(
        &self,
        task_id: &TaskId,
        amount: Option<u64>,
        cancel: &CancellationToken,
        sink: &dyn ProgressSink,
    ) -> Progress {
        let mut state = RunState {
            tracker: ProgressTracker::new(amount),
            records: Vec::new(),
        };

        tracing::info!(task_id = %task_id, amount = ?amount, "Starting fetch");

        let outcome = self
            .fetch_all(task_id, amount, cancel, sink, &mut state)
            .await;

        let terminal = match outcome {
            Ok(()) => match self.persist(&state.records).await {
                Ok(()) => {
                    tracing::info!(
                        task_id = %task_id,
                        processed = state.tracker.processed(),
                        "Fetch completed"
                    );
                    state.tracker.snapshot(TaskStatus::Completed)
                }
                Err(e) => {
                    tracing::error!(
                        task_id = %task_id,
                        code = e.code(),
                        error = %e,
                        "Failed to persist results"
                    );
                    state.tracker.failed(e.to_string())
                }
            },
            Err(e) if e.is_aborted() => match self.persist(&state.records).await {
                Ok(()) => {
                    tracing::info!(
                        task_id = %task_id,
                        processed = state.tracker.processed(),
                        "Fetch aborted, partial results persisted"
                    );
                    state.tracker.snapshot(TaskStatus::Aborted)
                }
                Err(e) => {
                    tracing::error!(
                        task_id = %task_id,
                        error = %e,
                        "Failed to persist partial results of aborted fetch"
                    );
                    state.tracker.failed(e.to_string())
                }
            },
            Err(e) => {
                tracing::error!(
                    task_id = %task_id,
                    code = e.code(),
                    error = %e,
                    "Fetch failed"
                );
                state.tracker.failed(e.to_string())
            }
        };

        sink.publish(&terminal).await;
        terminal
    }

    async fn fetch_all(
        &self,
        task_id: &TaskId,
        amount: Option<u64>,
        cancel: &CancellationToken,
        sink: &dyn ProgressSink,
        state: &mut RunState,
    ) -> Result<()> {
        let limit = amount.unwrap_or(u64::MAX);

        let estimate = self.estimate_total(task_id, cancel).await?;
        let working_total = match (amount, estimate) {
            (Some(requested), Some(estimated)) => Some(requested.min(estimated)),
            (Some(requested), None) => Some(requested),
            (None, estimated) => estimated,
        };
        state.tracker.set_total(working_total);
        tracing::debug!(
            task_id = %task_id,
            estimate = ?estimate,
            total = ?state.tracker.total(),
            "Working total resolved"
        );
        sink.publish(&state.tracker.snapshot(TaskStatus::Running)).await;

        let mut page_token: Option<String> = None;

        while state.tracker.processed() < limit {
            if cancel.is_cancelled() {
                return Err(Error::Aborted);
            }

            let wanted = limit - state.tracker.processed();
            let page_size = u32::try_from(wanted)
                .unwrap_or(u32::MAX)
                .min(self.config.page_size_cap);

            let page = self
                .client
                .list_page(&self.config.query, page_token.as_deref(), page_size, cancel)
                .await?;

            tracing::debug!(
                task_id = %task_id,
                messages = page.messages.len(),
                processed = state.tracker.processed(),
                "Fetched page"
            );

            for message in &page.messages {
                if cancel.is_cancelled() {
                    return Err(Error::Aborted);
                }

                match self.client.get_item(&message.id, cancel).await {
                    Ok(record) => {
                        state.records.push(record);
                        state.tracker.record_item();
                        sink.publish(&state.tracker.snapshot(TaskStatus::Running)).await;
                    }
                    Err(e @ (Error::Aborted | Error::ReauthenticationRequired(_))) => return Err(e),
                    Err(e) => {
                        tracing::warn!(
                            task_id = %task_id,
                            message_id = %message.id,
                            code = e.code(),
                            error = %e,
                            "Skipping message that could not be fetched"
                        );
                    }
                }

                if state.tracker.processed() >= limit {
                    break;
                }
            }

            page_token = page.next_page_token;
            if page_token.is_none() {
                break;
            }
        }

        Ok(())
    }

    /// Provider estimate of the number of matches, if it offers one
    ///
    /// The estimate is advisory, so failures other than cancellation and
    /// expired credentials only cost the progress display its total.
    async fn estimate_total(
        &self,
        task_id: &TaskId,
        cancel: &CancellationToken,
    ) -> Result<Option<u64>> {
        match self
            .client
            .list_page(&self.config.query, None, 1, cancel)
            .await
        {
            Ok(page) => Ok(page.result_size_estimate),
            Err(e @ (Error::Aborted | Error::ReauthenticationRequired(_))) => Err(e),
            Err(e) => {
                tracing::warn!(
                    task_id = %task_id,
                    error = %e,
                    "Could not estimate result size, using requested amount"
                );
                Ok(None)
            }
        }
    }

    async fn persist(&self, records: &[EmailRecord]) -> Result<()> {
        self.store.save_records(&self.codec, records).await?;
        self.store.record_fetch(records.len() as u64).await;
        Ok(())
    }
}
