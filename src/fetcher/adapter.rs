//! Mail client wrapped in the retry policy.

use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::config::RetryConfig;
use crate::error::Result;
use crate::provider::{MailClient, MessagePage};
use crate::retry::with_retry;
use crate::types::EmailRecord;

/// [`MailClient`] whose calls are retried and cancellable
#[derive(Clone)]
pub struct RetryingMailClient {
    inner: Arc<dyn MailClient>,
    retry: RetryConfig,
}

impl RetryingMailClient {
    /// Wrap `inner` with the given retry policy
    pub fn new(inner: Arc<dyn MailClient>, retry: RetryConfig) -> Self {
        Self { inner, retry }
    }

    /// List one page of messages matching `query`
    pub async fn list_page(
        &self,
        query: &str,
        page_token: Option<&str>,
        max_page_size: u32,
        cancel: &CancellationToken,
    ) -> Result<MessagePage> {
        with_retry(&self.retry, cancel, || {
            self.inner.list_messages(query, page_token, max_page_size)
        })
        .await
    }

    /// Get one message and extract its record
    pub async fn get_item(&self, id: &str, cancel: &CancellationToken) -> Result<EmailRecord> {
        let raw = with_retry(&self.retry, cancel, || self.inner.get_message(id)).await?;
        Ok(EmailRecord {
            id: raw.id,
            snippet: raw.snippet,
            internal_date: raw.internal_date,
        })
    }
}
