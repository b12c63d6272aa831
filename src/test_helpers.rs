//! Shared test helpers: a scripted mail client, a recording progress sink and fixtures.

use std::collections::HashSet;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use crate::codec::{EncryptionCodec, EncryptionKey};
use crate::config::{Config, RetryConfig};
use crate::error::{Error, Result};
use crate::provider::{MailClient, MessagePage, MessageRef, RawMessage};
use crate::registry::ProgressSink;
use crate::types::Progress;

pub(crate) const TEST_KEY: &[u8; 32] = b"0123456789abcdef0123456789abcdef";

/// Timestamp of the first scripted message; later ones follow one day apart
pub(crate) const BASE_MILLIS: i64 = 1_700_000_000_000;

pub(crate) fn test_codec() -> EncryptionCodec {
    EncryptionCodec::new(EncryptionKey::from_bytes(TEST_KEY).unwrap())
}

pub(crate) fn fast_retry() -> RetryConfig {
    RetryConfig {
        max_attempts: 2,
        initial_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(5),
        backoff_multiplier: 2.0,
        transient_delay: Duration::from_millis(1),
        jitter: false,
    }
}

/// Config writing into `dir` with fast retries
pub(crate) fn test_config(dir: &std::path::Path) -> Config {
    let mut config = Config::default();
    config.retry = fast_retry();
    config.storage.results_path = dir.join("data/email_results.json");
    config.storage.metadata_path = dir.join("data/fetch_metadata.json");
    config
}

/// Mail client serving fixed pages of ids
///
/// Page `n` is reached with page token `"page-{n}"`. Listing calls honor
/// `max_results` by truncating the page.
pub(crate) struct MockMailClient {
    pages: Vec<Vec<String>>,
    estimate: Option<u64>,
    failing: HashSet<String>,
    expired: HashSet<String>,
    malformed: HashSet<String>,
    list_failures: AtomicU32,
    get_delay: Option<Duration>,
    list_calls: AtomicU32,
    get_calls: AtomicU32,
    requested_sizes: Mutex<Vec<u32>>,
}

impl MockMailClient {
    pub(crate) fn new(pages: &[&[&str]], estimate: Option<u64>) -> Self {
        Self {
            pages: pages
                .iter()
                .map(|page| page.iter().map(|id| id.to_string()).collect())
                .collect(),
            estimate,
            failing: HashSet::new(),
            expired: HashSet::new(),
            malformed: HashSet::new(),
            list_failures: AtomicU32::new(0),
            get_delay: None,
            list_calls: AtomicU32::new(0),
            get_calls: AtomicU32::new(0),
            requested_sizes: Mutex::new(Vec::new()),
        }
    }

    /// `get_message` fails with a provider error for `id`
    pub(crate) fn failing_on(mut self, id: &str) -> Self {
        self.failing.insert(id.to_string());
        self
    }

    /// `get_message` reports expired credentials for `id`
    pub(crate) fn expired_on(mut self, id: &str) -> Self {
        self.expired.insert(id.to_string());
        self
    }

    /// `get_message` returns a message without a usable timestamp for `id`
    pub(crate) fn malformed_on(mut self, id: &str) -> Self {
        self.malformed.insert(id.to_string());
        self
    }

    /// The next `n` listing calls fail with a provider error
    pub(crate) fn failing_lists(self, n: u32) -> Self {
        self.list_failures.store(n, Ordering::SeqCst);
        self
    }

    /// Every `get_message` call takes `delay`
    pub(crate) fn with_get_delay(mut self, delay: Duration) -> Self {
        self.get_delay = Some(delay);
        self
    }

    pub(crate) fn list_calls(&self) -> u32 {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn get_calls(&self) -> u32 {
        self.get_calls.load(Ordering::SeqCst)
    }

    /// `max_results` of every listing call, in call order
    pub(crate) fn requested_sizes(&self) -> Vec<u32> {
        self.requested_sizes.lock().unwrap().clone()
    }

    fn position(&self, id: &str) -> i64 {
        self.pages
            .iter()
            .flatten()
            .position(|candidate| candidate == id)
            .unwrap_or(0) as i64
    }
}

#[async_trait::async_trait]
impl MailClient for MockMailClient {
    async fn list_messages(
        &self,
        _query: &str,
        page_token: Option<&str>,
        max_results: u32,
    ) -> Result<MessagePage> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        self.requested_sizes.lock().unwrap().push(max_results);

        if self
            .list_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(Error::Provider {
                status: 500,
                message: "backend error".to_string(),
            });
        }

        let index = match page_token {
            None => 0,
            Some(token) => token
                .strip_prefix("page-")
                .and_then(|n| n.parse::<usize>().ok())
                .ok_or_else(|| Error::Other(format!("bad page token {token}")))?,
        };
        let page = self.pages.get(index).cloned().unwrap_or_default();
        let next_page_token = (index + 1 < self.pages.len()).then(|| format!("page-{}", index + 1));

        Ok(MessagePage {
            messages: page
                .into_iter()
                .take(max_results as usize)
                .map(|id| MessageRef { id })
                .collect(),
            next_page_token,
            result_size_estimate: self.estimate,
        })
    }

    async fn get_message(&self, id: &str) -> Result<RawMessage> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.get_delay {
            tokio::time::sleep(delay).await;
        }
        if self.expired.contains(id) {
            return Err(Error::ReauthenticationRequired("token expired".to_string()));
        }
        if self.malformed.contains(id) {
            return Err(Error::MalformedMessage {
                id: id.to_string(),
                reason: "no internalDate".to_string(),
            });
        }
        if self.failing.contains(id) {
            return Err(Error::Provider {
                status: 404,
                message: format!("message {id} not found"),
            });
        }
        Ok(RawMessage {
            id: id.to_string(),
            snippet: format!("Your application was sent to company {id}"),
            internal_date: BASE_MILLIS + self.position(id) * 86_400_000,
        })
    }
}

/// Sink keeping every published snapshot
#[derive(Default)]
pub(crate) struct RecordingSink {
    snapshots: Mutex<Vec<Progress>>,
}

impl RecordingSink {
    pub(crate) fn snapshots(&self) -> Vec<Progress> {
        self.snapshots.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl ProgressSink for RecordingSink {
    async fn publish(&self, progress: &Progress) {
        self.snapshots.lock().unwrap().push(progress.clone());
    }
}
