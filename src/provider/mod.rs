//! Mail provider abstraction
//!
//! The fetch engine only needs two calls from the provider: list one page of
//! message ids matching a query, and get one message's metadata. The OAuth2
//! sign-in flow lives outside this crate; [`MailAuth`] is the seam through
//! which an authenticated client is handed in.

mod gmail;

pub use gmail::GmailClient;

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Environment variable read by [`StaticTokenAuth::from_env`]
pub const ACCESS_TOKEN_VAR: &str = "GMAIL_ACCESS_TOKEN";

/// Reference to a message returned by a listing call
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRef {
    /// Provider message id
    pub id: String,
}

/// One page of listing results
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MessagePage {
    /// Message ids in provider order
    pub messages: Vec<MessageRef>,
    /// Token for the next page, `None` on the last page
    pub next_page_token: Option<String>,
    /// Provider's estimate of the total number of matches
    pub result_size_estimate: Option<u64>,
}

/// Message metadata returned by a get call
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawMessage {
    /// Provider message id
    pub id: String,
    /// Preview text
    pub snippet: String,
    /// Internal timestamp, milliseconds since the epoch
    pub internal_date: i64,
}

/// An authenticated client able to list and get messages
#[async_trait::async_trait]
pub trait MailClient: Send + Sync {
    /// List one page of messages matching `query`
    async fn list_messages(
        &self,
        query: &str,
        page_token: Option<&str>,
        max_results: u32,
    ) -> Result<MessagePage>;

    /// Get one message's metadata
    async fn get_message(&self, id: &str) -> Result<RawMessage>;
}

/// Source of authenticated mail clients
pub trait MailAuth: Send + Sync {
    /// Whether credentials are currently available
    fn is_authenticated(&self) -> bool;

    /// A client handle, or `None` when not authenticated
    fn client(&self) -> Option<Arc<dyn MailClient>>;
}

/// [`MailAuth`] around a fixed, already obtained client
///
/// Used when the access token is obtained out of band (environment, token file
/// written by a sign-in flow).
pub struct StaticTokenAuth {
    client: Option<Arc<dyn MailClient>>,
}

impl StaticTokenAuth {
    /// Wrap an existing client
    pub fn new(client: Arc<dyn MailClient>) -> Self {
        Self {
            client: Some(client),
        }
    }

    /// An auth source that is never authenticated
    pub fn unauthenticated() -> Self {
        Self { client: None }
    }

    /// Build a Gmail client from `GMAIL_ACCESS_TOKEN`
    ///
    /// An unset or empty variable yields an unauthenticated source.
    pub fn from_env(config: &crate::config::GmailConfig) -> Result<Self> {
        match std::env::var(ACCESS_TOKEN_VAR) {
            Ok(token) if !token.trim().is_empty() => {
                let client = GmailClient::new(config, token.trim().to_string())?;
                Ok(Self::new(Arc::new(client)))
            }
            _ => {
                tracing::warn!("{} is not set; mail client is unauthenticated", ACCESS_TOKEN_VAR);
                Ok(Self::unauthenticated())
            }
        }
    }
}

impl MailAuth for StaticTokenAuth {
    fn is_authenticated(&self) -> bool {
        self.client.is_some()
    }

    fn client(&self) -> Option<Arc<dyn MailClient>> {
        self.client.clone()
    }
}
