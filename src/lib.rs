//! # apptrack
//!
//! Job-application tracker backed by a mailbox.
//!
//! apptrack pages through a filtered mailbox search, keeps the id, snippet and
//! timestamp of every matching message, stores the result set encrypted at
//! rest and later turns it into time-bucketed application counts.
//!
//! ## Design Philosophy
//!
//! - **Cancellable fetches** - Every fetch is a task with its own cancellation token
//! - **Push-based progress** - Snapshots after every message, via watch channels and events
//! - **Library-first** - No CLI or UI; the OAuth2 sign-in and chart rendering live outside
//!
//! ## Quick Start
//!
//! ```no_run
//! use apptrack::{ApplicationTracker, Config};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // ENCRYPTION_KEY and GMAIL_ACCESS_TOKEN come from the environment
//!     let tracker = ApplicationTracker::from_env(Config::default()).await?;
//!
//!     let task_id = tracker.start_new(Some(100)).await?;
//!     let done = tracker.wait(&task_id).await?;
//!     println!("{} messages, status {}", done.processed, done.status);
//!
//!     let chart = tracker.chart(None).await?;
//!     for (label, value) in chart.labels.iter().zip(&chart.values) {
//!         println!("{label}: {value}");
//!     }
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Time-bucketed counts and chart payloads
pub mod aggregation;
/// Result encryption
pub mod codec;
/// Configuration types
pub mod config;
/// SQLite key-value persistence
pub mod db;
/// Error types
pub mod error;
/// Bulk fetch engine
pub mod fetcher;
/// Mail provider abstraction and Gmail client
pub mod provider;
/// Task registry
pub mod registry;
/// Retry logic with exponential backoff
pub mod retry;
/// Result and metadata files, key-value stores
pub mod store;
/// Composition root
pub mod tracker;
/// Core types and events
pub mod types;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_helpers;

// Re-export commonly used types
pub use aggregation::{BucketedCounts, ChartData, Resolution, ResolutionPolicy};
pub use codec::{EncryptedBlob, EncryptionCodec, EncryptionKey};
pub use config::Config;
pub use db::Database;
pub use error::{CryptoError, DatabaseError, Error, Result};
pub use provider::{GmailClient, MailAuth, MailClient, StaticTokenAuth};
pub use registry::TaskRegistry;
pub use store::{FetchMetadata, KeyValueStore, MemoryKvStore, ResultStore};
pub use tracker::ApplicationTracker;
pub use types::{EmailRecord, Event, Progress, TaskId, TaskStatus};

/// Helper function to run the tracker with graceful signal handling.
///
/// Waits for a termination signal and then calls the tracker's `shutdown()` method,
/// which aborts running fetches after they persist what they have.
///
/// - **Unix:** listens for SIGTERM and SIGINT, falling back to Ctrl+C if they cannot be registered.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// # Example
///
/// ```no_run
/// use apptrack::{ApplicationTracker, Config, run_with_shutdown};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let tracker = ApplicationTracker::from_env(Config::default()).await?;
///     tracker.start_new(None).await?;
///
///     // Run with automatic signal handling
///     run_with_shutdown(tracker).await?;
///
///     Ok(())
/// }
/// ```
pub async fn run_with_shutdown(tracker: ApplicationTracker) -> Result<()> {
    wait_for_signal().await;
    tracker.shutdown().await
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Registration can fail in sandboxes; ctrl_c still covers interactive use
    let (mut sigterm, mut sigint) =
        match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
            (Ok(sigterm), Ok(sigint)) => (sigterm, sigint),
            (Err(e), _) | (_, Err(e)) => {
                tracing::warn!(
                    error = %e,
                    "Signal handlers unavailable, stopping fetches on Ctrl+C only"
                );
                wait_for_ctrl_c().await;
                return;
            }
        };

    let signal_name = tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    };
    tracing::info!(signal = signal_name, "Stopping running fetches");
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    wait_for_ctrl_c().await;
}

async fn wait_for_ctrl_c() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!(signal = "ctrl_c", "Stopping running fetches"),
        Err(e) => tracing::error!(
            error = %e,
            "Could not listen for Ctrl+C, shutting the tracker down now"
        ),
    }
}
