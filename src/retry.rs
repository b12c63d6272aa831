//! Retry logic with rate-limit-aware backoff and cooperative cancellation
//!
//! Failures are sorted into three classes:
//! - rate limited: exponential backoff, `min(initial_delay * multiplier^attempt, max_delay)`
//! - transient: linearly increasing delay, `min(transient_delay * attempt, max_delay)`
//! - fatal: returned immediately (expired credentials, cancellation, bad config)
//!
//! Cancellation is observed before every attempt, while an attempt is in flight
//! and during every backoff sleep. It always surfaces as the caller's
//! "aborted" error, never as the underlying failure.
//!
//! # Example
//!
//! ```no_run
//! use apptrack::retry::{with_retry, Cancelled, IsRetryable, RetryClass};
//! use apptrack::config::RetryConfig;
//! use tokio_util::sync::CancellationToken;
//!
//! #[derive(Debug)]
//! enum MyError {
//!     Busy,
//!     Aborted,
//! }
//!
//! impl std::fmt::Display for MyError {
//!     fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
//!         write!(f, "{:?}", self)
//!     }
//! }
//!
//! impl IsRetryable for MyError {
//!     fn retry_class(&self) -> RetryClass {
//!         match self {
//!             MyError::Busy => RetryClass::RateLimited,
//!             MyError::Aborted => RetryClass::Fatal,
//!         }
//!     }
//! }
//!
//! impl From<Cancelled> for MyError {
//!     fn from(_: Cancelled) -> Self {
//!         MyError::Aborted
//!     }
//! }
//!
//! # async fn example() -> Result<(), MyError> {
//! let config = RetryConfig::default();
//! let cancel = CancellationToken::new();
//! let value = with_retry(&config, &cancel, || async { Ok::<_, MyError>(42) }).await?;
//! # Ok(())
//! # }
//! ```

use crate::config::RetryConfig;
use crate::error::Error;
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// How a failure should be handled by [`with_retry`]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RetryClass {
    /// Provider asked us to slow down: exponential backoff
    RateLimited,
    /// Any other retryable failure: linear delay
    Transient,
    /// Not worth retrying: propagate immediately
    Fatal,
}

/// Trait for errors that can be classified for retrying
pub trait IsRetryable {
    /// The retry class of this error
    fn retry_class(&self) -> RetryClass;
}

/// Marker converted into the caller's error type when cancellation is observed
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Cancelled;

impl From<Cancelled> for Error {
    fn from(_: Cancelled) -> Self {
        Error::Aborted
    }
}

impl IsRetryable for Error {
    fn retry_class(&self) -> RetryClass {
        match self {
            Error::RateLimited(_) => RetryClass::RateLimited,
            // Expired or missing credentials will not fix themselves
            Error::ReauthenticationRequired(_) | Error::NotAuthenticated => RetryClass::Fatal,
            Error::Aborted | Error::ShuttingDown => RetryClass::Fatal,
            // Local misconfiguration or local data problems are permanent
            Error::Config { .. } | Error::Url(_) | Error::Crypto(_) => RetryClass::Fatal,
            Error::UnknownResolution(_) | Error::TooManyPoints { .. } => RetryClass::Fatal,
            Error::NotFound(_) => RetryClass::Fatal,
            // The same bytes come back on every call
            Error::MalformedMessage { .. } | Error::Serialization(_) => RetryClass::Fatal,
            Error::Network(e) if e.is_decode() => RetryClass::Fatal,
            Error::Provider { .. } => RetryClass::Transient,
            Error::Network(_) => RetryClass::Transient,
            Error::Io(_) | Error::Persistence { .. } => RetryClass::Transient,
            Error::Database(_) | Error::Sqlx(_) => RetryClass::Transient,
            Error::Other(_) => RetryClass::Transient,
        }
    }
}

/// Execute an async operation with classified retries and cancellation
///
/// `config.max_attempts` is the total number of calls, first call included.
/// A rate-limited operation that succeeds on call N+1 therefore needs
/// `max_attempts >= N + 1`, and an operation that keeps failing is called
/// exactly `max_attempts` times before its last error is returned unchanged.
pub async fn with_retry<F, Fut, T, E>(
    config: &RetryConfig,
    cancel: &CancellationToken,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: IsRetryable + std::fmt::Display + From<Cancelled>,
{
    let mut attempt: u32 = 0;

    loop {
        if cancel.is_cancelled() {
            return Err(Cancelled.into());
        }

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Cancelled.into()),
            outcome = operation() => outcome,
        };

        let e = match outcome {
            Ok(value) => {
                if attempt > 0 {
                    tracing::info!(attempts = attempt + 1, "Operation succeeded after retry");
                }
                return Ok(value);
            }
            Err(e) => e,
        };

        if cancel.is_cancelled() {
            return Err(Cancelled.into());
        }

        attempt += 1;
        let class = e.retry_class();

        if class == RetryClass::Fatal {
            tracing::error!(error = %e, "Operation failed with non-retryable error");
            return Err(e);
        }
        if attempt >= config.max_attempts {
            tracing::error!(
                error = %e,
                attempts = attempt,
                "Operation failed after all retry attempts exhausted"
            );
            return Err(e);
        }

        let delay = match class {
            RetryClass::RateLimited => backoff_delay(config, attempt),
            _ => transient_delay(config, attempt),
        };
        let delay = if config.jitter {
            add_jitter(delay)
        } else {
            delay
        };

        tracing::warn!(
            error = %e,
            attempt,
            max_attempts = config.max_attempts,
            rate_limited = class == RetryClass::RateLimited,
            delay_ms = delay.as_millis() as u64,
            "Operation failed, retrying"
        );

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Cancelled.into()),
            _ = tokio::time::sleep(delay) => {}
        }
    }
}

/// Exponential delay after the `attempt`-th rate-limited failure (1-based)
pub fn backoff_delay(config: &RetryConfig, attempt: u32) -> Duration {
    let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
    let secs = config.initial_delay.as_secs_f64() * config.backoff_multiplier.powi(exponent);
    Duration::try_from_secs_f64(secs)
        .unwrap_or(config.max_delay)
        .min(config.max_delay)
}

/// Linear delay after the `attempt`-th transient failure (1-based)
pub fn transient_delay(config: &RetryConfig, attempt: u32) -> Duration {
    config
        .transient_delay
        .checked_mul(attempt)
        .unwrap_or(config.max_delay)
        .min(config.max_delay)
}

/// Add random jitter to a delay
///
/// The actual delay will be between `delay` and `2 * delay`.
fn add_jitter(delay: Duration) -> Duration {
    let mut rng = rand::thread_rng();
    let jitter_factor: f64 = rng.gen_range(0.0..=1.0);
    Duration::from_secs_f64(delay.as_secs_f64() * (1.0 + jitter_factor))
}
