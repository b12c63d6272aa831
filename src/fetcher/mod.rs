//! Bulk fetch of matching messages.
//!
//! Split into focused submodules:
//! - [`adapter`] - Mail client calls wrapped in the retry policy
//! - [`engine`] - Pagination, per-item fetch, cancellation and persistence
//! - [`progress`] - Throughput, remaining time and ETA computation

mod adapter;
mod engine;
mod progress;


pub use adapter::RetryingMailClient;
pub use engine::FetchEngine;
pub use progress::{CALCULATING, ProgressTracker, format_eta, format_time};
