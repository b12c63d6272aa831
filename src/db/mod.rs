//! SQLite persistence for apptrack
//!
//! Backs the [`KeyValueStore`](crate::store::KeyValueStore) used to mirror
//! task progress, so that progress snapshots stay visible to other processes
//! sharing the database file and survive a restart.
//!
//! ## Submodules
//!
//! Methods on [`Database`] are organized by domain:
//! - [`migrations`] - Database lifecycle, schema migrations
//! - [`kv`] - Key-value table access

use sqlx::sqlite::SqlitePool;

mod kv;
mod migrations;

/// Database handle for apptrack
pub struct Database {
    pool: SqlitePool,
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;
