//! Core types for apptrack

use serde::{Deserialize, Deserializer, Serialize};

/// Opaque identifier of a fetch task
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub String);

impl TaskId {
    /// Create a TaskId from any string-like value
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a fresh random (UUID v4) task id
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Borrow the inner string
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Key under which this task's progress is mirrored in a key-value store
    pub fn storage_key(&self) -> String {
        format!("{}{}", TASK_KEY_PREFIX, self.0)
    }

    /// Parse a key-value store key back into a task id
    pub fn from_storage_key(key: &str) -> Option<Self> {
        key.strip_prefix(TASK_KEY_PREFIX)
            .filter(|id| !id.is_empty())
            .map(Self::new)
    }
}

/// Prefix of progress keys in the key-value store
pub const TASK_KEY_PREFIX: &str = "task:";

impl From<String> for TaskId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for TaskId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Fetch task status
///
/// `Running` is the only non-terminal state; a task never leaves a terminal state.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// Fetch in progress
    #[default]
    Running,
    /// Fetched everything requested (or everything the provider had) and persisted it
    Completed,
    /// Cancelled; partial results were persisted
    Aborted,
    /// Failed with an error
    Error,
}

impl TaskStatus {
    /// Whether pollers should stop polling
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TaskStatus::Running)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Aborted => "aborted",
            TaskStatus::Error => "error",
        };
        f.write_str(s)
    }
}

/// Lightweight metadata of one fetched message
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailRecord {
    /// Provider message id
    pub id: String,
    /// Preview text
    #[serde(default)]
    pub snippet: String,
    /// Provider-internal timestamp in milliseconds since the epoch
    #[serde(rename = "internalDate", deserialize_with = "millis_from_str_or_int")]
    pub internal_date: i64,
}

// Gmail sends internalDate as a decimal string; older result files may hold integers.
fn millis_from_str_or_int<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Millis {
        Int(i64),
        Str(String),
    }

    match Millis::deserialize(deserializer)? {
        Millis::Int(ms) => Ok(ms),
        Millis::Str(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

/// Progress snapshot of a fetch task
///
/// This is the schema exposed to pollers; field names are stable.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Progress {
    /// Items fetched so far
    pub processed: u64,
    /// Working total (advisory); `None` when neither the caller nor the provider bounded it
    pub total: Option<u64>,
    /// Items per second since the task started
    pub current_speed: f64,
    /// `total - processed`, floored at zero
    pub remaining_emails: u64,
    /// Remaining time as `"{h}h {m}m {s}s"` or `"Calculating..."`
    pub remaining_time_formatted: String,
    /// Absolute ETA as an ISO-8601 timestamp or `"Calculating..."`
    pub eta_formatted: String,
    /// Task status
    pub status: TaskStatus,
    /// Terminal error message, only set when `status` is `error`
    #[serde(default)]
    pub error: Option<String>,
}

impl Progress {
    /// Snapshot of a task that has just been started
    pub fn starting() -> Self {
        Self {
            processed: 0,
            total: None,
            current_speed: 0.0,
            remaining_emails: 0,
            remaining_time_formatted: crate::fetcher::CALCULATING.to_string(),
            eta_formatted: crate::fetcher::CALCULATING.to_string(),
            status: TaskStatus::Running,
            error: None,
        }
    }

    /// Whether the task reached a terminal state
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

impl Default for Progress {
    fn default() -> Self {
        Self::starting()
    }
}

/// Event emitted during a fetch task's lifecycle
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Task registered and launched
    TaskStarted {
        /// Task ID
        task_id: TaskId,
        /// Requested amount (`None` = unbounded)
        amount: Option<u64>,
    },

    /// Progress snapshot, emitted after every fetched item
    Progress {
        /// Task ID
        task_id: TaskId,
        /// Latest snapshot
        progress: Progress,
    },

    /// Task completed and results persisted
    TaskCompleted {
        /// Task ID
        task_id: TaskId,
        /// Number of items persisted
        processed: u64,
    },

    /// Task cancelled; partial results persisted
    TaskAborted {
        /// Task ID
        task_id: TaskId,
        /// Number of items persisted
        processed: u64,
    },

    /// Task failed
    TaskFailed {
        /// Task ID
        task_id: TaskId,
        /// Error message
        error: String,
    },

    /// Task removed from the registry
    TaskRemoved {
        /// Task ID
        task_id: TaskId,
    },

    /// Tracker is shutting down
    Shutdown,
}
