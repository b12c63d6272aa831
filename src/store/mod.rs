//! File persistence of encrypted result sets and fetch metadata
//!
//! The results file holds a single pretty-printed [`EncryptedBlob`]; the
//! metadata file records when the last successful fetch ran and how many
//! messages it persisted.

pub mod kv;

pub use kv::{KeyValueStore, MemoryKvStore};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::codec::{EncryptedBlob, EncryptionCodec};
use crate::config::StorageConfig;
use crate::error::{Error, Result};
use crate::types::EmailRecord;

/// Summary of the last successful fetch
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchMetadata {
    /// When results were last persisted
    #[serde(rename = "lastFetchTime")]
    pub last_fetch_time: Option<DateTime<Utc>>,
    /// Number of messages in the persisted result set
    #[serde(rename = "emailsFetched")]
    pub emails_fetched: u64,
}

/// Reads and writes the results and metadata files
#[derive(Clone, Debug)]
pub struct ResultStore {
    results_path: PathBuf,
    metadata_path: PathBuf,
}

impl ResultStore {
    /// Create a store over explicit file paths
    pub fn new(results_path: impl Into<PathBuf>, metadata_path: impl Into<PathBuf>) -> Self {
        Self {
            results_path: results_path.into(),
            metadata_path: metadata_path.into(),
        }
    }

    /// Create a store from the storage configuration
    pub fn from_config(config: &StorageConfig) -> Self {
        Self::new(config.results_path.clone(), config.metadata_path.clone())
    }

    /// Path of the encrypted results file
    pub fn results_path(&self) -> &Path {
        &self.results_path
    }

    /// Path of the metadata file
    pub fn metadata_path(&self) -> &Path {
        &self.metadata_path
    }

    /// Write `blob` to `path`, creating parent directories as needed
    pub async fn save_blob(path: &Path, blob: &EncryptedBlob) -> Result<()> {
        let json = serde_json::to_string_pretty(blob)?;
        write_file(path, json.as_bytes()).await?;
        tracing::debug!(path = %path.display(), "Saved encrypted results");
        Ok(())
    }

    /// Read the blob stored at `path`
    pub async fn load_blob(path: &Path) -> Result<EncryptedBlob> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|source| Error::Persistence {
                operation: "read",
                path: path.to_path_buf(),
                source,
            })?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Write `blob` to the configured results file
    pub async fn save(&self, blob: &EncryptedBlob) -> Result<()> {
        Self::save_blob(&self.results_path, blob).await
    }

    /// Read the configured results file
    pub async fn load(&self) -> Result<EncryptedBlob> {
        Self::load_blob(&self.results_path).await
    }

    /// Encrypt and save a result set
    pub async fn save_records(
        &self,
        codec: &EncryptionCodec,
        records: &[EmailRecord],
    ) -> Result<()> {
        let blob = codec.encrypt_json(records)?;
        self.save(&blob).await
    }

    /// Load and decrypt the result set
    pub async fn load_records(&self, codec: &EncryptionCodec) -> Result<Vec<EmailRecord>> {
        let blob = self.load().await?;
        codec.decrypt_json(&blob)
    }

    /// Read the metadata file
    ///
    /// A missing or unreadable file yields the empty default.
    pub async fn load_metadata(&self) -> FetchMetadata {
        let bytes = match tokio::fs::read(&self.metadata_path).await {
            Ok(bytes) => bytes,
            Err(e) => {
                if e.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!(
                        path = %self.metadata_path.display(),
                        error = %e,
                        "Failed to read fetch metadata"
                    );
                }
                return FetchMetadata::default();
            }
        };
        serde_json::from_slice(&bytes).unwrap_or_else(|e| {
            tracing::warn!(
                path = %self.metadata_path.display(),
                error = %e,
                "Fetch metadata is corrupt, ignoring it"
            );
            FetchMetadata::default()
        })
    }

    /// Write the metadata file
    pub async fn save_metadata(&self, metadata: &FetchMetadata) -> Result<()> {
        let json = serde_json::to_string_pretty(metadata)?;
        write_file(&self.metadata_path, json.as_bytes()).await
    }

    /// Record a successful fetch of `count` messages
    ///
    /// Failures are logged and swallowed; the results themselves are already safe.
    pub async fn record_fetch(&self, count: u64) {
        let metadata = FetchMetadata {
            last_fetch_time: Some(Utc::now()),
            emails_fetched: count,
        };
        if let Err(e) = self.save_metadata(&metadata).await {
            tracing::warn!(error = %e, "Failed to update fetch metadata");
        }
    }
}

async fn write_file(path: &Path, contents: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|source| Error::Persistence {
                operation: "create directory for",
                path: path.to_path_buf(),
                source,
            })?;
    }
    tokio::fs::write(path, contents)
        .await
        .map_err(|source| Error::Persistence {
            operation: "write",
            path: path.to_path_buf(),
            source,
        })
}
