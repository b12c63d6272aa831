//! Tracker construction against a mock Gmail server

use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use wiremock::MockServer;

use apptrack::config::RetryConfig;
use apptrack::{
    ApplicationTracker, Config, EncryptionCodec, EncryptionKey, GmailClient, StaticTokenAuth,
};

/// Key used by every integration test
pub const TEST_KEY: &[u8; 32] = b"fedcba9876543210fedcba9876543210";

pub fn test_codec() -> EncryptionCodec {
    EncryptionCodec::new(EncryptionKey::from_bytes(TEST_KEY).unwrap())
}

/// Config pointing at `server`, storing files under `dir`
pub fn test_config(server: &MockServer, dir: &TempDir) -> Config {
    let mut config = Config::default();
    config.gmail.api_base_url = server.uri();
    config.retry = RetryConfig {
        max_attempts: 3,
        initial_delay: Duration::from_millis(5),
        max_delay: Duration::from_millis(20),
        backoff_multiplier: 2.0,
        transient_delay: Duration::from_millis(5),
        jitter: false,
    };
    config.storage.results_path = dir.path().join("data/email_results.json");
    config.storage.metadata_path = dir.path().join("data/fetch_metadata.json");
    config
}

/// Tracker fetching from `server` with a fixed bearer token
pub async fn create_test_tracker(server: &MockServer, dir: &TempDir) -> ApplicationTracker {
    create_tracker_with_config(test_config(server, dir)).await
}

pub async fn create_tracker_with_config(config: Config) -> ApplicationTracker {
    let client = GmailClient::new(&config.gmail, TEST_TOKEN.to_string()).unwrap();
    let auth = Arc::new(StaticTokenAuth::new(Arc::new(client)));
    ApplicationTracker::new(config, auth, test_codec())
        .await
        .unwrap()
}

/// Bearer token the mock server expects
pub const TEST_TOKEN: &str = "integration-token";
