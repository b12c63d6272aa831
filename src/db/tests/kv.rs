use crate::db::*;
use crate::store::KeyValueStore;
use tempfile::NamedTempFile;

#[tokio::test]
async fn test_set_and_get() {
    let temp_file = NamedTempFile::new().unwrap();
    let db = Database::new(temp_file.path()).await.unwrap();

    assert_eq!(db.get("task:a").await.unwrap(), None);

    db.set("task:a", r#"{"processed":1}"#).await.unwrap();
    assert_eq!(
        db.get("task:a").await.unwrap().as_deref(),
        Some(r#"{"processed":1}"#)
    );

    db.close().await;
}

#[tokio::test]
async fn test_set_overwrites_existing_value() {
    let temp_file = NamedTempFile::new().unwrap();
    let db = Database::new(temp_file.path()).await.unwrap();

    db.set("task:a", "first").await.unwrap();
    db.set("task:a", "second").await.unwrap();

    assert_eq!(db.get("task:a").await.unwrap().as_deref(), Some("second"));
    assert_eq!(db.scan_all_keys().await.unwrap().len(), 1);

    db.close().await;
}

#[tokio::test]
async fn test_delete_is_idempotent() {
    let temp_file = NamedTempFile::new().unwrap();
    let db = Database::new(temp_file.path()).await.unwrap();

    db.set("task:a", "x").await.unwrap();
    db.delete("task:a").await.unwrap();
    db.delete("task:a").await.unwrap();

    assert_eq!(db.get("task:a").await.unwrap(), None);

    db.close().await;
}

#[tokio::test]
async fn test_scan_all_keys_is_sorted() {
    let temp_file = NamedTempFile::new().unwrap();
    let db = Database::new(temp_file.path()).await.unwrap();

    for key in ["task:b", "other", "task:a"] {
        db.set(key, "{}").await.unwrap();
    }

    assert_eq!(
        db.scan_all_keys().await.unwrap(),
        vec!["other", "task:a", "task:b"]
    );

    db.close().await;
}

#[tokio::test]
async fn test_values_survive_reopen() {
    let temp_file = NamedTempFile::new().unwrap();

    {
        let db = Database::new(temp_file.path()).await.unwrap();
        db.set("task:persisted", "snapshot").await.unwrap();
        db.close().await;
    }

    let db = Database::new(temp_file.path()).await.unwrap();
    assert_eq!(
        db.get("task:persisted").await.unwrap().as_deref(),
        Some("snapshot")
    );
    db.close().await;
}
