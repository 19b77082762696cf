//! SQLite-backed blob store.

use crate::key;
use crate::{BlobStore, StoreError};
use async_trait::async_trait;
use rollcall_core::Identity;
use rusqlite::{params, OptionalExtension};
use std::path::Path;
use tokio_rusqlite::Connection;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS blobs (
    key          TEXT PRIMARY KEY,
    content_type TEXT NOT NULL,
    bytes        BLOB NOT NULL,
    created_at   TEXT NOT NULL
);
";

/// Blob store in a single SQLite file, accessed off the async runtime via
/// `tokio-rusqlite`.
pub struct SqliteBlobStore {
    conn: Connection,
}

impl SqliteBlobStore {
    /// Open (or create) the database at `path`, creating parent directories.
    pub async fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let conn = Connection::open(path).await?;
        conn.call(|conn| {
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get::<_, String>(0))?;
            Ok(())
        })
        .await?;
        tracing::info!(path = %path.display(), "opened blob store");
        Self::init(conn).await
    }

    pub async fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory().await?).await
    }

    async fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.call(|conn| {
            conn.execute_batch(SCHEMA)?;
            Ok(())
        })
        .await?;
        Ok(Self { conn })
    }

    /// Insert unless the key exists; returns whether a row was written.
    async fn insert(&self, key: String, bytes: Vec<u8>, content_type: String) -> Result<bool, StoreError> {
        let created_at = chrono::Utc::now().to_rfc3339();
        let written = self
            .conn
            .call(move |conn| {
                let n = conn.execute(
                    "INSERT OR IGNORE INTO blobs (key, content_type, bytes, created_at)
                     VALUES (?1, ?2, ?3, ?4)",
                    params![key, content_type, bytes, created_at],
                )?;
                Ok(n > 0)
            })
            .await?;
        Ok(written)
    }
}

#[async_trait]
impl BlobStore for SqliteBlobStore {
    async fn ensure_identity(&self, identity: &Identity) -> Result<(), StoreError> {
        let placeholder = key::identity_prefix(identity);
        if self.insert(placeholder, Vec::new(), "application/x-directory".into()).await? {
            tracing::debug!(%identity, "created identity placeholder");
        }
        Ok(())
    }

    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<(), StoreError> {
        let size = bytes.len();
        if !self.insert(key.to_string(), bytes, content_type.to_string()).await? {
            return Err(StoreError::AlreadyExists(key.to_string()));
        }
        tracing::debug!(key, size, "stored object");
        Ok(())
    }

    async fn list(&self, identity: &Identity) -> Result<Vec<String>, StoreError> {
        let prefix = key::identity_prefix(identity);
        let keys = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT key FROM blobs WHERE substr(key, 1, length(?1)) = ?1 ORDER BY key",
                )?;
                let keys = stmt
                    .query_map(params![prefix], |row| row.get::<_, String>(0))?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(keys)
            })
            .await?;
        Ok(keys.into_iter().filter(|k| key::is_reference_of(identity, k)).collect())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let key = key.to_string();
        let bytes = self
            .conn
            .call(move |conn| {
                let bytes = conn
                    .query_row("SELECT bytes FROM blobs WHERE key = ?1", params![key], |row| {
                        row.get::<_, Vec<u8>>(0)
                    })
                    .optional()?;
                Ok(bytes)
            })
            .await?;
        Ok(bytes)
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        let key = key.to_string();
        let deleted = self
            .conn
            .call(move |conn| Ok(conn.execute("DELETE FROM blobs WHERE key = ?1", params![key])? > 0))
            .await?;
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> Identity {
        Identity::new(s).unwrap()
    }

    #[tokio::test]
    async fn test_put_get_roundtrip() {
        let store = SqliteBlobStore::open_in_memory().await.unwrap();
        store.put("faces/u1/a.jpg", vec![1, 2, 3], "image/jpeg").await.unwrap();
        assert_eq!(store.get("faces/u1/a.jpg").await.unwrap(), Some(vec![1, 2, 3]));
        assert_eq!(store.get("faces/u1/missing.jpg").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_put_never_overwrites() {
        let store = SqliteBlobStore::open_in_memory().await.unwrap();
        store.put("faces/u1/a.jpg", vec![1], "image/jpeg").await.unwrap();
        let err = store.put("faces/u1/a.jpg", vec![9], "image/jpeg").await.unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists(_)));
        assert_eq!(store.get("faces/u1/a.jpg").await.unwrap(), Some(vec![1]));
    }

    #[tokio::test]
    async fn test_list_is_scoped_ordered_and_skips_placeholder() {
        let store = SqliteBlobStore::open_in_memory().await.unwrap();
        store.ensure_identity(&id("u1")).await.unwrap();
        store.ensure_identity(&id("u1")).await.unwrap();
        store.put("faces/u1/20250102T000000.000000Z-b.jpg", vec![2], "image/jpeg").await.unwrap();
        store.put("faces/u1/20250101T000000.000000Z-a.png", vec![1], "image/png").await.unwrap();
        store.put("faces/u10/20250101T000000.000000Z-x.jpg", vec![3], "image/jpeg").await.unwrap();
        store.put("faces/u1_%/20250101T000000.000000Z-y.jpg", vec![4], "image/jpeg").await.unwrap();

        let keys = store.list(&id("u1")).await.unwrap();
        assert_eq!(
            keys,
            vec![
                "faces/u1/20250101T000000.000000Z-a.png",
                "faces/u1/20250102T000000.000000Z-b.jpg",
            ]
        );
    }

    #[tokio::test]
    async fn test_list_excludes_nested_identity() {
        let store = SqliteBlobStore::open_in_memory().await.unwrap();
        store.ensure_identity(&id("u1/x")).await.unwrap();
        store.put("faces/u1/a.png", vec![1], "image/png").await.unwrap();
        store.put("faces/u1/x/evil.png", vec![2], "image/png").await.unwrap();

        assert_eq!(store.list(&id("u1")).await.unwrap(), vec!["faces/u1/a.png"]);
        assert_eq!(store.list(&id("u1/x")).await.unwrap(), vec!["faces/u1/x/evil.png"]);
    }

    #[tokio::test]
    async fn test_delete() {
        let store = SqliteBlobStore::open_in_memory().await.unwrap();
        store.put("faces/u1/a.jpg", vec![1], "image/jpeg").await.unwrap();
        assert!(store.delete("faces/u1/a.jpg").await.unwrap());
        assert!(!store.delete("faces/u1/a.jpg").await.unwrap());
        assert!(store.list(&id("u1")).await.unwrap().is_empty());
    }
}
