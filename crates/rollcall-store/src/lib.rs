//! rollcall-store: blob storage for enrolled reference images.
//!
//! The daemon only ever talks to [`BlobStore`]; backends are injected at
//! construction so tests can swap in [`MemoryBlobStore`].

pub mod key;
pub mod memory;
pub mod sqlite;

use async_trait::async_trait;
use rollcall_core::Identity;
use thiserror::Error;

pub use memory::MemoryBlobStore;
pub use sqlite::SqliteBlobStore;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("object already exists: {0}")]
    AlreadyExists(String),
    #[error("sqlite: {0}")]
    Sqlite(#[from] tokio_rusqlite::Error),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

/// Reference-image storage scoped by identity.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Create the identity's placeholder entry. Idempotent.
    async fn ensure_identity(&self, identity: &Identity) -> Result<(), StoreError>;

    /// Store a new object. Existing keys are never overwritten.
    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<(), StoreError>;

    /// Image keys stored for `identity`, in key (upload) order.
    async fn list(&self, identity: &Identity) -> Result<Vec<String>, StoreError>;

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// Returns whether anything was deleted.
    async fn delete(&self, key: &str) -> Result<bool, StoreError>;
}
