use crate::key;
use crate::{BlobStore, StoreError};
use async_trait::async_trait;
use rollcall_core::Identity;
use std::collections::BTreeMap;
use tokio::sync::RwLock;

/// In-process store, used by tests and for throwaway daemons.
#[derive(Default)]
pub struct MemoryBlobStore {
    objects: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn ensure_identity(&self, identity: &Identity) -> Result<(), StoreError> {
        self.objects
            .write()
            .await
            .entry(key::identity_prefix(identity))
            .or_default();
        Ok(())
    }

    async fn put(&self, key: &str, bytes: Vec<u8>, _content_type: &str) -> Result<(), StoreError> {
        let mut objects = self.objects.write().await;
        if objects.contains_key(key) {
            return Err(StoreError::AlreadyExists(key.to_string()));
        }
        objects.insert(key.to_string(), bytes);
        Ok(())
    }

    async fn list(&self, identity: &Identity) -> Result<Vec<String>, StoreError> {
        let prefix = key::identity_prefix(identity);
        Ok(self
            .objects
            .read()
            .await
            .range(prefix.clone()..)
            .take_while(|(k, _)| k.starts_with(&prefix))
            .filter(|(k, _)| key::is_reference_of(identity, k))
            .map(|(k, _)| k.clone())
            .collect())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.objects.read().await.get(key).cloned())
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.objects.write().await.remove(key).is_some())
    }
}
