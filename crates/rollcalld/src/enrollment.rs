//! Enrollment store reader: stored reference images → enrolled vectors.

use crate::pool::{ExtractorPool, PoolError};
use futures::stream::{self, StreamExt};
use rollcall_core::{EnrollmentRecord, FaceSelection, Identity};
use rollcall_store::{BlobStore, StoreError};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;

#[derive(Error, Debug)]
pub enum EnrollmentError {
    #[error("storage error: {0}")]
    Store(#[from] StoreError),
    #[error("extractor pool: {0}")]
    Pool(PoolError),
}

/// Enrolled vectors for one identity, in reference upload order.
pub type Enrollment = Arc<[EnrollmentRecord]>;

/// Cached enrollments plus a per-identity generation, bumped on every
/// invalidation. A read caches its result only if the generation it started
/// under is still current.
#[derive(Default)]
struct Cache {
    entries: HashMap<Identity, Enrollment>,
    generations: HashMap<Identity, u64>,
}

impl Cache {
    fn generation(&self, identity: &Identity) -> u64 {
        self.generations.get(identity).copied().unwrap_or(0)
    }
}

/// Builds an identity's enrollment from its stored reference images.
///
/// A reference image that cannot be fetched or decoded, or that contains
/// no face, is logged and skipped; it never fails the whole read.
pub struct EnrollmentReader {
    store: Arc<dyn BlobStore>,
    pool: ExtractorPool,
    selection: FaceSelection,
    concurrency: usize,
    cache: Option<RwLock<Cache>>,
}

impl EnrollmentReader {
    pub fn new(
        store: Arc<dyn BlobStore>,
        pool: ExtractorPool,
        selection: FaceSelection,
        concurrency: usize,
        cache: bool,
    ) -> Self {
        Self {
            store,
            pool,
            selection,
            concurrency: concurrency.max(1),
            cache: cache.then(|| RwLock::new(Cache::default())),
        }
    }

    /// Read the enrollment for `identity`. Empty when nothing usable is stored.
    pub async fn read(&self, identity: &Identity) -> Result<Enrollment, EnrollmentError> {
        let mut generation = 0;
        if let Some(cache) = &self.cache {
            let cache = cache.read().await;
            if let Some(hit) = cache.entries.get(identity) {
                tracing::debug!(%identity, records = hit.len(), "enrollment cache hit");
                return Ok(hit.clone());
            }
            generation = cache.generation(identity);
        }

        let keys = self.store.list(identity).await?;
        let total = keys.len();

        // `buffered` keeps results in listing order however the workers finish,
        // so the first-match tie-break stays deterministic.
        let loaded: Vec<Result<Option<EnrollmentRecord>, EnrollmentError>> = stream::iter(keys)
            .map(|key| self.load_reference(identity, key))
            .buffered(self.concurrency)
            .collect()
            .await;

        let mut records = Vec::with_capacity(total);
        for result in loaded {
            if let Some(record) = result? {
                records.push(record);
            }
        }

        tracing::info!(%identity, references = total, usable = records.len(), "enrollment loaded");

        let enrollment: Enrollment = records.into();
        if let Some(cache) = &self.cache {
            let mut cache = cache.write().await;
            if cache.generation(identity) == generation {
                cache.entries.insert(identity.clone(), enrollment.clone());
            } else {
                tracing::debug!(%identity, "references changed during read; not caching");
            }
        }
        Ok(enrollment)
    }

    /// Drop any cached enrollment for `identity`. Call after its references change.
    pub async fn invalidate(&self, identity: &Identity) {
        if let Some(cache) = &self.cache {
            let mut cache = cache.write().await;
            *cache.generations.entry(identity.clone()).or_insert(0) += 1;
            if cache.entries.remove(identity).is_some() {
                tracing::debug!(%identity, "enrollment cache invalidated");
            }
        }
    }

    pub async fn cached_identities(&self) -> usize {
        match &self.cache {
            Some(cache) => cache.read().await.entries.len(),
            None => 0,
        }
    }

    /// Fetch and extract one reference. `Ok(None)` means "skip this image".
    async fn load_reference(
        &self,
        identity: &Identity,
        key: String,
    ) -> Result<Option<EnrollmentRecord>, EnrollmentError> {
        let bytes = match self.store.get(&key).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => {
                tracing::debug!(%key, "reference vanished between list and fetch");
                return Ok(None);
            }
            Err(e) => {
                tracing::warn!(%key, error = %e, "failed to fetch reference image; skipping");
                return Ok(None);
            }
        };

        let faces = match self.pool.extract(bytes).await {
            Ok(faces) => faces,
            Err(PoolError::Extract(e)) => {
                tracing::warn!(%key, error = %e, "unusable reference image; skipping");
                return Ok(None);
            }
            Err(e) => return Err(EnrollmentError::Pool(e)),
        };

        let Some(face) = self.selection.select(&faces) else {
            tracing::warn!(%key, "no face in reference image; skipping");
            return Ok(None);
        };
        if faces.len() > 1 {
            tracing::debug!(%key, faces = faces.len(), policy = ?self.selection, "several faces in reference image");
        }

        Ok(Some(EnrollmentRecord {
            identity: identity.clone(),
            vector: face.vector.clone(),
            source: key,
        }))
    }
}
