//! Deterministic stand-ins for the ONNX models, shared by the daemon's tests.
//!
//! Test images are real PNGs so decoding behaves exactly as in production.
//! Every non-black pixel in the first row is one "face" whose vector is the
//! pixel's RGB scaled to [0, 1] and whose box grows with its column. Each
//! extra row adds 15 ms of latency, to shuffle completion order.

use async_trait::async_trait;
use image::{ImageFormat, Rgb, RgbImage};
use rollcall_core::extractor::decode_image;
use rollcall_core::{
    AnyMatchMatcher, BoundingBox, EnrollmentRecord, ExtractError, ExtractedFace, FaceVector,
    FeatureExtractor, Identity, MatchVerdict, Matcher, Tolerance,
};
use rollcall_store::{BlobStore, MemoryBlobStore, StoreError};
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub struct FakeExtractor;

impl FeatureExtractor for FakeExtractor {
    fn extract(&mut self, image: &[u8]) -> Result<Vec<ExtractedFace>, ExtractError> {
        let photo = decode_image(image)?;
        if photo.height() > 1 {
            std::thread::sleep(Duration::from_millis(15 * u64::from(photo.height() - 1)));
        }

        Ok((0..photo.width())
            .filter_map(|x| {
                let Rgb(rgb) = *photo.get_pixel(x, 0);
                if rgb == [0, 0, 0] {
                    return None;
                }
                let size = (x + 1) as f32 * 10.0;
                Some(ExtractedFace {
                    bbox: BoundingBox {
                        x: 0.0,
                        y: 0.0,
                        width: size,
                        height: size,
                        confidence: 0.9,
                        landmarks: None,
                    },
                    vector: FaceVector::new(rgb.iter().map(|&c| c as f32 / 255.0).collect()),
                })
            })
            .collect())
    }
}

/// Encode a PNG whose first row is `faces` and which is `height` rows tall.
pub fn png(faces: &[[u8; 3]], height: u32) -> Vec<u8> {
    let width = faces.len().max(1) as u32;
    let img = RgbImage::from_fn(width, height, |x, y| match (y, faces.get(x as usize)) {
        (0, Some(&rgb)) => Rgb(rgb),
        _ => Rgb([0, 0, 0]),
    });
    let mut bytes = Vec::new();
    img.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .expect("encode test png");
    bytes
}

/// Any-match matcher that counts how often it is consulted.
#[derive(Clone, Default)]
pub struct CountingMatcher {
    pub calls: Arc<AtomicUsize>,
}

impl CountingMatcher {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Matcher for CountingMatcher {
    fn compare(&self, probe: &FaceVector, enrolled: &[EnrollmentRecord], tolerance: Tolerance) -> MatchVerdict {
        self.calls.fetch_add(1, Ordering::SeqCst);
        AnyMatchMatcher.compare(probe, enrolled, tolerance)
    }
}

/// In-memory store that can be told to fail or lose particular objects.
#[derive(Default)]
pub struct FaultyStore {
    pub inner: MemoryBlobStore,
    unreadable: Vec<String>,
    vanished: Vec<String>,
    put_limit: Option<usize>,
    puts: AtomicUsize,
}

impl FaultyStore {
    /// `get` on `key` fails with an I/O error.
    pub fn unreadable(mut self, key: &str) -> Self {
        self.unreadable.push(key.to_string());
        self
    }

    /// `get` on `key` finds nothing, as if deleted after listing.
    pub fn vanished(mut self, key: &str) -> Self {
        self.vanished.push(key.to_string());
        self
    }

    /// `put` fails once `limit` objects have been stored through this store.
    pub fn put_limit(mut self, limit: usize) -> Self {
        self.put_limit = Some(limit);
        self
    }
}

#[async_trait]
impl BlobStore for FaultyStore {
    async fn ensure_identity(&self, identity: &Identity) -> Result<(), StoreError> {
        self.inner.ensure_identity(identity).await
    }

    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<(), StoreError> {
        if self.put_limit.is_some_and(|limit| self.puts.load(Ordering::SeqCst) >= limit) {
            return Err(StoreError::Io(std::io::Error::other("disk full")));
        }
        self.inner.put(key, bytes, content_type).await?;
        self.puts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn list(&self, identity: &Identity) -> Result<Vec<String>, StoreError> {
        self.inner.list(identity).await
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        if self.unreadable.iter().any(|k| k == key) {
            return Err(StoreError::Io(std::io::Error::other("read failed")));
        }
        if self.vanished.iter().any(|k| k == key) {
            return Ok(None);
        }
        self.inner.get(key).await
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        self.inner.delete(key).await
    }
}
