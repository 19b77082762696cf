//! Attendance orchestration: probe extraction, enrollment lookup, match
//! decision, and the reference upload path.

use crate::config::Config;
use crate::enrollment::{EnrollmentError, EnrollmentReader};
use crate::pool::{ExtractorPool, PoolError};
use chrono::Utc;
use image::ImageFormat;
use rollcall_core::{ExtractError, FaceSelection, Identity, MatchVerdict, Matcher, Tolerance};
use rollcall_store::{key, BlobStore, StoreError};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AttendanceError {
    #[error("user not authenticated")]
    Unauthenticated,
    #[error("invalid image: {0}")]
    InvalidImage(String),
    #[error("no face found in uploaded image")]
    NoFaceDetected,
    #[error("no stored faces found for this user")]
    NoEnrollmentData,
    #[error("face not recognized")]
    NotRecognized,
    #[error("reference image not found: {0}")]
    ReferenceNotFound(String),
    #[error("feature extraction failed: {0}")]
    Extraction(ExtractError),
    #[error("storage error: {0}")]
    Store(#[from] StoreError),
    #[error("extractor pool unavailable")]
    PoolClosed,
}

impl AttendanceError {
    /// HTTP-style status for this outcome.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Unauthenticated => 401,
            Self::InvalidImage(_) | Self::NoFaceDetected => 400,
            Self::NoEnrollmentData | Self::NotRecognized | Self::ReferenceNotFound(_) => 404,
            Self::Extraction(_) | Self::Store(_) | Self::PoolClosed => 500,
        }
    }

    /// Stable snake_case name for API payloads.
    pub fn verdict(&self) -> &'static str {
        match self {
            Self::Unauthenticated => "unauthenticated",
            Self::InvalidImage(_) => "invalid_image",
            Self::NoFaceDetected => MatchVerdict::NoFaceDetected.name(),
            Self::NoEnrollmentData => MatchVerdict::NoEnrollmentData.name(),
            Self::NotRecognized => MatchVerdict::NotRecognized.name(),
            Self::ReferenceNotFound(_) => "reference_not_found",
            Self::Extraction(_) | Self::Store(_) | Self::PoolClosed => "error",
        }
    }

    /// Whether this is a caller-facing outcome rather than a server fault.
    pub fn is_client_outcome(&self) -> bool {
        self.status_code() < 500
    }
}

impl From<PoolError> for AttendanceError {
    fn from(e: PoolError) -> Self {
        match e {
            PoolError::Extract(ExtractError::InvalidImage(msg)) => Self::InvalidImage(msg),
            PoolError::Extract(other) => Self::Extraction(other),
            PoolError::Spawn(_) | PoolError::ChannelClosed => Self::PoolClosed,
        }
    }
}

impl From<EnrollmentError> for AttendanceError {
    fn from(e: EnrollmentError) -> Self {
        match e {
            EnrollmentError::Store(e) => Self::Store(e),
            EnrollmentError::Pool(e) => e.into(),
        }
    }
}

/// Turn the caller-supplied user key into an [`Identity`].
pub fn authenticate(user: &str) -> Result<Identity, AttendanceError> {
    Identity::new(user).map_err(|_| AttendanceError::Unauthenticated)
}

/// A successful attendance check.
#[derive(Debug, Clone, PartialEq)]
pub struct Marked {
    pub identity: Identity,
    /// Distance to the enrolled vector that decided the match.
    pub distance: f32,
}

/// Serialized result of an attendance check, as returned to API callers.
#[derive(Debug, Serialize)]
pub struct Outcome {
    pub status: u16,
    pub verdict: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance: Option<f32>,
}

impl Outcome {
    /// Map an attendance result to its outcome. Server faults are handed
    /// back as errors for the transport to report.
    pub fn from_mark(result: Result<Marked, AttendanceError>) -> Result<Self, AttendanceError> {
        match result {
            Ok(marked) => Ok(Self {
                status: 200,
                verdict: "matched",
                message: format!("Attendance marked for user {}", marked.identity),
                distance: Some(marked.distance),
            }),
            Err(e) if e.is_client_outcome() => Ok(Self {
                status: e.status_code(),
                verdict: e.verdict(),
                message: e.to_string(),
                distance: None,
            }),
            Err(e) => Err(e),
        }
    }
}

/// The attendance service: one instance per daemon, shared across requests.
pub struct Attendance {
    store: Arc<dyn BlobStore>,
    pool: ExtractorPool,
    reader: EnrollmentReader,
    matcher: Box<dyn Matcher>,
    selection: FaceSelection,
    tolerance: Tolerance,
}

impl Attendance {
    pub fn new(store: Arc<dyn BlobStore>, pool: ExtractorPool, config: &Config) -> Self {
        let reader = EnrollmentReader::new(
            store.clone(),
            pool.clone(),
            config.face_selection,
            config.workers,
            config.cache_enrollments,
        );
        Self {
            store,
            pool,
            reader,
            matcher: config.match_policy.matcher(),
            selection: config.face_selection,
            tolerance: config.tolerance,
        }
    }

    /// Replace the match strategy chosen from configuration.
    pub fn with_matcher(mut self, matcher: Box<dyn Matcher>) -> Self {
        self.matcher = matcher;
        self
    }

    /// Check a probe photo against `identity`'s enrolled references.
    pub async fn mark(&self, identity: &Identity, probe: Vec<u8>) -> Result<Marked, AttendanceError> {
        let faces = self.pool.extract(probe).await?;
        // Same selection policy as enrollment; never consults the matcher without a face.
        let Some(face) = self.selection.select(&faces) else {
            tracing::info!(%identity, "no face in probe image");
            return Err(AttendanceError::NoFaceDetected);
        };
        if faces.len() > 1 {
            tracing::debug!(%identity, faces = faces.len(), policy = ?self.selection, "several faces in probe");
        }

        let enrolled = self.reader.read(identity).await?;
        if enrolled.is_empty() {
            tracing::info!(%identity, "no usable enrollment");
            return Err(AttendanceError::NoEnrollmentData);
        }

        match self.matcher.compare(&face.vector, &enrolled, self.tolerance) {
            MatchVerdict::Matched { identity: matched, distance } => {
                tracing::info!(%identity, %matched, distance, "attendance marked");
                Ok(Marked { identity: matched, distance })
            }
            MatchVerdict::NoEnrollmentData => Err(AttendanceError::NoEnrollmentData),
            MatchVerdict::NotRecognized | MatchVerdict::NoFaceDetected => {
                tracing::info!(%identity, references = enrolled.len(), "face not recognized");
                Err(AttendanceError::NotRecognized)
            }
        }
    }

    /// Create the identity's storage placeholder (first login).
    pub async fn register(&self, identity: &Identity) -> Result<(), AttendanceError> {
        self.store.ensure_identity(identity).await?;
        Ok(())
    }

    /// Store new reference images for `identity`. Returns the new keys.
    ///
    /// Images are only sniffed for a known format here; faces are extracted
    /// lazily when the enrollment is next read. A batch is stored whole or
    /// not at all.
    pub async fn enroll(&self, identity: &Identity, images: Vec<Vec<u8>>) -> Result<Vec<String>, AttendanceError> {
        if images.is_empty() {
            return Err(AttendanceError::InvalidImage("no images supplied".into()));
        }
        let formats = images
            .iter()
            .map(|bytes| sniff_format(bytes))
            .collect::<Result<Vec<_>, _>>()?;

        self.store.ensure_identity(identity).await?;

        let at = Utc::now();
        let mut keys = Vec::with_capacity(images.len());
        for (seq, (bytes, format)) in images.into_iter().zip(formats).enumerate() {
            let key = key::reference_key(identity, at, seq, extension(format));
            if let Err(e) = self.store.put(&key, bytes, format.to_mime_type()).await {
                tracing::warn!(%identity, %key, error = %e, stored = keys.len(), "upload failed; rolling back batch");
                self.discard(&keys).await;
                self.reader.invalidate(identity).await;
                return Err(e.into());
            }
            keys.push(key);
        }
        self.reader.invalidate(identity).await;

        tracing::info!(%identity, count = keys.len(), "reference images stored");
        Ok(keys)
    }

    /// Best-effort removal of the already-stored part of a failed batch.
    async fn discard(&self, keys: &[String]) {
        for key in keys {
            if let Err(e) = self.store.delete(key).await {
                tracing::error!(%key, error = %e, "failed to roll back reference image");
            }
        }
    }

    /// Keys of `identity`'s stored reference images, in upload order.
    pub async fn references(&self, identity: &Identity) -> Result<Vec<String>, AttendanceError> {
        Ok(self.store.list(identity).await?)
    }

    /// Delete one of `identity`'s reference images.
    pub async fn remove(&self, identity: &Identity, reference: &str) -> Result<(), AttendanceError> {
        if !key::belongs_to(identity, reference) || !self.store.delete(reference).await? {
            return Err(AttendanceError::ReferenceNotFound(reference.to_string()));
        }
        self.reader.invalidate(identity).await;
        tracing::info!(%identity, reference, "reference image removed");
        Ok(())
    }

    pub async fn status(&self) -> serde_json::Value {
        serde_json::json!({
            "version": env!("CARGO_PKG_VERSION"),
            "workers": self.pool.workers(),
            "tolerance": self.tolerance.value(),
            "face_selection": self.selection,
            "cached_identities": self.reader.cached_identities().await,
        })
    }
}

/// Identify an upload's image format from its magic bytes.
fn sniff_format(bytes: &[u8]) -> Result<ImageFormat, AttendanceError> {
    let format = image::guess_format(bytes).map_err(|e| AttendanceError::InvalidImage(e.to_string()))?;
    if !key::is_image_extension(extension(format)) {
        return Err(AttendanceError::InvalidImage(format!("unsupported image format {format:?}")));
    }
    Ok(format)
}

/// File extension for a sniffed format; JPEG is the fallback.
fn extension(format: ImageFormat) -> &'static str {
    match format {
        ImageFormat::Jpeg => "jpg",
        ImageFormat::Png => "png",
        other => other.extensions_str().first().copied().unwrap_or("jpg"),
    }
}
