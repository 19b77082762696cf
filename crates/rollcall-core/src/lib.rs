//! rollcall-core: face feature extraction and match decisions.
//!
//! Uses SCRFD for face detection and ArcFace for feature vectors, both
//! running via ONNX Runtime on the CPU, plus the matching policies that
//! turn a probe vector and an identity's enrollment into a verdict.

pub mod alignment;
pub mod detector;
pub mod extractor;
pub mod matcher;
pub mod recognizer;
pub mod selection;
pub mod types;

use std::path::PathBuf;

pub use detector::FaceDetector;
pub use extractor::{ExtractError, FeatureExtractor, OnnxExtractor};
pub use matcher::{AnyMatchMatcher, MatchPolicy, Matcher, NearestMatcher};
pub use recognizer::FaceRecognizer;
pub use selection::FaceSelection;
pub use types::{
    BoundingBox, EnrollmentRecord, ExtractedFace, FaceVector, Identity, IdentityError,
    MatchVerdict, Tolerance, ToleranceError,
};

/// Default location of the ONNX model files.
pub fn default_model_dir() -> PathBuf {
    PathBuf::from("/usr/share/rollcall/models")
}
