use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Default maximum Euclidean distance for two faces to count as the same person.
pub const DEFAULT_TOLERANCE: f32 = 0.5;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum IdentityError {
    #[error("identity must not be empty")]
    Empty,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ToleranceError {
    #[error("tolerance must be a finite, non-negative distance (got {0})")]
    OutOfRange(f32),
}

/// Opaque, stable key for one enrolled person.
///
/// Supplied by the identity provider in front of the daemon and otherwise
/// trusted; the only check is that it is not blank.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Identity(String);

impl Identity {
    pub fn new(key: impl Into<String>) -> Result<Self, IdentityError> {
        let key = key.into();
        if key.trim().is_empty() {
            return Err(IdentityError::Empty);
        }
        Ok(Self(key))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Identity {
    type Error = IdentityError;

    fn try_from(key: String) -> Result<Self, Self::Error> {
        Self::new(key)
    }
}

impl From<Identity> for String {
    fn from(identity: Identity) -> Self {
        identity.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Bounding box for a detected face, with optional facial landmarks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
    /// Five-point facial landmarks: [left_eye, right_eye, nose, left_mouth, right_mouth].
    pub landmarks: Option<[(f32, f32); 5]>,
}

impl BoundingBox {
    pub fn area(&self) -> f32 {
        self.width.max(0.0) * self.height.max(0.0)
    }
}

/// Fixed-length face embedding (512-dimensional for ArcFace w600k_r50).
///
/// Vectors are only comparable when they come from the same extraction
/// model; see [`FaceVector::is_comparable`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceVector {
    pub values: Vec<f32>,
    /// Model version that produced this vector (e.g., "w600k_r50").
    pub model_version: Option<String>,
}

impl FaceVector {
    pub fn new(values: Vec<f32>) -> Self {
        Self { values, model_version: None }
    }

    pub fn dim(&self) -> usize {
        self.values.len()
    }

    /// True when both vectors live in the same feature space: equal
    /// dimensionality and, if both are tagged, the same model version.
    pub fn is_comparable(&self, other: &FaceVector) -> bool {
        if self.dim() != other.dim() {
            return false;
        }
        match (&self.model_version, &other.model_version) {
            (Some(a), Some(b)) => a == b,
            _ => true,
        }
    }

    /// Euclidean distance between two vectors of equal dimension.
    pub fn euclidean_distance(&self, other: &FaceVector) -> f32 {
        self.values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f32>()
            .sqrt()
    }
}

/// One face found in an image: where it is and what it looks like.
#[derive(Debug, Clone)]
pub struct ExtractedFace {
    pub bbox: BoundingBox,
    pub vector: FaceVector,
}

/// A reference vector paired with the identity it was enrolled for.
///
/// Produced when a stored reference image yields a face; never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrollmentRecord {
    pub identity: Identity,
    pub vector: FaceVector,
    /// Storage key of the reference image this record came from.
    pub source: String,
}

/// Categorical outcome of one attendance match decision.
#[derive(Debug, Clone, PartialEq)]
pub enum MatchVerdict {
    /// The probe is within tolerance of an enrolled vector.
    Matched { identity: Identity, distance: f32 },
    /// The probe image contains no detectable face.
    NoFaceDetected,
    /// The identity has no usable enrolled vectors.
    NoEnrollmentData,
    /// A face was found but matched nothing enrolled.
    NotRecognized,
}

impl MatchVerdict {
    /// Stable snake_case name used in API payloads and logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Matched { .. } => "matched",
            Self::NoFaceDetected => "no_face_detected",
            Self::NoEnrollmentData => "no_enrollment_data",
            Self::NotRecognized => "not_recognized",
        }
    }
}

/// Maximum Euclidean distance accepted as a match. Lower is stricter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "f32", into = "f32")]
pub struct Tolerance(f32);

impl Tolerance {
    pub fn new(value: f32) -> Result<Self, ToleranceError> {
        if !value.is_finite() || value < 0.0 {
            return Err(ToleranceError::OutOfRange(value));
        }
        Ok(Self(value))
    }

    pub fn value(self) -> f32 {
        self.0
    }

    /// Whether `distance` is close enough to count as a match (inclusive).
    pub fn admits(self, distance: f32) -> bool {
        distance <= self.0
    }
}

impl Default for Tolerance {
    fn default() -> Self {
        Self(DEFAULT_TOLERANCE)
    }
}

impl TryFrom<f32> for Tolerance {
    type Error = ToleranceError;

    fn try_from(value: f32) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Tolerance> for f32 {
    fn from(t: Tolerance) -> f32 {
        t.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vector(values: &[f32]) -> FaceVector {
        FaceVector::new(values.to_vec())
    }

    #[test]
    fn test_euclidean_distance_identical() {
        let a = vector(&[0.3, 0.4, 0.5]);
        assert_eq!(a.euclidean_distance(&a), 0.0);
    }

    #[test]
    fn test_euclidean_distance_known() {
        let a = vector(&[0.0, 0.0]);
        let b = vector(&[3.0, 4.0]);
        assert!((a.euclidean_distance(&b) - 5.0).abs() < 1e-6);
        assert!((b.euclidean_distance(&a) - 5.0).abs() < 1e-6);
    }

    #[test]
    fn test_comparable_requires_same_dim() {
        assert!(!vector(&[1.0, 0.0]).is_comparable(&vector(&[1.0, 0.0, 0.0])));
    }

    #[test]
    fn test_comparable_model_versions() {
        let mut a = vector(&[1.0, 0.0]);
        let mut b = vector(&[1.0, 0.0]);
        assert!(a.is_comparable(&b));

        a.model_version = Some("w600k_r50".into());
        assert!(a.is_comparable(&b), "untagged vectors are assumed compatible");

        b.model_version = Some("glint360k_r100".into());
        assert!(!a.is_comparable(&b));
    }

    #[test]
    fn test_identity_rejects_blank() {
        assert_eq!(Identity::new(""), Err(IdentityError::Empty));
        assert_eq!(Identity::new("   "), Err(IdentityError::Empty));
        assert_eq!(Identity::new("u1").unwrap().as_str(), "u1");
    }

    #[test]
    fn test_identity_deserialize_validates() {
        assert_eq!(serde_json::from_str::<Identity>(r#""u1""#).unwrap().as_str(), "u1");
        assert!(serde_json::from_str::<Identity>(r#""  ""#).is_err());
        assert_eq!(serde_json::to_string(&Identity::new("u1").unwrap()).unwrap(), r#""u1""#);

        let record = r#"{"identity":"","vector":{"values":[0.1],"model_version":null},"source":"faces//a.png"}"#;
        assert!(serde_json::from_str::<EnrollmentRecord>(record).is_err());
    }

    #[test]
    fn test_tolerance_bounds() {
        assert!(Tolerance::new(0.0).is_ok());
        assert!(Tolerance::new(0.5).is_ok());
        assert!(Tolerance::new(-0.1).is_err());
        assert!(Tolerance::new(f32::NAN).is_err());
        assert!(Tolerance::new(f32::INFINITY).is_err());
        assert_eq!(Tolerance::default().value(), DEFAULT_TOLERANCE);
    }

    #[test]
    fn test_tolerance_admits_inclusive() {
        let t = Tolerance::new(0.5).unwrap();
        assert!(t.admits(0.5));
        assert!(t.admits(0.0));
        assert!(!t.admits(0.5001));
        assert!(!t.admits(f32::NAN));
    }

    #[test]
    fn test_tolerance_deserialize_rejects_negative() {
        assert!(serde_json::from_str::<Tolerance>("0.6").is_ok());
        assert!(serde_json::from_str::<Tolerance>("-1.0").is_err());
    }

    #[test]
    fn test_bbox_area() {
        let b = BoundingBox {
            x: 0.0,
            y: 0.0,
            width: 10.0,
            height: 20.0,
            confidence: 0.9,
            landmarks: None,
        };
        assert_eq!(b.area(), 200.0);
    }
}
