//! Feature extraction: raw image bytes in, one feature vector per face out.

use crate::detector::{DetectorError, FaceDetector};
use crate::recognizer::{FaceRecognizer, RecognizerError};
use crate::types::ExtractedFace;
use image::RgbImage;
use std::path::Path;
use thiserror::Error;

pub const SCRFD_MODEL_FILE: &str = "det_10g.onnx";
pub const ARCFACE_MODEL_FILE: &str = "w600k_r50.onnx";

#[derive(Error, Debug)]
pub enum ExtractError {
    /// The bytes are not a decodable image. Distinct from "no face found",
    /// which is a successful, empty extraction.
    #[error("invalid image: {0}")]
    InvalidImage(String),
    #[error("detector error: {0}")]
    Detector(#[from] DetectorError),
    #[error("recognizer error: {0}")]
    Recognizer(#[from] RecognizerError),
}

/// Turns an encoded image into zero or more faces, in detector order.
///
/// Zero faces is `Ok(vec![])`, never an error. Implementations hold model
/// state and are driven by one thread at a time, hence `&mut self`.
pub trait FeatureExtractor: Send {
    fn extract(&mut self, image: &[u8]) -> Result<Vec<ExtractedFace>, ExtractError>;
}

/// Decode any format the `image` crate understands into RGB8.
pub fn decode_image(bytes: &[u8]) -> Result<RgbImage, ExtractError> {
    let decoded = image::load_from_memory(bytes).map_err(|e| ExtractError::InvalidImage(e.to_string()))?;
    if decoded.width() == 0 || decoded.height() == 0 {
        return Err(ExtractError::InvalidImage("image has zero size".into()));
    }
    Ok(decoded.to_rgb8())
}

/// SCRFD detection followed by ArcFace recognition for every detected face.
pub struct OnnxExtractor {
    detector: FaceDetector,
    recognizer: FaceRecognizer,
}

impl OnnxExtractor {
    /// Load both models from `model_dir`.
    pub fn load(model_dir: &Path) -> Result<Self, ExtractError> {
        let detector = FaceDetector::load(&model_dir.join(SCRFD_MODEL_FILE).to_string_lossy())?;
        let recognizer = FaceRecognizer::load(&model_dir.join(ARCFACE_MODEL_FILE).to_string_lossy())?;
        Ok(Self { detector, recognizer })
    }
}

impl FeatureExtractor for OnnxExtractor {
    fn extract(&mut self, image: &[u8]) -> Result<Vec<ExtractedFace>, ExtractError> {
        let photo = decode_image(image)?;
        let boxes = self.detector.detect(&photo)?;
        tracing::debug!(
            width = photo.width(),
            height = photo.height(),
            faces = boxes.len(),
            "detection complete"
        );

        let mut faces = Vec::with_capacity(boxes.len());
        for bbox in boxes {
            if bbox.landmarks.is_none() {
                tracing::debug!(confidence = bbox.confidence, "skipping face without landmarks");
                continue;
            }
            let vector = self.recognizer.extract(&photo, &bbox)?;
            faces.push(ExtractedFace { bbox, vector });
        }
        Ok(faces)
    }
}
