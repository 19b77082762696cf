//! Choosing "the" face when an image contains several.

use crate::types::ExtractedFace;
use serde::{Deserialize, Serialize};

/// Policy for picking one face out of an extraction result.
///
/// Applied the same way to reference images and to the probe, so both
/// sides of a comparison are chosen consistently.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaceSelection {
    /// First face in detector order. Best-effort only: this is the most
    /// confident detection, not necessarily the largest or most central face.
    #[default]
    First,
    /// Face with the largest bounding box; ties keep the earlier face.
    Largest,
}

impl FaceSelection {
    pub fn select<'a>(&self, faces: &'a [ExtractedFace]) -> Option<&'a ExtractedFace> {
        match self {
            Self::First => faces.first(),
            Self::Largest => faces.iter().fold(None, |best: Option<&ExtractedFace>, face| match best {
                Some(b) if b.bbox.area() >= face.bbox.area() => Some(b),
                _ => Some(face),
            }),
        }
    }
}

impl std::str::FromStr for FaceSelection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "first" => Ok(Self::First),
            "largest" => Ok(Self::Largest),
            other => Err(format!("unknown face selection {other:?} (expected first|largest)")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BoundingBox, FaceVector};

    fn face(size: f32, tag: f32) -> ExtractedFace {
        ExtractedFace {
            bbox: BoundingBox {
                x: 0.0,
                y: 0.0,
                width: size,
                height: size,
                confidence: 0.9,
                landmarks: None,
            },
            vector: FaceVector::new(vec![tag]),
        }
    }

    #[test]
    fn test_empty_selects_nothing() {
        assert!(FaceSelection::First.select(&[]).is_none());
        assert!(FaceSelection::Largest.select(&[]).is_none());
    }

    #[test]
    fn test_first_keeps_detector_order() {
        let faces = vec![face(10.0, 1.0), face(50.0, 2.0)];
        let chosen = FaceSelection::First.select(&faces).unwrap();
        assert_eq!(chosen.vector.values, vec![1.0]);
    }

    #[test]
    fn test_largest_by_area() {
        let faces = vec![face(10.0, 1.0), face(50.0, 2.0), face(20.0, 3.0)];
        let chosen = FaceSelection::Largest.select(&faces).unwrap();
        assert_eq!(chosen.vector.values, vec![2.0]);
    }

    #[test]
    fn test_largest_tie_keeps_earlier() {
        let faces = vec![face(30.0, 1.0), face(30.0, 2.0)];
        let chosen = FaceSelection::Largest.select(&faces).unwrap();
        assert_eq!(chosen.vector.values, vec![1.0]);
    }
}
