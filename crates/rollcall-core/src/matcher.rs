//! Match decision: compare one probe vector against an identity's enrollment.

use crate::types::{EnrollmentRecord, FaceVector, MatchVerdict, Tolerance};
use serde::{Deserialize, Serialize};

/// Strategy for deciding whether a probe matches an enrolled collection.
///
/// Implementations must be pure: the same probe, enrollment and tolerance
/// always produce the same verdict. They only ever return
/// [`MatchVerdict::Matched`], [`MatchVerdict::NoEnrollmentData`] or
/// [`MatchVerdict::NotRecognized`].
pub trait Matcher: Send + Sync {
    fn compare(
        &self,
        probe: &FaceVector,
        enrolled: &[EnrollmentRecord],
        tolerance: Tolerance,
    ) -> MatchVerdict;
}

/// Which [`Matcher`] the daemon uses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchPolicy {
    /// First enrolled vector within tolerance wins, in enrollment order.
    #[default]
    Any,
    /// Closest enrolled vector within tolerance wins.
    Nearest,
}

impl MatchPolicy {
    pub fn matcher(self) -> Box<dyn Matcher> {
        match self {
            Self::Any => Box::new(AnyMatchMatcher),
            Self::Nearest => Box::new(NearestMatcher),
        }
    }
}

impl std::str::FromStr for MatchPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "any" => Ok(Self::Any),
            "nearest" => Ok(Self::Nearest),
            other => Err(format!("unknown match policy {other:?} (expected any|nearest)")),
        }
    }
}

/// Distance from the probe to a record, or `None` when the two vectors are
/// from different feature spaces.
fn distance_to(probe: &FaceVector, record: &EnrollmentRecord) -> Option<f32> {
    if !probe.is_comparable(&record.vector) {
        tracing::warn!(
            identity = %record.identity,
            source = %record.source,
            probe_dim = probe.dim(),
            enrolled_dim = record.vector.dim(),
            "skipping enrolled vector from a different feature space"
        );
        return None;
    }
    Some(probe.euclidean_distance(&record.vector))
}

/// Any-match policy: the first record (in enrollment order) within tolerance
/// decides the verdict. No attempt is made to find the closest record.
///
/// Always visits every record so that timing does not reveal the position
/// of the match within the enrollment.
pub struct AnyMatchMatcher;

impl Matcher for AnyMatchMatcher {
    fn compare(
        &self,
        probe: &FaceVector,
        enrolled: &[EnrollmentRecord],
        tolerance: Tolerance,
    ) -> MatchVerdict {
        if enrolled.is_empty() {
            return MatchVerdict::NoEnrollmentData;
        }

        let mut first: Option<(usize, f32)> = None;
        for (i, record) in enrolled.iter().enumerate() {
            let Some(distance) = distance_to(probe, record) else {
                continue;
            };
            if first.is_none() && tolerance.admits(distance) {
                first = Some((i, distance));
            }
        }

        match first {
            Some((idx, distance)) => MatchVerdict::Matched {
                identity: enrolled[idx].identity.clone(),
                distance,
            },
            None => MatchVerdict::NotRecognized,
        }
    }
}

/// Nearest-neighbour policy with a tolerance cutoff. Ties keep the earlier record.
pub struct NearestMatcher;

impl Matcher for NearestMatcher {
    fn compare(
        &self,
        probe: &FaceVector,
        enrolled: &[EnrollmentRecord],
        tolerance: Tolerance,
    ) -> MatchVerdict {
        if enrolled.is_empty() {
            return MatchVerdict::NoEnrollmentData;
        }

        let mut best: Option<(usize, f32)> = None;
        for (i, record) in enrolled.iter().enumerate() {
            let Some(distance) = distance_to(probe, record) else {
                continue;
            };
            let closer = best.map_or(true, |(_, d)| distance < d);
            if closer {
                best = Some((i, distance));
            }
        }

        match best {
            Some((idx, distance)) if tolerance.admits(distance) => MatchVerdict::Matched {
                identity: enrolled[idx].identity.clone(),
                distance,
            },
            _ => MatchVerdict::NotRecognized,
        }
    }
}
