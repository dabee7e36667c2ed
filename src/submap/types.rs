//! Core ID and bounding-box types for the submap collection.

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

/// Unique identifier for a keyframe in the estimator's pose graph.
///
/// Keyframe poses may be retroactively corrected by loop closures; the id
/// is the stable handle that survives such corrections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct KeyframeId(pub u64);

impl KeyframeId {
    /// Create a new KeyframeId with the given value.
    pub fn new(id: u64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for KeyframeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "KF{}", self.0)
    }
}

/// Unique identifier for a submap.
///
/// A submap is anchored to the keyframe that was active when it was
/// created, and its id mirrors that keyframe's id. This makes loop-closure
/// correction a direct lookup: the corrected anchor pose is the updated
/// pose of the keyframe with the same numeric id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SubmapId(pub u64);

impl SubmapId {
    /// Create a new SubmapId with the given value.
    pub fn new(id: u64) -> Self {
        Self(id)
    }
}

impl From<KeyframeId> for SubmapId {
    fn from(id: KeyframeId) -> Self {
        Self(id.0)
    }
}

impl std::fmt::Display for SubmapId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SM{}", self.0)
    }
}

/// Axis-aligned bounding box, used both for a submap's cached dimensions
/// (in its anchor frame) and for world-frame extents during indexing.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Aabb {
    pub min: Vector3<f64>,
    pub max: Vector3<f64>,
}

impl Aabb {
    pub fn new(min: Vector3<f64>, max: Vector3<f64>) -> Self {
        Self { min, max }
    }

    /// The inverted box that grows to fit the first point added to it.
    pub fn empty() -> Self {
        Self {
            min: Vector3::repeat(f64::INFINITY),
            max: Vector3::repeat(f64::NEG_INFINITY),
        }
    }

    /// A degenerate box containing exactly one point.
    pub fn point(p: Vector3<f64>) -> Self {
        Self { min: p, max: p }
    }

    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y || self.min.z > self.max.z
    }

    /// Expand to contain `p`.
    pub fn grow(&mut self, p: &Vector3<f64>) {
        self.min = self.min.inf(p);
        self.max = self.max.sup(p);
    }

    pub fn center(&self) -> Vector3<f64> {
        (self.min + self.max) * 0.5
    }

    pub fn extent(&self) -> Vector3<f64> {
        self.max - self.min
    }

    /// The eight corner points of the box.
    pub fn corners(&self) -> [Vector3<f64>; 8] {
        let (lo, hi) = (self.min, self.max);
        [
            Vector3::new(lo.x, lo.y, lo.z),
            Vector3::new(hi.x, lo.y, lo.z),
            Vector3::new(lo.x, hi.y, lo.z),
            Vector3::new(hi.x, hi.y, lo.z),
            Vector3::new(lo.x, lo.y, hi.z),
            Vector3::new(hi.x, lo.y, hi.z),
            Vector3::new(lo.x, hi.y, hi.z),
            Vector3::new(hi.x, hi.y, hi.z),
        ]
    }
}
