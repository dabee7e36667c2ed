//! The volumetric fusion seam.
//!
//! The pipeline never looks inside a volume: it creates one per submap,
//! feeds it depth frames expressed in the submap's anchor frame, and asks
//! for bounding dimensions once at finalization. Everything else
//! (occupancy updates, meshing, raycasting) belongs to the backend.

pub mod bounds;

pub use bounds::{DepthBoundsFusion, DepthBoundsVolume};

use nalgebra::Isometry3;
use thiserror::Error;

use crate::depth::{DepthImage, PinholeCamera};
use crate::submap::Aabb;

/// Failure of a single integration step. Aborts only the offending frame,
/// never the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FusionError {
    #[error("depth image rejected: {0}")]
    InvalidDepth(String),
    #[error("backend failure: {0}")]
    Backend(String),
}

/// Contract of the external volumetric fusion library.
///
/// Implementations may be slow; the pipeline only ever calls them from the
/// integration thread, off the producer paths.
pub trait FusionBackend: Send + 'static {
    type Volume: Send + 'static;

    /// Create an empty volume for a submap anchored at the given world
    /// pose.
    fn create_volume(&self, anchor: &Isometry3<f64>) -> Self::Volume;

    /// Integrate one depth frame. `t_mc` is the depth camera's pose in the
    /// submap's anchor frame.
    fn integrate(
        &self,
        volume: &mut Self::Volume,
        depth: &DepthImage,
        camera: &PinholeCamera,
        t_mc: &Isometry3<f64>,
    ) -> Result<(), FusionError>;

    /// Bounding dimensions of the integrated content, in the anchor frame.
    /// Called once when the submap is finalized.
    fn dimensions(&self, volume: &Self::Volume) -> Aabb;
}
