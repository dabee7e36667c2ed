//! Reference fusion backend: point-cloud bounds tracking.
//!
//! Back-projects a strided subset of valid depth pixels into the submap
//! frame and grows an axis-aligned bounding box. No occupancy values are
//! stored; the backend exists so finalization, spatial indexing and the
//! demo binary can run end-to-end without a full volumetric library.

use nalgebra::{Isometry3, Point3};

use crate::depth::{DepthImage, PinholeCamera};
use crate::submap::Aabb;

use super::{FusionBackend, FusionError};

/// Bounds-only volume: the extent of everything integrated so far, in the
/// submap's anchor frame.
#[derive(Debug, Clone)]
pub struct DepthBoundsVolume {
    pub bounds: Aabb,
    pub integrated_points: usize,
}

/// Backend that tracks integrated-point bounds.
pub struct DepthBoundsFusion {
    /// Sample every n-th pixel in both directions.
    pub pixel_stride: usize,
    /// Returns beyond this range (meters) are ignored.
    pub max_range: f64,
}

impl Default for DepthBoundsFusion {
    fn default() -> Self {
        Self {
            pixel_stride: 4,
            max_range: 10.0,
        }
    }
}

impl FusionBackend for DepthBoundsFusion {
    type Volume = DepthBoundsVolume;

    fn create_volume(&self, _anchor: &Isometry3<f64>) -> Self::Volume {
        DepthBoundsVolume {
            bounds: Aabb::empty(),
            integrated_points: 0,
        }
    }

    fn integrate(
        &self,
        volume: &mut Self::Volume,
        depth: &DepthImage,
        camera: &PinholeCamera,
        t_mc: &Isometry3<f64>,
    ) -> Result<(), FusionError> {
        if !depth.is_valid() {
            return Err(FusionError::InvalidDepth(format!(
                "{}x{} image with {} values",
                depth.width,
                depth.height,
                depth.data.len()
            )));
        }

        let mut integrated = 0;
        for v in (0..depth.height).step_by(self.pixel_stride) {
            for u in (0..depth.width).step_by(self.pixel_stride) {
                let Some(d) = depth.get(u, v) else { continue };
                let d = f64::from(d);
                if d > self.max_range {
                    continue;
                }
                let p_camera = camera.back_project(u, v, d);
                let p_map = t_mc * Point3::from(p_camera);
                volume.bounds.grow(&p_map.coords);
                integrated += 1;
            }
        }
        volume.integrated_points += integrated;
        Ok(())
    }

    fn dimensions(&self, volume: &Self::Volume) -> Aabb {
        if volume.bounds.is_empty() {
            // Nothing integrated: degenerate box at the anchor origin.
            Aabb::point(nalgebra::Vector3::zeros())
        } else {
            volume.bounds
        }
    }
}
