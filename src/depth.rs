//! Depth image container and pinhole camera model.
//!
//! Depth values are linear meters (not disparity). Pixels with no return
//! are encoded as `NaN` or a non-positive value and skipped by consumers.
//! Conversion helpers for the TUM 16-bit convention (5000 ticks per meter)
//! are provided for sensors that publish millimeter-ish integer depth.

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

/// Scale of the TUM depth convention: 5000 ticks = 1 meter.
const TUM_TICKS_PER_METER: f32 = 5000.0;

/// A row-major depth image, values in meters.
#[derive(Debug, Clone, PartialEq)]
pub struct DepthImage {
    pub width: usize,
    pub height: usize,
    pub data: Vec<f32>,
}

impl DepthImage {
    /// Create a depth image from a row-major buffer of meters.
    pub fn new(width: usize, height: usize, data: Vec<f32>) -> Self {
        Self {
            width,
            height,
            data,
        }
    }

    /// Create an image filled with a constant depth.
    pub fn constant(width: usize, height: usize, depth_m: f32) -> Self {
        Self {
            width,
            height,
            data: vec![depth_m; width * height],
        }
    }

    /// Convert from the TUM 16-bit convention (5000 ticks = 1 m).
    /// Zero ticks means "no return" and becomes `NaN`.
    pub fn from_tum_u16(width: usize, height: usize, ticks: &[u16]) -> Self {
        let data = ticks
            .iter()
            .map(|&t| {
                if t == 0 {
                    f32::NAN
                } else {
                    f32::from(t) / TUM_TICKS_PER_METER
                }
            })
            .collect();
        Self {
            width,
            height,
            data,
        }
    }

    /// Convert to the TUM 16-bit convention. Invalid pixels become zero.
    pub fn to_tum_u16(&self) -> Vec<u16> {
        self.data
            .iter()
            .map(|&d| {
                if d.is_finite() && d > 0.0 {
                    (d * TUM_TICKS_PER_METER).min(f32::from(u16::MAX)) as u16
                } else {
                    0
                }
            })
            .collect()
    }

    /// A well-formed image has non-zero dimensions and a matching buffer.
    pub fn is_valid(&self) -> bool {
        self.width > 0 && self.height > 0 && self.data.len() == self.width * self.height
    }

    /// Depth at pixel `(u, v)`, or `None` for out-of-bounds and no-return
    /// pixels.
    pub fn get(&self, u: usize, v: usize) -> Option<f32> {
        if u >= self.width || v >= self.height {
            return None;
        }
        let d = self.data[v * self.width + u];
        (d.is_finite() && d > 0.0).then_some(d)
    }
}

/// Pinhole intrinsics of the depth camera.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PinholeCamera {
    pub fx: f64,
    pub fy: f64,
    pub cx: f64,
    pub cy: f64,
    pub width: usize,
    pub height: usize,
}

impl PinholeCamera {
    /// Back-project pixel `(u, v)` at the given depth into the camera frame
    /// (X right, Y down, Z along the optical axis).
    pub fn back_project(&self, u: usize, v: usize, depth_m: f64) -> Vector3<f64> {
        let x = (u as f64 - self.cx) / self.fx * depth_m;
        let y = (v as f64 - self.cy) / self.fy * depth_m;
        Vector3::new(x, y, depth_m)
    }
}
