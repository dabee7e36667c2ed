//! Pipeline configuration with construction-time validation.

use nalgebra::Isometry3;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::depth::PinholeCamera;

/// Rejected configuration. The pipeline refuses to construct rather than
/// run with a nonsensical policy.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("submap distance threshold must be non-negative, got {0}")]
    NegativeDistanceThreshold(f64),
    #[error("spatial cell size must be positive and finite, got {0}")]
    InvalidCellSize(f64),
    #[error("{0} queue capacity must be non-zero")]
    ZeroQueueCapacity(&'static str),
}

/// All runtime knobs of the pipeline.
///
/// `distance_threshold` and `cell_size` are fixed at construction;
/// `blocking` is the only knob that can be toggled while running.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// New-submap policy: a fresh submap is created once the active
    /// keyframe is further than this (meters) from the last-created
    /// submap's anchor.
    pub distance_threshold: f64,

    /// Edge length (meters) of the cubic spatial-hash cells.
    pub cell_size: f64,

    /// Depth camera pose in the sensor (body) frame.
    pub t_sc: Isometry3<f64>,

    /// Depth camera intrinsics.
    pub camera: PinholeCamera,

    /// Initial backpressure mode for the integration-frame queue:
    /// `true` stalls the preparation stage when full (never loses
    /// frames), `false` drops new frames when full (stays real-time).
    pub blocking: bool,

    /// Backpressure watermarks of the three hand-off queues.
    pub depth_queue_capacity: usize,
    pub state_queue_capacity: usize,
    pub integration_queue_capacity: usize,

    /// How far past the newest trajectory sample a depth timestamp may be
    /// extrapolated before the preparation stage waits for more updates.
    pub max_extrapolation_ns: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            distance_threshold: 4.0,
            cell_size: 1.0,
            t_sc: Isometry3::identity(),
            camera: PinholeCamera {
                fx: 380.0,
                fy: 380.0,
                cx: 320.0,
                cy: 240.0,
                width: 640,
                height: 480,
            },
            blocking: true,
            depth_queue_capacity: 100,
            state_queue_capacity: 100,
            integration_queue_capacity: 20,
            max_extrapolation_ns: 100_000_000,
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.distance_threshold >= 0.0) {
            return Err(ConfigError::NegativeDistanceThreshold(
                self.distance_threshold,
            ));
        }
        if !(self.cell_size > 0.0 && self.cell_size.is_finite()) {
            return Err(ConfigError::InvalidCellSize(self.cell_size));
        }
        if self.depth_queue_capacity == 0 {
            return Err(ConfigError::ZeroQueueCapacity("depth"));
        }
        if self.state_queue_capacity == 0 {
            return Err(ConfigError::ZeroQueueCapacity("state-update"));
        }
        if self.integration_queue_capacity == 0 {
            return Err(ConfigError::ZeroQueueCapacity("integration"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_valid() {
        assert!(PipelineConfig::default().validate().is_ok());
    }

    #[test]
    fn test_negative_threshold_rejected() {
        let config = PipelineConfig {
            distance_threshold: -1.0,
            ..Default::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::NegativeDistanceThreshold(-1.0))
        );
    }

    #[test]
    fn test_nan_threshold_rejected() {
        let config = PipelineConfig {
            distance_threshold: f64::NAN,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_bad_cell_size_rejected() {
        for cell_size in [0.0, -0.5, f64::INFINITY] {
            let config = PipelineConfig {
                cell_size,
                ..Default::default()
            };
            assert!(config.validate().is_err());
        }
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let config = PipelineConfig {
            integration_queue_capacity: 0,
            ..Default::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::ZeroQueueCapacity("integration"))
        );
    }
}
