//! Trajectory state: a time-ordered pose buffer with interpolation,
//! bounded extrapolation, and watermark pruning.

pub mod predictor;

pub use predictor::{PredictedState, Prediction, TrajectoryPredictor};

use nalgebra::Isometry3;
use tracing::warn;

use crate::geometry;

/// Why a pose lookup could not be answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupFailure {
    /// No sample has been ingested yet.
    Empty,
    /// The requested time predates the oldest buffered sample.
    BeforeBuffer,
    /// The requested time is past the newest sample by more than the
    /// extrapolation horizon; the caller should wait for newer updates.
    BeyondHorizon,
}

/// Append-only, time-ordered record of estimator poses.
///
/// Mutated only by the data-preparation side (via the predictor); the
/// integration side never touches it. Old samples are pruned up to the
/// oldest still-unprocessed depth frame to bound memory.
pub struct Trajectory {
    samples: Vec<(u64, Isometry3<f64>)>,
    max_extrapolation_ns: u64,
}

impl Trajectory {
    pub fn new(max_extrapolation_ns: u64) -> Self {
        Self {
            samples: Vec::new(),
            max_extrapolation_ns,
        }
    }

    /// Append a sample. Timestamps must be non-decreasing; a sample at an
    /// already-known timestamp overwrites it (loop-closure corrections
    /// republish the latest pose), and a regression is ignored with a
    /// warning.
    pub fn push(&mut self, timestamp_ns: u64, pose: Isometry3<f64>) {
        if let Some(&mut (last_t, ref mut last_pose)) = self.samples.last_mut() {
            if last_t == timestamp_ns {
                *last_pose = pose;
                return;
            }
            if last_t > timestamp_ns {
                warn!(
                    timestamp_ns,
                    newest = last_t,
                    "out-of-order trajectory sample ignored"
                );
                return;
            }
        }
        self.samples.push((timestamp_ns, pose));
    }

    /// Pose at an arbitrary past or slightly-future time.
    ///
    /// Exact sample timestamps return the sample's pose exactly; times
    /// between samples interpolate; times past the newest sample
    /// extrapolate at constant velocity up to the configured horizon.
    pub fn pose_at(&self, timestamp_ns: u64) -> Result<Isometry3<f64>, LookupFailure> {
        let Some(&(first_t, _)) = self.samples.first() else {
            return Err(LookupFailure::Empty);
        };
        if timestamp_ns < first_t {
            return Err(LookupFailure::BeforeBuffer);
        }

        let idx = self
            .samples
            .partition_point(|&(t, _)| t <= timestamp_ns);
        // idx > 0 is guaranteed: timestamp_ns >= first_t.
        let (t_prev, pose_prev) = self.samples[idx - 1];
        if t_prev == timestamp_ns {
            return Ok(pose_prev);
        }

        if idx == self.samples.len() {
            return self.extrapolate(timestamp_ns);
        }

        let (t_next, pose_next) = self.samples[idx];
        let alpha = (timestamp_ns - t_prev) as f64 / (t_next - t_prev) as f64;
        Ok(geometry::interpolate(&pose_prev, &pose_next, alpha))
    }

    fn extrapolate(&self, timestamp_ns: u64) -> Result<Isometry3<f64>, LookupFailure> {
        let &(last_t, last_pose) = self.samples.last().expect("checked non-empty");
        if timestamp_ns - last_t > self.max_extrapolation_ns {
            return Err(LookupFailure::BeyondHorizon);
        }
        if self.samples.len() < 2 {
            // Single sample: hold the last known pose.
            return Ok(last_pose);
        }
        let &(prev_t, prev_pose) = &self.samples[self.samples.len() - 2];
        if last_t == prev_t {
            return Ok(last_pose);
        }
        let alpha = (timestamp_ns - last_t) as f64 / (last_t - prev_t) as f64;
        Ok(geometry::extrapolate(&prev_pose, &last_pose, alpha))
    }

    /// Drop samples no longer needed to answer queries at or after
    /// `watermark_ns`, keeping the bracketing sample at or before it.
    pub fn prune_until(&mut self, watermark_ns: u64) {
        let keep_from = self
            .samples
            .partition_point(|&(t, _)| t <= watermark_ns)
            .saturating_sub(1);
        if keep_from > 0 {
            self.samples.drain(..keep_from);
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn oldest_timestamp(&self) -> Option<u64> {
        self.samples.first().map(|&(t, _)| t)
    }

    pub fn newest_timestamp(&self) -> Option<u64> {
        self.samples.last().map(|&(t, _)| t)
    }
}
