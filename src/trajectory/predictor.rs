//! Propagates the estimator trajectory to depth-frame capture times.

use nalgebra::Isometry3;

use crate::pipeline::messages::{KeyframeData, PoseGraphUpdate};
use crate::submap::KeyframeId;

use super::{LookupFailure, Trajectory};

/// Everything the data-preparation stage needs to assemble one
/// integration frame: the sensor pose propagated to the requested time
/// plus the keyframe bookkeeping held from the latest pose-graph update.
#[derive(Debug, Clone)]
pub struct PredictedState {
    /// Sensor (body) pose in the world frame at the requested time.
    pub t_ws: Isometry3<f64>,
    /// Keyframe that was active at the latest drained update.
    pub active_keyframe: KeyframeId,
    /// Full accumulated keyframe-pose vector.
    pub keyframes: Vec<KeyframeData>,
    /// Whether a loop-closure correction arrived since the last
    /// successful prediction. One-shot: cleared once surfaced.
    pub loop_closure: bool,
}

/// Outcome of a prediction attempt.
#[derive(Debug, Clone)]
pub enum Prediction {
    Ready(PredictedState),
    /// Cold start: no pose-graph update observed yet. Retry later.
    NotReady,
    /// The requested time predates all buffered pose information; the
    /// frame cannot be integrated and should be dropped.
    TooOld,
    /// The requested time is further ahead than the extrapolation horizon
    /// allows; wait for the estimator to catch up.
    AheadOfTrajectory,
}

/// Folds pose-graph updates into held state and answers pose queries at
/// arbitrary timestamps.
///
/// Updates carry only the keyframes touched since the previous update;
/// the predictor accumulates them into the full keyframe-pose vector that
/// every integration frame carries (upserting in first-seen order, so a
/// loop closure overwrites previously-held keyframe poses in place).
pub struct TrajectoryPredictor {
    trajectory: Trajectory,
    keyframes: Vec<KeyframeData>,
    active_keyframe: Option<KeyframeId>,
    pending_loop_closure: bool,
}

impl TrajectoryPredictor {
    pub fn new(max_extrapolation_ns: u64) -> Self {
        Self {
            trajectory: Trajectory::new(max_extrapolation_ns),
            keyframes: Vec::new(),
            active_keyframe: None,
            pending_loop_closure: false,
        }
    }

    /// Fold one pose-graph update into held state.
    pub fn apply_update(&mut self, update: PoseGraphUpdate) {
        self.trajectory.push(update.timestamp_ns, update.t_ws);
        for kf in update.keyframes {
            match self.keyframes.iter_mut().find(|held| held.id == kf.id) {
                Some(held) => held.t_wk = kf.t_wk,
                None => self.keyframes.push(kf),
            }
        }
        self.active_keyframe = Some(update.active_keyframe);
        self.pending_loop_closure |= update.loop_closure;
    }

    /// Predict the sensor pose at `timestamp_ns` and hand out the current
    /// keyframe bookkeeping.
    ///
    /// The pending loop-closure flag is surfaced on the returned state and
    /// cleared, so exactly one integration frame observes each correction.
    pub fn predict(&mut self, timestamp_ns: u64) -> Prediction {
        let Some(active_keyframe) = self.active_keyframe else {
            return Prediction::NotReady;
        };
        match self.trajectory.pose_at(timestamp_ns) {
            Ok(t_ws) => Prediction::Ready(PredictedState {
                t_ws,
                active_keyframe,
                keyframes: self.keyframes.clone(),
                loop_closure: std::mem::take(&mut self.pending_loop_closure),
            }),
            Err(LookupFailure::Empty) => Prediction::NotReady,
            Err(LookupFailure::BeforeBuffer) => Prediction::TooOld,
            Err(LookupFailure::BeyondHorizon) => Prediction::AheadOfTrajectory,
        }
    }

    /// Re-arm the pending loop-closure flag.
    ///
    /// Called when the integration frame that carried the flag is dropped
    /// before reaching the integration stage, so the correction is applied
    /// by the next frame instead of being lost. The corrected keyframe
    /// poses themselves are still held in the accumulated vector.
    pub fn mark_loop_closure_pending(&mut self) {
        self.pending_loop_closure = true;
    }

    /// Prune the trajectory buffer; `watermark_ns` is the timestamp of the
    /// oldest depth frame that may still need a pose.
    pub fn prune_until(&mut self, watermark_ns: u64) {
        self.trajectory.prune_until(watermark_ns);
    }

    pub fn trajectory_len(&self) -> usize {
        self.trajectory.len()
    }
}
