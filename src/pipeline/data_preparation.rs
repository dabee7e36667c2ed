//! Data-preparation stage: turns raw depth frames into integration frames.
//!
//! Waits for a depth frame, propagates the trajectory to its capture time,
//! and assembles the pose + depth + keyframe-bookkeeping unit consumed by
//! the integration stage. Frames are never silently discarded while the
//! predictor warms up or lags; only frames that predate all pose
//! information, malformed images, and dropping-mode overflow are dropped,
//! each with a warning.

use std::sync::Arc;

use nalgebra::Isometry3;
use tracing::{debug, warn};

use crate::queue::ThreadsafeQueue;
use crate::trajectory::{Prediction, TrajectoryPredictor};

use super::messages::{DepthFrame, IntegrationFrame, PoseGraphUpdate};
use super::shared::SharedState;

pub struct DataPreparationStage {
    predictor: TrajectoryPredictor,
    t_sc: Isometry3<f64>,
    depth_queue: Arc<ThreadsafeQueue<DepthFrame>>,
    state_queue: Arc<ThreadsafeQueue<PoseGraphUpdate>>,
    integration_queue: Arc<ThreadsafeQueue<IntegrationFrame>>,
    shared: Arc<SharedState>,
}

impl DataPreparationStage {
    pub fn new(
        t_sc: Isometry3<f64>,
        max_extrapolation_ns: u64,
        depth_queue: Arc<ThreadsafeQueue<DepthFrame>>,
        state_queue: Arc<ThreadsafeQueue<PoseGraphUpdate>>,
        integration_queue: Arc<ThreadsafeQueue<IntegrationFrame>>,
        shared: Arc<SharedState>,
    ) -> Self {
        Self {
            predictor: TrajectoryPredictor::new(max_extrapolation_ns),
            t_sc,
            depth_queue,
            state_queue,
            integration_queue,
            shared,
        }
    }

    /// Main loop. Runs until the queues are shut down.
    pub fn run(mut self) {
        loop {
            let Ok(frame) = self.depth_queue.pop_blocking() else {
                break;
            };
            if self.shared.is_shutdown_requested() {
                break;
            }
            if !self.prepare_frame(frame) {
                break;
            }
        }
        debug!("data-preparation stage exiting");
    }

    /// Process one depth frame. Returns `false` on shutdown.
    fn prepare_frame(&mut self, frame: DepthFrame) -> bool {
        // Reject malformed images before predict() so a bad frame cannot
        // consume the one-shot loop-closure flag.
        if !frame.image.is_valid() {
            warn!(
                timestamp_ns = frame.timestamp_ns,
                width = frame.image.width,
                height = frame.image.height,
                "malformed depth image, dropping"
            );
            return true;
        }

        // Fold in every update that arrived since the last frame.
        while let Some(update) = self.state_queue.try_pop() {
            self.predictor.apply_update(update);
        }

        let state = loop {
            match self.predictor.predict(frame.timestamp_ns) {
                Prediction::Ready(state) => break state,
                Prediction::TooOld => {
                    warn!(
                        timestamp_ns = frame.timestamp_ns,
                        "depth frame predates all pose information, dropping"
                    );
                    return true;
                }
                // Cold start or estimator lag: wait for the next update
                // rather than dropping the frame.
                Prediction::NotReady | Prediction::AheadOfTrajectory => {
                    match self.state_queue.pop_blocking() {
                        Ok(update) => self.predictor.apply_update(update),
                        Err(_) => return false,
                    }
                }
            }
        };

        let timestamp_ns = frame.timestamp_ns;
        let carries_loop_closure = state.loop_closure;
        let out = IntegrationFrame {
            t_wc: state.t_ws * self.t_sc,
            depth: frame.image,
            active_keyframe: state.active_keyframe,
            keyframes: state.keyframes,
            loop_closure: state.loop_closure,
        };

        if self.shared.is_blocking() {
            if self.integration_queue.push_blocking_if_full(out).is_err() {
                return false;
            }
        } else {
            match self.integration_queue.push_dropping(out) {
                Ok(true) => {}
                Ok(false) => {
                    warn!(
                        timestamp_ns,
                        queued = self.integration_queue.len(),
                        "integration queue full, dropping depth frame"
                    );
                    // The correction must not vanish with the dropped
                    // frame; the next assembled frame re-carries it.
                    if carries_loop_closure {
                        self.predictor.mark_loop_closure_pending();
                    }
                }
                Err(_) => return false,
            }
        }

        // Everything older than the frame just handled is no longer
        // needed; dropping a too-old frame above deliberately does NOT
        // advance this watermark.
        self.predictor.prune_until(timestamp_ns);
        true
    }
}
