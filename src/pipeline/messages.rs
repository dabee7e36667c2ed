//! Data carried through the pipeline's hand-off queues.

use nalgebra::Isometry3;

use crate::depth::DepthImage;
use crate::submap::KeyframeId;

/// A keyframe's id and world-frame pose.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyframeData {
    pub id: KeyframeId,
    /// Keyframe pose in the world frame.
    pub t_wk: Isometry3<f64>,
}

/// One optimized-state publication from the external estimator.
///
/// Delivered in non-decreasing timestamp order. `keyframes` holds only the
/// keyframes touched since the previous update; after a loop closure it
/// re-publishes corrected poses for keyframes the pipeline already knows.
#[derive(Debug, Clone)]
pub struct PoseGraphUpdate {
    /// Timestamp of the latest estimated state, nanoseconds.
    pub timestamp_ns: u64,

    /// Latest sensor (body) pose in the world frame.
    pub t_ws: Isometry3<f64>,

    /// Keyframe poses touched since the previous update.
    pub keyframes: Vec<KeyframeData>,

    /// The currently active keyframe.
    pub active_keyframe: KeyframeId,

    /// Whether this update is a loop-closure correction.
    pub loop_closure: bool,
}

/// A raw depth measurement awaiting a pose.
#[derive(Debug, Clone)]
pub struct DepthFrame {
    /// Capture timestamp, nanoseconds.
    pub timestamp_ns: u64,

    /// Linear depth in meters.
    pub image: DepthImage,
}

/// One fully-assembled unit of integration work: timestamp-aligned pose,
/// depth, and submap bookkeeping.
///
/// Immutable once assembled; ownership moves from the preparation stage to
/// the integration stage through the queue and the frame is dropped after
/// integration.
#[derive(Debug, Clone)]
pub struct IntegrationFrame {
    /// Depth camera pose in the world frame at capture time.
    pub t_wc: Isometry3<f64>,

    /// The depth image to integrate.
    pub depth: DepthImage,

    /// Keyframe that was active when the frame was captured.
    pub active_keyframe: KeyframeId,

    /// Full keyframe-pose vector as of assembly, used to anchor new
    /// submaps and to re-anchor existing ones after a loop closure.
    pub keyframes: Vec<KeyframeData>,

    /// Whether a loop-closure correction must be applied before this
    /// frame is integrated.
    pub loop_closure: bool,
}
