//! Submaps: bounded volumetric maps anchored to pose-graph keyframes.

pub mod registry;
pub mod types;

pub use registry::{Submap, SubmapRegistry};
pub use types::{Aabb, KeyframeId, SubmapId};
