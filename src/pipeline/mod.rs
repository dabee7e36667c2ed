//! The three-stage depth-integration pipeline.
//!
//! Producers push depth frames and pose-graph updates into bounded
//! queues; the data-preparation stage aligns them in time into
//! integration frames; the integration stage assigns each frame to a
//! submap, drives fusion, and maintains the spatial hash index that the
//! planner queries through owned snapshots.

pub mod config;
pub mod data_preparation;
pub mod integration;
pub mod messages;
pub mod pipeline;
pub mod publisher;
pub mod shared;

pub use config::{ConfigError, PipelineConfig};
pub use messages::{DepthFrame, IntegrationFrame, KeyframeData, PoseGraphUpdate};
pub use pipeline::{PipelineHandle, SubmapPipeline};
pub use publisher::{NullListener, SubmapListener};
pub use shared::SharedState;
