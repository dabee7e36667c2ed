//! `SubmapPipeline` - pipeline lifecycle and external surfaces.
//!
//! One cohesive stateful component with an explicit lifecycle:
//! construct (validated) -> start (threads spawned) -> shutdown (queues
//! closed, threads joined). Producers talk to it through a cloneable
//! [`PipelineHandle`]; the planner reads through owned
//! [`PlannerView`](crate::spatial::PlannerView) snapshots.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tracing::{info, warn};

use crate::depth::DepthImage;
use crate::fusion::FusionBackend;
use crate::queue::ThreadsafeQueue;
use crate::spatial::PlannerView;

use super::config::{ConfigError, PipelineConfig};
use super::data_preparation::DataPreparationStage;
use super::integration::IntegrationStage;
use super::messages::{DepthFrame, IntegrationFrame, PoseGraphUpdate};
use super::publisher::{spawn_publisher, NullListener, SubmapListener};
use super::shared::SharedState;

/// Producer-side surface of the pipeline.
///
/// The estimator pushes optimized states and the sensor layer pushes
/// depth frames through a clone of this handle. Pushes never block;
/// `false` means the pipeline has shut down and the producer should stop.
#[derive(Clone)]
pub struct PipelineHandle {
    depth_queue: Arc<ThreadsafeQueue<DepthFrame>>,
    state_queue: Arc<ThreadsafeQueue<PoseGraphUpdate>>,
}

impl PipelineHandle {
    /// Buffer a depth image for integration.
    pub fn push_depth_frame(&self, timestamp_ns: u64, image: DepthImage) -> bool {
        self.depth_queue
            .push(DepthFrame {
                timestamp_ns,
                image,
            })
            .is_ok()
    }

    /// Deliver one optimized-state publication from the estimator.
    /// Timestamps must be non-decreasing across calls.
    pub fn push_state_update(&self, update: PoseGraphUpdate) -> bool {
        self.state_queue.push(update).is_ok()
    }
}

/// The submap-aware depth-integration pipeline.
pub struct SubmapPipeline<F: FusionBackend> {
    config: PipelineConfig,
    shared: Arc<SharedState>,
    depth_queue: Arc<ThreadsafeQueue<DepthFrame>>,
    state_queue: Arc<ThreadsafeQueue<PoseGraphUpdate>>,
    integration_queue: Arc<ThreadsafeQueue<IntegrationFrame>>,

    /// Consumed by `start`.
    backend: Option<F>,
    listener: Option<Box<dyn SubmapListener>>,

    data_preparation_handle: Option<JoinHandle<()>>,
    integration_handle: Option<JoinHandle<()>>,
    publisher_handle: Option<JoinHandle<()>>,
}

impl<F: FusionBackend> SubmapPipeline<F> {
    /// Validate the configuration and build the (not yet running)
    /// pipeline.
    pub fn new(config: PipelineConfig, backend: F) -> Result<Self, ConfigError> {
        config.validate()?;
        info!(
            distance_threshold = config.distance_threshold,
            cell_size = config.cell_size,
            blocking = config.blocking,
            "submap pipeline configured"
        );
        Ok(Self {
            shared: SharedState::new(config.cell_size, config.blocking),
            depth_queue: Arc::new(ThreadsafeQueue::new(config.depth_queue_capacity)),
            state_queue: Arc::new(ThreadsafeQueue::new(config.state_queue_capacity)),
            integration_queue: Arc::new(ThreadsafeQueue::new(config.integration_queue_capacity)),
            backend: Some(backend),
            listener: None,
            data_preparation_handle: None,
            integration_handle: None,
            publisher_handle: None,
            config,
        })
    }

    /// Inject the visualization consumer. Must be called before `start`.
    pub fn set_listener(&mut self, listener: Box<dyn SubmapListener>) {
        if self.is_running() {
            warn!("listener set after start is ignored");
            return;
        }
        self.listener = Some(listener);
    }

    /// Spawn the data-preparation, integration and publisher threads.
    pub fn start(&mut self) {
        let Some(backend) = self.backend.take() else {
            warn!("pipeline already started");
            return;
        };

        let (publish_tx, publish_rx) = crossbeam_channel::unbounded();
        let listener = self
            .listener
            .take()
            .unwrap_or_else(|| Box::new(NullListener));
        self.publisher_handle = Some(spawn_publisher(publish_rx, listener));

        let integration = IntegrationStage::new(
            backend,
            self.config.camera,
            self.config.distance_threshold,
            Arc::clone(&self.integration_queue),
            Arc::clone(&self.shared),
            publish_tx,
        );
        self.integration_handle = Some(
            thread::Builder::new()
                .name("submap-integration".into())
                .spawn(move || integration.run())
                .expect("failed to spawn integration thread"),
        );

        let preparation = DataPreparationStage::new(
            self.config.t_sc,
            self.config.max_extrapolation_ns,
            Arc::clone(&self.depth_queue),
            Arc::clone(&self.state_queue),
            Arc::clone(&self.integration_queue),
            Arc::clone(&self.shared),
        );
        self.data_preparation_handle = Some(
            thread::Builder::new()
                .name("submap-data-preparation".into())
                .spawn(move || preparation.run())
                .expect("failed to spawn data-preparation thread"),
        );

        info!("submap pipeline started");
    }

    pub fn is_running(&self) -> bool {
        self.data_preparation_handle.is_some()
    }

    /// Cloneable producer surface for the estimator and the sensor layer.
    pub fn handle(&self) -> PipelineHandle {
        PipelineHandle {
            depth_queue: Arc::clone(&self.depth_queue),
            state_queue: Arc::clone(&self.state_queue),
        }
    }

    /// Snapshot-refresh operation for the planner: an owned,
    /// fully-consistent copy of the spatial tables to query lock-free.
    pub fn planner_view(&self) -> PlannerView {
        self.shared.planner_view()
    }

    /// Toggle integration-queue backpressure between blocking (lossless)
    /// and dropping (real-time) at runtime.
    pub fn set_blocking(&self, blocking: bool) {
        self.shared.set_blocking(blocking);
    }

    /// Number of assembled frames waiting for integration.
    pub fn integration_queue_len(&self) -> usize {
        self.integration_queue.len()
    }

    /// Close every queue, wake all blocked stage threads and join them.
    /// Idempotent; also run on drop.
    pub fn shutdown(&mut self) {
        self.shared.request_shutdown();
        self.depth_queue.shutdown();
        self.state_queue.shutdown();
        self.integration_queue.shutdown();

        if let Some(handle) = self.data_preparation_handle.take() {
            let _ = handle.join();
        }
        // Joining the integration stage drops the publisher's only
        // sender, which lets the publisher thread drain and exit.
        if let Some(handle) = self.integration_handle.take() {
            let _ = handle.join();
        }
        if let Some(handle) = self.publisher_handle.take() {
            let _ = handle.join();
        }
    }
}

impl<F: FusionBackend> Drop for SubmapPipeline<F> {
    fn drop(&mut self) {
        self.shutdown();
    }
}
