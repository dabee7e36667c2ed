//! State shared between the pipeline threads and the external reader.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use nalgebra::Isometry3;
use parking_lot::Mutex;

use crate::spatial::{PlannerView, SpatialIndex};
use crate::submap::SubmapId;

/// The map lookup tables guarded by the single shared lock.
///
/// Mutated only by the integration stage; copied whole by
/// [`SharedState::planner_view`]. Anchor poses live here (not in the
/// registry) so that pose corrections and re-indexing happen under one
/// lock and snapshots are consistent by construction.
pub struct SharedMaps {
    pub index: SpatialIndex,
    /// Anchor pose of every submap, world frame. Exactly one entry per
    /// registered submap.
    pub anchor_poses: HashMap<SubmapId, Isometry3<f64>>,
    /// Creation-order position of every submap.
    pub positions: HashMap<SubmapId, usize>,
}

/// Shared state accessible by the two stage threads and the reader.
pub struct SharedState {
    /// Live map tables. The lock is held for table mutation and snapshot
    /// copies only, never across fusion work.
    pub maps: Mutex<SharedMaps>,

    /// Backpressure mode of the integration-frame queue: `true` blocks
    /// the preparation stage when full, `false` drops new frames.
    /// Runtime-switchable.
    blocking: AtomicBool,

    /// Pipeline teardown flag.
    shutdown_requested: AtomicBool,
}

impl SharedState {
    pub fn new(cell_size: f64, blocking: bool) -> Arc<Self> {
        Arc::new(Self {
            maps: Mutex::new(SharedMaps {
                index: SpatialIndex::new(cell_size),
                anchor_poses: HashMap::new(),
                positions: HashMap::new(),
            }),
            blocking: AtomicBool::new(blocking),
            shutdown_requested: AtomicBool::new(false),
        })
    }

    pub fn is_blocking(&self) -> bool {
        self.blocking.load(Ordering::SeqCst)
    }

    /// Switch between lossless (blocking) and real-time (dropping)
    /// backpressure without restarting the pipeline.
    pub fn set_blocking(&self, value: bool) {
        self.blocking.store(value, Ordering::SeqCst);
    }

    pub fn request_shutdown(&self) {
        self.shutdown_requested.store(true, Ordering::SeqCst);
    }

    pub fn is_shutdown_requested(&self) -> bool {
        self.shutdown_requested.load(Ordering::SeqCst)
    }

    /// The snapshot-refresh operation: deep-copy the live tables into an
    /// owned [`PlannerView`] under the maps lock.
    ///
    /// Called by the external reader at its own cadence, never by the
    /// pipeline itself. The lock is held for the copy only, so the
    /// integration stage is stalled for a bounded, table-sized duration.
    pub fn planner_view(&self) -> PlannerView {
        let maps = self.maps.lock();
        PlannerView::new(
            maps.index.cell_size(),
            maps.index.clone_cells(),
            maps.anchor_poses.clone(),
            maps.positions.clone(),
        )
    }
}
