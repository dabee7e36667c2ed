//! Read-side snapshot of the spatial tables for the planner thread.

use std::collections::{HashMap, HashSet};

use nalgebra::{Isometry3, Vector3};

use crate::submap::SubmapId;

use super::cell::{cell_of, cells_in_box, CellIndex};

/// A fully-consistent copy of the live spatial tables at some past moment.
///
/// Produced under the maps lock by the pipeline's snapshot operation and
/// then owned outright by the caller: the planner runs any number of
/// queries against it without taking a single lock, trading staleness for
/// zero contention with the integration stage. Refreshing is the caller's
/// responsibility, at whatever cadence its search needs.
#[derive(Debug, Clone)]
pub struct PlannerView {
    cell_size: f64,
    cells: HashMap<CellIndex, HashSet<SubmapId>>,
    poses: HashMap<SubmapId, Isometry3<f64>>,
    positions: HashMap<SubmapId, usize>,
}

impl PlannerView {
    pub(crate) fn new(
        cell_size: f64,
        cells: HashMap<CellIndex, HashSet<SubmapId>>,
        poses: HashMap<SubmapId, Isometry3<f64>>,
        positions: HashMap<SubmapId, usize>,
    ) -> Self {
        Self {
            cell_size,
            cells,
            poses,
            positions,
        }
    }

    pub fn cell_size(&self) -> f64 {
        self.cell_size
    }

    /// Candidate submaps whose cell contains the given world point.
    pub fn submaps_at(&self, p: &Vector3<f64>) -> Vec<SubmapId> {
        let cell = cell_of(p, self.cell_size);
        let mut ids: Vec<_> = self
            .cells
            .get(&cell)
            .map(|s| s.iter().copied().collect())
            .unwrap_or_default();
        ids.sort_unstable();
        ids
    }

    /// Candidate submaps intersecting the world-frame box `[min, max]`.
    pub fn submaps_in_box(&self, min: &Vector3<f64>, max: &Vector3<f64>) -> Vec<SubmapId> {
        let mut found = HashSet::new();
        for cell in cells_in_box(min, max, self.cell_size) {
            if let Some(ids) = self.cells.get(&cell) {
                found.extend(ids.iter().copied());
            }
        }
        let mut ids: Vec<_> = found.into_iter().collect();
        ids.sort_unstable();
        ids
    }

    /// Anchor pose of a submap in the world frame, as of the snapshot.
    pub fn pose_of(&self, id: SubmapId) -> Option<&Isometry3<f64>> {
        self.poses.get(&id)
    }

    /// Registry position (creation order) of a submap.
    pub fn position_of(&self, id: SubmapId) -> Option<usize> {
        self.positions.get(&id).copied()
    }

    /// The cell set recorded for a submap, exposed for consistency checks.
    pub fn cells_of(&self, id: SubmapId) -> HashSet<CellIndex> {
        self.cells
            .iter()
            .filter(|(_, ids)| ids.contains(&id))
            .map(|(cell, _)| *cell)
            .collect()
    }

    pub fn num_submaps(&self) -> usize {
        self.poses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.poses.is_empty()
    }

    /// Iterate over all snapshotted submap ids.
    pub fn submap_ids(&self) -> impl Iterator<Item = SubmapId> + '_ {
        self.poses.keys().copied()
    }
}
