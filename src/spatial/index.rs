//! Live spatial hash tables, mutated only by the integration stage.

use std::collections::{HashMap, HashSet};

use nalgebra::{Isometry3, Vector3};
use tracing::debug;

use crate::submap::{Aabb, SubmapId};

use super::cell::{cell_of, cells_in_box, CellIndex};

/// Grid-hash index from world cells to the submaps occupying them.
///
/// Holds a forward table (cell to id set) and its inverse (id to cell set).
/// The tables are a cache: every entry is derivable from a submap's anchor
/// pose and cached dimensions, so a full rebuild from registry state is
/// always possible.
pub struct SpatialIndex {
    cell_size: f64,
    cells: HashMap<CellIndex, HashSet<SubmapId>>,
    cells_by_submap: HashMap<SubmapId, HashSet<CellIndex>>,
}

impl SpatialIndex {
    /// Cell size is fixed at construction and must be positive; it is
    /// validated by the pipeline configuration.
    pub fn new(cell_size: f64) -> Self {
        Self {
            cell_size,
            cells: HashMap::new(),
            cells_by_submap: HashMap::new(),
        }
    }

    pub fn cell_size(&self) -> f64 {
        self.cell_size
    }

    /// Coarse placeholder entry: the single cell containing the anchoring
    /// keyframe's position. Used between submap creation and finalization,
    /// when the extent is not yet known, so queries have some entry for
    /// every live submap. Replaces any previous entries for `id`.
    pub fn index_preliminary(&mut self, id: SubmapId, keyframe_position: &Vector3<f64>) {
        self.remove(id);
        let cell = cell_of(keyframe_position, self.cell_size);
        self.insert_cells(id, std::iter::once(cell));
        debug!(submap = %id, "preliminary spatial hash entry");
    }

    /// Full indexing at finalization: enumerate every cell overlapped by
    /// the world-frame bounds of the oriented box `pose * dims` and insert
    /// `id` into each. Drops the preliminary entry.
    pub fn index(&mut self, id: SubmapId, pose: &Isometry3<f64>, dims: &Aabb) {
        self.remove(id);
        let world = world_bounds(pose, dims);
        let cells: Vec<_> = cells_in_box(&world.min, &world.max, self.cell_size).collect();
        let count = cells.len();
        self.insert_cells(id, cells.into_iter());
        debug!(submap = %id, cells = count, "spatial hash entries computed");
    }

    /// Relocate after a loop-closure correction: remove all of `id`'s
    /// current cells via the inverse table and recompute from the
    /// corrected pose and the cached dimensions.
    pub fn reindex(&mut self, id: SubmapId, new_pose: &Isometry3<f64>, dims: &Aabb) {
        self.index(id, new_pose, dims);
    }

    /// Submaps whose cell contains the given world point.
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

    /// Submaps occupying any cell overlapped by the world-frame box.
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

    /// The inverse-table entry for a submap.
    pub fn cells_of(&self, id: SubmapId) -> Option<&HashSet<CellIndex>> {
        self.cells_by_submap.get(&id)
    }

    /// Deep copy of the forward table for snapshotting.
    pub(crate) fn clone_cells(&self) -> HashMap<CellIndex, HashSet<SubmapId>> {
        self.cells.clone()
    }

    fn insert_cells(&mut self, id: SubmapId, cells: impl Iterator<Item = CellIndex>) {
        let inverse = self.cells_by_submap.entry(id).or_default();
        for cell in cells {
            self.cells.entry(cell).or_default().insert(id);
            inverse.insert(cell);
        }
    }

    fn remove(&mut self, id: SubmapId) {
        let Some(old_cells) = self.cells_by_submap.remove(&id) else {
            return;
        };
        for cell in old_cells {
            if let Some(ids) = self.cells.get_mut(&cell) {
                ids.remove(&id);
                if ids.is_empty() {
                    self.cells.remove(&cell);
                }
            }
        }
    }
}

/// World-frame bounds of an oriented local box: transform the eight
/// corners and take the enclosing axis-aligned box.
fn world_bounds(pose: &Isometry3<f64>, local: &Aabb) -> Aabb {
    let mut world = Aabb::empty();
    for corner in local.corners() {
        world.grow(&(pose * nalgebra::Point3::from(corner)).coords);
    }
    world
}
