//! Submap storage: a creation-ordered arena with stable positions.
//!
//! Submaps are never removed during a session, so a `Vec` plus an
//! id-to-position map gives stable indices that survive any amount of
//! later growth. Outstanding references are always the dense position or
//! the id, never an iterator into the collection.

use std::collections::HashMap;

use super::types::{KeyframeId, SubmapId};
use crate::submap::Aabb;

/// One bounded volumetric map covering a region of the environment.
///
/// The volume itself is opaque to the pipeline: it is created, filled and
/// measured through the fusion backend. The pipeline owns the bookkeeping:
/// the anchoring keyframe and the bounding dimensions cached at
/// finalization (in the anchor frame).
pub struct Submap<V> {
    pub id: SubmapId,
    pub anchor_keyframe: KeyframeId,
    pub volume: V,
    /// Cached bounding dimensions, `None` until the submap is finalized.
    pub dimensions: Option<Aabb>,
    /// Number of depth frames integrated so far.
    pub integrated_frames: usize,
}

/// Owns every submap of the session in creation order.
pub struct SubmapRegistry<V> {
    submaps: Vec<Submap<V>>,
    positions: HashMap<SubmapId, usize>,
}

impl<V> SubmapRegistry<V> {
    pub fn new() -> Self {
        Self {
            submaps: Vec::new(),
            positions: HashMap::new(),
        }
    }

    /// Register a new submap anchored at `anchor_keyframe`. Returns its
    /// position in creation order.
    pub fn create(&mut self, id: SubmapId, anchor_keyframe: KeyframeId, volume: V) -> usize {
        debug_assert!(
            !self.positions.contains_key(&id),
            "submap {id} created twice"
        );
        let position = self.submaps.len();
        self.submaps.push(Submap {
            id,
            anchor_keyframe,
            volume,
            dimensions: None,
            integrated_frames: 0,
        });
        self.positions.insert(id, position);
        position
    }

    pub fn get(&self, id: SubmapId) -> Option<&Submap<V>> {
        self.positions.get(&id).map(|&i| &self.submaps[i])
    }

    pub fn get_mut(&mut self, id: SubmapId) -> Option<&mut Submap<V>> {
        let i = *self.positions.get(&id)?;
        Some(&mut self.submaps[i])
    }

    /// The most recently created submap.
    pub fn latest(&self) -> Option<&Submap<V>> {
        self.submaps.last()
    }

    pub fn latest_mut(&mut self) -> Option<&mut Submap<V>> {
        self.submaps.last_mut()
    }

    pub fn position_of(&self, id: SubmapId) -> Option<usize> {
        self.positions.get(&id).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Submap<V>> {
        self.submaps.iter()
    }

    pub fn len(&self) -> usize {
        self.submaps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.submaps.is_empty()
    }
}

impl<V> Default for SubmapRegistry<V> {
    fn default() -> Self {
        Self::new()
    }
}
