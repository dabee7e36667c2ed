//! Uniform-grid spatial hashing of submaps.
//!
//! Two parallel representations exist by design: the live tables
//! ([`SpatialIndex`]) mutated by the integration stage under the shared
//! maps lock, and owned read-side snapshots ([`PlannerView`]) handed to the
//! planner so its collision queries never contend with the fusion
//! pipeline.

pub mod cell;
pub mod index;
pub mod view;

pub use cell::{cell_of, CellIndex};
pub use index::SpatialIndex;
pub use view::PlannerView;
