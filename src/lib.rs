pub mod depth;
pub mod fusion;
pub mod geometry;
pub mod pipeline;
pub mod queue;
pub mod spatial;
pub mod submap;
pub mod trajectory;
