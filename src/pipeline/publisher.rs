//! Fire-and-forget visualization publishing.
//!
//! The integration stage sends table snapshots into an unbounded channel;
//! a dedicated publisher thread invokes the injected listener. A slow
//! consumer therefore delays only its own callbacks, never integration.

use std::collections::HashMap;
use std::thread::{self, JoinHandle};

use crossbeam_channel::Receiver;
use nalgebra::Isometry3;

use crate::submap::SubmapId;

/// Consumer of submap publications, injected at construction.
///
/// Both methods default to no-ops so a listener implements only the
/// variant it renders: meshes (id to world pose) or blocks (id to world
/// pose plus registry position).
pub trait SubmapListener: Send {
    fn on_submap_meshes(&mut self, poses: &HashMap<SubmapId, Isometry3<f64>>) {
        let _ = poses;
    }

    fn on_submap_blocks(
        &mut self,
        poses: &HashMap<SubmapId, Isometry3<f64>>,
        positions: &HashMap<SubmapId, usize>,
    ) {
        let _ = (poses, positions);
    }
}

/// Listener that renders nothing.
pub struct NullListener;

impl SubmapListener for NullListener {}

/// One publication: the submap tables as of one integration step.
pub struct SubmapPublication {
    pub poses: HashMap<SubmapId, Isometry3<f64>>,
    pub positions: HashMap<SubmapId, usize>,
}

/// Spawn the publisher thread. It drains publications until every sender
/// is dropped (the integration stage owns the only sender, so the thread
/// winds down with it).
pub fn spawn_publisher(
    receiver: Receiver<SubmapPublication>,
    mut listener: Box<dyn SubmapListener>,
) -> JoinHandle<()> {
    thread::Builder::new()
        .name("submap-publisher".into())
        .spawn(move || {
            for publication in receiver.iter() {
                listener.on_submap_meshes(&publication.poses);
                listener.on_submap_blocks(&publication.poses, &publication.positions);
            }
        })
        .expect("failed to spawn publisher thread")
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;

    struct CountingListener {
        meshes: Arc<AtomicUsize>,
        blocks: Arc<AtomicUsize>,
    }

    impl SubmapListener for CountingListener {
        fn on_submap_meshes(&mut self, _poses: &HashMap<SubmapId, Isometry3<f64>>) {
            self.meshes.fetch_add(1, Ordering::SeqCst);
        }

        fn on_submap_blocks(
            &mut self,
            _poses: &HashMap<SubmapId, Isometry3<f64>>,
            _positions: &HashMap<SubmapId, usize>,
        ) {
            self.blocks.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_publisher_invokes_both_variants_and_exits() {
        let meshes = Arc::new(AtomicUsize::new(0));
        let blocks = Arc::new(AtomicUsize::new(0));
        let (tx, rx) = crossbeam_channel::unbounded();
        let handle = spawn_publisher(
            rx,
            Box::new(CountingListener {
                meshes: Arc::clone(&meshes),
                blocks: Arc::clone(&blocks),
            }),
        );

        for _ in 0..3 {
            tx.send(SubmapPublication {
                poses: HashMap::new(),
                positions: HashMap::new(),
            })
            .unwrap();
        }
        drop(tx);
        handle.join().unwrap();

        assert_eq!(meshes.load(Ordering::SeqCst), 3);
        assert_eq!(blocks.load(Ordering::SeqCst), 3);
    }
}
