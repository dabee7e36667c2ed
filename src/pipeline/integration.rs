//! Integration stage: submap assignment, fusion, and spatial indexing.
//!
//! Consumes assembled integration frames. Owns the submap registry and is
//! the only mutator of the live spatial tables; the shared maps lock is
//! held for table work only, never across fusion calls.

use std::sync::Arc;

use crossbeam_channel::Sender;
use nalgebra::Isometry3;
use tracing::{debug, info, warn};

use crate::depth::PinholeCamera;
use crate::fusion::FusionBackend;
use crate::geometry;
use crate::queue::ThreadsafeQueue;
use crate::submap::{KeyframeId, SubmapId, SubmapRegistry};

use super::messages::{IntegrationFrame, KeyframeData};
use super::publisher::SubmapPublication;
use super::shared::SharedState;

/// Pose corrections smaller than this (meters / radians) do not trigger
/// re-indexing.
const CORRECTION_EPSILON: f64 = 1e-9;

pub struct IntegrationStage<F: FusionBackend> {
    backend: F,
    camera: PinholeCamera,
    distance_threshold: f64,
    registry: SubmapRegistry<F::Volume>,
    queue: Arc<ThreadsafeQueue<IntegrationFrame>>,
    shared: Arc<SharedState>,
    publisher: Sender<SubmapPublication>,
}

impl<F: FusionBackend> IntegrationStage<F> {
    pub fn new(
        backend: F,
        camera: PinholeCamera,
        distance_threshold: f64,
        queue: Arc<ThreadsafeQueue<IntegrationFrame>>,
        shared: Arc<SharedState>,
        publisher: Sender<SubmapPublication>,
    ) -> Self {
        Self {
            backend,
            camera,
            distance_threshold,
            registry: SubmapRegistry::new(),
            queue,
            shared,
            publisher,
        }
    }

    /// Main loop. Runs until the integration queue is shut down.
    pub fn run(mut self) {
        loop {
            let Ok(frame) = self.queue.pop_blocking() else {
                break;
            };
            if self.shared.is_shutdown_requested() {
                break;
            }
            self.process_frame(frame);
        }
        debug!(
            submaps = self.registry.len(),
            "integration stage exiting"
        );
    }

    fn process_frame(&mut self, frame: IntegrationFrame) {
        if frame.loop_closure {
            self.apply_corrections(&frame.keyframes);
        }

        let Some(active) = frame
            .keyframes
            .iter()
            .find(|kf| kf.id == frame.active_keyframe)
        else {
            warn!(
                keyframe = %frame.active_keyframe,
                "active keyframe missing from keyframe vector, skipping frame"
            );
            return;
        };
        let t_wk = active.t_wk;

        let target = self.assign_submap(frame.active_keyframe, &t_wk);

        // Fusion happens outside the maps lock; only the anchor pose is
        // read under it.
        let t_wm = {
            let maps = self.shared.maps.lock();
            maps.anchor_poses[&target]
        };
        let t_mc = t_wm.inverse() * frame.t_wc;

        let submap = self
            .registry
            .get_mut(target)
            .expect("assigned submap is registered");
        match self
            .backend
            .integrate(&mut submap.volume, &frame.depth, &self.camera, &t_mc)
        {
            Ok(()) => submap.integrated_frames += 1,
            Err(e) => {
                warn!(submap = %target, error = %e, "integration failed, skipping frame");
                return;
            }
        }

        self.publish();
    }

    /// Choose the submap for a frame: reuse the most recently created one
    /// while the active keyframe stays within the distance threshold of
    /// its anchor, otherwise finalize it and create a fresh submap
    /// anchored at the active keyframe.
    fn assign_submap(&mut self, active: KeyframeId, t_wk: &Isometry3<f64>) -> SubmapId {
        let kf_position = t_wk.translation.vector;

        if let Some(latest) = self.registry.latest() {
            let anchor_position = {
                let maps = self.shared.maps.lock();
                maps.anchor_poses[&latest.id].translation.vector
            };
            if (anchor_position - kf_position).norm() < self.distance_threshold {
                return latest.id;
            }
        }

        let id = SubmapId::from(active);
        if self.registry.position_of(id).is_some() {
            // The keyframe already anchors a submap (re-activated after a
            // loop); integrate into it rather than creating a duplicate.
            debug!(submap = %id, "re-activated anchor keyframe, reusing submap");
            return id;
        }

        self.finalize_latest();

        let volume = self.backend.create_volume(t_wk);
        let position = self.registry.create(id, active, volume);
        {
            let mut maps = self.shared.maps.lock();
            maps.anchor_poses.insert(id, *t_wk);
            maps.positions.insert(id, position);
            maps.index.index_preliminary(id, &kf_position);
        }
        info!(submap = %id, position, "created submap");
        id
    }

    /// Finalize the most recently created submap: cache its bounding
    /// dimensions and replace its preliminary index entry with the full
    /// cell enumeration.
    fn finalize_latest(&mut self) {
        let Some(latest) = self.registry.latest_mut() else {
            return;
        };
        let dims = self.backend.dimensions(&latest.volume);
        latest.dimensions = Some(dims);

        let mut maps = self.shared.maps.lock();
        let pose = maps.anchor_poses[&latest.id];
        maps.index.index(latest.id, &pose, &dims);
        drop(maps);

        debug!(submap = %latest.id, frames = latest.integrated_frames, "finalized submap");
    }

    /// Re-anchor every submap whose anchor keyframe was corrected by a
    /// loop closure, and re-derive its spatial hash entries. This is the
    /// only path that removes cells from the live tables without
    /// finalizing a new submap.
    fn apply_corrections(&mut self, keyframes: &[KeyframeData]) {
        let mut corrected = 0;
        let mut maps = self.shared.maps.lock();
        for kf in keyframes {
            let id = SubmapId::from(kf.id);
            let Some(submap) = self.registry.get(id) else {
                continue;
            };
            let Some(current) = maps.anchor_poses.get(&id).copied() else {
                continue;
            };
            if geometry::approx_equal(&current, &kf.t_wk, CORRECTION_EPSILON) {
                continue;
            }

            maps.anchor_poses.insert(id, kf.t_wk);
            match submap.dimensions {
                Some(dims) => maps.index.reindex(id, &kf.t_wk, &dims),
                // Extent unknown: redo the coarse placeholder instead.
                None => maps
                    .index
                    .index_preliminary(id, &kf.t_wk.translation.vector),
            }
            corrected += 1;
        }
        drop(maps);
        if corrected > 0 {
            info!(submaps = corrected, "re-anchored submaps after loop closure");
        }
    }

    /// Fire-and-forget snapshot to the publisher thread.
    fn publish(&self) {
        let (poses, positions) = {
            let maps = self.shared.maps.lock();
            (maps.anchor_poses.clone(), maps.positions.clone())
        };
        // A send error means the publisher is gone (teardown); nothing to
        // do about it here.
        let _ = self.publisher.send(SubmapPublication { poses, positions });
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::thread;

    use nalgebra::{Translation3, UnitQuaternion, Vector3};

    use super::*;
    use crate::depth::DepthImage;
    use crate::fusion::DepthBoundsFusion;
    use crate::submap::KeyframeId;

    fn pose_at(x: f64, y: f64, z: f64) -> Isometry3<f64> {
        Isometry3::from_parts(Translation3::new(x, y, z), UnitQuaternion::identity())
    }

    fn camera() -> PinholeCamera {
        PinholeCamera {
            fx: 50.0,
            fy: 50.0,
            cx: 16.0,
            cy: 12.0,
            width: 32,
            height: 24,
        }
    }

    fn frame(kf: u64, pos: Vector3<f64>, keyframes: &[(u64, Vector3<f64>)], loop_closure: bool) -> IntegrationFrame {
        IntegrationFrame {
            t_wc: pose_at(pos.x, pos.y, pos.z),
            depth: DepthImage::constant(32, 24, 0.3),
            active_keyframe: KeyframeId::new(kf),
            keyframes: keyframes
                .iter()
                .map(|&(id, p)| KeyframeData {
                    id: KeyframeId::new(id),
                    t_wk: pose_at(p.x, p.y, p.z),
                })
                .collect(),
            loop_closure,
        }
    }

    struct Fixture {
        queue: Arc<ThreadsafeQueue<IntegrationFrame>>,
        shared: Arc<SharedState>,
        handle: thread::JoinHandle<()>,
    }

    fn spawn_stage(distance_threshold: f64, cell_size: f64) -> Fixture {
        let queue = Arc::new(ThreadsafeQueue::new(16));
        let shared = SharedState::new(cell_size, true);
        let (tx, rx) = crossbeam_channel::unbounded();
        // Drain publications so the sender never errors.
        thread::spawn(move || for _ in rx.iter() {});
        let stage = IntegrationStage::new(
            DepthBoundsFusion::default(),
            camera(),
            distance_threshold,
            Arc::clone(&queue),
            Arc::clone(&shared),
            tx,
        );
        let handle = thread::spawn(move || stage.run());
        Fixture {
            queue,
            shared,
            handle,
        }
    }

    fn wait_until_drained(fixture: &Fixture) {
        while !fixture.queue.is_empty() {
            thread::sleep(std::time::Duration::from_millis(5));
        }
        // One more beat for the in-flight frame.
        thread::sleep(std::time::Duration::from_millis(30));
    }

    #[test]
    fn test_distance_policy_creates_second_submap() {
        // Keyframes at 0, 1 and 5 meters with a 4 m threshold: the second
        // keyframe reuses the first submap, the third opens a new one.
        let fixture = spawn_stage(4.0, 1.0);
        let origin = Vector3::zeros();
        let near = Vector3::new(1.0, 0.0, 0.0);
        let far = Vector3::new(5.0, 0.0, 0.0);

        fixture
            .queue
            .push(frame(1, origin, &[(1, origin)], false))
            .unwrap();
        fixture
            .queue
            .push(frame(2, near, &[(1, origin), (2, near)], false))
            .unwrap();
        fixture
            .queue
            .push(frame(
                3,
                far,
                &[(1, origin), (2, near), (3, far)],
                false,
            ))
            .unwrap();
        wait_until_drained(&fixture);

        let view = fixture.shared.planner_view();
        assert_eq!(view.num_submaps(), 2);
        assert_eq!(view.position_of(SubmapId::new(1)), Some(0));
        assert_eq!(view.position_of(SubmapId::new(3)), Some(1));

        fixture.queue.shutdown();
        fixture.handle.join().unwrap();
    }

    #[test]
    fn test_loop_closure_relocates_submap_cells() {
        let fixture = spawn_stage(4.0, 0.5);
        let origin = Vector3::zeros();
        let far = Vector3::new(5.0, 0.0, 0.0);
        let corrected = Vector3::new(0.0, 0.0, 2.0);

        fixture
            .queue
            .push(frame(1, origin, &[(1, origin)], false))
            .unwrap();
        // Finalizes submap 1 with real dimensions, creates submap 2.
        fixture
            .queue
            .push(frame(2, far, &[(1, origin), (2, far)], false))
            .unwrap();
        wait_until_drained(&fixture);

        let before = fixture.shared.planner_view();
        assert!(before
            .submaps_at(&Vector3::new(0.0, 0.0, 0.3))
            .contains(&SubmapId::new(1)));

        // Loop closure lifts keyframe 1 by two meters.
        fixture
            .queue
            .push(frame(2, far, &[(1, corrected), (2, far)], true))
            .unwrap();
        wait_until_drained(&fixture);

        let after = fixture.shared.planner_view();
        assert!(!after
            .submaps_at(&Vector3::new(0.0, 0.0, 0.3))
            .contains(&SubmapId::new(1)));
        assert!(after
            .submaps_at(&Vector3::new(0.0, 0.0, 2.3))
            .contains(&SubmapId::new(1)));
        // The anchor pose itself was corrected.
        assert_eq!(
            after.pose_of(SubmapId::new(1)).unwrap().translation.vector,
            corrected
        );

        fixture.queue.shutdown();
        fixture.handle.join().unwrap();
    }

    #[test]
    fn test_missing_active_keyframe_skips_frame() {
        let fixture = spawn_stage(4.0, 1.0);
        fixture
            .queue
            .push(IntegrationFrame {
                t_wc: Isometry3::identity(),
                depth: DepthImage::constant(32, 24, 0.3),
                active_keyframe: KeyframeId::new(9),
                keyframes: vec![],
                loop_closure: false,
            })
            .unwrap();
        wait_until_drained(&fixture);

        assert_eq!(fixture.shared.planner_view().num_submaps(), 0);
        fixture.queue.shutdown();
        fixture.handle.join().unwrap();
    }

    #[test]
    fn test_publications_reach_listener() {
        let queue: Arc<ThreadsafeQueue<IntegrationFrame>> = Arc::new(ThreadsafeQueue::new(16));
        let shared = SharedState::new(1.0, true);
        let (tx, rx) = crossbeam_channel::unbounded();
        let stage = IntegrationStage::new(
            DepthBoundsFusion::default(),
            camera(),
            4.0,
            Arc::clone(&queue),
            Arc::clone(&shared),
            tx,
        );
        let handle = thread::spawn(move || stage.run());

        let origin = Vector3::zeros();
        queue.push(frame(1, origin, &[(1, origin)], false)).unwrap();

        let publication = rx.recv_timeout(std::time::Duration::from_secs(2)).unwrap();
        let expected: HashMap<SubmapId, usize> = [(SubmapId::new(1), 0)].into_iter().collect();
        assert_eq!(publication.positions, expected);
        assert!(publication.poses.contains_key(&SubmapId::new(1)));

        queue.shutdown();
        handle.join().unwrap();
    }
}
