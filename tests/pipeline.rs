//! End-to-end pipeline scenarios: feed estimator updates and depth frames
//! through the producer handle, read results through planner snapshots.

use std::time::{Duration, Instant};

use nalgebra::{Isometry3, Translation3, UnitQuaternion, Vector3};

use rust_submapping::depth::{DepthImage, PinholeCamera};
use rust_submapping::fusion::{DepthBoundsFusion, FusionBackend, FusionError};
use rust_submapping::pipeline::{
    KeyframeData, PipelineConfig, PoseGraphUpdate, SubmapPipeline,
};
use rust_submapping::submap::{Aabb, KeyframeId, SubmapId};

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

fn config(cell_size: f64) -> PipelineConfig {
    PipelineConfig {
        distance_threshold: 4.0,
        cell_size,
        camera: camera(),
        blocking: true,
        ..Default::default()
    }
}

fn update(
    timestamp_ns: u64,
    keyframes: &[(u64, Vector3<f64>)],
    active: u64,
    loop_closure: bool,
) -> PoseGraphUpdate {
    let latest = keyframes
        .iter()
        .find(|&&(id, _)| id == active)
        .map(|&(_, p)| p)
        .unwrap_or_else(Vector3::zeros);
    PoseGraphUpdate {
        timestamp_ns,
        t_ws: pose_at(latest.x, latest.y, latest.z),
        keyframes: keyframes
            .iter()
            .map(|&(id, p)| KeyframeData {
                id: KeyframeId::new(id),
                t_wk: pose_at(p.x, p.y, p.z),
            })
            .collect(),
        active_keyframe: KeyframeId::new(active),
        loop_closure,
    }
}

fn depth() -> DepthImage {
    DepthImage::constant(32, 24, 0.3)
}

/// Poll until `done` holds or a deadline passes.
fn wait_for(what: &str, done: impl Fn() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !done() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        std::thread::sleep(Duration::from_millis(10));
    }
}

#[test]
fn test_distance_policy_two_submaps_over_three_keyframes() {
    // Threshold 4 m, keyframes at 0, 1 and 5 m: keyframes 1 and 2 share
    // the first submap, keyframe 3 opens the second.
    let mut pipeline = SubmapPipeline::new(config(1.0), DepthBoundsFusion::default()).unwrap();
    pipeline.start();
    let handle = pipeline.handle();

    let origin = Vector3::zeros();
    let near = Vector3::new(1.0, 0.0, 0.0);
    let far = Vector3::new(5.0, 0.0, 0.0);

    assert!(handle.push_state_update(update(1_000_000_000, &[(1, origin)], 1, false)));
    assert!(handle.push_depth_frame(1_000_000_000, depth()));
    assert!(handle.push_state_update(update(2_000_000_000, &[(1, origin), (2, near)], 2, false)));
    assert!(handle.push_depth_frame(2_000_000_000, depth()));
    assert!(handle.push_state_update(update(
        3_000_000_000,
        &[(1, origin), (2, near), (3, far)],
        3,
        false,
    )));
    assert!(handle.push_depth_frame(3_000_000_000, depth()));

    wait_for("two submaps", || pipeline.planner_view().num_submaps() == 2);
    let view = pipeline.planner_view();
    assert_eq!(view.position_of(SubmapId::new(1)), Some(0));
    assert_eq!(view.position_of(SubmapId::new(3)), Some(1));
    assert_eq!(view.position_of(SubmapId::new(2)), None);

    pipeline.shutdown();
}

#[test]
fn test_loop_closure_moves_submap_out_of_origin_cell() {
    // Keyframe 1 is corrected from the origin to (0, 0, 2); with half-
    // meter cells a query at the origin must stop returning its submap.
    let mut pipeline = SubmapPipeline::new(config(0.5), DepthBoundsFusion::default()).unwrap();
    pipeline.start();
    let handle = pipeline.handle();

    let origin = Vector3::zeros();
    let far = Vector3::new(5.0, 0.0, 0.0);
    let corrected = Vector3::new(0.0, 0.0, 2.0);

    handle.push_state_update(update(1_000_000_000, &[(1, origin)], 1, false));
    handle.push_depth_frame(1_000_000_000, depth());
    // Far keyframe: finalizes submap 1 (dimensions cached, fully
    // indexed) and opens submap 2.
    handle.push_state_update(update(2_000_000_000, &[(1, origin), (2, far)], 2, false));
    handle.push_depth_frame(2_000_000_000, depth());

    wait_for("submap 1 indexed at the origin", || {
        pipeline
            .planner_view()
            .submaps_at(&Vector3::new(0.0, 0.0, 0.3))
            .contains(&SubmapId::new(1))
    });

    handle.push_state_update(update(
        3_000_000_000,
        &[(1, corrected), (2, far)],
        2,
        true,
    ));
    handle.push_depth_frame(3_000_000_000, depth());

    wait_for("submap 1 relocated", || {
        let view = pipeline.planner_view();
        !view
            .submaps_at(&Vector3::new(0.0, 0.0, 0.3))
            .contains(&SubmapId::new(1))
            && view
                .submaps_at(&Vector3::new(0.0, 0.0, 2.3))
                .contains(&SubmapId::new(1))
    });

    let view = pipeline.planner_view();
    assert_eq!(
        view.pose_of(SubmapId::new(1)).unwrap().translation.vector,
        corrected
    );
    pipeline.shutdown();
}

#[test]
fn test_shutdown_unblocks_idle_pipeline_quickly() {
    // Both stages are blocked in pop with nothing queued; shutdown must
    // wake them and join within a bounded time.
    let mut pipeline = SubmapPipeline::new(config(1.0), DepthBoundsFusion::default()).unwrap();
    pipeline.start();

    let start = Instant::now();
    pipeline.shutdown();
    assert!(start.elapsed() < Duration::from_secs(2));
}

#[test]
fn test_shutdown_unblocks_stage_waiting_for_pose_updates() {
    let mut pipeline = SubmapPipeline::new(config(1.0), DepthBoundsFusion::default()).unwrap();
    pipeline.start();
    let handle = pipeline.handle();

    // The preparation stage picks this up and blocks waiting for a
    // covering pose update that never arrives.
    handle.push_depth_frame(1_000_000_000, depth());
    std::thread::sleep(Duration::from_millis(50));

    let start = Instant::now();
    pipeline.shutdown();
    assert!(start.elapsed() < Duration::from_secs(2));

    // Pushes after shutdown report failure to the producer.
    assert!(!handle.push_depth_frame(2_000_000_000, depth()));
    assert!(!handle.push_state_update(update(2_000_000_000, &[(1, Vector3::zeros())], 1, false)));
}

/// Backend that is deliberately slower than the producers, to exercise
/// backpressure.
struct SlowBounds {
    inner: DepthBoundsFusion,
    delay: Duration,
}

impl FusionBackend for SlowBounds {
    type Volume = <DepthBoundsFusion as FusionBackend>::Volume;

    fn create_volume(&self, anchor: &Isometry3<f64>) -> Self::Volume {
        self.inner.create_volume(anchor)
    }

    fn integrate(
        &self,
        volume: &mut Self::Volume,
        depth: &DepthImage,
        camera: &PinholeCamera,
        t_mc: &Isometry3<f64>,
    ) -> Result<(), FusionError> {
        std::thread::sleep(self.delay);
        self.inner.integrate(volume, depth, camera, t_mc)
    }

    fn dimensions(&self, volume: &Self::Volume) -> Aabb {
        self.inner.dimensions(volume)
    }
}

#[test]
fn test_dropping_mode_keeps_producers_real_time() {
    let mut cfg = config(1.0);
    cfg.blocking = false;
    cfg.integration_queue_capacity = 2;
    let backend = SlowBounds {
        inner: DepthBoundsFusion::default(),
        delay: Duration::from_millis(20),
    };
    let mut pipeline = SubmapPipeline::new(cfg, backend).unwrap();
    pipeline.start();
    let handle = pipeline.handle();

    let origin = Vector3::zeros();
    handle.push_state_update(update(0, &[(1, origin)], 1, false));
    handle.push_state_update(update(100_000_000_000, &[(1, origin)], 1, false));

    // Far more frames than the slow backend can keep up with: in
    // dropping mode the producer must never stall on the full queue.
    let start = Instant::now();
    for i in 0..50 {
        assert!(handle.push_depth_frame(1_000_000 * (i + 1), depth()));
    }
    assert!(start.elapsed() < Duration::from_secs(1));

    wait_for("at least one integration", || {
        pipeline.planner_view().num_submaps() >= 1
    });

    // The mode is switchable at runtime without restarting.
    pipeline.set_blocking(true);
    pipeline.shutdown();
}
