use std::collections::HashMap;
use std::time::Duration;

use anyhow::Result;
use nalgebra::{Isometry3, Translation3, UnitQuaternion, Vector3};
use rand::Rng;
use tracing::info;
use tracing_subscriber::EnvFilter;

use rust_submapping::depth::{DepthImage, PinholeCamera};
use rust_submapping::fusion::DepthBoundsFusion;
use rust_submapping::pipeline::{
    KeyframeData, PipelineConfig, PoseGraphUpdate, SubmapListener, SubmapPipeline,
};
use rust_submapping::submap::{KeyframeId, SubmapId};

/// Simulated drift of the estimator, removed again by the loop closure.
const DRIFT_Z: f64 = 0.8;

struct LoggingListener {
    publications: usize,
}

impl SubmapListener for LoggingListener {
    fn on_submap_blocks(
        &mut self,
        poses: &HashMap<SubmapId, Isometry3<f64>>,
        _positions: &HashMap<SubmapId, usize>,
    ) {
        self.publications += 1;
        if self.publications % 50 == 0 {
            info!(
                submaps = poses.len(),
                publications = self.publications,
                "visualization update"
            );
        }
    }
}

/// Pose on a circle of radius `r`, with simulated drift growing along the
/// loop when `drift` is set.
fn circle_pose(angle: f64, r: f64, drift: bool) -> Isometry3<f64> {
    let z = if drift {
        DRIFT_Z * angle / std::f64::consts::TAU
    } else {
        0.0
    };
    Isometry3::from_parts(
        Translation3::new(r * angle.cos(), r * angle.sin(), z),
        UnitQuaternion::from_axis_angle(&Vector3::z_axis(), angle + std::f64::consts::FRAC_PI_2),
    )
}

fn synthetic_depth(camera: &PinholeCamera, rng: &mut impl Rng) -> DepthImage {
    let mut data = Vec::with_capacity(camera.width * camera.height);
    for _ in 0..camera.width * camera.height {
        data.push(2.0 + rng.gen_range(-0.05..0.05));
    }
    DepthImage::new(camera.width, camera.height, data)
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let num_updates: usize = std::env::args()
        .nth(1)
        .map(|s| s.parse())
        .transpose()?
        .unwrap_or(400);

    let camera = PinholeCamera {
        fx: 40.0,
        fy: 40.0,
        cx: 32.0,
        cy: 24.0,
        width: 64,
        height: 48,
    };
    let config = PipelineConfig {
        distance_threshold: 4.0,
        cell_size: 1.0,
        camera,
        blocking: true,
        ..Default::default()
    };

    let mut pipeline = SubmapPipeline::new(config, DepthBoundsFusion::default())?;
    pipeline.set_listener(Box::new(LoggingListener { publications: 0 }));
    pipeline.start();
    let handle = pipeline.handle();

    let mut rng = rand::thread_rng();
    let radius = 10.0;
    let step = std::f64::consts::TAU / num_updates as f64;

    // Play one full loop of a circular trajectory: estimator updates at
    // every step, depth frames at every second step, one loop-closure
    // correction at the end.
    let mut keyframes: Vec<(u64, f64)> = Vec::new();
    let mut last_keyframe_angle = f64::NEG_INFINITY;
    for i in 0..num_updates {
        let angle = i as f64 * step;
        let timestamp_ns = (i as u64) * 50_000_000;
        let pose = circle_pose(angle, radius, true);

        // New keyframe roughly every meter of arc length.
        let mut touched = Vec::new();
        if radius * (angle - last_keyframe_angle) >= 1.0 {
            let id = keyframes.len() as u64 + 1;
            keyframes.push((id, angle));
            last_keyframe_angle = angle;
            touched.push(KeyframeData {
                id: KeyframeId::new(id),
                t_wk: pose,
            });
        }
        let active = KeyframeId::new(keyframes.len() as u64);

        handle.push_state_update(PoseGraphUpdate {
            timestamp_ns,
            t_ws: pose,
            keyframes: touched,
            active_keyframe: active,
            loop_closure: false,
        });

        if i % 2 == 0 {
            handle.push_depth_frame(timestamp_ns, synthetic_depth(&camera, &mut rng));
        }

        // The planner refreshes its snapshot at its own cadence.
        if i > 0 && i % 100 == 0 {
            let view = pipeline.planner_view();
            let p = pose.translation.vector;
            let candidates = view.submaps_in_box(
                &(p - Vector3::repeat(3.0)),
                &(p + Vector3::repeat(3.0)),
            );
            println!(
                "update {}: {} submaps, {} candidates near the sensor, {} frames queued",
                i,
                view.num_submaps(),
                candidates.len(),
                pipeline.integration_queue_len()
            );
        }
    }

    // Loop closure: re-publish every keyframe with the drift removed.
    let corrected: Vec<KeyframeData> = keyframes
        .iter()
        .map(|&(id, angle)| KeyframeData {
            id: KeyframeId::new(id),
            t_wk: circle_pose(angle, radius, false),
        })
        .collect();
    handle.push_state_update(PoseGraphUpdate {
        timestamp_ns: (num_updates as u64) * 50_000_000,
        t_ws: circle_pose(0.0, radius, false),
        keyframes: corrected,
        active_keyframe: KeyframeId::new(keyframes.len() as u64),
        loop_closure: true,
    });
    handle.push_depth_frame(
        (num_updates as u64) * 50_000_000,
        synthetic_depth(&camera, &mut rng),
    );

    // Let the pipeline drain before reading the final state.
    while pipeline.integration_queue_len() > 0 {
        std::thread::sleep(Duration::from_millis(10));
    }
    std::thread::sleep(Duration::from_millis(100));

    let view = pipeline.planner_view();
    println!(
        "Done: {} keyframes, {} submaps after one loop",
        keyframes.len(),
        view.num_submaps()
    );
    let mut ids: Vec<SubmapId> = view.submap_ids().collect();
    ids.sort_unstable();
    for id in ids {
        let p = view.pose_of(id).expect("snapshotted pose").translation.vector;
        println!(
            "  {} at position {:?}: anchor [{:.2}, {:.2}, {:.2}]",
            id,
            view.position_of(id).expect("snapshotted position"),
            p.x,
            p.y,
            p.z
        );
    }

    pipeline.shutdown();
    Ok(())
}
