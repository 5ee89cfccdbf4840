//! End-to-end tracking scenarios on synthetic clouds.

use approx::assert_relative_eq;
use dlo_tracking::registration::{build_kernel, decoupling_coefficients};
use dlo_tracking::test_utils::{arc_points, line_points, max_arc_deviation, rotate_z};
use dlo_tracking::{
    sort_path, CpdLle, CpdLleConfig, DecouplingMode, NodeSequence, PointCloud, SegmentLayout,
    SortConfig, TrackingError, TrackingSession,
};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use std::f64::consts::FRAC_PI_4;

const RADIUS: f64 = 0.2;

fn arc(rotation: f64) -> Vec<[f64; 3]> {
    let points = arc_points([0.0; 3], RADIUS, FRAC_PI_4, 3.0 * FRAC_PI_4, 150);
    rotate_z(&points, [0.0; 3], rotation)
}

fn chord_nodes(count: usize) -> NodeSequence {
    let ends = arc_points([0.0; 3], RADIUS, FRAC_PI_4, 3.0 * FRAC_PI_4, 2);
    NodeSequence::from_points(&line_points(ends[0], ends[1], count))
}

fn noisy(points: &[[f64; 3]], sigma: f64, seed: u64) -> Vec<[f64; 3]> {
    let mut rng = StdRng::seed_from_u64(seed);
    let normal = Normal::new(0.0, sigma).unwrap();
    points
        .iter()
        .map(|p| {
            [
                p[0] + normal.sample(&mut rng),
                p[1] + normal.sample(&mut rng),
                p[2] + normal.sample(&mut rng),
            ]
        })
        .collect()
}

#[test]
fn test_straight_line_converges_onto_arc() {
    let engine = CpdLle::with_defaults();
    let cloud = PointCloud::from_points(&arc(0.0));

    let result = engine
        .track(&cloud, &chord_nodes(20), None, &SegmentLayout::single(20))
        .unwrap();

    assert!(result.status.is_converged());
    assert!(result.iterations <= 30);
    let deviation = max_arc_deviation(&result.nodes, [0.0; 3], RADIUS);
    assert!(deviation < 0.01, "max deviation {deviation}");
}

#[test]
fn test_noisy_arc_converges() {
    let engine = CpdLle::with_defaults();
    let cloud = PointCloud::from_points(&noisy(&arc(0.0), 0.002, 7));

    let result = engine
        .track(&cloud, &chord_nodes(20), None, &SegmentLayout::single(20))
        .unwrap();

    let deviation = max_arc_deviation(&result.nodes, [0.0; 3], RADIUS);
    assert!(deviation < 0.01, "max deviation {deviation}");
}

#[test]
fn test_registration_is_deterministic() {
    let engine = CpdLle::with_defaults();
    let cloud = PointCloud::from_points(&noisy(&arc(0.0), 0.002, 11));
    let previous = chord_nodes(20);
    let layout = SegmentLayout::single(20);

    let first = engine.track(&cloud, &previous, None, &layout).unwrap();
    let second = engine.track(&cloud, &previous, None, &layout).unwrap();

    assert_eq!(first.nodes, second.nodes);
    assert_eq!(first.sigma2, second.sigma2);
    assert_eq!(first.iterations, second.iterations);
}

#[test]
fn test_cross_segment_kernel_uses_penalty() {
    let nodes = NodeSequence::concat(&[
        NodeSequence::from_points(&line_points([0.0; 3], [0.34, 0.0, 0.0], 18)),
        NodeSequence::from_points(&line_points([0.0, 0.01, 0.0], [0.24, 0.01, 0.0], 13)),
    ]);
    let layout = SegmentLayout::with_boundary(31, 18).unwrap();
    let beta: f64 = 2.0;
    let penalty = 50.0;
    let penalized = (-penalty / (2.0 * beta * beta)).exp();

    for mode in [
        DecouplingMode::Disabled,
        DecouplingMode::IndexDistance { scale: 0.02 },
        DecouplingMode::Normalized {
            min: 1.0,
            max: 1.0003_f64.powi(3),
        },
    ] {
        if let Some(coeff) = decoupling_coefficients(&mode, 31, &layout, penalty).unwrap() {
            for i in 0..18 {
                for j in 18..31 {
                    assert_eq!(coeff[(i, j)], penalty);
                    assert_eq!(coeff[(j, i)], penalty);
                }
            }
        }

        let g = build_kernel(&nodes, beta, &mode, &layout, penalty).unwrap();
        for i in 0..18 {
            for j in 18..31 {
                assert_relative_eq!(g[(i, j)], penalized, max_relative = 1e-12);
                assert_relative_eq!(g[(j, i)], penalized, max_relative = 1e-12);
            }
        }
        // The nearby nodes across the boundary would otherwise be almost fully coupled.
        assert!(g[(0, 18)] < 0.01);
    }
}

#[test]
fn test_variance_carry_over_changes_variance_not_shape() {
    let frames: Vec<PointCloud> = [0.0_f64, 3.0, 6.0]
        .iter()
        .map(|deg| PointCloud::from_points(&arc(deg.to_radians())))
        .collect();
    let layout = SegmentLayout::single(20);

    let run = |carry: bool| {
        let engine = CpdLle::new(CpdLleConfig {
            carry_over_variance: carry,
            ..Default::default()
        })
        .unwrap();
        let mut nodes = chord_nodes(20);
        let mut sigma2 = Some(1e-4);
        let mut trajectory = Vec::new();
        for cloud in &frames {
            let result = engine.track(cloud, &nodes, sigma2, &layout).unwrap();
            trajectory.push(result.sigma2);
            sigma2 = Some(result.sigma2);
            nodes = result.nodes;
        }
        (nodes, trajectory)
    };

    let (carried_nodes, carried) = run(true);
    let (fresh_nodes, fresh) = run(false);

    assert!(carried.iter().all(|&s| s == 1e-4), "{carried:?}");
    assert!(fresh.iter().all(|&s| s < 1e-4), "{fresh:?}");

    let rotated_center = [0.0; 3];
    let carried_dev = max_arc_deviation(&carried_nodes, rotated_center, RADIUS);
    let fresh_dev = max_arc_deviation(&fresh_nodes, rotated_center, RADIUS);
    assert!(carried_dev < 0.01, "carried deviation {carried_dev}");
    assert!(fresh_dev < 0.01, "fresh deviation {fresh_dev}");
}

#[test]
fn test_sort_recovers_shuffled_path() {
    let points = arc_points([0.1, 0.0, 0.4], RADIUS, 0.0, std::f64::consts::FRAC_PI_2, 30);
    let mut rng = StdRng::seed_from_u64(42);

    for _ in 0..5 {
        let mut shuffled: Vec<usize> = (0..points.len()).collect();
        shuffled.shuffle(&mut rng);
        let nodes = NodeSequence::from_points(
            &shuffled.iter().map(|&i| points[i]).collect::<Vec<_>>(),
        );

        let result = sort_path(&nodes, &SortConfig::default()).unwrap();

        assert!(result.success);
        let path: Vec<usize> = result.order.iter().map(|&i| shuffled[i]).collect();
        let forward = path.windows(2).all(|w| w[1] == w[0] + 1);
        let backward = path.windows(2).all(|w| w[0] == w[1] + 1);
        assert!(forward || backward, "{path:?}");
    }
}

#[test]
fn test_sort_reports_branching_input() {
    let mut points = line_points([0.0; 3], [0.2, 0.0, 0.0], 21);
    points.extend(line_points([0.1, 0.01, 0.0], [0.1, 0.1, 0.0], 10));
    let nodes = NodeSequence::from_points(&points);

    let result = sort_path(&nodes, &SortConfig::default()).unwrap();

    assert!(!result.success);
    assert!(!result.nodes.is_empty());
    assert!(result.nodes.len() < points.len());
}

#[test]
fn test_sort_reports_disconnected_input() {
    let mut points = line_points([0.0; 3], [0.1, 0.0, 0.0], 11);
    points.extend(line_points([0.4, 0.0, 0.0], [0.5, 0.0, 0.0], 11));
    let nodes = NodeSequence::from_points(&points);

    let result = sort_path(&nodes, &SortConfig::default()).unwrap();

    assert!(!result.success);
    assert_eq!(result.nodes.len(), 11);
}

#[test]
fn test_degenerate_frames_are_rejected() {
    let mut session = TrackingSession::builder().node_count(20).build().unwrap();
    let tiny = PointCloud::from_points(&[[0.0, 0.0, 0.5]; 4]);

    assert!(matches!(
        session.initialize(&tiny),
        Err(TrackingError::DegenerateInput {
            points: 4,
            required: 10
        })
    ));

    let nan = PointCloud::from_points(&[[f64::NAN, 0.0, 0.0]; 20]);
    assert!(nan.is_empty());
    assert!(matches!(
        session.initialize(&nan),
        Err(TrackingError::DegenerateInput { points: 0, .. })
    ));
    assert!(!session.is_initialized());
}

#[test]
fn test_two_wires_track_independently() {
    let mut session = TrackingSession::with_defaults();
    let first = NodeSequence::from_points(&line_points([0.0; 3], [0.34, 0.0, 0.0], 18));
    let second = NodeSequence::from_points(&line_points([0.0, 0.1, 0.0], [0.24, 0.1, 0.0], 13));
    session.initialize_from_seeds(&[first, second], None).unwrap();

    let mut points = line_points([0.0, 0.01, 0.0], [0.34, 0.01, 0.0], 100);
    points.extend(line_points([0.0, 0.11, 0.0], [0.24, 0.11, 0.0], 70));
    let result = session.track(&PointCloud::from_points(&points)).unwrap();

    assert!(result.status.is_converged());
    let segments = session.segments().unwrap();
    assert_eq!(segments.len(), 2);
    for (segment, y) in segments.iter().zip([0.01, 0.11]) {
        for i in 0..segment.len() {
            assert!((segment.node(i).y - y).abs() < 1e-3, "node {i}: {}", segment.node(i));
        }
    }
}
