//! Synthetic wire shapes for testing.
//!
//! Generators for simple deformable-object shapes with known geometry, plus
//! error measures against that geometry. All generators are deterministic.

use crate::types::NodeSequence;

/// Evenly spaced points on the segment from `start` to `end`, both included.
pub fn line_points(start: [f64; 3], end: [f64; 3], count: usize) -> Vec<[f64; 3]> {
    if count == 1 {
        return vec![start];
    }
    (0..count)
        .map(|i| {
            let t = i as f64 / (count - 1) as f64;
            [
                start[0] + t * (end[0] - start[0]),
                start[1] + t * (end[1] - start[1]),
                start[2] + t * (end[2] - start[2]),
            ]
        })
        .collect()
}

/// Evenly spaced points on a circular arc in the z = `center[2]` plane.
///
/// Angles are in radians, measured from the +x axis; both ends are included.
pub fn arc_points(
    center: [f64; 3],
    radius: f64,
    start_angle: f64,
    end_angle: f64,
    count: usize,
) -> Vec<[f64; 3]> {
    if count == 1 {
        return vec![[
            center[0] + radius * start_angle.cos(),
            center[1] + radius * start_angle.sin(),
            center[2],
        ]];
    }
    (0..count)
        .map(|i| {
            let t = start_angle + (end_angle - start_angle) * i as f64 / (count - 1) as f64;
            [
                center[0] + radius * t.cos(),
                center[1] + radius * t.sin(),
                center[2],
            ]
        })
        .collect()
}

/// Evenly spaced points on a helix around the z axis through `center`.
///
/// # Arguments
/// * `radius` - Helix radius
/// * `pitch` - Rise in z per full turn
/// * `turns` - Number of turns covered
/// * `count` - Number of points
pub fn helix_points(
    center: [f64; 3],
    radius: f64,
    pitch: f64,
    turns: f64,
    count: usize,
) -> Vec<[f64; 3]> {
    let denom = count.saturating_sub(1).max(1) as f64;
    (0..count)
        .map(|i| {
            let t = turns * i as f64 / denom;
            let angle = t * std::f64::consts::TAU;
            [
                center[0] + radius * angle.cos(),
                center[1] + radius * angle.sin(),
                center[2] + pitch * t,
            ]
        })
        .collect()
}

/// Rotate points about the z axis through `pivot`.
pub fn rotate_z(points: &[[f64; 3]], pivot: [f64; 3], angle: f64) -> Vec<[f64; 3]> {
    let (s, c) = angle.sin_cos();
    points
        .iter()
        .map(|p| {
            let dx = p[0] - pivot[0];
            let dy = p[1] - pivot[1];
            [pivot[0] + c * dx - s * dy, pivot[1] + s * dx + c * dy, p[2]]
        })
        .collect()
}

/// Translate every point by `offset`.
pub fn translate(points: &[[f64; 3]], offset: [f64; 3]) -> Vec<[f64; 3]> {
    points
        .iter()
        .map(|p| [p[0] + offset[0], p[1] + offset[1], p[2] + offset[2]])
        .collect()
}

/// Add bounded pseudo-random noise in `[-amplitude, amplitude]` per axis.
pub fn jitter(points: &[[f64; 3]], amplitude: f64, seed: u64) -> Vec<[f64; 3]> {
    // Simple LCG for reproducibility
    let mut rng_state = seed;
    let mut next_random = || -> f64 {
        rng_state = rng_state
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        ((rng_state >> 33) as f64) / ((1u64 << 31) as f64)
    };

    points
        .iter()
        .map(|p| {
            [
                p[0] + amplitude * (2.0 * next_random() - 1.0),
                p[1] + amplitude * (2.0 * next_random() - 1.0),
                p[2] + amplitude * (2.0 * next_random() - 1.0),
            ]
        })
        .collect()
}

/// Largest distance of any node from the circle of `radius` about `center`
/// in the z = `center[2]` plane, including the out-of-plane offset.
pub fn max_arc_deviation(nodes: &NodeSequence, center: [f64; 3], radius: f64) -> f64 {
    (0..nodes.len())
        .map(|i| {
            let p = nodes.node(i);
            let dx = p.x - center[0];
            let dy = p.y - center[1];
            let dz = p.z - center[2];
            let radial = (dx * dx + dy * dy).sqrt() - radius;
            (radial * radial + dz * dz).sqrt()
        })
        .fold(0.0, f64::max)
}

/// Largest distance from any node to its nearest point in `points`.
pub fn max_distance_to_points(nodes: &NodeSequence, points: &[[f64; 3]]) -> f64 {
    (0..nodes.len())
        .map(|i| {
            let p = nodes.node(i);
            points
                .iter()
                .map(|q| {
                    let dx = p.x - q[0];
                    let dy = p.y - q[1];
                    let dz = p.z - q[2];
                    (dx * dx + dy * dy + dz * dz).sqrt()
                })
                .fold(f64::INFINITY, f64::min)
        })
        .fold(0.0, f64::max)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_line_points_endpoints() {
        let points = line_points([0.0; 3], [1.0, 2.0, 0.0], 5);
        assert_eq!(points.len(), 5);
        assert_eq!(points[0], [0.0, 0.0, 0.0]);
        assert_relative_eq!(points[4][1], 2.0);
        assert_relative_eq!(points[2][0], 0.5);
    }

    #[test]
    fn test_arc_points_on_circle() {
        let center = [1.0, -1.0, 0.5];
        let points = arc_points(center, 0.2, 0.0, std::f64::consts::PI, 9);
        let nodes = NodeSequence::from_points(&points);
        assert!(max_arc_deviation(&nodes, center, 0.2) < 1e-12);
    }

    #[test]
    fn test_rotate_about_pivot() {
        let rotated = rotate_z(&[[1.0, 0.0, 3.0]], [0.0; 3], std::f64::consts::FRAC_PI_2);
        assert_relative_eq!(rotated[0][0], 0.0, epsilon = 1e-12);
        assert_relative_eq!(rotated[0][1], 1.0, epsilon = 1e-12);
        assert_eq!(rotated[0][2], 3.0);
    }

    #[test]
    fn test_jitter_is_bounded_and_deterministic() {
        let points = line_points([0.0; 3], [1.0, 0.0, 0.0], 50);
        let a = jitter(&points, 0.01, 7);
        let b = jitter(&points, 0.01, 7);
        assert_eq!(a, b);
        for (p, q) in points.iter().zip(&a) {
            for k in 0..3 {
                assert!((p[k] - q[k]).abs() <= 0.01);
            }
        }
    }
}
