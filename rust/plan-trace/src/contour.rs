// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Contour vectorization: boundary tracing, simplification, axis snapping
//! and micro-bump removal

use crate::types::{PixelMask, Point2D};

const EPSILON: f64 = 1e-9;
const MAX_SNAP_PASSES: usize = 16;

/// Headings on the pixel-corner lattice: E, S, W, N (y grows downwards)
const HEADINGS: [(i64, i64); 4] = [(1, 0), (0, 1), (-1, 0), (0, -1)];

/// Trace the outer boundary of the 4-connected region containing the first
/// set pixel (row-major order).
///
/// Vertices lie on pixel corners and are emitted only where the boundary
/// turns, so the polygon encloses exactly the region's pixels (holes aside).
/// Winding is clockwise on screen: positive shoelace area in y-down coordinates.
pub fn trace_region_contour(mask: &PixelMask) -> Vec<Point2D> {
    let Some(start) = mask.data().iter().position(|&v| v != 0) else {
        return Vec::new();
    };
    let width = mask.width() as usize;
    let (sx, sy) = ((start % width) as i64, (start / width) as i64);

    // The walk keeps the region on its right-hand side
    let ahead = |vx: i64, vy: i64, heading: usize| -> (bool, bool) {
        let (left, right) = match heading {
            0 => ((vx, vy - 1), (vx, vy)),
            1 => ((vx, vy), (vx - 1, vy)),
            2 => ((vx - 1, vy), (vx - 1, vy - 1)),
            _ => ((vx - 1, vy - 1), (vx, vy - 1)),
        };
        (mask.is_wall_at(left.0, left.1), mask.is_wall_at(right.0, right.1))
    };

    let mut vertices = vec![Point2D::new(sx as f64, sy as f64)];
    let (mut vx, mut vy, mut heading) = (sx, sy, 0usize);
    let max_steps = 4 * (mask.width() as usize + 1) * (mask.height() as usize + 1);

    for _ in 0..max_steps {
        vx += HEADINGS[heading].0;
        vy += HEADINGS[heading].1;

        let (front_left, front_right) = ahead(vx, vy, heading);
        let next = if !front_right {
            (heading + 1) % 4
        } else if front_left {
            (heading + 3) % 4
        } else {
            heading
        };

        if vx == sx && vy == sy && next == 0 {
            break;
        }
        if next != heading {
            vertices.push(Point2D::new(vx as f64, vy as f64));
            heading = next;
        }
    }

    vertices
}

/// Douglas-Peucker simplification of an open polyline.
///
/// Both endpoints survive. A span is split at its farthest interior vertex
/// while that vertex lies more than `epsilon` off the chord; spans wait on a
/// work stack instead of the call stack.
pub fn douglas_peucker(points: &[Point2D], epsilon: f64) -> Vec<Point2D> {
    let n = points.len();
    if n < 3 {
        return points.to_vec();
    }

    let mut keep = vec![false; n];
    keep[0] = true;
    keep[n - 1] = true;

    let mut spans = vec![(0, n - 1)];
    while let Some((lo, hi)) = spans.pop() {
        let mut split = None;
        let mut farthest = epsilon;
        for i in lo + 1..hi {
            let d = perpendicular_distance(&points[i], &points[lo], &points[hi]);
            if d > farthest {
                farthest = d;
                split = Some(i);
            }
        }
        if let Some(i) = split {
            keep[i] = true;
            spans.push((i, hi));
            spans.push((lo, i));
        }
    }

    points
        .iter()
        .zip(&keep)
        .filter_map(|(p, &kept)| kept.then_some(*p))
        .collect()
}

/// Douglas-Peucker on an implicitly closed ring
pub fn simplify_closed(points: &[Point2D], epsilon: f64) -> Vec<Point2D> {
    if points.len() < 4 {
        return points.to_vec();
    }
    let mut ring = points.to_vec();
    ring.push(points[0]);
    let mut simplified = douglas_peucker(&ring, epsilon);
    simplified.pop();
    if simplified.len() < 3 {
        return points.to_vec();
    }
    simplified
}

/// Distance from `point` to the infinite line through `a` and `b`
pub fn perpendicular_distance(point: &Point2D, a: &Point2D, b: &Point2D) -> f64 {
    let chord = a.vector_to(b);
    let length = chord.norm();
    if length < 1e-5 {
        return point.distance_to(a);
    }
    chord.perp(&a.vector_to(point)).abs() / length
}

/// Distance from a point to a line segment
pub fn point_to_segment_distance(point: &Point2D, seg_start: &Point2D, seg_end: &Point2D) -> f64 {
    let d = seg_start.vector_to(seg_end);
    let length_sq = d.norm_squared();

    if length_sq < 1e-10 {
        return point.distance_to(seg_start);
    }

    let t = (seg_start.vector_to(point).dot(&d) / length_sq).clamp(0.0, 1.0);
    let proj = Point2D::new(seg_start.x + t * d.x, seg_start.y + t * d.y);
    point.distance_to(&proj)
}

/// Shoelace area; positive for clockwise-on-screen (y-down) winding
pub fn polygon_signed_area(points: &[Point2D]) -> f64 {
    let n = points.len();
    if n < 3 {
        return 0.0;
    }

    let mut area = 0.0;
    for i in 0..n {
        let j = (i + 1) % n;
        area += points[i].x * points[j].y;
        area -= points[j].x * points[i].y;
    }

    area / 2.0
}

pub fn polygon_area(points: &[Point2D]) -> f64 {
    polygon_signed_area(points).abs()
}

/// Axis-aligned bounds as `(min, max)` corners
pub fn polygon_bbox(points: &[Point2D]) -> Option<(Point2D, Point2D)> {
    let first = points.first()?;
    Some(points.iter().fold((*first, *first), |(lo, hi), p| {
        (
            Point2D::new(lo.x.min(p.x), lo.y.min(p.y)),
            Point2D::new(hi.x.max(p.x), hi.y.max(p.y)),
        )
    }))
}

/// Drop coincident consecutive vertices and vertices on a straight line
/// (180 degree or degenerate 0 degree turns)
pub fn cleanup_polygon(points: &[Point2D]) -> Vec<Point2D> {
    let mut poly: Vec<Point2D> = Vec::with_capacity(points.len());
    for p in points {
        if poly.last().map_or(true, |last| last.distance_to(p) > EPSILON) {
            poly.push(*p);
        }
    }
    while poly.len() > 1 && poly[0].distance_to(&poly[poly.len() - 1]) <= EPSILON {
        poly.pop();
    }

    loop {
        let n = poly.len();
        if n < 3 {
            break;
        }
        let collinear = (0..n).find(|&i| {
            let a = poly[(i + n - 1) % n];
            let b = poly[i];
            let c = poly[(i + 1) % n];
            let ab = a.vector_to(&b);
            let bc = b.vector_to(&c);
            let cross = ab.x * bc.y - ab.y * bc.x;
            cross.abs() <= EPSILON * ab.norm() * bc.norm() + EPSILON
        });
        match collinear {
            Some(i) => {
                poly.remove(i);
            }
            None => break,
        }
    }

    poly
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Axis {
    Horizontal,
    Vertical,
}

fn edge_is_near(a: &Point2D, b: &Point2D, axis: Axis, tolerance_deg: f64) -> bool {
    let dx = (b.x - a.x).abs();
    let dy = (b.y - a.y).abs();
    if dx <= EPSILON && dy <= EPSILON {
        return false;
    }
    let angle = dy.atan2(dx).to_degrees();
    match axis {
        Axis::Horizontal => angle <= tolerance_deg,
        // Near-horizontal wins when the tolerance covers both
        Axis::Vertical => angle >= 90.0 - tolerance_deg && angle > tolerance_deg,
    }
}

/// Give every run of consecutive near-`axis` edges one shared coordinate.
/// Returns whether any vertex moved.
fn snap_runs(poly: &mut [Point2D], tolerance_deg: f64, axis: Axis) -> bool {
    let n = poly.len();
    let near: Vec<bool> = (0..n)
        .map(|i| edge_is_near(&poly[i], &poly[(i + 1) % n], axis, tolerance_deg))
        .collect();
    let coord = |p: &Point2D| match axis {
        Axis::Horizontal => p.y,
        Axis::Vertical => p.x,
    };

    let mut runs: Vec<Vec<usize>> = Vec::new();
    if near.iter().all(|&f| f) {
        runs.push((0..n).collect());
    } else {
        for start in (0..n).filter(|&i| near[i] && !near[(i + n - 1) % n]) {
            let mut run = vec![start];
            let mut edge = start;
            while near[edge] {
                edge = (edge + 1) % n;
                run.push(edge);
            }
            runs.push(run);
        }
    }

    let mut changed = false;
    for run in runs {
        let first = coord(&poly[run[0]]);
        if run.iter().all(|&i| coord(&poly[i]) == first) {
            continue;
        }
        let mean = run.iter().map(|&i| coord(&poly[i])).sum::<f64>() / run.len() as f64;
        for &i in &run {
            match axis {
                Axis::Horizontal => poly[i].y = mean,
                Axis::Vertical => poly[i].x = mean,
            }
        }
        changed = true;
    }
    changed
}

/// Snap edges within `tolerance_deg` of 0/90/180/270 degrees to exact axis
/// alignment, then merge vertices left collinear. Idempotent; edges outside
/// the tolerance (chamfers) keep their angle.
pub fn snap_polygon_edges(vertices: &[Point2D], tolerance_deg: f64) -> Vec<Point2D> {
    if vertices.len() < 3 {
        return vertices.to_vec();
    }

    let mut poly = cleanup_polygon(vertices);
    for _ in 0..MAX_SNAP_PASSES {
        if poly.len() < 3 {
            break;
        }
        let moved_h = snap_runs(&mut poly, tolerance_deg, Axis::Horizontal);
        let moved_v = snap_runs(&mut poly, tolerance_deg, Axis::Vertical);
        let cleaned = cleanup_polygon(&poly);
        let changed = moved_h || moved_v || cleaned.len() != poly.len();
        poly = cleaned;
        if !changed {
            break;
        }
    }

    if poly.len() < 3 {
        return vertices.to_vec();
    }
    poly
}

/// Collapse small rectangular tabs (or notches) left by drawing imprecision.
///
/// A tab is `a -> b -> c -> d` with anti-parallel legs `ab`, `cd` of similar
/// length, an outer edge `bc` across them, all shorter than the depth limit,
/// sitting on a straight base line through `a` and `d`. No-op below 5 vertices.
pub fn remove_polygon_micro_bumps(
    polygon: &[Point2D],
    max_bump_depth_cm: f64,
    pixels_per_cm: f64,
) -> Vec<Point2D> {
    if polygon.len() < 5 {
        return polygon.to_vec();
    }
    let max_px = max_bump_depth_cm * pixels_per_cm;
    let mut poly = polygon.to_vec();

    loop {
        let n = poly.len();
        if n < 5 {
            break;
        }
        let Some(i) = (0..n).find(|&i| is_micro_bump(&poly, i, max_px)) else {
            break;
        };
        let (b, c) = ((i + 1) % n, (i + 2) % n);
        let (hi, lo) = (b.max(c), b.min(c));
        poly.remove(hi);
        poly.remove(lo);
        poly = cleanup_polygon(&poly);
    }

    if poly.len() < 3 {
        return polygon.to_vec();
    }
    poly
}

fn is_micro_bump(poly: &[Point2D], i: usize, max_px: f64) -> bool {
    let n = poly.len();
    let p = poly[(i + n - 1) % n];
    let a = poly[i];
    let b = poly[(i + 1) % n];
    let c = poly[(i + 2) % n];
    let d = poly[(i + 3) % n];
    let q = poly[(i + 4) % n];

    let leg1 = a.vector_to(&b);
    let outer = b.vector_to(&c);
    let leg2 = c.vector_to(&d);
    let (l1, lo, l2) = (leg1.norm(), outer.norm(), leg2.norm());
    if l1 <= EPSILON || lo <= EPSILON || l2 <= EPSILON {
        return false;
    }
    if l1 > max_px || lo > max_px || l2 > max_px {
        return false;
    }
    if leg1.dot(&leg2) / (l1 * l2) > -0.95 || (leg1.dot(&outer) / (l1 * lo)).abs() > 0.3 {
        return false;
    }
    if (l1 - l2).abs() > (0.25 * l1.max(l2)).max(1.0) {
        return false;
    }

    let base = a.vector_to(&d);
    let base_len = base.norm();
    if base_len <= EPSILON {
        return false;
    }
    let before = p.vector_to(&a);
    let after = d.vector_to(&q);
    if before.norm() <= EPSILON || after.norm() <= EPSILON {
        return false;
    }
    before.dot(&base) / (before.norm() * base_len) > 0.95
        && after.dot(&base) / (after.norm() * base_len) > 0.95
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn pts(coords: &[(f64, f64)]) -> Vec<Point2D> {
        coords.iter().map(|&(x, y)| Point2D::new(x, y)).collect()
    }

    #[test]
    fn test_trace_rectangle() {
        let mut mask = PixelMask::new(20, 20);
        for y in 3..9 {
            for x in 4..14 {
                mask.set(x, y, 1);
            }
        }
        let contour = trace_region_contour(&mask);
        assert_eq!(contour, pts(&[(4.0, 3.0), (14.0, 3.0), (14.0, 9.0), (4.0, 9.0)]));
        assert_relative_eq!(polygon_signed_area(&contour), 60.0);
    }

    #[test]
    fn test_trace_l_shape_area_matches_pixels() {
        let mut mask = PixelMask::new(30, 30);
        for y in 2..20 {
            for x in 2..25 {
                if !(x >= 12 && y >= 10) {
                    mask.set(x, y, 1);
                }
            }
        }
        let contour = trace_region_contour(&mask);
        assert_eq!(contour.len(), 6);
        assert_relative_eq!(polygon_area(&contour), mask.wall_count() as f64);
    }

    #[test]
    fn test_trace_diagonal_pinch_stays_4_connected() {
        let mut mask = PixelMask::new(6, 6);
        mask.set(1, 1, 1);
        mask.set(2, 2, 1);
        let contour = trace_region_contour(&mask);
        assert_eq!(contour.len(), 4);
        assert_relative_eq!(polygon_area(&contour), 1.0);
    }

    #[test]
    fn test_trace_empty() {
        assert!(trace_region_contour(&PixelMask::new(5, 5)).is_empty());
    }

    #[test]
    fn test_douglas_peucker_collinear() {
        let points: Vec<Point2D> = (0..10)
            .map(|i| Point2D::new(i as f64, 2.0 * i as f64))
            .collect();
        let simplified = douglas_peucker(&points, 0.1);
        assert_eq!(simplified, vec![points[0], points[9]]);
    }

    #[test]
    fn test_douglas_peucker_keeps_corner() {
        let points = pts(&[(0.0, 0.0), (10.0, 0.0), (10.0, 10.0)]);
        // Corner distance from the chord is 10 / sqrt(2)
        for epsilon in [0.5, 3.0, 7.0] {
            assert_eq!(douglas_peucker(&points, epsilon).len(), 3);
        }
        assert_eq!(douglas_peucker(&points[..2], 1.0).len(), 2);
        assert_eq!(douglas_peucker(&points, 7.5).len(), 2);
    }

    #[test]
    fn test_douglas_peucker_splits_repeatedly() {
        // Zigzag whose every tooth stands 2 px off the baseline
        let points: Vec<Point2D> = (0..=8)
            .map(|i| Point2D::new(i as f64 * 5.0, if i % 2 == 0 { 0.0 } else { 2.0 }))
            .collect();
        assert_eq!(douglas_peucker(&points, 1.0), points);
        assert_eq!(douglas_peucker(&points, 2.5), vec![points[0], points[8]]);
    }

    #[test]
    fn test_perpendicular_distance() {
        let a = Point2D::new(0.0, 0.0);
        let b = Point2D::new(4.0, 3.0);
        assert_relative_eq!(perpendicular_distance(&Point2D::new(8.0, -1.0), &a, &b), 5.6);
        // Beyond the segment end the infinite line still applies
        assert_relative_eq!(perpendicular_distance(&Point2D::new(8.0, 6.0), &a, &b), 0.0);
        assert_relative_eq!(perpendicular_distance(&Point2D::new(3.0, 4.0), &a, &a), 5.0);
    }

    #[test]
    fn test_simplify_closed_staircase() {
        // Slightly jagged square outline
        let ring = pts(&[
            (0.0, 0.0),
            (5.0, 0.4),
            (10.0, 0.0),
            (10.0, 10.0),
            (5.0, 10.3),
            (0.0, 10.0),
        ]);
        let simplified = simplify_closed(&ring, 1.0);
        assert_eq!(simplified.len(), 4);
    }

    #[test]
    fn test_polygon_bbox() {
        assert!(polygon_bbox(&[]).is_none());
        let (lo, hi) = polygon_bbox(&pts(&[(3.0, 7.0), (-1.0, 2.0), (5.0, 4.0)])).unwrap();
        assert_eq!((lo.x, lo.y, hi.x, hi.y), (-1.0, 2.0, 5.0, 7.0));
    }

    #[test]
    fn test_point_to_segment_distance() {
        let a = Point2D::new(0.0, 0.0);
        let b = Point2D::new(10.0, 0.0);
        assert_relative_eq!(point_to_segment_distance(&Point2D::new(5.0, 5.0), &a, &b), 5.0);
        assert_relative_eq!(point_to_segment_distance(&Point2D::new(13.0, 4.0), &a, &b), 5.0);
    }

    #[test]
    fn test_snap_near_axis_edges() {
        let poly = pts(&[(0.0, 0.0), (100.0, 3.0), (101.0, 50.0), (-2.0, 49.0)]);
        let snapped = snap_polygon_edges(&poly, 5.0);
        assert_eq!(snapped.len(), 4);
        for i in 0..4 {
            let a = snapped[i];
            let b = snapped[(i + 1) % 4];
            assert!(a.x == b.x || a.y == b.y, "edge {i} not axis aligned: {a:?} -> {b:?}");
        }
    }

    #[test]
    fn test_snap_leaves_chamfer() {
        let poly = pts(&[(0.0, 0.0), (80.0, 0.0), (100.0, 20.0), (100.0, 60.0), (0.0, 60.0)]);
        let snapped = snap_polygon_edges(&poly, 8.0);
        assert_eq!(snapped, poly);
    }

    #[test]
    fn test_snap_merges_collinear() {
        let poly = pts(&[(0.0, 0.0), (50.0, 1.0), (100.0, 0.0), (100.0, 40.0), (0.0, 40.0)]);
        let snapped = snap_polygon_edges(&poly, 5.0);
        assert_eq!(snapped.len(), 4);
    }

    #[test]
    fn test_snap_idempotent() {
        let polys = [
            pts(&[(0.0, 0.0), (100.0, 3.0), (101.0, 50.0), (-2.0, 49.0)]),
            pts(&[(0.0, 0.0), (80.0, 1.0), (100.0, 21.0), (99.0, 60.0), (0.3, 61.0)]),
            pts(&[(3.0, 1.0), (40.0, 2.5), (41.0, 20.0), (70.0, 22.0), (71.0, 90.0), (2.0, 88.0)]),
            pts(&[(0.0, 0.0), (10.0, 0.0), (5.0, 0.2)]),
        ];
        for poly in &polys {
            let once = snap_polygon_edges(poly, 8.0);
            let twice = snap_polygon_edges(&once, 8.0);
            assert_eq!(once, twice);
        }
    }

    #[test]
    fn test_snap_small_input_passthrough() {
        let poly = pts(&[(0.0, 0.0), (10.0, 1.0)]);
        assert_eq!(snap_polygon_edges(&poly, 8.0), poly);
    }

    #[test]
    fn test_micro_bump_removed() {
        let poly = pts(&[
            (0.0, 0.0),
            (40.0, 0.0),
            (40.0, -5.0),
            (45.0, -5.0),
            (45.0, 0.0),
            (100.0, 0.0),
            (100.0, 50.0),
            (0.0, 50.0),
        ]);
        let cleaned = remove_polygon_micro_bumps(&poly, 15.0, 1.0);
        assert_eq!(cleaned, pts(&[(0.0, 0.0), (100.0, 0.0), (100.0, 50.0), (0.0, 50.0)]));
    }

    #[test]
    fn test_large_wing_kept() {
        let poly = pts(&[
            (0.0, 0.0),
            (40.0, 0.0),
            (40.0, -40.0),
            (80.0, -40.0),
            (80.0, 0.0),
            (100.0, 0.0),
            (100.0, 50.0),
            (0.0, 50.0),
        ]);
        assert_eq!(remove_polygon_micro_bumps(&poly, 15.0, 1.0), poly);
        // Same shape counts as a bump once the depth limit scales past it
        assert_eq!(remove_polygon_micro_bumps(&poly, 15.0, 3.0).len(), 4);
    }

    #[test]
    fn test_micro_bump_small_polygon_noop() {
        let poly = pts(&[(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 1.0)]);
        assert_eq!(remove_polygon_micro_bumps(&poly, 100.0, 1.0), poly);
    }
}
