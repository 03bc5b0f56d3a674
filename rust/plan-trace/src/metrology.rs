// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Wall metrology: per-edge thickness probing and door gap location

use crate::config::Heuristics;
use crate::contour::polygon_signed_area;
use crate::error::Result;
use crate::mask::{is_annotation, luma};
use crate::types::{DoorGap, EdgeThickness, Orientation, PixelMask, Point2D, WallThickness};
use image::RgbaImage;
use nalgebra::Vector2;
use rayon::prelude::*;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Which side of the polygon boundary the wall band lies on
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ProbeSide {
    /// Walls surround the polygon (rooms)
    Outward,
    /// Walls are inside the polygon (building silhouettes)
    Inward,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Sample {
    Wall,
    Annotation,
    Open,
}

fn classify(image: &RgbaImage, x: i64, y: i64, heuristics: &Heuristics) -> Option<Sample> {
    if x < 0 || y < 0 || x >= image.width() as i64 || y >= image.height() as i64 {
        return None;
    }
    let pixel = image.get_pixel(x as u32, y as u32);
    Some(if is_annotation(pixel) {
        Sample::Annotation
    } else if luma(pixel) < heuristics.probe_wall_luma {
        Sample::Wall
    } else {
        Sample::Open
    })
}

/// Follow `normal` from `origin` and count the wall band it crosses.
///
/// Up to `probe_lead_px` open pixels may precede the band. Annotation pixels
/// are skipped without counting, so markup over or beside a wall line does
/// not inflate the band.
fn probe_band(
    image: &RgbaImage,
    origin: Vector2<f64>,
    normal: Vector2<f64>,
    max_px: u32,
    heuristics: &Heuristics,
) -> Option<u32> {
    let mut wall = 0u32;
    let mut lead = 0u32;
    let max_steps = 2 * max_px + heuristics.probe_lead_px;

    for step in 0..max_steps {
        let p = origin + normal * (step as f64 + 0.5);
        let Some(sample) = classify(image, p.x.floor() as i64, p.y.floor() as i64, heuristics)
        else {
            break;
        };
        match sample {
            Sample::Wall => {
                wall += 1;
                if wall >= max_px {
                    break;
                }
            }
            Sample::Annotation => {}
            Sample::Open if wall > 0 => break,
            Sample::Open => {
                lead += 1;
                if lead > heuristics.probe_lead_px {
                    return None;
                }
            }
        }
    }

    (wall > 0).then_some(wall)
}

fn median(values: &mut [f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(|a, b| a.total_cmp(b));
    let mid = values.len() / 2;
    Some(if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    })
}

/// Measure the wall band behind every polygon edge.
///
/// Probes are cast along the edge normal at `probe_spacing_px` intervals over
/// the middle of each edge; the edge value is the median probe. Returns an
/// empty record for degenerate polygons or when no wall is found at all.
pub fn detect_wall_thickness(
    image: &RgbaImage,
    polygon: &[Point2D],
    side: ProbeSide,
    pixels_per_cm: f64,
    heuristics: &Heuristics,
) -> WallThickness {
    let n = polygon.len();
    if n < 3 {
        return WallThickness::default();
    }

    // Outward normal of edge (u.x, u.y) is (u.y, -u.x) for positive area
    let orientation = if polygon_signed_area(polygon) >= 0.0 {
        1.0
    } else {
        -1.0
    };
    let side_sign = match side {
        ProbeSide::Outward => 1.0,
        ProbeSide::Inward => -1.0,
    };
    let max_px = heuristics.probe_max_px(pixels_per_cm);

    let edges: Vec<EdgeThickness> = (0..n)
        .into_par_iter()
        .filter_map(|edge_index| {
            let a = polygon[edge_index].to_nalgebra().coords;
            let b = polygon[(edge_index + 1) % n].to_nalgebra().coords;
            let along = b - a;
            let length = along.norm();
            if length < 1e-6 {
                return None;
            }
            let u = along / length;
            let normal = Vector2::new(u.y, -u.x) * (orientation * side_sign);

            let margin = length * heuristics.probe_end_margin;
            let usable = length - 2.0 * margin;
            // At most one probe per pixel of usable edge
            let max_count = usable.ceil().max(1.0) as usize;
            let count =
                ((usable / heuristics.probe_spacing_px).floor() as usize).clamp(1, max_count);

            let mut probes: Vec<f64> = (0..count)
                .filter_map(|k| {
                    let t = margin + usable * (k as f64 + 0.5) / count as f64;
                    probe_band(image, a + u * t, normal, max_px, heuristics)
                })
                .map(f64::from)
                .collect();

            median(&mut probes).map(|thickness_px| EdgeThickness {
                edge_index,
                thickness_px,
                thickness_cm: thickness_px / pixels_per_cm,
            })
        })
        .collect();

    let mut values: Vec<f64> = edges.iter().map(|e| e.thickness_px).collect();
    let Some(median_px) = median(&mut values) else {
        debug!(vertices = n, "no wall band found behind any edge");
        return WallThickness::default();
    };

    WallThickness {
        edges,
        median_px,
        median_cm: median_px / pixels_per_cm,
    }
}

#[derive(Debug, Clone, Copy)]
struct Run {
    start: u32,
    end: u32,
}

impl Run {
    fn width(&self) -> u32 {
        self.end - self.start + 1
    }
}

fn split_runs(coords: &[u32]) -> Vec<Run> {
    let mut runs: Vec<Run> = Vec::new();
    for &c in coords {
        match runs.last_mut() {
            Some(run) if c == run.end + 1 => run.end = c,
            _ => runs.push(Run { start: c, end: c }),
        }
    }
    runs
}

fn gap_from_run(orientation: Orientation, line: u32, start: u32, end: u32) -> DoorGap {
    let along = (start + end + 1) as f64 / 2.0;
    let across = line as f64 + 0.5;
    let midpoint = match orientation {
        Orientation::Horizontal => Point2D::new(along, across),
        Orientation::Vertical => Point2D::new(across, along),
    };
    DoorGap {
        midpoint,
        orientation,
        width_px: (end - start + 1) as f64,
    }
}

/// Locate door and window openings around a detected room.
///
/// A gap pixel is open in `original`, sealed in `closed` and 4-adjacent to the
/// `room` fill. Runs of gap pixels along one wall line that are separated by
/// dashes of at most `max_dash_px` merge into a single opening when the merged
/// span reaches `min_gap_px`, which turns dashed door symbols into one gap.
pub fn detect_door_gaps(
    original: &PixelMask,
    closed: &PixelMask,
    room: &PixelMask,
    pixels_per_cm: f64,
    heuristics: &Heuristics,
) -> Result<Vec<DoorGap>> {
    original.ensure_same_size(closed)?;
    original.ensure_same_size(room)?;

    let max_dash = heuristics.max_dash_px(pixels_per_cm);
    let min_gap = heuristics.min_gap_px(pixels_per_cm);

    let mut lines: FxHashMap<(Orientation, u32), Vec<u32>> = FxHashMap::default();
    for y in 0..original.height() {
        for x in 0..original.width() {
            if original.is_wall(x, y) || !closed.is_wall(x, y) {
                continue;
            }
            let (xi, yi) = (x as i64, y as i64);
            if room.is_wall_at(xi, yi - 1) || room.is_wall_at(xi, yi + 1) {
                lines.entry((Orientation::Horizontal, y)).or_default().push(x);
            }
            if room.is_wall_at(xi - 1, yi) || room.is_wall_at(xi + 1, yi) {
                lines.entry((Orientation::Vertical, x)).or_default().push(y);
            }
        }
    }

    let mut keys: Vec<(Orientation, u32)> = lines.keys().copied().collect();
    keys.sort();

    let mut gaps = Vec::new();
    for key in keys {
        let (orientation, line) = key;
        let mut coords = lines.remove(&key).unwrap_or_default();
        coords.sort_unstable();
        coords.dedup();
        let runs = split_runs(&coords);

        // Cluster runs separated by short wall dashes
        let mut clusters: Vec<Vec<Run>> = Vec::new();
        for run in runs {
            match clusters.last_mut() {
                Some(cluster)
                    if run.start - cluster[cluster.len() - 1].end - 1 <= max_dash =>
                {
                    cluster.push(run)
                }
                _ => clusters.push(vec![run]),
            }
        }

        for cluster in clusters {
            let start = cluster[0].start;
            let end = cluster[cluster.len() - 1].end;
            if cluster.len() > 1 && end - start + 1 >= min_gap {
                gaps.push(gap_from_run(orientation, line, start, end));
                continue;
            }
            for run in cluster {
                if run.width() >= heuristics.min_single_gap_px {
                    gaps.push(gap_from_run(orientation, line, run.start, run.end));
                }
            }
        }
    }

    debug!(count = gaps.len(), max_dash, min_gap, "door gaps");
    Ok(gaps)
}
