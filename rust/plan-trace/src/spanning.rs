// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Spanning (structural) wall detection
//!
//! Scans rows for horizontal and columns for vertical wall bands that run
//! across most of the building. Envelope walls, walls broken by openings,
//! short partitions and bands of implausible thickness are rejected, each
//! with a recorded reason.

use crate::config::DetectionOptions;
use crate::error::{Error, Result};
use crate::mask::is_annotation;
use crate::types::{Orientation, PixelMask, Point2D, Rejection, RejectionReason, SpanningWall};
use image::RgbaImage;
use tracing::{debug, trace};

/// Maps (line, position) coordinates of a scan onto image (x, y)
#[derive(Debug, Clone, Copy)]
struct ScanAxis {
    orientation: Orientation,
    lines: u32,
    length: u32,
}

impl ScanAxis {
    fn new(orientation: Orientation, width: u32, height: u32) -> Self {
        match orientation {
            Orientation::Horizontal => Self { orientation, lines: height, length: width },
            Orientation::Vertical => Self { orientation, lines: width, length: height },
        }
    }

    #[inline]
    fn xy(&self, line: i64, pos: i64) -> (i64, i64) {
        match self.orientation {
            Orientation::Horizontal => (pos, line),
            Orientation::Vertical => (line, pos),
        }
    }

    #[inline]
    fn at(&self, mask: &PixelMask, line: i64, pos: i64) -> bool {
        let (x, y) = self.xy(line, pos);
        mask.is_wall_at(x, y)
    }

    fn point(&self, across: f64, along: f64) -> Point2D {
        match self.orientation {
            Orientation::Horizontal => Point2D::new(along, across),
            Orientation::Vertical => Point2D::new(across, along),
        }
    }
}

/// Consecutive scan lines carrying overlapping long runs
#[derive(Debug, Clone)]
struct Band {
    first: u32,
    last: u32,
    /// Inclusive run per line, `runs[k]` belongs to line `first + k`
    runs: Vec<(u32, u32)>,
}

impl Band {
    fn centre_line(&self) -> u32 {
        self.first + self.runs.len() as u32 / 2
    }

    fn centre_run(&self) -> (u32, u32) {
        self.runs[self.runs.len() / 2]
    }
}

fn runs_overlap(a: (u32, u32), b: (u32, u32)) -> bool {
    let lo = a.0.max(b.0);
    let hi = a.1.min(b.1);
    if hi < lo {
        return false;
    }
    let shorter = (a.1 - a.0 + 1).min(b.1 - b.0 + 1);
    2 * (hi - lo + 1) >= shorter
}

struct Scanner<'a> {
    image: &'a RgbaImage,
    walls: &'a PixelMask,
    building: &'a PixelMask,
    options: &'a DetectionOptions,
    axis: ScanAxis,
}

impl Scanner<'_> {
    /// Long wall runs inside the building on one scan line
    fn line_runs(&self, line: u32, bridge: u32, min_len: u32) -> Vec<(u32, u32)> {
        let mut runs = Vec::new();
        let mut current: Option<(u32, u32)> = None;
        for pos in 0..self.axis.length {
            let (l, p) = (line as i64, pos as i64);
            if !(self.axis.at(self.walls, l, p) && self.axis.at(self.building, l, p)) {
                continue;
            }
            current = match current {
                Some((start, end)) if pos - end - 1 <= bridge => Some((start, pos)),
                Some(run) => {
                    runs.push(run);
                    Some((pos, pos))
                }
                None => Some((pos, pos)),
            };
        }
        runs.extend(current);
        runs.retain(|(start, end)| end - start + 1 >= min_len);
        runs
    }

    fn bands(&self) -> Vec<Band> {
        let ppc = self.options.pixels_per_cm;
        let h = &self.options.heuristics;
        let bridge = (h.span_bridge_cm * ppc).round() as u32;
        let min_len = ((h.min_span_cm * ppc).round() as u32).max(1);

        let mut bands: Vec<Band> = Vec::new();
        let mut open: Vec<usize> = Vec::new();
        for line in 0..self.axis.lines {
            let mut extended = Vec::new();
            for run in self.line_runs(line, bridge, min_len) {
                let hit = open.iter().copied().find(|&i| {
                    !extended.contains(&i)
                        && bands[i].runs.last().is_some_and(|&prev| runs_overlap(prev, run))
                });
                match hit {
                    Some(i) => {
                        bands[i].runs.push(run);
                        bands[i].last = line;
                        extended.push(i);
                    }
                    None => {
                        bands.push(Band { first: line, last: line, runs: vec![run] });
                        extended.push(bands.len() - 1);
                    }
                }
            }
            open = extended;
        }
        bands
    }

    fn probe_positions(&self, start: u32, end: u32) -> impl Iterator<Item = u32> {
        let step = (self.options.heuristics.probe_spacing_px.round() as usize).max(1);
        (start..=end).step_by(step)
    }

    /// Share of probes where the pixel just past either face of the band is outside the building
    fn outside_fraction(&self, band: &Band, start: u32, end: u32) -> f64 {
        let (mut outside, mut total) = (0usize, 0usize);
        for pos in self.probe_positions(start, end) {
            let p = pos as i64;
            let before = self.axis.at(self.building, band.first as i64 - 1, p);
            let after = self.axis.at(self.building, band.last as i64 + 1, p);
            total += 1;
            if !before || !after {
                outside += 1;
            }
        }
        if total == 0 {
            0.0
        } else {
            outside as f64 / total as f64
        }
    }

    /// Longest run of open pixels on the centre line between `start` and `end`
    fn longest_gap(&self, line: u32, start: u32, end: u32) -> u32 {
        let (mut longest, mut current) = (0u32, 0u32);
        for pos in start..=end {
            if self.axis.at(self.walls, line as i64, pos as i64) {
                current = 0;
            } else {
                current += 1;
                longest = longest.max(current);
            }
        }
        longest
    }

    /// Building extent along the centre line through `pos`
    fn local_extent(&self, line: u32, pos: u32) -> u32 {
        let l = line as i64;
        if !self.axis.at(self.building, l, pos as i64) {
            return 0;
        }
        let mut lo = pos as i64;
        while self.axis.at(self.building, l, lo - 1) {
            lo -= 1;
        }
        let mut hi = pos as i64;
        while self.axis.at(self.building, l, hi + 1) {
            hi += 1;
        }
        (hi - lo + 1) as u32
    }

    fn is_annotation_at(&self, line: i64, pos: i64) -> bool {
        let (x, y) = self.axis.xy(line, pos);
        x >= 0
            && y >= 0
            && x < self.image.width() as i64
            && y < self.image.height() as i64
            && is_annotation(self.image.get_pixel(x as u32, y as u32))
    }

    /// Wall pixels crossed perpendicular to the band; markup is skipped uncounted
    fn across_run(&self, line: u32, pos: u32) -> u32 {
        let p = pos as i64;
        let mut count = 0;
        for (from, dir) in [(line as i64, -1i64), (line as i64 + 1, 1)] {
            let mut l = from;
            while self.axis.at(self.walls, l, p) {
                if !self.is_annotation_at(l, p) {
                    count += 1;
                }
                l += dir;
            }
        }
        count
    }

    /// Robust band thickness; probes crossing perpendicular walls are dropped
    fn band_thickness(&self, line: u32, start: u32, end: u32) -> Option<f64> {
        let mut probes: Vec<u32> = self
            .probe_positions(start, end)
            .map(|pos| self.across_run(line, pos))
            .filter(|&count| count > 0)
            .collect();
        if probes.is_empty() {
            return None;
        }
        probes.sort_unstable();
        let quartile = probes[probes.len() / 4] as f64;
        let limit = quartile * self.options.heuristics.perpendicular_exclusion;
        let kept: Vec<u32> = probes.into_iter().filter(|&c| c as f64 <= limit).collect();
        if kept.is_empty() {
            return None;
        }

        let mid = kept.len() / 2;
        Some(if kept.len() % 2 == 0 {
            (kept[mid - 1] + kept[mid]) as f64 / 2.0
        } else {
            kept[mid] as f64
        })
    }

    fn evaluate(&self, band: &Band) -> std::result::Result<SpanningWall, Rejection> {
        let h = &self.options.heuristics;
        let ppc = self.options.pixels_per_cm;
        let line = band.centre_line();
        let (start, end) = band.centre_run();
        let across = (band.first + band.last + 1) as f64 / 2.0;
        let p0 = self.axis.point(across, start as f64);
        let p1 = self.axis.point(across, end as f64 + 1.0);
        let reject = |reason| Rejection {
            orientation: self.axis.orientation,
            start: p0,
            end: p1,
            reason,
        };

        let outside_fraction = self.outside_fraction(band, start, end);
        if outside_fraction >= h.flush_fraction {
            return Err(reject(RejectionReason::FlushWithBoundary { outside_fraction }));
        }

        let gap_px = self.longest_gap(line, start, end);
        if gap_px > h.continuity_tolerance_px {
            return Err(reject(RejectionReason::Discontinuous { gap_px }));
        }

        let local_extent_px = self.local_extent(line, (start + end) / 2);
        let coverage = if local_extent_px == 0 {
            0.0
        } else {
            (end - start + 1) as f64 / local_extent_px as f64
        };
        if coverage < h.span_coverage {
            return Err(reject(RejectionReason::Span { coverage, local_extent_px }));
        }

        let thickness_px = self.band_thickness(line, start, end).unwrap_or(0.0);
        let band_cm = thickness_px / ppc;
        if band_cm < self.options.min_thickness_cm || band_cm > self.options.max_thickness_cm {
            return Err(reject(RejectionReason::Thickness { band_cm }));
        }

        Ok(SpanningWall {
            orientation: self.axis.orientation,
            start: p0,
            end: p1,
            thickness_px,
            thickness_cm: band_cm,
        })
    }
}

/// Detect interior walls that span most of the building.
///
/// `wall_mask` and `building_mask` are normally the conditioned wall mask and
/// silhouette of an `EnvelopeDetection`; `image` is consulted only to skip
/// markup while measuring thickness. Rejected candidates are appended to
/// `rejections` when given.
pub fn detect_spanning_walls(
    image: &RgbaImage,
    wall_mask: &PixelMask,
    building_mask: &PixelMask,
    options: &DetectionOptions,
    mut rejections: Option<&mut Vec<Rejection>>,
) -> Result<Vec<SpanningWall>> {
    options.validate()?;
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return Err(Error::EmptyImage { width, height });
    }
    wall_mask.ensure_same_size(building_mask)?;
    if width != wall_mask.width() || height != wall_mask.height() {
        return Err(Error::MaskSize {
            width: wall_mask.width(),
            height: wall_mask.height(),
            actual_width: width,
            actual_height: height,
        });
    }

    let mut walls = Vec::new();
    for orientation in [Orientation::Horizontal, Orientation::Vertical] {
        let scanner = Scanner {
            image,
            walls: wall_mask,
            building: building_mask,
            options,
            axis: ScanAxis::new(orientation, width, height),
        };
        let bands = scanner.bands();
        debug!(?orientation, candidates = bands.len(), "spanning wall candidates");

        for band in &bands {
            match scanner.evaluate(band) {
                Ok(wall) => {
                    trace!(
                        ?orientation,
                        thickness_cm = wall.thickness_cm,
                        "accepted spanning wall"
                    );
                    walls.push(wall);
                }
                Err(rejection) => {
                    trace!(?orientation, reason = ?rejection.reason, "rejected spanning wall");
                    if let Some(list) = rejections.as_deref_mut() {
                        list.push(rejection);
                    }
                }
            }
        }
    }

    debug!(count = walls.len(), "spanning walls");
    Ok(walls)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mask::image_to_binary_mask;
    use crate::region::fill_interior_holes;
    use approx::assert_relative_eq;
    use image::Rgba;
    use std::ops::Range;

    const BLACK: Rgba<u8> = Rgba([0, 0, 0, 255]);
    const RED: Rgba<u8> = Rgba([230, 20, 20, 255]);

    fn fill(image: &mut RgbaImage, xs: Range<u32>, ys: Range<u32>, c: Rgba<u8>) {
        for y in ys {
            for x in xs.clone() {
                image.put_pixel(x, y, c);
            }
        }
    }

    /// 200x120 sheet, envelope outer (10..190, 10..110) with 4 px walls
    fn building() -> RgbaImage {
        let mut image = RgbaImage::from_pixel(200, 120, Rgba([255, 255, 255, 255]));
        fill(&mut image, 10..190, 10..14, BLACK);
        fill(&mut image, 10..190, 106..110, BLACK);
        fill(&mut image, 10..14, 10..110, BLACK);
        fill(&mut image, 186..190, 10..110, BLACK);
        image
    }

    fn run(image: &RgbaImage) -> (Vec<SpanningWall>, Vec<Rejection>) {
        let walls = image_to_binary_mask(image, 128.0);
        let mut silhouette = walls.clone();
        fill_interior_holes(&mut silhouette);
        let mut rejections = Vec::new();
        let found = detect_spanning_walls(
            image,
            &walls,
            &silhouette,
            &DetectionOptions::new(0.2),
            Some(&mut rejections),
        )
        .unwrap();
        (found, rejections)
    }

    fn reasons(rejections: &[Rejection], orientation: Orientation) -> Vec<RejectionReason> {
        rejections
            .iter()
            .filter(|r| r.orientation == orientation)
            .map(|r| r.reason)
            .collect()
    }

    #[test]
    fn test_accepts_dividing_wall() {
        let mut image = building();
        fill(&mut image, 98..102, 14..106, BLACK);
        let (walls, rejections) = run(&image);

        assert_eq!(walls.len(), 1);
        let wall = walls[0];
        assert_eq!(wall.orientation, Orientation::Vertical);
        assert_relative_eq!(wall.thickness_px, 4.0);
        assert_relative_eq!(wall.thickness_cm, 20.0);
        assert_relative_eq!(wall.start.x, 100.0);
        assert_relative_eq!(wall.length(), 100.0);

        // The four envelope walls are flush with the silhouette
        assert_eq!(rejections.len(), 4);
        assert!(rejections
            .iter()
            .all(|r| matches!(r.reason, RejectionReason::FlushWithBoundary { .. })));
    }

    #[test]
    fn test_rejects_wall_with_opening() {
        let mut image = building();
        fill(&mut image, 98..102, 14..50, BLACK);
        fill(&mut image, 98..102, 56..106, BLACK);
        let (walls, rejections) = run(&image);
        assert!(walls.is_empty());
        assert!(reasons(&rejections, Orientation::Vertical)
            .contains(&RejectionReason::Discontinuous { gap_px: 6 }));
    }

    #[test]
    fn test_rejects_partial_wall() {
        let mut image = building();
        fill(&mut image, 98..102, 14..70, BLACK);
        let (walls, rejections) = run(&image);
        assert!(walls.is_empty());
        let vertical = reasons(&rejections, Orientation::Vertical);
        assert!(vertical.iter().any(|r| match r {
            RejectionReason::Span { coverage, local_extent_px } => {
                *local_extent_px == 100 && (*coverage - 0.6).abs() < 1e-9
            }
            _ => false,
        }));
    }

    #[test]
    fn test_rejects_implausible_thickness() {
        let mut image = building();
        fill(&mut image, 92..108, 14..106, BLACK);
        let (walls, rejections) = run(&image);
        assert!(walls.is_empty());
        let vertical = reasons(&rejections, Orientation::Vertical);
        assert!(vertical.iter().any(|r| match r {
            RejectionReason::Thickness { band_cm } => (*band_cm - 80.0).abs() < 1e-9,
            _ => false,
        }));
    }

    #[test]
    fn test_markup_beside_wall_not_counted() {
        let mut image = building();
        fill(&mut image, 98..102, 14..106, BLACK);
        fill(&mut image, 102..104, 14..106, RED);
        let (walls, _) = run(&image);
        assert_eq!(walls.len(), 1);
        assert_relative_eq!(walls[0].thickness_px, 4.0);
    }

    #[test]
    fn test_without_rejection_sink() {
        let image = building();
        let walls = image_to_binary_mask(&image, 128.0);
        let mut silhouette = walls.clone();
        fill_interior_holes(&mut silhouette);
        let found =
            detect_spanning_walls(&image, &walls, &silhouette, &DetectionOptions::new(0.2), None)
                .unwrap();
        assert!(found.is_empty());
    }

    /// L-shaped building: 180x70 main block with a 60 px wide wing below its
    /// left end, 4 px walls, and a partition across the wing at y 100..104
    fn l_shaped_building() -> RgbaImage {
        let mut image = RgbaImage::from_pixel(200, 160, Rgba([255, 255, 255, 255]));
        fill(&mut image, 10..190, 10..14, BLACK);
        fill(&mut image, 186..190, 10..80, BLACK);
        fill(&mut image, 70..190, 76..80, BLACK);
        fill(&mut image, 66..70, 76..150, BLACK);
        fill(&mut image, 10..70, 146..150, BLACK);
        fill(&mut image, 10..14, 10..150, BLACK);
        fill(&mut image, 14..66, 100..104, BLACK);
        image
    }

    #[test]
    fn test_wing_wall_measured_against_local_extent() {
        let image = l_shaped_building();
        let (walls, rejections) = run(&image);

        assert_eq!(walls.len(), 1);
        let wall = walls[0];
        assert_eq!(wall.orientation, Orientation::Horizontal);
        assert_eq!((wall.start.x, wall.start.y), (10.0, 102.0));
        assert_eq!((wall.end.x, wall.end.y), (70.0, 102.0));
        assert_relative_eq!(wall.thickness_cm, 20.0);

        // Against the whole building width the same wall would be far too short
        let mut silhouette = image_to_binary_mask(&image, 128.0);
        fill_interior_holes(&mut silhouette);
        let bbox = silhouette.bounding_box().unwrap();
        assert_eq!(bbox.width(), 180);
        let coverage = wall.length() / bbox.width() as f64;
        assert!(coverage < DetectionOptions::new(0.2).heuristics.span_coverage);

        assert!(rejections
            .iter()
            .all(|r| matches!(r.reason, RejectionReason::FlushWithBoundary { .. })));
    }

    #[test]
    fn test_low_perpendicular_exclusion() {
        let image = l_shaped_building();
        let walls = image_to_binary_mask(&image, 128.0);
        let mut silhouette = walls.clone();
        fill_interior_holes(&mut silhouette);
        let mut strict = DetectionOptions::new(0.2);
        strict.heuristics.perpendicular_exclusion = 0.5;

        let result = detect_spanning_walls(&image, &walls, &silhouette, &strict, None);
        assert!(matches!(result, Err(Error::InvalidHeuristic { .. })));

        // Probes across the wing wall are all 4 px; a 2 px limit keeps none
        let default = DetectionOptions::new(0.2);
        let thickness = |options: &DetectionOptions| {
            let scanner = Scanner {
                image: &image,
                walls: &walls,
                building: &silhouette,
                options,
                axis: ScanAxis::new(Orientation::Horizontal, 200, 160),
            };
            scanner.band_thickness(102, 10, 69)
        };
        assert_eq!(thickness(&strict), None);
        assert_eq!(thickness(&default), Some(4.0));
    }

    #[test]
    fn test_empty_image() {
        let image = RgbaImage::new(0, 0);
        let walls = PixelMask::new(0, 0);
        let result =
            detect_spanning_walls(&image, &walls, &walls, &DetectionOptions::new(0.2), None);
        assert!(matches!(result, Err(Error::EmptyImage { width: 0, height: 0 })));
    }

    #[test]
    fn test_size_mismatch() {
        let image = building();
        let walls = PixelMask::new(10, 10);
        let result =
            detect_spanning_walls(&image, &walls, &walls, &DetectionOptions::new(0.2), None);
        assert!(matches!(result, Err(Error::MaskSize { .. })));
    }
}
