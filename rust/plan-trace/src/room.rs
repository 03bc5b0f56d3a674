// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Single-click room detection

use crate::config::DetectionOptions;
use crate::contour::{
    polygon_area, remove_polygon_micro_bumps, simplify_closed, snap_polygon_edges,
    trace_region_contour,
};
use crate::error::{Error, Result};
use crate::mask::wall_mask_for;
use crate::metrology::{detect_door_gaps, detect_wall_thickness, ProbeSide};
use crate::morphology::{closing_radius_px, filter_small_components, morphological_close};
use crate::region::flood_fill;
use crate::types::RoomDetection;
use image::RgbaImage;
use tracing::debug;

/// Detect the room enclosing the seed pixel `(x, y)`.
///
/// Door openings up to `closing_gap_cm` wide are sealed before filling so the
/// fill stays inside the room; the sealed openings are reported as gaps.
/// Returns `Ok(None)` when the seed is outside the image or on a wall, and
/// when the fill grows past `max_area_cm2`.
pub fn detect_room_at_pixel(
    image: &RgbaImage,
    x: i64,
    y: i64,
    options: &DetectionOptions,
) -> Result<Option<RoomDetection>> {
    options.validate()?;
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return Err(Error::EmptyImage { width, height });
    }
    let h = &options.heuristics;
    let ppc = options.pixels_per_cm;

    let original = filter_small_components(&wall_mask_for(image, h), h.min_component_area_px(ppc));
    let closed = morphological_close(&original, closing_radius_px(ppc, h.closing_gap_cm));

    let fill = flood_fill(&closed, x, y, options.max_pixels());
    if !fill.is_valid() {
        debug!(
            x,
            y,
            pixel_count = fill.pixel_count,
            budget_exceeded = fill.budget_exceeded,
            "no room at seed"
        );
        return Ok(None);
    }

    let traced = trace_region_contour(&fill.mask);
    let simplified = simplify_closed(&traced, h.simplify_epsilon_px);
    let snapped = snap_polygon_edges(&simplified, h.snap_tolerance_deg);
    let polygon = remove_polygon_micro_bumps(&snapped, h.micro_bump_depth_cm, ppc);
    if polygon.len() < 3 {
        return Ok(None);
    }

    let thickness = detect_wall_thickness(image, &polygon, ProbeSide::Outward, ppc, h);
    let gaps = detect_door_gaps(&original, &closed, &fill.mask, ppc, h)?;

    debug!(
        x,
        y,
        vertices = polygon.len(),
        area_px = fill.pixel_count,
        polygon_area = polygon_area(&polygon),
        gaps = gaps.len(),
        "detected room"
    );

    Ok(Some(RoomDetection {
        polygon,
        area_px: fill.pixel_count,
        thickness,
        gaps,
        pixels_per_cm: ppc,
    }))
}
