// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Building envelope detection
//!
//! The envelope is the outer silhouette of the largest closed wall structure
//! on the sheet. Its polygon, inward wall thickness and bounding box feed the
//! preprocessor hint and spanning-wall detection.

use crate::config::{DetectionMode, DetectionOptions, Heuristics};
use crate::contour::{
    remove_polygon_micro_bumps, simplify_closed, snap_polygon_edges, trace_region_contour,
};
use crate::error::{Error, Result};
use crate::mask::{image_to_binary_mask, wall_mask_for};
use crate::metrology::{detect_wall_thickness, ProbeSide};
use crate::morphology::{
    closing_radius_px, filter_small_components, largest_component, morphological_close,
};
use crate::region::fill_interior_holes;
use crate::types::{EnvelopeDetection, PixelBox, PixelMask};
use image::RgbaImage;
use tracing::debug;

/// Fixed-threshold mask restricted to `bbox` (plus margin); the rest is open
fn refined_wall_mask(image: &RgbaImage, bbox: &PixelBox, heuristics: &Heuristics) -> PixelMask {
    let (width, height) = image.dimensions();
    let window = bbox.expanded(heuristics.refined_bbox_margin_px, width, height);
    let mut mask = image_to_binary_mask(image, heuristics.refined_wall_threshold);
    for y in 0..height {
        for x in 0..width {
            if !window.contains(x, y) {
                mask.set(x, y, 0);
            }
        }
    }
    mask
}

/// Detect the outer building silhouette.
///
/// Returns `Ok(None)` for blank or solid images and whenever no closed
/// boundary survives conditioning.
pub fn detect_envelope(
    image: &RgbaImage,
    options: &DetectionOptions,
) -> Result<Option<EnvelopeDetection>> {
    options.validate()?;
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return Err(Error::EmptyImage { width, height });
    }
    let h = &options.heuristics;
    let ppc = options.pixels_per_cm;
    let total = width as usize * height as usize;

    let raw = match &options.mode {
        DetectionMode::Fresh => wall_mask_for(image, h),
        DetectionMode::Refined { bbox } => refined_wall_mask(image, bbox, h),
    };
    let walls = raw.wall_count();
    if walls == 0 || walls == total {
        debug!(walls, total, "uniform image, no envelope");
        return Ok(None);
    }

    let filtered = filter_small_components(&raw, h.min_component_area_px(ppc));
    let wall_mask = morphological_close(
        &filtered,
        closing_radius_px(ppc, h.envelope_closing_gap_cm),
    );

    let mut filled = wall_mask.clone();
    fill_interior_holes(&mut filled);
    let building_mask = largest_component(&filled);
    let footprint = building_mask.wall_count();
    if footprint == 0 || footprint == total {
        debug!(footprint, total, "no bounded building silhouette");
        return Ok(None);
    }
    let Some(bbox) = building_mask.bounding_box() else {
        return Ok(None);
    };

    let traced = trace_region_contour(&building_mask);
    let simplified = simplify_closed(&traced, h.simplify_epsilon_px);
    let snapped = snap_polygon_edges(&simplified, h.snap_tolerance_deg);
    let polygon = remove_polygon_micro_bumps(&snapped, h.micro_bump_depth_cm, ppc);
    if polygon.len() < 3 {
        return Ok(None);
    }

    let thickness = detect_wall_thickness(image, &polygon, ProbeSide::Inward, ppc, h);
    debug!(
        vertices = polygon.len(),
        footprint,
        median_px = thickness.median_px,
        refined = matches!(options.mode, DetectionMode::Refined { .. }),
        "detected building envelope"
    );

    Ok(Some(EnvelopeDetection {
        polygon,
        thickness,
        bbox,
        wall_mask,
        building_mask,
    }))
}
