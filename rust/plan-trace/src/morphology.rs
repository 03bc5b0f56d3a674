// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Morphological conditioning of wall masks: gap sealing and noise removal

use crate::types::PixelMask;
use image::{imageops, GrayImage, Luma};
use imageproc::distance_transform::Norm;
use imageproc::region_labelling::{connected_components, Connectivity};

/// Closing radius that seals openings up to `gap_cm` wide
pub fn closing_radius_px(pixels_per_cm: f64, gap_cm: f64) -> u32 {
    ((gap_cm * pixels_per_cm / 2.0).ceil() as u32).max(1)
}

/// Morphological closing (dilate then erode) with a square structuring element.
///
/// Seals gaps up to `2 * radius` pixels wide and never clears a wall pixel.
/// Everything beyond the image border counts as open, so walls close to the
/// sheet edge do not merge with it.
pub fn morphological_close(mask: &PixelMask, radius: u32) -> PixelMask {
    let (width, height) = (mask.width(), mask.height());
    if radius == 0 || width == 0 || height == 0 {
        return mask.clone();
    }
    let k = radius.min(u8::MAX as u32) as u8;
    let pad = k as u32;

    let mut padded = GrayImage::new(width + 2 * pad, height + 2 * pad);
    imageops::replace(&mut padded, &mask.to_gray(), pad as i64, pad as i64);
    let dilated = imageproc::morphology::dilate(&padded, Norm::LInf, k);
    let closed = imageproc::morphology::erode(&dilated, Norm::LInf, k);
    PixelMask::from_gray(&imageops::crop_imm(&closed, pad, pad, width, height).to_image())
}

/// Clear 4-connected wall components smaller than `min_area` pixels
pub fn filter_small_components(mask: &PixelMask, min_area: usize) -> PixelMask {
    if min_area <= 1 {
        return mask.clone();
    }
    let labels = connected_components(&mask.to_gray(), Connectivity::Four, Luma([0u8]));
    let areas = component_areas(&labels);

    let mut filtered = mask.clone();
    for (idx, label) in labels.pixels().enumerate() {
        let label = label.0[0] as usize;
        if label != 0 && areas[label] < min_area {
            filtered.data_mut()[idx] = 0;
        }
    }
    filtered
}

/// Keep only the largest 4-connected wall component
pub fn largest_component(mask: &PixelMask) -> PixelMask {
    let labels = connected_components(&mask.to_gray(), Connectivity::Four, Luma([0u8]));
    let areas = component_areas(&labels);
    let Some((best, _)) = areas
        .iter()
        .enumerate()
        .skip(1)
        .max_by_key(|(_, &area)| area)
    else {
        return mask.clone();
    };

    let mut kept = PixelMask::new(mask.width(), mask.height());
    for (idx, label) in labels.pixels().enumerate() {
        if label.0[0] as usize == best {
            kept.data_mut()[idx] = 1;
        }
    }
    kept
}

fn component_areas(labels: &image::ImageBuffer<Luma<u32>, Vec<u32>>) -> Vec<usize> {
    let max_label = labels.pixels().map(|p| p.0[0]).max().unwrap_or(0) as usize;
    let mut areas = vec![0usize; max_label + 1];
    for label in labels.pixels() {
        areas[label.0[0] as usize] += 1;
    }
    areas
}
