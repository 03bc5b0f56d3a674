// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Wall/open pixel classification from raw RGBA colour

use crate::config::Heuristics;
use crate::types::PixelMask;
use image::{Rgba, RgbaImage};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Inclusive luma band holding the wall fill of a drawing
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct LumaRange {
    pub low: u8,
    pub high: u8,
}

/// Composite a sample over white paper using its alpha
#[inline]
pub fn composite_rgb(pixel: &Rgba<u8>) -> [f64; 3] {
    let [r, g, b, a] = pixel.0;
    let alpha = a as f64 / 255.0;
    let paper = 255.0 * (1.0 - alpha);
    [
        r as f64 * alpha + paper,
        g as f64 * alpha + paper,
        b as f64 * alpha + paper,
    ]
}

/// Standard luminance formula (ITU-R BT.601)
#[inline]
pub fn luma(pixel: &Rgba<u8>) -> f64 {
    let [r, g, b] = composite_rgb(pixel);
    0.299 * r + 0.587 * g + 0.114 * b
}

/// HSV saturation and max channel of the composited sample
#[inline]
pub fn saturation(pixel: &Rgba<u8>) -> (f64, f64) {
    let [r, g, b] = composite_rgb(pixel);
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let sat = if max <= f64::EPSILON {
        0.0
    } else {
        (max - min) / max
    };
    (sat, max)
}

/// Markup colour (strong red) drawn over plans by hand or by annotation layers
#[inline]
pub fn is_annotation(pixel: &Rgba<u8>) -> bool {
    let [r, g, b] = composite_rgb(pixel);
    r >= 180.0 && g <= 90.0 && b <= 90.0
}

/// Fixed threshold: wall iff luma < `threshold`
pub fn image_to_binary_mask(image: &RgbaImage, threshold: f64) -> PixelMask {
    let mut mask = PixelMask::new(image.width(), image.height());
    for (x, y, pixel) in image.enumerate_pixels() {
        if luma(pixel) < threshold {
            mask.set(x, y, 1);
        }
    }
    mask
}

/// Luma histogram with 256 bins
pub fn luma_histogram(image: &RgbaImage) -> [u64; 256] {
    let mut histogram = [0u64; 256];
    for pixel in image.pixels() {
        let bin = luma(pixel).round().clamp(0.0, 255.0) as usize;
        histogram[bin] += 1;
    }
    histogram
}

/// Find the dominant mid-tone peak (the wall fill) between black ink and paper.
///
/// Returns `None` for drawings without a mid-tone fill, e.g. pure line art.
pub fn auto_detect_wall_range(image: &RgbaImage, heuristics: &Heuristics) -> Option<LumaRange> {
    let histogram = luma_histogram(image);
    let total: u64 = histogram.iter().sum();
    if total == 0 {
        return None;
    }

    let smoothed: Vec<f64> = (0..256usize)
        .map(|i| {
            let lo = i.saturating_sub(1);
            let hi = (i + 1).min(255);
            histogram[lo..=hi].iter().sum::<u64>() as f64 / 3.0
        })
        .collect();

    let lo = heuristics.histogram_dark_cutoff as usize + 1;
    let hi = (heuristics.histogram_light_cutoff as usize).checked_sub(1)?;
    if lo > hi {
        return None;
    }

    let mut peak = lo;
    for i in lo..=hi {
        if smoothed[i] > smoothed[peak] {
            peak = i;
        }
    }

    let window: u64 = histogram[peak.saturating_sub(2).max(lo)..=(peak + 2).min(hi)]
        .iter()
        .sum();
    let min_window = heuristics.histogram_min_peak_fraction * total as f64;
    if smoothed[peak] <= 0.0 || (window as f64) < min_window {
        debug!(peak, window, total, "no mid-tone wall fill");
        return None;
    }

    let floor = smoothed[peak] * heuristics.histogram_bracket_fraction;
    let mut low = peak;
    while low > lo && smoothed[low - 1] >= floor {
        low -= 1;
    }
    let mut high = peak;
    while high < hi && smoothed[high + 1] >= floor {
        high += 1;
    }

    let range = LumaRange {
        low: low.saturating_sub(2).max(lo) as u8,
        high: (high + 2).min(hi) as u8,
    };
    debug!(low = range.low, high = range.high, peak, "detected wall luma range");
    Some(range)
}

/// Gray-band wall mask with a saturation fallback for coloured wall fills
pub fn build_gray_wall_mask(
    image: &RgbaImage,
    low: f64,
    high: f64,
    heuristics: &Heuristics,
) -> PixelMask {
    let mut mask = PixelMask::new(image.width(), image.height());
    for (x, y, pixel) in image.enumerate_pixels() {
        let value = luma(pixel);
        let is_wall = if value >= low && value <= high {
            true
        } else if value < low {
            let (sat, max_channel) = saturation(pixel);
            sat >= heuristics.saturation_min
                && max_channel >= heuristics.saturated_channel_min as f64
        } else {
            false
        };
        if is_wall {
            mask.set(x, y, 1);
        }
    }
    mask
}

/// Gray-band mask over the configured band `gray_low..=gray_high`
pub fn build_default_gray_wall_mask(image: &RgbaImage, heuristics: &Heuristics) -> PixelMask {
    build_gray_wall_mask(
        image,
        heuristics.gray_low as f64,
        heuristics.gray_high as f64,
        heuristics,
    )
}

/// Wall mask used by the orchestrators: the gray band when the drawing has a
/// mid-tone fill, the fixed threshold otherwise
pub fn wall_mask_for(image: &RgbaImage, heuristics: &Heuristics) -> PixelMask {
    match auto_detect_wall_range(image, heuristics) {
        Some(range) => build_gray_wall_mask(image, range.low as f64, range.high as f64, heuristics),
        None => image_to_binary_mask(image, heuristics.binary_threshold),
    }
}
