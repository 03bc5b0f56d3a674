// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Image cleanup ahead of room detection
//!
//! Thin coloured linework (dimension lines, hatching, markup) is bleached to
//! paper, everything else is reduced to a contrast-stretched greyscale. When
//! the building envelope is known, a band around its edges is never bleached
//! and orientation-split wall masks are produced as a by-product.

use crate::config::{EnvelopeHint, PreprocessOptions};
use crate::contour::point_to_segment_distance;
use crate::error::{Error, Result};
use crate::mask::{luma, saturation};
use crate::types::{PixelMask, Point2D};
use image::{Rgba, RgbaImage};
use tracing::debug;

const PAPER: Rgba<u8> = Rgba([255, 255, 255, 255]);

/// Wall pixels split by the axis they run along
#[derive(Debug, Clone, PartialEq)]
pub struct OrientedWallMasks {
    pub h_walls: PixelMask,
    pub v_walls: PixelMask,
}

/// Output of the non-mutating preprocessor
#[derive(Debug, Clone)]
pub struct Preprocessed {
    pub image: RgbaImage,
    /// Present only when an envelope hint was supplied
    pub oriented: Option<OrientedWallMasks>,
}

/// Preprocess a copy of `image`, leaving the caller's raster untouched
pub fn preprocess_for_room_detection(
    image: &RgbaImage,
    options: &PreprocessOptions,
) -> Result<Preprocessed> {
    let mut output = image.clone();
    let oriented = preprocess_in_place(&mut output, options)?;
    Ok(Preprocessed {
        image: output,
        oriented,
    })
}

/// Envelope edges with the band half-width that protects them
struct ProtectionBand {
    edges: Vec<(Point2D, Point2D, f64)>,
}

impl ProtectionBand {
    fn new(hint: &EnvelopeHint, margin: f64) -> Self {
        let n = hint.polygon.len();
        let mut known: Vec<f64> = hint
            .wall_thicknesses_px
            .iter()
            .copied()
            .filter(|t| t.is_finite() && *t > 0.0)
            .collect();
        known.sort_by(|a, b| a.total_cmp(b));
        let fallback = known.get(known.len() / 2).copied().unwrap_or(0.0);

        let edges = (0..n)
            .map(|i| {
                let thickness = hint
                    .wall_thicknesses_px
                    .get(i)
                    .copied()
                    .filter(|t| t.is_finite() && *t > 0.0)
                    .unwrap_or(fallback);
                (hint.polygon[i], hint.polygon[(i + 1) % n], thickness + margin)
            })
            .collect();
        Self { edges }
    }

    fn contains(&self, x: u32, y: u32) -> bool {
        let p = Point2D::new(x as f64 + 0.5, y as f64 + 0.5);
        self.edges
            .iter()
            .any(|(a, b, reach)| point_to_segment_distance(&p, a, b) <= *reach)
    }
}

/// Preprocess `image` in place.
///
/// Returns the oriented wall masks when `options.envelope` is set.
pub fn preprocess_in_place(
    image: &mut RgbaImage,
    options: &PreprocessOptions,
) -> Result<Option<OrientedWallMasks>> {
    options.validate()?;
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return Err(Error::EmptyImage { width, height });
    }

    let h = &options.heuristics;
    let radius = h.erosion_radius_px(options.pixels_per_cm);
    let min_run = 2 * radius;
    let band = options
        .envelope
        .as_ref()
        .filter(|hint| hint.polygon.len() >= 2)
        .map(|hint| ProtectionBand::new(hint, h.protection_margin_px));

    let mut ink = PixelMask::new(width, height);
    for (x, y, pixel) in image.enumerate_pixels() {
        if luma(pixel) < h.paper_luma || saturation(pixel).0 > h.neutral_saturation_max {
            ink.set(x, y, 1);
        }
    }
    let h_runs = ink.horizontal_runs();
    let v_runs = ink.vertical_runs();

    // Bleach thin coloured ink; gather luma of everything that stays
    let mut grey = vec![0.0f64; width as usize * height as usize];
    let mut bleached = 0usize;
    let (mut lo, mut hi) = (f64::INFINITY, f64::NEG_INFINITY);
    for (x, y, pixel) in image.enumerate_pixels_mut() {
        let idx = ink.index(x, y);
        let thin = ink.is_wall(x, y) && h_runs[idx].min(v_runs[idx]) < min_run;
        if thin
            && saturation(pixel).0 > h.neutral_saturation_max
            && !band.as_ref().is_some_and(|b| b.contains(x, y))
        {
            *pixel = PAPER;
            grey[idx] = 255.0;
            bleached += 1;
            continue;
        }
        let value = luma(pixel);
        grey[idx] = value;
        lo = lo.min(value);
        hi = hi.max(value);
    }

    let scale = if hi - lo > f64::EPSILON {
        255.0 / (hi - lo)
    } else {
        1.0
    };
    let offset = if hi - lo > f64::EPSILON { lo } else { 0.0 };
    for (x, y, pixel) in image.enumerate_pixels_mut() {
        let idx = ink.index(x, y);
        if *pixel == PAPER && grey[idx] >= 255.0 {
            continue;
        }
        let value = ((grey[idx] - offset) * scale).round().clamp(0.0, 255.0);
        grey[idx] = value;
        let v = value as u8;
        *pixel = Rgba([v, v, v, 255]);
    }

    debug!(radius, bleached, lo, hi, "preprocessed plan image");

    if band.is_none() {
        return Ok(None);
    }
    Ok(Some(oriented_masks(&grey, width, height, min_run, h.oriented_wall_luma)))
}

fn oriented_masks(
    grey: &[f64],
    width: u32,
    height: u32,
    min_run: u32,
    wall_luma: f64,
) -> OrientedWallMasks {
    let mut walls = PixelMask::new(width, height);
    for (value, cell) in grey.iter().zip(walls.data_mut()) {
        *cell = u8::from(*value < wall_luma);
    }
    let h_runs = walls.horizontal_runs();
    let v_runs = walls.vertical_runs();

    let mut h_walls = PixelMask::new(width, height);
    let mut v_walls = PixelMask::new(width, height);
    for (idx, (&hr, &vr)) in h_runs.iter().zip(&v_runs).enumerate() {
        if hr >= vr && hr >= min_run && hr > 0 {
            h_walls.data_mut()[idx] = 1;
        }
        if vr >= hr && vr >= min_run && vr > 0 {
            v_walls.data_mut()[idx] = 1;
        }
    }
    OrientedWallMasks { h_walls, v_walls }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RED: Rgba<u8> = Rgba([230, 20, 20, 255]);
    const BLACK: Rgba<u8> = Rgba([0, 0, 0, 255]);

    /// 60x60 plan: thick black wall rows 10..20, thin red line on row 40,
    /// thin black line on row 50, thick red block at (40..50, 22..32)
    fn plan() -> RgbaImage {
        RgbaImage::from_fn(60, 60, |x, y| {
            if (10..20).contains(&y) || y == 50 {
                BLACK
            } else if y == 40 || ((40..50).contains(&x) && (22..32).contains(&y)) {
                RED
            } else {
                PAPER
            }
        })
    }

    #[test]
    fn test_bleaches_thin_coloured_ink_only() {
        let source = plan();
        let out = preprocess_for_room_detection(&source, &PreprocessOptions::new(1.0)).unwrap();
        assert!(out.oriented.is_none());
        assert_eq!(*out.image.get_pixel(30, 40), PAPER);
        assert_eq!(*out.image.get_pixel(30, 50), BLACK);
        assert_eq!(*out.image.get_pixel(30, 15), BLACK);
        // Thick coloured fill survives as grey
        let kept = out.image.get_pixel(45, 27);
        assert_ne!(*kept, PAPER);
        assert_eq!(kept.0[0], kept.0[1]);
        // Caller's raster is untouched
        assert_eq!(*source.get_pixel(30, 40), RED);
    }

    #[test]
    fn test_envelope_band_protects_thin_ink() {
        let hint = EnvelopeHint {
            polygon: vec![
                Point2D::new(5.0, 40.5),
                Point2D::new(55.0, 40.5),
                Point2D::new(55.0, 58.0),
                Point2D::new(5.0, 58.0),
            ],
            wall_thicknesses_px: vec![1.0],
        };
        let options = PreprocessOptions::new(1.0).with_envelope(hint);
        let out = preprocess_for_room_detection(&plan(), &options).unwrap();
        assert_ne!(*out.image.get_pixel(30, 40), PAPER);
        // Outside the band the red line is still bleached
        assert_eq!(*out.image.get_pixel(0, 40), PAPER);
    }

    #[test]
    fn test_oriented_masks() {
        let mut image = plan();
        for y in 25..58 {
            for x in 5..12 {
                image.put_pixel(x, y, BLACK);
            }
        }
        let hint = EnvelopeHint {
            polygon: vec![Point2D::new(0.0, 0.0), Point2D::new(59.0, 0.0)],
            wall_thicknesses_px: Vec::new(),
        };
        let options = PreprocessOptions::new(1.0).with_envelope(hint);
        let masks = preprocess_in_place(&mut image, &options).unwrap().unwrap();
        assert!(masks.h_walls.is_wall(30, 15));
        assert!(!masks.v_walls.is_wall(30, 15));
        assert!(masks.v_walls.is_wall(8, 35));
        assert!(!masks.h_walls.is_wall(8, 35));
    }

    #[test]
    fn test_contrast_stretch() {
        let mut image = RgbaImage::from_fn(20, 20, |x, _| {
            if x < 10 {
                Rgba([100, 100, 100, 255])
            } else {
                Rgba([200, 200, 200, 255])
            }
        });
        preprocess_in_place(&mut image, &PreprocessOptions::new(0.5)).unwrap();
        assert_eq!(image.get_pixel(0, 0).0[0], 0);
        assert_eq!(image.get_pixel(15, 0).0[0], 255);
    }

    #[test]
    fn test_rejects_bad_scale() {
        let image = plan();
        assert!(matches!(
            preprocess_for_room_detection(&image, &PreprocessOptions::new(-1.0)),
            Err(Error::InvalidScale(_))
        ));
    }
}
