// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Core types shared by every stage of the digitizer

use crate::error::{Error, Result};
use image::{GrayImage, Luma, RgbaImage};
use nalgebra::{Point2, Vector2};
use serde::{Deserialize, Serialize};

/// A 2D point in pixel space (simplified for serialization)
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Point2D {
    pub x: f64,
    pub y: f64,
}

impl Point2D {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn to_nalgebra(&self) -> Point2<f64> {
        Point2::new(self.x, self.y)
    }

    /// Vector from `self` to `other`
    pub fn vector_to(&self, other: &Point2D) -> Vector2<f64> {
        other.to_nalgebra() - self.to_nalgebra()
    }

    pub fn distance_to(&self, other: &Point2D) -> f64 {
        self.vector_to(other).norm()
    }
}

/// Orientation of a wall (or of the wall hosting a gap)
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    Horizontal,
    Vertical,
}

/// Inclusive pixel bounding box
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct PixelBox {
    pub min_x: u32,
    pub min_y: u32,
    pub max_x: u32,
    pub max_y: u32,
}

impl PixelBox {
    pub fn width(&self) -> u32 {
        self.max_x.saturating_sub(self.min_x) + 1
    }

    pub fn height(&self) -> u32 {
        self.max_y.saturating_sub(self.min_y) + 1
    }

    pub fn contains(&self, x: u32, y: u32) -> bool {
        x >= self.min_x && x <= self.max_x && y >= self.min_y && y <= self.max_y
    }

    /// Grow by `margin` on every side, clamped to a `width`x`height` image
    pub fn expanded(&self, margin: u32, width: u32, height: u32) -> Self {
        Self {
            min_x: self.min_x.saturating_sub(margin),
            min_y: self.min_y.saturating_sub(margin),
            max_x: (self.max_x + margin).min(width.saturating_sub(1)),
            max_y: (self.max_y + margin).min(height.saturating_sub(1)),
        }
    }
}

/// Binary pixel grid: 0 = open, 1 = wall
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelMask {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl PixelMask {
    /// All-open mask
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![0; width as usize * height as usize],
        }
    }

    pub fn from_vec(width: u32, height: u32, data: Vec<u8>) -> Result<Self> {
        let expected = width as usize * height as usize;
        if data.len() != expected {
            return Err(Error::BufferSize {
                width,
                height,
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            width,
            height,
            data: data.into_iter().map(|v| u8::from(v != 0)).collect(),
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    #[inline]
    pub fn index(&self, x: u32, y: u32) -> usize {
        y as usize * self.width as usize + x as usize
    }

    #[inline]
    pub fn get(&self, x: u32, y: u32) -> u8 {
        self.data[self.index(x, y)]
    }

    #[inline]
    pub fn is_wall(&self, x: u32, y: u32) -> bool {
        self.get(x, y) != 0
    }

    /// Bounds-checked lookup with signed coordinates; out of bounds reads as open
    #[inline]
    pub fn is_wall_at(&self, x: i64, y: i64) -> bool {
        self.in_bounds(x, y) && self.is_wall(x as u32, y as u32)
    }

    #[inline]
    pub fn in_bounds(&self, x: i64, y: i64) -> bool {
        x >= 0 && y >= 0 && x < self.width as i64 && y < self.height as i64
    }

    #[inline]
    pub fn set(&mut self, x: u32, y: u32, value: u8) {
        let idx = self.index(x, y);
        self.data[idx] = u8::from(value != 0);
    }

    pub fn wall_count(&self) -> usize {
        self.data.iter().filter(|&&v| v != 0).count()
    }

    /// Error unless `other` has the same dimensions
    pub fn ensure_same_size(&self, other: &PixelMask) -> Result<()> {
        if self.width != other.width || self.height != other.height {
            return Err(Error::MaskSize {
                width: self.width,
                height: self.height,
                actual_width: other.width,
                actual_height: other.height,
            });
        }
        Ok(())
    }

    /// Wall pixels as 255 for the imageproc operators
    pub fn to_gray(&self) -> GrayImage {
        GrayImage::from_fn(self.width, self.height, |x, y| {
            Luma([if self.is_wall(x, y) { 255 } else { 0 }])
        })
    }

    /// Non-zero intensity becomes wall
    pub fn from_gray(image: &GrayImage) -> Self {
        Self {
            width: image.width(),
            height: image.height(),
            data: image.pixels().map(|p| u8::from(p.0[0] != 0)).collect(),
        }
    }

    /// For every wall pixel, the length of the horizontal wall run through it (0 for open pixels)
    pub fn horizontal_runs(&self) -> Vec<u32> {
        let (w, h) = (self.width as usize, self.height as usize);
        let mut runs = vec![0u32; w * h];
        for y in 0..h {
            let row = y * w;
            let mut x = 0;
            while x < w {
                if self.data[row + x] == 0 {
                    x += 1;
                    continue;
                }
                let start = x;
                while x < w && self.data[row + x] != 0 {
                    x += 1;
                }
                let len = (x - start) as u32;
                runs[row + start..row + x].fill(len);
            }
        }
        runs
    }

    /// For every wall pixel, the length of the vertical wall run through it (0 for open pixels)
    pub fn vertical_runs(&self) -> Vec<u32> {
        let (w, h) = (self.width as usize, self.height as usize);
        let mut runs = vec![0u32; w * h];
        for x in 0..w {
            let mut y = 0;
            while y < h {
                if self.data[y * w + x] == 0 {
                    y += 1;
                    continue;
                }
                let start = y;
                while y < h && self.data[y * w + x] != 0 {
                    y += 1;
                }
                let len = (y - start) as u32;
                for yy in start..y {
                    runs[yy * w + x] = len;
                }
            }
        }
        runs
    }

    /// Bounding box of the wall pixels, `None` when the mask is empty
    pub fn bounding_box(&self) -> Option<PixelBox> {
        let mut bbox: Option<PixelBox> = None;
        for y in 0..self.height {
            for x in 0..self.width {
                if !self.is_wall(x, y) {
                    continue;
                }
                bbox = Some(match bbox {
                    None => PixelBox {
                        min_x: x,
                        min_y: y,
                        max_x: x,
                        max_y: y,
                    },
                    Some(b) => PixelBox {
                        min_x: b.min_x.min(x),
                        min_y: b.min_y.min(y),
                        max_x: b.max_x.max(x),
                        max_y: b.max_y.max(y),
                    },
                });
            }
        }
        bbox
    }
}

/// Wrap a raw RGBA byte buffer, rejecting malformed dimensions
pub fn raster_from_rgba(rgba: Vec<u8>, width: u32, height: u32) -> Result<RgbaImage> {
    if width == 0 || height == 0 {
        return Err(Error::EmptyImage { width, height });
    }
    let expected = width as usize * height as usize * 4;
    let actual = rgba.len();
    RgbaImage::from_raw(width, height, rgba).ok_or(Error::BufferSize {
        width,
        height,
        expected,
        actual,
    })
}

/// Thickness of a single polygon edge
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct EdgeThickness {
    /// Index of the edge `polygon[i] -> polygon[i + 1]` in the measured polygon
    pub edge_index: usize,
    pub thickness_px: f64,
    pub thickness_cm: f64,
}

/// Per-edge wall thickness plus the median over all measured edges
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct WallThickness {
    /// Only edges where wall pixels were found; indices stay tied to the measured polygon
    pub edges: Vec<EdgeThickness>,
    pub median_px: f64,
    pub median_cm: f64,
}

impl WallThickness {
    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    /// Thickness of edge `edge_index`, if it was measured
    pub fn for_edge(&self, edge_index: usize) -> Option<&EdgeThickness> {
        self.edges.iter().find(|e| e.edge_index == edge_index)
    }
}

/// Door or window opening located in a wall
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct DoorGap {
    pub midpoint: Point2D,
    /// Orientation of the wall the gap sits in
    pub orientation: Orientation,
    pub width_px: f64,
}

/// Interior wall dividing large portions of the building
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct SpanningWall {
    pub orientation: Orientation,
    /// Centre line start
    pub start: Point2D,
    /// Centre line end
    pub end: Point2D,
    pub thickness_px: f64,
    pub thickness_cm: f64,
}

impl SpanningWall {
    pub fn length(&self) -> f64 {
        self.start.distance_to(&self.end)
    }
}

/// Why a spanning-wall candidate was discarded
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(tag = "reason", content = "details", rename_all = "camelCase")]
pub enum RejectionReason {
    /// One side of the band lies outside the building silhouette
    #[serde(rename_all = "camelCase")]
    FlushWithBoundary { outside_fraction: f64 },
    /// The centre line is broken by a gap
    #[serde(rename_all = "camelCase")]
    Discontinuous { gap_px: u32 },
    /// Too short relative to the building extent at its position
    #[serde(rename_all = "camelCase")]
    Span { coverage: f64, local_extent_px: u32 },
    /// Measured thickness outside the configured bounds
    #[serde(rename_all = "camelCase")]
    Thickness { band_cm: f64 },
}

/// Diagnostic record for a rejected candidate
#[derive(Debug, Clone, Copy, Serialize, PartialEq)]
pub struct Rejection {
    pub orientation: Orientation,
    pub start: Point2D,
    pub end: Point2D,
    #[serde(flatten)]
    pub reason: RejectionReason,
}

/// Result of a single-click room detection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomDetection {
    /// Room boundary in pixel space
    pub polygon: Vec<Point2D>,
    /// Filled interior in pixels
    pub area_px: usize,
    pub thickness: WallThickness,
    pub gaps: Vec<DoorGap>,
    pub pixels_per_cm: f64,
}

/// Result of building envelope detection
#[derive(Debug, Clone, Serialize)]
pub struct EnvelopeDetection {
    /// Outer silhouette in pixel space
    pub polygon: Vec<Point2D>,
    pub thickness: WallThickness,
    /// Bounding box of the silhouette, reusable for a refined pass
    pub bbox: PixelBox,
    /// Conditioned wall mask, reusable by spanning-wall detection
    #[serde(skip)]
    pub wall_mask: PixelMask,
    /// Solid building footprint
    #[serde(skip)]
    pub building_mask: PixelMask,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_runs() {
        let mask = PixelMask::from_vec(
            4,
            3,
            vec![
                1, 1, 0, 1, //
                1, 0, 0, 1, //
                1, 0, 0, 0,
            ],
        )
        .unwrap();

        let h = mask.horizontal_runs();
        let v = mask.vertical_runs();

        assert_eq!(&h[0..4], &[2, 2, 0, 1]);
        assert_eq!(v[0], 3);
        assert_eq!(v[3], 2);
        assert_eq!(v[1], 1);
    }

    #[test]
    fn test_mask_size_checks() {
        assert!(PixelMask::from_vec(3, 3, vec![0; 8]).is_err());
        let a = PixelMask::new(3, 3);
        let b = PixelMask::new(3, 4);
        assert!(matches!(a.ensure_same_size(&b), Err(Error::MaskSize { .. })));
    }

    #[test]
    fn test_raster_from_rgba() {
        assert!(raster_from_rgba(vec![0; 16], 2, 2).is_ok());
        assert!(matches!(
            raster_from_rgba(vec![0; 15], 2, 2),
            Err(Error::BufferSize { expected: 16, actual: 15, .. })
        ));
        assert!(matches!(
            raster_from_rgba(Vec::new(), 0, 2),
            Err(Error::EmptyImage { .. })
        ));
    }

    #[test]
    fn test_bounding_box() {
        let mut mask = PixelMask::new(10, 10);
        assert!(mask.bounding_box().is_none());
        mask.set(2, 3, 1);
        mask.set(7, 5, 1);
        let bbox = mask.bounding_box().unwrap();
        assert_eq!((bbox.min_x, bbox.min_y, bbox.max_x, bbox.max_y), (2, 3, 7, 5));
        assert_eq!(bbox.width(), 6);
        assert!(bbox.contains(2, 5) && bbox.contains(7, 3));
        assert!(!bbox.contains(8, 4) && !bbox.contains(4, 2));

        let grown = bbox.expanded(3, 10, 10);
        assert_eq!((grown.min_x, grown.min_y, grown.max_x, grown.max_y), (0, 0, 9, 8));
    }

    #[test]
    fn test_rejection_serializes_reason_and_details() {
        let rejection = Rejection {
            orientation: Orientation::Horizontal,
            start: Point2D::new(0.0, 0.0),
            end: Point2D::new(10.0, 0.0),
            reason: RejectionReason::Thickness { band_cm: 4.5 },
        };
        let json = serde_json::to_value(rejection).unwrap();
        assert_eq!(json["reason"], "thickness");
        assert_eq!(json["details"]["bandCm"], 4.5);
    }
}
