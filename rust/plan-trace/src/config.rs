// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Detection options and the numeric heuristics behind every stage

use crate::error::{Error, Result};
use crate::types::{PixelBox, Point2D};
use serde::{Deserialize, Serialize};

/// Tunable thresholds used across the pipeline.
///
/// Lengths suffixed `_cm` are physical and scaled by `pixels_per_cm` at call
/// time; `_px` values are absolute pixel counts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Heuristics {
    /// Luma below which a pixel is wall in the fixed-threshold mask. Default: 128
    pub binary_threshold: f64,

    /// Gray band used by `build_default_gray_wall_mask`. Default: 80..=210
    pub gray_low: u8,
    pub gray_high: u8,

    /// Histogram bins at or below this are black text/lines. Default: 40
    pub histogram_dark_cutoff: u8,
    /// Histogram bins at or above this are paper. Default: 230
    pub histogram_light_cutoff: u8,
    /// Minimum share of all pixels the mid-tone peak must hold. Default: 0.01
    pub histogram_min_peak_fraction: f64,
    /// The detected range extends while the histogram stays above this share of the peak.
    /// Default: 0.1
    pub histogram_bracket_fraction: f64,

    /// HSV saturation that makes a dark pixel a coloured wall fill. Default: 0.35
    pub saturation_min: f64,
    /// Max channel a saturated dark pixel needs to count as wall. Default: 80
    pub saturated_channel_min: u8,

    /// Luma at or above which the preprocessor treats a pixel as paper. Default: 235
    pub paper_luma: f64,
    /// Saturation at or below which ink counts as neutral (never bleached). Default: 0.2
    pub neutral_saturation_max: f64,
    /// Preprocessor erosion radius per pixel-per-cm: `round(5/3 * ppc)`. Default: 5/3
    pub erosion_radius_cm: f64,
    /// Lower bound for the erosion radius. Default: 2
    pub min_erosion_radius_px: u32,
    /// Extra protection band around envelope edges beyond their thickness. Default: 3
    pub protection_margin_px: f64,
    /// Luma below which the normalised image counts as wall for oriented masks. Default: 160
    pub oriented_wall_luma: f64,

    /// Widest opening (door) the room closing should seal. Default: 100 cm
    pub closing_gap_cm: f64,
    /// Widest opening the envelope closing should seal. Default: 120 cm
    pub envelope_closing_gap_cm: f64,
    /// Wall components smaller than this are treated as text/markup. Default: 400 cm2
    pub min_component_cm2: f64,
    /// Lower bound for the component filter. Default: 4 px
    pub min_component_px: usize,

    /// Douglas-Peucker tolerance for traced contours. Default: 1.5 px
    pub simplify_epsilon_px: f64,
    /// Edges within this angle of an axis are snapped. Default: 8 degrees
    pub snap_tolerance_deg: f64,
    /// Rectangular tabs at most this deep are removed. Default: 15 cm
    pub micro_bump_depth_cm: f64,

    /// Distance between thickness probes along an edge; must be positive. Default: 4 px
    pub probe_spacing_px: f64,
    /// Open pixels a probe may cross before reaching the wall band. Default: 2
    pub probe_lead_px: u32,
    /// Longest wall band a probe follows. Default: 100 cm
    pub probe_max_cm: f64,
    /// Lower bound on probe length. Default: 8 px
    pub probe_min_px: u32,
    /// Fraction trimmed from both ends of an edge before probing. Default: 0.15
    pub probe_end_margin: f64,
    /// Luma below which a probed pixel is wall. Default: 215
    pub probe_wall_luma: f64,

    /// Dash length that still merges door gap runs. Default: 10 cm
    pub max_dash_cm: f64,
    /// Span a merged dashed opening must reach. Default: 45 cm
    pub min_gap_cm: f64,
    /// Narrowest unmerged gap run reported. Default: 2 px
    pub min_single_gap_px: u32,

    /// Shortest run considered a spanning-wall candidate. Default: 150 cm
    pub min_span_cm: f64,
    /// Gaps bridged while collecting candidate runs. Default: 100 cm
    pub span_bridge_cm: f64,
    /// Share of the local building extent a spanning wall must cover. Default: 0.75
    pub span_coverage: f64,
    /// Longest gap allowed on a spanning wall centre line. Default: 2 px
    pub continuity_tolerance_px: u32,
    /// Probes longer than this multiple of the lower-quartile probe are perpendicular walls.
    /// Must be at least 1. Default: 2.0
    pub perpendicular_exclusion: f64,
    /// Share of probes seeing outside the building that marks a boundary band. Default: 0.5
    pub flush_fraction: f64,

    /// Stricter open-pixel threshold for refined envelope passes. Default: 200
    pub refined_wall_threshold: f64,
    /// Margin added around the refinement box. Default: 4 px
    pub refined_bbox_margin_px: u32,
}

impl Default for Heuristics {
    fn default() -> Self {
        Self {
            binary_threshold: 128.0,
            gray_low: 80,
            gray_high: 210,
            histogram_dark_cutoff: 40,
            histogram_light_cutoff: 230,
            histogram_min_peak_fraction: 0.01,
            histogram_bracket_fraction: 0.1,
            saturation_min: 0.35,
            saturated_channel_min: 80,
            paper_luma: 235.0,
            neutral_saturation_max: 0.2,
            erosion_radius_cm: 5.0 / 3.0,
            min_erosion_radius_px: 2,
            protection_margin_px: 3.0,
            oriented_wall_luma: 160.0,
            closing_gap_cm: 100.0,
            envelope_closing_gap_cm: 120.0,
            min_component_cm2: 400.0,
            min_component_px: 4,
            simplify_epsilon_px: 1.5,
            snap_tolerance_deg: 8.0,
            micro_bump_depth_cm: 15.0,
            probe_spacing_px: 4.0,
            probe_lead_px: 2,
            probe_max_cm: 100.0,
            probe_min_px: 8,
            probe_end_margin: 0.15,
            probe_wall_luma: 215.0,
            max_dash_cm: 10.0,
            min_gap_cm: 45.0,
            min_single_gap_px: 2,
            min_span_cm: 150.0,
            span_bridge_cm: 100.0,
            span_coverage: 0.75,
            continuity_tolerance_px: 2,
            perpendicular_exclusion: 2.0,
            flush_fraction: 0.5,
            refined_wall_threshold: 200.0,
            refined_bbox_margin_px: 4,
        }
    }
}

impl Heuristics {
    /// Preprocessor erosion radius: `max(2, round(5/3 * ppc))`
    pub fn erosion_radius_px(&self, pixels_per_cm: f64) -> u32 {
        ((self.erosion_radius_cm * pixels_per_cm).round() as u32).max(self.min_erosion_radius_px)
    }

    /// Longest wall dash merged into a dashed opening: `max(1, round(10 * ppc))`
    pub fn max_dash_px(&self, pixels_per_cm: f64) -> u32 {
        ((self.max_dash_cm * pixels_per_cm).round() as u32).max(1)
    }

    /// Span a merged opening must reach: `max(2, round(45 * ppc))`
    pub fn min_gap_px(&self, pixels_per_cm: f64) -> u32 {
        ((self.min_gap_cm * pixels_per_cm).round() as u32).max(2)
    }

    /// Component filter threshold in pixels
    pub fn min_component_area_px(&self, pixels_per_cm: f64) -> usize {
        ((self.min_component_cm2 * pixels_per_cm * pixels_per_cm).round() as usize)
            .max(self.min_component_px)
    }

    /// Maximum probe length in pixels
    pub fn probe_max_px(&self, pixels_per_cm: f64) -> u32 {
        ((self.probe_max_cm * pixels_per_cm).ceil() as u32).max(self.probe_min_px)
    }

    /// Reject values the detectors cannot run with, e.g. from a JSON override
    pub fn validate(&self) -> Result<()> {
        let checks = [
            ("probe_spacing_px", self.probe_spacing_px, self.probe_spacing_px > 0.0),
            (
                "perpendicular_exclusion",
                self.perpendicular_exclusion,
                self.perpendicular_exclusion >= 1.0,
            ),
            (
                "probe_end_margin",
                self.probe_end_margin,
                (0.0..0.5).contains(&self.probe_end_margin),
            ),
            ("simplify_epsilon_px", self.simplify_epsilon_px, self.simplify_epsilon_px >= 0.0),
        ];
        for (name, value, ok) in checks {
            if !ok || !value.is_finite() {
                return Err(Error::InvalidHeuristic { name, value });
            }
        }
        Ok(())
    }
}

/// Whether an envelope pass starts from scratch or refines a known box
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
#[serde(tag = "mode", rename_all = "camelCase")]
pub enum DetectionMode {
    #[default]
    Fresh,
    /// Second pass restricted to a previously detected bounding box
    Refined { bbox: PixelBox },
}

/// Per-call detection options
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DetectionOptions {
    /// Resolution scale; drives every size-dependent threshold
    pub pixels_per_cm: f64,
    /// Largest room area a seed fill may grow to (cm2). Default: 5,000,000 (500 m2)
    pub max_area_cm2: f64,
    /// Spanning wall thickness bounds (cm). Default: 10..=60
    pub min_thickness_cm: f64,
    pub max_thickness_cm: f64,
    pub mode: DetectionMode,
    pub heuristics: Heuristics,
}

impl Default for DetectionOptions {
    fn default() -> Self {
        Self {
            pixels_per_cm: 0.5,
            max_area_cm2: 5_000_000.0,
            min_thickness_cm: 10.0,
            max_thickness_cm: 60.0,
            mode: DetectionMode::Fresh,
            heuristics: Heuristics::default(),
        }
    }
}

impl DetectionOptions {
    pub fn new(pixels_per_cm: f64) -> Self {
        Self {
            pixels_per_cm,
            ..Default::default()
        }
    }

    /// Reject scales and heuristics no detector can work with
    pub fn validate(&self) -> Result<()> {
        validate_scale(self.pixels_per_cm)?;
        self.heuristics.validate()
    }

    /// Flood fill budget: `max_area_cm2 * ppc^2`
    pub fn max_pixels(&self) -> usize {
        (self.max_area_cm2 * self.pixels_per_cm * self.pixels_per_cm).round() as usize
    }
}

fn validate_scale(pixels_per_cm: f64) -> Result<()> {
    if pixels_per_cm.is_finite() && pixels_per_cm > 0.0 {
        Ok(())
    } else {
        Err(Error::InvalidScale(pixels_per_cm))
    }
}

/// Known envelope geometry handed to the preprocessor
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EnvelopeHint {
    /// Envelope polygon in pixel space
    pub polygon: Vec<Point2D>,
    /// Wall thickness per polygon edge in pixels (missing entries use the median)
    pub wall_thicknesses_px: Vec<f64>,
}

/// Options for `preprocess_for_room_detection`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PreprocessOptions {
    pub pixels_per_cm: f64,
    pub envelope: Option<EnvelopeHint>,
    #[serde(default)]
    pub heuristics: Heuristics,
}

impl PreprocessOptions {
    pub fn new(pixels_per_cm: f64) -> Self {
        Self {
            pixels_per_cm,
            envelope: None,
            heuristics: Heuristics::default(),
        }
    }

    pub fn with_envelope(mut self, envelope: EnvelopeHint) -> Self {
        self.envelope = Some(envelope);
        self
    }

    pub fn validate(&self) -> Result<()> {
        validate_scale(self.pixels_per_cm)?;
        self.heuristics.validate()
    }
}
