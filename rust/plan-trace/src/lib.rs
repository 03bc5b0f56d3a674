// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Raster-to-vector floor plan digitizer
//!
//! This crate turns a rasterized architectural drawing into building geometry:
//! 1. Room polygons from a single seed click, with door gaps
//! 2. The outer building envelope
//! 3. Interior walls that span the building
//! 4. Per-edge wall thickness in pixels and centimetres
//!
//! Every size-dependent threshold is derived from the drawing scale
//! (`pixels_per_cm`), so the same heuristics work across render resolutions.
//!
//! # Usage
//!
//! ```rust,ignore
//! use plan_trace::{
//!     detect_envelope, detect_room_at_pixel, detect_spanning_walls, DetectionOptions,
//! };
//!
//! let options = DetectionOptions::new(0.5);
//! let room = detect_room_at_pixel(&image, 420, 310, &options)?;
//!
//! if let Some(envelope) = detect_envelope(&image, &options)? {
//!     let walls = detect_spanning_walls(
//!         &image,
//!         &envelope.wall_mask,
//!         &envelope.building_mask,
//!         &options,
//!         None,
//!     )?;
//! }
//! ```

pub mod config;
pub mod contour;
pub mod envelope;
pub mod error;
pub mod mask;
pub mod metrology;
pub mod morphology;
pub mod preprocess;
pub mod region;
pub mod room;
pub mod spanning;
pub mod types;

// Re-export commonly used types and functions
pub use config::{DetectionMode, DetectionOptions, EnvelopeHint, Heuristics, PreprocessOptions};
pub use envelope::detect_envelope;
pub use error::{Error, Result};
pub use metrology::{detect_door_gaps, detect_wall_thickness, ProbeSide};
pub use preprocess::{
    preprocess_for_room_detection, preprocess_in_place, OrientedWallMasks, Preprocessed,
};
pub use room::detect_room_at_pixel;
pub use spanning::detect_spanning_walls;
pub use types::{
    raster_from_rgba, DoorGap, EdgeThickness, EnvelopeDetection, Orientation, PixelBox,
    PixelMask, Point2D, Rejection, RejectionReason, RoomDetection, SpanningWall, WallThickness,
};
