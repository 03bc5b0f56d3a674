// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Error types for malformed detection input.
//!
//! Expected detection failures (seed on a wall, empty image, fill over budget)
//! are reported as `None` or empty collections, never through this type.

use thiserror::Error;

/// Result type for plan-trace operations
pub type Result<T> = std::result::Result<T, Error>;

/// Hard errors: inputs no geometric heuristic can recover from
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("RGBA buffer holds {actual} bytes, expected {expected} for {width}x{height}")]
    BufferSize {
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },

    #[error("image has zero area ({width}x{height})")]
    EmptyImage { width: u32, height: u32 },

    #[error("mask is {actual_width}x{actual_height}, expected {width}x{height}")]
    MaskSize {
        width: u32,
        height: u32,
        actual_width: u32,
        actual_height: u32,
    },

    #[error("pixels_per_cm must be finite and positive, got {0}")]
    InvalidScale(f64),

    #[error("heuristic {name} is out of range: {value}")]
    InvalidHeuristic { name: &'static str, value: f64 },
}
