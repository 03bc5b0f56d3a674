// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Region extraction: seeded and border-seeded flood fills

use crate::types::PixelMask;
use std::collections::VecDeque;
use tracing::warn;

/// Outcome of a bounded seed fill
#[derive(Debug, Clone)]
pub struct FloodFill {
    /// Filled pixels set to 1
    pub mask: PixelMask,
    pub pixel_count: usize,
    /// Growth stopped because `pixel_count` passed the budget; the mask is partial
    pub budget_exceeded: bool,
}

impl FloodFill {
    /// `true` when the fill produced a usable region
    pub fn is_valid(&self) -> bool {
        self.pixel_count > 0 && !self.budget_exceeded
    }
}

const NEIGHBORS_4: [(i64, i64); 4] = [(1, 0), (-1, 0), (0, 1), (0, -1)];

/// 4-connected fill over open pixels from the seed `(x, y)`.
///
/// An out-of-bounds or wall seed yields an empty fill. Growth aborts once
/// more than `max_pixels` pixels are filled.
pub fn flood_fill(mask: &PixelMask, x: i64, y: i64, max_pixels: usize) -> FloodFill {
    let mut filled = PixelMask::new(mask.width(), mask.height());
    if !mask.in_bounds(x, y) || mask.is_wall(x as u32, y as u32) {
        return FloodFill {
            mask: filled,
            pixel_count: 0,
            budget_exceeded: false,
        };
    }

    let mut pixel_count = 0usize;
    let mut stack = vec![(x as u32, y as u32)];
    filled.set(x as u32, y as u32, 1);

    while let Some((cx, cy)) = stack.pop() {
        pixel_count += 1;
        if pixel_count > max_pixels {
            warn!(max_pixels, seed_x = x, seed_y = y, "flood fill exceeded its budget");
            return FloodFill {
                mask: filled,
                pixel_count,
                budget_exceeded: true,
            };
        }

        for (dx, dy) in NEIGHBORS_4 {
            let nx = cx as i64 + dx;
            let ny = cy as i64 + dy;
            if !mask.in_bounds(nx, ny) {
                continue;
            }
            let (nx, ny) = (nx as u32, ny as u32);
            if mask.is_wall(nx, ny) || filled.is_wall(nx, ny) {
                continue;
            }
            filled.set(nx, ny, 1);
            stack.push((nx, ny));
        }
    }

    FloodFill {
        mask: filled,
        pixel_count,
        budget_exceeded: false,
    }
}

/// Mark every open pixel reachable from the image border as exterior (1)
pub fn flood_fill_from_border(mask: &PixelMask) -> PixelMask {
    let (width, height) = (mask.width(), mask.height());
    let mut exterior = PixelMask::new(width, height);
    if width == 0 || height == 0 {
        return exterior;
    }

    let mut queue = VecDeque::new();
    let mut seed = |x: u32, y: u32, exterior: &mut PixelMask| {
        if !mask.is_wall(x, y) && !exterior.is_wall(x, y) {
            exterior.set(x, y, 1);
            queue.push_back((x, y));
        }
    };
    for x in 0..width {
        seed(x, 0, &mut exterior);
        seed(x, height - 1, &mut exterior);
    }
    for y in 0..height {
        seed(0, y, &mut exterior);
        seed(width - 1, y, &mut exterior);
    }

    while let Some((cx, cy)) = queue.pop_front() {
        for (dx, dy) in NEIGHBORS_4 {
            let nx = cx as i64 + dx;
            let ny = cy as i64 + dy;
            if !mask.in_bounds(nx, ny) {
                continue;
            }
            let (nx, ny) = (nx as u32, ny as u32);
            if mask.is_wall(nx, ny) || exterior.is_wall(nx, ny) {
                continue;
            }
            exterior.set(nx, ny, 1);
            queue.push_back((nx, ny));
        }
    }

    exterior
}

/// Turn a wall outline into a solid silhouette: enclosed open space becomes wall
pub fn fill_interior_holes(mask: &mut PixelMask) {
    let exterior = flood_fill_from_border(mask);
    for (value, outside) in mask.data_mut().iter_mut().zip(exterior.data()) {
        if *outside == 0 {
            *value = 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 80x80 mask with a solid 3px ring spanning (5,5)..(75,75)
    fn ring_mask() -> PixelMask {
        let mut mask = PixelMask::new(80, 80);
        for y in 5..75 {
            for x in 5..75 {
                let inside = (8..72).contains(&x) && (8..72).contains(&y);
                if !inside {
                    mask.set(x, y, 1);
                }
            }
        }
        mask
    }

    #[test]
    fn test_fill_matches_interior_area_exactly() {
        let mask = ring_mask();
        let fill = flood_fill(&mask, 40, 40, usize::MAX);
        assert_eq!(fill.pixel_count, 64 * 64);
        assert!(fill.is_valid());
        assert_eq!(fill.mask.wall_count(), 64 * 64);
        for y in 0..80 {
            for x in 0..80 {
                let inside = (8..72).contains(&x) && (8..72).contains(&y);
                assert_eq!(fill.mask.is_wall(x, y), inside, "pixel ({x}, {y})");
            }
        }
    }

    #[test]
    fn test_fill_on_wall_or_outside_is_empty() {
        let mask = ring_mask();
        let on_wall = flood_fill(&mask, 6, 6, usize::MAX);
        assert_eq!(on_wall.pixel_count, 0);
        assert_eq!(on_wall.mask.wall_count(), 0);
        assert!(!on_wall.is_valid());

        let outside = flood_fill(&mask, -3, 200, usize::MAX);
        assert_eq!(outside.pixel_count, 0);
    }

    #[test]
    fn test_fill_budget() {
        let mask = ring_mask();
        let fill = flood_fill(&mask, 40, 40, 100);
        assert!(fill.budget_exceeded);
        assert!(fill.pixel_count > 100);
        assert!(!fill.is_valid());
    }

    #[test]
    fn test_border_fill_and_holes() {
        let mut mask = ring_mask();
        let exterior = flood_fill_from_border(&mask);
        assert!(exterior.is_wall(0, 0));
        assert!(exterior.is_wall(77, 40));
        assert!(!exterior.is_wall(40, 40));
        assert!(!exterior.is_wall(6, 6));

        fill_interior_holes(&mut mask);
        assert_eq!(mask.wall_count(), 70 * 70);
        assert!(mask.is_wall(40, 40));
        assert!(!mask.is_wall(2, 2));
    }
}
