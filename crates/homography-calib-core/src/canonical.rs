//! Canonical frame for reference-image detections.
//!
//! The reference template may be printed or scanned in any of the eight
//! square symmetries; the operator fixes that by rotating / flipping the
//! canonical frame. Rotation is applied first, flip second.

use nalgebra::Point2;
use serde::{Deserialize, Serialize};

/// Operator-controlled rotation count and flip flag.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalTransform {
    pub rotate_count: u32,
    pub flip: bool,
}

impl CanonicalTransform {
    pub fn new(rotate_count: u32, flip: bool) -> Self {
        Self { rotate_count, flip }
    }

    /// Number of 90° turns actually applied (`rotate_count mod 4`).
    #[inline]
    pub fn quarter_turns(&self) -> u32 {
        self.rotate_count % 4
    }

    /// The transform after one more 90° rotation.
    pub fn rotated(self) -> Self {
        Self {
            rotate_count: self.rotate_count.wrapping_add(1),
            ..self
        }
    }

    /// The transform with the flip flag toggled.
    pub fn flipped(self) -> Self {
        Self {
            flip: !self.flip,
            ..self
        }
    }

    #[inline]
    pub fn apply(&self, raw: Point2<f64>, canonical_size: f64) -> Point2<f64> {
        let (x, y) = apply_transform(raw.x, raw.y, self.rotate_count, self.flip, canonical_size);
        Point2::new(x, y)
    }

    /// Operator-facing summary, e.g. `Rotation: 1 × 90°, Flip: Off`.
    pub fn describe(&self) -> String {
        format!(
            "Rotation: {} × 90°, Flip: {}",
            self.quarter_turns(),
            if self.flip { "On" } else { "Off" }
        )
    }
}

/// Map a raw detected coordinate into canonical space.
pub fn apply_transform(
    raw_x: f64,
    raw_y: f64,
    rotate_count: u32,
    flip: bool,
    size: f64,
) -> (f64, f64) {
    let (x, y) = match rotate_count % 4 {
        1 => (size - raw_y, raw_x),
        2 => (size - raw_x, size - raw_y),
        3 => (raw_y, size - raw_x),
        _ => (raw_x, raw_y),
    };
    if flip {
        (x, size - y)
    } else {
        (x, y)
    }
}
