use nalgebra::Point2;
use serde::{Deserialize, Serialize};

/// Raw X-junction candidate as produced by a corner response detector.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Corner {
    /// Sub-pixel position in image pixels.
    pub position: Point2<f32>,
    /// Detector response; larger is more corner-like.
    pub strength: f32,
}

impl Corner {
    pub fn new(x: f32, y: f32, strength: f32) -> Self {
        Self {
            position: Point2::new(x, y),
            strength,
        }
    }
}
