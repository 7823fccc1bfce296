use serde::{Deserialize, Serialize};

/// Grid recovery parameters.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ChessboardParams {
    /// Minimal corner strength to consider.
    pub min_strength: f32,

    /// Maximal distance between a predicted grid node and the candidate it
    /// snaps to, as a fraction of the estimated corner spacing.
    pub snap_tolerance: f32,

    /// Two candidates belong to the same board cluster when closer than
    /// this multiple of the estimated spacing.
    pub cluster_link_ratio: f32,

    /// Sub-pixel refinement; `None` keeps the candidate positions.
    pub subpix: Option<SubPixParams>,
}

impl Default for ChessboardParams {
    fn default() -> Self {
        Self {
            min_strength: 0.0,
            snap_tolerance: 0.35,
            cluster_link_ratio: 1.5,
            subpix: Some(SubPixParams::default()),
        }
    }
}

/// Gradient-based saddle refinement around each recovered corner.
#[derive(Clone, Copy, Debug, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct SubPixParams {
    /// Search window is `(2 * half_window + 1)²` pixels.
    pub half_window: u32,
    pub max_iters: u32,
    /// Stop once an update moves the corner less than this many pixels.
    pub epsilon: f32,
}

impl Default for SubPixParams {
    fn default() -> Self {
        Self {
            half_window: 5,
            max_iters: 30,
            epsilon: 1e-2,
        }
    }
}
