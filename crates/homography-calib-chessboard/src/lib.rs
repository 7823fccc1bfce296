//! Plain chessboard grid recovery built on top of `homography-calib-core`.
//!
//! ## Quickstart
//!
//! ```
//! use homography_calib_chessboard::{ChessboardDetector, ChessboardParams};
//! use homography_calib_core::Corner;
//!
//! let detector = ChessboardDetector::new(ChessboardParams::default());
//! let corners: Vec<Corner> = Vec::new();
//! assert!(detector.detect_from_corners(&corners, 7, 7).is_err());
//! ```
//!
//! Algorithm:
//! 1. Filter candidates by strength.
//! 2. Estimate the corner spacing from nearest-neighbor distances.
//! 3. Keep the largest cluster of candidates linked at about one spacing.
//! 4. Take the four extreme candidates of the cluster as the outer grid
//!    corners and predict every inner node through a 4-point homography.
//! 5. Snap each prediction to its nearest candidate; every node must snap,
//!    and to a distinct candidate.
//! 6. Refit the homography on all snapped nodes and snap again.
//! 7. Optionally refine each node to sub-pixel accuracy on the image.

mod detector;
mod params;
mod subpix;

pub use detector::ChessboardDetector;
pub use params::{ChessboardParams, SubPixParams};
pub use subpix::{refine_corner, refine_corners};
