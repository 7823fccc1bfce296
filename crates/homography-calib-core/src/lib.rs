//! Core types and utilities for two-image homography calibration.
//!
//! This crate is intentionally small and purely geometric. It does *not*
//! depend on any concrete corner detector, image codec or UI toolkit: the
//! detector is reached through [`CornerDetector`] and the homography solve
//! through [`HomographySolver`].
//!
//! ## API map
//! - [`CanonicalTransform`]: rotation/flip of raw detections into the
//!   reference frame.
//! - [`rainbow`]: deterministic marker colors.
//! - [`CorrespondenceStore`]: parallel source/destination point lists.
//! - [`HomographyEngine`]: store → matrix, plus literal-array export.
//! - [`warp`] / [`merge`]: plan view and merged view compositing.
//! - [`PointProbe`]: projection through a fixed matrix into physical units.

mod canonical;
mod color;
mod compose;
mod corner;
mod correspondence;
mod detector;
mod engine;
mod homography;
mod image;
mod logger;
mod probe;

pub use canonical::{apply_transform, CanonicalTransform};
pub use color::{hsv8_to_rgb, rainbow, END_HUE, MANUAL_PAIR_COLOR, PENDING_POINT_COLOR, START_HUE};
pub use compose::{composite_unmapped, merge, warp, ComposeError};
pub use corner::Corner;
pub use correspondence::{CorrespondenceStore, PairOrigin};
pub use detector::{CornerDetector, DetectionFailure};
pub use engine::{
    format_matrix, Degeneracy, ExportSyntax, HomographyEngine, HomographyError,
    HomographyEstimate, MIN_CORRESPONDENCES,
};
pub use homography::{
    estimate_homography, estimate_homography_ransac, homography_from_4pt, DltSolver, Homography,
    HomographySolver, RansacParams, RansacSolver, SolvedHomography,
};
pub use image::{sample_bilinear, GrayImage, GrayImageView, Rgb, RgbImage, RgbImageView, BLACK};
pub use probe::{project_point, PointProbe, ProbeError, ProbeReading};

#[cfg(feature = "tracing")]
pub use logger::init_tracing;

pub use logger::{filter_directive, init_with_level, level_for_verbosity, LOG_ENV};
