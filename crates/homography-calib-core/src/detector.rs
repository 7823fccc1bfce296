use crate::image::GrayImageView;
use nalgebra::Point2;

/// Why a grid could not be found. Detection failure is data, not a fault.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum DetectionFailure {
    #[error("too few corner candidates (need {needed}, found {found})")]
    TooFewCandidates { needed: usize, found: usize },
    #[error("no consistent {rows}x{cols} inner-corner grid found")]
    NoGrid { rows: u32, cols: u32 },
    #[error("invalid grid shape {rows}x{cols}")]
    InvalidShape { rows: u32, cols: u32 },
    #[error("image buffer does not match {width}x{height}")]
    InvalidImage { width: usize, height: usize },
}

/// Seam to the corner-detection collaborator.
///
/// Implementations return the `rows * cols` inner corners in row-major
/// order, or a [`DetectionFailure`].
pub trait CornerDetector {
    fn detect(
        &self,
        image: &GrayImageView<'_>,
        rows: u32,
        cols: u32,
    ) -> Result<Vec<Point2<f32>>, DetectionFailure>;
}
