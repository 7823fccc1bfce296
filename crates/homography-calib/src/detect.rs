//! `image` / `chess-corners` glue: conversions and the shipped detector.

use crate::chessboard::{refine_corners, ChessboardDetector, ChessboardParams};
use crate::core::{self, CornerDetector, DetectionFailure};
use chess_corners::{find_chess_corners_image, ChessConfig, CornerDescriptor};
use nalgebra::Point2;

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Reasonable default settings for the `chess-corners` ChESS detector.
pub fn default_chess_config() -> ChessConfig {
    let mut cfg = ChessConfig::single_scale();
    cfg.params.threshold_rel = 0.2;
    cfg.params.nms_radius = 2;
    cfg
}

/// Borrow an `image::GrayImage` as the core view type.
pub fn gray_view(img: &::image::GrayImage) -> core::GrayImageView<'_> {
    core::GrayImageView {
        width: img.width() as usize,
        height: img.height() as usize,
        data: img.as_raw(),
    }
}

/// Take ownership of a decoded RGB8 image.
pub fn rgb_from_image(img: ::image::RgbImage) -> core::RgbImage {
    let (w, h) = img.dimensions();
    core::RgbImage {
        width: w as usize,
        height: h as usize,
        data: img.into_raw(),
    }
}

/// Copy a core RGB image into an `image::RgbImage` for encoding.
pub fn rgb_to_image(img: &core::RgbImage) -> Option<::image::RgbImage> {
    let w = u32::try_from(img.width).ok()?;
    let h = u32::try_from(img.height).ok()?;
    ::image::RgbImage::from_raw(w, h, img.data.clone())
}

fn adapt_chess_corner(c: &CornerDescriptor) -> core::Corner {
    core::Corner::new(c.x, c.y, c.response)
}

/// Detect raw ChESS corners and adapt them into [`core::Corner`].
#[cfg_attr(
    feature = "tracing",
    instrument(level = "info", skip(img, cfg), fields(width = img.width(), height = img.height()))
)]
pub fn detect_corners(img: &::image::GrayImage, cfg: &ChessConfig) -> Vec<core::Corner> {
    find_chess_corners_image(img, cfg)
        .iter()
        .map(adapt_chess_corner)
        .collect()
}

/// ChESS corners → row-major inner-corner grid → optional sub-pixel refinement.
pub struct ChessGridDetector {
    chess: ChessConfig,
    grid: ChessboardDetector,
}

impl ChessGridDetector {
    pub fn new(chess: ChessConfig, params: ChessboardParams) -> Self {
        Self {
            chess,
            grid: ChessboardDetector::new(params),
        }
    }

    pub fn params(&self) -> &ChessboardParams {
        &self.grid.params
    }
}

impl Default for ChessGridDetector {
    fn default() -> Self {
        Self::new(default_chess_config(), ChessboardParams::default())
    }
}

impl CornerDetector for ChessGridDetector {
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "info", skip(self, image), fields(width = image.width, height = image.height))
    )]
    fn detect(
        &self,
        image: &core::GrayImageView<'_>,
        rows: u32,
        cols: u32,
    ) -> Result<Vec<Point2<f32>>, DetectionFailure> {
        let invalid = DetectionFailure::InvalidImage {
            width: image.width,
            height: image.height,
        };
        let w = u32::try_from(image.width).map_err(|_| invalid.clone())?;
        let h = u32::try_from(image.height).map_err(|_| invalid.clone())?;
        let gray = ::image::GrayImage::from_raw(w, h, image.data.to_vec()).ok_or(invalid)?;

        let corners = detect_corners(&gray, &self.chess);
        log::debug!("{} ChESS corners", corners.len());
        let mut grid = self.grid.detect_from_corners(&corners, rows, cols)?;
        if let Some(subpix) = &self.grid.params.subpix {
            refine_corners(image, &mut grid, subpix);
        }
        Ok(grid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rgb_conversion_round_trips_pixels() {
        let mut img = ::image::RgbImage::new(3, 2);
        img.put_pixel(2, 1, ::image::Rgb([1, 2, 3]));
        let core_img = rgb_from_image(img.clone());
        assert_eq!(core_img.pixel(2, 1), [1, 2, 3]);
        assert_eq!(rgb_to_image(&core_img).expect("buffer"), img);
    }

    #[test]
    fn gray_view_borrows_the_buffer() {
        let img = ::image::GrayImage::from_raw(2, 2, vec![1, 2, 3, 4]).expect("buffer");
        let view = gray_view(&img);
        assert_eq!((view.width, view.height), (2, 2));
        assert_eq!(view.data, &[1, 2, 3, 4]);
    }

    #[test]
    fn mismatched_buffer_is_an_invalid_image() {
        let data = [0u8; 5];
        let view = core::GrayImageView {
            width: 3,
            height: 2,
            data: &data,
        };
        let err = ChessGridDetector::default().detect(&view, 7, 7).unwrap_err();
        assert_eq!(err, DetectionFailure::InvalidImage { width: 3, height: 2 });
    }

    #[test]
    fn blank_image_has_no_grid() {
        let img = ::image::GrayImage::from_pixel(64, 64, ::image::Luma([128]));
        assert!(ChessGridDetector::default()
            .detect(&gray_view(&img), 7, 7)
            .is_err());
    }
}
