//! Plan view (warp) and merged view (warp + composite).

use crate::homography::Homography;
use crate::image::{RgbImage, RgbImageView, BLACK};
use nalgebra::Point2;

#[cfg(feature = "tracing")]
use tracing::instrument;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ComposeError {
    #[error("homography not invertible")]
    NonInvertible,
    #[error("image size mismatch: {warped:?} vs {background:?}")]
    DimensionMismatch {
        warped: (usize, usize),
        background: (usize, usize),
    },
}

/// Warp `src` into an `out_w × out_h` frame through `h` (source → output).
///
/// Each output pixel is mapped back through `h⁻¹` and sampled bilinearly;
/// pixels whose preimage falls outside `src` stay pure black.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "info", skip(src, h), fields(src_w = src.width, src_h = src.height))
)]
pub fn warp(
    src: &RgbImageView<'_>,
    h: &Homography,
    out_w: usize,
    out_h: usize,
) -> Result<RgbImage, ComposeError> {
    let inv = h.inverse().ok_or(ComposeError::NonInvertible)?;
    let mut out = RgbImage::new(out_w, out_h);

    for y in 0..out_h {
        for x in 0..out_w {
            let Some(p) = inv.project(Point2::new(x as f64, y as f64)) else {
                continue;
            };
            if let Some(px) = src.sample_bilinear(p.x, p.y) {
                out.put_pixel(x, y, px);
            }
        }
    }

    Ok(out)
}

/// Replace every exact-black pixel of `warped` with the `background` pixel.
///
/// Black is the warp's "unmapped" marker, so genuinely black source content
/// is replaced as well.
pub fn composite_unmapped(
    warped: &mut RgbImage,
    background: &RgbImageView<'_>,
) -> Result<(), ComposeError> {
    if (warped.width, warped.height) != (background.width, background.height) {
        return Err(ComposeError::DimensionMismatch {
            warped: (warped.width, warped.height),
            background: (background.width, background.height),
        });
    }

    for (dst, bg) in warped
        .data
        .chunks_exact_mut(3)
        .zip(background.data.chunks_exact(3))
    {
        if dst[..] == BLACK[..] {
            dst.copy_from_slice(bg);
        }
    }
    Ok(())
}

/// Warp `src` into the frame of `dst` and fill unmapped pixels from `dst`.
pub fn merge(
    src: &RgbImageView<'_>,
    dst: &RgbImageView<'_>,
    h: &Homography,
) -> Result<RgbImage, ComposeError> {
    let mut merged = warp(src, h, dst.width, dst.height)?;
    composite_unmapped(&mut merged, dst)?;
    Ok(merged)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filled(w: usize, h: usize, px: [u8; 3]) -> RgbImage {
        let mut img = RgbImage::new(w, h);
        for y in 0..h {
            for x in 0..w {
                img.put_pixel(x, y, px);
            }
        }
        img
    }

    #[test]
    fn black_pixels_take_the_background() {
        let mut warped = RgbImage::new(2, 2);
        warped.put_pixel(1, 1, [10, 20, 30]);
        let mut background = filled(2, 2, [7, 7, 7]);
        background.put_pixel(0, 0, [5, 5, 5]);

        composite_unmapped(&mut warped, &background.view()).expect("same size");
        assert_eq!(warped.pixel(0, 0), [5, 5, 5]);
        assert_eq!(warped.pixel(1, 1), [10, 20, 30]);
        assert_eq!(warped.pixel(1, 0), [7, 7, 7]);
    }

    #[test]
    fn nearly_black_pixels_are_kept() {
        let mut warped = filled(1, 1, [0, 0, 1]);
        let background = filled(1, 1, [200, 200, 200]);
        composite_unmapped(&mut warped, &background.view()).expect("same size");
        assert_eq!(warped.pixel(0, 0), [0, 0, 1]);
    }

    #[test]
    fn size_mismatch_is_an_error() {
        let mut warped = RgbImage::new(2, 2);
        let background = RgbImage::new(3, 2);
        assert!(matches!(
            composite_unmapped(&mut warped, &background.view()),
            Err(ComposeError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn translation_warp_shifts_content_and_blackens_the_rest() {
        let src = filled(4, 4, [100, 150, 200]);
        let shift = Homography::from_array([[1.0, 0.0, 2.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]]);
        let out = warp(&src.view(), &shift, 6, 4).expect("invertible");

        assert_eq!(out.pixel(0, 0), BLACK);
        assert_eq!(out.pixel(1, 3), BLACK);
        assert_eq!(out.pixel(2, 0), [100, 150, 200]);
        assert_eq!(out.pixel(5, 3), [100, 150, 200]);
    }

    #[test]
    fn merge_fills_the_uncovered_region_from_destination() {
        let src = filled(2, 2, [100, 150, 200]);
        let dst = filled(4, 2, [1, 2, 3]);
        let merged = merge(&src.view(), &dst.view(), &Homography::identity()).expect("merge");
        assert_eq!(merged.pixel(1, 1), [100, 150, 200]);
        assert_eq!(merged.pixel(3, 0), [1, 2, 3]);
    }

    #[test]
    fn singular_matrix_cannot_warp() {
        let src = RgbImage::new(2, 2);
        let flat = Homography::from_array([[1.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, 1.0]]);
        assert_eq!(
            warp(&src.view(), &flat, 2, 2).unwrap_err(),
            ComposeError::NonInvertible
        );
    }
}
