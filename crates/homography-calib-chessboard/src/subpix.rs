use crate::params::SubPixParams;
use homography_calib_core::{sample_bilinear, GrayImageView};
use nalgebra::{Matrix2, Point2, Vector2};

/// Refine a saddle point so that image gradients in its window are
/// orthogonal to the offsets from it.
///
/// Solves `Σ w·g·gᵗ · c = Σ w·g·gᵗ · q` over the window pixels `q` and
/// iterates until the update is below `epsilon`. If the refined position
/// leaves the search window, `start` is returned unchanged.
pub fn refine_corner(
    image: &GrayImageView<'_>,
    start: Point2<f32>,
    params: &SubPixParams,
) -> Point2<f32> {
    let hw = params.half_window as i32;
    let sigma = (params.half_window as f32 * 0.5).max(1.0);
    let inv_two_sigma_sq = 1.0 / (2.0 * sigma * sigma);

    let mut p = start;
    for _ in 0..params.max_iters {
        let mut normal = Matrix2::<f32>::zeros();
        let mut rhs = Vector2::<f32>::zeros();

        for dy in -hw..=hw {
            for dx in -hw..=hw {
                let q = Vector2::new(p.x + dx as f32, p.y + dy as f32);
                let gx = 0.5
                    * (sample_bilinear(image, q.x + 1.0, q.y)
                        - sample_bilinear(image, q.x - 1.0, q.y));
                let gy = 0.5
                    * (sample_bilinear(image, q.x, q.y + 1.0)
                        - sample_bilinear(image, q.x, q.y - 1.0));
                let w = (-((dx * dx + dy * dy) as f32) * inv_two_sigma_sq).exp();
                let g = Vector2::new(gx, gy);
                let ggt = g * g.transpose() * w;
                normal += ggt;
                rhs += ggt * q;
            }
        }

        let Some(inv) = normal.try_inverse() else {
            break;
        };
        let next = Point2::from(inv * rhs);
        let step = (next - p).norm();
        p = next;
        if step < params.epsilon {
            break;
        }
    }

    let d = p - start;
    let limit = params.half_window as f32;
    if !(d.x.is_finite() && d.y.is_finite()) || d.x.abs() > limit || d.y.abs() > limit {
        return start;
    }
    p
}

/// [`refine_corner`] applied in place to every point.
pub fn refine_corners(image: &GrayImageView<'_>, points: &mut [Point2<f32>], params: &SubPixParams) {
    for p in points.iter_mut() {
        *p = refine_corner(image, *p, params);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use homography_calib_core::GrayImage;

    /// Anti-aliased X-junction centred at `(cx, cy)`; pixel `(i, j)` covers
    /// `[i - 0.5, i + 0.5] × [j - 0.5, j + 0.5]`.
    fn saddle(size: usize, cx: f32, cy: f32) -> GrayImage {
        const SS: usize = 8;
        let mut data = vec![0u8; size * size];
        for j in 0..size {
            for i in 0..size {
                let mut acc = 0u32;
                for sy in 0..SS {
                    for sx in 0..SS {
                        let x = i as f32 - 0.5 + (sx as f32 + 0.5) / SS as f32;
                        let y = j as f32 - 0.5 + (sy as f32 + 0.5) / SS as f32;
                        if (x - cx) * (y - cy) > 0.0 {
                            acc += 255;
                        }
                    }
                }
                data[j * size + i] = (acc / (SS * SS) as u32) as u8;
            }
        }
        GrayImage {
            width: size,
            height: size,
            data,
        }
    }

    #[test]
    fn converges_to_the_saddle() {
        let img = saddle(40, 20.3, 19.6);
        let refined = refine_corner(&img.view(), Point2::new(21.0, 19.0), &SubPixParams::default());
        assert!((refined.x - 20.3).abs() < 0.15, "x = {}", refined.x);
        assert!((refined.y - 19.6).abs() < 0.15, "y = {}", refined.y);
    }

    #[test]
    fn flat_image_keeps_the_start() {
        let img = GrayImage {
            width: 20,
            height: 20,
            data: vec![128; 400],
        };
        let start = Point2::new(10.0, 10.0);
        assert_eq!(refine_corner(&img.view(), start, &SubPixParams::default()), start);
    }

    #[test]
    fn refines_in_place() {
        let img = saddle(40, 15.4, 22.7);
        let mut pts = [Point2::new(15.0, 23.0)];
        refine_corners(&img.view(), &mut pts, &SubPixParams::default());
        assert!((pts[0].x - 15.4).abs() < 0.15);
        assert!((pts[0].y - 22.7).abs() < 0.15);
    }
}
