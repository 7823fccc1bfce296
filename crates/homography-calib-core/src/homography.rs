use nalgebra::{DMatrix, Matrix3, Point2, SMatrix, SVector, Vector3};
use rand::{rngs::StdRng, SeedableRng};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Homography {
    pub h: Matrix3<f64>,
}

impl Homography {
    pub fn new(h: Matrix3<f64>) -> Self {
        Self { h }
    }

    pub fn identity() -> Self {
        Self::new(Matrix3::identity())
    }

    pub fn from_array(rows: [[f64; 3]; 3]) -> Self {
        Self::new(Matrix3::from_row_slice(&[
            rows[0][0], rows[0][1], rows[0][2], rows[1][0], rows[1][1], rows[1][2], rows[2][0],
            rows[2][1], rows[2][2],
        ]))
    }

    pub fn to_array(&self) -> [[f64; 3]; 3] {
        [
            [self.h[(0, 0)], self.h[(0, 1)], self.h[(0, 2)]],
            [self.h[(1, 0)], self.h[(1, 1)], self.h[(1, 2)]],
            [self.h[(2, 0)], self.h[(2, 1)], self.h[(2, 2)]],
        ]
    }

    /// Single-precision mapping for detector-side geometry.
    ///
    /// Does not guard against `w == 0`; use [`Homography::project`] when the
    /// input may hit the line at infinity.
    #[inline]
    pub fn apply(&self, p: Point2<f32>) -> Point2<f32> {
        let v = self.h * Vector3::new(p.x as f64, p.y as f64, 1.0);
        let w = v[2];
        Point2::new((v[0] / w) as f32, (v[1] / w) as f32)
    }

    /// `[x', y', w'] = H · [x, y, 1]`, returning `(x'/w', y'/w')`.
    ///
    /// `None` when `w'` is zero or the result is not finite.
    #[inline]
    pub fn project(&self, p: Point2<f64>) -> Option<Point2<f64>> {
        let v = self.h * Vector3::new(p.x, p.y, 1.0);
        let w = v[2];
        if w == 0.0 {
            return None;
        }
        let out = Point2::new(v[0] / w, v[1] / w);
        (out.x.is_finite() && out.y.is_finite()).then_some(out)
    }

    pub fn inverse(&self) -> Option<Self> {
        self.h.try_inverse().map(Self::new)
    }

    /// Smallest over largest singular value; 0 for a rank-deficient matrix.
    pub fn singular_value_ratio(&self) -> f64 {
        let sv = self.h.singular_values();
        let max = sv.max();
        if max <= 0.0 || !max.is_finite() {
            return 0.0;
        }
        sv.min() / max
    }

    pub fn is_finite(&self) -> bool {
        self.h.iter().all(|v| v.is_finite())
    }
}

/// Solver output. The inlier mask is only set by robust estimators.
#[derive(Clone, Debug, PartialEq)]
pub struct SolvedHomography {
    pub homography: Homography,
    pub inlier_mask: Option<Vec<bool>>,
}

/// Seam to the homography-solve collaborator: `dst ~ H * src`.
pub trait HomographySolver {
    fn solve(&self, src: &[Point2<f64>], dst: &[Point2<f64>]) -> Option<SolvedHomography>;
}

/// Least squares over all correspondences (no outlier rejection).
#[derive(Clone, Copy, Debug, Default)]
pub struct DltSolver;

impl HomographySolver for DltSolver {
    fn solve(&self, src: &[Point2<f64>], dst: &[Point2<f64>]) -> Option<SolvedHomography> {
        estimate_homography(src, dst).map(|homography| SolvedHomography {
            homography,
            inlier_mask: None,
        })
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RansacParams {
    /// Inlier threshold on reprojection error, in destination pixels.
    pub threshold: f64,
    pub max_iters: usize,
    /// Seed for the minimal-sample generator; fixed for reproducible exports.
    pub seed: u64,
}

impl Default for RansacParams {
    fn default() -> Self {
        Self {
            threshold: 3.0,
            max_iters: 2000,
            seed: 0,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct RansacSolver {
    pub params: RansacParams,
}

impl RansacSolver {
    pub fn new(params: RansacParams) -> Self {
        Self { params }
    }
}

impl HomographySolver for RansacSolver {
    fn solve(&self, src: &[Point2<f64>], dst: &[Point2<f64>]) -> Option<SolvedHomography> {
        estimate_homography_ransac(src, dst, &self.params)
    }
}

fn hartley_normalization(cx: f64, cy: f64, mean_dist: f64) -> Matrix3<f64> {
    let s = if mean_dist > 1e-12 {
        std::f64::consts::SQRT_2 / mean_dist
    } else {
        1.0
    };

    Matrix3::<f64>::new(s, 0.0, -s * cx, 0.0, s, -s * cy, 0.0, 0.0, 1.0)
}

fn normalize_points(pts: &[Point2<f64>]) -> (Vec<Point2<f64>>, Matrix3<f64>) {
    // Hartley normalization: translate to centroid, scale so mean distance = sqrt(2)
    let n = pts.len() as f64;
    let (sx, sy) = pts
        .iter()
        .fold((0.0, 0.0), |(ax, ay), p| (ax + p.x, ay + p.y));
    let (cx, cy) = (sx / n, sy / n);

    let mean_dist = pts
        .iter()
        .map(|p| ((p.x - cx).powi(2) + (p.y - cy).powi(2)).sqrt())
        .sum::<f64>()
        / n;

    let t = hartley_normalization(cx, cy, mean_dist);

    let out = pts
        .iter()
        .map(|p| {
            let v = t * Vector3::new(p.x, p.y, 1.0);
            Point2::new(v[0], v[1])
        })
        .collect();
    (out, t)
}

fn normalize_homography(h: Matrix3<f64>) -> Option<Matrix3<f64>> {
    let s = h[(2, 2)];
    if s.abs() < 1e-12 {
        return None;
    }
    Some(h / s)
}

fn denormalize_homography(
    hn: Matrix3<f64>,
    t_src: Matrix3<f64>,
    t_dst: Matrix3<f64>,
) -> Option<Matrix3<f64>> {
    let t_dst_inv = t_dst.try_inverse()?;
    Some(t_dst_inv * hn * t_src)
}

/// Estimate H such that `dst ~ H * src` from at least 4 correspondences.
///
/// Exactly 4 points use the closed-form solve; more use the normalized DLT.
pub fn estimate_homography(src: &[Point2<f64>], dst: &[Point2<f64>]) -> Option<Homography> {
    if src.len() != dst.len() || src.len() < 4 {
        return None;
    }

    if src.len() == 4 {
        let s: &[Point2<f64>; 4] = src.try_into().ok()?;
        let d: &[Point2<f64>; 4] = dst.try_into().ok()?;
        return homography_from_4pt(s, d);
    }

    let (s, ts) = normalize_points(src);
    let (d, td) = normalize_points(dst);

    // Build A (2N x 9)
    let n = src.len();
    let mut a = DMatrix::<f64>::zeros(2 * n, 9);

    for k in 0..n {
        let (x, y) = (s[k].x, s[k].y);
        let (u, v) = (d[k].x, d[k].y);

        // [ -x -y -1   0  0  0   u*x u*y u ]
        a[(2 * k, 0)] = -x;
        a[(2 * k, 1)] = -y;
        a[(2 * k, 2)] = -1.0;
        a[(2 * k, 6)] = u * x;
        a[(2 * k, 7)] = u * y;
        a[(2 * k, 8)] = u;

        // [ 0  0  0  -x -y -1   v*x v*y v ]
        a[(2 * k + 1, 3)] = -x;
        a[(2 * k + 1, 4)] = -y;
        a[(2 * k + 1, 5)] = -1.0;
        a[(2 * k + 1, 6)] = v * x;
        a[(2 * k + 1, 7)] = v * y;
        a[(2 * k + 1, 8)] = v;
    }

    // Ah = 0: h is the eigenvector of A^T A with the smallest eigenvalue.
    // The 9x9 normal matrix keeps the decomposition square for any N.
    let ata = a.transpose() * &a;
    let eig = nalgebra::SymmetricEigen::new(ata);
    let (min_idx, _) = eig
        .eigenvalues
        .iter()
        .enumerate()
        .min_by(|(_, a), (_, b)| a.abs().total_cmp(&b.abs()))?;
    let h = eig.eigenvectors.column(min_idx);

    let hn =
        Matrix3::<f64>::from_row_slice(&[h[0], h[1], h[2], h[3], h[4], h[5], h[6], h[7], h[8]]);

    // Denormalize: H = Td^{-1} * Hn * Ts
    let h_den = denormalize_homography(hn, ts, td)?;
    let h_den = normalize_homography(h_den)?;

    Some(Homography::new(h_den))
}

/// Compute H such that `dst ~ H * src` from exactly 4 correspondences.
///
/// Corner order must be consistent between `src` and `dst`.
pub fn homography_from_4pt(src: &[Point2<f64>; 4], dst: &[Point2<f64>; 4]) -> Option<Homography> {
    // Unknowns: [h11 h12 h13 h21 h22 h23 h31 h32], with h33 = 1
    // For each correspondence (x,y)->(u,v):
    // h11 x + h12 y + h13 - u h31 x - u h32 y = u
    // h21 x + h22 y + h23 - v h31 x - v h32 y = v
    let (src_n, t_src) = normalize_points(src);
    let (dst_n, t_dst) = normalize_points(dst);

    let mut a = SMatrix::<f64, 8, 8>::zeros();
    let mut b = SVector::<f64, 8>::zeros();

    for k in 0..4 {
        let (x, y) = (src_n[k].x, src_n[k].y);
        let (u, v) = (dst_n[k].x, dst_n[k].y);

        let r0 = 2 * k;
        a[(r0, 0)] = x;
        a[(r0, 1)] = y;
        a[(r0, 2)] = 1.0;
        a[(r0, 6)] = -u * x;
        a[(r0, 7)] = -u * y;
        b[r0] = u;

        let r1 = 2 * k + 1;
        a[(r1, 3)] = x;
        a[(r1, 4)] = y;
        a[(r1, 5)] = 1.0;
        a[(r1, 6)] = -v * x;
        a[(r1, 7)] = -v * y;
        b[r1] = v;
    }

    let x = a.lu().solve(&b)?;

    let hn = Matrix3::<f64>::new(
        x[0], x[1], x[2], //
        x[3], x[4], x[5], //
        x[6], x[7], 1.0,
    );

    let h_den = denormalize_homography(hn, t_src, t_dst)?;
    let h_den = normalize_homography(h_den)?;

    Some(Homography::new(h_den))
}

fn reprojection_error(h: &Homography, src: Point2<f64>, dst: Point2<f64>) -> f64 {
    h.project(src)
        .map(|p| (p - dst).norm())
        .unwrap_or(f64::INFINITY)
}

/// Robust fit: seeded 4-point RANSAC, then DLT refit on the best inlier set.
pub fn estimate_homography_ransac(
    src: &[Point2<f64>],
    dst: &[Point2<f64>],
    params: &RansacParams,
) -> Option<SolvedHomography> {
    let n = src.len();
    if n != dst.len() || n < 4 {
        return None;
    }

    let mut rng = StdRng::seed_from_u64(params.seed);
    let mut best: Option<(Homography, usize)> = None;

    for _ in 0..params.max_iters.max(1) {
        let idx = rand::seq::index::sample(&mut rng, n, 4);
        let s4: [Point2<f64>; 4] = std::array::from_fn(|k| src[idx.index(k)]);
        let d4: [Point2<f64>; 4] = std::array::from_fn(|k| dst[idx.index(k)]);

        let Some(h) = homography_from_4pt(&s4, &d4) else {
            continue;
        };

        let count = src
            .iter()
            .zip(dst)
            .filter(|(s, d)| reprojection_error(&h, **s, **d) < params.threshold)
            .count();

        if best.as_ref().is_none_or(|(_, c)| count > *c) {
            best = Some((h, count));
            if count == n {
                break;
            }
        }
    }

    let (best_h, _) = best?;
    let mask: Vec<bool> = src
        .iter()
        .zip(dst)
        .map(|(s, d)| reprojection_error(&best_h, *s, *d) < params.threshold)
        .collect();

    let inlier_src: Vec<Point2<f64>> = (0..n).filter(|&i| mask[i]).map(|i| src[i]).collect();
    let inlier_dst: Vec<Point2<f64>> = (0..n).filter(|&i| mask[i]).map(|i| dst[i]).collect();
    let refit = estimate_homography(&inlier_src, &inlier_dst).unwrap_or(best_h);

    let inlier_mask = src
        .iter()
        .zip(dst)
        .map(|(s, d)| reprojection_error(&refit, *s, *d) < params.threshold)
        .collect();

    Some(SolvedHomography {
        homography: refit,
        inlier_mask: Some(inlier_mask),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(a: Point2<f64>, b: Point2<f64>, tol: f64) {
        let dx = (a.x - b.x).abs();
        let dy = (a.y - b.y).abs();
        assert!(
            dx < tol && dy < tol,
            "expected ({:.6},{:.6}) ~ ({:.6},{:.6}) within {}",
            a.x,
            a.y,
            b.x,
            b.y,
            tol
        );
    }

    fn ground_truth() -> Homography {
        Homography::new(Matrix3::new(
            1.0, 0.2, 12.0, //
            -0.1, 0.9, 6.0, //
            0.0006, 0.0004, 1.0,
        ))
    }

    fn grid(n: usize, step: f64) -> Vec<Point2<f64>> {
        (0..n)
            .flat_map(|y| (0..n).map(move |x| Point2::new(x as f64 * step, y as f64 * step)))
            .collect()
    }

    #[test]
    fn inverse_round_trips_points() {
        let h = Homography::new(Matrix3::new(
            1.2, 0.1, 5.0, //
            -0.05, 0.9, 3.0, //
            0.001, 0.0005, 1.0,
        ));
        let inv = h.inverse().expect("invertible");

        for p in [
            Point2::new(0.0, 0.0),
            Point2::new(50.0, -20.0),
            Point2::new(320.0, 200.0),
        ] {
            let q = h.project(p).expect("finite");
            let back = inv.project(q).expect("finite");
            assert_close(back, p, 1e-9);
        }
    }

    #[test]
    fn four_point_specialization_recovers_h() {
        let gt = Homography::new(Matrix3::new(
            0.8, 0.05, 120.0, //
            -0.02, 1.1, 80.0, //
            0.0009, -0.0004, 1.0,
        ));

        let src = [
            Point2::new(0.0, 0.0),
            Point2::new(180.0, 0.0),
            Point2::new(180.0, 130.0),
            Point2::new(0.0, 130.0),
        ];
        let dst = src.map(|p| gt.project(p).expect("finite"));

        let recovered = homography_from_4pt(&src, &dst).expect("recoverable");

        for p in [
            Point2::new(0.0, 0.0),
            Point2::new(60.0, 40.0),
            Point2::new(150.0, 120.0),
        ] {
            assert_close(
                recovered.project(p).expect("finite"),
                gt.project(p).expect("finite"),
                1e-6,
            );
        }
    }

    #[test]
    fn dlt_handles_overdetermined_case() {
        let gt = ground_truth();
        let src = grid(3, 45.0);
        let dst: Vec<Point2<f64>> = src.iter().map(|&p| gt.project(p).expect("finite")).collect();

        let estimated = estimate_homography(&src, &dst).expect("estimate");
        for p in [Point2::new(0.0, 0.0), Point2::new(60.0, 40.0), Point2::new(80.0, 100.0)] {
            assert_close(
                estimated.project(p).expect("finite"),
                gt.project(p).expect("finite"),
                1e-6,
            );
        }
    }

    #[test]
    fn mismatched_or_short_inputs_fail() {
        let src = [Point2::new(0.0, 0.0); 4];
        let dst = [Point2::new(1.0, 1.0); 3];
        assert!(estimate_homography(&src, &dst).is_none());
        assert!(estimate_homography(&dst, &dst).is_none());
    }

    #[test]
    fn project_rejects_points_at_infinity() {
        let h = Homography::from_array([[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [1.0, 0.0, 0.0]]);
        assert!(h.project(Point2::new(0.0, 5.0)).is_none());
        assert!(h.project(Point2::new(2.0, 5.0)).is_some());
    }

    #[test]
    fn ransac_ignores_gross_outliers() {
        let gt = ground_truth();
        let src = grid(5, 30.0);
        let mut dst: Vec<Point2<f64>> =
            src.iter().map(|&p| gt.project(p).expect("finite")).collect();
        dst[3] += nalgebra::Vector2::new(80.0, -40.0);
        dst[17] += nalgebra::Vector2::new(-60.0, 90.0);

        let solved = RansacSolver::default().solve(&src, &dst).expect("solve");
        let mask = solved.inlier_mask.expect("mask");
        assert!(!mask[3] && !mask[17]);
        assert_eq!(mask.iter().filter(|m| **m).count(), src.len() - 2);
        assert_close(
            solved.homography.project(Point2::new(50.0, 50.0)).expect("finite"),
            gt.project(Point2::new(50.0, 50.0)).expect("finite"),
            1e-6,
        );
    }

    #[test]
    fn singular_ratio_flags_rank_deficiency() {
        let flat = Homography::from_array([[1.0, 0.0, 0.0], [2.0, 0.0, 0.0], [0.0, 0.0, 1.0]]);
        assert!(flat.singular_value_ratio() < 1e-12);
        assert!((Homography::identity().singular_value_ratio() - 1.0).abs() < 1e-12);
    }
}
