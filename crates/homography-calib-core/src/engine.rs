//! Store → matrix orchestration and literal-array export.
//!
//! The matrix is recomputed on every request; nothing here caches it, since
//! the store may change between requests.

use std::fmt;
use std::fmt::Write as _;

use crate::correspondence::CorrespondenceStore;
use crate::homography::{DltSolver, Homography, HomographySolver, SolvedHomography};
use log::debug;

/// A homography has 8 degrees of freedom; each pair contributes 2.
pub const MIN_CORRESPONDENCES: usize = 4;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum HomographyError {
    #[error("need at least {needed} point pairs for a homography, have {got}")]
    InsufficientCorrespondences { needed: usize, got: usize },
    #[error("homography solve failed for {pairs} point pairs")]
    SolveFailed { pairs: usize },
}

/// Why an otherwise successful solve should not be trusted.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Degeneracy {
    NonFinite,
    Singular,
    IllConditioned { ratio: f64 },
}

impl fmt::Display for Degeneracy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NonFinite => write!(f, "homography has non-finite entries"),
            Self::Singular => write!(f, "homography is not invertible"),
            Self::IllConditioned { ratio } => {
                write!(f, "homography is ill-conditioned (singular value ratio {ratio:.3e})")
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct HomographyEstimate {
    pub homography: Homography,
    /// Set when the matrix is usable only with caution.
    pub degeneracy: Option<Degeneracy>,
}

pub struct HomographyEngine {
    solver: Box<dyn HomographySolver>,
    min_singular_ratio: f64,
}

impl Default for HomographyEngine {
    fn default() -> Self {
        Self::new(DltSolver)
    }
}

impl HomographyEngine {
    pub fn new(solver: impl HomographySolver + 'static) -> Self {
        Self {
            solver: Box::new(solver),
            min_singular_ratio: 1e-9,
        }
    }

    /// Threshold on `σ_min / σ_max` below which the estimate is flagged.
    pub fn with_min_singular_ratio(mut self, ratio: f64) -> Self {
        self.min_singular_ratio = ratio;
        self
    }

    /// Solve for `H` mapping source points onto destination points.
    ///
    /// Any inlier mask reported by the solver is not used.
    pub fn compute(&self, store: &CorrespondenceStore) -> Result<HomographyEstimate, HomographyError> {
        let got = store.len();
        if got < MIN_CORRESPONDENCES {
            return Err(HomographyError::InsufficientCorrespondences {
                needed: MIN_CORRESPONDENCES,
                got,
            });
        }

        let SolvedHomography { homography, .. } = self
            .solver
            .solve(store.source(), store.destination())
            .ok_or(HomographyError::SolveFailed { pairs: got })?;

        let degeneracy = self.check(&homography);
        debug!("solved homography from {got} pairs, degeneracy={degeneracy:?}");
        Ok(HomographyEstimate {
            homography,
            degeneracy,
        })
    }

    pub fn check(&self, h: &Homography) -> Option<Degeneracy> {
        if !h.is_finite() {
            return Some(Degeneracy::NonFinite);
        }
        if h.inverse().is_none() {
            return Some(Degeneracy::Singular);
        }
        let ratio = h.singular_value_ratio();
        (ratio < self.min_singular_ratio).then_some(Degeneracy::IllConditioned { ratio })
    }

    /// Both literal syntaxes, labelled, ready to print.
    pub fn export(h: &Homography) -> String {
        format!(
            "Python:\n{}\nJava:\n{}",
            format_matrix(h, ExportSyntax::NumPy),
            format_matrix(h, ExportSyntax::Java)
        )
    }
}

/// Literal array syntaxes understood by [`format_matrix`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExportSyntax {
    /// `H = np.array([...])`, sign-aligned.
    NumPy,
    /// `double[][] H = {...};`
    Java,
}

fn sign_aligned(v: f64) -> String {
    if v.is_sign_negative() {
        format!("{v:.6}")
    } else {
        format!(" {v:.6}")
    }
}

/// Render `h` as a literal nested array with 6-digit fixed-point entries.
pub fn format_matrix(h: &Homography, syntax: ExportSyntax) -> String {
    let rows = h.to_array();
    let mut out = String::new();
    match syntax {
        ExportSyntax::NumPy => {
            out.push_str("H = np.array([\n");
            for row in rows {
                let cells: Vec<String> = row.iter().map(|v| sign_aligned(*v)).collect();
                let _ = writeln!(out, "    [{}],", cells.join(", "));
            }
            out.push_str("])");
        }
        ExportSyntax::Java => {
            out.push_str("double[][] H = {\n");
            for (i, row) in rows.iter().enumerate() {
                let cells: Vec<String> = row.iter().map(|v| format!("{v:.6}")).collect();
                let sep = if i + 1 < rows.len() { "," } else { "" };
                let _ = writeln!(out, "    {{{}}}{}", cells.join(", "), sep);
            }
            out.push_str("};");
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Point2;

    fn sample() -> Homography {
        Homography::from_array([
            [4.158013, 5.076947, -1146.668632],
            [-1.674058, 8.920382, -450.058258],
            [-0.000171, 0.003455, 1.0],
        ])
    }

    fn square_store(n: usize) -> CorrespondenceStore {
        let mut store = CorrespondenceStore::new();
        let corners = [(0.0, 0.0), (100.0, 0.0), (100.0, 100.0), (0.0, 100.0), (50.0, 30.0)];
        for &(x, y) in corners.iter().take(n) {
            store.add_pair(Point2::new(x, y), Point2::new(2.0 * x + 5.0, 2.0 * y - 3.0));
        }
        store
    }

    #[test]
    fn fewer_than_four_pairs_is_rejected() {
        let engine = HomographyEngine::default();
        for n in 0..4 {
            let err = engine.compute(&square_store(n)).unwrap_err();
            assert_eq!(
                err,
                HomographyError::InsufficientCorrespondences { needed: 4, got: n }
            );
        }
    }

    #[test]
    fn affine_pairs_are_recovered() {
        let est = HomographyEngine::default()
            .compute(&square_store(5))
            .expect("solve");
        assert!(est.degeneracy.is_none());
        let p = est.homography.project(Point2::new(10.0, 20.0)).expect("finite");
        assert!((p.x - 25.0).abs() < 1e-9 && (p.y - 37.0).abs() < 1e-9);
    }

    #[test]
    fn singular_matrices_are_flagged() {
        let engine = HomographyEngine::default();
        let flat = Homography::from_array([[1.0, 2.0, 3.0], [2.0, 4.0, 6.0], [0.0, 0.0, 1.0]]);
        assert!(engine.check(&flat).is_some());
        let nan = Homography::from_array([[f64::NAN, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]]);
        assert_eq!(engine.check(&nan), Some(Degeneracy::NonFinite));
        assert_eq!(engine.check(&sample()), None);
    }

    #[test]
    fn numpy_export_is_sign_aligned() {
        let text = format_matrix(&sample(), ExportSyntax::NumPy);
        assert_eq!(
            text,
            "H = np.array([\n\
             \x20   [ 4.158013,  5.076947, -1146.668632],\n\
             \x20   [-1.674058,  8.920382, -450.058258],\n\
             \x20   [-0.000171,  0.003455,  1.000000],\n\
             ])"
        );
    }

    #[test]
    fn java_export_has_no_trailing_comma() {
        let text = format_matrix(&sample(), ExportSyntax::Java);
        assert_eq!(
            text,
            "double[][] H = {\n\
             \x20   {4.158013, 5.076947, -1146.668632},\n\
             \x20   {-1.674058, 8.920382, -450.058258},\n\
             \x20   {-0.000171, 0.003455, 1.000000}\n\
             };"
        );
    }

    #[test]
    fn export_contains_both_syntaxes() {
        let text = HomographyEngine::export(&Homography::identity());
        assert!(text.starts_with("Python:\nH = np.array(["));
        assert!(text.contains("\nJava:\ndouble[][] H = {"));
    }
}
