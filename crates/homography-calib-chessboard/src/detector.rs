use crate::params::ChessboardParams;
use homography_calib_core::{
    estimate_homography, homography_from_4pt, Corner, DetectionFailure, Homography,
};
use kiddo::{KdTree, SquaredEuclidean};
use log::debug;
use nalgebra::Point2;
use std::collections::VecDeque;

#[cfg(feature = "tracing")]
use tracing::instrument;

/// 4 axis neighbors, 4 diagonals and the query itself.
const CLUSTER_NEIGHBORS: usize = 9;

/// Recovers a full `rows × cols` inner-corner grid from a cloud of corner
/// candidates.
pub struct ChessboardDetector {
    pub params: ChessboardParams,
}

impl ChessboardDetector {
    pub fn new(params: ChessboardParams) -> Self {
        Self { params }
    }

    /// Find exactly `rows * cols` corners, returned in row-major grid order.
    ///
    /// The grid's first axis follows the image x axis when the board is
    /// roughly upright; a transposed assignment is tried when that fails.
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "debug", skip(self, corners), fields(num_corners = corners.len()))
    )]
    pub fn detect_from_corners(
        &self,
        corners: &[Corner],
        rows: u32,
        cols: u32,
    ) -> Result<Vec<Point2<f32>>, DetectionFailure> {
        if rows < 2 || cols < 2 {
            return Err(DetectionFailure::InvalidShape { rows, cols });
        }
        let needed = rows as usize * cols as usize;

        let strong: Vec<Point2<f32>> = corners
            .iter()
            .filter(|c| c.strength >= self.params.min_strength)
            .map(|c| c.position)
            .collect();
        if strong.len() < needed {
            return Err(DetectionFailure::TooFewCandidates {
                needed,
                found: strong.len(),
            });
        }

        let coords: Vec<[f32; 2]> = strong.iter().map(|p| [p.x, p.y]).collect();
        let tree: KdTree<f32, 2> = (&coords).into();

        let no_grid = DetectionFailure::NoGrid { rows, cols };
        let spacing = estimate_spacing(&tree, &coords).ok_or_else(|| no_grid.clone())?;
        let cluster = largest_cluster(&tree, &coords, self.params.cluster_link_ratio * spacing);
        debug!(
            "{} candidates, spacing {spacing:.2}px, largest cluster {}",
            strong.len(),
            cluster.len()
        );
        if cluster.len() < needed {
            return Err(no_grid);
        }

        let members: Vec<Point2<f32>> = cluster.iter().map(|&i| strong[i]).collect();
        let [tl, tr, br, bl] = extremes(&members);
        let tol = self.params.snap_tolerance * spacing;

        for outer in [[tl, tr, br, bl], [tl, bl, br, tr]] {
            if let Some(nodes) = fit_grid(&tree, &strong, rows, cols, outer, tol) {
                return Ok(nodes);
            }
        }
        Err(no_grid)
    }
}

fn grid_nodes(rows: u32, cols: u32) -> Vec<Point2<f64>> {
    (0..rows)
        .flat_map(|r| (0..cols).map(move |c| Point2::new(c as f64, r as f64)))
        .collect()
}

fn fit_grid(
    tree: &KdTree<f32, 2>,
    candidates: &[Point2<f32>],
    rows: u32,
    cols: u32,
    outer: [Point2<f32>; 4],
    tol: f32,
) -> Option<Vec<Point2<f32>>> {
    let w = (cols - 1) as f64;
    let h = (rows - 1) as f64;
    let model = [
        Point2::new(0.0, 0.0),
        Point2::new(w, 0.0),
        Point2::new(w, h),
        Point2::new(0.0, h),
    ];
    let coarse = homography_from_4pt(&model, &outer.map(|p| p.cast::<f64>()))?;
    let snapped = snap_all(tree, candidates, &coarse, rows, cols, tol)?;

    // Refit on every node so lens noise at the four extremes does not bias
    // the interior.
    let image: Vec<Point2<f64>> = snapped.iter().map(|p| p.cast::<f64>()).collect();
    match estimate_homography(&grid_nodes(rows, cols), &image) {
        Some(fine) => snap_all(tree, candidates, &fine, rows, cols, tol).or(Some(snapped)),
        None => Some(snapped),
    }
}

/// Every node must land within `tol` of a candidate nobody else took.
fn snap_all(
    tree: &KdTree<f32, 2>,
    candidates: &[Point2<f32>],
    h: &Homography,
    rows: u32,
    cols: u32,
    tol: f32,
) -> Option<Vec<Point2<f32>>> {
    let mut used = vec![false; candidates.len()];
    let mut out = Vec::with_capacity(rows as usize * cols as usize);
    for node in grid_nodes(rows, cols) {
        let p = h.project(node)?;
        let nn = tree.nearest_one::<SquaredEuclidean>(&[p.x as f32, p.y as f32]);
        if nn.distance > tol * tol {
            return None;
        }
        let idx = nn.item as usize;
        if used[idx] {
            return None;
        }
        used[idx] = true;
        out.push(candidates[idx]);
    }
    Some(out)
}

/// Median distance from each candidate to its nearest other candidate.
fn estimate_spacing(tree: &KdTree<f32, 2>, coords: &[[f32; 2]]) -> Option<f32> {
    let mut dists: Vec<f32> = coords
        .iter()
        .enumerate()
        .filter_map(|(i, q)| {
            tree.nearest_n::<SquaredEuclidean>(q, 2)
                .into_iter()
                .find(|nn| nn.item as usize != i)
                .map(|nn| nn.distance.sqrt())
        })
        .filter(|d| *d > 0.0)
        .collect();
    if dists.is_empty() {
        return None;
    }
    dists.sort_by(|a, b| a.total_cmp(b));
    Some(dists[dists.len() / 2])
}

/// Indices of the largest connected component with edges shorter than `link`.
fn largest_cluster(tree: &KdTree<f32, 2>, coords: &[[f32; 2]], link: f32) -> Vec<usize> {
    let link_sq = link * link;
    let mut adjacency = vec![Vec::new(); coords.len()];
    for (i, q) in coords.iter().enumerate() {
        for nn in tree.nearest_n::<SquaredEuclidean>(q, CLUSTER_NEIGHBORS) {
            let j = nn.item as usize;
            if j != i && nn.distance <= link_sq {
                adjacency[i].push(j);
                adjacency[j].push(i);
            }
        }
    }

    let mut seen = vec![false; coords.len()];
    let mut best = Vec::new();
    for start in 0..coords.len() {
        if seen[start] {
            continue;
        }
        seen[start] = true;
        let mut component = vec![start];
        let mut queue = VecDeque::from([start]);
        while let Some(i) = queue.pop_front() {
            for &j in &adjacency[i] {
                if !seen[j] {
                    seen[j] = true;
                    component.push(j);
                    queue.push_back(j);
                }
            }
        }
        if component.len() > best.len() {
            best = component;
        }
    }
    best
}

fn arg_min(pts: &[Point2<f32>], key: impl Fn(&Point2<f32>) -> f32) -> Point2<f32> {
    pts.iter()
        .copied()
        .min_by(|a, b| key(a).total_cmp(&key(b)))
        .unwrap_or_else(Point2::origin)
}

/// Outer corners as `[top-left, top-right, bottom-right, bottom-left]`.
fn extremes(pts: &[Point2<f32>]) -> [Point2<f32>; 4] {
    [
        arg_min(pts, |p| p.x + p.y),
        arg_min(pts, |p| p.y - p.x),
        arg_min(pts, |p| -(p.x + p.y)),
        arg_min(pts, |p| p.x - p.y),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lattice(rows: u32, cols: u32, step: f32) -> Vec<[f32; 2]> {
        grid_nodes(rows, cols)
            .iter()
            .map(|p| [10.0 + step * p.x as f32, 20.0 + step * p.y as f32])
            .collect()
    }

    #[test]
    fn grid_nodes_are_row_major() {
        let nodes = grid_nodes(2, 3);
        assert_eq!(nodes[1], Point2::new(1.0, 0.0));
        assert_eq!(nodes[3], Point2::new(0.0, 1.0));
    }

    #[test]
    fn spacing_is_the_median_neighbor_distance() {
        let mut coords = lattice(4, 4, 12.0);
        coords.push([500.0, 500.0]);
        let tree: KdTree<f32, 2> = (&coords).into();
        let s = estimate_spacing(&tree, &coords).expect("spacing");
        assert!((s - 12.0).abs() < 1e-4);
    }

    #[test]
    fn isolated_points_stay_out_of_the_cluster() {
        let mut coords = lattice(3, 3, 10.0);
        coords.push([200.0, 200.0]);
        coords.push([205.0, 200.0]);
        let tree: KdTree<f32, 2> = (&coords).into();
        let cluster = largest_cluster(&tree, &coords, 15.0);
        assert_eq!(cluster.len(), 9);
        assert!(cluster.iter().all(|&i| i < 9));
    }

    #[test]
    fn extremes_pick_the_outer_corners() {
        let pts: Vec<Point2<f32>> = lattice(3, 4, 10.0)
            .iter()
            .map(|c| Point2::new(c[0], c[1]))
            .collect();
        let [tl, tr, br, bl] = extremes(&pts);
        assert_eq!(tl, Point2::new(10.0, 20.0));
        assert_eq!(tr, Point2::new(40.0, 20.0));
        assert_eq!(br, Point2::new(40.0, 40.0));
        assert_eq!(bl, Point2::new(10.0, 40.0));
    }
}
