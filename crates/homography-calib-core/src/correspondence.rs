use crate::canonical::CanonicalTransform;
use crate::color::{rainbow, MANUAL_PAIR_COLOR};
use crate::image::Rgb;
use log::warn;
use nalgebra::Point2;

/// Where a stored pair came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PairOrigin {
    /// Clicked by hand; the destination is a reference-image pixel.
    Manual,
    /// Grid node `index` (row-major) of a detection; the destination is the
    /// raw detection mapped through the canonical transform.
    Detected(usize),
}

/// Index-aligned source/destination point lists.
///
/// `source()[i]` corresponds to `destination()[i]`; every mutation keeps the
/// two lists (and the per-pair marker colors and origins) the same length.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CorrespondenceStore {
    source: Vec<Point2<f64>>,
    destination: Vec<Point2<f64>>,
    colors: Vec<Rgb>,
    origins: Vec<PairOrigin>,
}

impl CorrespondenceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.source.len()
    }

    pub fn is_empty(&self) -> bool {
        self.source.is_empty()
    }

    pub fn source(&self) -> &[Point2<f64>] {
        &self.source
    }

    pub fn destination(&self) -> &[Point2<f64>] {
        &self.destination
    }

    pub fn colors(&self) -> &[Rgb] {
        &self.colors
    }

    pub fn origins(&self) -> &[PairOrigin] {
        &self.origins
    }

    /// Pairs that were clicked by hand, as `(source, destination)`.
    pub fn manual_pairs(&self) -> impl Iterator<Item = (Point2<f64>, Point2<f64>)> + '_ {
        self.pairs()
            .zip(&self.origins)
            .filter(|(_, origin)| **origin == PairOrigin::Manual)
            .map(|(pair, _)| pair)
    }

    pub fn pairs(&self) -> impl Iterator<Item = (Point2<f64>, Point2<f64>)> + '_ {
        self.source.iter().copied().zip(self.destination.iter().copied())
    }

    /// Append a manually selected pair.
    pub fn add_pair(&mut self, src: Point2<f64>, dst: Point2<f64>) {
        self.push(src, dst, MANUAL_PAIR_COLOR, PairOrigin::Manual);
    }

    pub fn clear(&mut self) {
        self.source.clear();
        self.destination.clear();
        self.colors.clear();
        self.origins.clear();
    }

    fn push(&mut self, src: Point2<f64>, dst: Point2<f64>, color: Rgb, origin: PairOrigin) {
        self.source.push(src);
        self.destination.push(dst);
        self.colors.push(color);
        self.origins.push(origin);
    }

    /// Replace all pairs with a fresh grid detection on both images.
    ///
    /// Destination points go through `transform` first. Counts that differ
    /// between the two detections are clipped to the shorter list. Returns
    /// the number of stored pairs.
    pub fn replace_from_detection(
        &mut self,
        src_points: &[Point2<f32>],
        dst_raw: &[Point2<f32>],
        transform: &CanonicalTransform,
        canonical_size: f64,
        grid_rows: u32,
        grid_cols: u32,
    ) -> usize {
        let sources: Vec<Point2<f64>> = src_points.iter().map(|p| p.cast::<f64>()).collect();
        self.rebuild(sources, dst_raw, transform, canonical_size, grid_rows, grid_cols)
    }

    /// Recompute the destination of every detected pair from a fresh raw
    /// detection, keeping the current sources. Manual pairs are left as they
    /// are. Detected pairs whose grid node is missing from `dst_raw` are
    /// dropped. Used after the canonical transform changes.
    pub fn replace_destinations(
        &mut self,
        dst_raw: &[Point2<f32>],
        transform: &CanonicalTransform,
        canonical_size: f64,
        grid_rows: u32,
        grid_cols: u32,
    ) -> usize {
        let total = grid_rows as usize * grid_cols as usize;
        let old = std::mem::take(self);
        let mut dropped = 0;
        for (i, (src, dst)) in old.pairs().enumerate() {
            match old.origins[i] {
                PairOrigin::Manual => self.push(src, dst, old.colors[i], PairOrigin::Manual),
                PairOrigin::Detected(k) => match dst_raw.get(k) {
                    Some(raw) => {
                        let dst = transform.apply(raw.cast::<f64>(), canonical_size);
                        self.push(src, dst, rainbow(k, total), PairOrigin::Detected(k));
                    }
                    None => dropped += 1,
                },
            }
        }
        if dropped > 0 {
            warn!(
                "destination detection has {} points, dropped {dropped} detected pairs",
                dst_raw.len()
            );
        }
        self.len()
    }

    fn rebuild(
        &mut self,
        sources: Vec<Point2<f64>>,
        dst_raw: &[Point2<f32>],
        transform: &CanonicalTransform,
        canonical_size: f64,
        grid_rows: u32,
        grid_cols: u32,
    ) -> usize {
        if sources.len() != dst_raw.len() {
            warn!(
                "detection count mismatch: {} source vs {} destination points, keeping {}",
                sources.len(),
                dst_raw.len(),
                sources.len().min(dst_raw.len())
            );
        }

        self.clear();
        let total = grid_rows as usize * grid_cols as usize;
        for (i, (src, raw)) in sources.into_iter().zip(dst_raw).enumerate() {
            let dst = transform.apply(raw.cast::<f64>(), canonical_size);
            self.push(src, dst, rainbow(i, total), PairOrigin::Detected(i));
        }
        self.len()
    }
}
