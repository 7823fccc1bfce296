//! Calibration session: images, correspondences, canonical transform and
//! derived views, mutated only through the command handlers below.

use crate::config::CalibConfig;
use crate::core::{
    merge, rainbow, warp, CanonicalTransform, ComposeError, CornerDetector, CorrespondenceStore,
    DetectionFailure, GrayImage, Homography, HomographyEngine, HomographyError, ProbeError, Rgb,
    RgbImage, MANUAL_PAIR_COLOR, PENDING_POINT_COLOR,
};
use crate::detect::rgb_from_image;
use log::{info, warn};
use nalgebra::Point2;
use std::fmt;
use std::path::{Path, PathBuf};

/// Marker radius for clicked and saved points.
pub const CLICK_RADIUS: i64 = 5;
/// Marker radius for auto-detected corners.
pub const DETECTION_RADIUS: i64 = 6;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum View {
    Source,
    Destination,
}

impl fmt::Display for View {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Source => "source",
            Self::Destination => "destination",
        })
    }
}

#[derive(thiserror::Error, Debug)]
pub enum SessionError {
    #[error("cannot load {}: {source}", path.display())]
    MissingInput {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("{view} detection failed: {source}")]
    Detection {
        view: View,
        #[source]
        source: DetectionFailure,
    },
    #[error("no pending {0} point; click both images before saving")]
    NoPendingPoint(View),
    #[error(transparent)]
    Homography(#[from] HomographyError),
    #[error(transparent)]
    Compose(#[from] ComposeError),
    #[error(transparent)]
    Probe(#[from] ProbeError),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StatusLevel {
    Info,
    Warning,
    Error,
}

/// One operator-facing message, drained by the view host.
#[derive(Clone, Debug, PartialEq)]
pub struct Status {
    pub level: StatusLevel,
    pub message: String,
}

/// Pending operator messages. Every entry is also sent to `log`.
#[derive(Debug, Default)]
pub struct StatusLog {
    pending: Vec<Status>,
}

impl StatusLog {
    pub fn push(&mut self, level: StatusLevel, message: impl Into<String>) {
        let message = message.into();
        match level {
            StatusLevel::Info => info!("{message}"),
            StatusLevel::Warning | StatusLevel::Error => warn!("{message}"),
        }
        self.pending.push(Status { level, message });
    }

    pub fn drain(&mut self) -> Vec<Status> {
        std::mem::take(&mut self.pending)
    }
}

/// Decode an image file into RGB8.
pub fn load_rgb(path: &Path) -> Result<RgbImage, SessionError> {
    let decoded = image::open(path).map_err(|source| SessionError::MissingInput {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(rgb_from_image(decoded.to_rgb8()))
}

/// An untouched original plus the copy that markers are drawn on.
#[derive(Clone, Debug)]
pub struct WorkingImage {
    origin: RgbImage,
    working: RgbImage,
    gray: GrayImage,
}

impl WorkingImage {
    pub fn new(origin: RgbImage) -> Self {
        let gray = origin.view().to_gray();
        Self {
            working: origin.clone(),
            origin,
            gray,
        }
    }

    pub fn origin(&self) -> &RgbImage {
        &self.origin
    }

    pub fn working(&self) -> &RgbImage {
        &self.working
    }

    /// Grayscale of the origin, computed once.
    pub fn gray(&self) -> &GrayImage {
        &self.gray
    }

    pub fn reset(&mut self) {
        self.working = self.origin.clone();
    }

    /// Marker positions are truncated to whole pixels.
    pub fn mark(&mut self, p: Point2<f64>, radius: i64, color: Rgb) {
        if p.x.is_finite() && p.y.is_finite() {
            self.working.draw_disc(p.x as i64, p.y as i64, radius, color);
        }
    }

    /// Reset, then draw each point with its grid-index color.
    fn redraw_detections(&mut self, points: &[Point2<f64>], total: usize) {
        self.reset();
        for (i, p) in points.iter().enumerate() {
            self.mark(*p, DETECTION_RADIUS, rainbow(i, total));
        }
    }
}

fn format_points(points: &[Point2<f64>]) -> String {
    let cells: Vec<String> = points
        .iter()
        .map(|p| format!("[{:.2}, {:.2}]", p.x, p.y))
        .collect();
    format!("[{}]", cells.join(", "))
}

pub struct Session<D: CornerDetector> {
    source: WorkingImage,
    destination: WorkingImage,
    store: CorrespondenceStore,
    transform: CanonicalTransform,
    pending_source: Option<Point2<f64>>,
    pending_destination: Option<Point2<f64>>,
    detector: D,
    engine: HomographyEngine,
    grid_rows: u32,
    grid_cols: u32,
    canonical_size: f64,
    last_export: Option<String>,
    plan_view: Option<RgbImage>,
    merged_view: Option<RgbImage>,
    status: StatusLog,
}

impl<D: CornerDetector> Session<D> {
    pub fn new(
        source: RgbImage,
        reference: RgbImage,
        detector: D,
        engine: HomographyEngine,
        config: &CalibConfig,
    ) -> Self {
        Self {
            source: WorkingImage::new(source),
            destination: WorkingImage::new(reference),
            store: CorrespondenceStore::new(),
            transform: CanonicalTransform::default(),
            pending_source: None,
            pending_destination: None,
            detector,
            engine,
            grid_rows: config.grid_rows,
            grid_cols: config.grid_cols,
            canonical_size: config.canonical_size,
            last_export: None,
            plan_view: None,
            merged_view: None,
            status: StatusLog::default(),
        }
    }

    /// Load both images named in `config`.
    pub fn open(
        config: &CalibConfig,
        detector: D,
        engine: HomographyEngine,
    ) -> Result<Self, SessionError> {
        let source = load_rgb(&config.source_path)?;
        let reference = load_rgb(&config.reference_path)?;
        info!(
            "loaded source {}x{} and reference {}x{}",
            source.width, source.height, reference.width, reference.height
        );
        Ok(Self::new(source, reference, detector, engine, config))
    }

    pub fn source(&self) -> &WorkingImage {
        &self.source
    }

    pub fn destination(&self) -> &WorkingImage {
        &self.destination
    }

    pub fn store(&self) -> &CorrespondenceStore {
        &self.store
    }

    pub fn transform(&self) -> CanonicalTransform {
        self.transform
    }

    pub fn pending(&self, view: View) -> Option<Point2<f64>> {
        match view {
            View::Source => self.pending_source,
            View::Destination => self.pending_destination,
        }
    }

    /// Text of the most recent successful export, if any.
    pub fn last_export(&self) -> Option<&str> {
        self.last_export.as_deref()
    }

    pub fn plan_view(&self) -> Option<&RgbImage> {
        self.plan_view.as_ref()
    }

    pub fn merged_view(&self) -> Option<&RgbImage> {
        self.merged_view.as_ref()
    }

    pub fn drain_status(&mut self) -> Vec<Status> {
        self.status.drain()
    }

    pub fn report(&mut self, err: &SessionError) {
        self.status.push(StatusLevel::Error, err.to_string());
    }

    fn total_nodes(&self) -> usize {
        self.grid_rows as usize * self.grid_cols as usize
    }

    fn detect(&self, view: View) -> Result<Vec<Point2<f32>>, SessionError> {
        let gray = match view {
            View::Source => self.source.gray(),
            View::Destination => self.destination.gray(),
        };
        self.detector
            .detect(&gray.view(), self.grid_rows, self.grid_cols)
            .map_err(|source| SessionError::Detection { view, source })
    }

    fn report_lists(&mut self) {
        let src = format_points(self.store.source());
        let dst = format_points(self.store.destination());
        self.status
            .push(StatusLevel::Info, format!("Source points: {src}"));
        self.status
            .push(StatusLevel::Info, format!("Destination points: {dst}"));
    }

    /// Set the pending point for `view` and mark it.
    pub fn click(&mut self, view: View, x: f64, y: f64) {
        let p = Point2::new(x, y);
        match view {
            View::Source => {
                self.pending_source = Some(p);
                self.source.mark(p, CLICK_RADIUS, PENDING_POINT_COLOR);
            }
            View::Destination => {
                self.pending_destination = Some(p);
                self.destination.mark(p, CLICK_RADIUS, PENDING_POINT_COLOR);
            }
        }
    }

    /// Append the pending pair. Both views must have been clicked since the
    /// last save.
    pub fn save_pair(&mut self) -> Result<(), SessionError> {
        let src = self
            .pending_source
            .ok_or(SessionError::NoPendingPoint(View::Source))?;
        let dst = self
            .pending_destination
            .ok_or(SessionError::NoPendingPoint(View::Destination))?;

        self.source.mark(src, CLICK_RADIUS, MANUAL_PAIR_COLOR);
        self.destination.mark(dst, CLICK_RADIUS, MANUAL_PAIR_COLOR);
        self.store.add_pair(src, dst);
        self.pending_source = None;
        self.pending_destination = None;

        self.status.push(StatusLevel::Info, "Saving point pair");
        self.report_lists();
        Ok(())
    }

    /// Solve for the current matrix and export it. The previous export is
    /// only replaced on success.
    fn solve_and_export(&mut self) -> Result<Homography, SessionError> {
        let estimate = self.engine.compute(&self.store)?;
        if let Some(degeneracy) = estimate.degeneracy {
            self.status.push(StatusLevel::Warning, degeneracy.to_string());
        }
        let text = HomographyEngine::export(&estimate.homography);
        self.status.push(StatusLevel::Info, text.clone());
        self.last_export = Some(text);
        Ok(estimate.homography)
    }

    /// Warp the source into the reference frame.
    pub fn show_plan_view(&mut self) -> Result<(), SessionError> {
        let h = self.solve_and_export()?;
        let dst = self.destination.origin();
        let view = warp(&self.source.origin().view(), &h, dst.width, dst.height)?;
        self.plan_view = Some(view);
        self.status.push(StatusLevel::Info, "Created plan view");
        Ok(())
    }

    /// Warp the source into the reference frame and fill the uncovered area
    /// from the reference.
    pub fn show_merged_view(&mut self) -> Result<(), SessionError> {
        let h = self.solve_and_export()?;
        let view = merge(
            &self.source.origin().view(),
            &self.destination.origin().view(),
            &h,
        )?;
        self.merged_view = Some(view);
        self.status.push(StatusLevel::Info, "Merged views");
        Ok(())
    }

    /// Detect the grid on both images and replace every pair. Nothing
    /// changes unless both detections succeed.
    pub fn auto_detect(&mut self) -> Result<(), SessionError> {
        let src_raw = self.detect(View::Source)?;
        let dst_raw = self.detect(View::Destination)?;

        let total = self.total_nodes();
        let n = self.store.replace_from_detection(
            &src_raw,
            &dst_raw,
            &self.transform,
            self.canonical_size,
            self.grid_rows,
            self.grid_cols,
        );
        self.pending_source = None;
        self.pending_destination = None;

        let src_pts: Vec<Point2<f64>> = src_raw.iter().map(|p| p.cast::<f64>()).collect();
        let dst_pts = self.canonical(&dst_raw);
        self.source.redraw_detections(&src_pts, total);
        self.destination.redraw_detections(&dst_pts, total);

        self.status
            .push(StatusLevel::Info, format!("Detected {n} corner pairs"));
        self.report_lists();
        Ok(())
    }

    pub fn rotate(&mut self) -> Result<(), SessionError> {
        self.refresh_destinations(self.transform.rotated())
    }

    pub fn flip(&mut self) -> Result<(), SessionError> {
        self.refresh_destinations(self.transform.flipped())
    }

    fn canonical(&self, raw: &[Point2<f32>]) -> Vec<Point2<f64>> {
        self.canonical_with(&self.transform, raw)
    }

    fn canonical_with(&self, t: &CanonicalTransform, raw: &[Point2<f32>]) -> Vec<Point2<f64>> {
        raw.iter()
            .map(|p| t.apply(p.cast::<f64>(), self.canonical_size))
            .collect()
    }

    /// Re-detect the reference under `candidate` and commit it only if the
    /// detection succeeds. Detected pairs get fresh destinations; manually
    /// saved pairs keep theirs and stay marked.
    fn refresh_destinations(&mut self, candidate: CanonicalTransform) -> Result<(), SessionError> {
        let dst_raw = self.detect(View::Destination)?;

        self.transform = candidate;
        if !self.store.is_empty() {
            self.store.replace_destinations(
                &dst_raw,
                &self.transform,
                self.canonical_size,
                self.grid_rows,
                self.grid_cols,
            );
        }
        let total = self.total_nodes();
        let dst_pts = self.canonical_with(&candidate, &dst_raw);
        self.destination.redraw_detections(&dst_pts, total);
        let manual: Vec<Point2<f64>> = self.store.manual_pairs().map(|(_, dst)| dst).collect();
        for dst in &manual {
            self.destination.mark(*dst, CLICK_RADIUS, MANUAL_PAIR_COLOR);
        }
        self.pending_destination = None;

        self.status
            .push(StatusLevel::Info, self.transform.describe());
        if !manual.is_empty() {
            self.status.push(
                StatusLevel::Warning,
                format!(
                    "Kept {} manual pairs; only detected destinations were recomputed",
                    manual.len()
                ),
            );
        }
        Ok(())
    }
}
