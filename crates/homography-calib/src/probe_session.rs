//! Probe session: project clicked or detected source points through a fixed
//! matrix and mark where they land on the reference.

use crate::config::CalibConfig;
use crate::core::{
    CornerDetector, PointProbe, ProbeReading, RgbImage, MANUAL_PAIR_COLOR, PENDING_POINT_COLOR,
};
use crate::session::{
    load_rgb, SessionError, Status, StatusLevel, StatusLog, View, WorkingImage, CLICK_RADIUS,
};
use nalgebra::Point2;

pub struct ProbeSession<D: CornerDetector> {
    source: WorkingImage,
    destination: WorkingImage,
    probe: PointProbe,
    detector: D,
    grid_rows: u32,
    grid_cols: u32,
    readings: Vec<ProbeReading>,
    status: StatusLog,
}

impl<D: CornerDetector> ProbeSession<D> {
    pub fn new(
        source: RgbImage,
        reference: RgbImage,
        probe: PointProbe,
        detector: D,
        config: &CalibConfig,
    ) -> Self {
        Self {
            source: WorkingImage::new(source),
            destination: WorkingImage::new(reference),
            probe,
            detector,
            grid_rows: config.grid_rows,
            grid_cols: config.grid_cols,
            readings: Vec::new(),
            status: StatusLog::default(),
        }
    }

    pub fn open(config: &CalibConfig, probe: PointProbe, detector: D) -> Result<Self, SessionError> {
        let source = load_rgb(&config.source_path)?;
        let reference = load_rgb(&config.reference_path)?;
        Ok(Self::new(source, reference, probe, detector, config))
    }

    pub fn source(&self) -> &WorkingImage {
        &self.source
    }

    pub fn destination(&self) -> &WorkingImage {
        &self.destination
    }

    /// Every successful reading so far, in probe order.
    pub fn readings(&self) -> &[ProbeReading] {
        &self.readings
    }

    pub fn drain_status(&mut self) -> Vec<Status> {
        self.status.drain()
    }

    pub fn report(&mut self, err: &SessionError) {
        self.status.push(StatusLevel::Error, err.to_string());
    }

    /// Mark `(x, y)` on the source, project it, mark the result on the
    /// reference and report it in physical units.
    pub fn probe_at(&mut self, x: f64, y: f64) -> Result<ProbeReading, SessionError> {
        let p = Point2::new(x, y);
        self.source.mark(p, CLICK_RADIUS, PENDING_POINT_COLOR);
        let reading = self.probe.project_to_units(p)?;
        self.destination
            .mark(reading.destination_px, CLICK_RADIUS, MANUAL_PAIR_COLOR);
        self.status
            .push(StatusLevel::Info, self.probe.format(&reading));
        self.readings.push(reading);
        Ok(reading)
    }

    /// Probe every detected source corner, rounded to whole pixels. A point
    /// that projects to infinity is reported and skipped.
    pub fn probe_detected(&mut self) -> Result<usize, SessionError> {
        let corners = self
            .detector
            .detect(&self.source.gray().view(), self.grid_rows, self.grid_cols)
            .map_err(|source| SessionError::Detection {
                view: View::Source,
                source,
            })?;
        self.status.push(
            StatusLevel::Info,
            format!("Probing {} detected corners", corners.len()),
        );

        let mut probed = 0;
        for c in corners {
            match self.probe_at(c.x.round() as f64, c.y.round() as f64) {
                Ok(_) => probed += 1,
                Err(err) => self.status.push(StatusLevel::Warning, err.to_string()),
            }
        }
        Ok(probed)
    }
}
