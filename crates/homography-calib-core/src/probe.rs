//! Point projection through a fixed, externally supplied homography.
//!
//! The probe never looks at a live correspondence session: its matrix is
//! whatever the operator exported earlier (or typed into a config file).

use crate::homography::Homography;
use nalgebra::{Point2, Vector2};

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ProbeError {
    #[error("point ({x}, {y}) projects to infinity")]
    PointAtInfinity { x: f64, y: f64 },
    #[error("pixels per unit must be positive and finite, got {0}")]
    InvalidScale(f64),
}

/// Homogeneous projection `H · [x, y, 1]ᵗ`, dehomogenized.
pub fn project_point(p: Point2<f64>, h: &Homography) -> Result<Point2<f64>, ProbeError> {
    h.project(p)
        .ok_or(ProbeError::PointAtInfinity { x: p.x, y: p.y })
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ProbeReading {
    pub source: Point2<f64>,
    /// Projected position in destination pixels.
    pub destination_px: Point2<f64>,
    /// Projected position in physical units, offset applied.
    pub physical: Point2<f64>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct PointProbe {
    homography: Homography,
    pixels_per_unit: f64,
    offset: Vector2<f64>,
    precision: usize,
    unit: String,
}

impl PointProbe {
    pub fn new(homography: Homography, pixels_per_unit: f64) -> Result<Self, ProbeError> {
        if !(pixels_per_unit.is_finite() && pixels_per_unit > 0.0) {
            return Err(ProbeError::InvalidScale(pixels_per_unit));
        }
        Ok(Self {
            homography,
            pixels_per_unit,
            offset: Vector2::zeros(),
            precision: 2,
            unit: "in".to_string(),
        })
    }

    /// Constant added to every physical reading (e.g. a robot-frame origin).
    pub fn with_offset(mut self, offset: Vector2<f64>) -> Self {
        self.offset = offset;
        self
    }

    /// Decimal places used by [`PointProbe::format`].
    pub fn with_precision(mut self, precision: usize) -> Self {
        self.precision = precision;
        self
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = unit.into();
        self
    }

    pub fn homography(&self) -> &Homography {
        &self.homography
    }

    pub fn project(&self, p: Point2<f64>) -> Result<Point2<f64>, ProbeError> {
        project_point(p, &self.homography)
    }

    pub fn project_to_units(&self, p: Point2<f64>) -> Result<ProbeReading, ProbeError> {
        let destination_px = self.project(p)?;
        let physical = Point2::from(destination_px.coords / self.pixels_per_unit + self.offset);
        Ok(ProbeReading {
            source: p,
            destination_px,
            physical,
        })
    }

    /// Probe every point in order; failures do not stop the batch.
    pub fn probe_batch(&self, points: &[Point2<f64>]) -> Vec<Result<ProbeReading, ProbeError>> {
        points.iter().map(|p| self.project_to_units(*p)).collect()
    }

    pub fn format(&self, r: &ProbeReading) -> String {
        let prec = self.precision;
        format!(
            "Source: ({}, {}) -> Destination: ({:.prec$}, {:.prec$}) {}",
            r.source.x, r.source.y, r.physical.x, r.physical.y, self.unit
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn identity_maps_origin_to_origin() {
        let p = project_point(Point2::new(0.0, 0.0), &Homography::identity()).expect("finite");
        assert_eq!(p, Point2::new(0.0, 0.0));
    }

    #[test]
    fn uniform_scale_doubles_coordinates() {
        let h = Homography::from_array([[2.0, 0.0, 0.0], [0.0, 2.0, 0.0], [0.0, 0.0, 1.0]]);
        assert_eq!(
            project_point(Point2::new(3.0, 4.0), &h).expect("finite"),
            Point2::new(6.0, 8.0)
        );
    }

    #[test]
    fn zero_w_is_reported() {
        let h = Homography::from_array([[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 0.0]]);
        assert_eq!(
            project_point(Point2::new(1.0, 2.0), &h),
            Err(ProbeError::PointAtInfinity { x: 1.0, y: 2.0 })
        );
    }

    #[test]
    fn physical_units_divide_by_scale_and_add_offset() {
        let probe = PointProbe::new(Homography::identity(), 96.0)
            .expect("scale")
            .with_offset(Vector2::new(0.0, 24.0));
        let r = probe.project_to_units(Point2::new(192.0, 48.0)).expect("finite");
        assert_relative_eq!(r.physical.x, 2.0);
        assert_relative_eq!(r.physical.y, 24.5);
        assert_eq!(
            probe.format(&r),
            "Source: (192, 48) -> Destination: (2.00, 24.50) in"
        );
    }

    #[test]
    fn batch_keeps_order_and_isolates_failures() {
        let h = Homography::from_array([[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [1.0, 0.0, 1.0]]);
        let probe = PointProbe::new(h, 1.0).expect("scale");
        let out = probe.probe_batch(&[
            Point2::new(1.0, 1.0),
            Point2::new(-1.0, 3.0),
            Point2::new(0.0, 5.0),
        ]);
        assert_eq!(out.len(), 3);
        assert!(out[0].is_ok());
        assert!(out[1].is_err());
        assert_eq!(out[2].as_ref().expect("finite").physical, Point2::new(0.0, 5.0));
    }

    #[test]
    fn rejects_non_positive_scale() {
        assert_eq!(
            PointProbe::new(Homography::identity(), 0.0).unwrap_err(),
            ProbeError::InvalidScale(0.0)
        );
    }
}
