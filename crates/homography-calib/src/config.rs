//! JSON configuration for the calibration and probe tools.

use crate::chessboard::{ChessboardParams, SubPixParams};
use crate::core::{
    DltSolver, Homography, HomographyEngine, PointProbe, ProbeError, RansacParams, RansacSolver,
};
use crate::detect::{default_chess_config, ChessGridDetector};
use chess_corners::ChessConfig;
use nalgebra::Vector2;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error("grid needs at least 2x2 inner corners, got {rows}x{cols}")]
    GridShape { rows: u32, cols: u32 },
    #[error("{field} must be positive and finite, got {value}")]
    NotPositive { field: &'static str, value: f64 },
}

/// Which homography solver the engine uses.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SolverConfig {
    /// Least squares over every pair.
    #[default]
    Dlt,
    Ransac(RansacParams),
}

/// ChESS response and grid recovery settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    pub threshold_rel: f32,
    pub nms_radius: u32,
    pub min_strength: f32,
    pub snap_tolerance: f32,
    pub subpix: Option<SubPixParams>,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        let grid = ChessboardParams::default();
        Self {
            threshold_rel: 0.2,
            nms_radius: 2,
            min_strength: grid.min_strength,
            snap_tolerance: grid.snap_tolerance,
            subpix: grid.subpix,
        }
    }
}

impl DetectorConfig {
    pub fn chess_config(&self) -> ChessConfig {
        let mut cfg = default_chess_config();
        cfg.params.threshold_rel = self.threshold_rel;
        cfg.params.nms_radius = self.nms_radius as _;
        cfg
    }

    pub fn chessboard_params(&self) -> ChessboardParams {
        ChessboardParams {
            min_strength: self.min_strength,
            snap_tolerance: self.snap_tolerance,
            subpix: self.subpix,
            ..ChessboardParams::default()
        }
    }
}

/// Fixed matrix and unit conversion for the probe tool.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    /// Row-major 3×3 source → reference matrix, as exported by `calibrate`.
    pub homography: [[f64; 3]; 3],
    /// Added to every physical reading.
    pub offset: [f64; 2],
    pub precision: usize,
    pub unit: String,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            homography: [
                [4.158013, 5.076947, -1146.668632],
                [-1.674058, 8.920382, -450.058258],
                [-0.000171, 0.003455, 1.0],
            ],
            offset: [0.0, 0.0],
            precision: 2,
            unit: "in".to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibConfig {
    /// Captured photograph.
    pub source_path: PathBuf,
    /// Planar reference template.
    pub reference_path: PathBuf,
    /// Inner corners per column.
    pub grid_rows: u32,
    /// Inner corners per row.
    pub grid_cols: u32,
    /// Side of the square canonical frame used by rotate / flip.
    pub canonical_size: f64,
    /// Reference pixels per physical unit.
    pub pixels_per_unit: f64,
    /// Where rendered views are written.
    pub output_dir: PathBuf,
    pub solver: SolverConfig,
    pub min_singular_ratio: f64,
    pub detector: DetectorConfig,
    pub probe: ProbeConfig,
}

impl Default for CalibConfig {
    fn default() -> Self {
        Self {
            source_path: PathBuf::from("snapshot.png"),
            reference_path: PathBuf::from("referenceChessboard.png"),
            grid_rows: 7,
            grid_cols: 7,
            canonical_size: 768.0,
            pixels_per_unit: 96.0,
            output_dir: PathBuf::from("homography_out"),
            solver: SolverConfig::default(),
            min_singular_ratio: 1e-9,
            detector: DetectorConfig::default(),
            probe: ProbeConfig::default(),
        }
    }
}

fn positive(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::NotPositive { field, value })
    }
}

impl CalibConfig {
    /// Load a JSON config from disk.
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Write this config to disk as pretty JSON.
    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.grid_rows < 2 || self.grid_cols < 2 {
            return Err(ConfigError::GridShape {
                rows: self.grid_rows,
                cols: self.grid_cols,
            });
        }
        positive("canonical_size", self.canonical_size)?;
        positive("pixels_per_unit", self.pixels_per_unit)?;
        positive("detector.snap_tolerance", self.detector.snap_tolerance as f64)?;
        if self.min_singular_ratio < 0.0 || !self.min_singular_ratio.is_finite() {
            return Err(ConfigError::NotPositive {
                field: "min_singular_ratio",
                value: self.min_singular_ratio,
            });
        }
        if let SolverConfig::Ransac(p) = &self.solver {
            positive("solver.threshold", p.threshold)?;
        }
        Ok(())
    }

    pub fn build_engine(&self) -> HomographyEngine {
        let engine = match &self.solver {
            SolverConfig::Dlt => HomographyEngine::new(DltSolver),
            SolverConfig::Ransac(p) => HomographyEngine::new(RansacSolver::new(p.clone())),
        };
        engine.with_min_singular_ratio(self.min_singular_ratio)
    }

    pub fn build_detector(&self) -> ChessGridDetector {
        ChessGridDetector::new(
            self.detector.chess_config(),
            self.detector.chessboard_params(),
        )
    }

    pub fn build_probe(&self) -> Result<PointProbe, ProbeError> {
        let [dx, dy] = self.probe.offset;
        Ok(
            PointProbe::new(Homography::from_array(self.probe.homography), self.pixels_per_unit)?
                .with_offset(Vector2::new(dx, dy))
                .with_precision(self.probe.precision)
                .with_unit(self.probe.unit.clone()),
        )
    }
}
