//! High-level facade for two-image homography calibration.
//!
//! This crate provides:
//! - re-exports of the geometry core and the chessboard grid detector
//! - a `chess-corners` backed [`CornerDetector`](core::CornerDetector)
//! - the interactive calibration [`Session`] and the probe session
//! - a line-oriented event source and a PNG-writing view host
//!
//! ## Quickstart
//!
//! ```no_run
//! use homography_calib::{config::CalibConfig, events, session::Session};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let cfg = CalibConfig::load_json("calib.json")?;
//! cfg.validate()?;
//! let mut session = Session::open(&cfg, cfg.build_detector(), cfg.build_engine())?;
//! let mut source = events::ScriptEventSource::new(std::io::stdin().lock());
//! let mut host = events::PngDirHost::new(&cfg.output_dir)?;
//! events::run(&mut session, &mut source, &mut host, &events::KeyMap::default())?;
//! # Ok(())
//! # }
//! ```
//!
//! ## API map
//! - `homography_calib::core`: points, transforms, store, engine, compositing, probe.
//! - `homography_calib::chessboard`: grid recovery from corner candidates.
//! - [`detect`]: `image` / `chess-corners` glue.
//! - [`config`]: JSON configuration.
//! - [`session`]: calibration and probe sessions.
//! - [`events`]: key map, dispatch, event sources and view hosts.

pub use homography_calib_chessboard as chessboard;
pub use homography_calib_core as core;

pub mod config;
pub mod detect;
pub mod events;
pub mod probe_session;
pub mod session;

pub use config::{CalibConfig, ConfigError};
pub use session::{Session, SessionError, Status, StatusLevel, View};
