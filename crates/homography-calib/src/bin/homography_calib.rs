//! homography-calib CLI: calibrate a source→reference homography and probe
//! points through it.

use clap::{ArgAction, Args, Parser, Subcommand};
use homography_calib::config::CalibConfig;
use homography_calib::events::{self, KeyMap, PngDirHost, ScriptEventSource};
use homography_calib::probe_session::ProbeSession;
use homography_calib::session::Session;
use nalgebra::Point2;
use std::fs::File;
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

type CliError = Box<dyn std::error::Error>;
type CliResult<T> = Result<T, CliError>;

#[derive(Parser)]
#[command(name = "homography-calib")]
#[command(about = "Match points between a photo and a planar reference and estimate the homography")]
#[command(version)]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace).
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run an interactive calibration session.
    Calibrate(CalibrateArgs),

    /// Project points through the configured matrix.
    Probe(ProbeArgs),

    /// Write a config file with every default filled in.
    InitConfig {
        /// Destination JSON path.
        #[arg(long)]
        out: PathBuf,
    },
}

#[derive(Debug, Clone, Args)]
struct CalibrateArgs {
    /// JSON config; defaults are used when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Event script (one event per line); stdin when omitted.
    #[arg(long)]
    script: Option<PathBuf>,
}

#[derive(Debug, Clone, Args)]
struct ProbeArgs {
    /// JSON config; defaults are used when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Source pixel to project, as `x,y`. Repeatable. Without any, an
    /// interactive probe session runs on the configured images.
    #[arg(long = "point", value_parser = parse_point)]
    points: Vec<Point2<f64>>,

    /// Event script for the interactive probe session; stdin when omitted.
    #[arg(long)]
    script: Option<PathBuf>,
}

fn parse_point(raw: &str) -> Result<Point2<f64>, String> {
    let (x, y) = raw
        .split_once(',')
        .ok_or_else(|| format!("expected x,y, got `{raw}`"))?;
    let coord = |s: &str| {
        s.trim()
            .parse::<f64>()
            .map_err(|e| format!("bad coordinate `{s}`: {e}"))
    };
    Ok(Point2::new(coord(x)?, coord(y)?))
}

fn init_logging(verbose: u8) {
    #[cfg(feature = "tracing")]
    {
        let _ = tracing_log::LogTracer::init();
        let level = homography_calib::core::level_for_verbosity(verbose);
        homography_calib::core::init_tracing(false, level);
    }
    #[cfg(not(feature = "tracing"))]
    {
        let level = homography_calib::core::level_for_verbosity(verbose);
        if let Err(err) = homography_calib::core::init_with_level(level) {
            eprintln!("logger already installed: {err}");
        }
    }
}

fn load_config(path: Option<&Path>) -> CliResult<CalibConfig> {
    let cfg = match path {
        Some(path) => CalibConfig::load_json(path)?,
        None => CalibConfig::default(),
    };
    cfg.validate()?;
    Ok(cfg)
}

fn script_source(path: Option<&Path>) -> CliResult<Box<dyn events::EventSource>> {
    Ok(match path {
        Some(path) => Box::new(ScriptEventSource::new(BufReader::new(File::open(path)?))),
        None => Box::new(ScriptEventSource::new(io::stdin().lock())),
    })
}

fn run_calibrate(args: CalibrateArgs) -> CliResult<()> {
    let cfg = load_config(args.config.as_deref())?;
    let mut session = Session::open(&cfg, cfg.build_detector(), cfg.build_engine())?;
    let keymap = KeyMap::default();
    println!("{}", keymap.controls());

    let mut source = script_source(args.script.as_deref())?;
    let mut host = PngDirHost::new(&cfg.output_dir)?;
    events::run(&mut session, source.as_mut(), &mut host, &keymap)?;

    if let Some(text) = session.last_export() {
        log::info!("last exported matrix:\n{text}");
    }
    Ok(())
}

fn run_probe(args: ProbeArgs) -> CliResult<()> {
    let cfg = load_config(args.config.as_deref())?;
    let probe = cfg.build_probe()?;

    if !args.points.is_empty() {
        for reading in probe.probe_batch(&args.points) {
            match reading {
                Ok(r) => println!("{}", probe.format(&r)),
                Err(err) => println!("error: {err}"),
            }
        }
        return Ok(());
    }

    let mut session = ProbeSession::open(&cfg, probe, cfg.build_detector())?;
    let mut source = script_source(args.script.as_deref())?;
    let mut host = PngDirHost::new(&cfg.output_dir)?;
    events::run_probe(&mut session, source.as_mut(), &mut host, &KeyMap::default())?;
    Ok(())
}

fn run(command: Commands) -> CliResult<()> {
    match command {
        Commands::Calibrate(args) => run_calibrate(args),
        Commands::Probe(args) => run_probe(args),
        Commands::InitConfig { out } => {
            CalibConfig::default().write_json(&out)?;
            println!("wrote default config to {}", out.display());
            Ok(())
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}
