//! monorange CLI: calibrate a camera, replay checkerboard captures, and range
//! detections with proximity alerts.

mod replay;

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::time::Instant;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use log::info;
use monorange_core::{BoardSpec, GroundGeometry, Real};
use monorange_monitor::{
    terminal_bell, AudioCue, ClampReason, FramePipeline, MonitorConfig, SessionSummary, Silent,
};
use monorange_pipeline::{
    load_mount, CalibrationArtifact, CalibrationConfig, CalibrationResult, CalibrationSolver,
    CaptureConfig, CaptureLog, CaptureLogRecord, CaptureMethod, CaptureOutcome, CaptureStation,
    ImageSize, NoRefinement,
};
use serde::{de::DeserializeOwned, Serialize};

use crate::replay::{
    offset, wall_clock, BoardFrame, CalibrationInput, JsonLines, JsonLinesSink, RecordedCorners,
    ReplayDetector, ReplaySource,
};

#[derive(Debug, Parser)]
#[command(name = "monorange")]
#[command(about = "Monocular ground-plane ranging with proximity alerts")]
#[command(version)]
struct Cli {
    /// Log at debug level unless RUST_LOG says otherwise.
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Solve camera intrinsics from recorded checkerboard corners.
    Calibrate(CalibrateArgs),
    /// Replay recorded board detections through the capture gates.
    Capture(CaptureArgs),
    /// Print ground distances for image rows.
    Distance(DistanceArgs),
    /// Replay detector output through the ranging and alert loop.
    Monitor(MonitorArgs),
}

#[derive(Debug, Clone, Args)]
struct CalibrateArgs {
    /// JSON file with `image_size` and `views`.
    #[arg(long)]
    input: PathBuf,
    /// Optional JSON CalibrationConfig. Defaults are used if omitted.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Where to write the calibration artifact.
    #[arg(long)]
    output: Option<PathBuf>,
}

#[derive(Debug, Clone, Args)]
struct CaptureArgs {
    /// JSON-lines board stream, one frame per line.
    #[arg(long)]
    input: PathBuf,
    /// Inner corners along the board x axis.
    #[arg(long, default_value_t = 6)]
    board_cols: usize,
    /// Inner corners along the board y axis.
    #[arg(long, default_value_t = 6)]
    board_rows: usize,
    /// Square edge length in meters.
    #[arg(long, default_value_t = 0.025)]
    square_size: Real,
    /// Optional JSON CaptureConfig.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Capture log (JSON lines), appended to.
    #[arg(long)]
    log: Option<PathBuf>,
    /// Where to write accepted samples in `calibrate --input` layout.
    #[arg(long)]
    output: Option<PathBuf>,
}

#[derive(Debug, Clone, Args)]
struct GeometryArgs {
    /// Calibration artifact written by `calibrate`.
    #[arg(long)]
    artifact: PathBuf,
    /// Mount measurement JSON: {"height_m": .., "tilt_deg": ..}.
    #[arg(long)]
    mount: PathBuf,
    /// Optional JSON MonitorConfig.
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Debug, Clone, Args)]
struct DistanceArgs {
    #[command(flatten)]
    geometry: GeometryArgs,
    /// Image rows (pixels) of object bases.
    #[arg(long = "y", required = true, num_args = 1.., allow_negative_numbers = true)]
    rows: Vec<Real>,
}

#[derive(Debug, Clone, Args)]
struct MonitorArgs {
    #[command(flatten)]
    geometry: GeometryArgs,
    /// JSON-lines detector output, one frame per line.
    #[arg(long)]
    detections: PathBuf,
    /// Where to write annotated frames (JSON lines).
    #[arg(long)]
    output: Option<PathBuf>,
    /// Stop after this many frames.
    #[arg(long)]
    max_frames: Option<u64>,
    /// Do not ring the terminal bell on alerts.
    #[arg(long)]
    mute: bool,
}

fn load_json_file<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let data = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&data).with_context(|| format!("parsing {}", path.display()))
}

fn load_config<T: DeserializeOwned + Default>(path: Option<&Path>) -> Result<T> {
    path.map_or_else(|| Ok(T::default()), load_json_file)
}

fn write_json_file<T: Serialize>(value: &T, path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    fs::write(path, json).with_context(|| format!("writing {}", path.display()))
}

fn run_calibrate(args: &CalibrateArgs) -> Result<CalibrationResult> {
    let input: CalibrationInput = load_json_file(&args.input)?;
    let config: CalibrationConfig = load_config(args.config.as_deref())?;

    let mut solver = CalibrationSolver::new(config);
    for (i, view) in input.views.into_iter().enumerate() {
        solver
            .accumulate(view)
            .with_context(|| format!("view {i} of {}", args.input.display()))?;
    }
    let result = solver.solve(input.image_size)?;

    if let Some(path) = &args.output {
        result
            .to_artifact()
            .save(path)
            .with_context(|| format!("saving artifact to {}", path.display()))?;
        info!("wrote calibration artifact to {}", path.display());
    }
    Ok(result)
}

#[derive(Debug, Default, Serialize)]
struct CaptureSummary {
    frames: usize,
    accepted: usize,
    rejected: BTreeMap<String, usize>,
}

fn run_capture(args: &CaptureArgs) -> Result<CaptureSummary> {
    let config: CaptureConfig = load_config(args.config.as_deref())?;
    let board = BoardSpec {
        cols: args.board_cols,
        rows: args.board_rows,
        square_size: args.square_size,
    };
    if board.corner_count() < 4 {
        bail!("a {}x{} board has too few corners", board.cols, board.rows);
    }
    let mut station = CaptureStation::new(board, RecordedCorners, NoRefinement, config);
    if let Some(path) = args.log.as_deref().filter(|p| p.exists()) {
        let earlier = CaptureLog::read_all(path)?.len();
        info!("{} already lists {earlier} samples", path.display());
        station.gatekeeper_mut().resume_from(earlier);
    }
    let mut log = args.log.as_deref().map(CaptureLog::open).transpose()?;

    let t0 = Instant::now();
    let started = chrono::Local::now().naive_local();
    let mut summary = CaptureSummary::default();
    let mut views = Vec::new();
    let mut image_size = None;

    for record in JsonLines::<BoardFrame>::open(&args.input)? {
        let frame = record?;
        summary.frames += 1;
        let method = if frame.manual {
            CaptureMethod::Manual
        } else {
            CaptureMethod::Auto
        };
        let now = offset(t0, frame.timestamp_s)
            .with_context(|| format!("frame {} of {}", summary.frames, args.input.display()))?;
        match station.process(&frame, frame.width, frame.height, now, method)? {
            CaptureOutcome::Accepted(sample) => {
                summary.accepted += 1;
                image_size.get_or_insert(ImageSize::new(frame.width, frame.height));
                if let Some(log) = log.as_mut() {
                    let taken_at = wall_clock(&started, frame.timestamp_s).with_context(|| {
                        format!("frame {} of {}", summary.frames, args.input.display())
                    })?;
                    log.append(&CaptureLogRecord::new(
                        sample.index,
                        &taken_at,
                        method,
                        frame.width,
                        frame.height,
                    ))?;
                }
                views.push(sample.view);
            }
            CaptureOutcome::Rejected(reason) => {
                *summary.rejected.entry(format!("{reason:?}")).or_default() += 1;
            }
        }
    }

    if let Some(path) = &args.output {
        let Some(image_size) = image_size else {
            bail!("no sample was accepted, nothing to write to {}", path.display());
        };
        write_json_file(&CalibrationInput { image_size, views }, path)?;
    }
    info!("accepted {} of {} frames", summary.accepted, summary.frames);
    Ok(summary)
}

fn load_monitor_setup(args: &GeometryArgs) -> Result<(MonitorConfig, GroundGeometry)> {
    let config: MonitorConfig = load_config(args.config.as_deref())?;
    let artifact = CalibrationArtifact::load(&args.artifact)?;
    let mount = load_mount(&args.mount)?;
    let geometry = artifact
        .ground_geometry(&mount)
        .context("combining calibration with the mount measurement")?;
    Ok((config, geometry))
}

#[derive(Debug, Serialize)]
struct DistanceRow {
    y: Real,
    meters: Real,
    clamped: Option<ClampReason>,
}

fn run_distance(args: &DistanceArgs) -> Result<Vec<DistanceRow>> {
    let (config, geometry) = load_monitor_setup(&args.geometry)?;
    let estimator = config.estimator(geometry);
    Ok(args
        .rows
        .iter()
        .map(|&y| {
            let e = estimator.estimate_detailed(y);
            DistanceRow {
                y,
                meters: e.meters,
                clamped: e.clamped,
            }
        })
        .collect())
}

fn run_monitor(args: &MonitorArgs) -> Result<SessionSummary> {
    let (config, geometry) = load_monitor_setup(&args.geometry)?;
    let source = ReplaySource::open(&args.detections)?;
    let out: Box<dyn io::Write> = match &args.output {
        Some(path) => Box::new(io::BufWriter::new(
            fs::File::create(path).with_context(|| format!("creating {}", path.display()))?,
        )),
        None => Box::new(io::sink()),
    };
    let cue: Box<dyn AudioCue> = if args.mute {
        Box::new(Silent)
    } else {
        Box::new(terminal_bell())
    };

    let mut pipeline = FramePipeline::new(
        source,
        ReplayDetector,
        JsonLinesSink::new(out),
        &*cue,
        config.estimator(geometry),
        config.alert_machine(),
    )
    .with_max_frames(args.max_frames);
    let quit = AtomicBool::new(false);
    Ok(pipeline.run(&quit)?)
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default)).init();
}

fn main() {
    if let Err(err) = try_main() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

fn try_main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let json = match &cli.command {
        Commands::Calibrate(args) => serde_json::to_string_pretty(&run_calibrate(args)?)?,
        Commands::Capture(args) => serde_json::to_string_pretty(&run_capture(args)?)?,
        Commands::Distance(args) => serde_json::to_string_pretty(&run_distance(args)?)?,
        Commands::Monitor(args) => serde_json::to_string_pretty(&run_monitor(args)?)?,
    };
    println!("{json}");
    Ok(())
}
