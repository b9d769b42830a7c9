//! Command-line interface for the scene cut detector
//!
//! Analyzes a video file (or a window of it) and prints the detected scenes.

use std::path::PathBuf;
use std::process;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use tracing::{debug, info, warn};

use scenecut::{
    get_video_info, init_tracing, ContentDetector, DetectorConfig, FrameSource, FrameTimecode,
    FrameWindow, Scene, SceneManager, VideoStream,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    /// Start frames of each new scene
    Simple,
    /// One line per scene with timecodes
    Detailed,
    /// JSON for integration
    Json,
}

#[derive(Debug, Parser)]
#[command(
    name = "scenecut",
    version,
    about = "Detect scene cuts in a video, ignoring flashes and flicker"
)]
struct Args {
    /// Video file to analyze
    video_path: PathBuf,

    /// Score threshold for a cut candidate (0-255)
    #[arg(long)]
    threshold: Option<f64>,

    /// Consecutive frames above threshold required to confirm a cut (0 disables flash suppression)
    #[arg(long)]
    flicker_frames: Option<u32>,

    /// Minimum frames between consecutive cuts
    #[arg(long)]
    min_scene_len: Option<u32>,

    /// Use only brightness changes
    #[arg(long)]
    luma_only: bool,

    /// JSON file with detector options; command-line flags override it
    #[arg(long)]
    config: Option<PathBuf>,

    /// First frame to analyze (HH:MM:SS[.nnn], frame number, or seconds with an 's' suffix)
    #[arg(long)]
    start: Option<String>,

    /// Last frame to analyze (same forms as --start)
    #[arg(long)]
    end: Option<String>,

    /// Keep every Nth pixel before scoring; omit for automatic, 1 disables
    #[arg(long)]
    downscale: Option<u32>,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Simple)]
    format: OutputFormat,

    /// Enable debug logging
    #[arg(long)]
    verbose: bool,

    /// Show video information only
    #[arg(long)]
    info: bool,
}

fn main() {
    let args = Args::parse();

    let log_level = if args.verbose { "debug" } else { "warn" };
    init_tracing(log_level);

    if let Err(e) = run(&args) {
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
}

fn run(args: &Args) -> Result<()> {
    info!("scenecut v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", args);

    let video_path = args
        .video_path
        .to_str()
        .context("video path is not valid UTF-8")?;

    if args.info {
        return show_video_info(video_path);
    }

    let config = build_config(args)?;
    debug!("Detector configuration: {:?}", config);

    let mut stream = VideoStream::open(video_path).with_context(|| format!("failed to open {}", video_path))?;
    stream.set_downscale_factor(args.downscale)?;

    let fps = stream.framerate();
    let base = stream.base_timecode()?;
    let window = build_window(args, &stream)?;
    stream.set_window(window)?;

    let mut manager = SceneManager::new();
    manager.add_detector(ContentDetector::with_config(config.clone())?);

    let started = Instant::now();
    let frames = manager
        .detect_scenes(&mut stream)
        .context("scene detection failed")?;
    let elapsed = started.elapsed();

    let scenes = manager.scene_list(&base)?;
    info!(
        "Processed {} frames at {:.0} fps in {:.2}s",
        frames,
        frames as f64 / elapsed.as_secs_f64().max(f64::EPSILON),
        elapsed.as_secs_f64()
    );

    print_results(args, &config, fps, frames, &scenes, elapsed)
}

fn build_config(args: &Args) -> Result<DetectorConfig> {
    let mut config = match &args.config {
        Some(path) => DetectorConfig::from_json_file(path)
            .with_context(|| format!("failed to load detector options from {}", path.display()))?,
        None => DetectorConfig::default(),
    };

    if let Some(threshold) = args.threshold {
        config = config.threshold(threshold);
    }
    if let Some(flicker_frames) = args.flicker_frames {
        config = config.flicker_frames(flicker_frames);
    }
    if let Some(min_scene_len) = args.min_scene_len {
        config = config.min_scene_len(min_scene_len);
    }
    if args.luma_only {
        config = config.luma_only();
    }

    config.validate()?;
    Ok(config)
}

fn build_window(args: &Args, stream: &VideoStream) -> Result<FrameWindow> {
    let fps = stream.framerate();
    let full = stream
        .window()
        .context("video stream has no frames to analyze")?;

    let start = match &args.start {
        Some(text) => FrameTimecode::parse(text, fps).context("invalid --start")?,
        None => full.start(),
    };
    let end = match &args.end {
        Some(text) => FrameTimecode::parse(text, fps).context("invalid --end")?,
        None => full.end(),
    };

    FrameWindow::new(start, end).context("invalid analysis window")
}

fn show_video_info(video_path: &str) -> Result<()> {
    let video_info = get_video_info(video_path).context("failed to get video info")?;

    println!("Video Information:");
    println!("  Path: {}", video_info.path);
    println!("  Dimensions: {}x{}", video_info.width, video_info.height);
    println!("  Frame Rate: {:.3} fps", video_info.fps);
    println!("  Frame Count: {}", video_info.frame_count);
    println!("  Duration: {:.2} seconds", video_info.duration_seconds);

    if !video_info.is_valid() {
        warn!("Video properties appear invalid - detection may fail");
    }

    Ok(())
}

fn print_results(
    args: &Args,
    config: &DetectorConfig,
    fps: f64,
    frames: u32,
    scenes: &[Scene],
    elapsed: Duration,
) -> Result<()> {
    match args.format {
        OutputFormat::Simple => {
            let cuts: Vec<u32> = scenes.iter().skip(1).map(|s| s.start.frame_number()).collect();
            println!("Scene changes detected at frames: {:?}", cuts);
        }
        OutputFormat::Detailed => {
            println!("Scene Detection Results:");
            println!("  Frames analyzed: {} ({:.3} fps)", frames, fps);
            println!("  Detection time: {}ms", elapsed.as_millis());
            println!("  Scenes found: {}", scenes.len());
            for (i, scene) in scenes.iter().enumerate() {
                println!(
                    "    Scene {:>3}: {} - {}  (frames {}-{}, {} frames)",
                    i + 1,
                    scene.start,
                    scene.end,
                    scene.start.frame_number(),
                    scene.end.frame_number(),
                    scene.duration_frames()
                );
            }
        }
        OutputFormat::Json => {
            let scene_list: Vec<serde_json::Value> = scenes
                .iter()
                .map(|scene| {
                    serde_json::json!({
                        "start_frame": scene.start.frame_number(),
                        "end_frame": scene.end.frame_number(),
                        "start_timecode": scene.start.to_string(),
                        "end_timecode": scene.end.to_string(),
                        "duration_seconds": scene.duration_seconds(),
                    })
                })
                .collect();

            let config_json = config.to_json()?;
            let output = serde_json::json!({
                "video_path": args.video_path.display().to_string(),
                "fps": fps,
                "frames_processed": frames,
                "detection_time_ms": elapsed.as_millis() as u64,
                "scene_count": scenes.len(),
                "scenes": scene_list,
                "config": config_json,
            });

            println!(
                "{}",
                serde_json::to_string_pretty(&output).context("JSON serialization failed")?
            );
        }
    }

    Ok(())
}
