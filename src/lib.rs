//! Content-based scene cut detection with flash suppression
//!
//! Frames are scored by how much their HSV content differs from the previous
//! frame. Scores above a threshold are cut candidates; a small state machine
//! confirms a candidate only when the change is sustained for a configurable
//! number of frames, so camera flashes and flicker don't split scenes.
//!
//! # Quick Start
//!
//! ```rust
//! use scenecut::{detect_scenes_in, DetectorConfig, Frame, MemoryFrameSource};
//!
//! let dark = Frame::solid(32, 18, [20, 20, 20])?;
//! let bright = Frame::solid(32, 18, [200, 180, 40])?;
//! let frames = vec![dark.clone(), dark, bright.clone(), bright];
//!
//! let mut source = MemoryFrameSource::new(frames, 25.0)?;
//! let scenes = detect_scenes_in(&mut source, DetectorConfig::new().threshold(27.0))?;
//!
//! assert_eq!(scenes.len(), 2);
//! assert_eq!(scenes[1].start.frame_number(), 2);
//! # Ok::<(), scenecut::SceneDetectError>(())
//! ```
//!
//! Reading video files needs the `opencv` feature, which adds
//! [`VideoStream`], [`detect`] and [`detect_scene_changes`].

mod common;
mod config;
mod content_detector;
mod flash_filter;
mod frame_source;
mod scene_manager;
mod timecode;
#[cfg(feature = "opencv")]
mod video_stream;

// Re-export main types for public API
pub use common::{Result, Scene, SceneDetectError};
pub use config::{DetectorConfig, DEFAULT_THRESHOLD, MAX_SCORE};
pub use content_detector::{bgr_to_hsv, content_score, ComponentWeights, ContentDetector};
pub use flash_filter::{FilterState, FlashFilter};
pub use frame_source::{auto_downscale_factor, Frame, FrameSource, MemoryFrameSource};
pub use scene_manager::{SceneDetector, SceneManager};
pub use timecode::{FrameTimecode, FrameWindow};
#[cfg(feature = "opencv")]
pub use video_stream::VideoStream;

use tracing::{info, instrument};

/// Run a content detector over a frame source and return its scenes
///
/// The source's current window is analyzed; the source is released afterwards.
///
/// # Errors
/// * `InvalidConfig` - If `config` is invalid
/// * any error from [`SceneManager::detect_scenes`]
#[instrument(skip(source))]
pub fn detect_scenes_in<S: FrameSource + ?Sized>(source: &mut S, config: DetectorConfig) -> Result<Vec<Scene>> {
    let base = source.base_timecode()?;

    let mut manager = SceneManager::new();
    manager.add_detector(ContentDetector::with_config(config)?);
    manager.detect_scenes(source)?;

    let scenes = manager.scene_list(&base)?;
    info!("Detected {} scenes", scenes.len());
    Ok(scenes)
}

/// Detect scenes in a video file
///
/// # Arguments
/// * `video_path` - Path to the video file to analyze
/// * `config` - Detector settings
/// * `window` - Optional `(start, end)` timecode strings; defaults to the whole video
///
/// # Example
/// ```rust,no_run
/// use scenecut::{detect, DetectorConfig};
///
/// let config = DetectorConfig::new().threshold(27.0).flicker_frames(2);
/// let scenes = detect("my_video.mp4", config, Some(("00:00:05", "00:00:15")))?;
///
/// for (i, scene) in scenes.iter().enumerate() {
///     println!("Scene {}: {} - {}", i + 1, scene.start, scene.end);
/// }
/// # Ok::<(), scenecut::SceneDetectError>(())
/// ```
#[cfg(feature = "opencv")]
#[instrument(skip(config))]
pub fn detect(video_path: &str, config: DetectorConfig, window: Option<(&str, &str)>) -> Result<Vec<Scene>> {
    info!("Starting scene detection for: {}", video_path);

    let mut stream = VideoStream::open(video_path)?;
    if let Some((start, end)) = window {
        let fps = stream.framerate();
        let window = FrameWindow::new(FrameTimecode::parse(start, fps)?, FrameTimecode::parse(end, fps)?)?;
        stream.set_window(window)?;
    }

    detect_scenes_in(&mut stream, config)
}

/// Frame numbers where new scenes start, with default settings
///
/// The first scene always starts at frame 0, so it is not reported.
#[cfg(feature = "opencv")]
#[instrument]
pub fn detect_scene_changes(video_path: &str) -> Result<Vec<u32>> {
    let scenes = detect(video_path, DetectorConfig::default(), None)?;

    let frame_numbers: Vec<u32> = scenes.iter().skip(1).map(|scene| scene.start.frame_number()).collect();

    info!("Extracted {} scene change frame numbers", frame_numbers.len());

    Ok(frame_numbers)
}

/// Get video information without performing scene detection
#[cfg(feature = "opencv")]
#[instrument]
pub fn get_video_info(video_path: &str) -> Result<VideoInfo> {
    let mut stream = VideoStream::open(video_path)?;
    let info = VideoInfo {
        path: video_path.to_string(),
        fps: stream.framerate(),
        frame_count: stream.frame_count(),
        width: stream.width(),
        height: stream.height(),
        duration_seconds: stream.duration_seconds(),
    };
    stream.release();
    Ok(info)
}

/// Video metadata information
#[derive(Debug, Clone, PartialEq)]
pub struct VideoInfo {
    pub path: String,
    pub fps: f64,
    pub frame_count: u32,
    pub width: u32,
    pub height: u32,
    pub duration_seconds: f64,
}

impl VideoInfo {
    /// Get a human-readable description of the video
    pub fn description(&self) -> String {
        format!(
            "{}x{} at {:.2}fps, {} frames ({:.1}s duration)",
            self.width, self.height, self.fps, self.frame_count, self.duration_seconds
        )
    }

    /// Check if this appears to be a valid video configuration
    pub fn is_valid(&self) -> bool {
        self.fps > 0.0 && self.frame_count > 0 && self.width > 0 && self.height > 0 && self.duration_seconds > 0.0
    }
}

/// Initialize tracing for the library
///
/// `RUST_LOG` takes precedence over `level`. Calling this more than once is harmless.
///
/// # Arguments
/// * `level` - Tracing level filter (e.g., "debug", "info", "warn", "error")
pub fn init_tracing(level: &str) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let installed = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_file(true)
        .with_line_number(true)
        .with_writer(std::io::stderr)
        .try_init()
        .is_ok();

    if installed {
        info!("Scene detection tracing initialized at level: {}", level);
    }
}
