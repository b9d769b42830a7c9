//! Common types and error handling for the scene detection library.
//!
//! This module provides the scene type produced at the end of a detection run
//! and the error type shared by every stage of the pipeline.

use tracing::{debug, instrument};

use crate::timecode::{FrameTimecode, MAX_END_FRAME};

/// A contiguous span of frames between two confirmed cuts (or window bounds)
///
/// Both `start` and `end` are inclusive, so a scene of a single frame has
/// `start == end`.
#[derive(Debug, Clone, PartialEq)]
pub struct Scene {
    pub start: FrameTimecode,
    pub end: FrameTimecode,
}

impl Scene {
    /// Create a scene from inclusive start and end timecodes
    ///
    /// # Errors
    /// * `FramerateMismatch` - If the timecodes use different framerates
    /// * `InvalidWindow` - If `end` is before `start`, or `end` is frame `u32::MAX`
    #[instrument]
    pub fn new(start: FrameTimecode, end: FrameTimecode) -> Result<Self> {
        start.ensure_same_rate(&end)?;
        if end.frame_number() < start.frame_number() {
            return Err(SceneDetectError::InvalidWindow {
                message: format!(
                    "scene end frame {} is before start frame {}",
                    end.frame_number(),
                    start.frame_number()
                ),
            });
        }
        if end.frame_number() > MAX_END_FRAME {
            return Err(SceneDetectError::InvalidWindow {
                message: format!("scene end frame {} is past the last usable frame", end.frame_number()),
            });
        }

        debug!("Created Scene: frames {}-{}", start.frame_number(), end.frame_number());

        Ok(Self { start, end })
    }

    /// Number of frames in this scene (inclusive on both ends)
    ///
    /// Saturates for a scene assembled by hand with `end` before `start` or at `u32::MAX`.
    pub fn duration_frames(&self) -> u32 {
        self.end
            .frame_number()
            .saturating_sub(self.start.frame_number())
            .saturating_add(1)
    }

    /// Duration of this scene in seconds
    pub fn duration_seconds(&self) -> f64 {
        self.duration_frames() as f64 / self.start.fps()
    }

    /// Whether `frame` falls inside this scene
    pub fn contains(&self, frame: u32) -> bool {
        (self.start.frame_number()..=self.end.frame_number()).contains(&frame)
    }
}

/// All possible errors from the scene detection system
///
/// Covers configuration, timecode arithmetic, frame source failures and
/// run-level consistency checks. Nothing is recovered internally: every
/// variant reaches the caller of the failing operation.
#[derive(Debug, thiserror::Error)]
pub enum SceneDetectError {
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    #[error("Invalid timecode '{input}': {reason}")]
    InvalidTimecode { input: String, reason: String },

    #[error("Invalid framerate: {fps}")]
    InvalidFramerate { fps: f64 },

    #[error("Framerate mismatch: {left} fps vs {right} fps")]
    FramerateMismatch { left: f64, right: f64 },

    #[error("Invalid frame window: {message}")]
    InvalidWindow { message: String },

    #[error("Frame processing failed at frame {frame}: {reason}")]
    FrameProcessingFailed { frame: u32, reason: String },

    #[error("Frame size changed from {previous_width}x{previous_height} to {width}x{height}")]
    FrameSizeMismatch {
        previous_width: u32,
        previous_height: u32,
        width: u32,
        height: u32,
    },

    #[error("Frame source failed at frame {frame}: {reason}")]
    FrameSource { frame: u32, reason: String },

    #[error("Processed {actual} frames but the window spans {expected}")]
    FrameCountMismatch { expected: u32, actual: u32 },

    #[error("No completed detection run")]
    NoCompletedRun,

    #[error("Video file not found: {path}")]
    VideoNotFound { path: String },

    #[error("Failed to open video file: {path}")]
    VideoOpenFailed { path: String },

    #[cfg(feature = "opencv")]
    #[error("OpenCV error: {0}")]
    OpenCvError(#[from] opencv::Error),

    #[error("Failed to read configuration {path}: {source}")]
    ConfigIo {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse configuration {path}: {source}")]
    ConfigParse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

impl SceneDetectError {
    /// Create a configuration error with a descriptive message
    pub fn config_error(message: impl Into<String>) -> Self {
        Self::InvalidConfig { message: message.into() }
    }

    /// Create a frame processing error
    pub fn frame_error(frame: u32, reason: impl Into<String>) -> Self {
        Self::FrameProcessingFailed {
            frame,
            reason: reason.into(),
        }
    }

    /// Create a frame source (decode or read) error
    pub fn source_error(frame: u32, reason: impl Into<String>) -> Self {
        Self::FrameSource {
            frame,
            reason: reason.into(),
        }
    }

    /// Create a timecode parsing error
    pub fn timecode_error(input: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidTimecode {
            input: input.into(),
            reason: reason.into(),
        }
    }
}

/// Convenient Result type for scene detection operations
pub type Result<T> = std::result::Result<T, SceneDetectError>;
