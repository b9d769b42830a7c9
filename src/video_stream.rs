//! Video stream handling using OpenCV backend
//!
//! [`VideoStream`] wraps OpenCV's VideoCapture and exposes it as a
//! [`FrameSource`]: windowed reads via frame seeking, optional downscaling,
//! and an explicit release of the capture handle.

use std::path::Path;

use opencv::{core::Mat, prelude::*, videoio};
use tracing::{debug, info, instrument, warn};

use crate::common::{Result, SceneDetectError};
use crate::frame_source::{auto_downscale_factor, Frame, FrameSource};
use crate::timecode::{FrameTimecode, FrameWindow};

/// OpenCV VideoCapture as a frame source
pub struct VideoStream {
    cap: Option<videoio::VideoCapture>,
    fps: f64,
    frame_count: u32,
    width: u32,
    height: u32,
    path: String,
    window: Option<FrameWindow>,
    next_frame: u32,
    current: Option<Frame>,
    downscale: u32,
}

impl VideoStream {
    /// Open a video file for reading
    ///
    /// The window initially covers the whole video and frames are not downscaled.
    ///
    /// # Errors
    /// * `VideoNotFound` - If the file doesn't exist
    /// * `VideoOpenFailed` - If OpenCV can't open the file or reports unusable properties
    #[instrument]
    pub fn open(path: &str) -> Result<Self> {
        info!("Opening video stream: {}", path);

        if !Path::new(path).exists() {
            return Err(SceneDetectError::VideoNotFound { path: path.to_string() });
        }

        let open_failed = |e: opencv::Error| {
            warn!("OpenCV failed on {}: {}", path, e);
            SceneDetectError::VideoOpenFailed { path: path.to_string() }
        };

        let cap = videoio::VideoCapture::from_file(path, videoio::CAP_ANY).map_err(open_failed)?;
        if !cap.is_opened().map_err(open_failed)? {
            return Err(SceneDetectError::VideoOpenFailed { path: path.to_string() });
        }

        let fps = cap.get(videoio::CAP_PROP_FPS).map_err(open_failed)?;
        let frame_count = cap.get(videoio::CAP_PROP_FRAME_COUNT).map_err(open_failed)?;
        let width = cap.get(videoio::CAP_PROP_FRAME_WIDTH).map_err(open_failed)?;
        let height = cap.get(videoio::CAP_PROP_FRAME_HEIGHT).map_err(open_failed)?;

        if !(fps > 0.0) || frame_count < 1.0 || width < 1.0 || height < 1.0 {
            warn!(
                "Unusable video properties: fps={}, frames={}, size={}x{}",
                fps, frame_count, width, height
            );
            return Err(SceneDetectError::VideoOpenFailed { path: path.to_string() });
        }

        let frame_count = frame_count as u32;
        let window = FrameWindow::new(FrameTimecode::new(0, fps)?, FrameTimecode::new(frame_count - 1, fps)?)?;

        info!(
            "Video opened successfully - FPS: {}, Frames: {}, Size: {}x{}",
            fps, frame_count, width, height
        );

        Ok(Self {
            cap: Some(cap),
            fps,
            frame_count,
            width: width as u32,
            height: height as u32,
            path: path.to_string(),
            window: Some(window),
            next_frame: 0,
            current: None,
            downscale: 1,
        })
    }

    /// Set the downscale factor; `None` picks one from the frame width
    pub fn set_downscale_factor(&mut self, factor: Option<u32>) -> Result<()> {
        let factor = match factor {
            Some(0) => return Err(SceneDetectError::config_error("downscale factor must be at least 1")),
            Some(factor) => factor,
            None => auto_downscale_factor(self.width),
        };
        debug!("Downscale factor set to {}", factor);
        self.downscale = factor;
        Ok(())
    }

    pub fn downscale_factor(&self) -> u32 {
        self.downscale
    }

    /// Get the total number of frames in the video
    pub fn frame_count(&self) -> u32 {
        self.frame_count
    }

    /// Get the frame width in pixels (before downscaling)
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Get the frame height in pixels (before downscaling)
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Get the video file path
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Get the video duration in seconds
    pub fn duration_seconds(&self) -> f64 {
        self.frame_count as f64 / self.fps
    }

    fn capture(&mut self) -> Result<&mut videoio::VideoCapture> {
        let frame = self.next_frame;
        self.cap
            .as_mut()
            .ok_or_else(|| SceneDetectError::source_error(frame, "video stream has been released"))
    }
}

/// Copy an 8-bit BGR Mat into a [`Frame`]
fn mat_to_frame(mat: &Mat, frame_number: u32) -> Result<Frame> {
    if mat.typ() != opencv::core::CV_8UC3 {
        return Err(SceneDetectError::source_error(
            frame_number,
            format!("expected an 8-bit BGR frame, got Mat type {}", mat.typ()),
        ));
    }

    let continuous;
    let mat = if mat.is_continuous() {
        mat
    } else {
        continuous = mat.try_clone()?;
        &continuous
    };

    Frame::new(mat.cols() as u32, mat.rows() as u32, mat.data_bytes()?.to_vec())
        .map_err(|e| SceneDetectError::source_error(frame_number, e.to_string()))
}

impl FrameSource for VideoStream {
    fn framerate(&self) -> f64 {
        self.fps
    }

    #[instrument(skip(self))]
    fn set_window(&mut self, window: FrameWindow) -> Result<()> {
        window.start().ensure_same_rate(&FrameTimecode::new(0, self.fps)?)?;
        if window.end().frame_number() >= self.frame_count {
            return Err(SceneDetectError::InvalidWindow {
                message: format!(
                    "window ends at frame {} but {} has {} frames",
                    window.end().frame_number(),
                    self.path,
                    self.frame_count
                ),
            });
        }

        let start = window.start().frame_number();
        let seeked = self.capture()?.set(videoio::CAP_PROP_POS_FRAMES, start as f64)?;
        if !seeked {
            return Err(SceneDetectError::source_error(start, "seek failed"));
        }

        debug!("Seeked to frame {} (window ends at {})", start, window.end().frame_number());
        self.window = Some(window);
        self.next_frame = start;
        self.current = None;
        Ok(())
    }

    fn window(&self) -> Option<FrameWindow> {
        self.window
    }

    fn read(&mut self) -> Result<bool> {
        let frame_number = self.next_frame;
        if let Some(window) = self.window {
            if frame_number > window.end().frame_number() {
                return Ok(false);
            }
        }

        let mut mat = Mat::default();
        let success = self
            .capture()?
            .read(&mut mat)
            .map_err(|e| SceneDetectError::source_error(frame_number, format!("OpenCV read failed: {}", e)))?;

        if !success || mat.empty() {
            debug!("Reached end of video at frame {}", frame_number);
            return Ok(false);
        }

        let frame = mat_to_frame(&mat, frame_number)?;
        self.current = Some(frame.downscale(self.downscale));
        self.next_frame += 1;
        Ok(true)
    }

    fn retrieve(&self) -> Option<&Frame> {
        self.current.as_ref()
    }

    fn release(&mut self) {
        if let Some(mut cap) = self.cap.take() {
            debug!("Releasing video capture for {}", self.path);
            if let Err(e) = cap.release() {
                warn!("Failed to release video capture: {}", e);
            }
        }
        self.current = None;
    }
}

impl Drop for VideoStream {
    fn drop(&mut self) {
        self.release();
    }
}

// Implement Debug manually to avoid showing internal OpenCV state
impl std::fmt::Debug for VideoStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VideoStream")
            .field("path", &self.path)
            .field("fps", &self.fps)
            .field("frame_count", &self.frame_count)
            .field("next_frame", &self.next_frame)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("released", &self.cap.is_none())
            .finish()
    }
}
