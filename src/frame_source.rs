//! Frames and the frame source capability consumed by the scene manager.
//!
//! Decoding lives behind [`FrameSource`]. The crate ships an in-memory source
//! here and an OpenCV-backed one in `video_stream` (feature `opencv`); tests
//! and callers with their own decoders implement the trait directly.

use tracing::{debug, instrument, trace};

use crate::common::{Result, SceneDetectError};
use crate::timecode::{FrameTimecode, FrameWindow};

/// Frames narrower than this are never downscaled automatically
pub const MIN_AUTO_DOWNSCALE_WIDTH: u32 = 256;

/// A decoded video frame: packed 8-bit BGR samples, row-major
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl Frame {
    /// Wrap packed BGR data
    ///
    /// # Errors
    /// * `InvalidConfig` - If a dimension is zero or `data` is not `width * height * 3` bytes
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(SceneDetectError::config_error(format!(
                "frame dimensions must be non-zero, got {}x{}",
                width, height
            )));
        }

        let expected = width as usize * height as usize * 3;
        if data.len() != expected {
            return Err(SceneDetectError::config_error(format!(
                "{}x{} BGR frame needs {} bytes, got {}",
                width,
                height,
                expected,
                data.len()
            )));
        }

        Ok(Self { width, height, data })
    }

    /// A frame where every pixel has the same BGR value
    pub fn solid(width: u32, height: u32, bgr: [u8; 3]) -> Result<Self> {
        let pixels = width as usize * height as usize;
        Self::new(width, height, bgr.repeat(pixels))
    }

    /// Build a frame pixel by pixel from `(x, y) -> [b, g, r]`
    pub fn from_fn(width: u32, height: u32, mut pixel: impl FnMut(u32, u32) -> [u8; 3]) -> Result<Self> {
        let mut data = Vec::with_capacity(width as usize * height as usize * 3);
        for y in 0..height {
            for x in 0..width {
                data.extend_from_slice(&pixel(x, y));
            }
        }
        Self::new(width, height, data)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Raw packed BGR bytes
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Number of pixels
    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// BGR value at `(x, y)`
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 3]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let offset = (y as usize * self.width as usize + x as usize) * 3;
        Some([self.data[offset], self.data[offset + 1], self.data[offset + 2]])
    }

    /// Iterate over BGR pixels in row-major order
    pub fn pixels(&self) -> impl Iterator<Item = [u8; 3]> + '_ {
        self.data.chunks_exact(3).map(|px| [px[0], px[1], px[2]])
    }

    /// Set every sample of every channel to `value`
    pub fn fill(&mut self, value: u8) {
        self.data.fill(value);
    }

    /// Keep every `factor`-th pixel in both directions
    ///
    /// A factor of 0 or 1 returns an identical copy.
    pub fn downscale(&self, factor: u32) -> Frame {
        if factor <= 1 {
            return self.clone();
        }

        let width = self.width.div_ceil(factor);
        let height = self.height.div_ceil(factor);
        let mut data = Vec::with_capacity(width as usize * height as usize * 3);

        for y in (0..self.height).step_by(factor as usize) {
            let row = y as usize * self.width as usize;
            for x in (0..self.width).step_by(factor as usize) {
                let offset = (row + x as usize) * 3;
                data.extend_from_slice(&self.data[offset..offset + 3]);
            }
        }

        Frame { width, height, data }
    }
}

/// Downscale factor that brings `frame_width` close to [`MIN_AUTO_DOWNSCALE_WIDTH`]
pub fn auto_downscale_factor(frame_width: u32) -> u32 {
    if frame_width < MIN_AUTO_DOWNSCALE_WIDTH {
        1
    } else {
        frame_width / MIN_AUTO_DOWNSCALE_WIDTH
    }
}

/// Frame-by-frame access to a video, bounded to a window
///
/// `read` advances the decode position; `retrieve` returns the most recently
/// read frame without decoding again. Frames come out in increasing index order
/// starting at the window's first frame.
pub trait FrameSource {
    /// Frames per second of the underlying video
    fn framerate(&self) -> f64;

    /// Timecode of frame 0 at this source's framerate
    fn base_timecode(&self) -> Result<FrameTimecode> {
        FrameTimecode::new(0, self.framerate())
    }

    /// Restrict reading to `window` and rewind to its first frame
    fn set_window(&mut self, window: FrameWindow) -> Result<()>;

    /// The window reads are currently bounded to
    fn window(&self) -> Option<FrameWindow>;

    /// Decode the next frame; `Ok(false)` once the window (or the stream) is exhausted
    fn read(&mut self) -> Result<bool>;

    /// The frame obtained by the last successful `read`
    fn retrieve(&self) -> Option<&Frame>;

    /// Release the decode handle; calling it again has no effect
    fn release(&mut self);
}

/// Frame source over frames already held in memory
///
/// Frame `i` of the vector has index `i`. The window defaults to all frames.
#[derive(Debug)]
pub struct MemoryFrameSource {
    frames: Vec<Frame>,
    fps: f64,
    window: Option<FrameWindow>,
    next_frame: u32,
    current: Option<Frame>,
    downscale: u32,
    released: bool,
}

impl MemoryFrameSource {
    /// Create a source over `frames` at `fps`
    #[instrument(skip(frames), fields(frames = frames.len()))]
    pub fn new(frames: Vec<Frame>, fps: f64) -> Result<Self> {
        let first = FrameTimecode::new(0, fps)?;
        let window = match frames.len() {
            0 => None,
            len => {
                let last = u32::try_from(len - 1)
                    .map_err(|_| SceneDetectError::config_error("too many frames for one source"))?;
                Some(FrameWindow::new(first, FrameTimecode::new(last, fps)?)?)
            }
        };

        debug!("Created MemoryFrameSource with {} frames at {} fps", frames.len(), fps);

        Ok(Self {
            frames,
            fps,
            window,
            next_frame: 0,
            current: None,
            downscale: 1,
            released: false,
        })
    }

    /// Downscale every frame returned from now on by `factor` (1 disables)
    pub fn set_downscale_factor(&mut self, factor: u32) -> Result<()> {
        if factor == 0 {
            return Err(SceneDetectError::config_error("downscale factor must be at least 1"));
        }
        self.downscale = factor;
        Ok(())
    }

    pub fn downscale_factor(&self) -> u32 {
        self.downscale
    }

    /// Total frames held, independent of the window
    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    pub fn is_released(&self) -> bool {
        self.released
    }
}

impl FrameSource for MemoryFrameSource {
    fn framerate(&self) -> f64 {
        self.fps
    }

    fn set_window(&mut self, window: FrameWindow) -> Result<()> {
        window.start().ensure_same_rate(&FrameTimecode::new(0, self.fps)?)?;

        if window.end().frame_number() as usize >= self.frames.len() {
            return Err(SceneDetectError::InvalidWindow {
                message: format!(
                    "window ends at frame {} but the source holds {} frames",
                    window.end().frame_number(),
                    self.frames.len()
                ),
            });
        }

        debug!(
            "Window set to frames {}-{}",
            window.start().frame_number(),
            window.end().frame_number()
        );

        self.window = Some(window);
        self.next_frame = window.start().frame_number();
        self.current = None;
        Ok(())
    }

    fn window(&self) -> Option<FrameWindow> {
        self.window
    }

    fn read(&mut self) -> Result<bool> {
        if self.released {
            return Err(SceneDetectError::source_error(self.next_frame, "source has been released"));
        }

        let Some(window) = self.window else {
            return Ok(false);
        };
        if self.next_frame > window.end().frame_number() {
            trace!("End of window reached at frame {}", self.next_frame);
            return Ok(false);
        }

        let frame = &self.frames[self.next_frame as usize];
        self.current = Some(frame.downscale(self.downscale));
        self.next_frame += 1;
        Ok(true)
    }

    fn retrieve(&self) -> Option<&Frame> {
        self.current.as_ref()
    }

    fn release(&mut self) {
        if !self.released {
            debug!("Releasing MemoryFrameSource");
        }
        self.released = true;
        self.current = None;
    }
}
