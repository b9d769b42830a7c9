//! Frame-accurate timecodes and analysis windows.
//!
//! A [`FrameTimecode`] binds a frame index to a framerate. All comparisons and
//! arithmetic happen on the frame index, so repeated conversions never drift;
//! seconds and `HH:MM:SS.nnn` strings are derived views.

use std::cmp::Ordering;
use std::fmt;
use std::ops::{Add, Sub};

use tracing::{instrument, trace};

use crate::common::{Result, SceneDetectError};

/// Last frame index a window or scene may end on, so its length fits in `u32`
pub(crate) const MAX_END_FRAME: u32 = u32::MAX - 1;

/// Represents a specific point in time (or a duration) within a video
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameTimecode {
    frame_number: u32,
    fps: f64,
}

impl FrameTimecode {
    /// Create a new FrameTimecode
    ///
    /// # Arguments
    /// * `frame_number` - The frame number (0-indexed)
    /// * `fps` - Frames per second of the video
    ///
    /// # Errors
    /// * `InvalidFramerate` - If fps is not a positive, finite number
    pub fn new(frame_number: u32, fps: f64) -> Result<Self> {
        validate_fps(fps)?;
        Ok(Self { frame_number, fps })
    }

    /// Create a timecode from a position in seconds, rounded to the nearest frame
    pub fn from_seconds(seconds: f64, fps: f64) -> Result<Self> {
        validate_fps(fps)?;
        if !seconds.is_finite() || seconds < 0.0 {
            return Err(SceneDetectError::timecode_error(
                seconds.to_string(),
                "seconds must be a non-negative finite number",
            ));
        }

        let frames = (seconds * fps).round();
        if frames > u32::MAX as f64 {
            return Err(SceneDetectError::timecode_error(
                seconds.to_string(),
                "position exceeds the representable frame range",
            ));
        }

        Ok(Self {
            frame_number: frames as u32,
            fps,
        })
    }

    /// Parse a timecode string
    ///
    /// Accepted forms:
    /// * `HH:MM:SS` or `HH:MM:SS.nnn`
    /// * a plain integer, taken as a frame number (`"1200"`)
    /// * a number with an `s` suffix, taken as seconds (`"12.5s"`)
    ///
    /// # Errors
    /// * `InvalidTimecode` - If the string matches none of the forms above
    /// * `InvalidFramerate` - If fps is not a positive, finite number
    #[instrument]
    pub fn parse(text: &str, fps: f64) -> Result<Self> {
        validate_fps(fps)?;
        let input = text.trim();

        if input.is_empty() {
            return Err(SceneDetectError::timecode_error(text, "empty timecode"));
        }

        if input.contains(':') {
            let seconds = parse_hms(input)?;
            return Self::from_seconds(seconds, fps);
        }

        if let Some(number) = input.strip_suffix('s') {
            if !is_decimal(number) {
                return Err(SceneDetectError::timecode_error(text, "expected seconds like '12.5s'"));
            }
            let seconds: f64 = number
                .parse()
                .map_err(|_| SceneDetectError::timecode_error(text, "invalid seconds value"))?;
            return Self::from_seconds(seconds, fps);
        }

        if input.bytes().all(|b| b.is_ascii_digit()) {
            let frame_number = input
                .parse()
                .map_err(|_| SceneDetectError::timecode_error(text, "frame number out of range"))?;
            return Self::new(frame_number, fps);
        }

        Err(SceneDetectError::timecode_error(
            text,
            "expected HH:MM:SS[.nnn], a frame number, or seconds with an 's' suffix",
        ))
    }

    /// Get the frame number
    pub fn frame_number(&self) -> u32 {
        self.frame_number
    }

    /// Get the framerate
    pub fn fps(&self) -> f64 {
        self.fps
    }

    /// Convert to seconds since start of video
    pub fn seconds(&self) -> f64 {
        self.frame_number as f64 / self.fps
    }

    /// Convert to milliseconds since start of video
    pub fn milliseconds(&self) -> f64 {
        self.seconds() * 1000.0
    }

    /// Format as `HH:MM:SS.nnn`
    pub fn to_timecode_string(&self) -> String {
        let total_ms = (self.seconds() * 1000.0).round() as u64;
        let hours = total_ms / 3_600_000;
        let minutes = (total_ms / 60_000) % 60;
        let secs = (total_ms / 1000) % 60;
        let millis = total_ms % 1000;
        format!("{:02}:{:02}:{:02}.{:03}", hours, minutes, secs, millis)
    }

    /// Fail unless `other` uses the same framerate
    pub fn ensure_same_rate(&self, other: &Self) -> Result<()> {
        if self.fps != other.fps {
            return Err(SceneDetectError::FramerateMismatch {
                left: self.fps,
                right: other.fps,
            });
        }
        Ok(())
    }

    /// Add two timecodes at the same framerate
    pub fn checked_add(&self, other: &Self) -> Result<Self> {
        self.ensure_same_rate(other)?;
        let frame_number = self.frame_number.checked_add(other.frame_number).ok_or_else(|| {
            SceneDetectError::timecode_error(self.to_timecode_string(), "addition overflows")
        })?;
        Ok(Self { frame_number, fps: self.fps })
    }

    /// Subtract `other` from this timecode; the result is a duration at the same rate
    pub fn checked_sub(&self, other: &Self) -> Result<Self> {
        self.ensure_same_rate(other)?;
        let frame_number = self.frame_number.checked_sub(other.frame_number).ok_or_else(|| {
            SceneDetectError::timecode_error(
                self.to_timecode_string(),
                format!("cannot subtract later timecode {}", other.to_timecode_string()),
            )
        })?;
        trace!("{} - {} = {} frames", self.frame_number, other.frame_number, frame_number);
        Ok(Self { frame_number, fps: self.fps })
    }

    /// Number of frames from `self` up to `later`
    pub fn frames_until(&self, later: &Self) -> Result<u32> {
        Ok(later.checked_sub(self)?.frame_number)
    }
}

impl PartialOrd for FrameTimecode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        if self.fps != other.fps {
            return None;
        }
        Some(self.frame_number.cmp(&other.frame_number))
    }
}

impl Add<u32> for FrameTimecode {
    type Output = FrameTimecode;

    fn add(self, frames: u32) -> FrameTimecode {
        FrameTimecode {
            frame_number: self.frame_number.saturating_add(frames),
            fps: self.fps,
        }
    }
}

impl Sub<u32> for FrameTimecode {
    type Output = FrameTimecode;

    fn sub(self, frames: u32) -> FrameTimecode {
        FrameTimecode {
            frame_number: self.frame_number.saturating_sub(frames),
            fps: self.fps,
        }
    }
}

impl fmt::Display for FrameTimecode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_timecode_string())
    }
}

/// Inclusive `[start, end]` range of frames analyzed by one detection run
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameWindow {
    start: FrameTimecode,
    end: FrameTimecode,
}

impl FrameWindow {
    /// Create a window; both ends are inclusive
    ///
    /// # Errors
    /// * `FramerateMismatch` - If start and end use different framerates
    /// * `InvalidWindow` - If end is before start, or end is frame `u32::MAX`
    pub fn new(start: FrameTimecode, end: FrameTimecode) -> Result<Self> {
        start.ensure_same_rate(&end)?;
        if end.frame_number() < start.frame_number() {
            return Err(SceneDetectError::InvalidWindow {
                message: format!("end {} is before start {}", end, start),
            });
        }
        if end.frame_number() > MAX_END_FRAME {
            return Err(SceneDetectError::InvalidWindow {
                message: format!("end frame {} is past the last usable frame {}", end.frame_number(), MAX_END_FRAME),
            });
        }
        Ok(Self { start, end })
    }

    pub fn start(&self) -> FrameTimecode {
        self.start
    }

    pub fn end(&self) -> FrameTimecode {
        self.end
    }

    pub fn fps(&self) -> f64 {
        self.start.fps()
    }

    /// Number of frames in the window
    pub fn len(&self) -> u32 {
        self.end.frame_number() - self.start.frame_number() + 1
    }

    /// A window always holds at least one frame
    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn contains(&self, frame: u32) -> bool {
        (self.start.frame_number()..=self.end.frame_number()).contains(&frame)
    }
}

fn validate_fps(fps: f64) -> Result<()> {
    if !fps.is_finite() || fps <= 0.0 {
        return Err(SceneDetectError::InvalidFramerate { fps });
    }
    Ok(())
}

fn is_decimal(text: &str) -> bool {
    let mut parts = text.splitn(2, '.');
    let whole = parts.next().unwrap_or("");
    let fraction = parts.next();

    let digits = |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit());
    match fraction {
        Some(fraction) => digits(whole) && digits(fraction),
        None => digits(whole),
    }
}

/// `HH:MM:SS[.nnn]` to seconds
fn parse_hms(input: &str) -> Result<f64> {
    let parts: Vec<&str> = input.split(':').collect();
    if parts.len() != 3 {
        return Err(SceneDetectError::timecode_error(input, "expected HH:MM:SS[.nnn]"));
    }

    let field = |s: &str, name: &str| -> Result<u32> {
        if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(SceneDetectError::timecode_error(input, format!("invalid {} field", name)));
        }
        s.parse()
            .map_err(|_| SceneDetectError::timecode_error(input, format!("{} out of range", name)))
    };

    let hours = field(parts[0], "hours")?;
    let minutes = field(parts[1], "minutes")?;
    if minutes >= 60 {
        return Err(SceneDetectError::timecode_error(input, "minutes must be below 60"));
    }

    if !is_decimal(parts[2]) {
        return Err(SceneDetectError::timecode_error(input, "invalid seconds field"));
    }
    let seconds: f64 = parts[2]
        .parse()
        .map_err(|_| SceneDetectError::timecode_error(input, "invalid seconds field"))?;
    if seconds >= 60.0 {
        return Err(SceneDetectError::timecode_error(input, "seconds must be below 60"));
    }

    Ok(hours as f64 * 3600.0 + minutes as f64 * 60.0 + seconds)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_timecode_creation() {
        let tc = FrameTimecode::new(100, 25.0).unwrap();
        assert_eq!(tc.frame_number(), 100);
        assert_eq!(tc.fps(), 25.0);
        assert_eq!(tc.seconds(), 4.0);
        assert_eq!(tc.milliseconds(), 4000.0);
    }

    #[test]
    fn test_invalid_fps() {
        for fps in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            assert!(matches!(
                FrameTimecode::new(100, fps),
                Err(SceneDetectError::InvalidFramerate { .. })
            ));
        }
    }

    #[test]
    fn test_fractional_fps() {
        let tc = FrameTimecode::new(100, 29.97).unwrap();
        assert!((tc.seconds() - 3.336_670_003_336_67).abs() < 1e-10);
    }

    #[test]
    fn test_from_seconds_rounds_to_nearest_frame() {
        let tc = FrameTimecode::from_seconds(5.0, 23.976).unwrap();
        assert_eq!(tc.frame_number(), 120);

        let tc = FrameTimecode::from_seconds(0.0, 30.0).unwrap();
        assert_eq!(tc.frame_number(), 0);

        assert!(FrameTimecode::from_seconds(-1.0, 30.0).is_err());
        assert!(FrameTimecode::from_seconds(f64::NAN, 30.0).is_err());
    }

    #[test]
    fn test_parse_forms() {
        let fps = 24.0;
        assert_eq!(FrameTimecode::parse("00:00:05", fps).unwrap().frame_number(), 120);
        assert_eq!(FrameTimecode::parse("00:00:15", fps).unwrap().frame_number(), 360);
        assert_eq!(FrameTimecode::parse("00:01:00.500", fps).unwrap().frame_number(), 1452);
        assert_eq!(FrameTimecode::parse("01:00:00", fps).unwrap().frame_number(), 86_400);
        assert_eq!(FrameTimecode::parse("1200", fps).unwrap().frame_number(), 1200);
        assert_eq!(FrameTimecode::parse("2.5s", fps).unwrap().frame_number(), 60);
        assert_eq!(FrameTimecode::parse("  00:00:01  ", fps).unwrap().frame_number(), 24);
    }

    #[test]
    fn test_parse_rejects_malformed() {
        let fps = 24.0;
        for bad in [
            "", "abc", "00:00", "00:60:00", "00:00:60", "00:00:05.", "00:-1:00",
            "1:2:3:4", "12.5", "s", "-3s", "00:00:0x", "4294967296",
        ] {
            let err = FrameTimecode::parse(bad, fps).unwrap_err();
            assert!(
                matches!(err, SceneDetectError::InvalidTimecode { .. }),
                "expected InvalidTimecode for {:?}, got {:?}",
                bad,
                err
            );
        }
    }

    #[test]
    fn test_string_round_trip() {
        for fps in [23.976, 24.0, 25.0, 29.97, 30.0, 59.94, 60.0, 120.0] {
            for frame in (0..20_000).step_by(37) {
                let tc = FrameTimecode::new(frame, fps).unwrap();
                let parsed = FrameTimecode::parse(&tc.to_string(), fps).unwrap();
                assert_eq!(parsed, tc, "round trip failed at frame {} @ {} fps", frame, fps);
            }
        }
    }

    #[test]
    fn test_display_format() {
        let tc = FrameTimecode::new(90_061, 25.0).unwrap();
        assert_eq!(tc.to_string(), "01:00:02.440");

        let tc = FrameTimecode::new(0, 30.0).unwrap();
        assert_eq!(tc.to_string(), "00:00:00.000");
    }

    #[test]
    fn test_comparison_requires_same_rate() {
        let a = FrameTimecode::new(100, 25.0).unwrap();
        let b = FrameTimecode::new(200, 25.0).unwrap();
        let c = FrameTimecode::new(200, 30.0).unwrap();

        assert!(a < b);
        assert_eq!(a.partial_cmp(&c), None);
        assert_ne!(b, c);
    }

    #[test]
    fn test_arithmetic() {
        let start = FrameTimecode::new(120, 24.0).unwrap();
        let end = FrameTimecode::new(360, 24.0).unwrap();

        let duration = end.checked_sub(&start).unwrap();
        assert_eq!(duration.frame_number(), 240);
        assert_eq!(duration.seconds(), 10.0);
        assert_eq!(start.frames_until(&end).unwrap(), 240);

        assert_eq!(start.checked_add(&duration).unwrap(), end);
        assert_eq!((start + 10).frame_number(), 130);
        assert_eq!((start - 500).frame_number(), 0);

        assert!(start.checked_sub(&end).is_err());

        let other_rate = FrameTimecode::new(10, 30.0).unwrap();
        assert!(matches!(
            start.checked_add(&other_rate),
            Err(SceneDetectError::FramerateMismatch { .. })
        ));
    }

    #[test]
    fn test_window() {
        let start = FrameTimecode::new(120, 24.0).unwrap();
        let end = FrameTimecode::new(360, 24.0).unwrap();
        let window = FrameWindow::new(start, end).unwrap();

        assert_eq!(window.len(), 241);
        assert!(window.contains(120));
        assert!(window.contains(360));
        assert!(!window.contains(361));

        let single = FrameWindow::new(start, start).unwrap();
        assert_eq!(single.len(), 1);

        assert!(matches!(
            FrameWindow::new(end, start),
            Err(SceneDetectError::InvalidWindow { .. })
        ));
    }

    #[test]
    fn test_window_length_fits_u32() {
        let first = FrameTimecode::new(0, 24.0).unwrap();
        let widest = FrameWindow::new(first, FrameTimecode::new(u32::MAX - 1, 24.0).unwrap()).unwrap();
        assert_eq!(widest.len(), u32::MAX);

        let last = FrameTimecode::new(u32::MAX, 24.0).unwrap();
        assert!(matches!(
            FrameWindow::new(first, last),
            Err(SceneDetectError::InvalidWindow { .. })
        ));
        assert!(FrameWindow::new(last, last).is_err());
    }
}
