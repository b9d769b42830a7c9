//! ContentDetector - HSV-based scene change detection algorithm
//!
//! Each frame is converted to HSV and compared with the previous frame. The
//! weighted mean of the per-channel mean absolute differences is the frame's
//! score; scores strictly above the threshold are cut candidates, which the
//! [`FlashFilter`] turns into confirmed cuts.

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, trace};

use crate::common::{Result, SceneDetectError};
use crate::config::DetectorConfig;
use crate::flash_filter::FlashFilter;
use crate::frame_source::Frame;
use crate::scene_manager::SceneDetector;

/// Component weights for frame score calculation
///
/// These weights determine how much each HSV channel contributes to the
/// final scene change score. Weights missing from a JSON object keep their default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ComponentWeights {
    pub delta_hue: f64,
    pub delta_sat: f64,
    pub delta_lum: f64,
}

impl Default for ComponentWeights {
    fn default() -> Self {
        Self {
            delta_hue: 1.0,
            delta_sat: 1.0,
            delta_lum: 1.0,
        }
    }
}

impl ComponentWeights {
    /// Create weights for luma-only detection (brightness changes only)
    pub fn luma_only() -> Self {
        Self {
            delta_hue: 0.0,
            delta_sat: 0.0,
            delta_lum: 1.0,
        }
    }

    /// Get the sum of absolute weights (for normalization)
    pub fn sum_abs(&self) -> f64 {
        self.delta_hue.abs() + self.delta_sat.abs() + self.delta_lum.abs()
    }

    /// Validate that weights are usable
    pub(crate) fn validate(&self) -> Result<()> {
        let all = [self.delta_hue, self.delta_sat, self.delta_lum];
        if all.iter().any(|w| !w.is_finite()) {
            return Err(SceneDetectError::config_error("component weights must be finite"));
        }
        if self.sum_abs() <= 0.0 {
            return Err(SceneDetectError::config_error("All component weights cannot be zero"));
        }
        Ok(())
    }
}

/// HSV planes of one frame
#[derive(Debug)]
struct FrameData {
    width: u32,
    height: u32,
    hue: Vec<u8>,
    sat: Vec<u8>,
    lum: Vec<u8>,
}

impl FrameData {
    fn from_bgr_frame(frame: &Frame) -> Self {
        let pixels = frame.pixel_count();
        let mut hue = Vec::with_capacity(pixels);
        let mut sat = Vec::with_capacity(pixels);
        let mut lum = Vec::with_capacity(pixels);

        for [b, g, r] in frame.pixels() {
            let (h, s, v) = bgr_to_hsv(b, g, r);
            hue.push(h);
            sat.push(s);
            lum.push(v);
        }

        Self {
            width: frame.width(),
            height: frame.height(),
            hue,
            sat,
            lum,
        }
    }

    fn same_size(&self, other: &FrameData) -> bool {
        self.width == other.width && self.height == other.height
    }
}

/// Convert one 8-bit BGR pixel to 8-bit HSV
///
/// Hue is in `[0, 180)` (degrees halved), saturation and value in `[0, 255]`.
pub fn bgr_to_hsv(b: u8, g: u8, r: u8) -> (u8, u8, u8) {
    let (bf, gf, rf) = (b as f64, g as f64, r as f64);
    let max = b.max(g).max(r);
    let min = b.min(g).min(r);
    let v = max as f64;
    let delta = v - min as f64;

    let s = if max == 0 { 0.0 } else { 255.0 * delta / v };

    let h = if delta == 0.0 {
        0.0
    } else {
        let degrees = if max == r {
            60.0 * (gf - bf) / delta
        } else if max == g {
            120.0 + 60.0 * (bf - rf) / delta
        } else {
            240.0 + 60.0 * (rf - gf) / delta
        };
        let degrees = if degrees < 0.0 { degrees + 360.0 } else { degrees };
        let half = (degrees / 2.0).round();
        if half >= 180.0 { half - 180.0 } else { half }
    };

    (h as u8, s.round() as u8, max)
}

/// Mean absolute difference between two equally sized planes
fn mean_pixel_distance(left: &[u8], right: &[u8]) -> f64 {
    if left.is_empty() {
        return 0.0;
    }
    let sum: u64 = left
        .iter()
        .zip(right)
        .map(|(&a, &b)| a.abs_diff(b) as u64)
        .sum();
    sum as f64 / left.len() as f64
}

fn weighted_score(current: &FrameData, last: &FrameData, weights: &ComponentWeights) -> f64 {
    let delta_hue = mean_pixel_distance(&current.hue, &last.hue);
    let delta_sat = mean_pixel_distance(&current.sat, &last.sat);
    let delta_lum = mean_pixel_distance(&current.lum, &last.lum);

    let weighted_sum =
        delta_hue * weights.delta_hue + delta_sat * weights.delta_sat + delta_lum * weights.delta_lum;
    let score = weighted_sum / weights.sum_abs();

    trace!(
        "components: hue={:.3}, sat={:.3}, lum={:.3}, final={:.3}",
        delta_hue,
        delta_sat,
        delta_lum,
        score
    );

    score
}

/// Content change score between two frames of the same size
///
/// # Errors
/// * `FrameSizeMismatch` - If the frames differ in size
pub fn content_score(previous: &Frame, current: &Frame, weights: &ComponentWeights) -> Result<f64> {
    let last = FrameData::from_bgr_frame(previous);
    let current = FrameData::from_bgr_frame(current);
    if !current.same_size(&last) {
        return Err(SceneDetectError::FrameSizeMismatch {
            previous_width: last.width,
            previous_height: last.height,
            width: current.width,
            height: current.height,
        });
    }
    Ok(weighted_score(&current, &last, weights))
}

/// ContentDetector - detects scene changes using HSV color space analysis
///
/// Feed frames in strictly increasing, contiguous index order. The detector
/// keeps the previous frame's HSV planes and the flash filter state; call
/// [`ContentDetector::reset`] before analyzing a different window.
pub struct ContentDetector {
    config: DetectorConfig,
    last_frame_data: Option<FrameData>,
    last_frame_index: Option<u32>,
    last_score: Option<f64>,
    last_cut: Option<u32>,
    flash_filter: FlashFilter,
    frame_count: u32,
}

impl ContentDetector {
    /// Create a ContentDetector with the given threshold and default settings
    ///
    /// # Errors
    /// * `InvalidConfig` - If threshold is outside `[0, 255]`
    #[instrument]
    pub fn new(threshold: f64) -> Result<Self> {
        Self::with_config(DetectorConfig::new().threshold(threshold))
    }

    /// Create a ContentDetector from a full configuration
    #[instrument]
    pub fn with_config(config: DetectorConfig) -> Result<Self> {
        config.validate()?;

        debug!(
            "Created ContentDetector: threshold={}, flicker_frames={}, min_scene_len={}",
            config.threshold, config.flicker_frames, config.min_scene_len
        );

        Ok(Self {
            flash_filter: FlashFilter::new(config.flicker_frames),
            config,
            last_frame_data: None,
            last_frame_index: None,
            last_score: None,
            last_cut: None,
            frame_count: 0,
        })
    }

    /// Create a luma-only ContentDetector (brightness changes only)
    ///
    /// Useful for black and white footage or when color is unreliable.
    pub fn new_luma_only(threshold: f64) -> Result<Self> {
        Self::with_config(DetectorConfig::new().threshold(threshold).luma_only())
    }

    /// Process a single frame and return the start of a confirmed scene, if any
    ///
    /// # Arguments
    /// * `frame` - BGR video frame to process
    /// * `frame_index` - Index of this frame; must follow the previous one directly
    ///
    /// # Errors
    /// * `FrameProcessingFailed` - If the index is not contiguous or the frame size changed
    #[instrument(skip(self, frame))]
    pub fn process_frame(&mut self, frame: &Frame, frame_index: u32) -> Result<Option<u32>> {
        if let Some(last) = self.last_frame_index {
            if last.checked_add(1) != Some(frame_index) {
                return Err(SceneDetectError::frame_error(
                    frame_index,
                    format!("expected frame {} after frame {}", last.saturating_add(1), last),
                ));
            }
        }

        let current_data = FrameData::from_bgr_frame(frame);

        let score = match self.last_frame_data.as_ref() {
            Some(last_data) => {
                if !current_data.same_size(last_data) {
                    return Err(SceneDetectError::frame_error(
                        frame_index,
                        format!(
                            "frame size changed from {}x{} to {}x{}",
                            last_data.width, last_data.height, current_data.width, current_data.height
                        ),
                    ));
                }
                Some(weighted_score(&current_data, last_data, &self.config.weights))
            }
            None => {
                debug!("First frame ({}), nothing to compare against", frame_index);
                None
            }
        };

        self.last_frame_data = Some(current_data);
        self.last_frame_index = Some(frame_index);
        self.last_score = score;
        self.frame_count += 1;

        let Some(score) = score else {
            return Ok(None);
        };

        trace!("Frame {} score: {:.3} (threshold: {})", frame_index, score, self.config.threshold);

        let above_threshold = score > self.config.threshold;
        let Some(cut) = self.flash_filter.filter(frame_index, above_threshold) else {
            return Ok(None);
        };

        if let Some(last_cut) = self.last_cut {
            if cut - last_cut < self.config.min_scene_len {
                debug!(
                    "Dropping cut at frame {} ({} frames after cut at {}, min_scene_len {})",
                    cut,
                    cut - last_cut,
                    last_cut,
                    self.config.min_scene_len
                );
                return Ok(None);
            }
        }

        self.last_cut = Some(cut);
        debug!("Scene cut detected at frame {}", cut);
        Ok(Some(cut))
    }

    /// Get the current threshold setting
    pub fn threshold(&self) -> f64 {
        self.config.threshold
    }

    /// Get the current component weights
    pub fn weights(&self) -> &ComponentWeights {
        &self.config.weights
    }

    /// Get the full detector configuration
    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// Get the flicker frames setting
    pub fn flicker_frames(&self) -> u32 {
        self.flash_filter.flicker_frames()
    }

    /// Score of the most recently processed frame (`None` for the first frame of a run)
    pub fn last_score(&self) -> Option<f64> {
        self.last_score
    }

    /// Get the number of frames processed since the last reset
    pub fn frame_count(&self) -> u32 {
        self.frame_count
    }

    /// Reset the detector state before analyzing another window
    #[instrument(skip(self))]
    pub fn reset(&mut self) {
        debug!("Resetting ContentDetector state");
        self.last_frame_data = None;
        self.last_frame_index = None;
        self.last_score = None;
        self.last_cut = None;
        self.flash_filter.reset();
        self.frame_count = 0;
    }
}

impl SceneDetector for ContentDetector {
    fn process_frame(&mut self, frame: &Frame, frame_index: u32) -> Result<Option<u32>> {
        ContentDetector::process_frame(self, frame, frame_index)
    }

    fn reset(&mut self) {
        ContentDetector::reset(self)
    }

    fn name(&self) -> &str {
        "content"
    }
}

// Implement Debug manually to keep HSV planes out of the output
impl std::fmt::Debug for ContentDetector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentDetector")
            .field("threshold", &self.config.threshold)
            .field("flicker_frames", &self.config.flicker_frames)
            .field("weights", &self.config.weights)
            .field("frame_count", &self.frame_count)
            .field("has_last_frame", &self.last_frame_data.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RED: [u8; 3] = [0, 0, 255];
    const GREEN: [u8; 3] = [0, 255, 0];
    const GRAY: [u8; 3] = [100, 100, 100];

    fn solid(bgr: [u8; 3]) -> Frame {
        Frame::solid(16, 9, bgr).unwrap()
    }

    fn feed(detector: &mut ContentDetector, frames: &[Frame], first_index: u32) -> Vec<u32> {
        frames
            .iter()
            .enumerate()
            .filter_map(|(i, f)| detector.process_frame(f, first_index + i as u32).unwrap())
            .collect()
    }

    #[test]
    fn test_content_detector_creation() {
        let detector = ContentDetector::new(27.0).unwrap();
        assert_eq!(detector.threshold(), 27.0);
        assert_eq!(detector.frame_count(), 0);
        assert_eq!(detector.flicker_frames(), 0);
        assert_eq!(detector.weights(), &ComponentWeights::default());
        assert_eq!(detector.config(), &DetectorConfig::new().threshold(27.0));
    }

    #[test]
    fn test_content_detector_invalid_threshold() {
        assert!(matches!(ContentDetector::new(-1.0), Err(SceneDetectError::InvalidConfig { .. })));
        assert!(matches!(ContentDetector::new(256.0), Err(SceneDetectError::InvalidConfig { .. })));
    }

    #[test]
    fn test_content_detector_luma_only() {
        let detector = ContentDetector::new_luma_only(30.0).unwrap();
        assert_eq!(detector.weights(), &ComponentWeights::luma_only());
    }

    #[test]
    fn test_component_weights() {
        assert_eq!(ComponentWeights::default().sum_abs(), 3.0);
        assert_eq!(ComponentWeights::luma_only().sum_abs(), 1.0);

        let zero = ComponentWeights {
            delta_hue: 0.0,
            delta_sat: 0.0,
            delta_lum: 0.0,
        };
        assert!(zero.validate().is_err());

        let nan = ComponentWeights {
            delta_hue: f64::NAN,
            ..ComponentWeights::default()
        };
        assert!(nan.validate().is_err());
    }

    #[test]
    fn test_bgr_to_hsv() {
        assert_eq!(bgr_to_hsv(0, 0, 0), (0, 0, 0));
        assert_eq!(bgr_to_hsv(255, 255, 255), (0, 0, 255));
        assert_eq!(bgr_to_hsv(0, 0, 255), (0, 255, 255));
        assert_eq!(bgr_to_hsv(0, 255, 0), (60, 255, 255));
        assert_eq!(bgr_to_hsv(255, 0, 0), (120, 255, 255));
        assert_eq!(bgr_to_hsv(255, 0, 255), (150, 255, 255));
    }

    #[test]
    fn test_content_score() {
        let weights = ComponentWeights::default();
        assert_eq!(content_score(&solid(RED), &solid(RED), &weights).unwrap(), 0.0);

        // Red to green: hue 0 -> 60, saturation and value unchanged.
        assert_eq!(content_score(&solid(RED), &solid(GREEN), &weights).unwrap(), 20.0);

        // Black to white only changes value.
        let luma = ComponentWeights::luma_only();
        assert_eq!(content_score(&solid([0, 0, 0]), &solid([255, 255, 255]), &luma).unwrap(), 255.0);
    }

    #[test]
    fn test_content_score_size_mismatch() {
        let err = content_score(
            &Frame::solid(4, 4, RED).unwrap(),
            &Frame::solid(8, 2, RED).unwrap(),
            &ComponentWeights::default(),
        )
        .unwrap_err();

        match err {
            SceneDetectError::FrameSizeMismatch {
                previous_width,
                previous_height,
                width,
                height,
            } => assert_eq!((previous_width, previous_height, width, height), (4, 4, 8, 2)),
            other => panic!("Expected FrameSizeMismatch, got: {:?}", other),
        }
    }

    #[test]
    fn test_weights_from_json() {
        let weights: ComponentWeights = serde_json::from_str(r#"{"delta_sat": 0.5}"#).unwrap();
        assert_eq!(weights.delta_hue, 1.0);
        assert_eq!(weights.delta_sat, 0.5);

        assert!(serde_json::from_str::<ComponentWeights>(r#"{"delta_edges": 1.0}"#).is_err());
    }

    #[test]
    fn test_score_independent_of_resolution() {
        let weights = ComponentWeights::default();
        let small = content_score(
            &Frame::solid(4, 4, RED).unwrap(),
            &Frame::solid(4, 4, GRAY).unwrap(),
            &weights,
        )
        .unwrap();
        let large = content_score(
            &Frame::solid(64, 48, RED).unwrap(),
            &Frame::solid(64, 48, GRAY).unwrap(),
            &weights,
        )
        .unwrap();
        assert_eq!(small, large);
    }

    #[test]
    fn test_first_frame_is_never_a_cut() {
        let mut detector = ContentDetector::new(0.0).unwrap();
        assert_eq!(detector.process_frame(&solid(RED), 50).unwrap(), None);
        assert_eq!(detector.last_score(), None);
        assert_eq!(detector.frame_count(), 1);
    }

    #[test]
    fn test_hard_cut_detected() {
        let mut detector = ContentDetector::new(27.0).unwrap();
        let frames = [solid(RED), solid(RED), solid(GRAY), solid(GRAY)];
        assert_eq!(feed(&mut detector, &frames, 10), vec![12]);
    }

    #[test]
    fn test_score_equal_to_threshold_is_not_a_cut() {
        // Red to green scores exactly 20.0
        let mut detector = ContentDetector::new(20.0).unwrap();
        let frames = [solid(RED), solid(GREEN)];
        assert!(feed(&mut detector, &frames, 0).is_empty());
        assert_eq!(detector.last_score(), Some(20.0));

        let mut detector = ContentDetector::new(19.9).unwrap();
        assert_eq!(feed(&mut detector, &frames, 0), vec![1]);
    }

    #[test]
    fn test_flash_suppressed_by_flicker_frames() {
        let white = solid([255, 255, 255]);
        let frames = [solid(GRAY), solid(GRAY), white, solid(GRAY), solid(GRAY)];

        let mut unfiltered = ContentDetector::new(27.0).unwrap();
        assert_eq!(feed(&mut unfiltered, &frames, 0), vec![2, 3]);

        let config = DetectorConfig::new().flicker_frames(3);
        let mut filtered = ContentDetector::with_config(config).unwrap();
        assert!(feed(&mut filtered, &frames, 0).is_empty());
    }

    #[test]
    fn test_min_scene_len_drops_close_cuts() {
        let config = DetectorConfig::new().min_scene_len(3);
        let mut detector = ContentDetector::with_config(config).unwrap();
        let frames = [solid(RED), solid(GRAY), solid(RED), solid(RED), solid(GRAY)];
        // Cuts at 1 and 2 are too close; 4 is 3 frames after 1.
        assert_eq!(feed(&mut detector, &frames, 0), vec![1, 4]);
    }

    #[test]
    fn test_non_contiguous_frame_rejected() {
        let mut detector = ContentDetector::new(27.0).unwrap();
        detector.process_frame(&solid(RED), 5).unwrap();

        let err = detector.process_frame(&solid(RED), 7).unwrap_err();
        assert!(matches!(err, SceneDetectError::FrameProcessingFailed { frame: 7, .. }));

        let err = detector.process_frame(&solid(RED), 5).unwrap_err();
        assert!(matches!(err, SceneDetectError::FrameProcessingFailed { frame: 5, .. }));
    }

    #[test]
    fn test_frame_size_change_rejected() {
        let mut detector = ContentDetector::new(27.0).unwrap();
        detector.process_frame(&solid(RED), 0).unwrap();

        let other = Frame::solid(8, 8, RED).unwrap();
        assert!(matches!(
            detector.process_frame(&other, 1),
            Err(SceneDetectError::FrameProcessingFailed { frame: 1, .. })
        ));
    }

    #[test]
    fn test_detector_reset() {
        let mut detector = ContentDetector::new(27.0).unwrap();
        detector.process_frame(&solid(RED), 0).unwrap();
        detector.process_frame(&solid(GRAY), 1).unwrap();
        assert_eq!(detector.frame_count(), 2);

        detector.reset();
        assert_eq!(detector.frame_count(), 0);
        assert_eq!(detector.last_score(), None);

        // A new window may start anywhere after a reset
        assert_eq!(detector.process_frame(&solid(GREEN), 100).unwrap(), None);
    }

    #[test]
    fn test_debug_formatting() {
        let detector = ContentDetector::new(27.0).unwrap();
        let debug_str = format!("{:?}", detector);
        assert!(debug_str.contains("ContentDetector"));
        assert!(debug_str.contains("threshold"));
        assert!(debug_str.contains("27"));
    }
}
