//! Detector configuration
//!
//! [`DetectorConfig`] can be built in code or deserialized from a JSON options
//! object such as `{"threshold": 30.0, "flicker_frames": 2}`. Values are
//! validated on deserialization and again when the detector is built; nothing
//! is clamped.

use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, instrument};

use crate::common::{Result, SceneDetectError};
use crate::content_detector::ComponentWeights;

/// Default score threshold
pub const DEFAULT_THRESHOLD: f64 = 27.0;

/// Largest score the content detector can produce
pub const MAX_SCORE: f64 = 255.0;

/// Content detector settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "DetectorOptions")]
pub struct DetectorConfig {
    /// Scores strictly above this value are cut candidates. Range 0.0–255.0.
    pub threshold: f64,
    /// Consecutive candidate frames needed to confirm a cut; 0 disables flash suppression.
    pub flicker_frames: u32,
    /// Confirmed cuts closer than this many frames to the previous cut are dropped; 0 disables.
    pub min_scene_len: u32,
    /// Per-channel weights of the HSV difference score.
    pub weights: ComponentWeights,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            flicker_frames: 0,
            min_scene_len: 0,
            weights: ComponentWeights::default(),
        }
    }
}

/// JSON options as written by users; `luma_only` is shorthand for luma weights
#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct DetectorOptions {
    threshold: f64,
    flicker_frames: u32,
    min_scene_len: u32,
    luma_only: bool,
    weights: Option<ComponentWeights>,
}

impl Default for DetectorOptions {
    fn default() -> Self {
        let config = DetectorConfig::default();
        Self {
            threshold: config.threshold,
            flicker_frames: config.flicker_frames,
            min_scene_len: config.min_scene_len,
            luma_only: false,
            weights: None,
        }
    }
}

impl TryFrom<DetectorOptions> for DetectorConfig {
    type Error = SceneDetectError;

    fn try_from(options: DetectorOptions) -> Result<Self> {
        let weights = match (options.luma_only, options.weights) {
            (true, Some(_)) => {
                return Err(SceneDetectError::config_error("luma_only cannot be combined with weights"));
            }
            (true, None) => ComponentWeights::luma_only(),
            (false, weights) => weights.unwrap_or_default(),
        };

        let config = Self {
            threshold: options.threshold,
            flicker_frames: options.flicker_frames,
            min_scene_len: options.min_scene_len,
            weights,
        };
        config.validate()?;
        Ok(config)
    }
}

impl DetectorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn flicker_frames(mut self, flicker_frames: u32) -> Self {
        self.flicker_frames = flicker_frames;
        self
    }

    pub fn min_scene_len(mut self, min_scene_len: u32) -> Self {
        self.min_scene_len = min_scene_len;
        self
    }

    pub fn weights(mut self, weights: ComponentWeights) -> Self {
        self.weights = weights;
        self
    }

    /// Score brightness changes only
    pub fn luma_only(mut self) -> Self {
        self.weights = ComponentWeights::luma_only();
        self
    }

    /// Check every setting
    ///
    /// # Errors
    /// * `InvalidConfig` - If the threshold is outside `[0, 255]` or the weights are unusable
    pub fn validate(&self) -> Result<()> {
        if !self.threshold.is_finite() || !(0.0..=MAX_SCORE).contains(&self.threshold) {
            return Err(SceneDetectError::config_error(format!(
                "threshold must be within 0-{}, got {}",
                MAX_SCORE, self.threshold
            )));
        }
        self.weights.validate()
    }

    /// Build a configuration from a JSON options object
    ///
    /// Recognized keys: `threshold`, `flicker_frames`, `min_scene_len`,
    /// `luma_only`, `weights` (`delta_hue`, `delta_sat`, `delta_lum`). Missing
    /// keys keep their defaults. Unknown keys, wrong types and negative counts
    /// are errors.
    ///
    /// # Errors
    /// * `InvalidConfig` - If an option is unknown, mistyped or out of range
    #[instrument(skip(value))]
    pub fn from_json(value: &Value) -> Result<Self> {
        let config = Self::deserialize(value).map_err(|e| SceneDetectError::config_error(e.to_string()))?;
        debug!("Loaded detector config: {:?}", config);
        Ok(config)
    }

    /// Read a JSON options file
    ///
    /// # Errors
    /// * `ConfigIo` - If the file cannot be read
    /// * `ConfigParse` - If the file is not valid JSON
    /// * `InvalidConfig` - If the JSON holds invalid options
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let display = path.display().to_string();

        let text = std::fs::read_to_string(path).map_err(|source| SceneDetectError::ConfigIo {
            path: display.clone(),
            source,
        })?;

        let config: Self = serde_json::from_str(&text).map_err(|source| {
            if source.is_data() {
                SceneDetectError::config_error(format!("{}: {}", display, source))
            } else {
                SceneDetectError::ConfigParse { path: display, source }
            }
        })?;

        debug!("Loaded detector config from {}: {:?}", path.display(), config);
        Ok(config)
    }

    /// The configuration as a JSON options object
    pub fn to_json(&self) -> Result<Value> {
        serde_json::to_value(self).map_err(|e| SceneDetectError::config_error(e.to_string()))
    }
}
