//! Pipeline configuration, loadable from TOML.
//!
//! Every section and field is optional; missing values take their defaults.
//!
//! ```toml
//! [detector]
//! detection_threshold = 0.6
//!
//! [tracker]
//! confirm_threshold = 2
//! strategy = "optimal"
//!
//! [runtime]
//! stage_timeout_ms = 0        # unbounded
//! frame_deadline_ms = 40
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::stage::DetectorConfig;
use crate::tracker::TrackerConfig;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub detector: DetectorConfig,
    pub tracker: TrackerConfig,
    pub attributes: AttributeConfig,
    pub runtime: RuntimeConfig,
    pub output: OutputConfig,
}

/// When attribute stages run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AttributeConfig {
    /// Frames between recognition refreshes of a track's embedding
    pub embedding_refresh_interval: u64,
    /// Minimum quality for the recognition stage to run
    pub quality_min_for_recognition: f32,
}

impl Default for AttributeConfig {
    fn default() -> Self {
        Self {
            embedding_refresh_interval: 30,
            quality_min_for_recognition: 0.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Budget of a single backend call in milliseconds, 0 for unbounded
    pub stage_timeout_ms: u64,
    /// Wall-clock budget for a frame's attribute work
    pub frame_deadline_ms: Option<u64>,
    /// Run attribute stages for distinct tracks on the rayon pool
    pub parallel_attributes: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            stage_timeout_ms: 200,
            frame_deadline_ms: None,
            parallel_attributes: true,
        }
    }
}

impl RuntimeConfig {
    pub fn stage_budget(&self) -> Option<Duration> {
        (self.stage_timeout_ms > 0).then(|| Duration::from_millis(self.stage_timeout_ms))
    }

    pub fn frame_deadline(&self) -> Option<Duration> {
        self.frame_deadline_ms.map(Duration::from_millis)
    }
}

/// Which non-confirmed tracks appear in frame results.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub report_tentative: bool,
    pub report_lost: bool,
}

impl PipelineConfig {
    /// Read, parse and validate a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Parse and validate TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        unit_range("detector.detection_threshold", self.detector.detection_threshold)?;
        unit_range("detector.nms_iou_threshold", self.detector.nms_iou_threshold)?;
        if !(self.detector.min_face_size >= 0.0) {
            return Err(ConfigError::invalid(
                "detector.min_face_size",
                "must be non-negative",
            ));
        }

        if self.tracker.confirm_threshold < 1 {
            return Err(ConfigError::invalid(
                "tracker.confirm_threshold",
                "must be at least 1",
            ));
        }
        let min_score = self.tracker.association_min_score;
        if !(min_score > 0.0 && min_score <= 1.0) {
            return Err(ConfigError::invalid(
                "tracker.association_min_score",
                format!("{min_score} is outside (0, 1]"),
            ));
        }
        unit_range("tracker.embedding_weight", self.tracker.embedding_weight)?;

        unit_range(
            "attributes.quality_min_for_recognition",
            self.attributes.quality_min_for_recognition,
        )?;
        Ok(())
    }
}

fn unit_range(field: &'static str, value: f32) -> Result<(), ConfigError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::invalid(field, format!("{value} is outside [0, 1]")))
    }
}
