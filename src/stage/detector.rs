//! Full-frame face detector.

use std::time::Duration;

use image::RgbImage;
use nalgebra::Point2;
use ndarray::ArrayD;
use serde::{Deserialize, Serialize};

use crate::error::{InferenceError, InferenceResult};
use crate::stage::affine::AffineTransform;
use crate::stage::backend::ModelHandle;
use crate::stage::nms::non_max_suppression;
use crate::stage::preprocess::Normalization;
use crate::stage::{Crop, InferenceStage, Region, StageKind};
use crate::tracker::{Detection, Keypoints, Rect};

/// Row layout of a detector output: box and score, optionally followed by
/// five keypoints.
const BOX_COLUMNS: usize = 5;
const KEYPOINT_COLUMNS: usize = BOX_COLUMNS + 10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Minimum confidence for a candidate to be kept
    pub detection_threshold: f32,
    /// IoU above which a lower-ranked candidate is suppressed
    pub nms_iou_threshold: f32,
    /// Minimum short side of a face box, in frame pixels
    pub min_face_size: f32,
    /// Maximum number of faces per frame, 0 for no limit
    pub max_faces: usize,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            detection_threshold: 0.5,
            nms_iou_threshold: 0.4,
            min_face_size: 0.0,
            max_faces: 0,
        }
    }
}

/// Face detector over a letterboxed full frame.
#[derive(Debug, Clone)]
pub struct FaceDetector {
    model: ModelHandle,
    config: DetectorConfig,
    normalization: Normalization,
}

impl FaceDetector {
    pub fn new(model: ModelHandle, config: DetectorConfig) -> Self {
        Self {
            model,
            config,
            normalization: Normalization::default(),
        }
    }

    pub fn with_normalization(mut self, normalization: Normalization) -> Self {
        self.normalization = normalization;
        self
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// Detect faces in `image`. An empty image yields no faces.
    pub fn detect(
        &self,
        image: &RgbImage,
        budget: Option<Duration>,
    ) -> InferenceResult<Vec<Detection>> {
        if image.width() == 0 || image.height() == 0 {
            return Ok(Vec::new());
        }
        self.run(image, &Region::Full, budget)
    }

    fn decode_row(&self, row: &[f32], to_frame: &AffineTransform, crop: &Crop) -> Option<Detection> {
        let score = row[4];
        if !(score >= self.config.detection_threshold) {
            return None;
        }

        let (frame_w, frame_h) = (crop.source_size.0 as f32, crop.source_size.1 as f32);
        let raw = Rect::from_tlbr(row[0], row[1], row[2], row[3]);
        let bbox = to_frame.map_rect(&raw).clamp_to(frame_w, frame_h);
        if bbox.is_empty() || bbox.short_side() < self.config.min_face_size {
            return None;
        }

        let mut detection = Detection::from_rect(bbox, score);
        if row.len() == KEYPOINT_COLUMNS {
            let keypoints: Keypoints = std::array::from_fn(|k| {
                to_frame.apply(Point2::new(row[BOX_COLUMNS + 2 * k], row[BOX_COLUMNS + 2 * k + 1]))
            });
            detection = detection.with_keypoints(keypoints);
        }
        Some(detection)
    }
}

impl InferenceStage for FaceDetector {
    type Output = Vec<Detection>;

    fn kind(&self) -> StageKind {
        StageKind::Detector
    }

    fn model(&self) -> &ModelHandle {
        &self.model
    }

    fn normalization(&self) -> &Normalization {
        &self.normalization
    }

    fn postprocess(&self, outputs: &[ArrayD<f32>], crop: &Crop) -> InferenceResult<Vec<Detection>> {
        let output = outputs
            .first()
            .ok_or_else(|| InferenceError::malformed("detector model produced no outputs"))?;

        let columns = match output.shape().last() {
            Some(&n) if n == BOX_COLUMNS || n == KEYPOINT_COLUMNS => n,
            // A model that found nothing may return an empty tensor.
            _ if output.is_empty() => return Ok(Vec::new()),
            _ => {
                return Err(InferenceError::malformed(format!(
                    "detector rows must have {BOX_COLUMNS} or {KEYPOINT_COLUMNS} columns, got shape {:?}",
                    output.shape()
                )));
            }
        };

        let to_frame = crop
            .transform
            .inverse()
            .ok_or_else(|| InferenceError::InvalidInput("degenerate letterbox transform".into()))?;

        let values: Vec<f32> = output.iter().copied().collect();
        let candidates: Vec<Detection> = values
            .chunks_exact(columns)
            .filter_map(|row| self.decode_row(row, &to_frame, crop))
            .collect();

        let mut kept = non_max_suppression(candidates, self.config.nms_iou_threshold);
        if self.config.max_faces > 0 {
            kept.truncate(self.config.max_faces);
        }
        Ok(kept)
    }
}
