use ndarray::ArrayD;
use serde::{Deserialize, Serialize};

use crate::error::{InferenceError, InferenceResult};
use crate::stage::backend::ModelHandle;
use crate::stage::preprocess::Normalization;
use crate::stage::{Crop, InferenceStage, StageKind, first_output};

const MAX_ANGLE: f32 = 90.0;

/// Head orientation in degrees, each angle within [-90, 90].
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    pub pitch: f32,
    pub yaw: f32,
    pub roll: f32,
}

impl Pose {
    /// Build a pose, clamping every angle to [-90, 90].
    pub fn new(pitch: f32, yaw: f32, roll: f32) -> Self {
        let clamp = |angle: f32| angle.clamp(-MAX_ANGLE, MAX_ANGLE);
        Self {
            pitch: clamp(pitch),
            yaw: clamp(yaw),
            roll: clamp(roll),
        }
    }
}

/// Pose regression on an aligned face crop.
///
/// Reads `[pitch, yaw, roll]` normalized to [-1, 1] and scales by
/// `angle_scale`.
#[derive(Debug, Clone)]
pub struct PoseStage {
    model: ModelHandle,
    normalization: Normalization,
    angle_scale: f32,
}

impl PoseStage {
    pub fn new(model: ModelHandle) -> Self {
        Self {
            model,
            normalization: Normalization::default(),
            angle_scale: MAX_ANGLE,
        }
    }

    pub fn with_angle_scale(mut self, angle_scale: f32) -> Self {
        self.angle_scale = angle_scale;
        self
    }

    pub fn with_normalization(mut self, normalization: Normalization) -> Self {
        self.normalization = normalization;
        self
    }
}

impl InferenceStage for PoseStage {
    type Output = Pose;

    fn kind(&self) -> StageKind {
        StageKind::Pose
    }

    fn model(&self) -> &ModelHandle {
        &self.model
    }

    fn normalization(&self) -> &Normalization {
        &self.normalization
    }

    fn postprocess(&self, outputs: &[ArrayD<f32>], _crop: &Crop) -> InferenceResult<Pose> {
        let values = first_output(outputs, self.kind())?;
        let [pitch, yaw, roll] = match values.get(..3) {
            Some(&[p, y, r]) => [p, y, r],
            _ => {
                return Err(InferenceError::malformed(format!(
                    "pose output needs 3 angles, got {}",
                    values.len()
                )));
            }
        };
        if ![pitch, yaw, roll].iter().all(|a| a.is_finite()) {
            return Err(InferenceError::malformed("pose output is not finite"));
        }
        let scale = self.angle_scale;
        Ok(Pose::new(pitch * scale, yaw * scale, roll * scale))
    }
}
