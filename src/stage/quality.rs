use ndarray::ArrayD;

use crate::error::{InferenceError, InferenceResult};
use crate::stage::backend::ModelHandle;
use crate::stage::preprocess::Normalization;
use crate::stage::{Crop, InferenceStage, StageKind, first_output};

/// Face quality scoring. The score is the mean of the model outputs,
/// clamped to [0, 1].
#[derive(Debug, Clone)]
pub struct QualityStage {
    model: ModelHandle,
    normalization: Normalization,
}

impl QualityStage {
    pub fn new(model: ModelHandle) -> Self {
        Self {
            model,
            normalization: Normalization::default(),
        }
    }

    pub fn with_normalization(mut self, normalization: Normalization) -> Self {
        self.normalization = normalization;
        self
    }
}

impl InferenceStage for QualityStage {
    type Output = f32;

    fn kind(&self) -> StageKind {
        StageKind::Quality
    }

    fn model(&self) -> &ModelHandle {
        &self.model
    }

    fn normalization(&self) -> &Normalization {
        &self.normalization
    }

    fn postprocess(&self, outputs: &[ArrayD<f32>], _crop: &Crop) -> InferenceResult<f32> {
        let values = first_output(outputs, self.kind())?;
        if values.is_empty() {
            return Err(InferenceError::malformed("quality output is empty"));
        }
        let mean = values.iter().sum::<f32>() / values.len() as f32;
        if !mean.is_finite() {
            return Err(InferenceError::malformed("quality output is not finite"));
        }
        Ok(mean.clamp(0.0, 1.0))
    }
}
