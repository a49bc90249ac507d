use nalgebra::Point2;
use ndarray::ArrayD;

use crate::error::{InferenceError, InferenceResult};
use crate::stage::backend::ModelHandle;
use crate::stage::preprocess::Normalization;
use crate::stage::{Crop, InferenceStage, StageKind, first_output};

/// Dense landmark regression on an aligned face crop.
///
/// The model emits `2N` values, `(x, y)` pairs normalized to the crop; they
/// are returned in frame pixels.
#[derive(Debug, Clone)]
pub struct LandmarkStage {
    model: ModelHandle,
    normalization: Normalization,
    num_points: Option<usize>,
}

impl LandmarkStage {
    pub fn new(model: ModelHandle) -> Self {
        Self {
            model,
            normalization: Normalization::default(),
            num_points: None,
        }
    }

    /// Reject outputs that do not carry exactly `num_points` points.
    pub fn with_num_points(mut self, num_points: usize) -> Self {
        self.num_points = Some(num_points);
        self
    }

    pub fn with_normalization(mut self, normalization: Normalization) -> Self {
        self.normalization = normalization;
        self
    }
}

impl InferenceStage for LandmarkStage {
    type Output = Vec<Point2<f32>>;

    fn kind(&self) -> StageKind {
        StageKind::Landmark
    }

    fn model(&self) -> &ModelHandle {
        &self.model
    }

    fn normalization(&self) -> &Normalization {
        &self.normalization
    }

    fn postprocess(&self, outputs: &[ArrayD<f32>], crop: &Crop) -> InferenceResult<Self::Output> {
        let values = first_output(outputs, self.kind())?;
        let valid = match self.num_points {
            Some(n) => values.len() == 2 * n,
            None => !values.is_empty() && values.len() % 2 == 0,
        };
        if !valid {
            return Err(InferenceError::malformed(format!(
                "landmark output has {} values, expected {}",
                values.len(),
                self.num_points
                    .map_or_else(|| "an even count".to_string(), |n| (2 * n).to_string())
            )));
        }

        let to_frame = crop
            .transform
            .inverse()
            .ok_or_else(|| InferenceError::InvalidInput("degenerate crop transform".into()))?;
        let (width, height) = (crop.input_size.0 as f32, crop.input_size.1 as f32);

        Ok(values
            .chunks_exact(2)
            .map(|xy| to_frame.apply(Point2::new(xy[0] * width, xy[1] * height)))
            .collect())
    }
}
