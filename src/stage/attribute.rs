use std::time::Duration;

use image::RgbImage;
use nalgebra::Point2;

use crate::error::InferenceResult;
use crate::stage::landmark::LandmarkStage;
use crate::stage::pose::{Pose, PoseStage};
use crate::stage::quality::QualityStage;
use crate::stage::recognition::{Embedding, RecognitionStage};
use crate::stage::{InferenceStage, Region, StageKind};

/// Any per-face attribute stage.
#[derive(Debug, Clone)]
pub enum AttributeStage {
    Landmark(LandmarkStage),
    Pose(PoseStage),
    Quality(QualityStage),
    Recognition(RecognitionStage),
}

/// Result of an [`AttributeStage`], merged into the owning track.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    Landmarks(Vec<Point2<f32>>),
    Pose(Pose),
    Quality(f32),
    Embedding(Embedding),
}

impl AttributeStage {
    pub fn kind(&self) -> StageKind {
        match self {
            Self::Landmark(stage) => stage.kind(),
            Self::Pose(stage) => stage.kind(),
            Self::Quality(stage) => stage.kind(),
            Self::Recognition(stage) => stage.kind(),
        }
    }

    pub fn run(
        &self,
        image: &RgbImage,
        region: &Region,
        budget: Option<Duration>,
    ) -> InferenceResult<AttributeValue> {
        Ok(match self {
            Self::Landmark(stage) => AttributeValue::Landmarks(stage.run(image, region, budget)?),
            Self::Pose(stage) => AttributeValue::Pose(stage.run(image, region, budget)?),
            Self::Quality(stage) => AttributeValue::Quality(stage.run(image, region, budget)?),
            Self::Recognition(stage) => {
                AttributeValue::Embedding(stage.run(image, region, budget)?)
            }
        })
    }
}

impl AttributeValue {
    pub fn kind(&self) -> StageKind {
        match self {
            Self::Landmarks(_) => StageKind::Landmark,
            Self::Pose(_) => StageKind::Pose,
            Self::Quality(_) => StageKind::Quality,
            Self::Embedding(_) => StageKind::Recognition,
        }
    }
}

impl From<LandmarkStage> for AttributeStage {
    fn from(stage: LandmarkStage) -> Self {
        Self::Landmark(stage)
    }
}

impl From<PoseStage> for AttributeStage {
    fn from(stage: PoseStage) -> Self {
        Self::Pose(stage)
    }
}

impl From<QualityStage> for AttributeStage {
    fn from(stage: QualityStage) -> Self {
        Self::Quality(stage)
    }
}

impl From<RecognitionStage> for AttributeStage {
    fn from(stage: RecognitionStage) -> Self {
        Self::Recognition(stage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::InferenceError;
    use crate::stage::{AffineTransform, InferenceBackend, ModelHandle, Normalization};
    use image::Rgb;
    use ndarray::{Array4, ArrayD, IxDyn};

    /// Emits the mean of its input, so outputs depend on the crop content.
    struct MeanOf;

    impl InferenceBackend for MeanOf {
        fn input_shape(&self) -> [usize; 4] {
            [1, 3, 16, 16]
        }

        fn run(&self, input: Array4<f32>) -> InferenceResult<Vec<ArrayD<f32>>> {
            let mean = input.mean().unwrap_or_default();
            Ok(vec![ArrayD::from_elem(IxDyn(&[1, 3]), mean)])
        }
    }

    #[test]
    fn test_run_tags_values_by_stage() {
        let model = ModelHandle::new("mean", MeanOf);
        let image = RgbImage::from_pixel(32, 32, Rgb([0, 0, 0]));
        let region = Region::Aligned(AffineTransform::scale_translate(3.5, 3.5, 0.0, 0.0));

        // UNIT normalization maps black to exactly 0.
        let quality: AttributeStage = QualityStage::new(model.clone())
            .with_normalization(Normalization::UNIT)
            .into();
        assert_eq!(quality.kind(), StageKind::Quality);
        assert_eq!(quality.run(&image, &region, None).unwrap(), AttributeValue::Quality(0.0));

        let pose: AttributeStage = PoseStage::new(model.clone())
            .with_normalization(Normalization::UNIT)
            .into();
        let value = pose.run(&image, &region, None).unwrap();
        assert_eq!(value.kind(), StageKind::Pose);
        assert_eq!(value, AttributeValue::Pose(Pose::new(0.0, 0.0, 0.0)));

        let recognition: AttributeStage = RecognitionStage::new(model, 8).into();
        assert!(matches!(
            recognition.run(&image, &region, None),
            Err(InferenceError::MalformedOutput(_))
        ));
    }
}
