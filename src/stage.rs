//! Neural-network inference stages.
//!
//! Every stage follows the same three steps: `preprocess` turns a frame region
//! into an input tensor, the shared [`ModelHandle`] executes it, and
//! `postprocess` parses raw tensors into a typed result. The set of stages is
//! closed: [`FaceDetector`] plus the four attribute stages wrapped by
//! [`AttributeStage`].

mod affine;
mod attribute;
mod backend;
mod detector;
mod landmark;
mod nms;
mod pose;
mod preprocess;
mod quality;
mod recognition;

use std::fmt;
use std::time::Duration;

use image::RgbImage;
use ndarray::{Array4, ArrayD};
use serde::{Deserialize, Serialize};

use crate::error::{InferenceError, InferenceResult};

pub use affine::{ARCFACE_TEMPLATE, AffineTransform, CANONICAL_FACE_SIZE, align_face};
pub use attribute::{AttributeStage, AttributeValue};
pub use backend::{InferenceBackend, ModelHandle};
pub use detector::{DetectorConfig, FaceDetector};
pub use landmark::LandmarkStage;
pub use nms::non_max_suppression;
pub use pose::{Pose, PoseStage};
pub use preprocess::{ChannelOrder, Normalization, to_nchw, warp_affine};
pub use quality::QualityStage;
pub use recognition::{Embedding, RecognitionStage};

/// Tag of every stage variant, in dispatch order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageKind {
    Detector,
    Landmark,
    Pose,
    Quality,
    Recognition,
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Detector => "detector",
            Self::Landmark => "landmark",
            Self::Pose => "pose",
            Self::Quality => "quality",
            Self::Recognition => "recognition",
        })
    }
}

/// Part of the frame a stage looks at.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Region {
    /// Whole frame, letterboxed into the model input
    Full,
    /// Face aligned by a frame-to-canonical transform (see [`align_face`])
    Aligned(AffineTransform),
}

/// Geometry of a preprocessed crop, needed to map outputs back to the frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Crop {
    /// Frame pixels to model-input pixels
    pub transform: AffineTransform,
    /// Frame size (width, height)
    pub source_size: (u32, u32),
    /// Model input size (width, height)
    pub input_size: (u32, u32),
}

/// Output of [`InferenceStage::preprocess`].
#[derive(Debug, Clone)]
pub struct Prepared {
    pub tensor: Array4<f32>,
    pub crop: Crop,
}

/// Uniform capability of a model-backed stage.
pub trait InferenceStage: Send + Sync {
    type Output;

    fn kind(&self) -> StageKind;

    fn model(&self) -> &ModelHandle;

    fn normalization(&self) -> &Normalization;

    /// Warp `region` of `image` into the model input and normalize it.
    ///
    /// Deterministic and free of side effects.
    fn preprocess(&self, image: &RgbImage, region: &Region) -> InferenceResult<Prepared> {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Err(InferenceError::InvalidInput("empty frame".into()));
        }
        let input_size = self.model().input_size()?;
        if input_size.0 == 0 || input_size.1 == 0 {
            return Err(InferenceError::InvalidInput(format!(
                "{} model declares an empty input size",
                self.kind()
            )));
        }

        let transform = match region {
            Region::Full => AffineTransform::letterbox((width, height), input_size),
            Region::Aligned(to_canonical) => to_canonical.then_scale(
                input_size.0 as f32 / CANONICAL_FACE_SIZE as f32,
                input_size.1 as f32 / CANONICAL_FACE_SIZE as f32,
            ),
        };
        let warped = warp_affine(image, &transform, input_size)?;

        Ok(Prepared {
            tensor: to_nchw(&warped, self.normalization()),
            crop: Crop {
                transform,
                source_size: (width, height),
                input_size,
            },
        })
    }

    /// Parse raw backend outputs into the stage result.
    fn postprocess(&self, outputs: &[ArrayD<f32>], crop: &Crop) -> InferenceResult<Self::Output>;

    /// Preprocess, execute within `budget` and postprocess.
    fn run(
        &self,
        image: &RgbImage,
        region: &Region,
        budget: Option<Duration>,
    ) -> InferenceResult<Self::Output> {
        if !self.model().is_loaded() {
            return Err(InferenceError::ModelNotLoaded(self.kind()));
        }
        let Prepared { tensor, crop } = self.preprocess(image, region)?;
        let outputs = self.model().execute(self.kind(), tensor, budget)?;
        self.postprocess(&outputs, &crop)
    }
}

/// Flatten the first output tensor.
pub(crate) fn first_output(outputs: &[ArrayD<f32>], kind: StageKind) -> InferenceResult<Vec<f32>> {
    outputs
        .first()
        .map(|output| output.iter().copied().collect())
        .ok_or_else(|| InferenceError::malformed(format!("{kind} model produced no outputs")))
}
