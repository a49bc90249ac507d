//! Trait for face detection backends.

use std::fmt;
use std::time::Duration;

use image::RgbImage;

use crate::error::InferenceError;
use crate::stage::FaceDetector;
use crate::tracker::Detection;

/// Anything that proposes face boxes for a frame.
///
/// [`FaceDetector`] is the built-in implementation; implement this trait to
/// plug in a detector that does not fit the [`InferenceBackend`] model, or a
/// scripted source in tests.
///
/// [`InferenceBackend`]: crate::stage::InferenceBackend
///
/// # Example
///
/// ```ignore
/// use facetrack_rs::{DetectionBuilder, DetectionSource, Detection};
///
/// struct Scripted(Vec<Vec<Detection>>);
///
/// impl DetectionSource for Scripted {
///     type Error = std::convert::Infallible;
///
///     fn detect(&mut self, _image: &RgbImage, _budget: Option<Duration>) -> Result<Vec<Detection>, Self::Error> {
///         Ok(self.0.pop().unwrap_or_default())
///     }
/// }
/// ```
pub trait DetectionSource {
    /// Error type for detection failures.
    type Error: fmt::Display;

    /// Detect faces in a full frame, within `budget` when one is set.
    ///
    /// Boxes and keypoints are in frame pixels. An empty result is a valid
    /// outcome, not an error.
    fn detect(
        &mut self,
        image: &RgbImage,
        budget: Option<Duration>,
    ) -> Result<Vec<Detection>, Self::Error>;
}

impl DetectionSource for FaceDetector {
    type Error = InferenceError;

    fn detect(
        &mut self,
        image: &RgbImage,
        budget: Option<Duration>,
    ) -> Result<Vec<Detection>, Self::Error> {
        FaceDetector::detect(self, image, budget)
    }
}
