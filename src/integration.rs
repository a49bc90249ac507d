//! Integration module wiring detection sources, tracking and attribute
//! stages into a per-frame pipeline.
//!
//! [`FacePipeline`] accepts any [`DetectionSource`]; the built-in
//! [`FaceDetector`](crate::stage::FaceDetector) implements it on top of an
//! [`InferenceBackend`](crate::stage::InferenceBackend).

mod builder;
mod detector;
mod dispatch;
mod pipeline;

pub use builder::DetectionBuilder;
pub use detector::DetectionSource;
pub use dispatch::DispatchPolicy;
pub use pipeline::{FacePipeline, FacePipelineBuilder, FaceResult, FrameResult, StageFailure};

#[cfg(feature = "burn-backend")]
mod burn_backend;

#[cfg(feature = "burn-backend")]
pub use burn_backend::{BurnBackend, BurnModel};
