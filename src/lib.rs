//! Face detection, tracking and attribute inference for video streams.
//!
//! Frames flow through a [`FacePipeline`]: a detector proposes face boxes, the
//! [`TrackManager`] associates them with live tracks, and attribute stages
//! (landmarks, pose, quality, recognition) refresh per-track state on aligned
//! crops. Inference itself is delegated to an [`InferenceBackend`].

pub mod config;
pub mod error;
pub mod frame;
pub mod integration;
pub mod logging;
pub mod stage;
pub mod tracker;

pub use config::PipelineConfig;
pub use error::{ConfigError, InferenceError};
pub use frame::{Frame, PixelFormat};
pub use integration::{
    DetectionBuilder, DetectionSource, DispatchPolicy, FacePipeline, FacePipelineBuilder,
    FaceResult, FrameResult, StageFailure,
};
pub use logging::{LogLevel, Logger, PipelineEvent, TracingLogger};
pub use stage::{
    AffineTransform, AttributeStage, AttributeValue, Embedding, FaceDetector, InferenceBackend,
    InferenceStage, LandmarkStage, ModelHandle, Pose, PoseStage, QualityStage, RecognitionStage,
    StageKind,
};
pub use tracker::{
    AssociationReport, AssociationStrategy, Detection, Keypoints, Rect, Track, TrackId,
    TrackManager, TrackState, TrackerConfig,
};
