//! FacePipeline: detection, tracking and attribute inference per frame.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use image::RgbImage;
use nalgebra::Point2;
use rayon::prelude::*;
use serde::{Serialize, Serializer};

use crate::config::PipelineConfig;
use crate::error::{ConfigError, InferenceError};
use crate::frame::Frame;
use crate::logging::{Logger, PipelineEvent, TracingLogger};
use crate::stage::{
    AffineTransform, AttributeStage, AttributeValue, Embedding, Pose, Region, StageKind, align_face,
};
use crate::tracker::{Keypoints, Rect, Track, TrackId, TrackManager, TrackState};

use super::{DetectionSource, DispatchPolicy};

/// One tracked face as reported to consumers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FaceResult {
    pub track_id: TrackId,
    pub state: TrackState,
    pub bbox: Rect,
    pub confidence: f32,
    pub keypoints: Option<Keypoints>,
    pub landmarks: Option<Vec<Point2<f32>>>,
    pub pose: Option<Pose>,
    pub quality: Option<f32>,
    pub embedding: Option<Embedding>,
    /// Frame-to-canonical-face transform of the latest aligned crop
    #[serde(skip)]
    pub transform: Option<AffineTransform>,
}

impl From<&Track> for FaceResult {
    fn from(track: &Track) -> Self {
        Self {
            track_id: track.id(),
            state: track.state(),
            bbox: track.bbox(),
            confidence: track.score(),
            keypoints: track.keypoints().copied(),
            landmarks: track.landmarks().map(<[_]>::to_vec),
            pose: track.pose(),
            quality: track.quality(),
            embedding: track.embedding().cloned(),
            transform: track.transform().copied(),
        }
    }
}

/// An attribute stage that failed for one track; the field stays stale.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageFailure {
    pub track_id: TrackId,
    pub stage: StageKind,
    #[serde(serialize_with = "serialize_display")]
    pub error: InferenceError,
}

fn serialize_display<S: Serializer>(error: &InferenceError, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(error)
}

/// Everything the pipeline reports for one frame.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FrameResult {
    pub frame_index: u64,
    /// Reported tracks in identity order
    pub faces: Vec<FaceResult>,
    /// Tracks destroyed on this frame
    pub removed: Vec<TrackId>,
    pub stage_failures: Vec<StageFailure>,
    /// The detector could not run; every track was treated as unmatched
    pub detector_failed: bool,
    /// Attribute work was abandoned at the frame deadline
    pub deadline_exceeded: bool,
}

impl FrameResult {
    pub fn face(&self, id: TrackId) -> Option<&FaceResult> {
        self.faces.iter().find(|f| f.track_id == id)
    }
}

/// Attribute results for one track, computed without touching the track.
struct TrackOutcome {
    id: TrackId,
    transform: Option<AffineTransform>,
    values: Vec<AttributeValue>,
    failures: Vec<(StageKind, InferenceError)>,
    skipped: bool,
}

/// Read-only view shared by attribute workers.
struct AttributeContext<'a> {
    image: &'a RgbImage,
    stages: &'a BTreeMap<StageKind, AttributeStage>,
    policy: &'a DispatchPolicy,
    frame_index: u64,
    budget: Option<Duration>,
    deadline: Option<Instant>,
}

impl AttributeContext<'_> {
    fn run(&self, track: &Track) -> TrackOutcome {
        let aligned = align_face(&track.bbox(), track.keypoints());
        let region = aligned
            .map(Region::Aligned)
            .ok_or_else(|| {
                InferenceError::InvalidInput(format!("degenerate face box {:?}", track.bbox()))
            });
        let has_quality_stage = self.stages.contains_key(&StageKind::Quality);

        let mut outcome = TrackOutcome {
            id: track.id(),
            transform: None,
            values: Vec::new(),
            failures: Vec::new(),
            skipped: false,
        };
        let mut fresh_quality = None;

        // Stage kinds are ordered, so quality always precedes recognition.
        for (&kind, stage) in self.stages {
            let wanted = self.policy.runs_every_frame(kind)
                || (kind == StageKind::Recognition
                    && self.policy.wants_recognition(
                        track,
                        self.frame_index,
                        fresh_quality,
                        has_quality_stage,
                    ));
            if !wanted {
                continue;
            }
            if self.deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                outcome.skipped = true;
                break;
            }

            outcome.transform = aligned;
            let result = region
                .clone()
                .and_then(|region| stage.run(self.image, &region, self.budget));
            match result {
                Ok(value) => {
                    if let AttributeValue::Quality(quality) = value {
                        fresh_quality = Some(quality);
                    }
                    outcome.values.push(value);
                }
                Err(error) => outcome.failures.push((kind, error)),
            }
        }
        outcome
    }
}

/// End-to-end face pipeline over any [`DetectionSource`].
///
/// Frames are processed strictly one at a time (`process_frame` takes
/// `&mut self`). Within a frame, attribute stages for distinct tracks may run
/// in parallel; their results are merged serially.
pub struct FacePipeline<D: DetectionSource> {
    detector: D,
    tracks: TrackManager,
    stages: BTreeMap<StageKind, AttributeStage>,
    policy: DispatchPolicy,
    config: PipelineConfig,
    logger: Arc<dyn Logger>,
    last_frame: Option<u64>,
}

/// Assembles a [`FacePipeline`].
pub struct FacePipelineBuilder<D: DetectionSource> {
    detector: D,
    config: PipelineConfig,
    logger: Option<Arc<dyn Logger>>,
    stages: BTreeMap<StageKind, AttributeStage>,
}

impl<D: DetectionSource> FacePipelineBuilder<D> {
    pub fn config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn logger(mut self, logger: Arc<dyn Logger>) -> Self {
        self.logger = Some(logger);
        self
    }

    /// Add an attribute stage, replacing any stage of the same kind.
    pub fn stage(mut self, stage: impl Into<AttributeStage>) -> Self {
        let stage = stage.into();
        self.stages.insert(stage.kind(), stage);
        self
    }

    /// Validate the configuration and build the pipeline.
    pub fn build(self) -> Result<FacePipeline<D>, ConfigError> {
        self.config.validate()?;
        let logger = self
            .logger
            .unwrap_or_else(|| Arc::new(TracingLogger) as Arc<dyn Logger>);
        Ok(FacePipeline {
            detector: self.detector,
            tracks: TrackManager::with_logger(self.config.tracker.clone(), Arc::clone(&logger)),
            stages: self.stages,
            policy: DispatchPolicy::from_config(&self.config.attributes),
            config: self.config,
            logger,
            last_frame: None,
        })
    }
}

impl<D: DetectionSource> FacePipeline<D> {
    pub fn builder(detector: D) -> FacePipelineBuilder<D> {
        FacePipelineBuilder {
            detector,
            config: PipelineConfig::default(),
            logger: None,
            stages: BTreeMap::new(),
        }
    }

    /// Create a pipeline without attribute stages.
    pub fn new(detector: D, config: PipelineConfig) -> Result<Self, ConfigError> {
        Self::builder(detector).config(config).build()
    }

    /// Process a single frame: detect, associate, refresh attributes.
    ///
    /// Never fails as a whole. A detector error marks the frame
    /// `detector_failed` and counts a miss for every live track; attribute
    /// stage errors leave the affected fields stale.
    pub fn process_frame(&mut self, frame: &Frame) -> FrameResult {
        let frame_index = frame.index;
        let deadline = self
            .config
            .runtime
            .frame_deadline()
            .map(|budget| Instant::now() + budget);
        let budget = self.config.runtime.stage_budget();

        if let Some(previous) = self.last_frame.filter(|&previous| frame_index <= previous) {
            self.logger.event(&PipelineEvent::FrameOutOfOrder {
                frame_index,
                previous,
            });
        }
        self.last_frame = Some(frame_index);

        let mut result = FrameResult {
            frame_index,
            ..Default::default()
        };

        let report = match self.detector.detect(&frame.image, budget) {
            Ok(detections) => self.tracks.associate(frame_index, &detections),
            Err(error) => {
                self.logger.event(&PipelineEvent::DetectorFailed {
                    frame_index,
                    message: error.to_string(),
                });
                result.detector_failed = true;
                self.tracks.miss_all(frame_index)
            }
        };
        result.removed = report.removed;

        if !result.detector_failed && !self.stages.is_empty() {
            self.refresh_attributes(frame, budget, deadline, &mut result);
        }

        result.faces = self
            .tracks
            .tracks()
            .filter(|track| self.is_reported(track.state()))
            .map(FaceResult::from)
            .collect();
        result
    }

    fn refresh_attributes(
        &mut self,
        frame: &Frame,
        budget: Option<Duration>,
        deadline: Option<Instant>,
        result: &mut FrameResult,
    ) {
        let context = AttributeContext {
            image: &frame.image,
            stages: &self.stages,
            policy: &self.policy,
            frame_index: frame.index,
            budget,
            deadline,
        };
        let active: Vec<&Track> = self
            .tracks
            .tracks()
            .filter(|track| track.state().is_active())
            .collect();

        let outcomes: Vec<TrackOutcome> = if self.config.runtime.parallel_attributes {
            active.par_iter().map(|track| context.run(track)).collect()
        } else {
            active.iter().map(|track| context.run(track)).collect()
        };

        let mut skipped_tracks = 0;
        for outcome in outcomes {
            if outcome.skipped {
                skipped_tracks += 1;
            }
            for (stage, error) in outcome.failures {
                self.logger.event(&PipelineEvent::StageFailed {
                    track_id: outcome.id,
                    stage,
                    frame_index: frame.index,
                    error: error.clone(),
                });
                result.stage_failures.push(StageFailure {
                    track_id: outcome.id,
                    stage,
                    error,
                });
            }
            self.tracks
                .apply_attributes(outcome.id, frame.index, outcome.transform, outcome.values);
        }

        if skipped_tracks > 0 {
            result.deadline_exceeded = true;
            self.logger.event(&PipelineEvent::DeadlineExceeded {
                frame_index: frame.index,
                skipped_tracks,
            });
        }
    }

    fn is_reported(&self, state: TrackState) -> bool {
        match state {
            TrackState::Confirmed => true,
            TrackState::Tentative => self.config.output.report_tentative,
            TrackState::Lost => self.config.output.report_lost,
            TrackState::Removed => false,
        }
    }

    /// Drop every track and forget the last frame index.
    pub fn reset(&mut self) {
        self.tracks.clear();
        self.last_frame = None;
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn tracks(&self) -> &TrackManager {
        &self.tracks
    }

    pub fn detector(&self) -> &D {
        &self.detector
    }

    pub fn detector_mut(&mut self) -> &mut D {
        &mut self.detector
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OutputConfig;
    use crate::logging::RecordingLogger;
    use crate::tracker::{Detection, TrackerConfig};
    use std::collections::VecDeque;

    /// Replays a fixed script of per-frame results.
    struct Scripted {
        frames: VecDeque<Result<Vec<Detection>, String>>,
    }

    impl DetectionSource for Scripted {
        type Error = String;

        fn detect(
            &mut self,
            _image: &RgbImage,
            _budget: Option<Duration>,
        ) -> Result<Vec<Detection>, Self::Error> {
            self.frames.pop_front().unwrap_or_else(|| Ok(Vec::new()))
        }
    }

    fn frame(index: u64) -> Frame {
        Frame::new(index, RgbImage::new(64, 64))
    }

    fn face() -> Detection {
        Detection::new(10.0, 10.0, 50.0, 50.0, 0.9)
    }

    #[test]
    fn test_tentative_tracks_hidden_by_default() {
        let detector = Scripted {
            frames: VecDeque::from([Ok(vec![face()]), Ok(vec![face()]), Ok(vec![face()])]),
        };
        let mut pipeline = FacePipeline::new(detector, PipelineConfig::default()).unwrap();

        assert!(pipeline.process_frame(&frame(0)).faces.is_empty());
        assert!(pipeline.process_frame(&frame(1)).faces.is_empty());
        let result = pipeline.process_frame(&frame(2));
        assert_eq!(result.faces.len(), 1);
        assert_eq!(result.faces[0].state, TrackState::Confirmed);
        assert_eq!(result.faces[0].track_id, TrackId::new(1));
    }

    #[test]
    fn test_report_tentative_and_lost() {
        let detector = Scripted {
            frames: VecDeque::from([Ok(vec![face()]), Ok(Vec::new())]),
        };
        let config = PipelineConfig {
            output: OutputConfig {
                report_tentative: true,
                report_lost: true,
            },
            ..Default::default()
        };
        let mut pipeline = FacePipeline::new(detector, config).unwrap();

        let first = pipeline.process_frame(&frame(0));
        assert_eq!(first.faces[0].state, TrackState::Tentative);
        let second = pipeline.process_frame(&frame(1));
        assert_eq!(second.faces[0].state, TrackState::Lost);
    }

    #[test]
    fn test_detector_failure_misses_every_track() {
        let detector = Scripted {
            frames: VecDeque::from([Ok(vec![face()]), Err("backend down".to_string())]),
        };
        let config = PipelineConfig {
            tracker: TrackerConfig {
                confirm_threshold: 1,
                ..Default::default()
            },
            ..Default::default()
        };
        let mut pipeline = FacePipeline::new(detector, config).unwrap();

        assert_eq!(pipeline.process_frame(&frame(0)).faces.len(), 1);
        let result = pipeline.process_frame(&frame(1));
        assert!(result.detector_failed);
        assert!(result.faces.is_empty());
        let track = pipeline.tracks().get(TrackId::new(1)).unwrap();
        assert_eq!(track.state(), TrackState::Lost);
        assert_eq!(track.misses(), 1);
    }

    #[test]
    fn test_reset_drops_tracks_and_frame_order() {
        let detector = Scripted {
            frames: VecDeque::from([Ok(vec![face()]), Ok(vec![face()])]),
        };
        let logger = Arc::new(RecordingLogger::new());
        let mut pipeline = FacePipeline::builder(detector)
            .config(PipelineConfig {
                tracker: TrackerConfig {
                    confirm_threshold: 1,
                    ..Default::default()
                },
                ..Default::default()
            })
            .logger(logger.clone())
            .build()
            .unwrap();

        pipeline.process_frame(&frame(10));
        pipeline.reset();
        assert!(pipeline.tracks().is_empty());

        // An earlier index after a reset is not out of order, and ids are not reused.
        let result = pipeline.process_frame(&frame(0));
        assert_eq!(result.faces[0].track_id, TrackId::new(2));
        assert!(!logger
            .events()
            .iter()
            .any(|event| matches!(event, PipelineEvent::FrameOutOfOrder { .. })));
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = PipelineConfig {
            tracker: TrackerConfig {
                confirm_threshold: 0,
                ..Default::default()
            },
            ..Default::default()
        };
        let detector = Scripted {
            frames: VecDeque::new(),
        };
        assert!(FacePipeline::new(detector, config).is_err());
    }
}
