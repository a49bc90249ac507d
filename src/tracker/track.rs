//! A single face track and its per-face attributes.

use std::fmt;

use nalgebra::Point2;
use serde::{Deserialize, Serialize};

use crate::stage::{AffineTransform, AttributeValue, Embedding, Pose};
use crate::tracker::matching::{Detection, Keypoints};
use crate::tracker::rect::Rect;
use crate::tracker::track_state::TrackState;

/// Stable identity of a track. Never reused within a [`TrackManager`].
///
/// [`TrackManager`]: crate::tracker::TrackManager
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrackId(u64);

impl TrackId {
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One real-world face followed across frames.
///
/// Attribute fields are independently optional: `None` means the stage has
/// not produced a value for this track yet.
#[derive(Debug, Clone)]
pub struct Track {
    id: TrackId,
    state: TrackState,
    ever_confirmed: bool,
    bbox: Rect,
    score: f32,
    keypoints: Option<Keypoints>,
    landmarks: Option<Vec<Point2<f32>>>,
    pose: Option<Pose>,
    quality: Option<f32>,
    embedding: Option<Embedding>,
    embedding_frame: Option<u64>,
    transform: Option<AffineTransform>,
    hits: u32,
    misses: u32,
    start_frame: u64,
    last_updated_frame: u64,
}

impl Track {
    /// Start a track from an unmatched detection. Creation counts as the first hit.
    pub(crate) fn new(
        id: TrackId,
        detection: &Detection,
        frame_index: u64,
        confirm_threshold: u32,
    ) -> Self {
        let confirmed = confirm_threshold <= 1;
        Self {
            id,
            state: if confirmed {
                TrackState::Confirmed
            } else {
                TrackState::Tentative
            },
            ever_confirmed: confirmed,
            bbox: detection.bbox,
            score: detection.score,
            keypoints: detection.keypoints,
            landmarks: None,
            pose: None,
            quality: None,
            embedding: detection.embedding.clone(),
            embedding_frame: detection.embedding.as_ref().map(|_| frame_index),
            transform: None,
            hits: 1,
            misses: 0,
            start_frame: frame_index,
            last_updated_frame: frame_index,
        }
    }

    pub fn id(&self) -> TrackId {
        self.id
    }

    pub fn state(&self) -> TrackState {
        self.state
    }

    /// Last associated box.
    pub fn bbox(&self) -> Rect {
        self.bbox
    }

    /// Confidence of the last associated detection.
    pub fn score(&self) -> f32 {
        self.score
    }

    pub fn keypoints(&self) -> Option<&Keypoints> {
        self.keypoints.as_ref()
    }

    /// Refined landmarks in frame coordinates.
    pub fn landmarks(&self) -> Option<&[Point2<f32>]> {
        self.landmarks.as_deref()
    }

    pub fn pose(&self) -> Option<Pose> {
        self.pose
    }

    pub fn quality(&self) -> Option<f32> {
        self.quality
    }

    pub fn embedding(&self) -> Option<&Embedding> {
        self.embedding.as_ref()
    }

    /// Frame the current embedding was computed on.
    pub fn embedding_frame(&self) -> Option<u64> {
        self.embedding_frame
    }

    /// Frame-to-canonical-face transform of the most recent aligned crop.
    pub fn transform(&self) -> Option<&AffineTransform> {
        self.transform.as_ref()
    }

    pub fn hits(&self) -> u32 {
        self.hits
    }

    pub fn misses(&self) -> u32 {
        self.misses
    }

    pub fn start_frame(&self) -> u64 {
        self.start_frame
    }

    pub fn last_updated_frame(&self) -> u64 {
        self.last_updated_frame
    }

    /// Whether the track has reached `Confirmed` at some point.
    pub fn ever_confirmed(&self) -> bool {
        self.ever_confirmed
    }

    /// Record a successful association. Returns `true` when this hit
    /// confirmed a track for the first time.
    pub(crate) fn mark_hit(
        &mut self,
        detection: &Detection,
        frame_index: u64,
        confirm_threshold: u32,
    ) -> bool {
        self.bbox = detection.bbox;
        self.score = detection.score;
        self.keypoints = detection.keypoints;
        if let Some(embedding) = &detection.embedding {
            self.embedding = Some(embedding.clone());
            self.embedding_frame = Some(frame_index);
        }
        self.misses = 0;
        self.hits = self.hits.saturating_add(1);
        self.last_updated_frame = frame_index;

        if self.state == TrackState::Lost {
            self.state = if self.ever_confirmed {
                TrackState::Confirmed
            } else {
                TrackState::Tentative
            };
        }

        if self.state == TrackState::Tentative && self.hits >= confirm_threshold {
            self.state = TrackState::Confirmed;
            let first = !self.ever_confirmed;
            self.ever_confirmed = true;
            return first;
        }
        false
    }

    /// Record a frame without a matching detection. Returns `true` on the
    /// transition into `Lost`.
    pub(crate) fn mark_missed(&mut self) -> bool {
        self.hits = 0;
        self.misses = self.misses.saturating_add(1);
        let was_active = self.state.is_active();
        self.state = TrackState::Lost;
        was_active
    }

    pub(crate) fn mark_removed(&mut self) {
        self.state = TrackState::Removed;
    }

    pub(crate) fn set_transform(&mut self, transform: AffineTransform) {
        self.transform = Some(transform);
    }

    /// Merge a value produced by an attribute stage.
    pub(crate) fn apply(&mut self, value: AttributeValue, frame_index: u64) {
        match value {
            AttributeValue::Landmarks(points) => self.landmarks = Some(points),
            AttributeValue::Pose(pose) => self.pose = Some(pose),
            AttributeValue::Quality(quality) => self.quality = Some(quality),
            AttributeValue::Embedding(embedding) => {
                self.embedding = Some(embedding);
                self.embedding_frame = Some(frame_index);
            }
        }
    }
}
