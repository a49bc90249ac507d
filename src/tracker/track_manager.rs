//! Track lifecycle and per-frame association.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::logging::{Logger, PipelineEvent, TracingLogger};
use crate::stage::{AffineTransform, AttributeValue};
use crate::tracker::matching::{self, AssignmentResult, Detection};
use crate::tracker::track::{Track, TrackId};
use crate::tracker::track_state::TrackState;

/// How the score matrix is turned into track/detection pairs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssociationStrategy {
    /// Highest score first; bounded cost, may be suboptimal under dense overlap
    #[default]
    Greedy,
    /// Jonker-Volgenant linear assignment
    Optimal,
}

/// Configuration for the [`TrackManager`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Consecutive hits (creation included) before a track is confirmed
    pub confirm_threshold: u32,
    /// Misses tolerated while lost; one more removes the track
    pub max_missed_frames: u32,
    /// Minimum association score for a track/detection pair to match
    pub association_min_score: f32,
    /// Weight of embedding similarity when both sides carry an embedding
    pub embedding_weight: f32,
    pub strategy: AssociationStrategy,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            confirm_threshold: 3,
            max_missed_frames: 10,
            association_min_score: 0.3,
            embedding_weight: 0.3,
            strategy: AssociationStrategy::Greedy,
        }
    }
}

/// Outcome of associating one frame's detections.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AssociationReport {
    pub frame_index: u64,
    /// Number of detections offered this frame
    pub detections: usize,
    /// Existing tracks matched, with the index of their detection
    pub matched: Vec<(TrackId, usize)>,
    /// Tracks spawned this frame, with the index of their detection
    pub created: Vec<(TrackId, usize)>,
    /// Tracks confirmed for the first time this frame
    pub confirmed: Vec<TrackId>,
    /// Tracks that missed this frame and are still kept
    pub missed: Vec<TrackId>,
    /// Tracks destroyed this frame
    pub removed: Vec<TrackId>,
}

impl AssociationReport {
    /// No detections were offered; every live track simply missed.
    pub fn is_noop(&self) -> bool {
        self.detections == 0
    }
}

/// Owns every live track, keyed by identity.
pub struct TrackManager {
    tracks: BTreeMap<TrackId, Track>,
    next_id: u64,
    config: TrackerConfig,
    logger: Arc<dyn Logger>,
}

impl TrackManager {
    pub fn new(config: TrackerConfig) -> Self {
        Self::with_logger(config, Arc::new(TracingLogger))
    }

    pub fn with_logger(config: TrackerConfig, logger: Arc<dyn Logger>) -> Self {
        Self {
            tracks: BTreeMap::new(),
            next_id: 1,
            config,
            logger,
        }
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// Live tracks in identity order.
    pub fn tracks(&self) -> impl Iterator<Item = &Track> {
        self.tracks.values()
    }

    pub fn get(&self, id: TrackId) -> Option<&Track> {
        self.tracks.get(&id)
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    /// Drop all tracks. Identities keep increasing afterwards.
    pub fn clear(&mut self) {
        self.tracks.clear();
    }

    /// Associate one frame's detections with the live tracks and advance
    /// every track's lifecycle.
    pub fn associate(&mut self, frame_index: u64, detections: &[Detection]) -> AssociationReport {
        let ids: Vec<TrackId> = self.tracks.keys().copied().collect();

        let AssignmentResult {
            matches,
            unmatched_tracks,
            unmatched_detections,
        } = {
            let live: Vec<&Track> = self.tracks.values().collect();
            let scores =
                matching::association_scores(&live, detections, self.config.embedding_weight);
            match self.config.strategy {
                AssociationStrategy::Greedy => {
                    matching::greedy_assignment(&scores, self.config.association_min_score)
                }
                AssociationStrategy::Optimal => {
                    matching::optimal_assignment(&scores, self.config.association_min_score)
                }
            }
        };

        let mut report = AssociationReport {
            frame_index,
            detections: detections.len(),
            ..Default::default()
        };

        for (itrack, idet) in matches {
            let id = ids[itrack];
            let Some(track) = self.tracks.get_mut(&id) else {
                continue;
            };
            if track.mark_hit(&detections[idet], frame_index, self.config.confirm_threshold) {
                report.confirmed.push(id);
                self.logger.event(&PipelineEvent::TrackConfirmed {
                    track_id: id,
                    frame_index,
                });
            }
            report.matched.push((id, idet));
        }

        for itrack in unmatched_tracks {
            self.miss(ids[itrack], frame_index, &mut report);
        }

        for idet in unmatched_detections {
            let id = self.spawn(&detections[idet], frame_index);
            if self.get(id).is_some_and(|t| t.state() == TrackState::Confirmed) {
                report.confirmed.push(id);
            }
            report.created.push((id, idet));
        }

        report
    }

    /// Treat every live track as unmatched, e.g. when the detector could not run.
    pub fn miss_all(&mut self, frame_index: u64) -> AssociationReport {
        let mut report = AssociationReport {
            frame_index,
            ..Default::default()
        };
        let ids: Vec<TrackId> = self.tracks.keys().copied().collect();
        for id in ids {
            self.miss(id, frame_index, &mut report);
        }
        report
    }

    /// Tracks eligible for attribute work this frame.
    pub fn active_ids(&self) -> Vec<TrackId> {
        self.tracks
            .values()
            .filter(|t| t.state().is_active())
            .map(Track::id)
            .collect()
    }

    /// Merge results of attribute stages into a track. Unknown ids are ignored.
    pub(crate) fn apply_attributes(
        &mut self,
        id: TrackId,
        frame_index: u64,
        transform: Option<AffineTransform>,
        values: Vec<AttributeValue>,
    ) {
        let Some(track) = self.tracks.get_mut(&id) else {
            return;
        };
        if let Some(transform) = transform {
            track.set_transform(transform);
        }
        for value in values {
            track.apply(value, frame_index);
        }
    }

    fn spawn(&mut self, detection: &Detection, frame_index: u64) -> TrackId {
        let id = TrackId::new(self.next_id);
        self.next_id += 1;
        let track = Track::new(id, detection, frame_index, self.config.confirm_threshold);
        self.logger.event(&PipelineEvent::TrackCreated {
            track_id: id,
            frame_index,
        });
        if track.state() == TrackState::Confirmed {
            self.logger.event(&PipelineEvent::TrackConfirmed {
                track_id: id,
                frame_index,
            });
        }
        self.tracks.insert(id, track);
        id
    }

    fn miss(&mut self, id: TrackId, frame_index: u64, report: &mut AssociationReport) {
        let Some(track) = self.tracks.get_mut(&id) else {
            return;
        };
        if track.mark_missed() {
            self.logger.event(&PipelineEvent::TrackLost {
                track_id: id,
                frame_index,
            });
        }
        if track.misses() > self.config.max_missed_frames {
            track.mark_removed();
            self.tracks.remove(&id);
            report.removed.push(id);
            self.logger.event(&PipelineEvent::TrackRemoved {
                track_id: id,
                frame_index,
            });
        } else {
            report.missed.push(id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::RecordingLogger;
    use crate::stage::Embedding;

    fn config() -> TrackerConfig {
        TrackerConfig {
            confirm_threshold: 3,
            max_missed_frames: 2,
            ..Default::default()
        }
    }

    fn face(x: f32) -> Detection {
        Detection::new(x, 10.0, x + 50.0, 60.0, 0.9)
    }

    #[test]
    fn test_unmatched_detection_spawns_tentative_track() {
        let mut manager = TrackManager::new(config());
        let report = manager.associate(1, &[face(10.0)]);
        assert_eq!(report.created, vec![(TrackId::new(1), 0)]);
        assert_eq!(manager.get(TrackId::new(1)).unwrap().state(), TrackState::Tentative);
    }

    #[test]
    fn test_empty_frame_is_noop() {
        let mut manager = TrackManager::new(config());
        let report = manager.associate(1, &[]);
        assert!(report.is_noop());
        assert!(report.created.is_empty());
        assert!(manager.is_empty());
    }

    #[test]
    fn test_removal_after_miss_budget() {
        let logger = Arc::new(RecordingLogger::new());
        let mut manager = TrackManager::with_logger(config(), logger.clone());
        manager.associate(1, &[face(10.0)]);

        // max_missed_frames = 2: misses 1 and 2 keep the track, the third removes it.
        assert_eq!(manager.associate(2, &[]).missed, vec![TrackId::new(1)]);
        assert_eq!(manager.associate(3, &[]).missed, vec![TrackId::new(1)]);
        let report = manager.associate(4, &[]);
        assert_eq!(report.removed, vec![TrackId::new(1)]);
        assert!(manager.is_empty());

        // A face in the same place afterwards gets a fresh identity.
        let report = manager.associate(5, &[face(10.0)]);
        assert_eq!(report.created, vec![(TrackId::new(2), 0)]);

        assert!(logger.events().contains(&PipelineEvent::TrackRemoved {
            track_id: TrackId::new(1),
            frame_index: 4,
        }));
    }

    #[test]
    fn test_two_faces_keep_their_identities() {
        let mut manager = TrackManager::new(config());
        manager.associate(1, &[face(10.0), face(200.0)]);
        let report = manager.associate(2, &[face(203.0), face(12.0)]);
        assert_eq!(
            report.matched,
            vec![(TrackId::new(1), 1), (TrackId::new(2), 0)]
        );
        assert!(report.created.is_empty());
    }

    #[test]
    fn test_miss_all_marks_tracks_lost() {
        let mut manager = TrackManager::new(config());
        manager.associate(1, &[face(10.0)]);
        let report = manager.miss_all(2);
        assert_eq!(report.missed, vec![TrackId::new(1)]);
        assert_eq!(manager.get(TrackId::new(1)).unwrap().state(), TrackState::Lost);
        assert!(manager.active_ids().is_empty());
    }

    #[test]
    fn test_embedding_similarity_breaks_overlap_ambiguity() {
        let config = TrackerConfig {
            confirm_threshold: 1,
            embedding_weight: 0.8,
            ..config()
        };
        let mut manager = TrackManager::new(config);
        let a = Embedding::new(vec![1.0, 0.0]);
        let b = Embedding::new(vec![0.0, 1.0]);
        manager.associate(
            1,
            &[
                face(10.0).with_embedding(a.clone()),
                face(400.0).with_embedding(b.clone()),
            ],
        );

        // Both faces jumped away from their boxes; appearance decides.
        let report = manager.associate(
            2,
            &[
                face(205.0).with_embedding(b),
                face(195.0).with_embedding(a),
            ],
        );
        let mut matched = report.matched.clone();
        matched.sort();
        assert_eq!(matched, vec![(TrackId::new(1), 1), (TrackId::new(2), 0)]);
    }

    #[test]
    fn test_optimal_strategy_associates() {
        let config = TrackerConfig {
            strategy: AssociationStrategy::Optimal,
            ..config()
        };
        let mut manager = TrackManager::new(config);
        manager.associate(1, &[face(10.0)]);
        let report = manager.associate(2, &[face(14.0)]);
        assert_eq!(report.matched, vec![(TrackId::new(1), 0)]);
    }
}
