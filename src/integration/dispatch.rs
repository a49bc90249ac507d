//! Which attribute stages run for a track on a given frame.

use crate::config::AttributeConfig;
use crate::stage::StageKind;
use crate::tracker::Track;

/// Attribute dispatch rules.
///
/// Landmark, pose and quality run on every frame for every active track.
/// Recognition is gated on quality and throttled by the refresh interval.
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchPolicy {
    pub embedding_refresh_interval: u64,
    pub quality_min_for_recognition: f32,
}

impl Default for DispatchPolicy {
    fn default() -> Self {
        Self::from_config(&AttributeConfig::default())
    }
}

impl DispatchPolicy {
    pub fn from_config(config: &AttributeConfig) -> Self {
        Self {
            embedding_refresh_interval: config.embedding_refresh_interval,
            quality_min_for_recognition: config.quality_min_for_recognition,
        }
    }

    /// Whether a stage of `kind` runs unconditionally.
    pub fn runs_every_frame(&self, kind: StageKind) -> bool {
        matches!(kind, StageKind::Landmark | StageKind::Pose | StageKind::Quality)
    }

    /// Whether recognition should run for `track` on `frame_index`.
    ///
    /// `fresh_quality` is this frame's quality result, if the quality stage
    /// produced one; otherwise the stored value is used. With no quality stage
    /// configured the gate is open.
    pub fn wants_recognition(
        &self,
        track: &Track,
        frame_index: u64,
        fresh_quality: Option<f32>,
        has_quality_stage: bool,
    ) -> bool {
        if has_quality_stage {
            match fresh_quality.or(track.quality()) {
                Some(quality) if quality >= self.quality_min_for_recognition => {}
                _ => return false,
            }
        }
        match (track.embedding(), track.embedding_frame()) {
            (Some(_), Some(computed_at)) => {
                frame_index.saturating_sub(computed_at) >= self.embedding_refresh_interval
            }
            _ => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stage::{AttributeValue, Embedding};
    use crate::tracker::{Detection, TrackId};

    fn track() -> Track {
        Track::new(TrackId::new(1), &Detection::new(10.0, 10.0, 50.0, 50.0, 0.9), 0, 1)
    }

    #[test]
    fn test_quality_gate() {
        let policy = DispatchPolicy::default();
        let mut t = track();
        // No quality known yet.
        assert!(!policy.wants_recognition(&t, 0, None, true));
        assert!(!policy.wants_recognition(&t, 0, Some(0.2), true));
        assert!(policy.wants_recognition(&t, 0, Some(0.5), true));

        // Falls back to the stored value when this frame's quality failed.
        t.apply(AttributeValue::Quality(0.9), 0);
        assert!(policy.wants_recognition(&t, 1, None, true));
        // A fresh low score wins over the stored one.
        assert!(!policy.wants_recognition(&t, 1, Some(0.1), true));
    }

    #[test]
    fn test_gate_open_without_quality_stage() {
        let policy = DispatchPolicy::default();
        assert!(policy.wants_recognition(&track(), 0, None, false));
    }

    #[test]
    fn test_refresh_interval() {
        let policy = DispatchPolicy {
            embedding_refresh_interval: 30,
            quality_min_for_recognition: 0.5,
        };
        let mut t = track();
        t.apply(AttributeValue::Embedding(Embedding::new(vec![1.0, 0.0])), 10);
        assert!(!policy.wants_recognition(&t, 11, Some(0.9), true));
        assert!(!policy.wants_recognition(&t, 39, Some(0.9), true));
        assert!(policy.wants_recognition(&t, 40, Some(0.9), true));
    }

    #[test]
    fn test_every_frame_stages() {
        let policy = DispatchPolicy::default();
        assert!(policy.runs_every_frame(StageKind::Pose));
        assert!(!policy.runs_every_frame(StageKind::Recognition));
        assert!(!policy.runs_every_frame(StageKind::Detector));
    }
}
