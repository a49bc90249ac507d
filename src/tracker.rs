mod matching;
mod rect;
mod track;
mod track_manager;
mod track_state;

pub use matching::{
    AssignmentResult, Detection, Keypoints, association_scores, greedy_assignment,
    optimal_assignment,
};
pub use rect::{Rect, iou_batch};
pub use track::{Track, TrackId};
pub use track_manager::{AssociationReport, AssociationStrategy, TrackManager, TrackerConfig};
pub use track_state::TrackState;
