use serde::{Deserialize, Serialize};

/// Lifecycle of a face track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackState {
    /// Newly created, not yet seen for enough consecutive frames
    #[default]
    Tentative,
    /// Seen for at least `confirm_threshold` consecutive frames
    Confirmed,
    /// Missed in the most recent frame(s)
    Lost,
    /// Exceeded the miss budget; terminal
    Removed,
}

impl TrackState {
    /// Whether the track was matched in its latest frame.
    pub fn is_active(self) -> bool {
        matches!(self, Self::Tentative | Self::Confirmed)
    }
}
