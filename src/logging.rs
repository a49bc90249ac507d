//! Injected diagnostics sink.
//!
//! The pipeline never logs through a process-wide singleton. It holds an
//! `Arc<dyn Logger>` handed over at construction, so each pipeline (and each
//! test) decides where its diagnostics go.

use std::fmt;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::InferenceError;
use crate::stage::StageKind;
use crate::tracker::TrackId;

/// Severity of a log record, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

/// Structured diagnostic emitted by the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    TrackCreated {
        track_id: TrackId,
        frame_index: u64,
    },
    TrackConfirmed {
        track_id: TrackId,
        frame_index: u64,
    },
    TrackLost {
        track_id: TrackId,
        frame_index: u64,
    },
    TrackRemoved {
        track_id: TrackId,
        frame_index: u64,
    },
    StageFailed {
        track_id: TrackId,
        stage: StageKind,
        frame_index: u64,
        error: InferenceError,
    },
    DetectorFailed {
        frame_index: u64,
        message: String,
    },
    DeadlineExceeded {
        frame_index: u64,
        skipped_tracks: usize,
    },
    FrameOutOfOrder {
        frame_index: u64,
        previous: u64,
    },
}

impl PipelineEvent {
    /// Level the event is reported at.
    pub fn level(&self) -> LogLevel {
        match self {
            Self::TrackCreated { .. } | Self::TrackLost { .. } => LogLevel::Debug,
            Self::TrackConfirmed { .. } | Self::TrackRemoved { .. } => LogLevel::Info,
            Self::StageFailed { .. }
            | Self::DeadlineExceeded { .. }
            | Self::FrameOutOfOrder { .. } => LogLevel::Warn,
            Self::DetectorFailed { .. } => LogLevel::Error,
        }
    }
}

impl fmt::Display for PipelineEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TrackCreated {
                track_id,
                frame_index,
            } => write!(f, "frame {frame_index}: track {track_id} created"),
            Self::TrackConfirmed {
                track_id,
                frame_index,
            } => write!(f, "frame {frame_index}: track {track_id} confirmed"),
            Self::TrackLost {
                track_id,
                frame_index,
            } => write!(f, "frame {frame_index}: track {track_id} lost"),
            Self::TrackRemoved {
                track_id,
                frame_index,
            } => write!(f, "frame {frame_index}: track {track_id} removed"),
            Self::StageFailed {
                track_id,
                stage,
                frame_index,
                error,
            } => write!(
                f,
                "frame {frame_index}: {stage} stage failed for track {track_id}: {error}"
            ),
            Self::DetectorFailed {
                frame_index,
                message,
            } => write!(f, "frame {frame_index}: detector failed: {message}"),
            Self::DeadlineExceeded {
                frame_index,
                skipped_tracks,
            } => write!(
                f,
                "frame {frame_index}: deadline exceeded, attribute work skipped for {skipped_tracks} track(s)"
            ),
            Self::FrameOutOfOrder {
                frame_index,
                previous,
            } => write!(
                f,
                "frame {frame_index} arrived after frame {previous}, indices must increase"
            ),
        }
    }
}

/// Logging capability injected into the pipeline.
pub trait Logger: Send + Sync {
    fn debug(&self, message: &str);
    fn info(&self, message: &str);
    fn warn(&self, message: &str);
    fn error(&self, message: &str);

    /// Emit a message at `level`.
    fn log(&self, level: LogLevel, message: &str) {
        match level {
            LogLevel::Debug => self.debug(message),
            LogLevel::Info => self.info(message),
            LogLevel::Warn => self.warn(message),
            LogLevel::Error => self.error(message),
        }
    }

    /// Emit a structured pipeline event.
    ///
    /// The default renders the event and routes it by [`PipelineEvent::level`].
    fn event(&self, event: &PipelineEvent) {
        self.log(event.level(), &event.to_string());
    }
}

/// Forwards records to the `tracing` ecosystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn debug(&self, message: &str) {
        tracing::debug!("{message}");
    }

    fn info(&self, message: &str) {
        tracing::info!("{message}");
    }

    fn warn(&self, message: &str) {
        tracing::warn!("{message}");
    }

    fn error(&self, message: &str) {
        tracing::error!("{message}");
    }

    fn event(&self, event: &PipelineEvent) {
        match event {
            PipelineEvent::TrackCreated {
                track_id,
                frame_index,
            } => tracing::debug!(%track_id, frame_index, "track created"),
            PipelineEvent::TrackConfirmed {
                track_id,
                frame_index,
            } => tracing::info!(%track_id, frame_index, "track confirmed"),
            PipelineEvent::TrackLost {
                track_id,
                frame_index,
            } => tracing::debug!(%track_id, frame_index, "track lost"),
            PipelineEvent::TrackRemoved {
                track_id,
                frame_index,
            } => tracing::info!(%track_id, frame_index, "track removed"),
            PipelineEvent::StageFailed {
                track_id,
                stage,
                frame_index,
                error,
            } => tracing::warn!(%track_id, %stage, frame_index, %error, "stage failed"),
            PipelineEvent::DetectorFailed {
                frame_index,
                message,
            } => tracing::error!(frame_index, %message, "detector failed"),
            PipelineEvent::DeadlineExceeded {
                frame_index,
                skipped_tracks,
            } => tracing::warn!(frame_index, skipped_tracks, "frame deadline exceeded"),
            PipelineEvent::FrameOutOfOrder {
                frame_index,
                previous,
            } => tracing::warn!(frame_index, previous, "frame index did not increase"),
        }
    }
}

/// Drops every record below a minimum level.
pub struct LevelFilter<L> {
    inner: L,
    min: Option<LogLevel>,
}

impl<L: Logger> LevelFilter<L> {
    /// Pass records at `min` and above through to `inner`.
    pub fn new(inner: L, min: LogLevel) -> Self {
        Self {
            inner,
            min: Some(min),
        }
    }

    /// Silence `inner` entirely.
    pub fn off(inner: L) -> Self {
        Self { inner, min: None }
    }

    pub fn set_level(&mut self, min: Option<LogLevel>) {
        self.min = min;
    }

    fn enabled(&self, level: LogLevel) -> bool {
        self.min.is_some_and(|min| level >= min)
    }
}

impl<L: Logger> Logger for LevelFilter<L> {
    fn debug(&self, message: &str) {
        self.log(LogLevel::Debug, message);
    }

    fn info(&self, message: &str) {
        self.log(LogLevel::Info, message);
    }

    fn warn(&self, message: &str) {
        self.log(LogLevel::Warn, message);
    }

    fn error(&self, message: &str) {
        self.log(LogLevel::Error, message);
    }

    fn log(&self, level: LogLevel, message: &str) {
        if self.enabled(level) {
            self.inner.log(level, message);
        }
    }

    fn event(&self, event: &PipelineEvent) {
        if self.enabled(event.level()) {
            self.inner.event(event);
        }
    }
}

/// Discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullLogger;

impl Logger for NullLogger {
    fn debug(&self, _message: &str) {}
    fn info(&self, _message: &str) {}
    fn warn(&self, _message: &str) {}
    fn error(&self, _message: &str) {}
}

/// Keeps records in memory; mostly useful for asserting on diagnostics.
#[derive(Debug, Default)]
pub struct RecordingLogger {
    records: Mutex<Vec<(LogLevel, String)>>,
    events: Mutex<Vec<PipelineEvent>>,
}

impl RecordingLogger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rendered records in emission order.
    pub fn records(&self) -> Vec<(LogLevel, String)> {
        self.records.lock().clone()
    }

    /// Structured events in emission order.
    pub fn events(&self) -> Vec<PipelineEvent> {
        self.events.lock().clone()
    }

    pub fn clear(&self) {
        self.records.lock().clear();
        self.events.lock().clear();
    }
}

impl Logger for RecordingLogger {
    fn debug(&self, message: &str) {
        self.log(LogLevel::Debug, message);
    }

    fn info(&self, message: &str) {
        self.log(LogLevel::Info, message);
    }

    fn warn(&self, message: &str) {
        self.log(LogLevel::Warn, message);
    }

    fn error(&self, message: &str) {
        self.log(LogLevel::Error, message);
    }

    fn log(&self, level: LogLevel, message: &str) {
        self.records.lock().push((level, message.to_owned()));
    }

    fn event(&self, event: &PipelineEvent) {
        self.events.lock().push(event.clone());
        self.log(event.level(), &event.to_string());
    }
}
