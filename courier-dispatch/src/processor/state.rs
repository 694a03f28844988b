use std::fmt;

use serde::Serialize;

use crate::error::DispatchError;

/// Where a record is in the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecordState {
    Received,
    Parsed,
    Validated,
    TemplateLoaded,
    Rendered,
    Sent,
    Acked,
    RetryScheduled,
    Released,
    FailedPermanent,
}

impl RecordState {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Received => "RECEIVED",
            Self::Parsed => "PARSED",
            Self::Validated => "VALIDATED",
            Self::TemplateLoaded => "TEMPLATE_LOADED",
            Self::Rendered => "RENDERED",
            Self::Sent => "SENT",
            Self::Acked => "ACKED",
            Self::RetryScheduled => "RETRY_SCHEDULED",
            Self::Released => "RELEASED",
            Self::FailedPermanent => "FAILED_PERMANENT",
        }
    }

    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Acked | Self::Released | Self::FailedPermanent)
    }
}

impl fmt::Display for RecordState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a record left the pipeline.
#[derive(Debug)]
pub enum Outcome {
    /// Sent and deleted
    Acked,
    /// Re-enqueued with `retry_count` and the current record deleted
    Released { retry_count: u32 },
    /// Given up on. `acked` is whether the record was deleted.
    FailedPermanent { error: DispatchError, acked: bool },
    /// The record's fate was decided but the queue could not be updated.
    /// It is left for the visibility timeout to redeliver.
    Unacknowledged { error: DispatchError },
    /// Not processed because the batch stopped first
    Skipped,
}

impl Outcome {
    /// `true` for the two states a batch is happy with.
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Acked | Self::Released { .. })
    }

    pub const fn error(&self) -> Option<&DispatchError> {
        match self {
            Self::FailedPermanent { error, .. } | Self::Unacknowledged { error } => Some(error),
            Self::Acked | Self::Released { .. } | Self::Skipped => None,
        }
    }
}

/// The result of processing one record.
#[derive(Debug)]
pub struct RecordReport {
    pub message_id: String,
    /// Every state entered, in order
    pub path: Vec<RecordState>,
    pub outcome: Outcome,
}

impl RecordReport {
    pub(crate) fn skipped(message_id: impl Into<String>) -> Self {
        Self {
            message_id: message_id.into(),
            path: Vec::new(),
            outcome: Outcome::Skipped,
        }
    }

    /// The last state entered
    pub fn state(&self) -> Option<RecordState> {
        self.path.last().copied()
    }
}
