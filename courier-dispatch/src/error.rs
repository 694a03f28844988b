//! Error types for record processing.
//!
//! Every failure carries an [`ErrorKind`] category, which is what gets
//! logged and what decides whether a failed record is acknowledged.

use std::fmt;

use courier_queue::QueueError;
use courier_store::StoreError;
use thiserror::Error;

use crate::{processor::RecordState, sender::MailError};

/// Category tag attached to every logged failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Configuration,
    Validation,
    NotFound,
    Infrastructure,
    Transport,
    ResourceMissing,
}

impl ErrorKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Configuration => "configuration",
            Self::Validation => "validation",
            Self::NotFound => "not_found",
            Self::Infrastructure => "infrastructure",
            Self::Transport => "transport",
            Self::ResourceMissing => "resource_missing",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum DispatchError {
    /// The record body is not a JSON command
    #[error("Malformed record body: {0}")]
    Malformed(#[source] serde_json::Error),

    #[error("Invalid command: {0}")]
    InvalidCommand(String),

    #[error("Template {template_id} is not usable: {reason}")]
    InvalidTemplate { template_id: String, reason: String },

    #[error("no parameters")]
    NoParameters,

    #[error("Template {0} not found")]
    TemplateNotFound(String),

    #[error("Template lookup failed: {0}")]
    Store(#[from] StoreError),

    #[error("{0}")]
    Mail(#[from] MailError),

    #[error("max retries exhausted ({retry_count}/{max_retries}): {source}")]
    RetriesExhausted {
        retry_count: u32,
        max_retries: u32,
        #[source]
        source: MailError,
    },

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error("Cancelled in {stage}")]
    Cancelled { stage: RecordState },

    #[error("Panicked in {stage}: {message}")]
    Panicked { stage: RecordState, message: String },
}

impl DispatchError {
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Malformed(_)
            | Self::InvalidCommand(_)
            | Self::InvalidTemplate { .. }
            | Self::NoParameters => ErrorKind::Validation,
            Self::TemplateNotFound(_) => ErrorKind::NotFound,
            Self::Store(error) => {
                if error.is_configuration() {
                    ErrorKind::Configuration
                } else {
                    ErrorKind::Infrastructure
                }
            }
            Self::Mail(error) => error.kind(),
            Self::RetriesExhausted { .. } => ErrorKind::Transport,
            Self::Queue(_) | Self::Cancelled { .. } | Self::Panicked { .. } => {
                ErrorKind::Infrastructure
            }
        }
    }

    /// Whether a record that failed permanently with this error is deleted.
    ///
    /// Failures inherent to the record are acknowledged so it is not
    /// redelivered. Failures of the environment are left on the queue.
    pub const fn acknowledges(&self) -> bool {
        matches!(self, Self::RetriesExhausted { .. })
            || matches!(
                self.kind(),
                ErrorKind::Validation | ErrorKind::NotFound | ErrorKind::ResourceMissing
            )
    }
}
