//! The local harness: one batch read from an SQS event file.

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use courier_common::model::QueueRecord;
use courier_dispatch::{BatchAborted, BatchReport, Cancellation, MessageProcessor};
use serde::Deserialize;
use thiserror::Error;
use tokio::time::Instant;

#[derive(Debug, Error)]
pub enum EventError {
    #[error("Failed to read event file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Event is not an SQS event: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// The subset of an SQS event the dispatcher needs.
#[derive(Debug, Deserialize)]
struct SqsEvent {
    #[serde(rename = "Records")]
    records: Vec<QueueRecord>,
}

/// Parse `{"Records": [{"messageId", "receiptHandle", "body"}, ...]}`.
///
/// # Errors
/// If the JSON does not have that shape
pub fn parse_event(json: &str) -> Result<Vec<QueueRecord>, EventError> {
    Ok(serde_json::from_str::<SqsEvent>(json)?.records)
}

/// # Errors
/// If the file cannot be read or parsed
pub async fn read_event(path: &Path) -> Result<Vec<QueueRecord>, EventError> {
    let json = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| EventError::Io {
            path: path.to_path_buf(),
            source,
        })?;

    parse_event(&json)
}

/// Process one event's records as a single batch under `deadline`.
///
/// # Errors
/// [`BatchAborted`] when the processor runs fail-fast and a record fails
pub async fn dispatch(
    processor: &MessageProcessor,
    records: &[QueueRecord],
    deadline: Duration,
) -> Result<BatchReport, BatchAborted> {
    let cancel = Cancellation::never().with_deadline(Instant::now() + deadline);
    processor.process_batch(records, &cancel).await
}
