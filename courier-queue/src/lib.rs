//! Queue access for the dispatcher.
//!
//! [`QueueAdapter`] is the seam the message processor talks to. [`SqsQueue`]
//! talks to Amazon SQS (or a local emulator), [`MemoryQueue`] keeps
//! everything in process for tests and the local harness.

mod error;
mod memory;
mod sqs;

use std::time::Duration;

use async_trait::async_trait;
use courier_common::model::QueueRecord;

pub use error::{QueueError, Result};
pub use memory::{MemoryQueue, Published};
pub use sqs::{SqsOptions, SqsQueue};

/// SQS never returns more than this many messages per receive.
pub const MAX_RECEIVE_BATCH: usize = 10;

/// SQS rejects delays above 15 minutes.
pub const MAX_DELAY_SECONDS: u32 = 900;

#[async_trait]
pub trait QueueAdapter: Send + Sync + std::fmt::Debug {
    /// Receive up to `max_messages` records, waiting at most `wait` for the
    /// first one to arrive.
    ///
    /// # Errors
    /// If the queue cannot be reached
    async fn receive(&self, max_messages: usize, wait: Duration) -> Result<Vec<QueueRecord>>;

    /// Remove a record from the queue. Deleting a handle that is unknown or
    /// already deleted succeeds.
    ///
    /// # Errors
    /// If the queue cannot be reached
    async fn delete(&self, receipt_handle: &str) -> Result<()>;

    /// Publish a new record, invisible for `delay_seconds`. Returns the new
    /// message id.
    ///
    /// # Errors
    /// If the queue cannot be reached or rejects the record
    async fn publish(&self, body: &str, delay_seconds: u32) -> Result<String>;
}

#[async_trait]
impl<T: QueueAdapter + ?Sized> QueueAdapter for std::sync::Arc<T> {
    async fn receive(&self, max_messages: usize, wait: Duration) -> Result<Vec<QueueRecord>> {
        (**self).receive(max_messages, wait).await
    }

    async fn delete(&self, receipt_handle: &str) -> Result<()> {
        (**self).delete(receipt_handle).await
    }

    async fn publish(&self, body: &str, delay_seconds: u32) -> Result<String> {
        (**self).publish(body, delay_seconds).await
    }
}
