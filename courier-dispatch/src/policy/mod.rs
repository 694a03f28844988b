//! Tunable behaviour of the processor.
//!
//! - [`RetryPolicy`]: how many times a failed send is re-enqueued and with what delay
//! - [`BatchMode`]: whether one failing record stops the batch
//! - [`AckTiming`]: when a record is deleted from the queue

pub mod batch;
pub mod retry;

pub use batch::{AckTiming, BatchMode};
pub use retry::{RetryBackoff, RetryPolicy};
