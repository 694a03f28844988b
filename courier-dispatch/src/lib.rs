//! The message processing pipeline.
//!
//! A [`MessageProcessor`] takes a batch of queue records, turns each into a
//! rendered email and either acknowledges it, re-enqueues it with an
//! incremented retry counter, or gives up on it.

pub mod cancel;
pub mod error;
pub mod policy;
pub mod processor;
pub mod render;
pub mod sender;

pub use cancel::{Cancellation, CancellationSource, Cancelled};
pub use error::{DispatchError, ErrorKind};
pub use policy::{AckTiming, BatchMode, RetryBackoff, RetryPolicy};
pub use processor::{
    BatchAborted, BatchReport, MessageProcessor, Outcome, ProcessorConfig, RecordReport,
    RecordState,
};
pub use render::{PlaceholderRenderer, PlaceholderSyntax, Renderer};
pub use sender::{MailError, MailSender};
