//! The per-record pipeline and the batch driver around it.

mod batch;
mod record;
mod retry;
mod state;

use std::{fmt, path::PathBuf, sync::Arc};

use courier_queue::QueueAdapter;
use courier_store::TemplateStore;

pub use batch::{BatchAborted, BatchReport};
pub use state::{Outcome, RecordReport, RecordState};

use crate::{
    policy::{AckTiming, BatchMode, RetryPolicy},
    render::Renderer,
    sender::MailSender,
};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessorConfig {
    pub batch_mode: BatchMode,
    pub ack_timing: AckTiming,
    pub retry: RetryPolicy,
    /// Image attached to templates that ask for one
    pub inline_image: Option<PathBuf>,
}

/// Turns queue records into sent emails.
///
/// Collaborators are injected as trait objects so the same processor runs
/// against SQS, Postgres and SMTP in production and in-memory fakes in tests.
pub struct MessageProcessor {
    store: Arc<dyn TemplateStore>,
    sender: Arc<dyn MailSender>,
    queue: Arc<dyn QueueAdapter>,
    renderer: Arc<dyn Renderer>,
    config: ProcessorConfig,
}

impl fmt::Debug for MessageProcessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageProcessor")
            .field("store", &self.store)
            .field("sender", &self.sender)
            .field("renderer", &self.renderer)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl MessageProcessor {
    pub fn new(
        store: Arc<dyn TemplateStore>,
        sender: Arc<dyn MailSender>,
        queue: Arc<dyn QueueAdapter>,
        renderer: Arc<dyn Renderer>,
        config: ProcessorConfig,
    ) -> Self {
        Self {
            store,
            sender,
            queue,
            renderer,
            config,
        }
    }

    pub const fn config(&self) -> &ProcessorConfig {
        &self.config
    }
}
