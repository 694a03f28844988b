//! One record through the pipeline.

use std::{any::Any, collections::HashSet, panic::AssertUnwindSafe};

use courier_common::model::{Command, QueueRecord, RenderedEmail, Template};
use futures_util::FutureExt;
use parking_lot::Mutex;
use tracing::{Instrument, debug, error, info, info_span, warn};

use super::{MessageProcessor, Outcome, RecordReport, RecordState};
use crate::{
    Cancellation,
    error::DispatchError,
    policy::AckTiming,
    sender::MailError,
};

const MAX_TEMPLATE_ID_LEN: usize = 64;

/// What has happened to a record so far.
///
/// Kept outside the pipeline future so it survives a panic inside it.
#[derive(Debug, Default)]
pub(super) struct Progress {
    path: Vec<RecordState>,
    command: Option<Command>,
    sending: bool,
    deleted: bool,
}

pub(super) type Tracker = Mutex<Progress>;

pub(super) fn enter(tracker: &Tracker, state: RecordState) {
    debug!(state = %state, "Record state");
    tracker.lock().path.push(state);
}

pub(super) fn stage(tracker: &Tracker) -> RecordState {
    tracker
        .lock()
        .path
        .last()
        .copied()
        .unwrap_or(RecordState::Received)
}

impl MessageProcessor {
    /// Run a single record to a terminal outcome.
    ///
    /// Never panics: a panic in any collaborator is caught here and turned
    /// into an outcome.
    pub async fn process_record(&self, record: &QueueRecord, cancel: &Cancellation) -> RecordReport {
        let span = info_span!("record", message_id = %record.message_id);

        async {
            let tracker = Tracker::default();

            let outcome = match AssertUnwindSafe(self.run(record, cancel, &tracker))
                .catch_unwind()
                .await
            {
                Ok(outcome) => outcome,
                Err(payload) => {
                    self.recover(record, cancel, &tracker, panic_message(payload.as_ref()))
                        .await
                }
            };

            let path = std::mem::take(&mut tracker.lock().path);
            log_outcome(&outcome);

            RecordReport {
                message_id: record.message_id.clone(),
                path,
                outcome,
            }
        }
        .instrument(span)
        .await
    }

    async fn run(&self, record: &QueueRecord, cancel: &Cancellation, tracker: &Tracker) -> Outcome {
        enter(tracker, RecordState::Received);
        if cancel.is_cancelled() {
            return self
                .fail(
                    record,
                    cancel,
                    tracker,
                    DispatchError::Cancelled {
                        stage: RecordState::Received,
                    },
                )
                .await;
        }

        let mut command = match Command::from_json(&record.body) {
            Ok(command) => command,
            Err(e) => {
                return self
                    .fail(record, cancel, tracker, DispatchError::Malformed(e))
                    .await;
            }
        };
        enter(tracker, RecordState::Parsed);

        if let Err(e) = validate(&command) {
            return self.fail(record, cancel, tracker, e).await;
        }
        command.template_id = command.template_id.trim().to_string();
        enter(tracker, RecordState::Validated);
        tracker.lock().command = Some(command.clone());

        if self.config.ack_timing == AckTiming::BeforeSend
            && let Err(e) = self.delete(record, cancel, tracker).await
        {
            return Outcome::Unacknowledged { error: e };
        }

        let template = match self.load(&command, cancel).await {
            Ok(template) => template,
            Err(e) => return self.fail(record, cancel, tracker, e).await,
        };
        enter(tracker, RecordState::TemplateLoaded);

        let email = match self.compose(&template, &command) {
            Ok(email) => email,
            Err(e) => return self.fail(record, cancel, tracker, e).await,
        };
        enter(tracker, RecordState::Rendered);

        tracker.lock().sending = true;
        let sent = cancel
            .run(self.sender.send(&email))
            .await
            .unwrap_or_else(|_| Err(MailError::Transport("send cancelled".to_string())));

        match sent {
            Ok(()) => {
                enter(tracker, RecordState::Sent);
                self.acknowledge(record, cancel, tracker).await
            }
            Err(e) if e.is_transient() => self.retry(record, cancel, tracker, &command, e).await,
            Err(e) => {
                self.fail(record, cancel, tracker, DispatchError::Mail(e))
                    .await
            }
        }
    }

    async fn load(&self, command: &Command, cancel: &Cancellation) -> Result<Template, DispatchError> {
        let template = cancel
            .run(self.store.lookup(&command.template_id))
            .await
            .map_err(|_| DispatchError::Cancelled {
                stage: RecordState::Validated,
            })??
            .ok_or_else(|| DispatchError::TemplateNotFound(command.template_id.clone()))?;

        if let Some(field) = template.missing_field() {
            return Err(DispatchError::InvalidTemplate {
                template_id: template.id,
                reason: format!("{field} is empty"),
            });
        }

        Ok(template)
    }

    fn compose(&self, template: &Template, command: &Command) -> Result<RenderedEmail, DispatchError> {
        if command.parameters.is_empty() && self.renderer.requires_parameters(&template.body) {
            return Err(DispatchError::NoParameters);
        }

        let inline_image = if template.has_attachment {
            let path = self.config.inline_image.clone().ok_or_else(|| {
                MailError::Configuration(format!(
                    "template {} has an attachment but no inline image is configured",
                    template.id
                ))
            })?;
            Some(path)
        } else {
            None
        };

        Ok(RenderedEmail {
            sender: template.sender.clone(),
            recipients: template.recipients.clone(),
            subject: template.subject.clone(),
            body: self.renderer.render(&template.body, &command.parameters),
            inline_image,
        })
    }

    /// Delete the record after a successful send.
    async fn acknowledge(&self, record: &QueueRecord, cancel: &Cancellation, tracker: &Tracker) -> Outcome {
        match self.delete(record, cancel, tracker).await {
            Ok(()) => {
                enter(tracker, RecordState::Acked);
                Outcome::Acked
            }
            Err(e) => Outcome::Unacknowledged { error: e },
        }
    }

    /// Finish the record as FAILED_PERMANENT, deleting it when the failure
    /// is inherent to the record.
    pub(super) async fn fail(
        &self,
        record: &QueueRecord,
        cancel: &Cancellation,
        tracker: &Tracker,
        error: DispatchError,
    ) -> Outcome {
        let stage = stage(tracker);
        enter(tracker, RecordState::FailedPermanent);
        error!(
            stage = %stage,
            category = %error.kind(),
            error = %error,
            "Record failed permanently"
        );

        let acked = if error.acknowledges() {
            match self.delete(record, cancel, tracker).await {
                Ok(()) => true,
                Err(e) => {
                    error!(error = %e, "Failed to delete permanently failed record");
                    false
                }
            }
        } else {
            tracker.lock().deleted
        };

        Outcome::FailedPermanent { error, acked }
    }

    /// Delete the record from the queue, at most once.
    pub(super) async fn delete(
        &self,
        record: &QueueRecord,
        cancel: &Cancellation,
        tracker: &Tracker,
    ) -> Result<(), DispatchError> {
        if tracker.lock().deleted {
            return Ok(());
        }

        let stage = stage(tracker);
        let result = cancel
            .run(self.queue.delete(&record.receipt_handle))
            .await
            .map_err(|_| DispatchError::Cancelled { stage })
            .and_then(|deleted| deleted.map_err(DispatchError::from));

        match result {
            Ok(()) => {
                tracker.lock().deleted = true;
                debug!("Record deleted from queue");
                Ok(())
            }
            Err(e) => {
                error!(
                    stage = %stage,
                    category = %e.kind(),
                    error = %e,
                    "Failed to delete record, it will be redelivered"
                );
                Err(e)
            }
        }
    }

    /// Settle a record whose pipeline panicked.
    async fn recover(
        &self,
        record: &QueueRecord,
        cancel: &Cancellation,
        tracker: &Tracker,
        message: String,
    ) -> Outcome {
        let stage = stage(tracker);
        error!(stage = %stage, panic = %message, "Record pipeline panicked");

        let (command, sending, settled) = {
            let progress = tracker.lock();
            let settled = progress.path.iter().any(|state| {
                matches!(
                    state,
                    RecordState::Sent | RecordState::RetryScheduled | RecordState::FailedPermanent
                )
            });
            (progress.command.clone(), progress.sending, settled)
        };

        if settled {
            return Outcome::Unacknowledged {
                error: DispatchError::Panicked { stage, message },
            };
        }

        match command {
            Some(command) if sending => {
                let error = MailError::Transport(format!("panicked: {message}"));
                AssertUnwindSafe(self.retry(record, cancel, tracker, &command, error))
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|payload| {
                        let message = panic_message(payload.as_ref());
                        error!(panic = %message, "Retry after panic panicked");
                        Outcome::Unacknowledged {
                            error: DispatchError::Panicked {
                                stage: RecordState::RetryScheduled,
                                message,
                            },
                        }
                    })
            }
            _ => {
                let acked = tracker.lock().deleted;
                enter(tracker, RecordState::FailedPermanent);
                Outcome::FailedPermanent {
                    error: DispatchError::Panicked { stage, message },
                    acked,
                }
            }
        }
    }
}

fn validate(command: &Command) -> Result<(), DispatchError> {
    let template_id = command.template_id.trim();
    if template_id.is_empty() {
        return Err(DispatchError::InvalidCommand(
            "id_plantilla is required".to_string(),
        ));
    }
    if template_id.chars().count() > MAX_TEMPLATE_ID_LEN {
        return Err(DispatchError::InvalidCommand(format!(
            "id_plantilla is longer than {MAX_TEMPLATE_ID_LEN} characters"
        )));
    }

    let mut names = HashSet::with_capacity(command.parameters.len());
    for parameter in &command.parameters {
        if parameter.name.is_empty() {
            return Err(DispatchError::InvalidCommand(
                "parameter with an empty nombre".to_string(),
            ));
        }
        if !names.insert(parameter.name.as_str()) {
            return Err(DispatchError::InvalidCommand(format!(
                "duplicate parameter '{}'",
                parameter.name
            )));
        }
    }

    Ok(())
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(ToString::to_string)
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

fn log_outcome(outcome: &Outcome) {
    match outcome {
        Outcome::Acked => info!("Email sent and record acknowledged"),
        Outcome::Released { retry_count } => {
            info!(retry_count, "Send failed, record re-enqueued");
        }
        Outcome::FailedPermanent { acked, .. } => {
            warn!(acked, "Record dropped");
        }
        Outcome::Unacknowledged { error } => {
            warn!(
                category = %error.kind(),
                error = %error,
                "Record left on the queue for redelivery"
            );
        }
        Outcome::Skipped => {}
    }
}
