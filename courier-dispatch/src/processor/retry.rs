//! Re-enqueueing a record after a failed send.

use courier_common::model::{Command, QueueRecord};
use tracing::{info, warn};

use super::{
    MessageProcessor, Outcome, RecordState,
    record::{Tracker, enter},
};
use crate::{Cancellation, error::DispatchError, sender::MailError};

impl MessageProcessor {
    /// Publish `command` again with its retry counter incremented, then
    /// delete the current record. The delete only happens once the queue
    /// has accepted the new record.
    pub(super) async fn retry(
        &self,
        record: &QueueRecord,
        cancel: &Cancellation,
        tracker: &Tracker,
        command: &Command,
        error: MailError,
    ) -> Outcome {
        enter(tracker, RecordState::RetryScheduled);
        let policy = &self.config.retry;

        if !policy.should_retry(command.retry_count) {
            warn!(
                retry_count = command.retry_count,
                max_retries = policy.max_retries,
                "max retries exhausted"
            );
            return self
                .fail(
                    record,
                    cancel,
                    tracker,
                    DispatchError::RetriesExhausted {
                        retry_count: command.retry_count,
                        max_retries: policy.max_retries,
                        source: error,
                    },
                )
                .await;
        }

        warn!(
            category = %error.kind(),
            error = %error,
            retry_count = command.retry_count,
            "Send failed, scheduling retry"
        );

        let next = command.next_attempt();
        let delay_seconds = policy.delay_for(command.retry_count);
        let body = match next.to_json() {
            Ok(body) => body,
            Err(e) => {
                return Outcome::Unacknowledged {
                    error: DispatchError::InvalidCommand(e.to_string()),
                };
            }
        };

        let published = cancel
            .run(self.queue.publish(&body, delay_seconds))
            .await
            .map_err(|_| DispatchError::Cancelled {
                stage: RecordState::RetryScheduled,
            })
            .and_then(|published| published.map_err(DispatchError::from));

        let message_id = match published {
            Ok(message_id) => message_id,
            Err(e) => {
                warn!(
                    category = %e.kind(),
                    error = %e,
                    "Failed to re-enqueue record, leaving it for redelivery"
                );
                return Outcome::Unacknowledged { error: e };
            }
        };

        info!(
            published_message_id = %message_id,
            retry_count = next.retry_count,
            delay_seconds,
            "Record re-enqueued"
        );

        match self.delete(record, cancel, tracker).await {
            Ok(()) => {
                enter(tracker, RecordState::Released);
                Outcome::Released {
                    retry_count: next.retry_count,
                }
            }
            Err(e) => Outcome::Unacknowledged { error: e },
        }
    }
}
