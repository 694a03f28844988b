//! The long-running poll loop and its shutdown handling.

use std::{sync::{Arc, LazyLock}, time::Duration};

use courier_common::{Signal, internal};
use courier_dispatch::{Cancellation, MessageProcessor};
use courier_queue::QueueAdapter;
use tokio::{sync::broadcast, time::Instant};

use crate::settings::QueueSettings;

/// Pause after a failed receive before polling again
const RECEIVE_BACKOFF: Duration = Duration::from_secs(1);

pub static SHUTDOWN_BROADCAST: LazyLock<broadcast::Sender<Signal>> = LazyLock::new(|| {
    let (sender, _receiver) = broadcast::channel(64);
    sender
});

/// Wait for SIGINT or SIGTERM, then broadcast [`Signal::Shutdown`].
///
/// Returns once a second CTRL+C arrives or every receiver is gone.
///
/// # Errors
/// If the signal handlers cannot be installed or the broadcast fails
pub async fn shutdown() -> std::io::Result<()> {
    let mut terminate = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            internal!(level = INFO, "CTRL+C entered, finishing the current batch. Enter it again to force shutdown");
        }
        _ = terminate.recv() => {
            internal!(level = INFO, "Terminate signal received, finishing the current batch");
        }
    };

    let mut receiver = SHUTDOWN_BROADCAST.subscribe();

    SHUTDOWN_BROADCAST
        .send(Signal::Shutdown)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Interrupted, e.to_string()))?;

    loop {
        tokio::select! {
            sig = receiver.recv() => {
                match sig {
                    Ok(s) => tracing::debug!("Received {s:?}"),
                    Err(broadcast::error::RecvError::Closed) => break,
                    Err(e) => tracing::debug!("Received: {e:?}"),
                }
            }

            _ = tokio::signal::ctrl_c() => {
                break;
            }
        }
    }

    Ok(())
}

/// Receives batches from the queue and hands them to the processor until
/// told to shut down.
#[derive(Debug)]
pub struct Controller {
    processor: Arc<MessageProcessor>,
    queue: Arc<dyn QueueAdapter>,
    batch_size: usize,
    wait: Duration,
    batch_deadline: Duration,
}

impl Controller {
    pub fn new(
        processor: Arc<MessageProcessor>,
        queue: Arc<dyn QueueAdapter>,
        settings: &QueueSettings,
    ) -> Self {
        Self {
            processor,
            queue,
            batch_size: settings.poll_batch_size,
            wait: settings.poll_wait,
            batch_deadline: settings.batch_deadline,
        }
    }

    /// Poll until [`Signal::Shutdown`] arrives on `shutdown`.
    ///
    /// A batch that is already being processed runs to completion, bounded
    /// by the batch deadline, before the signal is observed.
    pub async fn serve(&self, mut shutdown: broadcast::Receiver<Signal>) {
        internal!(
            level = INFO,
            batch_size = self.batch_size,
            wait_secs = self.wait.as_secs(),
            "Polling for records"
        );

        loop {
            let received = tokio::select! {
                biased;

                sig = shutdown.recv() => {
                    if Self::should_stop(sig) {
                        break;
                    }
                    continue;
                }
                received = self.queue.receive(self.batch_size, self.wait) => received,
            };

            let records = match received {
                Ok(records) => records,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to receive records");
                    tokio::select! {
                        biased;

                        sig = shutdown.recv() => {
                            if Self::should_stop(sig) {
                                break;
                            }
                        }
                        () = tokio::time::sleep(RECEIVE_BACKOFF) => {}
                    }
                    continue;
                }
            };

            if records.is_empty() {
                continue;
            }

            let cancel = Cancellation::never().with_deadline(Instant::now() + self.batch_deadline);
            if let Err(aborted) = self.processor.process_batch(&records, &cancel).await {
                tracing::error!(
                    message_id = aborted.message_id(),
                    error = %aborted,
                    "Batch aborted, unprocessed records will be redelivered"
                );
            }
        }

        internal!(level = INFO, "Poll loop stopped");
    }

    fn should_stop(signal: Result<Signal, broadcast::error::RecvError>) -> bool {
        match signal {
            Ok(Signal::Shutdown) | Err(broadcast::error::RecvError::Closed) => true,
            Ok(Signal::Finalised) | Err(broadcast::error::RecvError::Lagged(_)) => false,
        }
    }
}
