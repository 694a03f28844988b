//! Cooperative cancellation for in-flight I/O.
//!
//! A [`Cancellation`] is cheap to clone and can be raced against any future
//! with [`Cancellation::run`]. It fires when its [`CancellationSource`]
//! cancels, or when its optional deadline passes.

use std::future::Future;

use thiserror::Error;
use tokio::{sync::watch, time::Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("operation cancelled")]
pub struct Cancelled;

/// The cancelling side
#[derive(Debug)]
pub struct CancellationSource {
    sender: watch::Sender<bool>,
}

impl CancellationSource {
    pub fn cancel(&self) {
        self.sender.send_replace(true);
    }

    /// A fresh handle observing this source
    #[must_use]
    pub fn token(&self) -> Cancellation {
        Cancellation {
            receiver: self.sender.subscribe(),
            deadline: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Cancellation {
    receiver: watch::Receiver<bool>,
    deadline: Option<Instant>,
}

impl Cancellation {
    #[must_use]
    pub fn new() -> (CancellationSource, Self) {
        let (sender, receiver) = watch::channel(false);
        (
            CancellationSource { sender },
            Self {
                receiver,
                deadline: None,
            },
        )
    }

    /// A handle that is never cancelled
    #[must_use]
    pub fn never() -> Self {
        Self::new().1
    }

    /// This handle, additionally cancelled at `deadline`. An earlier
    /// existing deadline is kept.
    #[must_use]
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(self.deadline.map_or(deadline, |d| d.min(deadline)));
        self
    }

    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        *self.receiver.borrow() || self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Resolves once cancelled.
    pub async fn cancelled(&self) {
        let mut receiver = self.receiver.clone();
        let signalled = async move {
            if receiver.wait_for(|cancelled| *cancelled).await.is_err() {
                // Source dropped without cancelling
                std::future::pending::<()>().await;
            }
        };

        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    () = signalled => {}
                    () = tokio::time::sleep_until(deadline) => {}
                }
            }
            None => signalled.await,
        }
    }

    /// Drive `future` to completion unless cancelled first.
    ///
    /// # Errors
    /// `Cancelled` if the handle fires before `future` completes. A handle
    /// that is already cancelled never polls `future`.
    pub async fn run<F: Future>(&self, future: F) -> Result<F::Output, Cancelled> {
        if self.is_cancelled() {
            return Err(Cancelled);
        }

        tokio::select! {
            biased;
            () = self.cancelled() => Err(Cancelled),
            output = future => Ok(output),
        }
    }
}
