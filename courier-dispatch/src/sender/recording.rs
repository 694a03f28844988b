use std::{
    collections::VecDeque,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};

use async_trait::async_trait;
use courier_common::model::RenderedEmail;
use parking_lot::Mutex;
use tokio::sync::Notify;

use super::{MailError, MailSender};

#[derive(Debug, Clone)]
enum Scripted {
    Fail(MailError),
    Panic(String),
    Hang,
}

#[derive(Debug, Default)]
struct Script {
    next: VecDeque<Scripted>,
    always: Option<MailError>,
}

/// A mail sender that records what it is asked to send
///
/// Succeeds by default. Failures, panics and hangs can be scripted for the
/// next attempts, or a failure for every attempt.
#[derive(Debug, Clone, Default)]
pub struct RecordingMailSender {
    sent: Arc<Mutex<Vec<RenderedEmail>>>,
    attempts: Arc<AtomicUsize>,
    script: Arc<Mutex<Script>>,
    notify: Arc<Notify>,
}

impl RecordingMailSender {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next attempt with `error`
    pub fn fail_next(&self, error: MailError) {
        self.script.lock().next.push_back(Scripted::Fail(error));
    }

    /// Fail every attempt not otherwise scripted with `error`
    pub fn fail_always(&self, error: MailError) {
        self.script.lock().always = Some(error);
    }

    /// Panic on the next attempt
    pub fn panic_next(&self, message: impl Into<String>) {
        self.script.lock().next.push_back(Scripted::Panic(message.into()));
    }

    /// Never complete the next attempt
    pub fn hang_next(&self) {
        self.script.lock().next.push_back(Scripted::Hang);
    }

    /// Emails that were accepted
    #[must_use]
    pub fn sent(&self) -> Vec<RenderedEmail> {
        self.sent.lock().clone()
    }

    /// Every call to `send`, successful or not
    #[must_use]
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Wait until `send` has been called at least `count` times
    pub async fn wait_for_attempts(&self, count: usize) {
        loop {
            let notified = self.notify.notified();
            if self.attempts() >= count {
                return;
            }
            notified.await;
        }
    }
}

#[async_trait]
impl MailSender for RecordingMailSender {
    async fn send(&self, email: &RenderedEmail) -> Result<(), MailError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        self.notify.notify_waiters();

        let scripted = {
            let mut script = self.script.lock();
            script
                .next
                .pop_front()
                .or_else(|| script.always.clone().map(Scripted::Fail))
        };

        match scripted {
            None => {
                self.sent.lock().push(email.clone());
                Ok(())
            }
            Some(Scripted::Fail(error)) => Err(error),
            Some(Scripted::Panic(message)) => panic!("{message}"),
            Some(Scripted::Hang) => {
                std::future::pending::<()>().await;
                Ok(())
            }
        }
    }
}
