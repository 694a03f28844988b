use std::{
    collections::{HashMap, VecDeque},
    sync::Arc,
    time::Duration,
};

use async_trait::async_trait;
use courier_common::model::QueueRecord;
use parking_lot::Mutex;
use tokio::{sync::Notify, time::Instant};
use ulid::Ulid;

use crate::{MAX_DELAY_SECONDS, MAX_RECEIVE_BATCH, QueueAdapter, QueueError, Result};

#[derive(Debug, Clone)]
struct Stored {
    message_id: String,
    body: String,
    visible_at: Instant,
}

/// A record handed to `publish`, kept for inspection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Published {
    pub message_id: String,
    pub body: String,
    pub delay_seconds: u32,
}

#[derive(Debug, Default)]
struct State {
    ready: VecDeque<Stored>,
    in_flight: HashMap<String, Stored>,
    published: Vec<Published>,
    deleted: Vec<String>,
    delete_calls: usize,
    fail_publish: bool,
    fail_delete: bool,
}

/// In-process queue with delayed visibility and receipt handles
///
/// Received records move to an in-flight set keyed by a fresh receipt
/// handle until deleted or [released](MemoryQueue::release_in_flight).
/// Every publish and delete is recorded for assertions.
#[derive(Debug, Clone, Default)]
pub struct MemoryQueue {
    state: Arc<Mutex<State>>,
    notify: Arc<Notify>,
}

impl MemoryQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a record that is visible immediately. Not recorded as published.
    pub fn enqueue(&self, body: impl Into<String>) -> String {
        let message_id = Ulid::new().to_string();
        self.state.lock().ready.push_back(Stored {
            message_id: message_id.clone(),
            body: body.into(),
            visible_at: Instant::now(),
        });
        self.notify.notify_waiters();
        message_id
    }

    /// Everything handed to `publish`, in order
    #[must_use]
    pub fn published(&self) -> Vec<Published> {
        self.state.lock().published.clone()
    }

    /// Receipt handles deleted successfully, in order
    #[must_use]
    pub fn deleted(&self) -> Vec<String> {
        self.state.lock().deleted.clone()
    }

    /// Calls to `delete`, including failed ones
    #[must_use]
    pub fn delete_calls(&self) -> usize {
        self.state.lock().delete_calls
    }

    /// Records waiting to be received, including delayed ones
    #[must_use]
    pub fn pending(&self) -> usize {
        self.state.lock().ready.len()
    }

    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.state.lock().in_flight.len()
    }

    /// Return every in-flight record to the queue, as an expired
    /// visibility timeout would.
    pub fn release_in_flight(&self) {
        let mut state = self.state.lock();
        let now = Instant::now();
        let released: Vec<Stored> = state
            .in_flight
            .drain()
            .map(|(_, stored)| Stored {
                visible_at: now,
                ..stored
            })
            .collect();
        state.ready.extend(released);
        drop(state);
        self.notify.notify_waiters();
    }

    pub fn fail_publish(&self, fail: bool) {
        self.state.lock().fail_publish = fail;
    }

    pub fn fail_delete(&self, fail: bool) {
        self.state.lock().fail_delete = fail;
    }

    fn take_visible(&self, max_messages: usize) -> Vec<QueueRecord> {
        let mut state = self.state.lock();
        let now = Instant::now();
        let mut records = Vec::new();
        let mut remaining = VecDeque::with_capacity(state.ready.len());

        while let Some(stored) = state.ready.pop_front() {
            if records.len() < max_messages && stored.visible_at <= now {
                let receipt_handle = Ulid::new().to_string();
                records.push(QueueRecord::new(
                    stored.message_id.clone(),
                    stored.body.clone(),
                    receipt_handle.clone(),
                ));
                state.in_flight.insert(receipt_handle, stored);
            } else {
                remaining.push_back(stored);
            }
        }

        state.ready = remaining;
        records
    }
}

#[async_trait]
impl QueueAdapter for MemoryQueue {
    async fn receive(&self, max_messages: usize, wait: Duration) -> Result<Vec<QueueRecord>> {
        let max_messages = max_messages.clamp(1, MAX_RECEIVE_BATCH);
        let deadline = Instant::now() + wait;

        loop {
            let notified = self.notify.notified();

            let records = self.take_visible(max_messages);
            if !records.is_empty() {
                return Ok(records);
            }

            let next_visible = self.state.lock().ready.iter().map(|s| s.visible_at).min();
            let wake_at = next_visible.map_or(deadline, |at| at.min(deadline));
            if Instant::now() >= deadline {
                return Ok(Vec::new());
            }

            let _ = tokio::time::timeout_at(wake_at, notified).await;
        }
    }

    async fn delete(&self, receipt_handle: &str) -> Result<()> {
        let mut state = self.state.lock();
        state.delete_calls += 1;
        if state.fail_delete {
            return Err(QueueError::api("delete", "injected failure"));
        }

        state.in_flight.remove(receipt_handle);
        state.deleted.push(receipt_handle.to_string());
        Ok(())
    }

    async fn publish(&self, body: &str, delay_seconds: u32) -> Result<String> {
        let mut state = self.state.lock();
        if state.fail_publish {
            return Err(QueueError::api("publish", "injected failure"));
        }

        let message_id = Ulid::new().to_string();
        let delay_seconds = delay_seconds.min(MAX_DELAY_SECONDS);

        state.ready.push_back(Stored {
            message_id: message_id.clone(),
            body: body.to_string(),
            visible_at: Instant::now() + Duration::from_secs(u64::from(delay_seconds)),
        });
        state.published.push(Published {
            message_id: message_id.clone(),
            body: body.to_string(),
            delay_seconds,
        });
        drop(state);

        self.notify.notify_waiters();
        Ok(message_id)
    }
}
