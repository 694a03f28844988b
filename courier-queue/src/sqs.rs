use std::time::Duration;

use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_sqs::{Client, config::Credentials, error::DisplayErrorContext};
use courier_common::{Environment, internal, model::QueueRecord};

use crate::{MAX_DELAY_SECONDS, MAX_RECEIVE_BATCH, QueueAdapter, QueueError, Result};

/// Longest long-poll SQS accepts.
const MAX_WAIT_SECONDS: u64 = 20;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqsOptions {
    pub environment: Environment,
    pub queue_url: String,
    /// Emulator endpoint, only used in the local environment
    pub endpoint: String,
    pub region: String,
}

/// Amazon SQS queue
#[derive(Debug, Clone)]
pub struct SqsQueue {
    client: Client,
    queue_url: String,
}

impl SqsQueue {
    /// Build a client for `options.queue_url`.
    ///
    /// In the local environment the client talks to the emulator at
    /// `options.endpoint` with static credentials; everywhere else the
    /// default AWS provider chain and endpoint resolution are used.
    ///
    /// # Errors
    /// If the queue URL is empty
    pub async fn connect(options: &SqsOptions) -> Result<Self> {
        if options.queue_url.trim().is_empty() {
            return Err(QueueError::Configuration(
                "Queue URL is empty".to_string(),
            ));
        }

        let loader = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(options.region.clone()));

        let loader = if options.environment.is_local() {
            internal!(
                level = INFO,
                endpoint = %options.endpoint,
                "Using local queue emulator"
            );
            loader
                .endpoint_url(&options.endpoint)
                .credentials_provider(Credentials::new("test", "test", None, None, "local"))
        } else {
            loader
        };

        let config = loader.load().await;

        Ok(Self {
            client: Client::new(&config),
            queue_url: options.queue_url.clone(),
        })
    }
}

#[async_trait]
impl QueueAdapter for SqsQueue {
    #[tracing::instrument(level = "debug", skip(self))]
    async fn receive(&self, max_messages: usize, wait: Duration) -> Result<Vec<QueueRecord>> {
        let max_messages = max_messages.clamp(1, MAX_RECEIVE_BATCH);
        let wait = wait.as_secs().min(MAX_WAIT_SECONDS);

        let output = self
            .client
            .receive_message()
            .queue_url(&self.queue_url)
            .max_number_of_messages(i32::try_from(max_messages).unwrap_or(10))
            .wait_time_seconds(i32::try_from(wait).unwrap_or(20))
            .send()
            .await
            .map_err(|e| QueueError::api("receive", DisplayErrorContext(&e).to_string()))?;

        let records = output
            .messages()
            .iter()
            .filter_map(|message| {
                let (Some(message_id), Some(receipt_handle)) =
                    (message.message_id(), message.receipt_handle())
                else {
                    tracing::warn!(?message, "Skipping message without id or receipt handle");
                    return None;
                };

                Some(QueueRecord::new(
                    message_id,
                    message.body().unwrap_or_default(),
                    receipt_handle,
                ))
            })
            .collect();

        Ok(records)
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn delete(&self, receipt_handle: &str) -> Result<()> {
        match self
            .client
            .delete_message()
            .queue_url(&self.queue_url)
            .receipt_handle(receipt_handle)
            .send()
            .await
        {
            Ok(_) => Ok(()),
            Err(e)
                if e
                    .as_service_error()
                    .is_some_and(|service| service.is_receipt_handle_is_invalid()) =>
            {
                tracing::warn!(receipt_handle, "Receipt handle already invalid, treating as deleted");
                Ok(())
            }
            Err(e) => Err(QueueError::api("delete", DisplayErrorContext(&e).to_string())),
        }
    }

    #[tracing::instrument(level = "debug", skip(self, body))]
    async fn publish(&self, body: &str, delay_seconds: u32) -> Result<String> {
        let delay = delay_seconds.min(MAX_DELAY_SECONDS);

        let output = self
            .client
            .send_message()
            .queue_url(&self.queue_url)
            .message_body(body)
            .delay_seconds(i32::try_from(delay).unwrap_or(0))
            .send()
            .await
            .map_err(|e| QueueError::api("publish", DisplayErrorContext(&e).to_string()))?;

        Ok(output.message_id().unwrap_or_default().to_string())
    }
}
