//! Wiring of the production collaborators.
//!
//! Built once at startup. The pool, the SMTP settings and the queue client
//! are shared by every batch through `Arc<dyn ...>` handles.

use std::{sync::Arc, time::Duration};

use courier_common::internal;
use courier_dispatch::{
    MailError, MessageProcessor, PlaceholderRenderer,
    sender::{SmtpMailSender, SmtpSettings},
};
use courier_queue::{QueueAdapter, QueueError, SqsOptions, SqsQueue};
use courier_store::{CachedTemplateStore, DatabaseOptions, PgTemplateStore, StoreError};
use thiserror::Error;

use crate::{
    secrets::{SecretError, SecretSource},
    settings::Settings,
};

const DB_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum ContainerError {
    #[error(transparent)]
    Secret(#[from] SecretError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error(transparent)]
    Mail(#[from] MailError),
}

#[derive(Debug)]
pub struct Container {
    processor: Arc<MessageProcessor>,
    queue: Arc<dyn QueueAdapter>,
    database: PgTemplateStore,
}

impl Container {
    /// Build the container, fetching credentials from the source that
    /// matches the configured environment.
    ///
    /// # Errors
    /// If credentials are missing or malformed, or a collaborator rejects
    /// its configuration
    pub async fn build(settings: &Settings) -> Result<Self, ContainerError> {
        let secrets = SecretSource::for_environment(settings.environment, &settings.queue.region).await;
        Self::build_with_secrets(settings, &secrets).await
    }

    /// # Errors
    /// See [`Container::build`]
    pub async fn build_with_secrets(
        settings: &Settings,
        secrets: &SecretSource,
    ) -> Result<Self, ContainerError> {
        let db = secrets.credentials(&settings.database.secret_id).await?;
        let smtp = secrets.credentials(&settings.smtp.secret_id).await?;

        let database = PgTemplateStore::connect_lazy(&DatabaseOptions {
            host: settings.database.host.clone(),
            port: settings.database.port,
            database: settings.database.name.clone(),
            schema: settings.database.schema.clone(),
            username: db.username,
            password: db.password,
            max_connections: settings.database.max_connections,
            acquire_timeout: DB_ACQUIRE_TIMEOUT,
        })?;
        let store = CachedTemplateStore::new(database.clone(), settings.template_cache_ttl);

        let smtp_settings = SmtpSettings {
            server: settings.smtp.server.clone(),
            port: settings.smtp.port,
            username: smtp.username,
            password: smtp.password,
            timeout: settings.smtp.timeout,
            tls: settings.smtp.tls,
            content_type: settings.smtp.content_type,
        };
        smtp_settings.validate()?;

        let queue: Arc<dyn QueueAdapter> = Arc::new(
            SqsQueue::connect(&SqsOptions {
                environment: settings.environment,
                queue_url: settings.queue.url.clone(),
                endpoint: settings.queue.endpoint.clone(),
                region: settings.queue.region.clone(),
            })
            .await?,
        );

        let processor = MessageProcessor::new(
            Arc::new(store),
            Arc::new(SmtpMailSender::new(smtp_settings)),
            Arc::clone(&queue),
            Arc::new(PlaceholderRenderer::new(settings.placeholders)),
            settings.processor.clone(),
        );

        internal!(
            level = INFO,
            environment = settings.environment.as_str(),
            batch_mode = ?settings.processor.batch_mode,
            ack_timing = ?settings.processor.ack_timing,
            max_retries = settings.processor.retry.max_retries,
            "Container ready"
        );

        Ok(Self {
            processor: Arc::new(processor),
            queue,
            database,
        })
    }

    pub fn processor(&self) -> Arc<MessageProcessor> {
        Arc::clone(&self.processor)
    }

    pub fn queue(&self) -> Arc<dyn QueueAdapter> {
        Arc::clone(&self.queue)
    }

    /// Release the database pool.
    pub async fn close(&self) {
        self.database.close().await;
        internal!(level = DEBUG, "Container closed");
    }
}
