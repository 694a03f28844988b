//! Environment configuration.
//!
//! Every setting comes from a process environment variable. Variables are
//! collected with the `config` crate, then validated into [`Settings`] in
//! one pass so that all missing variables are reported together.

use std::{path::PathBuf, str::FromStr, time::Duration};

use courier_common::Environment;
use courier_dispatch::{
    AckTiming, BatchMode, PlaceholderSyntax, ProcessorConfig, RetryBackoff, RetryPolicy,
    sender::{ContentType, TlsMode},
};
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("Missing required environment variables: {}", .0.join(", "))]
    Missing(Vec<&'static str>),

    #[error("Invalid value for {variable} ({value:?}): {reason}")]
    Invalid {
        variable: &'static str,
        value: String,
        reason: String,
    },

    #[error("Failed to read the environment: {0}")]
    Source(#[from] config::ConfigError),
}

/// Variables as read, before validation. Keys are lower-cased by the
/// environment source.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawSettings {
    app_env: Option<String>,
    service_env: Option<String>,
    db_host: Option<String>,
    db_port: Option<String>,
    db_name: Option<String>,
    db_schema: Option<String>,
    db_max_connections: Option<String>,
    smtp_server: Option<String>,
    smtp_port: Option<String>,
    smtp_timeout: Option<String>,
    smtp_tls: Option<String>,
    smtp_content_type: Option<String>,
    secrets_db: Option<String>,
    secrets_smtp: Option<String>,
    sqs_queue_url: Option<String>,
    sqs_message_delay: Option<String>,
    sqs_endpoint: Option<String>,
    aws_region: Option<String>,
    max_retries: Option<String>,
    retry_backoff: Option<String>,
    batch_mode: Option<String>,
    ack_timing: Option<String>,
    template_placeholders: Option<String>,
    template_cache_ttl: Option<String>,
    inline_image_path: Option<String>,
    poll_batch_size: Option<String>,
    poll_wait_secs: Option<String>,
    batch_deadline_secs: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseSettings {
    pub host: String,
    pub port: u16,
    pub name: String,
    pub schema: String,
    /// Identifier of the `{username, password}` secret
    pub secret_id: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmtpRelaySettings {
    pub server: String,
    pub port: u16,
    pub timeout: Duration,
    pub tls: TlsMode,
    pub content_type: ContentType,
    /// Identifier of the `{username, password}` secret
    pub secret_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueSettings {
    pub url: String,
    /// Emulator endpoint in the local environment
    pub endpoint: String,
    pub region: String,
    pub poll_batch_size: usize,
    pub poll_wait: Duration,
    /// Upper bound on the time one batch may take
    pub batch_deadline: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub environment: Environment,
    pub database: DatabaseSettings,
    pub smtp: SmtpRelaySettings,
    pub queue: QueueSettings,
    pub processor: ProcessorConfig,
    pub placeholders: PlaceholderSyntax,
    /// Zero disables the template cache
    pub template_cache_ttl: Duration,
}

mod defaults {
    pub const DB_MAX_CONNECTIONS: u32 = 5;
    pub const SMTP_TIMEOUT_SECS: u64 = 15;
    pub const SQS_ENDPOINT: &str = "http://localhost:4566";
    pub const AWS_REGION: &str = "us-east-1";
    pub const MAX_RETRIES: u32 = 3;
    pub const POLL_BATCH_SIZE: usize = 10;
    pub const POLL_WAIT_SECS: u64 = 20;
    pub const BATCH_DEADLINE_SECS: u64 = 300;
}

impl Settings {
    /// Read settings from the process environment.
    ///
    /// # Errors
    /// If a required variable is missing or a value cannot be parsed
    pub fn from_env() -> Result<Self, SettingsError> {
        Self::from_source(config::Environment::default())
    }

    /// Read settings from explicit variables, as if they were the
    /// environment.
    ///
    /// # Errors
    /// See [`Settings::from_env`]
    pub fn from_vars<K, V>(vars: impl IntoIterator<Item = (K, V)>) -> Result<Self, SettingsError>
    where
        K: Into<String>,
        V: Into<String>,
    {
        let map: config::Map<String, String> = vars
            .into_iter()
            .map(|(key, value)| (key.into(), value.into()))
            .collect();

        Self::from_source(config::Environment::default().source(Some(map)))
    }

    fn from_source(source: config::Environment) -> Result<Self, SettingsError> {
        let raw: RawSettings = config::Config::builder()
            .add_source(source)
            .build()?
            .try_deserialize()?;

        raw.validate()
    }
}

fn present(value: Option<&String>) -> Option<&str> {
    value.map(|v| v.trim()).filter(|v| !v.is_empty())
}

fn parse<T>(variable: &'static str, value: Option<&String>, default: T) -> Result<T, SettingsError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    present(value).map_or(Ok(default), |v| {
        v.parse().map_err(|e: T::Err| SettingsError::Invalid {
            variable,
            value: v.to_string(),
            reason: e.to_string(),
        })
    })
}

impl RawSettings {
    fn validate(self) -> Result<Settings, SettingsError> {
        let mut missing = Vec::new();
        let mut required = |variable: &'static str, value: Option<&String>| {
            present(value).map(ToString::to_string).unwrap_or_else(|| {
                missing.push(variable);
                String::new()
            })
        };

        let environment = present(self.app_env.as_ref())
            .or_else(|| present(self.service_env.as_ref()))
            .map(ToString::to_string);
        let db_host = required("DB_HOST", self.db_host.as_ref());
        let db_port = required("DB_PORT", self.db_port.as_ref());
        let db_name = required("DB_NAME", self.db_name.as_ref());
        let db_schema = required("DB_SCHEMA", self.db_schema.as_ref());
        let smtp_server = required("SMTP_SERVER", self.smtp_server.as_ref());
        let smtp_port = required("SMTP_PORT", self.smtp_port.as_ref());
        let secrets_db = required("SECRETS_DB", self.secrets_db.as_ref());
        let secrets_smtp = required("SECRETS_SMTP", self.secrets_smtp.as_ref());
        let queue_url = required("SQS_QUEUE_URL", self.sqs_queue_url.as_ref());

        let Some(environment) = environment else {
            missing.insert(0, "APP_ENV or SERVICE_ENV");
            return Err(SettingsError::Missing(missing));
        };
        if !missing.is_empty() {
            return Err(SettingsError::Missing(missing));
        }

        let environment =
            environment
                .parse::<Environment>()
                .map_err(|e| SettingsError::Invalid {
                    variable: "APP_ENV",
                    value: environment.clone(),
                    reason: e.to_string(),
                })?;

        // An unusable MAX_RETRIES is not fatal
        let max_retries = present(self.max_retries.as_ref()).map_or(defaults::MAX_RETRIES, |v| {
            v.parse().unwrap_or_else(|_| {
                tracing::warn!(value = v, "Invalid MAX_RETRIES, using {}", defaults::MAX_RETRIES);
                defaults::MAX_RETRIES
            })
        });

        let inline_image = present(self.inline_image_path.as_ref()).map(PathBuf::from);

        Ok(Settings {
            environment,
            database: DatabaseSettings {
                host: db_host,
                port: parse("DB_PORT", Some(&db_port), 0)?,
                name: db_name,
                schema: db_schema,
                secret_id: secrets_db,
                max_connections: parse(
                    "DB_MAX_CONNECTIONS",
                    self.db_max_connections.as_ref(),
                    defaults::DB_MAX_CONNECTIONS,
                )?,
            },
            smtp: SmtpRelaySettings {
                server: smtp_server,
                port: parse("SMTP_PORT", Some(&smtp_port), 0)?,
                timeout: Duration::from_secs(parse(
                    "SMTP_TIMEOUT",
                    self.smtp_timeout.as_ref(),
                    defaults::SMTP_TIMEOUT_SECS,
                )?),
                tls: parse("SMTP_TLS", self.smtp_tls.as_ref(), TlsMode::default())?,
                content_type: parse(
                    "SMTP_CONTENT_TYPE",
                    self.smtp_content_type.as_ref(),
                    ContentType::default(),
                )?,
                secret_id: secrets_smtp,
            },
            queue: QueueSettings {
                url: queue_url,
                endpoint: present(self.sqs_endpoint.as_ref())
                    .unwrap_or(defaults::SQS_ENDPOINT)
                    .to_string(),
                region: present(self.aws_region.as_ref())
                    .unwrap_or(defaults::AWS_REGION)
                    .to_string(),
                poll_batch_size: parse(
                    "POLL_BATCH_SIZE",
                    self.poll_batch_size.as_ref(),
                    defaults::POLL_BATCH_SIZE,
                )?,
                poll_wait: Duration::from_secs(parse(
                    "POLL_WAIT_SECS",
                    self.poll_wait_secs.as_ref(),
                    defaults::POLL_WAIT_SECS,
                )?),
                batch_deadline: Duration::from_secs(parse(
                    "BATCH_DEADLINE_SECS",
                    self.batch_deadline_secs.as_ref(),
                    defaults::BATCH_DEADLINE_SECS,
                )?),
            },
            processor: ProcessorConfig {
                batch_mode: parse("BATCH_MODE", self.batch_mode.as_ref(), BatchMode::default())?,
                ack_timing: parse("ACK_TIMING", self.ack_timing.as_ref(), AckTiming::default())?,
                retry: RetryPolicy {
                    max_retries,
                    delay_seconds: parse("SQS_MESSAGE_DELAY", self.sqs_message_delay.as_ref(), 0)?,
                    backoff: parse(
                        "RETRY_BACKOFF",
                        self.retry_backoff.as_ref(),
                        RetryBackoff::default(),
                    )?,
                },
                inline_image,
            },
            placeholders: parse(
                "TEMPLATE_PLACEHOLDERS",
                self.template_placeholders.as_ref(),
                PlaceholderSyntax::default(),
            )?,
            template_cache_ttl: Duration::from_secs(parse(
                "TEMPLATE_CACHE_TTL",
                self.template_cache_ttl.as_ref(),
                0,
            )?),
        })
    }
}
