//! SMTP submission of rendered emails.
//!
//! One [`SmtpMailSender::send`] call is one SMTP session:
//! connect, greeting, EHLO, optional STARTTLS and a second EHLO, AUTH,
//! MAIL FROM, RCPT TO per recipient, DATA and QUIT. The whole session runs
//! under a single deadline.

use std::{net::IpAddr, str::FromStr, time::Duration};

use async_trait::async_trait;
use courier_common::{
    address::{Mailbox, parse_mailbox, parse_mailbox_list},
    internal,
    model::RenderedEmail,
};
use courier_smtp::client::{BodyKind, InlineImage, MessageBuilder, Response, SmtpClient};
use serde::Deserialize;

use super::{MailError, MailSender};

/// Whether to upgrade the session with STARTTLS
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TlsMode {
    /// Never upgrade
    None,
    /// Upgrade when advertised, fall back to plaintext if the upgrade fails
    #[default]
    Opportunistic,
    /// Refuse to send without TLS
    Required,
}

impl FromStr for TlsMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" => Ok(Self::None),
            "opportunistic" => Ok(Self::Opportunistic),
            "required" => Ok(Self::Required),
            other => Err(format!(
                "unknown TLS mode '{other}', expected none, opportunistic or required"
            )),
        }
    }
}

/// MIME type of the rendered body
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    #[default]
    Html,
    Plain,
}

impl FromStr for ContentType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "html" => Ok(Self::Html),
            "plain" => Ok(Self::Plain),
            other => Err(format!(
                "unknown content type '{other}', expected html or plain"
            )),
        }
    }
}

impl From<ContentType> for BodyKind {
    fn from(value: ContentType) -> Self {
        match value {
            ContentType::Html => Self::Html,
            ContentType::Plain => Self::Plain,
        }
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct SmtpSettings {
    pub server: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    /// Deadline for the whole session
    pub timeout: Duration,
    pub tls: TlsMode,
    pub content_type: ContentType,
}

impl std::fmt::Debug for SmtpSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtpSettings")
            .field("server", &self.server)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("timeout", &self.timeout)
            .field("tls", &self.tls)
            .field("content_type", &self.content_type)
            .finish()
    }
}

impl SmtpSettings {
    /// # Errors
    /// `MailError::Configuration` naming every missing field
    pub fn validate(&self) -> Result<(), MailError> {
        let missing: Vec<&str> = [
            ("server", self.server.trim().is_empty()),
            ("port", self.port == 0),
            ("username", self.username.is_empty()),
            ("password", self.password.is_empty()),
        ]
        .into_iter()
        .filter_map(|(name, missing)| missing.then_some(name))
        .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(MailError::Configuration(format!(
                "missing SMTP settings: {}",
                missing.join(", ")
            )))
        }
    }

    fn address(&self) -> String {
        format!("{}:{}", self.server, self.port)
    }
}

#[derive(Debug, Clone)]
pub struct SmtpMailSender {
    settings: SmtpSettings,
}

impl SmtpMailSender {
    pub const fn new(settings: SmtpSettings) -> Self {
        Self { settings }
    }

    pub const fn settings(&self) -> &SmtpSettings {
        &self.settings
    }

    async fn load_image(email: &RenderedEmail) -> Result<Option<InlineImage>, MailError> {
        let Some(path) = &email.inline_image else {
            return Ok(None);
        };

        if !tokio::fs::try_exists(path).await.unwrap_or(false) {
            return Err(MailError::ResourceMissing(path.clone()));
        }

        InlineImage::from_file(path)
            .await
            .map(Some)
            .map_err(|_| MailError::ResourceMissing(path.clone()))
    }
}

#[async_trait]
impl MailSender for SmtpMailSender {
    #[tracing::instrument(level = "debug", skip_all, fields(server = %self.settings.server, port = self.settings.port))]
    async fn send(&self, email: &RenderedEmail) -> Result<(), MailError> {
        self.settings.validate()?;

        let sender = parse_mailbox(&email.sender)?;
        let recipients = parse_mailbox_list(&email.recipients)?;
        let image = Self::load_image(email).await?;

        let mut builder = MessageBuilder::new()
            .from(sender.to_string())
            .to_multiple(recipients.iter().map(ToString::to_string))
            .subject(&email.subject)
            .body(&email.body)
            .kind(self.settings.content_type.into());
        if let Some(image) = image {
            builder = builder.inline_image(image);
        }
        let message = builder
            .build()
            .map_err(|e| MailError::Validation(e.to_string()))?;

        let session = Session {
            settings: &self.settings,
            sender: &sender,
            recipients: &recipients,
        };

        tokio::time::timeout(self.settings.timeout, session.execute(&message))
            .await
            .map_err(|_| {
                MailError::Transport(format!(
                    "SMTP session timed out after {:?}",
                    self.settings.timeout
                ))
            })?
    }
}

/// Outcome of the STARTTLS step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TlsNegotiationOutcome {
    Success,
    Skipped,
    /// Opportunistic upgrade failed, reconnect in plaintext (RFC 3207 4.1)
    RetryWithoutTls,
}

struct Session<'a> {
    settings: &'a SmtpSettings,
    sender: &'a Mailbox,
    recipients: &'a [Mailbox],
}

impl Session<'_> {
    async fn execute(&self, message: &str) -> Result<(), MailError> {
        let mut client = self.connect_and_greet().await?;
        let mut ehlo = self.ehlo(&mut client).await?;

        match self.negotiate_tls(&mut client, &ehlo).await? {
            TlsNegotiationOutcome::Success => ehlo = self.ehlo(&mut client).await?,
            TlsNegotiationOutcome::Skipped => {}
            TlsNegotiationOutcome::RetryWithoutTls => {
                internal!(
                    level = INFO,
                    server = %self.settings.server,
                    "Reconnecting without STARTTLS"
                );
                drop(client);
                client = self.connect_and_greet().await?;
                ehlo = self.ehlo(&mut client).await?;
            }
        }

        self.authenticate(&mut client, &ehlo).await?;

        let response = client.mail_from(&self.sender.to_string()).await?;
        expect_success("MAIL FROM", &response)?;

        for recipient in self.recipients {
            let response = client.rcpt_to(&recipient.to_string()).await?;
            expect_success("RCPT TO", &response)?;
        }

        let response = client.data().await?;
        if response.code != 354 {
            return Err(rejected("DATA", &response));
        }

        let response = client.send_data(message).await?;
        expect_success("end of data", &response)?;

        if let Err(e) = client.quit().await {
            tracing::warn!(error = %e, "QUIT failed after the message was accepted");
        }

        Ok(())
    }

    async fn connect_and_greet(&self) -> Result<SmtpClient, MailError> {
        let mut client = SmtpClient::connect(&self.settings.address(), self.settings.server.clone())
            .await
            .map_err(|e| {
                MailError::Transport(format!(
                    "Failed to connect to {}: {e}",
                    self.settings.address()
                ))
            })?;

        let greeting = client.read_greeting().await?;
        expect_success("greeting", &greeting)?;

        Ok(client)
    }

    async fn ehlo(&self, client: &mut SmtpClient) -> Result<Response, MailError> {
        let response = client.ehlo(&self.sender.domain).await?;
        expect_success("EHLO", &response)?;
        Ok(response)
    }

    async fn negotiate_tls(
        &self,
        client: &mut SmtpClient,
        ehlo: &Response,
    ) -> Result<TlsNegotiationOutcome, MailError> {
        let advertised = ehlo.has_capability("STARTTLS");

        match (self.settings.tls, advertised) {
            (TlsMode::None, _) | (TlsMode::Opportunistic, false) => {
                return Ok(TlsNegotiationOutcome::Skipped);
            }
            (TlsMode::Required, false) => {
                return Err(MailError::Transport(
                    "STARTTLS is required but not offered by the server".to_string(),
                ));
            }
            (TlsMode::Opportunistic | TlsMode::Required, true) => {}
        }

        let failure = match client.starttls().await {
            Ok(response) if response.is_success() => {
                tracing::debug!(tls = client.is_tls(), "TLS negotiated via STARTTLS");
                return Ok(TlsNegotiationOutcome::Success);
            }
            Ok(response) => format!("Server rejected STARTTLS: {}", response.message()),
            Err(e) => format!("STARTTLS failed: {e}"),
        };

        if self.settings.tls == TlsMode::Required {
            return Err(MailError::Transport(failure));
        }

        tracing::info!(error = %failure, "Opportunistic STARTTLS failed");
        Ok(TlsNegotiationOutcome::RetryWithoutTls)
    }

    async fn authenticate(&self, client: &mut SmtpClient, ehlo: &Response) -> Result<(), MailError> {
        let (username, password) = (&self.settings.username, &self.settings.password);

        let plain = ehlo.supports_auth("PLAIN");
        if !plain && !ehlo.supports_auth("LOGIN") {
            tracing::warn!("Server offers neither AUTH PLAIN nor AUTH LOGIN, sending unauthenticated");
            return Ok(());
        }

        self.ensure_encrypted(client)?;

        let response = if plain {
            client.auth_plain(username, password).await?
        } else {
            client.auth_login(username, password).await?
        };

        if response.code == 235 {
            Ok(())
        } else {
            Err(rejected("AUTH", &response))
        }
    }
}

impl Session<'_> {
    /// Credentials only cross the network inside TLS. A loopback relay is
    /// exempt.
    fn ensure_encrypted(&self, client: &SmtpClient) -> Result<(), MailError> {
        if client.is_tls() || is_loopback(&self.settings.server) {
            return Ok(());
        }

        let message = format!(
            "Refusing to authenticate to {} over an unencrypted connection",
            self.settings.server
        );
        if self.settings.tls == TlsMode::None {
            Err(MailError::Configuration(message))
        } else {
            Err(MailError::Transport(message))
        }
    }
}

fn is_loopback(server: &str) -> bool {
    let host = server.trim_start_matches('[').trim_end_matches(']');
    host.eq_ignore_ascii_case("localhost")
        || host.parse::<IpAddr>().is_ok_and(|ip| ip.is_loopback())
}

fn rejected(command: &str, response: &Response) -> MailError {
    MailError::Transport(format!(
        "Server rejected {command}: {} {}",
        response.code,
        response.message()
    ))
}

fn expect_success(command: &str, response: &Response) -> Result<(), MailError> {
    if response.is_success() {
        Ok(())
    } else {
        Err(rejected(command, response))
    }
}
