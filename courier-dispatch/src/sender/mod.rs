//! Sending rendered emails.

mod recording;
mod smtp;

use std::path::PathBuf;

use async_trait::async_trait;
use courier_common::{address::AddressError, model::RenderedEmail};
use courier_smtp::ClientError;
use thiserror::Error;

pub use recording::RecordingMailSender;
pub use smtp::{ContentType, SmtpMailSender, SmtpSettings, TlsMode};

use crate::error::ErrorKind;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MailError {
    /// The sender itself is misconfigured
    #[error("Mail sender misconfigured: {0}")]
    Configuration(String),

    /// The email cannot be sent as addressed
    #[error("Invalid email: {0}")]
    Validation(String),

    /// The relay could not be reached, timed out or rejected the message
    #[error("SMTP transport failure: {0}")]
    Transport(String),

    #[error("Inline image not found: {}", .0.display())]
    ResourceMissing(PathBuf),
}

impl MailError {
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Configuration(_) => ErrorKind::Configuration,
            Self::Validation(_) => ErrorKind::Validation,
            Self::Transport(_) => ErrorKind::Transport,
            Self::ResourceMissing(_) => ErrorKind::ResourceMissing,
        }
    }

    /// Whether resending could succeed
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

impl From<ClientError> for MailError {
    fn from(error: ClientError) -> Self {
        Self::Transport(error.to_string())
    }
}

impl From<AddressError> for MailError {
    fn from(error: AddressError) -> Self {
        Self::Validation(error.to_string())
    }
}

#[async_trait]
pub trait MailSender: Send + Sync + std::fmt::Debug {
    /// Deliver `email` to the relay.
    ///
    /// # Errors
    /// See [`MailError`] for the categories of failure
    async fn send(&self, email: &RenderedEmail) -> Result<(), MailError>;
}

#[async_trait]
impl<T: MailSender + ?Sized> MailSender for std::sync::Arc<T> {
    async fn send(&self, email: &RenderedEmail) -> Result<(), MailError> {
        (**self).send(email).await
    }
}
