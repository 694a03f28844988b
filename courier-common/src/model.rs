//! Types that flow between the queue, the template store and the sender.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An email template as stored in the relational store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Template {
    pub id: String,
    pub subject: String,
    /// Body containing placeholder tokens
    pub body: String,
    pub sender: String,
    /// Comma separated list of recipients
    pub recipients: String,
    #[serde(default)]
    pub has_attachment: bool,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl Template {
    /// Convenience constructor for a template without an attachment.
    pub fn new(
        id: impl Into<String>,
        subject: impl Into<String>,
        body: impl Into<String>,
        sender: impl Into<String>,
        recipients: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            subject: subject.into(),
            body: body.into(),
            sender: sender.into(),
            recipients: recipients.into(),
            has_attachment: false,
            created_at: now,
            updated_at: now,
        }
    }

    #[must_use]
    pub const fn with_attachment(mut self, has_attachment: bool) -> Self {
        self.has_attachment = has_attachment;
        self
    }

    /// The first of `subject`, `body` or `sender` that is blank, if any.
    pub fn missing_field(&self) -> Option<&'static str> {
        [
            ("subject", &self.subject),
            ("body", &self.body),
            ("sender", &self.sender),
        ]
        .into_iter()
        .find_map(|(name, value)| value.trim().is_empty().then_some(name))
    }
}

/// A named substitution value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parameter {
    #[serde(rename = "nombre")]
    pub name: String,
    #[serde(rename = "valor")]
    pub value: String,
}

impl Parameter {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// The payload carried in a queue record body.
///
/// Missing `id_plantilla` and `parametros` deserialise to empty values so
/// that the processor can reject them with a precise reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Command {
    #[serde(rename = "id_plantilla", default)]
    pub template_id: String,
    #[serde(rename = "parametros", default)]
    pub parameters: Vec<Parameter>,
    #[serde(default)]
    pub retry_count: u32,
}

impl Command {
    pub fn new(template_id: impl Into<String>, parameters: Vec<Parameter>) -> Self {
        Self {
            template_id: template_id.into(),
            parameters,
            retry_count: 0,
        }
    }

    /// The command to republish after a failed send.
    #[must_use]
    pub fn next_attempt(&self) -> Self {
        Self {
            retry_count: self.retry_count.saturating_add(1),
            ..self.clone()
        }
    }

    /// Parse a record body.
    ///
    /// # Errors
    ///
    /// Fails if the body is not a JSON object of the expected shape.
    pub fn from_json(body: &str) -> serde_json::Result<Self> {
        serde_json::from_str(body)
    }

    /// Serialise for publishing. `retry_count` is always written.
    ///
    /// # Errors
    ///
    /// Only fails if serialisation itself fails, which cannot happen for
    /// this shape.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// A record as handed over by the queue platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueRecord {
    #[serde(rename = "messageId")]
    pub message_id: String,
    pub body: String,
    #[serde(rename = "receiptHandle")]
    pub receipt_handle: String,
}

impl QueueRecord {
    pub fn new(
        message_id: impl Into<String>,
        body: impl Into<String>,
        receipt_handle: impl Into<String>,
    ) -> Self {
        Self {
            message_id: message_id.into(),
            body: body.into(),
            receipt_handle: receipt_handle.into(),
        }
    }
}

/// A fully rendered email, ready for the sender.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedEmail {
    pub sender: String,
    pub recipients: String,
    pub subject: String,
    pub body: String,
    pub inline_image: Option<PathBuf>,
}
