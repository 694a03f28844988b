//! MIME message assembly.

use std::{fmt::Write as _, path::Path};

use base64::{Engine, engine::general_purpose::STANDARD};
use chrono::Utc;

use super::error::{ClientError, Result};

/// `Content-ID` of the inline image; templates reference it as `cid:inline-image`.
pub const INLINE_IMAGE_CID: &str = "inline-image";

/// Line length for base64 bodies (RFC 2045 6.8).
const BASE64_LINE_LEN: usize = 76;

/// Whether the body is rendered as HTML or plain text.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BodyKind {
    #[default]
    Html,
    Plain,
}

impl BodyKind {
    const fn content_type(self) -> &'static str {
        match self {
            Self::Html => "text/html",
            Self::Plain => "text/plain",
        }
    }
}

/// An image embedded in the message and referenced by `Content-ID`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineImage {
    pub filename: String,
    pub content_type: String,
    pub data: Vec<u8>,
}

impl InlineImage {
    /// Reads an image from disk, guessing its type from the extension.
    ///
    /// # Errors
    ///
    /// Returns an IO error if the file cannot be read.
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| ClientError::BuilderError(format!("Invalid filename: {}", path.display())))?
            .to_string();

        let data = tokio::fs::read(path).await?;

        Ok(Self {
            filename,
            content_type: guess_content_type(path).to_string(),
            data,
        })
    }
}

/// Builds an RFC 5322 message with a single body and an optional inline image.
#[derive(Debug, Clone, Default)]
pub struct MessageBuilder {
    from: Option<String>,
    to: Vec<String>,
    subject: Option<String>,
    body: String,
    kind: BodyKind,
    inline_image: Option<InlineImage>,
}

impl MessageBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn from(mut self, email: impl Into<String>) -> Self {
        self.from = Some(email.into());
        self
    }

    #[must_use]
    pub fn to(mut self, email: impl Into<String>) -> Self {
        self.to.push(email.into());
        self
    }

    #[must_use]
    pub fn to_multiple(mut self, emails: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.to.extend(emails.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    #[must_use]
    pub fn body(mut self, content: impl Into<String>) -> Self {
        self.body = content.into();
        self
    }

    #[must_use]
    pub const fn kind(mut self, kind: BodyKind) -> Self {
        self.kind = kind;
        self
    }

    #[must_use]
    pub fn inline_image(mut self, image: InlineImage) -> Self {
        self.inline_image = Some(image);
        self
    }

    /// Builds the final message.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::BuilderError` if there is no sender or no recipient.
    pub fn build(self) -> Result<String> {
        let from = self
            .from
            .as_deref()
            .ok_or_else(|| ClientError::BuilderError("Missing From".to_string()))?;
        if self.to.is_empty() {
            return Err(ClientError::BuilderError("Missing To".to_string()));
        }

        let domain = from.rsplit_once('@').map_or("localhost", |(_, domain)| domain);
        let mut message = String::with_capacity(self.body.len() + 1024);

        let _ = write!(message, "From: {from}\r\n");
        let _ = write!(message, "To: {}\r\n", self.to.join(", "));
        if let Some(subject) = &self.subject {
            let _ = write!(message, "Subject: {}\r\n", encode_header(subject));
        }
        let _ = write!(message, "Date: {}\r\n", Utc::now().to_rfc2822());
        let _ = write!(message, "Message-ID: <{}@{domain}>\r\n", ulid::Ulid::new());
        message.push_str("MIME-Version: 1.0\r\n");

        let body_type = self.kind.content_type();

        match &self.inline_image {
            None => {
                let _ = write!(message, "Content-Type: {body_type}; charset=utf-8\r\n");
                message.push_str("Content-Transfer-Encoding: 8bit\r\n\r\n");
                message.push_str(&self.body);
            }
            Some(image) => {
                let boundary = format!("=_related_{}", ulid::Ulid::new());
                let _ = write!(
                    message,
                    "Content-Type: multipart/related; boundary=\"{boundary}\"\r\n\r\n"
                );

                let _ = write!(message, "--{boundary}\r\n");
                let _ = write!(message, "Content-Type: {body_type}; charset=utf-8\r\n");
                message.push_str("Content-Transfer-Encoding: 8bit\r\n\r\n");
                message.push_str(&self.body);
                message.push_str("\r\n");

                let _ = write!(message, "--{boundary}\r\n");
                let _ = write!(
                    message,
                    "Content-Type: {}; name=\"{}\"\r\n",
                    image.content_type, image.filename
                );
                message.push_str("Content-Transfer-Encoding: base64\r\n");
                let _ = write!(message, "Content-ID: <{INLINE_IMAGE_CID}>\r\n");
                let _ = write!(
                    message,
                    "Content-Disposition: inline; filename=\"{}\"\r\n\r\n",
                    image.filename
                );
                message.push_str(&base64_wrapped(&image.data));

                let _ = write!(message, "--{boundary}--\r\n");
            }
        }

        Ok(message)
    }
}

/// Encodes a header value as an RFC 2047 encoded-word when it is not ASCII.
#[must_use]
pub fn encode_header(value: &str) -> String {
    if value.is_ascii() {
        value.to_string()
    } else {
        format!("=?UTF-8?B?{}?=", STANDARD.encode(value))
    }
}

fn base64_wrapped(data: &[u8]) -> String {
    let encoded = STANDARD.encode(data);
    let mut out = String::with_capacity(encoded.len() + encoded.len() / BASE64_LINE_LEN * 2 + 2);

    for chunk in encoded.as_bytes().chunks(BASE64_LINE_LEN) {
        // base64 output is ASCII
        out.push_str(std::str::from_utf8(chunk).unwrap_or_default());
        out.push_str("\r\n");
    }

    out
}

fn guess_content_type(path: &Path) -> &'static str {
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("");

    match extension.to_ascii_lowercase().as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        "webp" => "image/webp",
        _ => "application/octet-stream",
    }
}
