//! A small asynchronous SMTP submission client.
//!
//! Supports plain TCP with an optional STARTTLS upgrade, AUTH PLAIN and
//! AUTH LOGIN, and a MIME builder for HTML or plain-text mail with an
//! optional inline image.

pub mod client;

pub use client::{ClientError, InlineImage, MessageBuilder, Response, SmtpClient};
