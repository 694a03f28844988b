//! SMTP client implementation.
//!
//! # Examples
//!
//! ```no_run
//! use courier_smtp::client::{MessageBuilder, SmtpClient};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut client = SmtpClient::connect("localhost:2525", "localhost".to_string()).await?;
//! client.read_greeting().await?;
//! client.ehlo("courier.local").await?;
//! client.mail_from("sender@example.com").await?;
//! client.rcpt_to("recipient@example.com").await?;
//! client.data().await?;
//!
//! let message = MessageBuilder::new()
//!     .from("sender@example.com")
//!     .to("recipient@example.com")
//!     .subject("Hello")
//!     .body("<p>Hello World</p>")
//!     .build()?;
//! client.send_data(&message).await?;
//! client.quit().await?;
//! # Ok(())
//! # }
//! ```

mod client;
mod error;
mod message;
mod response;

pub use client::{SmtpClient, dot_stuff};
pub use error::{ClientError, Result};
pub use message::{BodyKind, INLINE_IMAGE_CID, InlineImage, MessageBuilder, encode_header};
pub use response::{Response, ResponseLine};
