//! SMTP client used for recipient probes and campaign submission.
//!
//! This module provides a small, explicit SMTP client. It supports:
//!
//! - Plain TCP and implicit TLS connections
//! - STARTTLS upgrade
//! - AUTH PLAIN and AUTH LOGIN
//! - Response inspection, including EHLO capabilities
//! - MIME message construction with HTML alternatives and attachments
//!
//! Callers own the protocol sequence; the client never issues a command it
//! was not asked for. Timeouts are applied by callers around each step.
//!
//! # Examples
//!
//! ```no_run
//! use mailsift_smtp::client::SmtpClient;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut client = SmtpClient::connect("mx.example.com:25", "mx.example.com").await?;
//! client.read_greeting().await?;
//! client.helo("probe.example.org").await?;
//! let reply = client.rcpt_to("someone@example.com").await?;
//! let _ = client.quit().await;
//!
//! println!("RCPT answered {}", reply.code);
//! # Ok(())
//! # }
//! ```

mod error;
mod message;
mod response;
mod smtp_client;

pub use error::{ClientError, Result};
pub use message::{Attachment, MessageBuilder};
pub use response::{Response, ResponseLine};
pub use smtp_client::SmtpClient;
