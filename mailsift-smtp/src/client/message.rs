//! MIME message construction for campaign mail.
//!
//! Layout by content:
//!
//! - text only: a single `text/plain` body
//! - text and HTML: `multipart/alternative`
//! - attachments: `multipart/mixed` whose first part is the body above

use std::{fmt::Write, path::Path};

use base64::{Engine, engine::general_purpose::STANDARD};

use super::error::{ClientError, Result};

/// Base64 output is wrapped at this many characters per line (RFC 2045).
const BASE64_LINE_LEN: usize = 76;

/// A file attached to a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub filename: String,
    /// e.g. `application/pdf`
    pub content_type: String,
    pub data: Vec<u8>,
}

impl Attachment {
    #[must_use]
    pub fn new(filename: impl Into<String>, content_type: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            filename: filename.into(),
            content_type: content_type.into(),
            data,
        }
    }

    /// Reads an attachment from disk, guessing its content type from the extension.
    ///
    /// # Errors
    ///
    /// Returns an error if the path has no usable file name or cannot be read.
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| {
                ClientError::InvalidMessage(format!("Invalid filename: {}", path.display()))
            })?
            .to_string();

        let data = tokio::fs::read(path).await.map_err(|e| {
            ClientError::InvalidMessage(format!("Failed to read file {}: {e}", path.display()))
        })?;

        Ok(Self::new(filename, guess_content_type(path), data))
    }
}

/// Builder for a single outgoing message.
///
/// # Examples
///
/// ```
/// use mailsift_smtp::client::MessageBuilder;
///
/// let message = MessageBuilder::new()
///     .from("sender@example.com")
///     .to("recipient@example.com")
///     .subject("Hello")
///     .body("Plain text")
///     .html("<p>Rich text</p>")
///     .build()
///     .unwrap();
///
/// assert!(message.contains("multipart/alternative"));
/// ```
#[derive(Debug, Clone, Default)]
pub struct MessageBuilder {
    from: Option<String>,
    to: Vec<String>,
    subject: Option<String>,
    headers: Vec<(String, String)>,
    body: Option<String>,
    html: Option<String>,
    attachments: Vec<Attachment>,
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
    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    /// Adds a custom header. Headers are emitted in insertion order.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Sets the plain-text body.
    #[must_use]
    pub fn body(mut self, content: impl Into<String>) -> Self {
        self.body = Some(content.into());
        self
    }

    /// Sets an HTML alternative to the plain-text body.
    #[must_use]
    pub fn html(mut self, content: impl Into<String>) -> Self {
        self.html = Some(content.into());
        self
    }

    #[must_use]
    pub fn attach(mut self, attachment: Attachment) -> Self {
        self.attachments.push(attachment);
        self
    }

    #[must_use]
    pub fn attach_all(mut self, attachments: impl IntoIterator<Item = Attachment>) -> Self {
        self.attachments.extend(attachments);
        self
    }

    /// Renders the message with CRLF line endings.
    ///
    /// # Errors
    ///
    /// Returns an error if there is no sender or no recipient.
    pub fn build(self) -> Result<String> {
        let from = self
            .from
            .as_deref()
            .ok_or_else(|| ClientError::InvalidMessage("Missing From address".to_string()))?;
        if self.to.is_empty() {
            return Err(ClientError::InvalidMessage(
                "Missing To address".to_string(),
            ));
        }

        let mut message = String::with_capacity(2048);

        push_header(&mut message, "From", from)?;
        push_header(&mut message, "To", &self.to.join(", "))?;
        if let Some(subject) = &self.subject {
            push_header(&mut message, "Subject", &encode_header_value(subject))?;
        }
        push_header(&mut message, "Date", &chrono::Utc::now().to_rfc2822())?;
        for (name, value) in &self.headers {
            push_header(&mut message, name, value)?;
        }
        push_header(&mut message, "MIME-Version", "1.0")?;

        if self.attachments.is_empty() {
            self.write_body(&mut message)?;
            return Ok(message);
        }

        let boundary = generate_boundary();
        push_header(
            &mut message,
            "Content-Type",
            &format!("multipart/mixed; boundary=\"{boundary}\""),
        )?;
        message.push_str("\r\n");

        let _ = write!(&mut message, "--{boundary}\r\n");
        self.write_body(&mut message)?;
        message.push_str("\r\n");

        for attachment in &self.attachments {
            let _ = write!(&mut message, "--{boundary}\r\n");
            push_header(&mut message, "Content-Type", &attachment.content_type)?;
            push_header(&mut message, "Content-Transfer-Encoding", "base64")?;
            push_header(
                &mut message,
                "Content-Disposition",
                &format!("attachment; filename=\"{}\"", attachment.filename),
            )?;
            message.push_str("\r\n");
            message.push_str(&base64_wrapped(&attachment.data));
        }

        let _ = write!(&mut message, "--{boundary}--\r\n");
        Ok(message)
    }

    /// Writes the body entity (headers included): plain text, or an
    /// alternative of text and HTML.
    fn write_body(&self, message: &mut String) -> Result<()> {
        let text = self.body.as_deref().unwrap_or_default();

        let Some(html) = &self.html else {
            push_header(message, "Content-Type", "text/plain; charset=utf-8")?;
            push_header(message, "Content-Transfer-Encoding", "8bit")?;
            message.push_str("\r\n");
            message.push_str(&normalize_newlines(text));
            return Ok(());
        };

        let boundary = generate_boundary();
        push_header(
            message,
            "Content-Type",
            &format!("multipart/alternative; boundary=\"{boundary}\""),
        )?;
        message.push_str("\r\n");

        for (content_type, content) in [("text/plain", text), ("text/html", html.as_str())] {
            let _ = write!(message, "--{boundary}\r\n");
            push_header(message, "Content-Type", &format!("{content_type}; charset=utf-8"))?;
            push_header(message, "Content-Transfer-Encoding", "8bit")?;
            message.push_str("\r\n");
            message.push_str(&normalize_newlines(content));
            message.push_str("\r\n");
        }

        let _ = write!(message, "--{boundary}--\r\n");
        Ok(())
    }
}

fn push_header(message: &mut String, name: &str, value: &str) -> Result<()> {
    if value.contains(['\r', '\n']) {
        return Err(ClientError::InvalidMessage(format!(
            "Header {name} contains a line break"
        )));
    }
    let _ = write!(message, "{name}: {value}\r\n");
    Ok(())
}

/// RFC 2047 encoded-word for non-ASCII header values.
fn encode_header_value(value: &str) -> String {
    if value.is_ascii() {
        value.to_string()
    } else {
        format!("=?utf-8?B?{}?=", STANDARD.encode(value))
    }
}

fn normalize_newlines(text: &str) -> String {
    text.replace("\r\n", "\n").replace('\n', "\r\n")
}

fn generate_boundary() -> String {
    format!("----=_Part_{}", ulid::Ulid::new())
}

/// Base64 with CRLF line wrapping.
fn base64_wrapped(data: &[u8]) -> String {
    let encoded = STANDARD.encode(data);
    let mut wrapped = String::with_capacity(encoded.len() + encoded.len() / BASE64_LINE_LEN * 2 + 2);

    // Base64 output is pure ASCII, so byte chunks are valid str slices.
    for chunk in encoded.as_bytes().chunks(BASE64_LINE_LEN) {
        wrapped.push_str(std::str::from_utf8(chunk).unwrap_or_default());
        wrapped.push_str("\r\n");
    }

    wrapped
}

/// Guesses the MIME content type based on file extension.
fn guess_content_type(path: &Path) -> String {
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("");

    match extension.to_lowercase().as_str() {
        "txt" => "text/plain",
        "csv" => "text/csv",
        "html" | "htm" => "text/html",
        "pdf" => "application/pdf",
        "doc" => "application/msword",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "xlsx" => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "zip" => "application/zip",
        "json" => "application/json",
        _ => "application/octet-stream",
    }
    .to_string()
}
