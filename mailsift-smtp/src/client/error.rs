use std::io;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("I/O failure: {0}")]
    Io(#[from] io::Error),

    /// The server sent something that is not an SMTP reply.
    #[error("malformed reply: {0}")]
    ParseError(String),

    /// A 4xx or 5xx reply where a positive one was required.
    #[error("server replied {code}: {message}")]
    SmtpError { code: u16, message: String },

    #[error("TLS negotiation failed: {0}")]
    TlsError(String),

    #[error("message could not be built: {0}")]
    InvalidMessage(String),

    #[error("server closed the connection")]
    ConnectionClosed,

    #[error("reply is not valid UTF-8: {0}")]
    Utf8Error(#[from] std::str::Utf8Error),
}

impl ClientError {
    /// The reply code, for errors that carry one.
    #[must_use]
    pub const fn code(&self) -> Option<u16> {
        match self {
            Self::SmtpError { code, .. } => Some(*code),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;
