use std::time::Duration;

use mailsift_smtp::ClientError;
use thiserror::Error;

/// Why an SMTP probe against a single exchanger did not produce a reply.
#[derive(Debug, Error)]
pub enum ProbeError {
    /// The exchanger answered the connection with a 550.
    #[error("{server} refused the connection: {code} {message}")]
    Refused {
        server: String,
        code: u16,
        message: String,
    },

    #[error("{server} rejected {stage}: {code} {message}")]
    Rejected {
        server: String,
        stage: &'static str,
        code: u16,
        message: String,
    },

    #[error("{server} timed out during {stage} after {timeout:?}")]
    Timeout {
        server: String,
        stage: &'static str,
        timeout: Duration,
    },

    #[error("{0} does not offer STARTTLS")]
    TlsUnavailable(String),

    #[error("{server}: {source}")]
    Transport {
        server: String,
        #[source]
        source: ClientError,
    },
}

impl ProbeError {
    /// A refusal is authoritative: the mailbox is treated as nonexistent.
    #[must_use]
    pub const fn is_refusal(&self) -> bool {
        match self {
            Self::Refused { .. } => true,
            Self::Rejected { code, .. } => *code == 550,
            Self::Transport { source, .. } => matches!(source.code(), Some(550)),
            _ => false,
        }
    }
}

#[derive(Debug, Error)]
pub enum VerifyError {
    #[error("Invalid verifier configuration: {0}")]
    Configuration(String),

    /// A pipeline task failed without producing a result.
    #[error("Verification pipeline for {address} failed: {reason}")]
    Pipeline { address: String, reason: String },
}
