use std::time::Duration;

use mailsift_smtp::ClientError;
use thiserror::Error;

/// Failure to deliver one message. Recorded as a `failure` outcome; the
/// campaign carries on with the next target.
#[derive(Debug, Error)]
pub enum SendError {
    #[error("{stage} failed: {source}")]
    Client {
        stage: &'static str,
        #[source]
        source: ClientError,
    },

    #[error("server rejected {stage}: {code} {message}")]
    Rejected {
        stage: &'static str,
        code: u16,
        message: String,
    },

    #[error("{stage} timed out after {timeout:?}")]
    Timeout {
        stage: &'static str,
        timeout: Duration,
    },

    #[error("server does not support STARTTLS")]
    TlsUnavailable,

    #[error("invalid message: {0}")]
    Message(String),
}

#[derive(Debug, Error)]
pub enum CampaignError {
    #[error("a campaign is already being sent")]
    AlreadySending,

    #[error("invalid SMTP settings: {0}")]
    Configuration(String),
}
