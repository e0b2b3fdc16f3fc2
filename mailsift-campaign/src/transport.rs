//! Message submission for campaigns.
//!
//! [`Transport`] is the seam between the dispatcher and the network. The
//! production implementation, [`SmtpTransport`], opens one authenticated SMTP
//! session per message.

use std::{future::Future, time::Duration};

use async_trait::async_trait;
use mailsift_common::internal;
use mailsift_smtp::{Attachment, ClientError, MessageBuilder, Response, SmtpClient};

use crate::{error::SendError, settings::SmtpSettings};

/// A fully personalised message ready for submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMail {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub body: String,
    pub html: Option<String>,
    pub attachments: Vec<Attachment>,
}

impl OutgoingMail {
    /// Renders the RFC 5322 message.
    ///
    /// # Errors
    ///
    /// Returns `SendError::Message` if a header would be malformed.
    pub fn to_message(&self) -> Result<String, SendError> {
        let mut builder = MessageBuilder::new()
            .from(&self.from)
            .to(&self.to)
            .subject(&self.subject)
            .body(&self.body)
            .attach_all(self.attachments.iter().cloned());

        if let Some(html) = &self.html {
            builder = builder.html(html);
        }

        builder
            .build()
            .map_err(|err| SendError::Message(err.to_string()))
    }
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// Submits one message.
    ///
    /// # Errors
    ///
    /// Returns `SendError` when the message was not accepted.
    async fn send(&self, mail: &OutgoingMail) -> Result<(), SendError>;

    /// Connects, negotiates TLS and authenticates, without sending anything.
    ///
    /// # Errors
    ///
    /// Returns `SendError` describing the first step that failed.
    async fn test_connection(&self) -> Result<(), SendError>;
}

pub struct SmtpTransport {
    settings: SmtpSettings,
}

impl SmtpTransport {
    #[must_use]
    pub const fn new(settings: SmtpSettings) -> Self {
        Self { settings }
    }

    #[must_use]
    pub const fn settings(&self) -> &SmtpSettings {
        &self.settings
    }

    /// Connect, greeting, EHLO, optional STARTTLS and AUTH.
    async fn open(&self) -> Result<SmtpClient, SendError> {
        let settings = &self.settings;
        let timeouts = settings.timeouts;
        let addr = settings.address();

        let mut client = if settings.use_ssl {
            step(
                "connect",
                timeouts.connect(),
                SmtpClient::connect_tls(&addr, settings.server.clone(), settings.accept_invalid_certs),
            )
            .await?
        } else {
            step(
                "connect",
                timeouts.connect(),
                SmtpClient::connect(&addr, settings.server.clone()),
            )
            .await?
            .accept_invalid_certs(settings.accept_invalid_certs)
        };

        let greeting = step("greeting", timeouts.command(), client.read_greeting()).await?;
        expect("greeting", &greeting, |reply| reply.code == 220)?;

        let mut ehlo = step("EHLO", timeouts.command(), client.ehlo(&settings.helo_name)).await?;
        expect("EHLO", &ehlo, |reply| reply.code == 250)?;

        if settings.use_tls && !client.is_tls() {
            if !ehlo.has_capability("STARTTLS") {
                return Err(SendError::TlsUnavailable);
            }

            let reply = step("STARTTLS", timeouts.command(), client.starttls()).await?;
            expect("STARTTLS", &reply, |reply| reply.code == 220)?;

            // Capabilities may change once the channel is encrypted.
            ehlo = step("EHLO", timeouts.command(), client.ehlo(&settings.helo_name)).await?;
            expect("EHLO", &ehlo, |reply| reply.code == 250)?;
        }

        if let Some(username) = &settings.username {
            let password = settings.password.as_deref().unwrap_or_default();
            let mechanisms = ehlo.capability_params("AUTH");

            if !mechanisms.iter().any(|m| m == "PLAIN") && mechanisms.iter().any(|m| m == "LOGIN") {
                step("AUTH", timeouts.command(), client.auth_login(username, password)).await?;
            } else {
                step("AUTH", timeouts.command(), client.auth_plain(username, password)).await?;
            }
            internal!(level = DEBUG, "Authenticated to {addr} as {username}");
        }

        Ok(client)
    }

    async fn close(&self, client: &mut SmtpClient) {
        let _ = tokio::time::timeout(self.settings.timeouts.quit(), client.quit()).await;
    }
}

#[async_trait]
impl Transport for SmtpTransport {
    async fn send(&self, mail: &OutgoingMail) -> Result<(), SendError> {
        let message = mail.to_message()?;
        let timeouts = self.settings.timeouts;
        let mut client = self.open().await?;

        let reply = step("MAIL FROM", timeouts.command(), client.mail_from(&mail.from)).await?;
        expect("MAIL FROM", &reply, Response::is_success)?;

        let reply = step("RCPT TO", timeouts.command(), client.rcpt_to(&mail.to)).await?;
        expect("RCPT TO", &reply, Response::is_success)?;

        let reply = step("DATA", timeouts.command(), client.data()).await?;
        expect("DATA", &reply, |reply| reply.code == 354)?;

        let reply = step("message", timeouts.data(), client.send_data(&message)).await?;
        expect("message", &reply, Response::is_success)?;

        self.close(&mut client).await;
        Ok(())
    }

    async fn test_connection(&self) -> Result<(), SendError> {
        let mut client = self.open().await?;
        self.close(&mut client).await;
        Ok(())
    }
}

fn expect(
    stage: &'static str,
    reply: &Response,
    accept: impl Fn(&Response) -> bool,
) -> Result<(), SendError> {
    if accept(reply) {
        Ok(())
    } else {
        Err(SendError::Rejected {
            stage,
            code: reply.code,
            message: reply.message(),
        })
    }
}

async fn step<T>(
    stage: &'static str,
    timeout: Duration,
    action: impl Future<Output = Result<T, ClientError>>,
) -> Result<T, SendError> {
    match tokio::time::timeout(timeout, action).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(ClientError::SmtpError { code, message })) => Err(SendError::Rejected {
            stage,
            code,
            message,
        }),
        Ok(Err(source)) => Err(SendError::Client { stage, source }),
        Err(_) => Err(SendError::Timeout { stage, timeout }),
    }
}
