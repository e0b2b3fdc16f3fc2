//! SMTP recipient probing.
//!
//! A probe opens a session with a mail exchanger for the address's domain and
//! asks whether it would accept the recipient, without ever sending `DATA`.
//! Only an explicit 550 is taken as proof the mailbox does not exist; every
//! other failure leaves the address `risky`.

use std::{future::Future, sync::Arc, time::Duration};

use mailsift_common::{ProbeStatus, config::TlsConfig, config::TlsPolicy, internal};
use mailsift_smtp::{ClientError, Response, SmtpClient};
use serde::{Deserialize, Serialize};

use crate::{
    dns::{LookupBudget, LookupBudgets, MailExchangerLookup, MailServer},
    error::ProbeError,
    types::ProbeMode,
};

/// Standard mode never waits less than this for a step.
pub const STANDARD_MIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Exchangers attempted by standard mode, in preference order.
pub const STANDARD_MAX_EXCHANGERS: usize = 2;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeConfig {
    /// Name announced in `HELO`/`EHLO`.
    #[serde(default = "defaults::helo_name")]
    pub helo_name: String,

    /// Envelope sender used by standard mode.
    #[serde(default = "defaults::probe_sender")]
    pub probe_sender: String,

    /// STARTTLS handling for standard mode. Fast mode never negotiates TLS.
    #[serde(default = "defaults::tls")]
    pub tls: TlsConfig,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            helo_name: defaults::helo_name(),
            probe_sender: defaults::probe_sender(),
            tls: defaults::tls(),
        }
    }
}

mod defaults {
    use mailsift_common::config::TlsConfig;

    pub fn helo_name() -> String {
        "test.com".to_string()
    }

    pub fn probe_sender() -> String {
        "test@test.com".to_string()
    }

    pub const fn tls() -> TlsConfig {
        TlsConfig::required()
    }
}

pub struct Prober {
    resolver: Arc<dyn MailExchangerLookup>,
    config: ProbeConfig,
    budgets: LookupBudgets,
}

impl Prober {
    #[must_use]
    pub fn new(resolver: Arc<dyn MailExchangerLookup>, config: ProbeConfig) -> Self {
        Self {
            resolver,
            config,
            budgets: LookupBudgets::default(),
        }
    }

    #[must_use]
    pub const fn with_budgets(mut self, budgets: LookupBudgets) -> Self {
        self.budgets = budgets;
        self
    }

    #[must_use]
    pub const fn config(&self) -> &ProbeConfig {
        &self.config
    }

    /// Probes `address` in the given mode.
    ///
    /// Never fails: unresolvable domains and refusals are `Invalid`, anything
    /// inconclusive is `Risky`.
    pub async fn probe(&self, address: &str, mode: ProbeMode, timeout: Duration) -> ProbeStatus {
        let Some((_, domain)) = address.rsplit_once('@') else {
            return ProbeStatus::Invalid;
        };

        match mode {
            ProbeMode::Fast => self.probe_fast(address, domain, timeout).await,
            ProbeMode::Standard => self.probe_standard(address, domain, timeout).await,
        }
    }

    async fn exchangers(&self, domain: &str, budget: LookupBudget) -> Option<Arc<Vec<MailServer>>> {
        match self.resolver.resolve(domain, budget).await {
            Ok(servers) if !servers.is_empty() => Some(servers),
            Ok(_) => None,
            Err(err) => {
                internal!(level = DEBUG, "No exchanger for {domain}: {err}");
                None
            }
        }
    }

    async fn probe_fast(&self, address: &str, domain: &str, timeout: Duration) -> ProbeStatus {
        let Some(servers) = self.exchangers(domain, self.budgets.fast_probe).await else {
            return ProbeStatus::Invalid;
        };
        let Some(server) = servers.first() else {
            return ProbeStatus::Invalid;
        };

        match self.fast_session(server, address, timeout).await {
            Ok(code) => ProbeStatus::from_reply(code),
            Err(err) if err.is_refusal() => {
                internal!(level = DEBUG, "{address}: {err}");
                ProbeStatus::Invalid
            }
            Err(err) => {
                internal!(level = DEBUG, "{address}: {err}");
                ProbeStatus::Risky
            }
        }
    }

    /// `HELO`, then `RCPT TO` with no envelope sender. Returns the RCPT reply code.
    async fn fast_session(
        &self,
        server: &MailServer,
        address: &str,
        timeout: Duration,
    ) -> Result<u16, ProbeError> {
        let mut client = open(server, timeout, false).await?;
        let addr = server.address();

        bounded(&addr, "HELO", timeout, client.helo(&self.config.helo_name)).await?;
        let rcpt = bounded(&addr, "RCPT TO", timeout, client.rcpt_to(address)).await?;
        close(&mut client, timeout).await;

        Ok(rcpt.code)
    }

    async fn probe_standard(&self, address: &str, domain: &str, timeout: Duration) -> ProbeStatus {
        let timeout = timeout.max(STANDARD_MIN_TIMEOUT);
        let Some(servers) = self.exchangers(domain, self.budgets.standard_probe).await else {
            return ProbeStatus::Invalid;
        };

        for server in servers.iter().take(STANDARD_MAX_EXCHANGERS) {
            match self.standard_session(server, address, timeout).await {
                Ok(code) => return ProbeStatus::from_reply(code),
                Err(err) if err.is_refusal() => {
                    internal!(level = DEBUG, "{address}: {err}");
                    return ProbeStatus::Invalid;
                }
                Err(err) => {
                    internal!(level = DEBUG, "{address}: {err}, trying next exchanger");
                }
            }
        }

        ProbeStatus::Risky
    }

    /// Full handshake against one exchanger. Returns the RCPT reply code.
    async fn standard_session(
        &self,
        server: &MailServer,
        address: &str,
        timeout: Duration,
    ) -> Result<u16, ProbeError> {
        let tls = self.config.tls;
        let mut client = open(server, timeout, tls.accept_invalid_certs).await?;
        let addr = server.address();

        let ehlo = bounded(&addr, "EHLO", timeout, client.ehlo(&self.config.helo_name)).await?;
        let offers_tls = ehlo.has_capability("STARTTLS");

        match tls.policy {
            TlsPolicy::Disabled => {}
            TlsPolicy::Opportunistic if !offers_tls => {}
            TlsPolicy::Required if !offers_tls => {
                close(&mut client, timeout).await;
                return Err(ProbeError::TlsUnavailable(addr));
            }
            policy => {
                let reply = bounded(&addr, "STARTTLS", timeout, client.starttls()).await?;
                if reply.code != 220 && (policy == TlsPolicy::Required || reply.code == 550) {
                    close(&mut client, timeout).await;
                    return Err(rejected(&addr, "STARTTLS", &reply));
                }
            }
        }

        bounded(&addr, "HELO", timeout, client.helo(&self.config.helo_name)).await?;

        // The sender reply is not classified; the recipient reply decides.
        bounded(
            &addr,
            "MAIL FROM",
            timeout,
            client.mail_from(&self.config.probe_sender),
        )
        .await?;

        let rcpt = bounded(&addr, "RCPT TO", timeout, client.rcpt_to(address)).await?;
        close(&mut client, timeout).await;

        Ok(rcpt.code)
    }
}

/// Connects and checks the greeting. A 550 greeting is a refusal.
async fn open(
    server: &MailServer,
    timeout: Duration,
    accept_invalid_certs: bool,
) -> Result<SmtpClient, ProbeError> {
    let addr = server.address();

    let mut client = bounded(
        &addr,
        "connect",
        timeout,
        SmtpClient::connect(&addr, server.host.clone()),
    )
    .await?
    .accept_invalid_certs(accept_invalid_certs);

    let greeting = bounded(&addr, "greeting", timeout, client.read_greeting()).await?;
    match greeting.code {
        220 => Ok(client),
        550 => Err(ProbeError::Refused {
            server: addr,
            code: greeting.code,
            message: greeting.message(),
        }),
        _ => Err(rejected(&addr, "greeting", &greeting)),
    }
}

/// Best-effort `QUIT`; the outcome is already decided.
async fn close(client: &mut SmtpClient, timeout: Duration) {
    let _ = tokio::time::timeout(timeout, client.quit()).await;
}

async fn bounded<T>(
    server: &str,
    stage: &'static str,
    timeout: Duration,
    step: impl Future<Output = Result<T, ClientError>>,
) -> Result<T, ProbeError> {
    match tokio::time::timeout(timeout, step).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(source)) => Err(ProbeError::Transport {
            server: server.to_string(),
            source,
        }),
        Err(_) => Err(ProbeError::Timeout {
            server: server.to_string(),
            stage,
            timeout,
        }),
    }
}

fn rejected(server: &str, stage: &'static str, reply: &Response) -> ProbeError {
    ProbeError::Rejected {
        server: server.to_string(),
        stage,
        code: reply.code,
        message: reply.message(),
    }
}
