use core::fmt::{self, Display, Formatter};
use std::{str::FromStr, time::Duration};

use mailsift_common::{ProbeStatus, VerificationStatus};
use serde::{Deserialize, Serialize};

use crate::{dns::DnsConfig, probe::ProbeConfig};

/// SMTP probing strategy.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbeMode {
    /// One exchanger, `HELO` then `RCPT TO` with no sender.
    #[default]
    Fast,
    /// Up to two exchangers, full `EHLO`/`STARTTLS`/`MAIL FROM` handshake.
    Standard,
}

impl Display for ProbeMode {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> fmt::Result {
        fmt.write_str(match self {
            Self::Fast => "fast",
            Self::Standard => "standard",
        })
    }
}

impl FromStr for ProbeMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "fast" => Ok(Self::Fast),
            "standard" => Ok(Self::Standard),
            other => Err(format!("unknown probe mode '{other}'")),
        }
    }
}

/// How far down the pipeline each address travels.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckDepth {
    /// Format only.
    Syntax,
    /// Format and MX.
    Mx,
    #[default]
    Full,
}

/// The classification of one submitted address.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct VerificationResult {
    #[serde(rename = "email")]
    pub address: String,
    pub format: bool,
    pub mx: bool,
    pub ping: VerificationStatus,
    pub status: VerificationStatus,
}

impl VerificationResult {
    /// A result that has not passed any stage yet.
    #[must_use]
    pub const fn new(address: String) -> Self {
        Self {
            address,
            format: false,
            mx: false,
            ping: VerificationStatus::Invalid,
            status: VerificationStatus::Invalid,
        }
    }

    #[must_use]
    pub const fn cancelled(address: String) -> Self {
        Self {
            address,
            format: false,
            mx: false,
            ping: VerificationStatus::Cancelled,
            status: VerificationStatus::Cancelled,
        }
    }

    #[must_use]
    pub const fn error(address: String) -> Self {
        Self {
            address,
            format: false,
            mx: false,
            ping: VerificationStatus::Error,
            status: VerificationStatus::Error,
        }
    }

    /// Records the probe outcome as both `ping` and the final status.
    #[must_use]
    pub fn with_probe(mut self, outcome: ProbeStatus) -> Self {
        self.ping = outcome.into();
        self.status = self.ping;
        self
    }
}

/// Options for one batch run.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct VerifyOptions {
    pub max_workers: usize,
    pub mode: ProbeMode,
    /// Per-probe SMTP timeout.
    pub timeout: Duration,
    pub depth: CheckDepth,
}

impl Default for VerifyOptions {
    fn default() -> Self {
        Self {
            max_workers: defaults::workers(),
            mode: ProbeMode::Fast,
            timeout: Duration::from_secs(defaults::timeout_secs()),
            depth: CheckDepth::Full,
        }
    }
}

/// File-backed verifier configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VerifierConfig {
    pub workers: Option<usize>,
    pub mode: ProbeMode,
    pub timeout_secs: Option<u64>,
    pub depth: CheckDepth,
    pub probe: ProbeConfig,
    pub dns: DnsConfig,
}

impl VerifierConfig {
    #[must_use]
    pub fn options(&self) -> VerifyOptions {
        VerifyOptions {
            max_workers: self.workers.unwrap_or_else(defaults::workers),
            mode: self.mode,
            timeout: Duration::from_secs(self.timeout_secs.unwrap_or_else(defaults::timeout_secs)),
            depth: self.depth,
        }
    }
}

mod defaults {
    pub const fn workers() -> usize {
        20
    }

    pub const fn timeout_secs() -> u64 {
        5
    }
}
