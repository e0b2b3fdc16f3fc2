//! TLS configuration for outbound SMTP sessions.

use serde::{Deserialize, Serialize};

/// How STARTTLS is negotiated on a plaintext session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TlsPolicy {
    /// Upgrade when the server advertises STARTTLS, continue in plaintext otherwise.
    #[default]
    Opportunistic,

    /// Treat a session as failed when STARTTLS is missing or refused.
    Required,

    /// Never issue STARTTLS.
    ///
    /// **WARNING**: Only use for testing against local servers.
    Disabled,
}

/// Policy plus certificate validation for one kind of session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct TlsConfig {
    #[serde(default)]
    pub policy: TlsPolicy,

    /// Accept self-signed, expired or mismatched certificates.
    ///
    /// Recipient probes never carry message content, so this is mostly useful
    /// against mail exchangers with broken certificate chains.
    ///
    /// Default: `false`
    #[serde(default)]
    pub accept_invalid_certs: bool,
}

impl TlsConfig {
    #[must_use]
    pub const fn new(policy: TlsPolicy) -> Self {
        Self {
            policy,
            accept_invalid_certs: false,
        }
    }

    #[must_use]
    pub const fn required() -> Self {
        Self::new(TlsPolicy::Required)
    }

    #[must_use]
    pub const fn disabled() -> Self {
        Self::new(TlsPolicy::Disabled)
    }

    #[must_use]
    pub const fn with_invalid_certs(mut self, accept: bool) -> Self {
        self.accept_invalid_certs = accept;
        self
    }

    #[must_use]
    pub const fn is_required(&self) -> bool {
        matches!(self.policy, TlsPolicy::Required)
    }

    #[must_use]
    pub const fn is_disabled(&self) -> bool {
        matches!(self.policy, TlsPolicy::Disabled)
    }
}
