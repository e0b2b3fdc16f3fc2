use core::fmt;
use std::time::Duration;

use mailsift_common::config::ClientTimeouts;
use serde::{Deserialize, Serialize};

use crate::error::CampaignError;

/// Outbound SMTP account and pacing for a campaign.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct SmtpSettings {
    #[serde(default)]
    pub server: String,

    #[serde(default = "defaults::port")]
    pub port: u16,

    /// Upgrade a plaintext session with STARTTLS.
    #[serde(default = "defaults::use_tls")]
    pub use_tls: bool,

    /// TLS from the first byte (SMTPS). Takes precedence over `use_tls`.
    #[serde(default)]
    pub use_ssl: bool,

    #[serde(default)]
    pub username: Option<String>,

    #[serde(default)]
    pub password: Option<String>,

    /// `From` address. Defaults to the username.
    #[serde(default)]
    pub sender: Option<String>,

    /// Name announced in `EHLO`.
    #[serde(default = "defaults::helo_name")]
    pub helo_name: String,

    #[serde(default = "defaults::rate_per_minute")]
    pub rate_per_minute: u32,

    /// Explicit pause between messages, overriding `rate_per_minute`.
    #[serde(default)]
    pub delay_between_secs: Option<f64>,

    #[serde(default)]
    pub timeouts: ClientTimeouts,

    #[serde(default)]
    pub accept_invalid_certs: bool,
}

mod defaults {
    pub const fn port() -> u16 {
        587
    }

    pub const fn use_tls() -> bool {
        true
    }

    pub fn helo_name() -> String {
        "localhost".to_string()
    }

    pub const fn rate_per_minute() -> u32 {
        60
    }
}

impl Default for SmtpSettings {
    fn default() -> Self {
        Self {
            server: String::new(),
            port: defaults::port(),
            use_tls: defaults::use_tls(),
            use_ssl: false,
            username: None,
            password: None,
            sender: None,
            helo_name: defaults::helo_name(),
            rate_per_minute: defaults::rate_per_minute(),
            delay_between_secs: None,
            timeouts: ClientTimeouts::default(),
            accept_invalid_certs: false,
        }
    }
}

impl fmt::Debug for SmtpSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SmtpSettings")
            .field("server", &self.server)
            .field("port", &self.port)
            .field("use_tls", &self.use_tls)
            .field("use_ssl", &self.use_ssl)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("sender", &self.sender)
            .field("rate_per_minute", &self.rate_per_minute)
            .field("delay_between_secs", &self.delay_between_secs)
            .finish_non_exhaustive()
    }
}

impl SmtpSettings {
    /// `host:port` for the TCP connection.
    #[must_use]
    pub fn address(&self) -> String {
        format!("{}:{}", self.server, self.port)
    }

    /// The envelope and header sender.
    #[must_use]
    pub fn from_address(&self) -> Option<&str> {
        self.sender.as_deref().or(self.username.as_deref())
    }

    /// Pause between consecutive messages: the explicit delay if set,
    /// otherwise `60 / rate_per_minute` seconds. A delay that [`validate`]
    /// would reject yields zero.
    ///
    /// [`validate`]: Self::validate
    #[must_use]
    pub fn delay_between(&self) -> Duration {
        self.delay_between_secs.map_or_else(
            || Duration::from_secs_f64(60.0 / f64::from(self.rate_per_minute.max(1))),
            |secs| Duration::try_from_secs_f64(secs).unwrap_or_default(),
        )
    }

    /// # Errors
    ///
    /// Returns `CampaignError::Configuration` naming the first problem found.
    pub fn validate(&self) -> Result<(), CampaignError> {
        let invalid = |reason: &str| Err(CampaignError::Configuration(reason.to_string()));

        if self.server.trim().is_empty() {
            return invalid("server must not be empty");
        }
        if self.port == 0 {
            return invalid("port must not be 0");
        }
        if self.username.is_some() && self.password.is_none() {
            return invalid("username is set but password is missing");
        }
        if self.from_address().is_none() {
            return invalid("either sender or username must be set");
        }
        match self.delay_between_secs {
            // Rejects NaN, negatives and values too large for a `Duration`.
            Some(secs) if Duration::try_from_secs_f64(secs).is_err() => {
                return invalid("delay_between_secs must be a non-negative number of seconds");
            }
            None if self.rate_per_minute == 0 => {
                return invalid("rate_per_minute must be at least 1");
            }
            _ => {}
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn valid() -> SmtpSettings {
        SmtpSettings {
            server: "smtp.example.com".to_string(),
            username: Some("me@example.com".to_string()),
            password: Some("hunter2".to_string()),
            ..SmtpSettings::default()
        }
    }

    #[test]
    fn test_defaults() {
        let settings: SmtpSettings = ron::from_str("(server: \"smtp.example.com\")").unwrap();
        assert_eq!(settings.port, 587);
        assert!(settings.use_tls);
        assert!(!settings.use_ssl);
        assert_eq!(settings.rate_per_minute, 60);
        assert_eq!(settings.timeouts, ClientTimeouts::default());
    }

    #[test]
    fn test_delay_between() {
        let mut settings = valid();
        assert_eq!(settings.delay_between(), Duration::from_secs(1));

        settings.rate_per_minute = 120;
        assert_eq!(settings.delay_between(), Duration::from_millis(500));

        settings.delay_between_secs = Some(2.5);
        assert_eq!(settings.delay_between(), Duration::from_millis(2500));
    }

    #[test]
    fn test_validate() {
        assert!(valid().validate().is_ok());

        let cases = [
            SmtpSettings {
                server: String::new(),
                ..valid()
            },
            SmtpSettings { port: 0, ..valid() },
            SmtpSettings {
                password: None,
                ..valid()
            },
            SmtpSettings {
                rate_per_minute: 0,
                ..valid()
            },
            SmtpSettings {
                delay_between_secs: Some(-1.0),
                ..valid()
            },
            SmtpSettings {
                username: None,
                password: None,
                ..valid()
            },
        ];

        for settings in cases {
            assert!(
                matches!(settings.validate(), Err(CampaignError::Configuration(_))),
                "{settings:?}"
            );
        }
    }

    #[test]
    fn test_unrepresentable_delay_rejected() {
        for secs in [f64::NAN, f64::INFINITY, 1e30, -0.5] {
            let settings = SmtpSettings {
                delay_between_secs: Some(secs),
                ..valid()
            };
            assert!(
                matches!(settings.validate(), Err(CampaignError::Configuration(_))),
                "{secs}"
            );
        }

        let settings = SmtpSettings {
            delay_between_secs: Some(86_400.0 * 365.0),
            ..valid()
        };
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_zero_rate_allowed_with_explicit_delay() {
        let settings = SmtpSettings {
            rate_per_minute: 0,
            delay_between_secs: Some(0.0),
            ..valid()
        };
        assert!(settings.validate().is_ok());
        assert_eq!(settings.delay_between(), Duration::ZERO);
    }

    #[test]
    fn test_debug_redacts_password() {
        let rendered = format!("{:?}", valid());
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("<redacted>"));
    }
}
