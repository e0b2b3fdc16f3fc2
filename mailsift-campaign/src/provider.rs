use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::settings::SmtpSettings;

/// Well-known submission endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    Gmail,
    /// Gmail over implicit TLS on 465.
    GmailSsl,
    Outlook,
    Yahoo,
    Custom {
        server: String,
        port: u16,
        use_tls: bool,
        use_ssl: bool,
    },
}

impl Provider {
    pub const DEFAULT_RATE_PER_MINUTE: u32 = 60;

    #[must_use]
    pub fn server(&self) -> &str {
        match self {
            Self::Gmail | Self::GmailSsl => "smtp.gmail.com",
            Self::Outlook => "smtp-mail.outlook.com",
            Self::Yahoo => "smtp.mail.yahoo.com",
            Self::Custom { server, .. } => server,
        }
    }

    #[must_use]
    pub const fn port(&self) -> u16 {
        match self {
            Self::GmailSsl => 465,
            Self::Gmail | Self::Outlook | Self::Yahoo => 587,
            Self::Custom { port, .. } => *port,
        }
    }

    #[must_use]
    pub const fn use_tls(&self) -> bool {
        match self {
            Self::GmailSsl => false,
            Self::Gmail | Self::Outlook | Self::Yahoo => true,
            Self::Custom { use_tls, .. } => *use_tls,
        }
    }

    #[must_use]
    pub const fn use_ssl(&self) -> bool {
        match self {
            Self::GmailSsl => true,
            Self::Gmail | Self::Outlook | Self::Yahoo => false,
            Self::Custom { use_ssl, .. } => *use_ssl,
        }
    }

    /// Settings for this provider with the given account.
    #[must_use]
    pub fn settings(&self, username: impl Into<String>, password: impl Into<String>) -> SmtpSettings {
        SmtpSettings {
            server: self.server().to_string(),
            port: self.port(),
            use_tls: self.use_tls(),
            use_ssl: self.use_ssl(),
            username: Some(username.into()),
            password: Some(password.into()),
            rate_per_minute: Self::DEFAULT_RATE_PER_MINUTE,
            ..SmtpSettings::default()
        }
    }

    /// Overlays the provider's endpoint onto existing settings.
    pub fn apply(&self, settings: &mut SmtpSettings) {
        settings.server = self.server().to_string();
        settings.port = self.port();
        settings.use_tls = self.use_tls();
        settings.use_ssl = self.use_ssl();
    }
}

impl FromStr for Provider {
    type Err = String;

    /// Parses the named presets. `Custom` has no name; build it directly.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "gmail" => Ok(Self::Gmail),
            "gmail_ssl" => Ok(Self::GmailSsl),
            "outlook" => Ok(Self::Outlook),
            "yahoo" => Ok(Self::Yahoo),
            other => Err(format!(
                "unknown provider '{other}' (expected gmail, gmail_ssl, outlook or yahoo)"
            )),
        }
    }
}
