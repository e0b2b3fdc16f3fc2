use core::fmt::{self, Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Classification of a single address after verification.
///
/// The lowercase string forms are part of the output contract: reports and
/// downstream filters key off them.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerificationStatus {
    Valid,
    #[default]
    Invalid,
    Risky,
    Cancelled,
    Error,
}

impl VerificationStatus {
    pub const ALL: [Self; 5] = [
        Self::Valid,
        Self::Invalid,
        Self::Risky,
        Self::Cancelled,
        Self::Error,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Valid => "valid",
            Self::Invalid => "invalid",
            Self::Risky => "risky",
            Self::Cancelled => "cancelled",
            Self::Error => "error",
        }
    }

    /// Addresses worth sending to: confirmed or unconfirmable.
    pub const fn is_sendable(self) -> bool {
        matches!(self, Self::Valid | Self::Risky)
    }
}

impl Display for VerificationStatus {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        fmt.write_str(self.as_str())
    }
}

impl FromStr for VerificationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown verification status '{s}'"))
    }
}

/// Outcome of an SMTP recipient probe.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbeStatus {
    Valid,
    Invalid,
    Risky,
}

impl ProbeStatus {
    /// Maps a `RCPT TO` reply code onto a probe outcome.
    pub const fn from_reply(code: u16) -> Self {
        match code {
            250 => Self::Valid,
            550 => Self::Invalid,
            _ => Self::Risky,
        }
    }
}

impl From<ProbeStatus> for VerificationStatus {
    fn from(value: ProbeStatus) -> Self {
        match value {
            ProbeStatus::Valid => Self::Valid,
            ProbeStatus::Invalid => Self::Invalid,
            ProbeStatus::Risky => Self::Risky,
        }
    }
}

impl Display for ProbeStatus {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        Display::fmt(&VerificationStatus::from(*self), fmt)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod test {
    use super::*;

    #[test]
    fn reply_codes() {
        assert_eq!(ProbeStatus::from_reply(250), ProbeStatus::Valid);
        assert_eq!(ProbeStatus::from_reply(550), ProbeStatus::Invalid);
        assert_eq!(ProbeStatus::from_reply(251), ProbeStatus::Risky);
        assert_eq!(ProbeStatus::from_reply(450), ProbeStatus::Risky);
        assert_eq!(ProbeStatus::from_reply(553), ProbeStatus::Risky);
        assert_eq!(ProbeStatus::from_reply(503), ProbeStatus::Risky);
    }

    #[test]
    fn wire_strings() {
        for status in VerificationStatus::ALL {
            assert_eq!(ron::to_string(&status).unwrap(), status.as_str());
            assert_eq!(status.as_str().parse::<VerificationStatus>().unwrap(), status);
        }

        assert_eq!(VerificationStatus::Cancelled.to_string(), "cancelled");
        assert_eq!(ProbeStatus::Risky.to_string(), "risky");
        assert!("unknown".parse::<VerificationStatus>().is_err());
    }

    #[test]
    fn sendable() {
        assert!(VerificationStatus::Valid.is_sendable());
        assert!(VerificationStatus::Risky.is_sendable());
        assert!(!VerificationStatus::Invalid.is_sendable());
        assert!(!VerificationStatus::Error.is_sendable());
    }
}
