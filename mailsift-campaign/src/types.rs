use std::time::Duration;

use chrono::{DateTime, Utc};
use mailsift_smtp::Attachment;
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// One recipient of a campaign.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignTarget {
    #[serde(rename = "email")]
    pub address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl CampaignTarget {
    #[must_use]
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            name: None,
        }
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Parses `address[,name]`. Blank lines and `#` comments yield `None`.
    #[must_use]
    pub fn parse_line(line: &str) -> Option<Self> {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return None;
        }

        let (address, name) = match line.split_once(',') {
            Some((address, name)) => (address.trim(), Some(name.trim())),
            None => (line, None),
        };

        let target = Self::new(address);
        Some(match name.filter(|name| !name.is_empty()) {
            Some(name) => target.with_name(name),
            None => target,
        })
    }
}

/// Content shared by every message of a campaign.
///
/// `subject`, `body` and `html` may contain `{name}` and `{email}` tokens.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CampaignMessage {
    pub subject: String,
    pub body: String,
    pub html: Option<String>,
    pub attachments: Vec<Attachment>,
}

impl CampaignMessage {
    #[must_use]
    pub fn new(subject: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            body: body.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_html(mut self, html: impl Into<String>) -> Self {
        self.html = Some(html.into());
        self
    }

    #[must_use]
    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.attachments.push(attachment);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SendStatus {
    Success,
    Failure,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendOutcome {
    pub target: CampaignTarget,
    pub status: SendStatus,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl SendOutcome {
    #[must_use]
    pub fn success(target: CampaignTarget) -> Self {
        let message = format!("Email sent successfully to {}", target.address);
        Self::new(target, SendStatus::Success, message)
    }

    #[must_use]
    pub fn failure(target: CampaignTarget, reason: &str) -> Self {
        let message = format!("Failed to send email to {}: {reason}", target.address);
        Self::new(target, SendStatus::Failure, message)
    }

    fn new(target: CampaignTarget, status: SendStatus, message: String) -> Self {
        Self {
            target,
            status,
            message,
            timestamp: Utc::now(),
        }
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == SendStatus::Success
    }
}

/// Running totals for the current (or last) campaign.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignStats {
    pub total_sent: usize,
    pub successful: usize,
    pub failed: usize,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
}

impl CampaignStats {
    #[must_use]
    pub fn started_now() -> Self {
        Self {
            start_time: Some(Utc::now()),
            ..Self::default()
        }
    }

    pub fn record(&mut self, status: SendStatus) {
        self.total_sent += 1;
        match status {
            SendStatus::Success => self.successful += 1,
            SendStatus::Failure => self.failed += 1,
        }
    }

    /// Elapsed time to the end of the campaign, or to now while it runs.
    #[must_use]
    pub fn duration(&self) -> Option<Duration> {
        let start = self.start_time?;
        let end = self.end_time.unwrap_or_else(Utc::now);
        (end - start).to_std().ok()
    }
}

/// Everything known about a campaign once it stops.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignReport {
    pub campaign_id: Ulid,
    pub stats: CampaignStats,
    pub outcomes: Vec<SendOutcome>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum CampaignProgress {
    /// One target has been attempted.
    Sent {
        percent: f64,
        current: usize,
        total: usize,
        outcome: SendOutcome,
    },
    /// The send loop has stopped, for whatever reason.
    Finished { stats: CampaignStats },
}

/// Snapshot of the dispatcher for status displays. Never includes the password.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DispatcherStatus {
    pub is_sending: bool,
    pub cancelled: bool,
    pub stats: CampaignStats,
    pub server: String,
    pub port: u16,
    pub username: Option<String>,
    pub delay_between: Duration,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_parse_target_lines() {
        assert_eq!(
            CampaignTarget::parse_line("  ada@example.com , Ada Lovelace "),
            Some(CampaignTarget::new("ada@example.com").with_name("Ada Lovelace"))
        );
        assert_eq!(
            CampaignTarget::parse_line("bob@example.com"),
            Some(CampaignTarget::new("bob@example.com"))
        );
        assert_eq!(
            CampaignTarget::parse_line("carol@example.com,"),
            Some(CampaignTarget::new("carol@example.com"))
        );
        assert_eq!(CampaignTarget::parse_line("   "), None);
        assert_eq!(CampaignTarget::parse_line("# header"), None);
    }

    #[test]
    fn test_stats_record() {
        let mut stats = CampaignStats::started_now();
        stats.record(SendStatus::Success);
        stats.record(SendStatus::Failure);
        stats.record(SendStatus::Success);

        assert_eq!(
            (stats.total_sent, stats.successful, stats.failed),
            (3, 2, 1)
        );
        assert!(stats.duration().is_some());
        assert_eq!(CampaignStats::default().duration(), None);
    }

    #[test]
    fn test_duration_uses_end_time() {
        let start = Utc::now();
        let stats = CampaignStats {
            start_time: Some(start),
            end_time: Some(start + chrono::TimeDelta::seconds(3)),
            ..CampaignStats::default()
        };
        assert_eq!(stats.duration(), Some(Duration::from_secs(3)));
    }

    #[test]
    fn test_outcome_messages() {
        let target = CampaignTarget::new("ada@example.com");

        let sent = SendOutcome::success(target.clone());
        assert!(sent.is_success());
        assert_eq!(sent.message, "Email sent successfully to ada@example.com");

        let failed = SendOutcome::failure(target, "server rejected RCPT TO: 550 no");
        assert_eq!(failed.status, SendStatus::Failure);
        assert_eq!(
            failed.message,
            "Failed to send email to ada@example.com: server rejected RCPT TO: 550 no"
        );
    }

    #[test]
    fn test_progress_serialization() {
        let event = CampaignProgress::Finished {
            stats: CampaignStats::default(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "finished");
        assert_eq!(json["stats"]["total_sent"], 0);
    }
}
