//! Rendering verification and campaign results for the terminal.

use std::io::Write;

use clap::ValueEnum;
use mailsift_campaign::{CampaignProgress, SendStatus};
use mailsift_verify::{VerificationReport, VerificationResult, VerificationStatus, VerifyProgress};

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// One JSON object per line.
    #[default]
    Json,
    /// Tab-separated `email format mx ping status`.
    Text,
}

/// Which results are written.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum ResultFilter {
    #[default]
    All,
    Valid,
    Risky,
    /// Valid and risky.
    Sendable,
    Invalid,
}

impl ResultFilter {
    pub fn select<'a>(
        self,
        report: &'a VerificationReport,
    ) -> Box<dyn Iterator<Item = &'a VerificationResult> + 'a> {
        match self {
            Self::All => Box::new(report.results().iter()),
            Self::Valid => Box::new(report.valid_only()),
            Self::Risky => Box::new(report.risky_only()),
            Self::Sendable => Box::new(report.valid_and_risky()),
            Self::Invalid => Box::new(report.with_status(VerificationStatus::Invalid)),
        }
    }
}

/// Renders one result as a single line, without the trailing newline.
///
/// # Errors
///
/// Returns an error if JSON serialization fails.
pub fn render_result(result: &VerificationResult, format: OutputFormat) -> serde_json::Result<String> {
    match format {
        OutputFormat::Json => serde_json::to_string(result),
        OutputFormat::Text => Ok(format!(
            "{}\t{}\t{}\t{}\t{}",
            result.address, result.format, result.mx, result.ping, result.status
        )),
    }
}

/// Writes the selected results, one per line.
///
/// # Errors
///
/// Returns an error if rendering or writing fails.
pub fn write_report(
    out: &mut impl Write,
    report: &VerificationReport,
    format: OutputFormat,
    filter: ResultFilter,
) -> anyhow::Result<usize> {
    let mut written = 0;
    for result in filter.select(report) {
        writeln!(out, "{}", render_result(result, format)?)?;
        written += 1;
    }
    Ok(written)
}

pub fn verify_progress_line(progress: &VerifyProgress) -> String {
    format!(
        "[{}/{}] {} {}",
        progress.completed, progress.total, progress.address, progress.status
    )
}

pub fn campaign_progress_line(progress: &CampaignProgress) -> String {
    match progress {
        CampaignProgress::Sent {
            percent,
            current,
            total,
            outcome,
        } => {
            let mark = match outcome.status {
                SendStatus::Success => "ok",
                SendStatus::Failure => "FAILED",
            };
            format!("[{current}/{total} {percent:.0}%] {mark} {}", outcome.message)
        }
        CampaignProgress::Finished { stats } => format!(
            "Finished: {} sent, {} succeeded, {} failed",
            stats.total_sent, stats.successful, stats.failed
        ),
    }
}
