//! Command-line interface definitions.
//!
//! Flags override the matching values from the configuration file.

use std::{path::PathBuf, time::Duration};

use clap::{Args, Parser, Subcommand};
use mailsift_campaign::{Provider, SmtpSettings};
use mailsift_common::config::ClientTimeouts;
use mailsift_verify::{CheckDepth, ProbeMode, VerifierConfig};

use crate::output::{OutputFormat, ResultFilter};

/// Verify email deliverability and send rate-limited campaigns
#[derive(Parser, Debug)]
#[command(name = "mailsift")]
#[command(version, long_about = None)]
pub struct Cli {
    /// Configuration file (default: $MAILSIFT_CONFIG, ./mailsift.config.ron,
    /// /etc/mailsift/mailsift.config.ron)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Verify a newline-delimited list of addresses
    Verify(VerifyArgs),
    /// Send a personalised message to every target
    Send(SendArgs),
    /// Connect and authenticate without sending anything
    TestConnection(SmtpArgs),
}

#[derive(Args, Debug)]
pub struct VerifyArgs {
    /// Address list, one per line (`-` or absent for standard input)
    pub input: Option<PathBuf>,

    /// Concurrent verifications (capped at 50)
    #[arg(short, long)]
    pub workers: Option<usize>,

    /// Probing strategy: fast or standard
    #[arg(short, long)]
    pub mode: Option<ProbeMode>,

    /// Per-probe timeout in seconds
    #[arg(short, long)]
    pub timeout: Option<u64>,

    /// Check the address format only
    #[arg(long, conflicts_with = "mx_only")]
    pub format_only: bool,

    /// Check the format and MX records, without probing
    #[arg(long)]
    pub mx_only: bool,

    #[arg(short, long, value_enum, default_value_t = OutputFormat::Json)]
    pub output: OutputFormat,

    /// Which results to write
    #[arg(short, long, value_enum, default_value_t = ResultFilter::All)]
    pub filter: ResultFilter,

    /// Report each completed address on standard error
    #[arg(long)]
    pub progress: bool,
}

impl VerifyArgs {
    pub fn apply(&self, config: &mut VerifierConfig) {
        if let Some(workers) = self.workers {
            config.workers = Some(workers);
        }
        if let Some(mode) = self.mode {
            config.mode = mode;
        }
        if let Some(timeout) = self.timeout {
            config.timeout_secs = Some(timeout);
        }
        if self.format_only {
            config.depth = CheckDepth::Syntax;
        } else if self.mx_only {
            config.depth = CheckDepth::Mx;
        }
    }
}

#[derive(Args, Debug)]
pub struct SendArgs {
    /// Target list, one `address[,name]` per line (`-` for standard input)
    pub targets: PathBuf,

    /// Subject line; `{name}` and `{email}` are substituted
    #[arg(short, long)]
    pub subject: String,

    /// Plain-text body template
    #[arg(short, long)]
    pub body_file: PathBuf,

    /// HTML alternative template
    #[arg(long)]
    pub html_file: Option<PathBuf>,

    /// File to attach (repeatable)
    #[arg(short, long = "attach")]
    pub attachments: Vec<PathBuf>,

    #[command(flatten)]
    pub smtp: SmtpArgs,
}

#[derive(Args, Debug, Default)]
pub struct SmtpArgs {
    /// Preset endpoint: gmail, gmail_ssl, outlook or yahoo
    #[arg(long)]
    pub provider: Option<Provider>,

    #[arg(long)]
    pub server: Option<String>,

    #[arg(long)]
    pub port: Option<u16>,

    #[arg(short, long)]
    pub username: Option<String>,

    #[arg(long, env = "MAILSIFT_SMTP_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// From address (default: the username)
    #[arg(long)]
    pub sender: Option<String>,

    /// Messages per minute
    #[arg(long)]
    pub rate: Option<u32>,

    /// Seconds between messages, overriding --rate
    #[arg(long)]
    pub delay: Option<f64>,

    /// Bound for every SMTP step, in seconds
    #[arg(long)]
    pub smtp_timeout: Option<u64>,

    /// Do not upgrade with STARTTLS
    #[arg(long, conflicts_with = "ssl")]
    pub no_tls: bool,

    /// Use implicit TLS (SMTPS)
    #[arg(long)]
    pub ssl: bool,
}

impl SmtpArgs {
    /// Overlays the flags onto `settings`. A provider is applied first, so
    /// explicit endpoint flags still win.
    pub fn apply(&self, settings: &mut SmtpSettings) {
        if let Some(provider) = &self.provider {
            provider.apply(settings);
        }
        if let Some(server) = &self.server {
            settings.server.clone_from(server);
        }
        if let Some(port) = self.port {
            settings.port = port;
        }
        if self.username.is_some() {
            settings.username.clone_from(&self.username);
        }
        if self.password.is_some() {
            settings.password.clone_from(&self.password);
        }
        if self.sender.is_some() {
            settings.sender.clone_from(&self.sender);
        }
        if let Some(rate) = self.rate {
            settings.rate_per_minute = rate;
        }
        if self.delay.is_some() {
            settings.delay_between_secs = self.delay;
        }
        if let Some(secs) = self.smtp_timeout {
            settings.timeouts = ClientTimeouts::uniform(Duration::from_secs(secs));
        }
        if self.no_tls {
            settings.use_tls = false;
        }
        if self.ssl {
            settings.use_ssl = true;
            settings.use_tls = false;
        }
    }
}
