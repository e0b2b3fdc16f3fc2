//! File-backed configuration for the `mailsift` binary.
//!
//! The file is RON with two optional sections:
//!
//! ```ron
//! (
//!     verify: (
//!         workers: Some(30),
//!         mode: standard,
//!         probe: (helo_name: "mail.example.com", probe_sender: "probe@example.com"),
//!     ),
//!     campaign: (
//!         server: "smtp.example.com",
//!         username: Some("news@example.com"),
//!         password: Some("app-password"),
//!         rate_per_minute: 30,
//!     ),
//! )
//! ```

use std::path::{Path, PathBuf};

use anyhow::Context;
use mailsift_campaign::SmtpSettings;
use mailsift_verify::VerifierConfig;
use serde::{Deserialize, Serialize};

pub const CONFIG_ENV: &str = "MAILSIFT_CONFIG";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MailsiftConfig {
    pub verify: VerifierConfig,
    pub campaign: SmtpSettings,
}

impl MailsiftConfig {
    /// Reads and parses the file at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not valid RON.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;

        ron::from_str(&content)
            .with_context(|| format!("Failed to parse config from {}", path.display()))
    }
}

fn default_paths() -> Vec<PathBuf> {
    vec![
        PathBuf::from("./mailsift.config.ron"),
        PathBuf::from("/etc/mailsift/mailsift.config.ron"),
    ]
}

/// Finds the configuration file using the following precedence:
/// 1. `MAILSIFT_CONFIG` environment variable
/// 2. ./mailsift.config.ron (current working directory)
/// 3. /etc/mailsift/mailsift.config.ron (system-wide config)
///
/// # Errors
///
/// Returns an error if `MAILSIFT_CONFIG` names a file that does not exist.
pub fn find_config_file() -> anyhow::Result<Option<PathBuf>> {
    locate(std::env::var(CONFIG_ENV).ok(), &default_paths())
}

fn locate(env_path: Option<String>, candidates: &[PathBuf]) -> anyhow::Result<Option<PathBuf>> {
    if let Some(env_path) = env_path {
        let path = PathBuf::from(env_path);
        if path.exists() {
            return Ok(Some(path));
        }
        anyhow::bail!(
            "{CONFIG_ENV} points to non-existent file: {}",
            path.display()
        );
    }

    Ok(candidates.iter().find(|path| path.exists()).cloned())
}

/// Loads `explicit` if given, otherwise the first file found by
/// [`find_config_file`]. No file at all yields the defaults.
///
/// # Errors
///
/// Returns an error if a chosen file cannot be read or parsed.
pub fn load(explicit: Option<&Path>) -> anyhow::Result<MailsiftConfig> {
    let path = match explicit {
        Some(path) => Some(path.to_path_buf()),
        None => find_config_file()?,
    };

    path.map_or_else(|| Ok(MailsiftConfig::default()), |path| MailsiftConfig::from_file(&path))
}
