//! Newline-delimited address and target lists.

use std::{io::Read, path::Path};

use anyhow::Context;
use mailsift_campaign::CampaignTarget;

/// Reads `path`, or standard input when `path` is absent or `-`.
///
/// # Errors
///
/// Returns an error if the source cannot be read.
pub fn read_source(path: Option<&Path>) -> anyhow::Result<String> {
    match path.filter(|path| path.as_os_str() != "-") {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display())),
        None => {
            let mut content = String::new();
            std::io::stdin()
                .read_to_string(&mut content)
                .context("Failed to read standard input")?;
            Ok(content)
        }
    }
}

/// One address per line. Blank lines and `#` comments are skipped.
pub fn parse_addresses(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(ToString::to_string)
        .collect()
}

/// One `address[,name]` per line.
pub fn parse_targets(content: &str) -> Vec<CampaignTarget> {
    content.lines().filter_map(CampaignTarget::parse_line).collect()
}
