//! Per-recipient personalisation of campaign content.

use crate::types::{CampaignMessage, CampaignTarget};

pub const NAME_TOKEN: &str = "{name}";
pub const EMAIL_TOKEN: &str = "{email}";

/// Content rendered for one recipient.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rendered {
    pub subject: String,
    pub body: String,
    pub html: Option<String>,
}

/// Substitutes the recipient into `template`.
///
/// `{email}` is always replaced. `{name}` is only replaced when the target
/// has a non-empty name; otherwise the token is left as written.
#[must_use]
pub fn render(template: &str, target: &CampaignTarget) -> String {
    let rendered = template.replace(EMAIL_TOKEN, &target.address);

    match target.name.as_deref().filter(|name| !name.is_empty()) {
        Some(name) => rendered.replace(NAME_TOKEN, name),
        None => rendered,
    }
}

#[must_use]
pub fn personalize(message: &CampaignMessage, target: &CampaignTarget) -> Rendered {
    Rendered {
        subject: render(&message.subject, target),
        body: render(&message.body, target),
        html: message.html.as_deref().map(|html| render(html, target)),
    }
}
