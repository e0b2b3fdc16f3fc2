//! Syntax validation for bare `local@domain` addresses.
//!
//! The grammar is the RFC 5321 mailbox production, narrowed to what can
//! actually be probed over SMTP and delivered to by a campaign:
//!
//! ```text
//! Mailbox        = Local-part "@" Domain
//! Local-part     = Dot-string
//! Dot-string     = Atom *("." Atom)
//! Atom           = 1*atext
//! Domain         = sub-domain 1*("." sub-domain)
//! sub-domain     = Let-dig [Ldh-str]
//!
//! atext          = ALPHA / DIGIT / "!" / "#" / "$" / "%" / "&" / "'" /
//!                  "*" / "+" / "-" / "/" / "=" / "?" / "^" / "_" / "`" /
//!                  "{" / "|" / "}" / "~"
//! Let-dig        = ALPHA / DIGIT
//! Ldh-str        = *( ALPHA / DIGIT / "-" ) Let-dig
//! ```
//!
//! Quoted local parts and address literals are valid RFC 5321 but are
//! rejected here: neither resolves to an MX record, and most submission
//! servers refuse them.
//!
//! # Size Constraints
//!
//! - Maximum address length: 254 octets
//! - Maximum local-part: 64 octets
//! - Maximum domain: 255 octets, each label at most 63 octets

use serde::{Deserialize, Serialize};
use thiserror::Error;

const MAX_ADDRESS_LEN: usize = 254;
const MAX_LOCAL_PART_LEN: usize = 64;
const MAX_DOMAIN_LEN: usize = 255;
const MAX_LABEL_LEN: usize = 63;

pub type Result<T> = std::result::Result<T, AddressError>;

/// Reasons an address string fails syntax validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressError {
    #[error("Empty address")]
    Empty,
    #[error("Address exceeds {MAX_ADDRESS_LEN} octets")]
    TooLong,
    #[error("Local-part exceeds {MAX_LOCAL_PART_LEN} octets")]
    LocalPartTooLong,
    #[error("Domain exceeds {MAX_DOMAIN_LEN} octets")]
    DomainTooLong,
    #[error("Missing '@' separator")]
    MissingAtSign,
    #[error("More than one '@' separator")]
    MultipleAtSigns,
    #[error("Invalid local-part: {0}")]
    InvalidLocalPart(String),
    #[error("Invalid domain: {0}")]
    InvalidDomain(String),
}

/// A syntactically valid mailbox (local-part@domain).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Mailbox {
    pub local_part: String,
    pub domain: String,
}

impl std::fmt::Display for Mailbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.local_part, self.domain)
    }
}

/// Returns `true` when `address` is a well-formed `local@domain` mailbox.
///
/// Never panics and performs no I/O.
pub fn validate(address: &str) -> bool {
    parse_address(address).is_ok()
}

/// Parses `address` into its local part and domain.
///
/// The input is taken verbatim: surrounding whitespace, angle brackets or a
/// display name make the address invalid.
///
/// # Errors
///
/// Returns `AddressError` describing the first violation found.
pub fn parse_address(address: &str) -> Result<Mailbox> {
    if address.is_empty() {
        return Err(AddressError::Empty);
    }

    if address.len() > MAX_ADDRESS_LEN {
        return Err(AddressError::TooLong);
    }

    let (local_part, domain) = split_at_sign(address)?;

    if local_part.len() > MAX_LOCAL_PART_LEN {
        return Err(AddressError::LocalPartTooLong);
    }
    if domain.len() > MAX_DOMAIN_LEN {
        return Err(AddressError::DomainTooLong);
    }

    parse_dot_string(local_part)?;
    parse_domain(domain)?;

    Ok(Mailbox {
        local_part: local_part.to_string(),
        domain: domain.to_string(),
    })
}

/// Splits on the single '@', rejecting zero or several.
fn split_at_sign(input: &str) -> Result<(&str, &str)> {
    let mut ats = input.match_indices('@').map(|(i, _)| i);

    let at_pos = ats.next().ok_or(AddressError::MissingAtSign)?;
    if ats.next().is_some() {
        return Err(AddressError::MultipleAtSigns);
    }

    Ok((&input[..at_pos], &input[at_pos + 1..]))
}

/// Parse a Dot-string: Atom *("." Atom)
fn parse_dot_string(input: &str) -> Result<()> {
    if input.is_empty() {
        return Err(AddressError::InvalidLocalPart(
            "Empty local-part".to_string(),
        ));
    }

    if input.starts_with('"') {
        return Err(AddressError::InvalidLocalPart(
            "Quoted local-parts are not accepted".to_string(),
        ));
    }

    if input.starts_with('.') || input.ends_with('.') {
        return Err(AddressError::InvalidLocalPart(
            "Dot-string cannot start or end with '.'".to_string(),
        ));
    }

    if input.contains("..") {
        return Err(AddressError::InvalidLocalPart(
            "Dot-string cannot contain consecutive dots".to_string(),
        ));
    }

    for atom in input.split('.') {
        if let Some(ch) = atom.chars().find(|&ch| !is_atext(ch)) {
            return Err(AddressError::InvalidLocalPart(format!(
                "Invalid character '{ch}' in atom"
            )));
        }
    }

    Ok(())
}

/// Parse a Domain: sub-domain 1*("." sub-domain)
fn parse_domain(input: &str) -> Result<()> {
    if input.is_empty() {
        return Err(AddressError::InvalidDomain("Empty domain".to_string()));
    }

    if input.starts_with('[') {
        return Err(AddressError::InvalidDomain(
            "Address literals are not accepted".to_string(),
        ));
    }

    let labels: Vec<&str> = input.split('.').collect();
    if labels.len() < 2 {
        return Err(AddressError::InvalidDomain(
            "Domain must contain at least one '.'".to_string(),
        ));
    }

    for label in &labels {
        parse_sub_domain(label)?;
    }

    // Guarded by the length check above.
    if labels
        .last()
        .is_some_and(|tld| tld.chars().all(|c| c.is_ascii_digit()))
    {
        return Err(AddressError::InvalidDomain(
            "Top-level label cannot be all digits".to_string(),
        ));
    }

    Ok(())
}

/// Parse a sub-domain: Let-dig [Ldh-str]
fn parse_sub_domain(label: &str) -> Result<()> {
    if label.is_empty() {
        return Err(AddressError::InvalidDomain("Empty label".to_string()));
    }

    if label.len() > MAX_LABEL_LEN {
        return Err(AddressError::InvalidDomain(format!(
            "Label '{label}' exceeds {MAX_LABEL_LEN} octets"
        )));
    }

    if label.starts_with('-') || label.ends_with('-') {
        return Err(AddressError::InvalidDomain(format!(
            "Label '{label}' cannot start or end with '-'"
        )));
    }

    if let Some(ch) = label
        .chars()
        .find(|&ch| !ch.is_ascii_alphanumeric() && ch != '-')
    {
        return Err(AddressError::InvalidDomain(format!(
            "Invalid character '{ch}' in label '{label}'"
        )));
    }

    Ok(())
}

/// atext from RFC 5322 Section 3.2.3
const fn is_atext(ch: char) -> bool {
    matches!(ch,
        'a'..='z' | 'A'..='Z' | '0'..='9' |
        '!' | '#' | '$' | '%' | '&' | '\'' | '*' | '+' | '-' | '/' |
        '=' | '?' | '^' | '_' | '`' | '{' | '|' | '}' | '~'
    )
}
