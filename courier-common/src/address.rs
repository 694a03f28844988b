//! RFC 5321 mailbox validation for template senders and recipients.
//!
//! Templates store the sender as a single address and the recipients as a
//! comma-separated list. Both are checked against the RFC 5321 `Mailbox`
//! grammar before any SMTP session is opened:
//!
//! ```text
//! Mailbox        = Local-part "@" ( Domain / address-literal )
//! Local-part     = Dot-string / Quoted-string
//! Dot-string     = Atom *("." Atom)
//! Domain         = sub-domain *("." sub-domain)
//! sub-domain     = Let-dig [Ldh-str]
//! address-literal = "[" ( IPv4-address-literal / IPv6-address-literal / General-address-literal ) "]"
//! ```
//!
//! # Size Constraints
//!
//! - Maximum mailbox length: 254 octets
//! - Maximum local-part: 64 octets
//! - Maximum domain: 255 octets

use std::{
    fmt,
    net::{Ipv4Addr, Ipv6Addr},
    str::FromStr,
};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type for address parsing
pub type Result<T> = std::result::Result<T, AddressError>;

const MAX_MAILBOX_LEN: usize = 254;
const MAX_LOCAL_PART_LEN: usize = 64;
const MAX_DOMAIN_LEN: usize = 255;

/// Errors that can occur during address parsing
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressError {
    #[error("Empty address")]
    Empty,

    #[error("Address exceeds {MAX_MAILBOX_LEN} octets")]
    TooLong,

    #[error("Local-part exceeds {MAX_LOCAL_PART_LEN} octets")]
    LocalPartTooLong,

    #[error("Domain exceeds {MAX_DOMAIN_LEN} octets")]
    DomainTooLong,

    #[error("Missing '@' separator in mailbox")]
    MissingAtSign,

    #[error("Invalid local-part: {0}")]
    InvalidLocalPart(String),

    #[error("Invalid domain: {0}")]
    InvalidDomain(String),

    #[error("Invalid address literal: {0}")]
    InvalidAddressLiteral(String),

    #[error("Unclosed quoted string in local-part")]
    UnclosedQuotedString,

    #[error("Invalid quoted string: {0}")]
    InvalidQuotedString(String),

    #[error("Address list is empty")]
    EmptyList,

    #[error("Invalid address '{address}' at position {position}: {source}")]
    InvalidListEntry {
        address: String,
        position: usize,
        #[source]
        source: Box<AddressError>,
    },
}

/// A parsed mailbox (`local_part@domain`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Mailbox {
    /// The local part (before @)
    pub local_part: String,
    /// The domain or address literal (after @)
    pub domain: String,
}

impl fmt::Display for Mailbox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.local_part, self.domain)
    }
}

impl FromStr for Mailbox {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self> {
        parse_mailbox(s)
    }
}

/// Parse a single mailbox.
///
/// Surrounding whitespace is ignored and a single pair of angle brackets
/// (`<user@example.com>`) is accepted, since that is how addresses are
/// commonly pasted into templates.
///
/// # Errors
///
/// Returns `AddressError` if the input is not a valid RFC 5321 mailbox.
pub fn parse_mailbox(input: &str) -> Result<Mailbox> {
    let trimmed = input.trim();
    let trimmed = trimmed
        .strip_prefix('<')
        .and_then(|s| s.strip_suffix('>'))
        .unwrap_or(trimmed);

    if trimmed.is_empty() {
        return Err(AddressError::Empty);
    }

    if trimmed.len() > MAX_MAILBOX_LEN {
        return Err(AddressError::TooLong);
    }

    let at_pos = find_unquoted_at(trimmed)?;

    let local_part = &trimmed[..at_pos];
    let domain = &trimmed[at_pos + 1..];

    if local_part.len() > MAX_LOCAL_PART_LEN {
        return Err(AddressError::LocalPartTooLong);
    }
    if domain.len() > MAX_DOMAIN_LEN {
        return Err(AddressError::DomainTooLong);
    }

    Ok(Mailbox {
        local_part: parse_local_part(local_part)?,
        domain: parse_domain_or_address_literal(domain)?,
    })
}

/// Parse a comma-separated list of mailboxes.
///
/// The list must contain at least one entry after trimming, and every
/// entry must be a valid mailbox; an empty entry (e.g. a trailing comma)
/// is rejected.
///
/// # Errors
///
/// Returns `AddressError::EmptyList` for a blank list, or
/// `AddressError::InvalidListEntry` naming the first offending entry.
pub fn parse_mailbox_list(input: &str) -> Result<Vec<Mailbox>> {
    if input.trim().is_empty() {
        return Err(AddressError::EmptyList);
    }

    split_unquoted_commas(input)
        .into_iter()
        .enumerate()
        .map(|(position, entry)| {
            parse_mailbox(entry).map_err(|source| AddressError::InvalidListEntry {
                address: entry.trim().to_string(),
                position,
                source: Box::new(source),
            })
        })
        .collect()
}

/// Split on commas that are not inside a quoted string or address literal
fn split_unquoted_commas(input: &str) -> Vec<&str> {
    let mut entries = Vec::new();
    let mut start = 0;
    let mut in_quotes = false;
    let mut in_brackets = false;
    let mut prev_was_backslash = false;

    for (i, ch) in input.char_indices() {
        if ch == '"' && !prev_was_backslash && !in_brackets {
            in_quotes = !in_quotes;
        } else if ch == '[' && !in_quotes {
            in_brackets = true;
        } else if ch == ']' && !in_quotes {
            in_brackets = false;
        } else if ch == ',' && !in_quotes && !in_brackets {
            entries.push(&input[start..i]);
            start = i + 1;
        }

        prev_was_backslash = ch == '\\' && !prev_was_backslash;
    }

    entries.push(&input[start..]);
    entries
}

/// Find the byte position of '@' that is not inside a quoted string or address literal
fn find_unquoted_at(input: &str) -> Result<usize> {
    let mut in_quotes = false;
    let mut in_brackets = false;
    let mut prev_was_backslash = false;

    for (i, ch) in input.char_indices() {
        if ch == '"' && !prev_was_backslash && !in_brackets {
            in_quotes = !in_quotes;
        } else if ch == '[' && !in_quotes {
            in_brackets = true;
        } else if ch == ']' && !in_quotes {
            in_brackets = false;
        } else if ch == '@' && !in_quotes && !in_brackets {
            return Ok(i);
        }

        prev_was_backslash = ch == '\\' && !prev_was_backslash;
    }

    Err(AddressError::MissingAtSign)
}

/// Parse a local-part: Dot-string or Quoted-string
fn parse_local_part(input: &str) -> Result<String> {
    if input.is_empty() {
        return Err(AddressError::InvalidLocalPart(
            "Empty local-part".to_string(),
        ));
    }

    if input.starts_with('"') {
        parse_quoted_string(input)
    } else {
        parse_dot_string(input)
    }
}

/// Parse a Dot-string: Atom *("." Atom)
fn parse_dot_string(input: &str) -> Result<String> {
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

    if let Some(ch) = input.chars().find(|&ch| ch != '.' && !is_atext(ch)) {
        return Err(AddressError::InvalidLocalPart(format!(
            "Invalid character '{ch}' in atom"
        )));
    }

    Ok(input.to_string())
}

/// Parse a Quoted-string: DQUOTE *`QcontentSMTP` DQUOTE
fn parse_quoted_string(input: &str) -> Result<String> {
    if input.len() < 2 || !input.ends_with('"') {
        return Err(AddressError::UnclosedQuotedString);
    }

    let content = &input[1..input.len() - 1];

    let mut chars = content.chars();
    while let Some(ch) = chars.next() {
        if ch == '\\' {
            match chars.next() {
                Some(next) if next.is_ascii_graphic() || next == ' ' => {}
                Some(next) => {
                    return Err(AddressError::InvalidQuotedString(format!(
                        "Invalid quoted-pair: \\{next}"
                    )));
                }
                None => {
                    return Err(AddressError::InvalidQuotedString(
                        "Backslash at end of quoted string".to_string(),
                    ));
                }
            }
        } else if !is_qtext_smtp(ch) {
            return Err(AddressError::InvalidQuotedString(format!(
                "Invalid character '{ch}' in quoted string"
            )));
        }
    }

    Ok(input.to_string())
}

fn parse_domain_or_address_literal(input: &str) -> Result<String> {
    if input.starts_with('[') {
        parse_address_literal(input)
    } else {
        parse_domain(input)
    }
}

/// Parse a Domain: sub-domain *("." sub-domain)
fn parse_domain(input: &str) -> Result<String> {
    if input.is_empty() {
        return Err(AddressError::InvalidDomain("Empty domain".to_string()));
    }

    if input.starts_with('.') || input.ends_with('.') {
        return Err(AddressError::InvalidDomain(
            "Domain cannot start or end with '.'".to_string(),
        ));
    }

    for subdomain in input.split('.') {
        parse_subdomain(subdomain)?;
    }

    Ok(input.to_string())
}

/// Parse a sub-domain: Let-dig [Ldh-str]
fn parse_subdomain(input: &str) -> Result<()> {
    if input.is_empty() {
        return Err(AddressError::InvalidDomain(
            "Domain cannot contain consecutive dots".to_string(),
        ));
    }

    let starts_ok = input.chars().next().is_some_and(|c| c.is_ascii_alphanumeric());
    let ends_ok = input.chars().last().is_some_and(|c| c.is_ascii_alphanumeric());
    if !starts_ok || !ends_ok {
        return Err(AddressError::InvalidDomain(format!(
            "Subdomain '{input}' must start and end with a letter or digit"
        )));
    }

    if let Some(ch) = input
        .chars()
        .find(|&ch| !ch.is_ascii_alphanumeric() && ch != '-')
    {
        return Err(AddressError::InvalidDomain(format!(
            "Invalid character '{ch}' in subdomain"
        )));
    }

    Ok(())
}

/// Parse an address-literal: `[IPv4]` or `[IPv6:...]` or `[tag:...]`
fn parse_address_literal(input: &str) -> Result<String> {
    let Some(content) = input.strip_prefix('[').and_then(|s| s.strip_suffix(']')) else {
        return Err(AddressError::InvalidAddressLiteral(
            "Address literal must be enclosed in brackets".to_string(),
        ));
    };

    if content.parse::<Ipv4Addr>().is_ok() {
        return Ok(input.to_string());
    }

    if let Some(ipv6) = content.strip_prefix("IPv6:")
        && ipv6.parse::<Ipv6Addr>().is_ok()
    {
        return Ok(input.to_string());
    }

    if let Some((tag, value)) = content.split_once(':')
        && !tag.is_empty()
        && !value.is_empty()
        && !tag.eq_ignore_ascii_case("IPv6")
    {
        return Ok(input.to_string());
    }

    Err(AddressError::InvalidAddressLiteral(format!(
        "Invalid address literal format: {content}"
    )))
}

/// atext = ALPHA / DIGIT / "!" / "#" / "$" / "%" / "&" / "'" / "*" / "+" /
///         "-" / "/" / "=" / "?" / "^" / "_" / "`" / "{" / "|" / "}" / "~"
#[inline]
const fn is_atext(ch: char) -> bool {
    ch.is_ascii_alphanumeric()
        || matches!(
            ch,
            '!' | '#'
                | '$'
                | '%'
                | '&'
                | '\''
                | '*'
                | '+'
                | '-'
                | '/'
                | '='
                | '?'
                | '^'
                | '_'
                | '`'
                | '{'
                | '|'
                | '}'
                | '~'
        )
}

/// qtextSMTP = %d32-33 / %d35-91 / %d93-126
#[inline]
const fn is_qtext_smtp(ch: char) -> bool {
    matches!(ch as u32, 32..=33 | 35..=91 | 93..=126)
}
