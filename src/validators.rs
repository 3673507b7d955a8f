//! Name and free-text helpers shared by every renderer
//!
//! - [`sanitize_comment`]: folds comment lines into one quote-free line
//! - [`fix_term_length`]: abbreviates or truncates over-long term names
//! - [`validate_interface`]: kernel interface-name constraints
//! - [`log_prefix`]: iptables LOG prefix from a term name

use crate::config::Abbreviation;
use crate::core::error::{Error, Result};

/// Longest prefix the iptables LOG target accepts
pub const LOG_PREFIX_MAX: usize = 29;

/// Folds comment lines into one line safe to embed in a quoted rule comment.
///
/// Lines are joined with a single space, double quotes are stripped (never
/// escaped), raw newlines never survive and the result is cut to `max`
/// bytes on a character boundary. Returns `None` when nothing is left.
///
/// # Examples
///
/// ```
/// use aclgen::validators::sanitize_comment;
///
/// let lines = vec!["say \"hi\"".to_string(), "twice".to_string()];
/// assert_eq!(sanitize_comment(&lines, 255).as_deref(), Some("say hi twice"));
/// assert_eq!(sanitize_comment(&[], 255), None);
/// ```
pub fn sanitize_comment(lines: &[String], max: usize) -> Option<String> {
    let joined = lines
        .iter()
        .map(|l| l.trim())
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    let mut cleaned: String = joined
        .chars()
        .filter(|c| *c != '"')
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect();
    let mut end = cleaned.len().min(max);
    while !cleaned.is_char_boundary(end) {
        end -= 1;
    }
    cleaned.truncate(end);
    let cleaned = cleaned.trim_end().to_string();
    if cleaned.is_empty() { None } else { Some(cleaned) }
}

/// Brings a term name within `max` characters.
///
/// With `abbreviate`, each table entry is substituted in order and the
/// length re-checked after every substitution. With `truncate`, the name is
/// then hard-cut. Names already short enough are returned unchanged.
///
/// # Errors
///
/// Returns [`Error::TermNameTooLong`] if the name is still too long.
pub fn fix_term_length(
    name: &str,
    max: usize,
    abbreviate: bool,
    truncate: bool,
    table: &[Abbreviation],
) -> Result<String> {
    let mut fixed = name.to_string();
    if fixed.chars().count() <= max {
        return Ok(fixed);
    }

    if abbreviate {
        for entry in table {
            fixed = fixed.replace(&entry.word, &entry.abbreviation);
            if fixed.chars().count() <= max {
                return Ok(fixed);
            }
        }
    }

    if truncate {
        return Ok(fixed.chars().take(max).collect());
    }

    Err(Error::TermNameTooLong {
        term: name.to_string(),
        max,
    })
}

/// Validates an interface name.
///
/// # Errors
///
/// Returns `Err` if the name violates kernel constraints.
pub fn validate_interface(name: &str) -> std::result::Result<&str, String> {
    if name.is_empty() {
        return Err("Interface name cannot be empty".to_string());
    }

    if name.len() > 15 {
        return Err("Interface name too long (max 15 characters)".to_string());
    }

    if name == "." || name == ".." {
        return Err("Invalid interface name".to_string());
    }

    // '+' is the iptables wildcard suffix (eth+)
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_' | '+'))
    {
        return Err("Interface name contains invalid characters".to_string());
    }

    Ok(name)
}

/// Derives a LOG prefix from a term name.
pub fn log_prefix(term_name: &str) -> String {
    term_name
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | ':' | '.'))
        .take(LOG_PREFIX_MAX)
        .collect()
}
