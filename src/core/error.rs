use thiserror::Error;

/// Core error types for aclgen
///
/// Every variant except `Io`, `Serialization` and `PolicyFile` aborts a render
/// call. Term-scoped conditions (expired terms, family mismatches) are logged
/// and never surface here.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A policy file could not be loaded
    #[error("Policy file {path}: {message}")]
    PolicyFile { path: String, message: String },

    /// A term uses a keyword, sub-value or combination the backend does not support
    #[error("Term {term}: {reason}")]
    UnsupportedFilter { term: String, reason: String },

    /// A header target carries an option the backend does not understand
    #[error("Unsupported option for {platform} target: {option}")]
    UnsupportedTargetOption { platform: String, option: String },

    /// A header default action is not valid for the chain it is attached to
    #[error("Unsupported default action {action} for chain {chain}")]
    UnsupportedDefaultAction { action: String, chain: String },

    /// Term name exceeds the backend maximum and cannot be shortened
    #[error("Term {term} is too long (max {max} characters) and no shortening option is set")]
    TermNameTooLong { term: String, max: usize },

    /// Two terms of one filter share a name
    #[error("Duplicate term name {term} in {filter}")]
    DuplicateTerm { term: String, filter: String },

    /// Established option used where connection tracking cannot honour it
    #[error(
        "Term {term} in filter {filter} uses the established option without state tracking; \
         name tcp or udp explicitly"
    )]
    Established { term: String, filter: String },

    /// `log_limit` set on a term that does not log
    #[error("Term {term} specifies a log limit but logging is not enabled")]
    LimitButNoLog { term: String },

    /// ICMP code given without exactly one ICMP type, or an unknown code name
    #[error("Term {term}: {reason}")]
    IcmpCode { term: String, reason: String },

    /// Structured backend header is missing or malformed
    #[error("Unsupported access list: {0}")]
    UnsupportedAccessList(String),

    /// Term cannot be expressed by the structured backend
    #[error("Term {term} cannot be rendered: {reason}")]
    AclTerm { term: String, reason: String },

    /// No header in the policy targets the requested backend
    #[error("No {0} targets found in policy")]
    NoTargets(String),
}

/// Represents a translated error with helpful context for CLI output
#[derive(Debug, Clone)]
pub struct ErrorTranslation {
    pub user_message: String,
    pub suggestions: Vec<String>,
}

impl ErrorTranslation {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            user_message: message.into(),
            suggestions: Vec::new(),
        }
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestions.push(suggestion.into());
        self
    }
}

impl Error {
    /// Pairs the error with hints on how to fix the offending policy.
    pub fn translate(&self) -> ErrorTranslation {
        let base = ErrorTranslation::new(self.to_string());
        match self {
            Error::TermNameTooLong { .. } => base
                .with_suggestion("Shorten the term name")
                .with_suggestion("Or add 'abbreviateterms' / 'truncateterms' to the target options"),
            Error::DuplicateTerm { .. } => {
                base.with_suggestion("Term names must be unique within a filter")
            }
            Error::Established { .. } => base
                .with_suggestion("Add 'protocol: [\"tcp\"]' or 'protocol: [\"udp\"]' to the term")
                .with_suggestion("Or remove 'nostate' from the target options"),
            Error::LimitButNoLog { .. } => {
                base.with_suggestion("Set 'logging' on the term or drop 'log_limit'")
            }
            Error::UnsupportedFilter { .. } => base
                .with_suggestion("Run 'aclgen tokens <platform>' to list supported keywords"),
            Error::UnsupportedTargetOption { .. } | Error::UnsupportedDefaultAction { .. } => {
                base.with_suggestion("Check the target options in the policy header")
            }
            Error::NoTargets(_) => {
                base.with_suggestion("Add a target for this platform to a header, or pass --platform")
            }
            _ => base,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_term_too_long_translation() {
        let err = Error::TermNameTooLong {
            term: "a-very-long-term-name-for-testing".to_string(),
            max: 24,
        };
        let translation = err.translate();
        assert!(translation.user_message.contains("max 24"));
        assert!(
            translation
                .suggestions
                .iter()
                .any(|s| s.contains("abbreviateterms"))
        );
    }

    #[test]
    fn test_established_message_names_term_and_filter() {
        let err = Error::Established {
            term: "good-term-1".to_string(),
            filter: "INPUT".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("good-term-1"));
        assert!(msg.contains("INPUT"));
    }

    #[test]
    fn test_io_errors_have_no_suggestions() {
        let err = Error::from(std::io::Error::other("disk gone"));
        assert!(err.translate().suggestions.is_empty());
    }
}
