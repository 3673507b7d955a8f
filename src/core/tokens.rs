//! Token registry: which term keywords a backend understands
//!
//! Each renderer declares a [`TokenRegistry`] listing the [`Field`]s it can
//! render and, for enumerated keywords (`action`, `option`, `icmp_type`), the
//! values it accepts. Validation walks [`Term::populated_fields`] against the
//! registry before any output is produced.
//!
//! [`Term::populated_fields`]: crate::core::policy::Term::populated_fields

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

use crate::core::error::{Error, Result};
use crate::core::policy::Term;
use crate::core::tables;

/// Term keyword
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
    strum::AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Field {
    Action,
    Comment,
    Counter,
    DestinationAddress,
    DestinationAddressExclude,
    DestinationInterface,
    DestinationPort,
    DestinationPrefix,
    EtherType,
    Expiration,
    FragmentOffset,
    IcmpCode,
    IcmpType,
    Logging,
    LogLimit,
    Name,
    Option,
    Owner,
    PacketLength,
    Platform,
    PlatformExclude,
    Policer,
    Protocol,
    ProtocolExcept,
    RoutingInstance,
    SourceAddress,
    SourceAddressExclude,
    SourceInterface,
    SourcePort,
    SourcePrefix,
    StatelessReply,
    Verbatim,
}

/// Every `option` keyword a term may carry.
pub const OPTION_KEYWORDS: &[&str] = &[
    "established",
    "first-fragment",
    "initial",
    "sample",
    "tcp-established",
    "tcp-initial",
    "syn",
    "ack",
    "fin",
    "rst",
    "urg",
    "psh",
    "all",
    "none",
];

/// TCP flag keywords, rendered as `--tcp-flags` masks.
pub const TCP_FLAG_KEYWORDS: &[&str] = &["syn", "ack", "fin", "rst", "urg", "psh", "all", "none"];

/// Supported keywords and keyword values of one backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TokenRegistry {
    pub fields: BTreeSet<Field>,
    pub sub_tokens: BTreeMap<Field, BTreeSet<&'static str>>,
}

impl TokenRegistry {
    /// Starts from the keywords every backend understands.
    pub fn base() -> Self {
        let fields = BTreeSet::from([
            Field::Action,
            Field::Comment,
            Field::DestinationAddress,
            Field::DestinationAddressExclude,
            Field::DestinationPort,
            Field::Expiration,
            Field::IcmpType,
            Field::Name,
            Field::Option,
            Field::Platform,
            Field::PlatformExclude,
            Field::Protocol,
            Field::SourceAddress,
            Field::SourceAddressExclude,
            Field::SourcePort,
            Field::Verbatim,
        ]);
        let mut sub_tokens = BTreeMap::new();
        sub_tokens.insert(
            Field::Action,
            BTreeSet::from(["accept", "deny", "next", "reject", "reject-with-tcp-rst"]),
        );
        sub_tokens.insert(Field::IcmpType, tables::all_icmp_type_names());
        sub_tokens.insert(Field::Option, OPTION_KEYWORDS.iter().copied().collect());
        Self { fields, sub_tokens }
    }

    pub fn with_fields(mut self, fields: &[Field]) -> Self {
        self.fields.extend(fields.iter().copied());
        self
    }

    pub fn without_values(mut self, field: Field, values: &[&str]) -> Self {
        if let Some(set) = self.sub_tokens.get_mut(&field) {
            for value in values {
                set.remove(*value);
            }
        }
        self
    }

    pub fn supports(&self, field: Field) -> bool {
        self.fields.contains(&field)
    }

    pub fn supports_value(&self, field: Field, value: &str) -> bool {
        self.sub_tokens
            .get(&field)
            .is_none_or(|values| values.contains(value))
    }

    /// Checks every populated keyword and keyword value of `term`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedFilter`] naming the first offending
    /// keyword or value.
    pub fn validate(&self, term: &Term) -> Result<()> {
        let unsupported = |reason: String| Error::UnsupportedFilter {
            term: term.name.clone(),
            reason,
        };

        if let Some(keyword) = term.extra.keys().next() {
            return Err(unsupported(format!("unknown keyword '{keyword}'")));
        }

        for field in term.populated_fields() {
            if !self.supports(field) {
                return Err(unsupported(format!("keyword '{field}' is not supported")));
            }
        }

        if let Some(action) = term.action
            && !self.supports_value(Field::Action, action.as_str())
        {
            return Err(unsupported(format!("action '{action}' is not supported")));
        }
        for option in &term.option {
            if !self.supports_value(Field::Option, option) {
                return Err(unsupported(format!("option '{option}' is not supported")));
            }
        }
        for icmp_type in &term.icmp_type {
            if !self.supports_value(Field::IcmpType, icmp_type) {
                return Err(unsupported(format!(
                    "icmp-type '{icmp_type}' is not supported"
                )));
            }
        }

        if !term.protocol.is_empty() && !term.protocol_except.is_empty() {
            return Err(unsupported(
                "protocol and protocol-except cannot be combined".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::policy::Action;

    #[test]
    fn test_field_names_are_snake_case() {
        assert_eq!(Field::DestinationAddressExclude.to_string(), "destination_address_exclude");
        assert_eq!(Field::IcmpType.as_ref(), "icmp_type");
        assert_eq!("log_limit".parse::<Field>().unwrap(), Field::LogLimit);
    }

    #[test]
    fn test_unknown_keyword_rejected() {
        let mut term = Term::new("t1");
        term.extra
            .insert("ether_frame".to_string(), serde_json::json!("x"));
        let err = TokenRegistry::base().validate(&term).unwrap_err();
        assert!(err.to_string().contains("ether_frame"));
    }

    #[test]
    fn test_unregistered_field_rejected() {
        let mut term = Term::new("t1");
        term.counter = Some("c".to_string());
        let registry = TokenRegistry::base();
        assert!(matches!(
            registry.validate(&term),
            Err(Error::UnsupportedFilter { .. })
        ));
        let registry = registry.with_fields(&[Field::Counter]);
        assert!(registry.validate(&term).is_ok());
    }

    #[test]
    fn test_action_value_checked() {
        let registry = TokenRegistry::base().without_values(Field::Action, &["next"]);
        let mut term = Term::new("t1");
        term.action = Some(Action::Next);
        let err = registry.validate(&term).unwrap_err();
        assert!(err.to_string().contains("next"));
        assert!(registry.supports_value(Field::Action, "accept"));
        assert!(!registry.supports_value(Field::Action, "next"));
    }

    #[test]
    fn test_protocol_with_protocol_except_rejected() {
        let registry = TokenRegistry::base().with_fields(&[Field::ProtocolExcept]);
        let mut term = Term::new("t1");
        term.protocol = vec!["tcp".to_string()];
        term.protocol_except = vec!["udp".to_string()];
        assert!(registry.validate(&term).is_err());
    }
}
