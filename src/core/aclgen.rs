//! Backend contract and the term checks every backend shares
//!
//! A backend implements [`AclGenerator`]: it declares its [`TokenRegistry`]
//! and renders a whole [`Policy`] into one document. The helpers here cover
//! the lifecycle steps common to all backends:
//!
//! 1. keyword validation against the registry ([`validate_term`])
//! 2. expiration ([`check_expiration`])
//! 3. ICMP address-family compatibility ([`icmp_family_mismatch`])
//! 4. duplicate term names ([`check_duplicate_terms`])
//!
//! Name shortening and comment sanitization live in [`crate::validators`].

use chrono::{Local, NaiveDate, TimeDelta};
use std::collections::BTreeSet;
use tracing::{debug, info, warn};

use crate::config::{Abbreviation, GeneratorConfig, default_abbreviations};
use crate::core::error::{Error, Result};
use crate::core::iptables::Iptables;
use crate::core::nsxv::Nsxv;
use crate::core::policy::{AddressFamily, Policy, Term};
use crate::core::tables;
use crate::core::tokens::TokenRegistry;

/// Supported backends
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    serde::Serialize,
    serde::Deserialize,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
    strum::AsRefStr,
)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    #[strum(serialize = "iptables")]
    Iptables,
    #[strum(serialize = "nsxv")]
    Nsxv,
}

impl Platform {
    pub const fn as_str(self) -> &'static str {
        match self {
            Platform::Iptables => "iptables",
            Platform::Nsxv => "nsxv",
        }
    }

    /// File suffix of rendered output
    pub const fn suffix(self) -> &'static str {
        match self {
            Platform::Iptables => "ipt",
            Platform::Nsxv => "nsx",
        }
    }

    pub fn generator(self) -> Box<dyn AclGenerator> {
        match self {
            Platform::Iptables => Box::new(Iptables),
            Platform::Nsxv => Box::new(Nsxv),
        }
    }
}

/// Per-call rendering parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderContext {
    /// Date expirations are compared against
    pub today: NaiveDate,
    /// Look-ahead window for expiration notices
    pub exp_info_weeks: u32,
    pub abbreviations: Vec<Abbreviation>,
}

impl RenderContext {
    pub fn new(exp_info_weeks: u32) -> Self {
        Self {
            today: Local::now().date_naive(),
            exp_info_weeks,
            abbreviations: default_abbreviations(),
        }
    }

    pub fn from_config(config: &GeneratorConfig) -> Self {
        Self {
            abbreviations: config.abbreviations.clone(),
            ..Self::new(config.exp_info_weeks)
        }
    }

    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = today;
        self
    }

    pub fn with_abbreviations(mut self, abbreviations: Vec<Abbreviation>) -> Self {
        self.abbreviations = abbreviations;
        self
    }
}

impl Default for RenderContext {
    fn default() -> Self {
        Self::new(2)
    }
}

/// A renderer for one backend.
///
/// Implementations hold no state between calls; the same policy always
/// renders to the same document.
pub trait AclGenerator {
    fn platform(&self) -> Platform;

    /// Keywords and keyword values this backend understands.
    fn build_tokens(&self) -> TokenRegistry;

    /// Renders every filter of `policy` that targets this backend.
    ///
    /// # Errors
    ///
    /// Any configuration error aborts the call; no partial document is
    /// returned. [`Error::NoTargets`] if no header names this backend.
    fn render(&self, policy: &Policy, ctx: &RenderContext) -> Result<String>;
}

/// Where a term stands relative to its expiration date
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Active,
    /// Within the look-ahead window; still rendered
    Expiring,
    /// On or past its date; never rendered
    Expired,
}

/// Classifies a term's expiration and logs the matching notice.
pub fn check_expiration(term: &Term, filter: &str, ctx: &RenderContext) -> Lifecycle {
    let Some(expiration) = term.expiration else {
        return Lifecycle::Active;
    };
    if expiration <= ctx.today {
        warn!(
            "Term {} in filter {} is expired and will not be rendered.",
            term.name, filter
        );
        return Lifecycle::Expired;
    }
    let horizon = ctx
        .today
        .checked_add_signed(TimeDelta::weeks(i64::from(ctx.exp_info_weeks)))
        .unwrap_or(NaiveDate::MAX);
    if expiration <= horizon {
        info!(
            "Term {} in filter {} expires in less than {} weeks.",
            term.name, filter, ctx.exp_info_weeks
        );
        return Lifecycle::Expiring;
    }
    Lifecycle::Active
}

/// Validates keywords, keyword values and the log-limit dependency.
///
/// # Errors
///
/// [`Error::UnsupportedFilter`] for keywords outside `registry`,
/// [`Error::LimitButNoLog`] for a rate limit without logging.
pub fn validate_term(term: &Term, registry: &TokenRegistry) -> Result<()> {
    registry.validate(term)?;
    if term.log_limit.is_some() && !term.logs() {
        return Err(Error::LimitButNoLog {
            term: term.name.clone(),
        });
    }
    Ok(())
}

/// Returns the ICMP protocol that conflicts with `family`, if any.
///
/// Logs the skip at debug level.
pub fn icmp_family_mismatch<'a>(term: &'a Term, family: AddressFamily) -> Option<&'a str> {
    let conflict = term.protocol.iter().find(|p| {
        tables::icmp_protocol_family(p).is_some_and(|f| f != family)
    })?;
    debug!(
        "Term {} will not be rendered, as it has {} match specified but the ACL is of {} address family.",
        term.name,
        conflict,
        family.as_str()
    );
    Some(conflict)
}

/// Rejects repeated term names, checked once over every term a backend
/// renders from a policy.
///
/// # Errors
///
/// [`Error::DuplicateTerm`] naming the first repeated term.
pub fn check_duplicate_terms<'a>(
    names: impl IntoIterator<Item = &'a str>,
    scope: &str,
) -> Result<()> {
    let mut seen = BTreeSet::new();
    for name in names {
        if !seen.insert(name) {
            return Err(Error::DuplicateTerm {
                term: name.to_string(),
                filter: scope.to_string(),
            });
        }
    }
    Ok(())
}

/// Whether an address list has entries but none in `family`.
///
/// Such a term cannot match in this filter and is skipped.
pub fn lacks_family(addresses: &[ipnetwork::IpNetwork], family: AddressFamily) -> bool {
    !addresses.is_empty() && !addresses.iter().any(|a| family.matches(a))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::policy::{Logging, LogLimit, TimeUnit};
    use crate::core::test_helpers::{capture_logs, date};

    fn ctx() -> RenderContext {
        RenderContext::new(2).with_today(date(2024, 6, 1))
    }

    #[test]
    fn test_expired_term_warns_once() {
        let mut term = Term::new("old-term");
        term.expiration = Some(date(2024, 5, 1));
        let (state, logs) = capture_logs(|| check_expiration(&term, "INPUT", &ctx()));
        assert_eq!(state, Lifecycle::Expired);
        assert_eq!(logs.matches("is expired").count(), 1);
        assert!(logs.contains("old-term"));
        assert!(logs.contains("INPUT"));
    }

    #[test]
    fn test_expiring_term_notice() {
        let mut term = Term::new("soon");
        term.expiration = Some(date(2024, 6, 10));
        let (state, logs) = capture_logs(|| check_expiration(&term, "INPUT", &ctx()));
        assert_eq!(state, Lifecycle::Expiring);
        assert_eq!(logs.matches("expires in less than 2 weeks").count(), 1);
    }

    #[test]
    fn test_far_expiration_is_active() {
        let mut term = Term::new("later");
        term.expiration = Some(date(2025, 1, 1));
        let (state, logs) = capture_logs(|| check_expiration(&term, "INPUT", &ctx()));
        assert_eq!(state, Lifecycle::Active);
        assert!(logs.is_empty());
    }

    #[test]
    fn test_log_limit_requires_logging() {
        let mut term = Term::new("limited");
        term.log_limit = Some(LogLimit {
            count: 99,
            unit: TimeUnit::Day,
        });
        let registry = TokenRegistry::base().with_fields(&[
            crate::core::tokens::Field::LogLimit,
            crate::core::tokens::Field::Logging,
        ]);
        assert!(matches!(
            validate_term(&term, &registry),
            Err(Error::LimitButNoLog { .. })
        ));
        term.logging = Some(Logging::Syslog);
        assert!(validate_term(&term, &registry).is_ok());
        term.logging = Some(Logging::Disable);
        assert!(validate_term(&term, &registry).is_err());
    }

    #[test]
    fn test_icmp_family_mismatch() {
        let mut term = Term::new("ping");
        term.protocol = vec!["icmp".to_string()];
        let (hit, logs) = capture_logs(|| {
            icmp_family_mismatch(&term, AddressFamily::Inet6).map(str::to_string)
        });
        assert_eq!(hit.as_deref(), Some("icmp"));
        assert!(logs.contains("will not be rendered"));
        assert!(icmp_family_mismatch(&term, AddressFamily::Inet).is_none());
    }

    #[test]
    fn test_duplicate_terms() {
        assert!(check_duplicate_terms(["a", "b"], "INPUT").is_ok());
        let err = check_duplicate_terms(["a", "b", "a"], "INPUT").unwrap_err();
        assert!(matches!(err, Error::DuplicateTerm { ref term, .. } if term == "a"));
    }

    #[test]
    fn test_platform_names() {
        assert_eq!("nsxv".parse::<Platform>().unwrap(), Platform::Nsxv);
        assert_eq!(Platform::Iptables.suffix(), "ipt");
        assert_eq!(Platform::Nsxv.generator().platform(), Platform::Nsxv);
    }
}
