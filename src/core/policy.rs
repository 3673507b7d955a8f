//! Policy AST consumed by the renderers
//!
//! A [`Policy`] is an ordered list of [`Filter`]s, each pairing a [`Header`]
//! with its [`Term`]s. Addresses and ports arrive already resolved; nothing
//! in this module talks to a naming service.
//!
//! Every term keyword is a named optional slot on [`Term`], including keywords
//! that only some backends understand. Keywords the model does not know at all
//! are kept in [`Term::extra`] so validation can name them instead of silently
//! dropping them.

use chrono::NaiveDate;
use ipnetwork::IpNetwork;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use crate::core::tokens::Field;

/// Address family selected by a target or carried by an address
#[derive(
    Debug,
    Clone,
    Copy,
    Serialize,
    Deserialize,
    PartialEq,
    Eq,
    Hash,
    Default,
    strum::Display,
    strum::EnumString,
    strum::AsRefStr,
)]
#[serde(rename_all = "lowercase")]
pub enum AddressFamily {
    #[default]
    #[strum(serialize = "inet")]
    Inet,
    #[strum(serialize = "inet6")]
    Inet6,
}

impl AddressFamily {
    pub const fn as_str(self) -> &'static str {
        match self {
            AddressFamily::Inet => "inet",
            AddressFamily::Inet6 => "inet6",
        }
    }

    pub fn matches(self, net: &IpNetwork) -> bool {
        match self {
            AddressFamily::Inet => net.is_ipv4(),
            AddressFamily::Inet6 => net.is_ipv6(),
        }
    }

    /// Returns the block covering every address of the family.
    pub fn all_addresses(self) -> IpNetwork {
        let addr = match self {
            AddressFamily::Inet => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            AddressFamily::Inet6 => IpAddr::V6(Ipv6Addr::UNSPECIFIED),
        };
        IpNetwork::new(addr, 0).unwrap_or_else(|_| IpNetwork::from(addr))
    }
}

/// Term verdict
#[derive(
    Debug,
    Clone,
    Copy,
    Serialize,
    Deserialize,
    PartialEq,
    Eq,
    Hash,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
    strum::AsRefStr,
)]
#[serde(rename_all = "kebab-case")]
pub enum Action {
    #[strum(serialize = "accept")]
    Accept,
    #[strum(serialize = "deny")]
    Deny,
    #[strum(serialize = "reject")]
    Reject,
    /// Falls through to the next term instead of terminating
    #[strum(serialize = "next")]
    Next,
    #[strum(serialize = "reject-with-tcp-rst")]
    RejectWithTcpRst,
}

impl Action {
    pub const fn as_str(self) -> &'static str {
        match self {
            Action::Accept => "accept",
            Action::Deny => "deny",
            Action::Reject => "reject",
            Action::Next => "next",
            Action::RejectWithTcpRst => "reject-with-tcp-rst",
        }
    }
}

/// Logging keyword values
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, strum::Display, strum::AsRefStr,
)]
#[serde(rename_all = "kebab-case")]
pub enum Logging {
    #[strum(serialize = "true")]
    True,
    #[strum(serialize = "syslog")]
    Syslog,
    #[strum(serialize = "local")]
    Local,
    #[strum(serialize = "log-both")]
    LogBoth,
    #[strum(serialize = "disable")]
    Disable,
}

impl Logging {
    pub const fn is_enabled(self) -> bool {
        !matches!(self, Logging::Disable)
    }
}

/// Time unit for log rate limiting
#[derive(
    Debug,
    Clone,
    Copy,
    Serialize,
    Deserialize,
    PartialEq,
    Eq,
    strum::Display,
    strum::EnumString,
    strum::AsRefStr,
)]
#[serde(rename_all = "lowercase")]
pub enum TimeUnit {
    #[strum(serialize = "second")]
    Second,
    #[strum(serialize = "minute")]
    Minute,
    #[strum(serialize = "hour")]
    Hour,
    #[strum(serialize = "day")]
    Day,
}

impl TimeUnit {
    pub const fn as_str(self) -> &'static str {
        match self {
            TimeUnit::Second => "second",
            TimeUnit::Minute => "minute",
            TimeUnit::Hour => "hour",
            TimeUnit::Day => "day",
        }
    }
}

/// Log rate limit, rendered as `count/unit`
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct LogLimit {
    pub count: u32,
    pub unit: TimeUnit,
}

impl fmt::Display for LogLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.count, self.unit.as_str())
    }
}

/// Inclusive port range
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct PortRange {
    pub start: u16,
    pub end: u16,
}

impl PortRange {
    pub fn single(port: u16) -> Self {
        Self {
            start: port,
            end: port,
        }
    }

    pub fn new(start: u16, end: u16) -> Self {
        Self { start, end }
    }

    pub const fn is_single(&self) -> bool {
        self.start == self.end
    }

    /// Renders with a custom range separator (`:` for iptables multiport).
    pub fn join_with(&self, separator: char) -> String {
        if self.is_single() {
            self.start.to_string()
        } else {
            format!("{}{}{}", self.start, separator, self.end)
        }
    }
}

impl fmt::Display for PortRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.start == self.end {
            write!(f, "{}", self.start)
        } else {
            write!(f, "{}-{}", self.start, self.end)
        }
    }
}

/// Inclusive numeric range used for packet length and fragment offset
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ValueRange {
    pub start: u32,
    pub end: u32,
}

impl fmt::Display for ValueRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.start == self.end {
            write!(f, "{}", self.start)
        } else {
            write!(f, "{}:{}", self.start, self.end)
        }
    }
}

/// ICMP code given either by number or by symbolic name
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum IcmpCode {
    Number(u8),
    Name(String),
}

impl fmt::Display for IcmpCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IcmpCode::Number(n) => write!(f, "{n}"),
            IcmpCode::Name(name) => f.write_str(name),
        }
    }
}

/// Raw backend text attached to a term
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Verbatim {
    pub platform: String,
    pub text: String,
}

/// One term of a filter
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Term {
    pub name: String,
    pub action: Option<Action>,
    pub comment: Vec<String>,
    pub owner: Option<String>,
    pub expiration: Option<NaiveDate>,
    pub protocol: Vec<String>,
    pub protocol_except: Vec<String>,
    pub source_address: Vec<IpNetwork>,
    pub source_address_exclude: Vec<IpNetwork>,
    pub destination_address: Vec<IpNetwork>,
    pub destination_address_exclude: Vec<IpNetwork>,
    pub source_port: Vec<PortRange>,
    pub destination_port: Vec<PortRange>,
    pub source_prefix: Vec<String>,
    pub destination_prefix: Vec<String>,
    pub source_interface: Option<String>,
    pub destination_interface: Option<String>,
    pub option: Vec<String>,
    pub icmp_type: Vec<String>,
    pub icmp_code: Vec<IcmpCode>,
    pub logging: Option<Logging>,
    pub log_limit: Option<LogLimit>,
    pub counter: Option<String>,
    pub policer: Option<String>,
    pub routing_instance: Option<String>,
    pub ether_type: Vec<String>,
    pub packet_length: Option<ValueRange>,
    pub fragment_offset: Option<ValueRange>,
    pub stateless_reply: bool,
    pub platform: Vec<String>,
    pub platform_exclude: Vec<String>,
    pub verbatim: Vec<Verbatim>,
    /// Keywords the model does not recognise
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl Term {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Lists the keywords this term actually sets.
    ///
    /// `name` is always present. Keywords only count once populated, so an
    /// empty `comment` list does not require backend support for comments.
    pub fn populated_fields(&self) -> BTreeSet<Field> {
        let mut fields = BTreeSet::from([Field::Name]);
        let mut mark = |set: bool, field: Field| {
            if set {
                fields.insert(field);
            }
        };
        mark(self.action.is_some(), Field::Action);
        mark(!self.comment.is_empty(), Field::Comment);
        mark(self.owner.is_some(), Field::Owner);
        mark(self.expiration.is_some(), Field::Expiration);
        mark(!self.protocol.is_empty(), Field::Protocol);
        mark(!self.protocol_except.is_empty(), Field::ProtocolExcept);
        mark(!self.source_address.is_empty(), Field::SourceAddress);
        mark(
            !self.source_address_exclude.is_empty(),
            Field::SourceAddressExclude,
        );
        mark(!self.destination_address.is_empty(), Field::DestinationAddress);
        mark(
            !self.destination_address_exclude.is_empty(),
            Field::DestinationAddressExclude,
        );
        mark(!self.source_port.is_empty(), Field::SourcePort);
        mark(!self.destination_port.is_empty(), Field::DestinationPort);
        mark(!self.source_prefix.is_empty(), Field::SourcePrefix);
        mark(!self.destination_prefix.is_empty(), Field::DestinationPrefix);
        mark(self.source_interface.is_some(), Field::SourceInterface);
        mark(
            self.destination_interface.is_some(),
            Field::DestinationInterface,
        );
        mark(!self.option.is_empty(), Field::Option);
        mark(!self.icmp_type.is_empty(), Field::IcmpType);
        mark(!self.icmp_code.is_empty(), Field::IcmpCode);
        mark(self.logging.is_some(), Field::Logging);
        mark(self.log_limit.is_some(), Field::LogLimit);
        mark(self.counter.is_some(), Field::Counter);
        mark(self.policer.is_some(), Field::Policer);
        mark(self.routing_instance.is_some(), Field::RoutingInstance);
        mark(!self.ether_type.is_empty(), Field::EtherType);
        mark(self.packet_length.is_some(), Field::PacketLength);
        mark(self.fragment_offset.is_some(), Field::FragmentOffset);
        mark(self.stateless_reply, Field::StatelessReply);
        mark(!self.platform.is_empty(), Field::Platform);
        mark(!self.platform_exclude.is_empty(), Field::PlatformExclude);
        mark(!self.verbatim.is_empty(), Field::Verbatim);
        fields
    }

    pub fn logs(&self) -> bool {
        self.logging.is_some_and(Logging::is_enabled)
    }

    pub fn has_option(&self, option: &str) -> bool {
        self.option.iter().any(|o| o == option)
    }

    /// Verbatim lines targeted at `platform`, in declaration order.
    pub fn verbatim_for<'a>(&'a self, platform: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.verbatim
            .iter()
            .filter(move |v| v.platform == platform)
            .map(|v| v.text.as_str())
    }

    /// Whether the term's platform include/exclude lists let it through.
    pub fn applies_to(&self, platform: &str) -> bool {
        if !self.platform.is_empty() && !self.platform.iter().any(|p| p == platform) {
            return false;
        }
        !self.platform_exclude.iter().any(|p| p == platform)
    }

    /// Comment lines followed by the owner annotation.
    pub fn comment_lines(&self) -> Vec<String> {
        let mut lines = self.comment.clone();
        if let Some(owner) = &self.owner {
            lines.push(format!("Owner: {owner}"));
        }
        lines
    }
}

/// One backend directive of a header: `platform option option ...`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Target {
    pub platform: String,
    #[serde(default)]
    pub options: Vec<String>,
}

impl Target {
    pub fn new(platform: impl Into<String>, options: &[&str]) -> Self {
        Self {
            platform: platform.into(),
            options: options.iter().map(|o| (*o).to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct Header {
    #[serde(default)]
    pub comment: Vec<String>,
    #[serde(default)]
    pub targets: Vec<Target>,
}

impl Header {
    /// First directive for `platform`, if any.
    pub fn target(&self, platform: &str) -> Option<&Target> {
        self.targets.iter().find(|t| t.platform == platform)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Filter {
    pub header: Header,
    #[serde(default)]
    pub terms: Vec<Term>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Policy {
    /// Name used in log messages, usually the policy file stem
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub filters: Vec<Filter>,
}

impl Policy {
    /// Platforms named by any header, in first-seen order.
    pub fn platforms(&self) -> Vec<String> {
        let mut seen = Vec::new();
        for target in self.filters.iter().flat_map(|f| &f.header.targets) {
            if !seen.contains(&target.platform) {
                seen.push(target.platform.clone());
            }
        }
        seen
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_term_json_round_trip_keeps_unknown_keywords() {
        let json = r#"{
            "name": "t1",
            "action": "accept",
            "protocol": ["tcp"],
            "destination_port": [{"start": 22, "end": 22}],
            "traffic_type": "unknown-unicast"
        }"#;
        let term: Term = serde_json::from_str(json).unwrap();
        assert_eq!(term.action, Some(Action::Accept));
        assert_eq!(term.destination_port, vec![PortRange::single(22)]);
        assert!(term.extra.contains_key("traffic_type"));
    }

    #[test]
    fn test_populated_fields_only_lists_set_keywords() {
        let mut term = Term::new("t1");
        term.action = Some(Action::Deny);
        term.protocol = vec!["udp".to_string()];
        let fields = term.populated_fields();
        assert_eq!(
            fields,
            BTreeSet::from([Field::Name, Field::Action, Field::Protocol])
        );
    }

    #[test]
    fn test_applies_to_platform_lists() {
        let mut term = Term::new("t1");
        assert!(term.applies_to("iptables"));
        term.platform = vec!["nsxv".to_string()];
        assert!(!term.applies_to("iptables"));
        term.platform.clear();
        term.platform_exclude = vec!["iptables".to_string()];
        assert!(!term.applies_to("iptables"));
        assert!(term.applies_to("nsxv"));
    }

    #[test]
    fn test_comment_lines_append_owner() {
        let mut term = Term::new("t1");
        term.comment = vec!["first".to_string()];
        term.owner = Some("foo@example.com".to_string());
        assert_eq!(
            term.comment_lines(),
            vec!["first".to_string(), "Owner: foo@example.com".to_string()]
        );
    }

    #[test]
    fn test_all_addresses_per_family() {
        assert_eq!(
            AddressFamily::Inet.all_addresses().to_string(),
            "0.0.0.0/0"
        );
        assert_eq!(AddressFamily::Inet6.all_addresses().to_string(), "::/0");
    }

    #[test]
    fn test_range_display() {
        assert_eq!(PortRange::new(1024, 65535).to_string(), "1024-65535");
        assert_eq!(PortRange::new(1024, 65535).join_with(':'), "1024:65535");
        assert_eq!(PortRange::single(53).join_with(':'), "53");
        assert_eq!(ValueRange { start: 1, end: 119 }.to_string(), "1:119");
        assert_eq!(LogLimit { count: 99, unit: TimeUnit::Day }.to_string(), "99/day");
    }
}
