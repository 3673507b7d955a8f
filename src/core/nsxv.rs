//! NSX-V backend
//!
//! Renders one distributed-firewall `<section>` per policy. Terms become
//! `<rule>` elements built as a small in-memory tree ([`Section`],
//! [`NsxvRule`], [`Service`]) and serialised through `Display`.
//!
//! Exclusions are applied by splitting include blocks, since NSX-V rules
//! have no early-return mechanism. A `mixed` section carries both address
//! families in the same rule.

use ipnetwork::IpNetwork;
use std::collections::BTreeSet;
use std::fmt;
use tracing::debug;

use crate::core::address::exclude_addrs;
use crate::core::aclgen::{
    AclGenerator, Lifecycle, Platform, RenderContext, check_duplicate_terms, check_expiration,
    icmp_family_mismatch, lacks_family, validate_term,
};
use crate::core::error::{Error, Result};
use crate::core::policy::{Action, AddressFamily, Policy, PortRange, Term};
use crate::core::tables;
use crate::core::tokens::{Field, TokenRegistry};
use crate::validators::{fix_term_length, sanitize_comment};

const PLATFORM: &str = "nsxv";

/// Longest rule name NSX-V accepts
pub const TERM_MAX_LENGTH: usize = 255;

/// Longest `<notes>` text
pub const NOTES_MAX_LENGTH: usize = 255;

const XML_HEADER: &str = r#"<?xml version="1.0" encoding="UTF-8"?>"#;

/// Address families a section carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum FilterType {
    Inet,
    Inet6,
    Mixed,
}

impl FilterType {
    pub fn admits(self, net: &IpNetwork) -> bool {
        match self {
            FilterType::Inet => net.is_ipv4(),
            FilterType::Inet6 => net.is_ipv6(),
            FilterType::Mixed => true,
        }
    }

    /// The single family of this section; `None` for `mixed`.
    pub fn family(self) -> Option<AddressFamily> {
        match self {
            FilterType::Inet => Some(AddressFamily::Inet),
            FilterType::Inet6 => Some(AddressFamily::Inet6),
            FilterType::Mixed => None,
        }
    }
}

/// Parsed `nsxv <section-name> <type> [section-id] [securitygroup <id>]` target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionOptions {
    pub name: String,
    pub filter_type: FilterType,
    pub section_id: Option<String>,
    pub security_group: Option<String>,
}

impl SectionOptions {
    /// # Errors
    ///
    /// [`Error::UnsupportedAccessList`] for a missing name or type, an
    /// unknown type, a non-numeric section id or a dangling
    /// `securitygroup`.
    pub fn parse(options: &[String]) -> Result<Self> {
        let [name, filter_type, rest @ ..] = options else {
            return Err(Error::UnsupportedAccessList(
                "nsxv target needs a section name and a filter type".to_string(),
            ));
        };
        let filter_type: FilterType = filter_type.parse().map_err(|_| {
            Error::UnsupportedAccessList(format!(
                "filter type must be one of inet, inet6 or mixed, not '{filter_type}'"
            ))
        })?;

        let mut section_id = None;
        let mut security_group = None;
        let mut rest = rest.iter();
        while let Some(option) = rest.next() {
            if option == "securitygroup" {
                let id = rest.next().ok_or_else(|| {
                    Error::UnsupportedAccessList("securitygroup needs an id".to_string())
                })?;
                security_group = Some(id.clone());
            } else if section_id.is_none() && option.chars().all(|c| c.is_ascii_digit()) {
                section_id = Some(option.clone());
            } else {
                return Err(Error::UnsupportedAccessList(format!(
                    "unexpected option '{option}'"
                )));
            }
        }

        Ok(Self {
            name: name.clone(),
            filter_type,
            section_id,
            security_group,
        })
    }
}

/// Escapes the characters XML text and attributes cannot carry raw.
fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            other => out.push(other),
        }
    }
    out
}

/// Host routes are written as bare addresses.
fn address_value(net: &IpNetwork) -> String {
    let host = match net {
        IpNetwork::V4(_) => 32,
        IpNetwork::V6(_) => 128,
    };
    if net.prefix() == host {
        net.ip().to_string()
    } else {
        format!("{}/{}", net.network(), net.prefix())
    }
}

fn address_type(net: &IpNetwork) -> &'static str {
    if net.is_ipv4() {
        "Ipv4Address"
    } else {
        "Ipv6Address"
    }
}

/// One `<service>` element
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Service {
    pub protocol: u8,
    /// ICMP type number
    pub sub_protocol: Option<u8>,
    pub source_ports: Option<String>,
    pub destination_ports: Option<String>,
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "      <service>")?;
        writeln!(f, "        <protocol>{}</protocol>", self.protocol)?;
        if let Some(sub) = self.sub_protocol {
            writeln!(f, "        <subProtocol>{sub}</subProtocol>")?;
        }
        if let Some(ports) = &self.source_ports {
            writeln!(f, "        <sourcePort>{ports}</sourcePort>")?;
        }
        if let Some(ports) = &self.destination_ports {
            writeln!(f, "        <destinationPort>{ports}</destinationPort>")?;
        }
        writeln!(f, "      </service>")
    }
}

/// One `<rule>` element
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NsxvRule {
    pub name: String,
    pub action: &'static str,
    pub logged: bool,
    pub security_group: Option<String>,
    pub sources: Vec<IpNetwork>,
    pub destinations: Vec<IpNetwork>,
    pub services: Vec<Service>,
    pub notes: Option<String>,
}

fn write_addresses(
    f: &mut fmt::Formatter<'_>,
    list: &str,
    item: &str,
    addresses: &[IpNetwork],
) -> fmt::Result {
    if addresses.is_empty() {
        return Ok(());
    }
    writeln!(f, "    <{list} excluded=\"false\">")?;
    for net in addresses {
        writeln!(f, "      <{item}>")?;
        writeln!(f, "        <type>{}</type>", address_type(net))?;
        writeln!(f, "        <value>{}</value>", address_value(net))?;
        writeln!(f, "      </{item}>")?;
    }
    writeln!(f, "    </{list}>")
}

impl fmt::Display for NsxvRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "  <rule logged=\"{}\">", self.logged)?;
        writeln!(f, "    <name>{}</name>", escape(&self.name))?;
        writeln!(f, "    <action>{}</action>", self.action)?;
        if let Some(group) = &self.security_group {
            writeln!(f, "    <appliedToList>")?;
            writeln!(f, "      <appliedTo>")?;
            writeln!(f, "        <type>SecurityGroup</type>")?;
            writeln!(f, "        <value>{}</value>", escape(group))?;
            writeln!(f, "      </appliedTo>")?;
            writeln!(f, "    </appliedToList>")?;
        }
        write_addresses(f, "sources", "source", &self.sources)?;
        write_addresses(f, "destinations", "destination", &self.destinations)?;
        if !self.services.is_empty() {
            writeln!(f, "    <services>")?;
            for service in &self.services {
                write!(f, "{service}")?;
            }
            writeln!(f, "    </services>")?;
        }
        if let Some(notes) = &self.notes {
            writeln!(f, "    <notes>{}</notes>", escape(notes))?;
        }
        writeln!(f, "  </rule>")
    }
}

/// The `<section>` document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    pub id: Option<String>,
    pub name: String,
    pub rules: Vec<NsxvRule>,
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{XML_HEADER}")?;
        match &self.id {
            Some(id) => writeln!(
                f,
                "<section id=\"{}\" name=\"{}\">",
                escape(id),
                escape(&self.name)
            )?,
            None => writeln!(f, "<section name=\"{}\">", escape(&self.name))?,
        }
        for rule in &self.rules {
            write!(f, "{rule}")?;
        }
        writeln!(f, "</section>")
    }
}

/// The NSX-V renderer
#[derive(Debug, Clone, Copy, Default)]
pub struct Nsxv;

impl AclGenerator for Nsxv {
    fn platform(&self) -> Platform {
        Platform::Nsxv
    }

    fn build_tokens(&self) -> TokenRegistry {
        TokenRegistry::base()
            .with_fields(&[Field::Logging, Field::Owner])
            .without_values(Field::Action, &["next"])
    }

    fn render(&self, policy: &Policy, ctx: &RenderContext) -> Result<String> {
        let registry = self.build_tokens();
        let mut section: Option<Section> = None;

        for filter in &policy.filters {
            let Some(target) = filter.header.target(PLATFORM) else {
                continue;
            };
            if section.is_some() {
                return Err(Error::UnsupportedAccessList(
                    "only one nsxv filter is allowed per policy".to_string(),
                ));
            }
            let options = SectionOptions::parse(&target.options)?;
            check_duplicate_terms(filter.terms.iter().map(|t| t.name.as_str()), &policy.name)?;
            for term in &filter.terms {
                validate_term(term, &registry)?;
            }

            let mut rules = Vec::new();
            for term in &filter.terms {
                if let Some(rule) = build_rule(term, &options, ctx)? {
                    rules.push(rule);
                }
            }
            section = Some(Section {
                id: options.section_id.clone(),
                name: options.name.clone(),
                rules,
            });
        }

        section
            .map(|s| s.to_string())
            .ok_or_else(|| Error::NoTargets(PLATFORM.to_string()))
    }
}

/// Builds one rule; `None` means the term is skipped for this section.
fn build_rule(
    term: &Term,
    options: &SectionOptions,
    ctx: &RenderContext,
) -> Result<Option<NsxvRule>> {
    let acl_error = |reason: &str| Error::AclTerm {
        term: term.name.clone(),
        reason: reason.to_string(),
    };

    if !term.applies_to(PLATFORM) {
        debug!("Term {} is not rendered for {}", term.name, PLATFORM);
        return Ok(None);
    }
    if check_expiration(term, &options.name, ctx) == Lifecycle::Expired {
        return Ok(None);
    }
    if !term.verbatim.is_empty() {
        return Err(acl_error("verbatim is not supported"));
    }
    if let Some(family) = options.filter_type.family() {
        if icmp_family_mismatch(term, family).is_some() {
            return Ok(None);
        }
        if lacks_family(&term.source_address, family)
            || lacks_family(&term.destination_address, family)
        {
            debug!(
                "Term {} will not be rendered, as it has no {} addresses.",
                term.name,
                family.as_str()
            );
            return Ok(None);
        }
    }

    if term.has_option("established") || term.has_option("tcp-established") {
        debug!(
            "Term {} uses established traffic matching, which the NSX-V firewall tracks itself; skipping it.",
            term.name
        );
        return Ok(None);
    }
    if let Some(option) = term.option.iter().find(|o| o.as_str() != "sample") {
        return Err(acl_error(&format!("option '{option}' is not supported")));
    }

    let name = fix_term_length(&term.name, TERM_MAX_LENGTH, false, false, &[])?;
    let action = match term.action {
        Some(Action::Accept) => "allow",
        Some(Action::Deny) => "deny",
        Some(Action::Reject | Action::RejectWithTcpRst) => "reject",
        Some(Action::Next) => return Err(acl_error("action 'next' is not supported")),
        None => {
            return Err(Error::UnsupportedFilter {
                term: term.name.clone(),
                reason: "term has no action".to_string(),
            });
        }
    };

    let Some(sources) = side(
        &term.source_address,
        &term.source_address_exclude,
        options.filter_type,
    ) else {
        debug!("Term {} will not be rendered, as its source excludes cover every address.", term.name);
        return Ok(None);
    };
    let Some(destinations) = side(
        &term.destination_address,
        &term.destination_address_exclude,
        options.filter_type,
    ) else {
        debug!(
            "Term {} will not be rendered, as its destination excludes cover every address.",
            term.name
        );
        return Ok(None);
    };

    Ok(Some(NsxvRule {
        name,
        action,
        logged: term.logs(),
        security_group: options.security_group.clone(),
        sources,
        destinations,
        services: services(term)?,
        notes: sanitize_comment(&term.comment_lines(), NOTES_MAX_LENGTH),
    }))
}

/// Address list of one side after exclusions; `None` if all were excluded.
fn side(
    includes: &[IpNetwork],
    excludes: &[IpNetwork],
    filter_type: FilterType,
) -> Option<Vec<IpNetwork>> {
    let includes: Vec<IpNetwork> = if includes.is_empty() {
        if excludes.is_empty() {
            // any address
            return Some(Vec::new());
        }
        match filter_type.family() {
            Some(family) => vec![family.all_addresses()],
            None => vec![
                AddressFamily::Inet.all_addresses(),
                AddressFamily::Inet6.all_addresses(),
            ],
        }
    } else {
        includes
            .iter()
            .filter(|n| filter_type.admits(n))
            .copied()
            .collect()
    };
    let kept = exclude_addrs(&includes, excludes);
    if kept.is_empty() { None } else { Some(kept) }
}

fn join_ports(ports: &[PortRange]) -> Option<String> {
    if ports.is_empty() {
        return None;
    }
    Some(
        ports
            .iter()
            .map(|p| p.join_with('-'))
            .collect::<Vec<_>>()
            .join(","),
    )
}

fn services(term: &Term) -> Result<Vec<Service>> {
    if !term.icmp_type.is_empty()
        && !term
            .protocol
            .iter()
            .any(|p| tables::icmp_protocol_family(p).is_some())
    {
        return Err(Error::UnsupportedFilter {
            term: term.name.clone(),
            reason: "icmp-type requires protocol icmp or icmpv6".to_string(),
        });
    }

    let mut services = Vec::new();
    let mut seen = BTreeSet::new();
    for protocol in &term.protocol {
        let number = tables::protocol_number(protocol).ok_or_else(|| Error::UnsupportedFilter {
            term: term.name.clone(),
            reason: format!("unknown protocol '{protocol}'"),
        })?;
        if !seen.insert(number) {
            continue;
        }

        if let Some(family) = tables::icmp_protocol_family(protocol)
            && !term.icmp_type.is_empty()
        {
            for icmp_type in &term.icmp_type {
                let sub = tables::icmp_type_number(family, icmp_type).ok_or_else(|| {
                    Error::UnsupportedFilter {
                        term: term.name.clone(),
                        reason: format!(
                            "icmp-type {icmp_type} does not exist in the {} family",
                            family.as_str()
                        ),
                    }
                })?;
                services.push(Service {
                    protocol: number,
                    sub_protocol: Some(sub),
                    source_ports: None,
                    destination_ports: None,
                });
            }
            continue;
        }

        let ported = matches!(protocol.as_str(), "tcp" | "udp");
        services.push(Service {
            protocol: number,
            sub_protocol: None,
            source_ports: if ported { join_ports(&term.source_port) } else { None },
            destination_ports: if ported {
                join_ports(&term.destination_port)
            } else {
                None
            },
        });
    }
    Ok(services)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::policy::{Logging, Verbatim};
    use crate::core::test_helpers::{capture_logs, ctx, date, nets, policy, strings, tcp_term, term};

    fn render(options: &[&str], terms: Vec<Term>) -> Result<String> {
        Nsxv.render(&policy("nsxv", options, terms), &ctx())
    }

    fn render_ok(options: &[&str], terms: Vec<Term>) -> String {
        render(options, terms).unwrap()
    }

    fn imap_reject() -> Term {
        let mut t = tcp_term("reject-imap-requests", 143);
        t.action = Some(Action::Reject);
        t.destination_address = nets(&["200.1.1.4/31"]);
        t
    }

    #[test]
    fn test_section_with_id() {
        let out = render_ok(&["POLICY_NAME", "inet", "1007"], vec![imap_reject()]);
        assert!(out.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n"));
        assert!(out.contains("<section id=\"1007\" name=\"POLICY_NAME\">"));
        assert!(out.contains("<name>reject-imap-requests</name>"));
        assert!(out.contains("<action>reject</action>"));
        assert!(out.contains("<type>Ipv4Address</type>"));
        assert!(out.contains("<value>200.1.1.4/31</value>"));
        assert!(out.contains("<protocol>6</protocol>"));
        assert!(out.contains("<destinationPort>143</destinationPort>"));
        assert!(out.trim_end().ends_with("</section>"));
    }

    #[test]
    fn test_section_without_id() {
        let mut t = term("accept-icmp", Action::Accept, &["icmp"]);
        t.icmp_type = strings(&["echo-request"]);
        let out = render_ok(&["POLICY_NO_SECTION_ID_NAME", "inet"], vec![t]);
        assert!(out.contains("<section name=\"POLICY_NO_SECTION_ID_NAME\">"));
        assert!(out.contains("<action>allow</action>"));
        assert!(out.contains("<protocol>1</protocol>"));
        assert!(out.contains("<subProtocol>8</subProtocol>"));
    }

    #[test]
    fn test_bad_filter_type() {
        assert!(matches!(
            render(&["POLICY_NAME"], vec![imap_reject()]),
            Err(Error::UnsupportedAccessList(_))
        ));
        assert!(matches!(
            render(&["POLICY_NAME", "ipv4"], vec![imap_reject()]),
            Err(Error::UnsupportedAccessList(_))
        ));
        assert!(matches!(
            render(&["POLICY_NAME", "inet", "securitygroup"], vec![imap_reject()]),
            Err(Error::UnsupportedAccessList(_))
        ));
    }

    #[test]
    fn test_security_group_applied_to() {
        let out = render_ok(
            &["POLICY_NAME", "inet", "1009", "securitygroup", "securitygroup-12"],
            vec![imap_reject()],
        );
        assert!(out.contains("<section id=\"1009\""));
        assert!(out.contains("<type>SecurityGroup</type>"));
        assert!(out.contains("<value>securitygroup-12</value>"));
    }

    #[test]
    fn test_option_keyword_is_error() {
        let mut t = imap_reject();
        t.option = strings(&["syn"]);
        assert!(matches!(
            render(&["POLICY_NAME", "inet"], vec![t]),
            Err(Error::AclTerm { .. })
        ));
    }

    #[test]
    fn test_established_is_skipped() {
        let mut t = tcp_term("return-traffic", 443);
        t.option = strings(&["tcp-established"]);
        let (out, logs) = capture_logs(|| render_ok(&["POLICY_NAME", "inet"], vec![t, imap_reject()]));
        assert!(!out.contains("return-traffic"));
        assert!(out.contains("reject-imap-requests"));
        assert!(logs.contains("return-traffic"));
    }

    #[test]
    fn test_verbatim_is_error() {
        let mut t = Term::new("raw");
        t.verbatim = vec![Verbatim {
            platform: "nsxv".to_string(),
            text: "<rule/>".to_string(),
        }];
        assert!(matches!(
            render(&["POLICY_NAME", "inet"], vec![t]),
            Err(Error::AclTerm { .. })
        ));
    }

    #[test]
    fn test_next_action_not_supported() {
        let t = term("fallthrough", Action::Next, &["tcp"]);
        assert!(matches!(
            render(&["POLICY_NAME", "inet"], vec![t]),
            Err(Error::UnsupportedFilter { .. })
        ));
    }

    #[test]
    fn test_hosts_and_exclusions() {
        let mut t = tcp_term("split", 22);
        t.source_address = nets(&["10.0.0.0/30", "192.168.1.1/32", "2001:db8::1/128"]);
        t.source_address_exclude = nets(&["10.0.0.0/31"]);
        let out = render_ok(&["POLICY_NAME", "mixed"], vec![t.clone()]);
        assert!(out.contains("<value>10.0.0.2/31</value>"));
        assert!(!out.contains("<value>10.0.0.0/30</value>"));
        assert!(out.contains("<value>192.168.1.1</value>"));
        assert!(out.contains("<type>Ipv6Address</type>"));
        assert!(out.contains("<value>2001:db8::1</value>"));

        let out = render_ok(&["POLICY_NAME", "inet"], vec![t]);
        assert!(!out.contains("Ipv6Address"));
    }

    #[test]
    fn test_exclude_without_include_starts_from_any() {
        let mut t = tcp_term("no-from-mgmt", 22);
        t.source_address_exclude = nets(&["10.0.0.0/8"]);
        let out = render_ok(&["POLICY_NAME", "inet"], vec![t.clone()]);
        assert!(out.contains("<sources excluded=\"false\">"));
        assert!(out.contains("<value>0.0.0.0/5</value>"));
        assert!(out.contains("<value>11.0.0.0/8</value>"));
        assert!(out.contains("<value>128.0.0.0/1</value>"));
        assert!(!out.contains("<value>10.0.0.0/8</value>"));
        assert!(!out.contains("Ipv6Address"));

        // mixed keeps every v6 source
        let out = render_ok(&["POLICY_NAME", "mixed"], vec![t]);
        assert!(out.contains("<value>::/0</value>"));
        assert!(out.contains("<value>8.0.0.0/7</value>"));
    }

    #[test]
    fn test_fully_excluded_term_skipped() {
        let mut t = tcp_term("gone", 22);
        t.destination_address = nets(&["10.0.0.0/24"]);
        t.destination_address_exclude = nets(&["10.0.0.0/8"]);
        let out = render_ok(&["POLICY_NAME", "inet"], vec![t]);
        assert!(!out.contains("<rule"));
    }

    #[test]
    fn test_ports_and_multiple_protocols() {
        let mut t = term("web", Action::Accept, &["tcp", "udp", "gre"]);
        t.source_port = vec![PortRange::new(1024, 65535)];
        t.destination_port = vec![PortRange::single(80), PortRange::new(8000, 8080)];
        let out = render_ok(&["POLICY_NAME", "inet"], vec![t]);
        assert_eq!(out.matches("<destinationPort>80,8000-8080</destinationPort>").count(), 2);
        assert_eq!(out.matches("<sourcePort>1024-65535</sourcePort>").count(), 2);
        assert!(out.contains("<protocol>47</protocol>"));
    }

    #[test]
    fn test_unknown_protocol() {
        let t = term("odd", Action::Accept, &["notaprotocol"]);
        assert!(matches!(
            render(&["POLICY_NAME", "inet"], vec![t]),
            Err(Error::UnsupportedFilter { .. })
        ));
    }

    #[test]
    fn test_notes_logging_and_escaping() {
        let mut t = imap_reject();
        t.comment = strings(&["block <imap> & \"friends\""]);
        t.owner = Some("netops".to_string());
        t.logging = Some(Logging::True);
        let out = render_ok(&["POLICY_NAME", "inet"], vec![t]);
        assert!(out.contains("<rule logged=\"true\">"));
        assert!(out.contains("<notes>block &lt;imap&gt; &amp; friends Owner: netops</notes>"));
    }

    #[test]
    fn test_icmp_family_mismatch_skipped() {
        let t = term("v6-ping", Action::Accept, &["icmpv6"]);
        let out = render_ok(&["POLICY_NAME", "inet"], vec![t.clone()]);
        assert!(!out.contains("v6-ping"));
        let out = render_ok(&["POLICY_NAME", "mixed"], vec![t]);
        assert!(out.contains("<protocol>58</protocol>"));
    }

    #[test]
    fn test_icmp_type_without_icmp_protocol() {
        let mut t = tcp_term("stray-type", 22);
        t.icmp_type = strings(&["echo-request"]);
        assert!(matches!(
            render(&["POLICY_NAME", "inet"], vec![t]),
            Err(Error::UnsupportedFilter { ref reason, .. }) if reason.contains("icmp-type")
        ));
    }

    #[test]
    fn test_expired_term_not_rendered() {
        let mut t = imap_reject();
        t.expiration = Some(date(2020, 1, 1));
        let (out, logs) = capture_logs(|| render_ok(&["POLICY_NAME", "inet"], vec![t]));
        assert!(!out.contains("<rule"));
        assert_eq!(logs.matches("is expired").count(), 1);
    }

    #[test]
    fn test_one_section_per_policy() {
        let mut p = policy("nsxv", &["first", "inet"], vec![imap_reject()]);
        let second = p.filters[0].clone();
        p.filters.push(second);
        assert!(matches!(
            Nsxv.render(&p, &ctx()),
            Err(Error::UnsupportedAccessList(_))
        ));
    }

    #[test]
    fn test_duplicate_terms() {
        assert!(matches!(
            render(&["POLICY_NAME", "inet"], vec![imap_reject(), imap_reject()]),
            Err(Error::DuplicateTerm { .. })
        ));
    }

    #[test]
    fn test_build_tokens() {
        let registry = Nsxv.build_tokens();
        assert!(registry.supports(Field::Logging));
        assert!(!registry.supports(Field::LogLimit));
        assert!(!registry.supports_value(Field::Action, "next"));
        assert!(registry.supports_value(Field::Action, "reject-with-tcp-rst"));
    }
}
