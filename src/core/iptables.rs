//! iptables backend
//!
//! Renders each filter as `iptables-restore`-style append directives:
//!
//! - one header comment block per filter
//! - `-P <chain> <ACTION>` for built-in chains with a default action,
//!   `-N <chain>` for custom chains
//! - per term, a dedicated chain `<first letter of chain>_<term>` jumped to
//!   from the filter chain, so address-exclusion RETURN markers only leave
//!   the term
//!
//! Rule lines use a fixed clause order: protocol, interfaces, addresses,
//! ports, match-module options, comment, verdict. A logging term gets an
//! extra LOG line with the same matches ahead of each verdict line.

use std::collections::BTreeSet;
use std::fmt::Write as _;
use tracing::{debug, warn};

use crate::core::aclgen::{
    AclGenerator, Lifecycle, Platform, RenderContext, check_duplicate_terms, check_expiration,
    icmp_family_mismatch, lacks_family, validate_term,
};
use crate::core::address::{AddressPlan, PlanKind, plan_pair};
use crate::core::error::{Error, Result};
use crate::core::policy::{Action, AddressFamily, Filter, IcmpCode, Policy, PortRange, Term};
use crate::core::ports::{PortDirection, PortGroup, PortMatch, PortPair, combine, port_statement};
use crate::core::tables;
use crate::core::tokens::{Field, TCP_FLAG_KEYWORDS, TokenRegistry};
use crate::validators::{fix_term_length, log_prefix, sanitize_comment, validate_interface};

const PLATFORM: &str = "iptables";

/// Longest term name; the term chain adds a two-character prefix
pub const TERM_MAX_LENGTH: usize = 24;

/// Longest `--comment` value the comment match accepts
pub const COMMENT_MAX_LENGTH: usize = 255;

const BUILTIN_CHAINS: [&str; 3] = ["INPUT", "OUTPUT", "FORWARD"];

/// Other iptables verdicts, recognised only to reject them as defaults
const OTHER_VERDICTS: [&str; 4] = ["REJECT", "RETURN", "LOG", "QUEUE"];

const HIGH_PORTS: PortRange = PortRange {
    start: 1024,
    end: 65535,
};

/// Stateless stand-ins for established traffic: ACK set, or RST alone
const TCP_TRACK_FLAGS: [&str; 2] = [
    "--tcp-flags ACK ACK",
    "--tcp-flags ACK,FIN,RST,SYN RST",
];

const HEADER_WRAP: usize = 78;

/// Chain policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::EnumString)]
pub enum DefaultAction {
    #[strum(serialize = "ACCEPT")]
    Accept,
    #[strum(serialize = "DROP")]
    Drop,
}

/// Parsed `iptables <chain> [ACTION] [flags...]` target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterOptions {
    pub chain: String,
    pub default_action: Option<DefaultAction>,
    pub family: AddressFamily,
    /// Connection tracking via `-m state`; cleared by `nostate`
    pub stateful: bool,
    /// Comments in output; cleared by `noverbose`
    pub verbose: bool,
    pub abbreviate: bool,
    pub truncate: bool,
}

impl FilterOptions {
    /// Parses target options.
    ///
    /// # Errors
    ///
    /// - [`Error::UnsupportedTargetOption`] for an unknown flag, a missing
    ///   chain name or more than one address family
    /// - [`Error::UnsupportedDefaultAction`] for a verdict other than
    ///   ACCEPT or DROP
    pub fn parse(options: &[String]) -> Result<Self> {
        let unsupported = |option: &str| Error::UnsupportedTargetOption {
            platform: PLATFORM.to_string(),
            option: option.to_string(),
        };

        let Some((chain, rest)) = options.split_first() else {
            return Err(unsupported("missing chain name"));
        };
        if chain.is_empty() {
            return Err(unsupported("missing chain name"));
        }

        let mut parsed = FilterOptions {
            chain: chain.clone(),
            default_action: None,
            family: AddressFamily::Inet,
            stateful: true,
            verbose: true,
            abbreviate: false,
            truncate: false,
        };
        let mut families = Vec::new();

        for option in rest {
            match option.as_str() {
                "ACCEPT" => parsed.default_action = Some(DefaultAction::Accept),
                "DROP" => parsed.default_action = Some(DefaultAction::Drop),
                "inet" => families.push(AddressFamily::Inet),
                "inet6" => families.push(AddressFamily::Inet6),
                "nostate" => parsed.stateful = false,
                "noverbose" => parsed.verbose = false,
                "abbreviateterms" => parsed.abbreviate = true,
                "truncateterms" => parsed.truncate = true,
                verdict if OTHER_VERDICTS.contains(&verdict) => {
                    return Err(Error::UnsupportedDefaultAction {
                        action: verdict.to_string(),
                        chain: chain.clone(),
                    });
                }
                other => return Err(unsupported(other)),
            }
        }

        match families.as_slice() {
            [] => {}
            [family] => parsed.family = *family,
            _ => return Err(unsupported("more than one address family")),
        }

        if parsed.chain == "FORWARD" && parsed.default_action.is_none() {
            parsed.default_action = Some(DefaultAction::Drop);
        }

        Ok(parsed)
    }

    pub fn is_builtin(&self) -> bool {
        BUILTIN_CHAINS.contains(&self.chain.as_str())
    }

    /// Chain holding the rules of one term.
    fn term_chain(&self, term_name: &str) -> String {
        let prefix = self.chain.chars().next().unwrap_or('_');
        format!("{prefix}_{term_name}")
    }
}

/// The iptables renderer
#[derive(Debug, Clone, Copy, Default)]
pub struct Iptables;

impl AclGenerator for Iptables {
    fn platform(&self) -> Platform {
        Platform::Iptables
    }

    fn build_tokens(&self) -> TokenRegistry {
        TokenRegistry::base().with_fields(&[
            Field::Counter,
            Field::DestinationInterface,
            Field::DestinationPrefix,
            Field::FragmentOffset,
            Field::IcmpCode,
            Field::Logging,
            Field::LogLimit,
            Field::Owner,
            Field::PacketLength,
            Field::RoutingInstance,
            Field::SourceInterface,
            Field::SourcePrefix,
            Field::StatelessReply,
        ])
    }

    fn render(&self, policy: &Policy, ctx: &RenderContext) -> Result<String> {
        let registry = self.build_tokens();

        let mut targeted = Vec::new();
        for filter in &policy.filters {
            if let Some(target) = filter.header.target(PLATFORM) {
                targeted.push((filter, FilterOptions::parse(&target.options)?));
            }
        }
        if targeted.is_empty() {
            return Err(Error::NoTargets(PLATFORM.to_string()));
        }

        // every term is checked before any filter is rendered
        check_duplicate_terms(
            targeted
                .iter()
                .flat_map(|(filter, _)| filter.terms.iter().map(|t| t.name.as_str())),
            &policy.name,
        )?;
        for (filter, _) in &targeted {
            for term in &filter.terms {
                validate_term(term, &registry)?;
            }
        }

        // term chains share one namespace across filters
        let mut term_chains = BTreeSet::new();
        let mut out = String::new();
        for (filter, options) in &targeted {
            out.push_str(&render_filter(filter, options, ctx, &mut term_chains)?);
        }
        Ok(out)
    }
}

fn wrap(line: &str, width: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();
    for word in line.split_whitespace() {
        if !current.is_empty() && current.len() + 1 + word.len() > width {
            lines.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

fn render_filter(
    filter: &Filter,
    options: &FilterOptions,
    ctx: &RenderContext,
    term_chains: &mut BTreeSet<String>,
) -> Result<String> {
    let mut out = String::new();
    let _ = writeln!(out, "# Iptables {} Policy", options.chain);
    for line in filter.header.comment.iter().flat_map(|c| wrap(c, HEADER_WRAP)) {
        let _ = writeln!(out, "# {line}");
    }
    let _ = writeln!(out, "#");
    let _ = writeln!(out, "# {}", options.family.as_str());

    if options.is_builtin() {
        if let Some(action) = options.default_action {
            let _ = writeln!(out, "-P {} {action}", options.chain);
        }
    } else {
        warn!(
            "Filter is generating a non-standard chain that will not apply to traffic unless \
             linked from INPUT, OUTPUT or FORWARD filters. New chain name is: {}",
            options.chain
        );
        let _ = writeln!(out, "-N {}", options.chain);
    }

    for term in &filter.terms {
        for line in render_term(term, options, ctx, term_chains)? {
            let _ = writeln!(out, "{line}");
        }
    }
    Ok(out)
}

/// Runs the term state machine; an empty result means the term was skipped.
fn render_term(
    term: &Term,
    options: &FilterOptions,
    ctx: &RenderContext,
    term_chains: &mut BTreeSet<String>,
) -> Result<Vec<String>> {
    if !term.applies_to(PLATFORM) {
        debug!("Term {} is not rendered for {}", term.name, PLATFORM);
        return Ok(Vec::new());
    }
    if check_expiration(term, &options.chain, ctx) == Lifecycle::Expired {
        return Ok(Vec::new());
    }
    if icmp_family_mismatch(term, options.family).is_some() {
        return Ok(Vec::new());
    }

    let name = fix_term_length(
        &term.name,
        TERM_MAX_LENGTH,
        options.abbreviate,
        options.truncate,
        &ctx.abbreviations,
    )?;
    if !term_chains.insert(options.term_chain(&name)) {
        return Err(Error::DuplicateTerm {
            term: name,
            filter: options.chain.clone(),
        });
    }

    if !term.verbatim.is_empty() {
        return Ok(term.verbatim_for(PLATFORM).map(str::to_string).collect());
    }

    TermRenderer::new(term, options, name)?.render()
}

/// Emission state for one term
struct TermRenderer<'a> {
    term: &'a Term,
    options: &'a FilterOptions,
    name: String,
    chain: String,
    action: Action,
}

impl<'a> TermRenderer<'a> {
    fn new(term: &'a Term, options: &'a FilterOptions, name: String) -> Result<Self> {
        let Some(action) = term.action else {
            return Err(Error::UnsupportedFilter {
                term: term.name.clone(),
                reason: "term has no action".to_string(),
            });
        };
        Ok(Self {
            term,
            options,
            chain: options.term_chain(&name),
            name,
            action,
        })
    }

    fn unsupported(&self, reason: impl Into<String>) -> Error {
        Error::UnsupportedFilter {
            term: self.term.name.clone(),
            reason: reason.into(),
        }
    }

    fn family(&self) -> AddressFamily {
        self.options.family
    }

    fn render(&self) -> Result<Vec<String>> {
        let term = self.term;
        let family = self.family();

        if family == AddressFamily::Inet && term.protocol.iter().any(|p| p == "hopopt") {
            warn!(
                "Term {} uses hopopt, which only exists in inet6 filters; skipping it.",
                term.name
            );
            return Ok(Vec::new());
        }

        if lacks_family(&term.source_address, family)
            || lacks_family(&term.destination_address, family)
        {
            debug!(
                "Term {} will not be rendered, as it has no {} addresses.",
                term.name,
                family.as_str()
            );
            return Ok(Vec::new());
        }

        let plan = plan_pair(
            &term.source_address,
            &term.source_address_exclude,
            &term.destination_address,
            &term.destination_address_exclude,
            family,
        );
        if plan.is_empty() {
            debug!(
                "Term {} will not be rendered, as its excludes cover every address.",
                term.name
            );
            return Ok(Vec::new());
        }
        if plan.source.kind != PlanKind::Split || plan.destination.kind != PlanKind::Split {
            debug!(
                "Term {}: source {:?} with {} returns, destination {:?} with {} returns",
                term.name,
                plan.source.kind,
                plan.source.returns.len(),
                plan.destination.kind,
                plan.destination.returns.len()
            );
        }

        let (state, track, destination_ports) = self.statefulness()?;
        let flag_options = self.option_clauses()?;
        let icmp = self.icmp_clauses()?;
        let source_ports = PortMatch::optimize(&term.source_port);
        let destination_ports = PortMatch::optimize(&destination_ports);
        let port_pairs = combine(&source_ports, &destination_ports);

        let comment = if self.options.verbose {
            sanitize_comment(&term.comment_lines(), COMMENT_MAX_LENGTH)
                .map(|c| format!("-m comment --comment \"{c}\""))
        } else {
            None
        };
        let interfaces = self.interface_clauses()?;
        let log = term.logs().then(|| {
            let limit = term
                .log_limit
                .map(|l| format!("-m limit --limit {l} "))
                .unwrap_or_default();
            format!("{limit}-j LOG --log-prefix {}", log_prefix(&self.name))
        });
        let verdict = self.verdict();

        let mut lines = vec![
            format!("-N {}", self.chain),
            format!("-A {} -j {}", self.options.chain, self.chain),
        ];
        lines.extend(self.return_lines(&plan));

        let protocols: Vec<Option<&str>> = if term.protocol.is_empty() {
            vec![None]
        } else {
            term.protocol.iter().map(|p| Some(p.as_str())).collect()
        };

        for protocol in &protocols {
            let is_tcp = *protocol == Some("tcp");
            let is_icmp = protocol.is_some_and(|p| tables::icmp_protocol_family(p).is_some());
            let track_variants: Vec<Option<&str>> = if track && is_tcp {
                TCP_TRACK_FLAGS.iter().map(|f| Some(*f)).collect()
            } else {
                vec![None]
            };
            let icmp_variants: Vec<Option<&String>> = if is_icmp && !icmp.is_empty() {
                icmp.iter().map(Some).collect()
            } else {
                vec![None]
            };

            for source in &plan.source.matches {
                for destination in &plan.destination.matches {
                    for icmp_clause in &icmp_variants {
                        for pair in &port_pairs {
                            for track_clause in &track_variants {
                                let mut clauses: Vec<String> = Vec::new();
                                if let Some(p) = protocol {
                                    clauses.push(protocol_clause(p));
                                }
                                clauses.extend(interfaces.iter().cloned());
                                if source.prefix() != 0 {
                                    clauses.push(format!("-s {source}"));
                                }
                                if destination.prefix() != 0 {
                                    clauses.push(format!("-d {destination}"));
                                }
                                clauses.extend(port_clauses(pair));
                                if let Some(c) = icmp_clause {
                                    clauses.push((*c).clone());
                                }
                                if let Some(t) = track_clause {
                                    clauses.push((*t).to_string());
                                }
                                clauses.extend(flag_options.iter().cloned());
                                if let Some(s) = state {
                                    clauses.push(s.to_string());
                                }
                                if let Some(c) = &comment {
                                    clauses.push(c.clone());
                                }
                                let matches = clauses.join(" ");
                                if let Some(log) = &log {
                                    lines.push(self.line(&matches, log));
                                }
                                lines.push(self.line(&matches, &verdict));
                            }
                        }
                    }
                }
            }
        }

        Ok(lines)
    }

    fn line(&self, matches: &str, jump: &str) -> String {
        if matches.is_empty() {
            format!("-A {} {jump}", self.chain)
        } else {
            format!("-A {} {matches} {jump}", self.chain)
        }
    }

    fn return_lines(&self, plan: &AddressPlan) -> Vec<String> {
        let sources = plan
            .source
            .returns
            .iter()
            .map(|n| format!("-A {} -s {n} -j RETURN", self.chain));
        let destinations = plan
            .destination
            .returns
            .iter()
            .map(|n| format!("-A {} -d {n} -j RETURN", self.chain));
        sources.chain(destinations).collect()
    }

    /// Works out the state match, whether to fan out TCP tracking flags, and
    /// the destination ports after any established-traffic rewrite.
    fn statefulness(&self) -> Result<(Option<&'static str>, bool, Vec<PortRange>)> {
        let term = self.term;
        let established = term.has_option("established") || term.has_option("tcp-established");
        let mut destination_ports = term.destination_port.clone();

        if self.options.stateful {
            let state = if established {
                Some("-m state --state ESTABLISHED,RELATED")
            } else if self.action == Action::Accept {
                Some("-m state --state NEW,ESTABLISHED,RELATED")
            } else {
                None
            };
            return Ok((state, false, destination_ports));
        }

        if !established {
            return Ok((None, false, destination_ports));
        }

        let tcp_udp_only = !term.protocol.is_empty()
            && term.protocol.iter().all(|p| p == "tcp" || p == "udp");
        if !tcp_udp_only {
            return Err(Error::Established {
                term: term.name.clone(),
                filter: self.options.chain.clone(),
            });
        }
        if destination_ports.is_empty() {
            destination_ports.push(HIGH_PORTS);
        }
        Ok((None, true, destination_ports))
    }

    /// TCP flag, SYN and fragment/length match clauses.
    fn option_clauses(&self) -> Result<Vec<String>> {
        let term = self.term;
        let tcp_only = term.protocol.len() == 1 && term.protocol[0] == "tcp";
        let mut clauses = Vec::new();

        let mut flags: Vec<String> = term
            .option
            .iter()
            .filter(|o| TCP_FLAG_KEYWORDS.contains(&o.as_str()))
            .map(|o| o.to_uppercase())
            .collect();
        if !flags.is_empty() {
            if !tcp_only {
                return Err(self.unsupported("tcp flag options require protocol tcp"));
            }
            flags.sort();
            flags.dedup();
            let mask = flags.join(",");
            clauses.push(format!("--tcp-flags {mask} {mask}"));
        }

        if term.has_option("initial") || term.has_option("tcp-initial") {
            if !tcp_only {
                return Err(self.unsupported("initial option requires protocol tcp"));
            }
            clauses.push("--syn".to_string());
        }
        if term.has_option("first-fragment") {
            clauses.push("-m u32 --u32 4&0x3FFF=0x2000".to_string());
        }
        if let Some(length) = term.packet_length {
            clauses.push(format!("-m length --length {length}"));
        }
        if let Some(offset) = term.fragment_offset {
            clauses.push(format!("-m u32 --u32 4&0x1FFF={offset}"));
        }
        Ok(clauses)
    }

    /// One clause per ICMP type/code combination.
    fn icmp_clauses(&self) -> Result<Vec<String>> {
        let term = self.term;
        let family = self.family();
        if term.icmp_type.is_empty() {
            if !term.icmp_code.is_empty() {
                return Err(Error::IcmpCode {
                    term: term.name.clone(),
                    reason: "icmp-code requires exactly one icmp-type".to_string(),
                });
            }
            return Ok(Vec::new());
        }

        let expected = match family {
            AddressFamily::Inet => "icmp",
            AddressFamily::Inet6 => "icmpv6",
        };
        if term.protocol.len() != 1 || term.protocol[0] != expected {
            return Err(self.unsupported(format!("icmp-type requires protocol {expected}")));
        }

        let mut types = Vec::with_capacity(term.icmp_type.len());
        for name in &term.icmp_type {
            let number = tables::icmp_type_number(family, name).ok_or_else(|| {
                self.unsupported(format!(
                    "icmp-type {name} does not exist in the {} family",
                    family.as_str()
                ))
            })?;
            types.push(number);
        }

        let codes = self.icmp_codes()?;
        let (module, flag) = match family {
            AddressFamily::Inet => ("-m icmp", "--icmp-type"),
            AddressFamily::Inet6 => ("-m icmp6", "--icmpv6-type"),
        };

        let mut clauses = Vec::new();
        for icmp_type in types {
            if codes.is_empty() {
                clauses.push(format!("{module} {flag} {icmp_type}"));
            } else {
                for code in &codes {
                    clauses.push(format!("{module} {flag} {icmp_type}/{code}"));
                }
            }
        }
        Ok(clauses)
    }

    fn icmp_codes(&self) -> Result<Vec<u8>> {
        let term = self.term;
        if term.icmp_code.is_empty() {
            return Ok(Vec::new());
        }
        let [icmp_type] = term.icmp_type.as_slice() else {
            return Err(Error::IcmpCode {
                term: term.name.clone(),
                reason: "icmp-code requires exactly one icmp-type".to_string(),
            });
        };
        term.icmp_code
            .iter()
            .map(|code| match code {
                IcmpCode::Number(n) => Ok(*n),
                IcmpCode::Name(name) => tables::icmp_code_number(self.family(), icmp_type, name)
                    .ok_or_else(|| Error::IcmpCode {
                        term: term.name.clone(),
                        reason: format!("unknown code {name} for icmp-type {icmp_type}"),
                    }),
            })
            .collect()
    }

    fn interface_clauses(&self) -> Result<Vec<String>> {
        let mut clauses = Vec::new();
        for (flag, interface) in [
            ("-i", &self.term.source_interface),
            ("-o", &self.term.destination_interface),
        ] {
            if let Some(name) = interface {
                let name = validate_interface(name).map_err(|reason| self.unsupported(reason))?;
                clauses.push(format!("{flag} {name}"));
            }
        }
        Ok(clauses)
    }

    fn verdict(&self) -> String {
        match self.action {
            Action::Accept => "-j ACCEPT".to_string(),
            Action::Deny => "-j DROP".to_string(),
            Action::Reject => match self.family() {
                AddressFamily::Inet => "-j REJECT --reject-with icmp-host-prohibited".to_string(),
                AddressFamily::Inet6 => "-j REJECT --reject-with icmp6-adm-prohibited".to_string(),
            },
            Action::RejectWithTcpRst => "-j REJECT --reject-with tcp-reset".to_string(),
            Action::Next => "-j RETURN".to_string(),
        }
    }
}

fn protocol_clause(protocol: &str) -> String {
    match protocol {
        "icmpv6" => "-p ipv6-icmp".to_string(),
        "hopopt" => "-m u32 --u32 \"0x3&0xff=0x0\"".to_string(),
        "fragment" => "-m u32 --u32 \"0x3&0xff=0x2c\"".to_string(),
        other => format!("-p {other}"),
    }
}

/// Single-port clauses first, then multiport source, then multiport destination.
fn port_clauses(pair: &PortPair<'_>) -> Vec<String> {
    let mut singles = Vec::new();
    let mut multis = Vec::new();
    for (group, direction) in [
        (&pair.source, PortDirection::Source),
        (&pair.destination, PortDirection::Destination),
    ] {
        let Some(clause) = port_statement(group, direction) else {
            continue;
        };
        match group {
            PortGroup::Multi(_) => multis.push(clause),
            _ => singles.push(clause),
        }
    }
    singles.extend(multis);
    singles
}
