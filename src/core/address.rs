//! Address-exclusion planning
//!
//! Turns "match these blocks but not those" into rule lines. Three strategies
//! are available per side of a rule:
//!
//! - **direct**: keep the include blocks and emit a return marker for every
//!   exclude block nested inside one of them. Includes swallowed by an
//!   exclude are dropped.
//! - **split**: bisect each include around the excludes until every piece is
//!   either fully excluded (dropped) or fully outside all excludes (kept).
//!   No return markers.
//! - **invert**: match everything, and emit return markers for the complement
//!   of the effective set.
//!
//! [`plan_pair`] costs every combination for a source/destination pair and
//! keeps the cheapest. Return markers always come before match lines, so
//! first-match evaluation sees the exclusion before the accept.
//!
//! All block arithmetic runs on `u128` so IPv4 and IPv6 share one code path.
//! Recursion depth is bounded by the address width.

use ipnetwork::{IpNetwork, Ipv4Network, Ipv6Network};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use crate::core::policy::AddressFamily;

/// One emitted block of a single-side plan
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlannedBlock {
    pub network: IpNetwork,
    /// Rendered as an early return ahead of the match lines
    pub is_return: bool,
}

/// How one side of a rule is expressed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanKind {
    Split,
    Direct,
    Invert,
}

/// Return markers plus match blocks for one side
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SidePlan {
    pub kind: PlanKind,
    pub returns: Vec<IpNetwork>,
    pub matches: Vec<IpNetwork>,
}

/// Chosen plan for both sides of a rule
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressPlan {
    pub source: SidePlan,
    pub destination: SidePlan,
}

impl AddressPlan {
    /// True when either side excludes everything it includes; nothing can match.
    pub fn is_empty(&self) -> bool {
        self.source.matches.is_empty() || self.destination.matches.is_empty()
    }

    /// Return lines plus match-line combinations.
    pub fn line_count(&self) -> usize {
        if self.is_empty() {
            return 0;
        }
        self.source.returns.len()
            + self.destination.returns.len()
            + self.source.matches.len() * self.destination.matches.len()
    }
}

const fn width(net: &IpNetwork) -> u8 {
    match net {
        IpNetwork::V4(_) => 32,
        IpNetwork::V6(_) => 128,
    }
}

fn first(net: &IpNetwork) -> u128 {
    match net.network() {
        IpAddr::V4(a) => u128::from(u32::from(a)),
        IpAddr::V6(a) => u128::from(a),
    }
}

fn mask(width: u8, prefix: u8) -> u128 {
    let full = if width == 32 {
        u128::from(u32::MAX)
    } else {
        u128::MAX
    };
    if prefix == 0 {
        0
    } else {
        (u128::MAX << (width - prefix)) & full
    }
}

fn block(is_v4: bool, base: u128, prefix: u8) -> Option<IpNetwork> {
    if is_v4 {
        let addr = Ipv4Addr::from(u32::try_from(base).ok()?);
        Ipv4Network::new(addr, prefix).ok().map(IpNetwork::V4)
    } else {
        Ipv6Network::new(Ipv6Addr::from(base), prefix)
            .ok()
            .map(IpNetwork::V6)
    }
}

/// Normalises host bits away so `10.1.2.3/8` behaves as `10.0.0.0/8`.
fn canonical(net: &IpNetwork) -> IpNetwork {
    block(net.is_ipv4(), first(net), net.prefix()).unwrap_or(*net)
}

/// Whether `inner` lies entirely within `outer`.
pub fn contains(outer: &IpNetwork, inner: &IpNetwork) -> bool {
    outer.is_ipv4() == inner.is_ipv4()
        && outer.prefix() <= inner.prefix()
        && first(inner) & mask(width(outer), outer.prefix()) == first(outer)
}

/// Whether two blocks share any address. CIDR blocks either nest or are disjoint.
pub fn overlaps(a: &IpNetwork, b: &IpNetwork) -> bool {
    contains(a, b) || contains(b, a)
}

/// The two halves of a block, or `None` for a single host.
fn halves(net: &IpNetwork) -> Option<(IpNetwork, IpNetwork)> {
    let w = width(net);
    let prefix = net.prefix();
    if prefix >= w {
        return None;
    }
    let base = first(net) & mask(w, prefix);
    let step = 1u128 << (w - prefix - 1);
    let is_v4 = net.is_ipv4();
    Some((
        block(is_v4, base, prefix + 1)?,
        block(is_v4, base | step, prefix + 1)?,
    ))
}

fn subtract_into(net: IpNetwork, excludes: &[IpNetwork], out: &mut Vec<IpNetwork>) {
    if excludes.iter().any(|e| contains(e, &net)) {
        return;
    }
    if !excludes.iter().any(|e| contains(&net, e)) {
        out.push(net);
        return;
    }
    if let Some((low, high)) = halves(&net) {
        subtract_into(low, excludes, out);
        subtract_into(high, excludes, out);
    }
}

/// Subtracts `excludes` from `includes` by bisection.
///
/// Every returned block is fully outside all excludes; the union of the
/// result is exactly `includes` minus `excludes`. Order follows the includes,
/// lower half before upper half.
pub fn exclude_addrs(includes: &[IpNetwork], excludes: &[IpNetwork]) -> Vec<IpNetwork> {
    let mut out = Vec::new();
    for include in includes {
        let include = canonical(include);
        let relevant: Vec<IpNetwork> = excludes
            .iter()
            .filter(|e| e.is_ipv4() == include.is_ipv4())
            .map(canonical)
            .filter(|e| overlaps(e, &include))
            .collect();
        subtract_into(include, &relevant, &mut out);
    }
    out
}

fn dedup(nets: &mut Vec<IpNetwork>) {
    let mut seen = Vec::with_capacity(nets.len());
    nets.retain(|n| {
        if seen.contains(n) {
            false
        } else {
            seen.push(*n);
            true
        }
    });
}

fn direct(includes: &[IpNetwork], excludes: &[IpNetwork]) -> SidePlan {
    let includes: Vec<IpNetwork> = includes.iter().map(canonical).collect();
    let excludes: Vec<IpNetwork> = excludes.iter().map(canonical).collect();
    let mut matches: Vec<IpNetwork> = includes
        .iter()
        .filter(|i| !excludes.iter().any(|e| contains(e, i)))
        .copied()
        .collect();
    dedup(&mut matches);
    let mut returns: Vec<IpNetwork> = excludes
        .iter()
        .filter(|e| matches.iter().any(|i| contains(i, e)))
        .copied()
        .collect();
    dedup(&mut returns);
    SidePlan {
        kind: PlanKind::Direct,
        returns,
        matches,
    }
}

fn split(includes: &[IpNetwork], excludes: &[IpNetwork]) -> SidePlan {
    let mut matches = exclude_addrs(includes, excludes);
    dedup(&mut matches);
    SidePlan {
        kind: PlanKind::Split,
        returns: Vec::new(),
        matches,
    }
}

fn invert(includes: &[IpNetwork], excludes: &[IpNetwork], family: AddressFamily) -> SidePlan {
    let all = family.all_addresses();
    let effective = exclude_addrs(includes, excludes);
    if effective.is_empty() {
        return SidePlan {
            kind: PlanKind::Invert,
            returns: Vec::new(),
            matches: Vec::new(),
        };
    }
    SidePlan {
        kind: PlanKind::Invert,
        returns: exclude_addrs(&[all], &effective),
        matches: vec![all],
    }
}

/// Candidate plans for one side. An empty include list means "any address".
fn candidates(
    includes: &[IpNetwork],
    excludes: &[IpNetwork],
    family: AddressFamily,
) -> Vec<SidePlan> {
    let any = [family.all_addresses()];
    let includes: Vec<IpNetwork> = if includes.is_empty() {
        any.to_vec()
    } else {
        includes.iter().filter(|n| family.matches(n)).copied().collect()
    };
    let excludes: Vec<IpNetwork> = excludes
        .iter()
        .filter(|n| family.matches(n))
        .copied()
        .collect();

    vec![
        split(&includes, &excludes),
        direct(&includes, &excludes),
        invert(&includes, &excludes, family),
    ]
}

/// Plans one side on its own: the cheaper of direct and split, returns first.
pub fn plan(includes: &[IpNetwork], excludes: &[IpNetwork]) -> Vec<PlannedBlock> {
    let Some(family) = includes.first().map(|n| {
        if n.is_ipv4() {
            AddressFamily::Inet
        } else {
            AddressFamily::Inet6
        }
    }) else {
        return Vec::new();
    };
    let best = candidates(includes, excludes, family)
        .into_iter()
        .filter(|c| c.kind != PlanKind::Invert)
        .fold(None::<SidePlan>, |best, c| match best {
            Some(b) if b.returns.len() + b.matches.len() <= c.returns.len() + c.matches.len() => {
                Some(b)
            }
            _ => Some(c),
        });
    let Some(best) = best else {
        return Vec::new();
    };
    if best.matches.is_empty() {
        return Vec::new();
    }
    best.returns
        .iter()
        .map(|n| PlannedBlock {
            network: *n,
            is_return: true,
        })
        .chain(best.matches.iter().map(|n| PlannedBlock {
            network: *n,
            is_return: false,
        }))
        .collect()
}

/// Plans both sides of a rule together.
///
/// Each side may be empty (any address). Addresses of the other family are
/// ignored. Cost is `returns + source matches × destination matches`; on a
/// tie the earlier strategy wins in the order split, direct, invert.
pub fn plan_pair(
    source: &[IpNetwork],
    source_exclude: &[IpNetwork],
    destination: &[IpNetwork],
    destination_exclude: &[IpNetwork],
    family: AddressFamily,
) -> AddressPlan {
    let sources = candidates(source, source_exclude, family);
    let destinations = candidates(destination, destination_exclude, family);

    let mut best: Option<(usize, AddressPlan)> = None;
    for s in &sources {
        for d in &destinations {
            let candidate = AddressPlan {
                source: s.clone(),
                destination: d.clone(),
            };
            let cost = candidate.line_count();
            if best.as_ref().is_none_or(|(c, _)| cost < *c) {
                best = Some((cost, candidate));
            }
        }
    }
    best.map(|(_, p)| p).unwrap_or_else(|| AddressPlan {
        source: SidePlan {
            kind: PlanKind::Direct,
            returns: Vec::new(),
            matches: Vec::new(),
        },
        destination: SidePlan {
            kind: PlanKind::Direct,
            returns: Vec::new(),
            matches: Vec::new(),
        },
    })
}

/// Line count of the unoptimised loop: every include paired with every
/// exclude as a return, plus one match per include pair.
pub fn naive_line_count(
    source: usize,
    source_exclude: usize,
    destination: usize,
    destination_exclude: usize,
) -> usize {
    let s = source.max(1);
    let d = destination.max(1);
    s * d + s * source_exclude + d * destination_exclude
}
