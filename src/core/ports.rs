//! Port-group optimisation
//!
//! A port list of one entry becomes a plain single-port or range match. Longer
//! lists are cut into chunks of at most [`MULTIPORT_MAX`] entries, in input
//! order, each chunk rendered by one multiport match.
//!
//! [`combine`] pairs source and destination groups into the cartesian product
//! the renderers fan out over.

use crate::core::policy::PortRange;

/// Entries one multiport match accepts
pub const MULTIPORT_MAX: usize = 15;

/// Optimised shape of one port list
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PortMatch {
    /// Empty list; no port clause
    Any,
    SinglePort(u16),
    SingleRange(u16, u16),
    /// Ordered chunks, each at most `MULTIPORT_MAX` entries
    MultiPort(Vec<Vec<PortRange>>),
}

impl PortMatch {
    /// Optimises a port list. The order of `ports` is preserved.
    pub fn optimize(ports: &[PortRange]) -> Self {
        Self::optimize_with(ports, MULTIPORT_MAX)
    }

    pub fn optimize_with(ports: &[PortRange], max: usize) -> Self {
        match ports {
            [] => PortMatch::Any,
            [single] if single.is_single() => PortMatch::SinglePort(single.start),
            [range] => PortMatch::SingleRange(range.start, range.end),
            _ => PortMatch::MultiPort(ports.chunks(max.max(1)).map(<[PortRange]>::to_vec).collect()),
        }
    }

    /// Number of groups this side contributes to the product.
    pub fn group_count(&self) -> usize {
        match self {
            PortMatch::MultiPort(chunks) => chunks.len(),
            _ => 1,
        }
    }

    fn groups(&self) -> Vec<PortGroup<'_>> {
        match self {
            PortMatch::Any => vec![PortGroup::Any],
            PortMatch::SinglePort(port) => vec![PortGroup::Single(PortRange::single(*port))],
            PortMatch::SingleRange(start, end) => {
                vec![PortGroup::Single(PortRange::new(*start, *end))]
            }
            PortMatch::MultiPort(chunks) => chunks.iter().map(|c| PortGroup::Multi(c)).collect(),
        }
    }
}

/// One group of a side, as used in a single rule line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortGroup<'a> {
    Any,
    Single(PortRange),
    Multi(&'a [PortRange]),
}

/// Source and destination group of one rule line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortPair<'a> {
    pub source: PortGroup<'a>,
    pub destination: PortGroup<'a>,
}

/// Cartesian product of source groups × destination groups, source-major.
pub fn combine<'a>(source: &'a PortMatch, destination: &'a PortMatch) -> Vec<PortPair<'a>> {
    let destinations = destination.groups();
    source
        .groups()
        .into_iter()
        .flat_map(|s| {
            destinations.iter().map(move |d| PortPair {
                source: s,
                destination: *d,
            })
        })
        .collect()
}

/// Which side of the packet a port statement matches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortDirection {
    Source,
    Destination,
}

/// Renders one group as an iptables port clause.
///
/// A single port or range uses `--sport`/`--dport`; a chunk uses
/// `-m multiport --sports`/`--dports` with `:` as the range separator.
pub fn port_statement(group: &PortGroup<'_>, direction: PortDirection) -> Option<String> {
    let (single, multi) = match direction {
        PortDirection::Source => ("--sport", "--sports"),
        PortDirection::Destination => ("--dport", "--dports"),
    };
    match group {
        PortGroup::Any => None,
        PortGroup::Single(range) => Some(format!("{single} {}", range.join_with(':'))),
        PortGroup::Multi(chunk) => {
            let ports: Vec<String> = chunk.iter().map(|p| p.join_with(':')).collect();
            Some(format!("-m multiport {multi} {}", ports.join(",")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn ports(n: u16) -> Vec<PortRange> {
        (1..=n).map(PortRange::single).collect()
    }

    #[test]
    fn test_single_entry_collapses() {
        assert_eq!(
            PortMatch::optimize(&[PortRange::single(22)]),
            PortMatch::SinglePort(22)
        );
        assert_eq!(
            PortMatch::optimize(&[PortRange::new(1024, 65535)]),
            PortMatch::SingleRange(1024, 65535)
        );
        assert_eq!(PortMatch::optimize(&[]), PortMatch::Any);
    }

    #[test]
    fn test_chunking_at_limit() {
        let PortMatch::MultiPort(chunks) = PortMatch::optimize(&ports(15)) else {
            panic!("expected multiport");
        };
        assert_eq!(chunks.len(), 1);

        let PortMatch::MultiPort(chunks) = PortMatch::optimize(&ports(16)) else {
            panic!("expected multiport");
        };
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[1], vec![PortRange::single(16)]);
    }

    #[test]
    fn test_port_statement_formats() {
        let single = PortGroup::Single(PortRange::single(53));
        assert_eq!(
            port_statement(&single, PortDirection::Destination).as_deref(),
            Some("--dport 53")
        );
        let range = PortGroup::Single(PortRange::new(1024, 65535));
        assert_eq!(
            port_statement(&range, PortDirection::Source).as_deref(),
            Some("--sport 1024:65535")
        );
        let chunk = [PortRange::single(80), PortRange::new(8000, 8080), PortRange::single(443)];
        assert_eq!(
            port_statement(&PortGroup::Multi(&chunk), PortDirection::Destination).as_deref(),
            Some("-m multiport --dports 80,8000:8080,443")
        );
        assert_eq!(port_statement(&PortGroup::Any, PortDirection::Source), None);
    }

    #[test]
    fn test_single_side_paired_with_each_chunk() {
        let source = PortMatch::optimize(&[PortRange::single(53)]);
        let destination = PortMatch::optimize(&ports(20));
        let pairs = combine(&source, &destination);
        assert_eq!(pairs.len(), 2);
        for pair in &pairs {
            assert_eq!(pair.source, PortGroup::Single(PortRange::single(53)));
            assert!(matches!(pair.destination, PortGroup::Multi(_)));
        }
    }

    prop_compose! {
        fn arb_port_list()(raw in proptest::collection::vec((1u16..=65535, 0u16..100), 0..60)) -> Vec<PortRange> {
            raw.into_iter()
                .map(|(start, span)| PortRange::new(start, start.saturating_add(span)))
                .collect()
        }
    }

    proptest! {
        #[test]
        fn prop_chunks_preserve_order_and_limit(list in arb_port_list()) {
            match PortMatch::optimize(&list) {
                PortMatch::Any => prop_assert!(list.is_empty()),
                PortMatch::SinglePort(_) | PortMatch::SingleRange(..) => prop_assert_eq!(list.len(), 1),
                PortMatch::MultiPort(chunks) => {
                    prop_assert!(list.len() > 1);
                    prop_assert_eq!(chunks.len(), list.len().div_ceil(MULTIPORT_MAX));
                    prop_assert!(chunks.iter().all(|c| !c.is_empty() && c.len() <= MULTIPORT_MAX));
                    let flat: Vec<PortRange> = chunks.concat();
                    prop_assert_eq!(flat, list);
                }
            }
        }

        #[test]
        fn prop_product_covers_every_pair_once(a in arb_port_list(), b in arb_port_list()) {
            let source = PortMatch::optimize(&a);
            let destination = PortMatch::optimize(&b);
            let pairs = combine(&source, &destination);
            prop_assert_eq!(pairs.len(), source.group_count() * destination.group_count());
            let sources = source.groups();
            let destinations = destination.groups();
            for (i, pair) in pairs.iter().enumerate() {
                prop_assert_eq!(pair.source, sources[i / destinations.len()]);
                prop_assert_eq!(pair.destination, destinations[i % destinations.len()]);
            }
        }
    }
}
