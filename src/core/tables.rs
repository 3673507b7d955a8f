//! Protocol and ICMP numbering tables
//!
//! Static, read-only maps from symbolic names to IANA numbers. IPv4 and IPv6
//! ICMP use disjoint numbering, so every ICMP lookup takes an
//! [`AddressFamily`].

use std::collections::BTreeSet;

use crate::core::policy::AddressFamily;

/// IP protocol names and numbers.
pub const PROTOCOLS: &[(&str, u8)] = &[
    ("hopopt", 0),
    ("icmp", 1),
    ("igmp", 2),
    ("ggp", 3),
    ("ipip", 4),
    ("tcp", 6),
    ("egp", 8),
    ("igp", 9),
    ("udp", 17),
    ("rdp", 27),
    ("ipv6", 41),
    ("ipv6-route", 43),
    ("fragment", 44),
    ("rsvp", 46),
    ("gre", 47),
    ("esp", 50),
    ("ah", 51),
    ("icmpv6", 58),
    ("ipv6-nonxt", 59),
    ("ipv6-opts", 60),
    ("ospf", 89),
    ("pim", 103),
    ("vrrp", 112),
    ("l2tp", 115),
    ("sctp", 132),
    ("udplite", 136),
];

pub const ICMP_TYPES_V4: &[(&str, u8)] = &[
    ("echo-reply", 0),
    ("unreachable", 3),
    ("source-quench", 4),
    ("redirect", 5),
    ("alternate-address", 6),
    ("echo-request", 8),
    ("router-advertisement", 9),
    ("router-solicitation", 10),
    ("time-exceeded", 11),
    ("parameter-problem", 12),
    ("timestamp-request", 13),
    ("timestamp-reply", 14),
    ("information-request", 15),
    ("information-reply", 16),
    ("mask-request", 17),
    ("mask-reply", 18),
    ("conversion-error", 31),
    ("mobile-redirect", 32),
];

pub const ICMP_TYPES_V6: &[(&str, u8)] = &[
    ("destination-unreachable", 1),
    ("packet-too-big", 2),
    ("time-exceeded", 3),
    ("parameter-problem", 4),
    ("echo-request", 128),
    ("echo-reply", 129),
    ("multicast-listener-query", 130),
    ("multicast-listener-report", 131),
    ("multicast-listener-done", 132),
    ("router-solicit", 133),
    ("router-advertisement", 134),
    ("neighbor-solicit", 135),
    ("neighbor-advertisement", 136),
    ("redirect-message", 137),
    ("router-renumbering", 138),
    ("icmp-node-information-query", 139),
    ("icmp-node-information-response", 140),
    ("inverse-neighbor-discovery-solicitation", 141),
    ("inverse-neighbor-discovery-advertisement", 142),
    ("version-2-multicast-listener-report", 143),
    ("home-agent-address-discovery-request", 144),
    ("home-agent-address-discovery-reply", 145),
    ("mobile-prefix-solicitation", 146),
    ("mobile-prefix-advertisement", 147),
    ("certification-path-solicitation", 148),
    ("certification-path-advertisement", 149),
    ("multicast-router-advertisement", 151),
    ("multicast-router-solicitation", 152),
    ("multicast-router-termination", 153),
];

type CodeTable = &'static [(&'static str, &'static [(&'static str, u8)])];

/// Named codes per IPv4 ICMP type
pub const ICMP_CODES_V4: CodeTable = &[
    (
        "unreachable",
        &[
            ("net-unreachable", 0),
            ("host-unreachable", 1),
            ("protocol-unreachable", 2),
            ("port-unreachable", 3),
            ("fragmentation-needed", 4),
            ("source-route-failed", 5),
            ("network-unknown", 6),
            ("host-unknown", 7),
            ("source-host-isolated", 8),
            ("network-prohibited", 9),
            ("host-prohibited", 10),
            ("network-tos-unreachable", 11),
            ("host-tos-unreachable", 12),
            ("communication-prohibited", 13),
            ("host-precedence-violation", 14),
            ("precedence-cutoff", 15),
        ],
    ),
    (
        "redirect",
        &[
            ("network-redirect", 0),
            ("host-redirect", 1),
            ("tos-network-redirect", 2),
            ("tos-host-redirect", 3),
        ],
    ),
    (
        "router-advertisement",
        &[
            ("normal-router-advertisement", 0),
            ("does-not-route-common-traffic", 16),
        ],
    ),
    (
        "time-exceeded",
        &[
            ("ttl-zero-during-transit", 0),
            ("ttl-zero-during-reassembly", 1),
        ],
    ),
    (
        "parameter-problem",
        &[
            ("pointer-indicates-error", 0),
            ("missing-option", 1),
            ("bad-length", 2),
        ],
    ),
];

/// Named codes per IPv6 ICMP type
pub const ICMP_CODES_V6: CodeTable = &[
    (
        "destination-unreachable",
        &[
            ("no-route", 0),
            ("admin-prohibited", 1),
            ("beyond-scope", 2),
            ("address-unreachable", 3),
            ("port-unreachable", 4),
            ("source-address-policy-failed", 5),
            ("reject-route", 6),
            ("error-in-source-routing-header", 7),
        ],
    ),
    (
        "time-exceeded",
        &[
            ("hop-limit-exceeded", 0),
            ("fragment-reassembly-time-exceeded", 1),
        ],
    ),
    (
        "parameter-problem",
        &[
            ("erroneous-header-field", 0),
            ("unrecognized-next-header", 1),
            ("unrecognized-ipv6-option", 2),
        ],
    ),
];

fn lookup(table: &[(&str, u8)], name: &str) -> Option<u8> {
    table.iter().find(|(n, _)| *n == name).map(|(_, v)| *v)
}

/// Protocol number for a name, or for a numeric string.
pub fn protocol_number(name: &str) -> Option<u8> {
    lookup(PROTOCOLS, name).or_else(|| name.parse().ok())
}

pub const fn icmp_types(family: AddressFamily) -> &'static [(&'static str, u8)] {
    match family {
        AddressFamily::Inet => ICMP_TYPES_V4,
        AddressFamily::Inet6 => ICMP_TYPES_V6,
    }
}

pub fn icmp_type_number(family: AddressFamily, name: &str) -> Option<u8> {
    lookup(icmp_types(family), name)
}

/// Resolves a code name within the given ICMP type.
pub fn icmp_code_number(family: AddressFamily, icmp_type: &str, code: &str) -> Option<u8> {
    let table = match family {
        AddressFamily::Inet => ICMP_CODES_V4,
        AddressFamily::Inet6 => ICMP_CODES_V6,
    };
    table
        .iter()
        .find(|(t, _)| *t == icmp_type)
        .and_then(|(_, codes)| lookup(codes, code))
}

/// Union of IPv4 and IPv6 type names; the set of valid `icmp_type` values.
pub fn all_icmp_type_names() -> BTreeSet<&'static str> {
    ICMP_TYPES_V4
        .iter()
        .chain(ICMP_TYPES_V6)
        .map(|(name, _)| *name)
        .collect()
}

/// Family implied by an ICMP protocol name, if it is one.
pub fn icmp_protocol_family(protocol: &str) -> Option<AddressFamily> {
    match protocol {
        "icmp" => Some(AddressFamily::Inet),
        "icmpv6" => Some(AddressFamily::Inet6),
        _ => None,
    }
}
