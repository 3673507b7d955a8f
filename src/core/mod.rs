//! Policy model and rendering backends
//!
//! - [`policy`]: the policy AST renderers consume
//! - [`tokens`]: per-backend keyword registries
//! - [`tables`]: protocol and ICMP numbering
//! - [`address`]: address-exclusion planning
//! - [`ports`]: port-group optimisation
//! - [`aclgen`]: the backend contract and shared term checks
//! - [`iptables`], [`nsxv`]: the backends
//! - [`policy_files`]: policy loading and output persistence
//! - [`error`]: error types

pub mod aclgen;
pub mod address;
pub mod error;
pub mod iptables;
pub mod nsxv;
pub mod policy;
pub mod policy_files;
pub mod ports;
pub mod tables;
pub mod tokens;

#[cfg(test)]
pub mod test_helpers;
