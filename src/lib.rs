//! aclgen - network access-control policy renderer
//!
//! Turns a platform-neutral policy (headers with backend targets, terms with
//! match conditions and an action) into device configuration text.
//!
//! # Architecture
//!
//! - [`core`] - Policy model, address/port optimisation and the backends
//! - [`validators`] - Comment, term-name and interface helpers
//! - [`config`] - Generator settings
//! - [`utils`] - Utility functions (XDG directories)
//!
//! # Backends
//!
//! - `iptables`: `iptables-restore` append directives, one chain per term
//! - `nsxv`: NSX-V distributed firewall section XML
//!
//! # Example
//!
//! ```
//! use aclgen::core::aclgen::{AclGenerator, RenderContext};
//! use aclgen::core::iptables::Iptables;
//! use aclgen::core::policy::{Action, Filter, Header, Policy, Target, Term};
//!
//! let mut term = Term::new("allow-icmp");
//! term.action = Some(Action::Accept);
//! term.protocol = vec!["icmp".to_string()];
//!
//! let policy = Policy {
//!     name: "edge".to_string(),
//!     filters: vec![Filter {
//!         header: Header {
//!             comment: vec![],
//!             targets: vec![Target::new("iptables", &["INPUT", "DROP"])],
//!         },
//!         terms: vec![term],
//!     }],
//! };
//!
//! let out = Iptables.render(&policy, &RenderContext::default()).unwrap();
//! assert!(out.contains("-P INPUT DROP"));
//! ```

// Allow pedantic clippy warnings that are not worth fixing for this codebase
#![allow(clippy::must_use_candidate)]
#![allow(clippy::return_self_not_must_use)]
#![allow(clippy::needless_lifetimes)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::missing_errors_doc)]

pub mod config;
pub mod core;
pub mod utils;
pub mod validators;

// Re-export commonly used types
pub use core::aclgen::{AclGenerator, Platform, RenderContext};
pub use core::error::{Error, Result};
pub use core::policy::{Policy, Term};
