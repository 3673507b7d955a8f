//! Shared test utilities for core module tests
//!
//! Provides policy builders and a log capture helper so renderer tests can
//! assert on notices. This module is only compiled in test mode.

use chrono::NaiveDate;
use ipnetwork::IpNetwork;
use std::io;
use std::sync::{Arc, Mutex};
use tracing_subscriber::fmt::MakeWriter;

use crate::core::aclgen::RenderContext;
use crate::core::policy::{Action, Filter, Header, Policy, PortRange, Target, Term};

/// Fixed "today" used by every rendering test
pub fn today() -> NaiveDate {
    date(2024, 6, 1)
}

pub fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).expect("valid test date")
}

pub fn ctx() -> RenderContext {
    RenderContext::new(2).with_today(today())
}

pub fn net(s: &str) -> IpNetwork {
    s.parse().expect("valid test network")
}

pub fn nets(list: &[&str]) -> Vec<IpNetwork> {
    list.iter().map(|s| net(s)).collect()
}

pub fn strings(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| (*s).to_string()).collect()
}

/// Creates a term with a name, action and protocols.
pub fn term(name: &str, action: Action, protocols: &[&str]) -> Term {
    let mut term = Term::new(name);
    term.action = Some(action);
    term.protocol = strings(protocols);
    term
}

/// Creates an accept term for one TCP destination port.
pub fn tcp_term(name: &str, port: u16) -> Term {
    let mut term = term(name, Action::Accept, &["tcp"]);
    term.destination_port = vec![PortRange::single(port)];
    term
}

/// Wraps terms in a single-filter policy targeting `platform options...`.
pub fn policy(platform: &str, options: &[&str], terms: Vec<Term>) -> Policy {
    Policy {
        name: "test-policy".to_string(),
        filters: vec![Filter {
            header: Header {
                comment: vec!["this is a test acl".to_string()],
                targets: vec![Target::new(platform, options)],
            },
            terms,
        }],
    }
}

/// Shared buffer that `tracing_subscriber` writes formatted events into
#[derive(Clone, Default)]
pub struct LogCapture(Arc<Mutex<Vec<u8>>>);

impl LogCapture {
    pub fn contents(&self) -> String {
        let buf = self.0.lock().expect("log buffer poisoned");
        String::from_utf8_lossy(&buf).into_owned()
    }
}

impl io::Write for LogCapture {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.0
            .lock()
            .expect("log buffer poisoned")
            .extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for LogCapture {
    type Writer = LogCapture;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

/// Runs `f` with a scoped subscriber and returns its result plus every log
/// line emitted at debug level or above.
pub fn capture_logs<T>(f: impl FnOnce() -> T) -> (T, String) {
    let capture = LogCapture::default();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(capture.clone())
        .with_max_level(tracing::Level::DEBUG)
        .with_ansi(false)
        .without_time()
        .finish();
    let result = tracing::subscriber::with_default(subscriber, f);
    (result, capture.contents())
}
