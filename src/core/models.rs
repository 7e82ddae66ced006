// src/core/models.rs

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use strum::{Display, EnumString};

// --- Probe Inputs ---

/// One monitored target: identified by `name`, probed at `url`.
///
/// `expect_keyword`, when set and non-empty, makes the HTTP probe additionally
/// require the keyword to appear in the response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Site {
    pub name: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expect_keyword: Option<String>,
}

/// The four probe kinds a run can select.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub enum ProbeKind {
    Http,
    Ssl,
    Headers,
    Dns,
}

impl ProbeKind {
    pub const ALL: [ProbeKind; 4] = [
        ProbeKind::Http,
        ProbeKind::Ssl,
        ProbeKind::Headers,
        ProbeKind::Dns,
    ];
}

/// The subset of probes to run for each site in a batch.
#[derive(Debug, Clone)]
pub struct ProbeSelection {
    kinds: Vec<ProbeKind>,
}

impl ProbeSelection {
    /// All four probes, the default for a run.
    pub fn all() -> Self {
        Self {
            kinds: ProbeKind::ALL.to_vec(),
        }
    }

    pub fn from_kinds(kinds: &[ProbeKind]) -> Self {
        // Canonical order, duplicates collapsed, so reports stay deterministic
        // regardless of how the selection was written.
        let kinds = ProbeKind::ALL
            .into_iter()
            .filter(|k| kinds.contains(k))
            .collect();
        Self { kinds }
    }

    pub fn is_selected(&self, kind: ProbeKind) -> bool {
        self.kinds.contains(&kind)
    }

    pub fn kinds(&self) -> &[ProbeKind] {
        &self.kinds
    }
}

impl Default for ProbeSelection {
    fn default() -> Self {
        Self::all()
    }
}

/// Per-call probe settings. Passed explicitly into every probe; there is no
/// process-wide default.
#[derive(Debug, Clone)]
pub struct ProbeConfig {
    pub user_agent: String,
    pub connect_timeout: Duration,
    pub total_timeout: Duration,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            user_agent: format!("{}/0.1", env!("CARGO_PKG_NAME")),
            connect_timeout: Duration::from_secs(5),
            total_timeout: Duration::from_secs(10),
        }
    }
}

// --- HTTP Probe Models ---

/// Outcome of the HTTP reachability probe.
///
/// `ok` means the status was in [200, 400) and, when a keyword was expected,
/// that it appeared in the body. `latency_ms` is populated on failures too.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpResult {
    pub name: String,
    pub url: String,
    pub ok: bool,
    pub status_code: Option<u16>,
    pub latency_ms: Option<u64>,
    pub error: Option<String>,
}

// --- SSL/TLS Probe Models ---

/// Outcome of the TLS certificate probe.
///
/// `days_to_expiry` is floored to whole days and never negative; an already
/// expired certificate reports 0 days with `ok=false` and
/// `error="certificate expired"`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SslResult {
    pub name: String,
    pub host: String,
    pub port: u16,
    pub ok: bool,
    pub days_to_expiry: Option<i64>,
    pub not_after: Option<String>,
    pub issuer: Option<String>,
    pub error: Option<String>,
}

// --- DNS Probe Models ---

/// The record types the DNS probe resolves. The variant order is the
/// canonical order used when building the content hash.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
)]
pub enum DnsRecordKind {
    A,
    AAAA,
    CNAME,
    MX,
}

impl DnsRecordKind {
    pub const ALL: [DnsRecordKind; 4] = [
        DnsRecordKind::A,
        DnsRecordKind::AAAA,
        DnsRecordKind::CNAME,
        DnsRecordKind::MX,
    ];
}

/// Outcome of the DNS resolution probe.
///
/// `records` maps each record type to its lexicographically sorted entries
/// (a type that failed to resolve is present with an empty list). `hash` is a
/// SHA-256 of the canonical rendering of `records`, stable across resolver
/// orderings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DnsResult {
    pub name: String,
    pub host: String,
    pub ok: bool,
    pub records: BTreeMap<DnsRecordKind, Vec<String>>,
    pub hash: Option<String>,
    pub error: Option<String>,
}

// --- Headers Probe Models ---

/// Letter classification of a site's security-header posture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
pub enum Grade {
    A,
    B,
    C,
    F,
}

impl Grade {
    /// Grade is a pure function of the issue count: 0-1 is an A, 2-3 a B,
    /// 4-5 a C, and 6 or more an F.
    pub fn from_issue_count(n: usize) -> Self {
        match n {
            0..=1 => Grade::A,
            2..=3 => Grade::B,
            4..=5 => Grade::C,
            _ => Grade::F,
        }
    }
}

/// Outcome of the security-headers probe. `ok` means the grade is A or B.
///
/// `sample` holds the raw values of the six audited headers (empty string if
/// absent); on a network failure it is empty and `issues` is `["exception"]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeadersResult {
    pub name: String,
    pub url: String,
    pub ok: bool,
    pub grade: Grade,
    pub issues: Vec<String>,
    pub sample: BTreeMap<String, String>,
    pub error: Option<String>,
}

// --- Site Report ---

/// All probe results collected for one site in one run.
///
/// A probe that was not selected is absent (`None`), which serializes to a
/// missing key; this is distinct from a probe that ran and failed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteReport {
    pub name: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http: Option<HttpResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssl: Option<SslResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<HeadersResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dns: Option<DnsResult>,
}

/// The full set of site reports produced by one orchestrator invocation.
pub type Batch = Vec<SiteReport>;
