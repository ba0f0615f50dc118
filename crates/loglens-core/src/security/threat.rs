use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Severity ladder shared by threats and anomalies.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Low,
    Medium,
    High,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Severity::Info => "info",
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        };
        write!(f, "{label}")
    }
}

/// Pattern-matched web attack classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WebAttackKind {
    SqlInjection,
    CrossSiteScripting,
    CommandInjection,
    PathTraversal,
    FileInclusion,
    XmlExternalEntity,
    HeaderInjection,
}

/// Behavioural, per-IP infrastructure attack classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InfraAttackKind {
    BruteForceLogin,
    DdosFlood,
    EndpointScan,
    VulnerabilityScanner,
    Botnet,
}

/// Discriminated threat kind: web attacks are matched per record,
/// infrastructure attacks per source IP.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThreatKind {
    Web(WebAttackKind),
    Infrastructure(InfraAttackKind),
}

impl fmt::Display for ThreatKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ThreatKind::Web(kind) => match kind {
                WebAttackKind::SqlInjection => "sql-injection",
                WebAttackKind::CrossSiteScripting => "cross-site-scripting",
                WebAttackKind::CommandInjection => "command-injection",
                WebAttackKind::PathTraversal => "path-traversal",
                WebAttackKind::FileInclusion => "file-inclusion",
                WebAttackKind::XmlExternalEntity => "xml-external-entity",
                WebAttackKind::HeaderInjection => "header-injection",
            },
            ThreatKind::Infrastructure(kind) => match kind {
                InfraAttackKind::BruteForceLogin => "brute-force-login",
                InfraAttackKind::DdosFlood => "ddos-flood",
                InfraAttackKind::EndpointScan => "endpoint-scan",
                InfraAttackKind::VulnerabilityScanner => "vulnerability-scanner",
                InfraAttackKind::Botnet => "botnet",
            },
        };
        write!(f, "{label}")
    }
}

/// Where the malicious input or behaviour was observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AttackVector {
    Url,
    UserAgent,
    Referer,
    Header,
    Volume,
    Behavioural,
}

/// A detected threat with its full evidence envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Threat {
    /// Unique within a run; not stable across runs.
    pub id: String,
    pub kind: ThreatKind,
    pub severity: Severity,
    /// Confidence in `[0, 1]`.
    pub confidence: f64,
    /// Identifier of the rule that matched.
    pub rule: String,
    /// Raw payload snippet that triggered the rule.
    pub payload: String,
    pub source_ip: String,
    pub url: String,
    pub user_agent: String,
    pub method: String,
    pub status: u16,
    pub response_size: u64,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    pub attack_vector: AttackVector,
    pub context: BTreeMap<String, String>,
    pub mitigation: Vec<String>,
}

/// Per-run id allocator for threats and anomalies.
#[derive(Debug)]
pub(crate) struct IdGen {
    prefix: &'static str,
    next: u64,
}

impl IdGen {
    pub(crate) fn new(prefix: &'static str) -> Self {
        Self { prefix, next: 0 }
    }

    pub(crate) fn next(&mut self) -> String {
        self.next += 1;
        format!("{}-{:06}", self.prefix, self.next)
    }
}

/// Mitigation advice per attack kind, attached when incident response is
/// enabled in the configuration.
pub(crate) fn mitigation_advice(kind: ThreatKind) -> Vec<String> {
    let advice: &[&str] = match kind {
        ThreatKind::Web(WebAttackKind::SqlInjection) => &[
            "Use parameterised queries for all database access",
            "Reject input containing SQL metacharacters at the edge",
        ],
        ThreatKind::Web(WebAttackKind::CrossSiteScripting) => &[
            "Encode output for the HTML context it is rendered in",
            "Set a restrictive Content-Security-Policy header",
        ],
        ThreatKind::Web(WebAttackKind::CommandInjection) => &[
            "Never pass request input to a shell",
            "Use an allow-list for command arguments",
        ],
        ThreatKind::Web(WebAttackKind::PathTraversal) => &[
            "Canonicalise paths before access checks",
            "Serve files through an allow-listed document root",
        ],
        ThreatKind::Web(WebAttackKind::FileInclusion) => &[
            "Disable remote URL includes in the runtime configuration",
            "Map include names through a fixed lookup table",
        ],
        ThreatKind::Web(WebAttackKind::XmlExternalEntity) => &[
            "Disable external entity resolution in the XML parser",
        ],
        ThreatKind::Web(WebAttackKind::HeaderInjection) => &[
            "Strip CR/LF from values copied into response headers",
        ],
        ThreatKind::Infrastructure(InfraAttackKind::BruteForceLogin) => &[
            "Rate-limit authentication endpoints per source IP",
            "Enable account lockout and multi-factor authentication",
        ],
        ThreatKind::Infrastructure(InfraAttackKind::DdosFlood) => &[
            "Apply per-IP request rate limits upstream",
            "Enable SYN cookies and connection caps at the edge",
        ],
        ThreatKind::Infrastructure(InfraAttackKind::EndpointScan) => &[
            "Block the source IP at the firewall",
            "Return uniform 404 responses for unknown paths",
        ],
        ThreatKind::Infrastructure(InfraAttackKind::VulnerabilityScanner) => &[
            "Block the scanner IP and review targeted endpoints for exposure",
        ],
        ThreatKind::Infrastructure(InfraAttackKind::Botnet) => &[
            "Challenge automated clients with rate limits or proof-of-work",
        ],
    };
    advice.iter().map(|s| s.to_string()).collect()
}
