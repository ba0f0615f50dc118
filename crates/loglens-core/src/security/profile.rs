use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::Record;

use super::baseline::Baseline;
use super::infra::{group_by_ip, interarrival_stats, requests_per_minute};

/// Risk bands shared by behaviour scores and the overall security score.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Minimal,
    Low,
    Medium,
    High,
    Critical,
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RiskLevel::Minimal => "minimal",
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
            RiskLevel::Critical => "critical",
        };
        write!(f, "{label}")
    }
}

impl RiskLevel {
    /// Band for a behaviour score in `[0, 1]`.
    pub(crate) fn from_behaviour(score: f64) -> Self {
        if score < 0.2 {
            RiskLevel::Minimal
        } else if score < 0.4 {
            RiskLevel::Low
        } else if score < 0.6 {
            RiskLevel::Medium
        } else if score < 0.8 {
            RiskLevel::High
        } else {
            RiskLevel::Critical
        }
    }

    /// Band for an overall security score in `[0, 100]` (higher is
    /// healthier).
    pub(crate) fn from_security_score(score: f64) -> Self {
        if score >= 90.0 {
            RiskLevel::Minimal
        } else if score >= 70.0 {
            RiskLevel::Low
        } else if score >= 50.0 {
            RiskLevel::Medium
        } else if score >= 30.0 {
            RiskLevel::High
        } else {
            RiskLevel::Critical
        }
    }
}

/// Behavioural profile for one source IP.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IpProfile {
    pub ip: String,
    #[serde(with = "time::serde::rfc3339")]
    pub first_seen: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub last_seen: OffsetDateTime,
    pub total_requests: u64,
    pub requests_per_minute: f64,
    /// Zero for single-record IPs.
    pub mean_interarrival_seconds: f64,
    pub user_agents: BTreeMap<String, u64>,
    pub urls: BTreeMap<String, u64>,
    pub methods: BTreeMap<String, u64>,
    pub statuses: BTreeMap<u16, u64>,
    pub error_rate: f64,
    pub mean_response_size: f64,
    /// Suspiciousness in `[0, 1]`.
    pub behaviour_score: f64,
    pub risk: RiskLevel,
    /// Ids of anomalies attributed to this IP (filled by the security
    /// report assembly).
    pub anomaly_ids: Vec<String>,
    pub tags: Vec<String>,
}

/// Builds per-IP behavioural profiles against the given baseline.
pub(crate) fn profile_ips_with(
    records: &[Record],
    baseline: &Baseline,
) -> BTreeMap<String, IpProfile> {
    let mut profiles = BTreeMap::new();

    for (ip, rows) in group_by_ip(records) {
        let first_seen = rows
            .iter()
            .map(|r| r.timestamp)
            .min()
            .unwrap_or(OffsetDateTime::UNIX_EPOCH);
        let last_seen = rows
            .iter()
            .map(|r| r.timestamp)
            .max()
            .unwrap_or(OffsetDateTime::UNIX_EPOCH);

        let mut user_agents: BTreeMap<String, u64> = BTreeMap::new();
        let mut urls: BTreeMap<String, u64> = BTreeMap::new();
        let mut methods: BTreeMap<String, u64> = BTreeMap::new();
        let mut statuses: BTreeMap<u16, u64> = BTreeMap::new();
        let mut errors = 0u64;
        let mut bytes = 0u64;
        for record in &rows {
            *user_agents.entry(record.user_agent.clone()).or_insert(0) += 1;
            *urls.entry(record.url.clone()).or_insert(0) += 1;
            *methods.entry(record.method.clone()).or_insert(0) += 1;
            *statuses.entry(record.status).or_insert(0) += 1;
            if record.status >= 400 {
                errors += 1;
            }
            bytes += record.size;
        }

        let total = rows.len() as u64;
        let error_rate = errors as f64 / total as f64;
        let rpm = requests_per_minute(&rows);
        let (mean_gap, _) = interarrival_stats(&rows);
        let unique_endpoints: BTreeSet<&str> = rows.iter().map(|r| r.path()).collect();

        let (behaviour_score, tags) = behaviour_score(
            baseline,
            rpm,
            error_rate,
            mean_gap,
            unique_endpoints.len(),
            &user_agents,
        );

        profiles.insert(
            ip.clone(),
            IpProfile {
                ip,
                first_seen,
                last_seen,
                total_requests: total,
                requests_per_minute: rpm,
                mean_interarrival_seconds: mean_gap,
                user_agents,
                urls,
                methods,
                statuses,
                error_rate,
                mean_response_size: bytes as f64 / total as f64,
                risk: RiskLevel::from_behaviour(behaviour_score),
                behaviour_score,
                anomaly_ids: Vec::new(),
                tags,
            },
        );
    }

    profiles
}

fn behaviour_score(
    baseline: &Baseline,
    rpm: f64,
    error_rate: f64,
    mean_gap: f64,
    unique_endpoints: usize,
    user_agents: &BTreeMap<String, u64>,
) -> (f64, Vec<String>) {
    let mut score = 0.0;
    let mut tags = Vec::new();

    if baseline.mean_rpm > 0.0 && rpm > 5.0 * baseline.mean_rpm {
        score += 0.3;
        tags.push("high-request-rate".to_string());
    }
    if error_rate > 3.0 * baseline.error_rate_threshold {
        score += 0.2;
        tags.push("high-error-rate".to_string());
    }
    if mean_gap > 0.0 && mean_gap < 5.0 {
        score += 0.2;
        tags.push("rapid-fire".to_string());
    }
    if unique_endpoints > 50 {
        score += 0.1;
        tags.push("endpoint-enumerator".to_string());
    }
    if user_agents.keys().any(|agent| {
        let lowered = agent.to_lowercase();
        lowered.contains("bot") || lowered.contains("scanner")
    }) {
        score += 0.1;
        tags.push("automation-agent".to_string());
    }
    // Geographic inconsistency is a reserved hook: without a geo backend
    // it never fires.
    let geographic_inconsistency = false;
    if geographic_inconsistency {
        score += 0.1;
    }

    (f64::min(score, 1.0), tags)
}

#[cfg(test)]
mod tests {
    use crate::parser::parse_line;

    use super::super::baseline::compute_baseline;
    use super::{RiskLevel, profile_ips_with};

    fn records() -> Vec<crate::Record> {
        let mut lines: Vec<crate::Record> = (0..30)
            .map(|i| {
                let line = format!(
                    r#"10.0.0.{} - - [22/Aug/2024:10:{:02}:00 +0000] "GET /page{} HTTP/1.1" 200 400 "-" "Mozilla/5.0 (X11; Linux x86_64) Firefox/128.0""#,
                    i % 3 + 1,
                    (i % 50) + 1,
                    i % 5
                );
                parse_line(&line).expect("parse")
            })
            .collect();
        for i in 0..20 {
            let line = format!(
                r#"203.0.113.5 - - [22/Aug/2024:10:30:{:02} +0000] "GET /scan{i} HTTP/1.1" 404 0 "-" "evil-scanner-bot/2.0""#,
                i * 3 % 60
            );
            lines.push(parse_line(&line).expect("parse"));
        }
        lines
    }

    #[test]
    fn profiles_cover_every_ip() {
        let records = records();
        let baseline = compute_baseline(&records);
        let profiles = profile_ips_with(&records, &baseline);
        assert_eq!(profiles.len(), 4);
        assert!(profiles.contains_key("203.0.113.5"));
    }

    #[test]
    fn aggressive_ip_scores_higher_than_a_quiet_one() {
        let records = records();
        let baseline = compute_baseline(&records);
        let profiles = profile_ips_with(&records, &baseline);
        let hot = &profiles["203.0.113.5"];
        let quiet = &profiles["10.0.0.1"];
        assert!(hot.behaviour_score > quiet.behaviour_score);
        assert!(hot.risk > RiskLevel::Minimal);
        assert!(hot.tags.contains(&"automation-agent".to_string()));
        assert!((hot.error_rate - 1.0).abs() < 1e-9);
    }

    #[test]
    fn single_record_ip_has_zero_interarrival() {
        let record = parse_line(
            r#"192.0.2.8 - - [22/Aug/2024:10:30:00 +0000] "GET / HTTP/1.1" 200 1 "-" "x""#,
        )
        .expect("parse");
        let records = vec![record];
        let baseline = compute_baseline(&records);
        let profiles = profile_ips_with(&records, &baseline);
        let profile = &profiles["192.0.2.8"];
        assert_eq!(profile.mean_interarrival_seconds, 0.0);
        assert_eq!(profile.total_requests, 1);
    }

    #[test]
    fn behaviour_score_is_bounded() {
        let records = records();
        let baseline = compute_baseline(&records);
        for profile in profile_ips_with(&records, &baseline).values() {
            assert!((0.0..=1.0).contains(&profile.behaviour_score));
        }
    }
}
