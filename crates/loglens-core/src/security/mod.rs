//! Threat and anomaly detection, per-IP behavioural profiling, and the
//! weighted security scoring model.
//!
//! Web attacks are pattern-matched per record; infrastructure attacks
//! and anomalies are behavioural, computed per source IP against a
//! baseline built in a first pass over the whole stream. All outputs are
//! deterministically ordered and every finding carries a run-unique id.

mod anomaly;
mod baseline;
mod infra;
mod profile;
mod score;
mod threat;
mod web;

pub use anomaly::{Anomaly, AnomalyKind};
pub use baseline::{Baseline, compute_baseline};
pub use profile::{IpProfile, RiskLevel};
pub use score::{SecurityScore, score_security};
pub use threat::{AttackVector, InfraAttackKind, Severity, Threat, ThreatKind, WebAttackKind};

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::Record;
use crate::config::{ConfigError, SecurityConfig};

use threat::IdGen;

// The embedded summary keeps only the most severe anomalies; the full
// list lives in the security report.
const SUMMARY_ANOMALY_LIMIT: usize = 20;

/// Full security analysis bundle for one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityReport {
    /// Threats ordered by timestamp, then id.
    pub threats: Vec<Threat>,
    /// Anomalies ordered severity-descending, then id.
    pub anomalies: Vec<Anomaly>,
    pub profiles: BTreeMap<String, IpProfile>,
    pub score: SecurityScore,
    pub baseline: Baseline,
}

/// Attack-kind counter for the embedded summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttackCount {
    pub kind: String,
    pub count: u64,
}

/// Condensed security view embedded in the aggregate results.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityAnalysis {
    pub threat_level: String,
    pub score: f64,
    pub attack_counts: Vec<AttackCount>,
    pub suspicious_ips: Vec<String>,
    pub anomalies: Vec<String>,
}

/// Detects web attacks (pattern-based, per record).
pub fn detect_web_attacks(
    records: &[Record],
    config: &SecurityConfig,
) -> Result<Vec<Threat>, ConfigError> {
    config.validate()?;
    let mut ids = IdGen::new("T");
    Ok(web::detect_web_attacks_with(records, config, &mut ids))
}

/// Detects infrastructure attacks (behavioural, per IP).
pub fn detect_infrastructure_attacks(
    records: &[Record],
    config: &SecurityConfig,
) -> Result<Vec<Threat>, ConfigError> {
    config.validate()?;
    let mut ids = IdGen::new("T");
    Ok(infra::detect_infrastructure_attacks_with(
        records, config, &mut ids,
    ))
}

/// Detects all threats: web attacks followed by infrastructure attacks,
/// ordered by timestamp then id.
pub fn detect_threats(
    records: &[Record],
    config: &SecurityConfig,
) -> Result<Vec<Threat>, ConfigError> {
    config.validate()?;
    let mut ids = IdGen::new("T");
    let mut threats = web::detect_web_attacks_with(records, config, &mut ids);
    threats.extend(infra::detect_infrastructure_attacks_with(
        records, config, &mut ids,
    ));
    sort_threats(&mut threats);
    Ok(threats)
}

/// Detects behavioural anomalies against a freshly computed baseline.
pub fn detect_anomalies(
    records: &[Record],
    config: &SecurityConfig,
) -> Result<Vec<Anomaly>, ConfigError> {
    config.validate()?;
    let baseline = compute_baseline(records);
    let mut ids = IdGen::new("A");
    Ok(anomaly::detect_anomalies_with(
        records, config, &baseline, &mut ids,
    ))
}

/// Builds per-IP behavioural profiles (baseline computed internally).
pub fn profile_ips(records: &[Record]) -> BTreeMap<String, IpProfile> {
    let baseline = compute_baseline(records);
    profile::profile_ips_with(records, &baseline)
}

/// Runs the full security pipeline: baseline, threats, anomalies,
/// profiles (with anomaly attribution), and the weighted score.
pub fn analyze_security(
    records: &[Record],
    config: &SecurityConfig,
) -> Result<SecurityReport, ConfigError> {
    config.validate()?;
    Ok(run_pipeline(records, config))
}

fn run_pipeline(records: &[Record], config: &SecurityConfig) -> SecurityReport {
    let baseline = compute_baseline(records);

    let mut threat_ids = IdGen::new("T");
    let mut threats = web::detect_web_attacks_with(records, config, &mut threat_ids);
    threats.extend(infra::detect_infrastructure_attacks_with(
        records,
        config,
        &mut threat_ids,
    ));
    sort_threats(&mut threats);

    let mut anomaly_ids = IdGen::new("A");
    let anomalies = anomaly::detect_anomalies_with(records, config, &baseline, &mut anomaly_ids);

    let mut profiles = profile::profile_ips_with(records, &baseline);
    for anomaly in &anomalies {
        if let Some(profile) = profiles.get_mut(&anomaly.ip) {
            profile.anomaly_ids.push(anomaly.id.clone());
        }
    }

    let score = score_security(records, &threats, &anomalies);

    SecurityReport {
        threats,
        anomalies,
        profiles,
        score,
        baseline,
    }
}

fn sort_threats(threats: &mut [Threat]) {
    threats.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.id.cmp(&b.id)));
}

impl SecurityReport {
    /// Condenses the report into the summary embedded in aggregate
    /// results.
    pub fn summary(&self) -> SecurityAnalysis {
        let mut counts: BTreeMap<String, u64> = BTreeMap::new();
        for threat in &self.threats {
            *counts.entry(threat.kind.to_string()).or_insert(0) += 1;
        }
        let mut attack_counts: Vec<AttackCount> = counts
            .into_iter()
            .map(|(kind, count)| AttackCount { kind, count })
            .collect();
        attack_counts.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.kind.cmp(&b.kind)));

        let suspicious: BTreeSet<String> = self
            .threats
            .iter()
            .map(|threat| threat.source_ip.clone())
            .collect();

        let anomalies = self
            .anomalies
            .iter()
            .take(SUMMARY_ANOMALY_LIMIT)
            .map(|anomaly| {
                format!(
                    "{} {} {} ip={} z={:.2}",
                    anomaly.id, anomaly.kind, anomaly.severity, anomaly.ip, anomaly.z_score
                )
            })
            .collect();

        SecurityAnalysis {
            threat_level: self.score.risk.to_string(),
            score: self.score.overall,
            attack_counts,
            suspicious_ips: suspicious.into_iter().collect(),
            anomalies,
        }
    }
}

/// Summary over the default configuration, used by the aggregator.
pub(crate) fn analysis_summary(records: &[Record]) -> SecurityAnalysis {
    run_pipeline(records, &SecurityConfig::default()).summary()
}

#[cfg(test)]
mod tests {
    use crate::config::SecurityConfig;
    use crate::parser::parse_line;

    use super::{analyze_security, detect_threats};

    fn mixed_records() -> Vec<crate::Record> {
        let mut records: Vec<crate::Record> = (0..30)
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
        records.push(
            parse_line(
                r#"203.0.113.9 - - [22/Aug/2024:10:31:00 +0000] "GET /q?x=%27%20OR%20%271%27=%271 HTTP/1.1" 200 10 "-" "Mozilla/5.0 (X11; Linux x86_64) Firefox/128.0""#,
            )
            .expect("parse"),
        );
        records
    }

    #[test]
    fn invalid_config_aborts_before_processing() {
        let config = SecurityConfig {
            threat_sensitivity: 0,
            ..SecurityConfig::default()
        };
        assert!(detect_threats(&mixed_records(), &config).is_err());
    }

    #[test]
    fn report_ids_are_unique_within_a_run() {
        let report =
            analyze_security(&mixed_records(), &SecurityConfig::default()).expect("analyze");
        let mut ids: Vec<&str> = report
            .threats
            .iter()
            .map(|t| t.id.as_str())
            .chain(report.anomalies.iter().map(|a| a.id.as_str()))
            .collect();
        let before = ids.len();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), before);
    }

    #[test]
    fn threats_are_ordered_by_timestamp() {
        let report =
            analyze_security(&mixed_records(), &SecurityConfig::default()).expect("analyze");
        for pair in report.threats.windows(2) {
            assert!(pair[0].timestamp <= pair[1].timestamp);
        }
    }

    #[test]
    fn summary_names_the_attack_and_source() {
        let report =
            analyze_security(&mixed_records(), &SecurityConfig::default()).expect("analyze");
        let summary = report.summary();
        assert!(
            summary
                .attack_counts
                .iter()
                .any(|c| c.kind == "sql-injection")
        );
        assert!(summary.suspicious_ips.contains(&"203.0.113.9".to_string()));
        assert!(summary.score <= 100.0);
    }

    #[test]
    fn anomaly_attribution_reaches_profiles() {
        let mut records = mixed_records();
        for i in 0..25 {
            let line = format!(
                r#"203.0.113.30 - - [22/Aug/2024:10:30:{:02} +0000] "GET /f HTTP/1.1" 500 0 "-" "-""#,
                i * 2 % 60
            );
            records.push(parse_line(&line).expect("parse"));
        }
        let report =
            analyze_security(&records, &SecurityConfig::default()).expect("analyze");
        let profile = &report.profiles["203.0.113.30"];
        assert!(!profile.anomaly_ids.is_empty());
    }
}
