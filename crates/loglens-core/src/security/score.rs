use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::Record;

use super::anomaly::Anomaly;
use super::profile::RiskLevel;
use super::threat::{InfraAttackKind, Severity, Threat, ThreatKind};

const THREAT_WEIGHT: f64 = 0.40;
const ANOMALY_WEIGHT: f64 = 0.25;
const TRAFFIC_WEIGHT: f64 = 0.20;
const ACCESS_WEIGHT: f64 = 0.15;

/// Weighted 0-100 health indicator across four dimensions. Higher is
/// healthier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityScore {
    /// Rounded weighted sum of the dimension scores.
    pub overall: f64,
    pub risk: RiskLevel,
    pub threat_score: f64,
    pub anomaly_score: f64,
    pub traffic_score: f64,
    pub access_score: f64,
}

/// Computes the weighted security score from a run's records, threats
/// and anomalies.
pub fn score_security(
    records: &[Record],
    threats: &[Threat],
    anomalies: &[Anomaly],
) -> SecurityScore {
    let total = records.len().max(1) as f64;

    let threat_score = threat_dimension(threats, total);
    let anomaly_score = anomaly_dimension(anomalies, total);
    let traffic_score = traffic_dimension(records, threats);
    let access_score = access_dimension(records, threats);

    let overall = (threat_score * THREAT_WEIGHT
        + anomaly_score * ANOMALY_WEIGHT
        + traffic_score * TRAFFIC_WEIGHT
        + access_score * ACCESS_WEIGHT)
        .round();

    SecurityScore {
        overall,
        risk: RiskLevel::from_security_score(overall),
        threat_score,
        anomaly_score,
        traffic_score,
        access_score,
    }
}

fn severity_weight(severity: Severity) -> f64 {
    match severity {
        Severity::Info => 1.0,
        Severity::Low => 2.0,
        Severity::Medium => 5.0,
        Severity::High => 10.0,
        Severity::Critical => 20.0,
    }
}

fn anomaly_severity_weight(severity: Severity) -> f64 {
    match severity {
        Severity::Info => 0.5,
        Severity::Low => 1.0,
        Severity::Medium => 2.5,
        Severity::High => 5.0,
        Severity::Critical => 10.0,
    }
}

fn threat_dimension(threats: &[Threat], total: f64) -> f64 {
    let impact: f64 = threats
        .iter()
        .map(|threat| severity_weight(threat.severity) * threat.confidence)
        .sum();
    let normalized = impact * 1000.0 / total;
    (100.0 - (1.0 + normalized).log10() * 15.0).clamp(0.0, 100.0)
}

fn anomaly_dimension(anomalies: &[Anomaly], total: f64) -> f64 {
    let impact: f64 = anomalies
        .iter()
        .map(|anomaly| {
            let multiplier = 1.0 + (anomaly.z_score.abs() / 5.0).min(1.0);
            anomaly_severity_weight(anomaly.severity) * multiplier
        })
        .sum();
    let normalized = impact * 1000.0 / total;
    (100.0 - (1.0 + normalized).log10() * 15.0).clamp(0.0, 100.0)
}

fn traffic_dimension(records: &[Record], threats: &[Threat]) -> f64 {
    let mut score = 100.0;
    if records.is_empty() {
        return score;
    }
    let total = records.len() as f64;

    let mut per_ip: BTreeMap<String, (u64, u64)> = BTreeMap::new();
    for record in records {
        let entry = per_ip.entry(record.ip.to_string()).or_insert((0, 0));
        entry.0 += 1;
        if record.status >= 400 {
            entry.1 += 1;
        }
    }

    let mut counts: Vec<u64> = per_ip.values().map(|(count, _)| *count).collect();
    counts.sort_unstable_by(|a, b| b.cmp(a));

    let top_share = counts.first().copied().unwrap_or(0) as f64 / total;
    if top_share > 0.5 {
        score -= 20.0;
    } else if top_share > 0.3 {
        score -= 10.0;
    }
    let top3_share = counts.iter().take(3).sum::<u64>() as f64 / total;
    if top3_share > 0.8 && per_ip.len() > 3 {
        score -= 15.0;
    }

    // Sources that mostly produce errors drag integrity down.
    let high_error_ips = per_ip
        .values()
        .filter(|(count, errors)| *count >= 10 && *errors as f64 / *count as f64 > 0.5)
        .count();
    score -= (high_error_ips as f64 * 5.0).min(30.0);

    let suspicious: BTreeSet<&str> = threats.iter().map(|t| t.source_ip.as_str()).collect();
    let suspicious_ratio = suspicious.len() as f64 / per_ip.len() as f64;
    score -= suspicious_ratio * 50.0;

    score.clamp(0.0, 100.0)
}

fn access_dimension(records: &[Record], threats: &[Threat]) -> f64 {
    let mut score: f64 = 100.0;

    for threat in threats {
        if threat.kind == ThreatKind::Infrastructure(InfraAttackKind::BruteForceLogin) {
            score -= 15.0;
        }
    }

    if !records.is_empty() {
        let denied = records
            .iter()
            .filter(|r| matches!(r.status, 401 | 403))
            .count() as f64;
        let rate = denied / records.len() as f64;
        if rate > 0.3 {
            score -= 20.0;
        } else if rate > 0.1 {
            score -= 10.0;
        }
    }

    score.clamp(0.0, 100.0)
}
