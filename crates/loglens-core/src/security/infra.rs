use std::collections::{BTreeMap, BTreeSet};
use std::sync::OnceLock;

use regex::Regex;

use crate::Record;
use crate::config::SecurityConfig;

use super::threat::{
    AttackVector, IdGen, InfraAttackKind, Severity, Threat, ThreatKind, mitigation_advice,
};

const AUTH_PATHS: [&str; 5] = ["/login", "/admin", "/wp-admin", "/auth", "/signin"];

const RECON_PATHS: [&str; 10] = [
    "/.env",
    "/.git",
    "/.aws",
    "/wp-config.php",
    "/phpmyadmin",
    "/config.php",
    "/backup",
    "/admin.php",
    "/shell.php",
    "/server-status",
];

const FLOOD_MIN_RECORDS: usize = 50;
const SCAN_UNIQUE_URLS: usize = 50;
const SCAN_RECON_HITS: usize = 5;
const BOTNET_MIN_RECORDS: usize = 10;

fn scanner_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)nmap|nikto|sqlmap|nuclei|gobuster|ffuf|masscan|dirb|wpscan|acunetix|nessus|burp")
            .expect("scanner pattern compiles")
    })
}

/// Groups records by source IP in deterministic order.
pub(crate) fn group_by_ip(records: &[Record]) -> BTreeMap<String, Vec<&Record>> {
    let mut groups: BTreeMap<String, Vec<&Record>> = BTreeMap::new();
    for record in records {
        groups.entry(record.ip.to_string()).or_default().push(record);
    }
    groups
}

/// Inter-arrival mean and standard deviation in seconds. Single-record
/// groups yield zeros.
pub(crate) fn interarrival_stats(rows: &[&Record]) -> (f64, f64) {
    if rows.len() < 2 {
        return (0.0, 0.0);
    }
    let mut stamps: Vec<i64> = rows.iter().map(|r| r.timestamp.unix_timestamp()).collect();
    stamps.sort_unstable();
    let gaps: Vec<f64> = stamps.windows(2).map(|w| (w[1] - w[0]) as f64).collect();
    let mean = gaps.iter().sum::<f64>() / gaps.len() as f64;
    let variance = gaps.iter().map(|g| (g - mean).powi(2)).sum::<f64>() / gaps.len() as f64;
    (mean, variance.sqrt())
}

pub(crate) fn requests_per_minute(rows: &[&Record]) -> f64 {
    if rows.is_empty() {
        return 0.0;
    }
    let first = rows.iter().map(|r| r.timestamp).min().unwrap_or(rows[0].timestamp);
    let last = rows.iter().map(|r| r.timestamp).max().unwrap_or(rows[0].timestamp);
    let minutes = ((last - first).whole_seconds() as f64 / 60.0).max(1.0);
    rows.len() as f64 / minutes
}

fn is_auth_path(path: &str) -> bool {
    let lowered = path.to_lowercase();
    AUTH_PATHS.iter().any(|auth| lowered.contains(auth))
}

fn generic_user_agent(ua: &str) -> bool {
    if ua.is_empty() || ua.len() < 12 {
        return true;
    }
    let lowered = ua.to_lowercase();
    ["curl", "wget", "python", "go-http", "okhttp", "java/"]
        .iter()
        .any(|marker| lowered.contains(marker))
}

fn behavioural_threat(
    ids: &mut IdGen,
    kind: InfraAttackKind,
    severity: Severity,
    confidence: f64,
    rule: &str,
    payload: String,
    rows: &[&Record],
    vector: AttackVector,
    context: BTreeMap<String, String>,
    config: &SecurityConfig,
) -> Threat {
    let last = rows
        .iter()
        .max_by_key(|r| r.timestamp)
        .expect("behavioural threats require at least one record");
    Threat {
        id: ids.next(),
        kind: ThreatKind::Infrastructure(kind),
        severity,
        confidence: confidence.min(1.0),
        rule: rule.to_string(),
        payload,
        source_ip: last.ip.to_string(),
        url: last.url.clone(),
        user_agent: last.user_agent.clone(),
        method: last.method.clone(),
        status: last.status,
        response_size: last.size,
        timestamp: last.timestamp,
        attack_vector: vector,
        context,
        mitigation: if config.incident_response_enabled {
            mitigation_advice(ThreatKind::Infrastructure(kind))
        } else {
            Vec::new()
        },
    }
}

/// Behavioural, per-IP infrastructure attack detection.
pub(crate) fn detect_infrastructure_attacks_with(
    records: &[Record],
    config: &SecurityConfig,
    ids: &mut IdGen,
) -> Vec<Threat> {
    let mut threats = Vec::new();

    for (ip, rows) in group_by_ip(records) {
        // Brute-force login: repeated auth failures on auth-shaped paths.
        let auth_failures: Vec<&&Record> = rows
            .iter()
            .filter(|r| matches!(r.status, 401 | 403) && is_auth_path(r.path()))
            .collect();
        let severity = match auth_failures.len() {
            n if n > 100 => Some(Severity::Critical),
            n if n > 50 => Some(Severity::High),
            n if n > 10 => Some(Severity::Medium),
            _ => None,
        };
        if let Some(severity) = severity {
            let mut context = BTreeMap::new();
            context.insert("failed_attempts".to_string(), auth_failures.len().to_string());
            threats.push(behavioural_threat(
                ids,
                InfraAttackKind::BruteForceLogin,
                severity,
                0.6 + (auth_failures.len() as f64 / 500.0),
                "infra-brute-force",
                format!("{} failed auth responses from {ip}", auth_failures.len()),
                &rows,
                AttackVector::Behavioural,
                context,
                config,
            ));
        }

        // Flood: sustained request rate well above any human browsing.
        if rows.len() >= FLOOD_MIN_RECORDS {
            let rpm = requests_per_minute(&rows);
            let severity = if rpm > 1000.0 {
                Some(Severity::Critical)
            } else if rpm > 500.0 {
                Some(Severity::High)
            } else if rpm > 100.0 {
                Some(Severity::Medium)
            } else {
                None
            };
            if let Some(severity) = severity {
                let mut context = BTreeMap::new();
                context.insert("requests_per_minute".to_string(), format!("{rpm:.1}"));
                threats.push(behavioural_threat(
                    ids,
                    InfraAttackKind::DdosFlood,
                    severity,
                    0.55 + (rpm / 4000.0),
                    "infra-flood",
                    format!("{rpm:.0} requests/minute from {ip}"),
                    &rows,
                    AttackVector::Volume,
                    context,
                    config,
                ));
            }
        }

        // Endpoint scan: wide URL coverage or reconnaissance paths.
        let unique_urls: BTreeSet<&str> = rows.iter().map(|r| r.path()).collect();
        let recon_hits = rows
            .iter()
            .filter(|r| {
                let path = r.path().to_lowercase();
                RECON_PATHS.iter().any(|probe| path.starts_with(probe))
            })
            .count();
        if unique_urls.len() > SCAN_UNIQUE_URLS || recon_hits >= SCAN_RECON_HITS {
            let mut context = BTreeMap::new();
            context.insert("unique_paths".to_string(), unique_urls.len().to_string());
            context.insert("recon_hits".to_string(), recon_hits.to_string());
            threats.push(behavioural_threat(
                ids,
                InfraAttackKind::EndpointScan,
                Severity::Medium,
                0.6 + (recon_hits as f64 * 0.05),
                "infra-endpoint-scan",
                format!(
                    "{} unique paths, {recon_hits} reconnaissance probes",
                    unique_urls.len()
                ),
                &rows,
                AttackVector::Behavioural,
                context,
                config,
            ));
        }

        // Known vulnerability scanner user-agents (one threat per IP).
        if config.threat_intel_enabled {
            if let Some(record) = rows
                .iter()
                .find(|r| scanner_regex().is_match(&r.user_agent))
            {
                let mut context = BTreeMap::new();
                context.insert("matched_agent".to_string(), record.user_agent.clone());
                threats.push(behavioural_threat(
                    ids,
                    InfraAttackKind::VulnerabilityScanner,
                    Severity::High,
                    0.85,
                    "infra-scanner-agent",
                    record.user_agent.clone(),
                    &rows,
                    AttackVector::UserAgent,
                    context,
                    config,
                ));
            }
        }

        // Botnet-like: generic tooling agent plus machine-regular timing.
        if config.behavioural_analysis_enabled && rows.len() >= BOTNET_MIN_RECORDS {
            let (mean, stddev) = interarrival_stats(&rows);
            let regular = mean > 0.0 && mean < 5.0 && stddev < mean * 0.1;
            let generic = rows.iter().all(|r| generic_user_agent(&r.user_agent));
            if regular && generic {
                let mut context = BTreeMap::new();
                context.insert("mean_interarrival_s".to_string(), format!("{mean:.2}"));
                context.insert("stddev_interarrival_s".to_string(), format!("{stddev:.2}"));
                threats.push(behavioural_threat(
                    ids,
                    InfraAttackKind::Botnet,
                    Severity::Medium,
                    0.6,
                    "infra-botnet-cadence",
                    format!("machine-regular cadence every {mean:.2}s from {ip}"),
                    &rows,
                    AttackVector::Behavioural,
                    context,
                    config,
                ));
            }
        }
    }

    threats
}
