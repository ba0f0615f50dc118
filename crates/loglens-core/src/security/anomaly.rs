use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::Record;
use crate::config::SecurityConfig;

use super::baseline::Baseline;
use super::infra::{group_by_ip, interarrival_stats};
use super::threat::{IdGen, Severity};

const FREQUENCY_WINDOW_SECONDS: i64 = 300;
const ERROR_WINDOW_SECONDS: i64 = 600;
const ERROR_WINDOW_MIN_REQUESTS: u64 = 5;
const TIMING_MIN_RECORDS: usize = 6;
const CONCENTRATION_MIN_TOTAL: u64 = 20;
const ENUMERATION_MIN_UNIQUE: usize = 20;
const ENUMERATION_HIGH_UNIQUE: usize = 100;
const STATUS_MIN_REQUESTS: u64 = 5;

/// Behavioural anomaly classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AnomalyKind {
    RequestFrequency,
    ResponseSize,
    ErrorRate,
    RequestTiming,
    UserAgent,
    GeographicConcentration,
    EndpointEnumeration,
    StatusPattern,
}

impl fmt::Display for AnomalyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            AnomalyKind::RequestFrequency => "request-frequency",
            AnomalyKind::ResponseSize => "response-size",
            AnomalyKind::ErrorRate => "error-rate",
            AnomalyKind::RequestTiming => "request-timing",
            AnomalyKind::UserAgent => "user-agent",
            AnomalyKind::GeographicConcentration => "geographic-concentration",
            AnomalyKind::EndpointEnumeration => "endpoint-enumeration",
            AnomalyKind::StatusPattern => "status-pattern",
        };
        write!(f, "{label}")
    }
}

/// A statistical deviation from the computed baseline. Every anomaly
/// carries the expected value, the observation, and the raw z-score for
/// auditability.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Anomaly {
    /// Unique within a run; not stable across runs.
    pub id: String,
    pub kind: AnomalyKind,
    pub severity: Severity,
    pub metric: String,
    pub expected: f64,
    pub actual: f64,
    pub deviation: f64,
    pub z_score: f64,
    pub ip: String,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    pub window_seconds: i64,
    /// Confidence in `[0, 1]`.
    pub confidence: f64,
    pub context: BTreeMap<String, String>,
}

fn severity_from_z(z: f64, threshold: f64) -> Option<Severity> {
    let z = z.abs();
    if z > 5.0 {
        Some(Severity::High)
    } else if z > 3.0 {
        Some(Severity::Medium)
    } else if z > threshold {
        Some(Severity::Low)
    } else {
        None
    }
}

fn z_confidence(z: f64) -> f64 {
    (0.5 + z.abs() / 20.0).min(0.95)
}

fn window_time(window_start: i64) -> OffsetDateTime {
    OffsetDateTime::from_unix_timestamp(window_start).unwrap_or(OffsetDateTime::UNIX_EPOCH)
}

/// Runs every anomaly class against the record stream. Results are
/// ordered severity-descending with id ascending on ties.
pub(crate) fn detect_anomalies_with(
    records: &[Record],
    config: &SecurityConfig,
    baseline: &Baseline,
    ids: &mut IdGen,
) -> Vec<Anomaly> {
    let threshold = config.anomaly_z_threshold;
    let by_ip = group_by_ip(records);
    let mut anomalies = Vec::new();

    detect_request_frequency(&by_ip, baseline, threshold, ids, &mut anomalies);
    detect_response_size(records, baseline, threshold, ids, &mut anomalies);
    detect_error_rate(&by_ip, baseline, threshold, ids, &mut anomalies);
    if config.behavioural_analysis_enabled {
        detect_request_timing(&by_ip, ids, &mut anomalies);
        detect_user_agent(&by_ip, baseline, ids, &mut anomalies);
        detect_endpoint_enumeration(&by_ip, ids, &mut anomalies);
    }
    detect_geographic_concentration(&by_ip, records.len() as u64, ids, &mut anomalies);
    detect_status_pattern(&by_ip, baseline, threshold, ids, &mut anomalies);

    anomalies.sort_by(|a, b| b.severity.cmp(&a.severity).then_with(|| a.id.cmp(&b.id)));
    anomalies
}

fn detect_request_frequency(
    by_ip: &BTreeMap<String, Vec<&Record>>,
    baseline: &Baseline,
    threshold: f64,
    ids: &mut IdGen,
    out: &mut Vec<Anomaly>,
) {
    // Expected requests per window under the global rate; the deviation
    // uses a Poisson-style sigma so a lone hot window still scores.
    let expected = baseline.mean_rpm * (FREQUENCY_WINDOW_SECONDS as f64 / 60.0);
    let sigma = expected.sqrt().max(1.0);

    for (ip, rows) in by_ip {
        let mut windows: BTreeMap<i64, u64> = BTreeMap::new();
        for record in rows {
            let start = record.timestamp.unix_timestamp() / FREQUENCY_WINDOW_SECONDS
                * FREQUENCY_WINDOW_SECONDS;
            *windows.entry(start).or_insert(0) += 1;
        }
        for (start, count) in windows {
            let z = (count as f64 - expected) / sigma;
            let Some(severity) = severity_from_z(z, threshold) else {
                continue;
            };
            out.push(Anomaly {
                id: ids.next(),
                kind: AnomalyKind::RequestFrequency,
                severity,
                metric: "requests_per_window".to_string(),
                expected,
                actual: count as f64,
                deviation: count as f64 - expected,
                z_score: z,
                ip: ip.clone(),
                timestamp: window_time(start),
                window_seconds: FREQUENCY_WINDOW_SECONDS,
                confidence: z_confidence(z),
                context: BTreeMap::new(),
            });
        }
    }
}

fn detect_response_size(
    records: &[Record],
    baseline: &Baseline,
    threshold: f64,
    ids: &mut IdGen,
    out: &mut Vec<Anomaly>,
) {
    let sigma = baseline.stddev_size.max(1.0);
    for record in records {
        let z = (record.size as f64 - baseline.mean_size) / sigma;
        let Some(severity) = severity_from_z(z, threshold) else {
            continue;
        };
        let mut context = BTreeMap::new();
        context.insert("url".to_string(), record.url.clone());
        out.push(Anomaly {
            id: ids.next(),
            kind: AnomalyKind::ResponseSize,
            severity,
            metric: "response_size_bytes".to_string(),
            expected: baseline.mean_size,
            actual: record.size as f64,
            deviation: record.size as f64 - baseline.mean_size,
            z_score: z,
            ip: record.ip.to_string(),
            timestamp: record.timestamp,
            window_seconds: 0,
            confidence: z_confidence(z),
            context,
        });
    }
}

fn detect_error_rate(
    by_ip: &BTreeMap<String, Vec<&Record>>,
    baseline: &Baseline,
    threshold: f64,
    ids: &mut IdGen,
    out: &mut Vec<Anomaly>,
) {
    struct Window<'a> {
        ip: &'a str,
        start: i64,
        rate: f64,
        requests: u64,
    }

    let mut windows: Vec<Window<'_>> = Vec::new();
    for (ip, rows) in by_ip {
        let mut counts: BTreeMap<i64, (u64, u64)> = BTreeMap::new();
        for record in rows {
            let start =
                record.timestamp.unix_timestamp() / ERROR_WINDOW_SECONDS * ERROR_WINDOW_SECONDS;
            let entry = counts.entry(start).or_insert((0, 0));
            entry.0 += 1;
            if record.status >= 400 {
                entry.1 += 1;
            }
        }
        for (start, (requests, errors)) in counts {
            if requests < ERROR_WINDOW_MIN_REQUESTS {
                continue;
            }
            windows.push(Window {
                ip,
                start,
                rate: errors as f64 / requests as f64,
                requests,
            });
        }
    }
    if windows.is_empty() {
        return;
    }

    let mean = windows.iter().map(|w| w.rate).sum::<f64>() / windows.len() as f64;
    let variance = windows
        .iter()
        .map(|w| (w.rate - mean).powi(2))
        .sum::<f64>()
        / windows.len() as f64;
    let sigma = variance.sqrt().max(0.05);

    for window in windows {
        if window.rate <= 2.0 * baseline.error_rate_threshold {
            continue;
        }
        let z = (window.rate - mean) / sigma;
        let ladder = severity_from_z(z, threshold);
        // Absolute failure levels escalate regardless of the z ladder.
        let severity = if window.rate > 0.8 {
            Some(Severity::Critical)
        } else if window.rate > 0.5 {
            Some(Severity::High)
        } else {
            ladder
        };
        let Some(severity) = severity else { continue };
        let mut context = BTreeMap::new();
        context.insert("window_requests".to_string(), window.requests.to_string());
        out.push(Anomaly {
            id: ids.next(),
            kind: AnomalyKind::ErrorRate,
            severity,
            metric: "error_rate".to_string(),
            expected: baseline.error_rate_threshold,
            actual: window.rate,
            deviation: window.rate - baseline.error_rate_threshold,
            z_score: z,
            ip: window.ip.to_string(),
            timestamp: window_time(window.start),
            window_seconds: ERROR_WINDOW_SECONDS,
            confidence: z_confidence(z).max(window.rate.min(0.95)),
            context,
        });
    }
}

fn detect_request_timing(
    by_ip: &BTreeMap<String, Vec<&Record>>,
    ids: &mut IdGen,
    out: &mut Vec<Anomaly>,
) {
    for (ip, rows) in by_ip {
        if rows.len() < TIMING_MIN_RECORDS {
            continue;
        }
        let (mean, stddev) = interarrival_stats(rows);
        if mean <= 0.0 || mean >= 5.0 || stddev >= mean * 0.1 {
            continue;
        }
        // Regularity expressed as 10x(1 - coefficient of variation), so a
        // metronome-perfect client scores 10.
        let regularity = 10.0 * (1.0 - (stddev / mean).min(1.0));
        let last = rows
            .iter()
            .map(|r| r.timestamp)
            .max()
            .unwrap_or(OffsetDateTime::UNIX_EPOCH);
        let mut context = BTreeMap::new();
        context.insert("mean_interarrival_s".to_string(), format!("{mean:.3}"));
        context.insert("stddev_interarrival_s".to_string(), format!("{stddev:.3}"));
        out.push(Anomaly {
            id: ids.next(),
            kind: AnomalyKind::RequestTiming,
            severity: Severity::Medium,
            metric: "interarrival_regularity".to_string(),
            expected: mean * 0.1,
            actual: stddev,
            deviation: stddev - mean * 0.1,
            z_score: regularity,
            ip: ip.clone(),
            timestamp: last,
            window_seconds: 0,
            confidence: 0.7,
            context,
        });
    }
}

fn detect_user_agent(
    by_ip: &BTreeMap<String, Vec<&Record>>,
    baseline: &Baseline,
    ids: &mut IdGen,
    out: &mut Vec<Anomaly>,
) {
    let known: BTreeSet<&str> = baseline
        .top_user_agents
        .iter()
        .map(|(agent, _)| agent.as_str())
        .collect();

    for (ip, rows) in by_ip {
        let mut seen: BTreeSet<&str> = BTreeSet::new();
        for record in rows {
            let agent = record.user_agent.as_str();
            if !seen.insert(agent) {
                continue;
            }
            let lowered = agent.to_lowercase();
            let mut confidence = 0.0;
            if agent.is_empty() || !known.contains(agent) {
                confidence += 0.3;
            }
            if ["bot", "crawler", "scanner", "curl", "python", "java"]
                .iter()
                .any(|marker| lowered.contains(marker))
            {
                confidence += 0.2;
            }
            if agent.is_empty() || agent.len() < 12 {
                confidence += 0.4;
            }
            if confidence < 0.5 {
                continue;
            }
            let severity = if confidence >= 0.7 {
                Severity::Medium
            } else {
                Severity::Low
            };
            let mut context = BTreeMap::new();
            context.insert("user_agent".to_string(), agent.to_string());
            out.push(Anomaly {
                id: ids.next(),
                kind: AnomalyKind::UserAgent,
                severity,
                metric: "user_agent_suspicion".to_string(),
                expected: 0.0,
                actual: confidence,
                deviation: confidence,
                z_score: 0.0,
                ip: ip.clone(),
                timestamp: record.timestamp,
                window_seconds: 0,
                confidence: confidence.min(1.0),
                context,
            });
        }
    }
}

fn detect_geographic_concentration(
    by_ip: &BTreeMap<String, Vec<&Record>>,
    total: u64,
    ids: &mut IdGen,
    out: &mut Vec<Anomaly>,
) {
    if total < CONCENTRATION_MIN_TOTAL {
        return;
    }
    for (ip, rows) in by_ip {
        let share = rows.len() as f64 / total as f64;
        let severity = if share > 0.5 {
            Severity::Critical
        } else if share > 0.25 {
            Severity::High
        } else if share > 0.1 {
            Severity::Medium
        } else {
            continue;
        };
        let last = rows
            .iter()
            .map(|r| r.timestamp)
            .max()
            .unwrap_or(OffsetDateTime::UNIX_EPOCH);
        out.push(Anomaly {
            id: ids.next(),
            kind: AnomalyKind::GeographicConcentration,
            severity,
            metric: "traffic_share".to_string(),
            expected: total as f64 * 0.1,
            actual: rows.len() as f64,
            deviation: rows.len() as f64 - total as f64 * 0.1,
            z_score: share / 0.1,
            ip: ip.clone(),
            timestamp: last,
            window_seconds: 0,
            confidence: (0.5 + share).min(0.95),
            context: BTreeMap::new(),
        });
    }
}

fn detect_endpoint_enumeration(
    by_ip: &BTreeMap<String, Vec<&Record>>,
    ids: &mut IdGen,
    out: &mut Vec<Anomaly>,
) {
    for (ip, rows) in by_ip {
        let unique: BTreeSet<&str> = rows.iter().map(|r| r.path()).collect();
        let ratio = unique.len() as f64 / rows.len() as f64;
        if unique.len() <= ENUMERATION_MIN_UNIQUE || ratio <= 0.5 {
            continue;
        }
        let severity = if unique.len() > ENUMERATION_HIGH_UNIQUE {
            Severity::High
        } else {
            Severity::Medium
        };
        let last = rows
            .iter()
            .map(|r| r.timestamp)
            .max()
            .unwrap_or(OffsetDateTime::UNIX_EPOCH);
        let mut context = BTreeMap::new();
        context.insert("unique_endpoints".to_string(), unique.len().to_string());
        out.push(Anomaly {
            id: ids.next(),
            kind: AnomalyKind::EndpointEnumeration,
            severity,
            metric: "endpoint_ratio".to_string(),
            expected: rows.len() as f64 * 0.5,
            actual: unique.len() as f64,
            deviation: unique.len() as f64 - rows.len() as f64 * 0.5,
            z_score: ratio * 10.0,
            ip: ip.clone(),
            timestamp: last,
            window_seconds: 0,
            confidence: (0.5 + ratio / 2.0).min(0.95),
            context,
        });
    }
}

fn detect_status_pattern(
    by_ip: &BTreeMap<String, Vec<&Record>>,
    baseline: &Baseline,
    threshold: f64,
    ids: &mut IdGen,
    out: &mut Vec<Anomaly>,
) {
    for (ip, rows) in by_ip {
        let n = rows.len() as u64;
        if n < STATUS_MIN_REQUESTS {
            continue;
        }
        let mut counts: BTreeMap<u16, u64> = BTreeMap::new();
        for record in rows {
            *counts.entry(record.status).or_insert(0) += 1;
        }
        for (status, count) in counts {
            let observed = count as f64 / n as f64;
            let expected = baseline
                .status_frequencies
                .get(&status)
                .copied()
                .unwrap_or(0.0);
            let sigma = (expected * (1.0 - expected) / n as f64).sqrt().max(0.02);
            let z = (observed - expected) / sigma;
            let ladder = severity_from_z(z, threshold);
            let severity = if status >= 500 && observed > 0.3 {
                Some(Severity::Critical)
            } else if status >= 500 && observed > 0.1 {
                Some(ladder.unwrap_or(Severity::Low).max(Severity::High))
            } else {
                ladder
            };
            let Some(severity) = severity else { continue };
            let last = rows
                .iter()
                .map(|r| r.timestamp)
                .max()
                .unwrap_or(OffsetDateTime::UNIX_EPOCH);
            let mut context = BTreeMap::new();
            context.insert("status".to_string(), status.to_string());
            out.push(Anomaly {
                id: ids.next(),
                kind: AnomalyKind::StatusPattern,
                severity,
                metric: format!("status_{status}_share"),
                expected,
                actual: observed,
                deviation: observed - expected,
                z_score: z,
                ip: ip.clone(),
                timestamp: last,
                window_seconds: 0,
                confidence: z_confidence(z),
                context,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::config::SecurityConfig;
    use crate::parser::parse_line;

    use super::super::baseline::compute_baseline;
    use super::super::threat::{IdGen, Severity};
    use super::{AnomalyKind, detect_anomalies_with};

    fn detect(records: &[crate::Record]) -> Vec<super::Anomaly> {
        let baseline = compute_baseline(records);
        let mut ids = IdGen::new("A");
        detect_anomalies_with(records, &SecurityConfig::default(), &baseline, &mut ids)
    }

    fn background(count: usize) -> Vec<crate::Record> {
        (0..count)
            .map(|i| {
                let line = format!(
                    r#"10.0.{}.{} - - [22/Aug/2024:{:02}:{:02}:00 +0000] "GET /page{} HTTP/1.1" 200 500 "-" "Mozilla/5.0 (X11; Linux x86_64) Firefox/128.0""#,
                    i % 8 + 1,
                    i % 50 + 1,
                    10 + (i / 60) % 12,
                    i % 60,
                    i % 7
                );
                parse_line(&line).expect("parse")
            })
            .collect()
    }

    #[test]
    fn hot_window_is_a_high_frequency_anomaly() {
        let mut records = background(120);
        for i in 0..500 {
            let line = format!(
                r#"203.0.113.99 - - [22/Aug/2024:10:{:02}:{:02} +0000] "GET /hit HTTP/1.1" 200 100 "-" "Mozilla/5.0 (X11; Linux x86_64) Firefox/128.0""#,
                30 + (i / 60) % 5,
                i % 60
            );
            records.push(parse_line(&line).expect("parse"));
        }
        let anomalies = detect(&records);
        let frequency: Vec<_> = anomalies
            .iter()
            .filter(|a| a.kind == AnomalyKind::RequestFrequency && a.ip == "203.0.113.99")
            .collect();
        assert!(!frequency.is_empty());
        assert!(frequency.iter().any(|a| a.z_score.abs() > 5.0));
        assert!(frequency.iter().any(|a| a.severity >= Severity::High));
    }

    #[test]
    fn oversized_response_is_a_size_anomaly() {
        let mut records = background(100);
        let line = r#"10.0.1.1 - - [22/Aug/2024:11:00:00 +0000] "GET /dump.sql HTTP/1.1" 200 90000000 "-" "Mozilla/5.0 (X11; Linux x86_64) Firefox/128.0""#;
        records.push(parse_line(line).expect("parse"));
        let anomalies = detect(&records);
        assert!(
            anomalies
                .iter()
                .any(|a| a.kind == AnomalyKind::ResponseSize && a.actual == 90000000.0)
        );
    }

    #[test]
    fn failing_ip_is_an_error_rate_anomaly() {
        let mut records = background(100);
        for i in 0..30 {
            let line = format!(
                r#"203.0.113.50 - - [22/Aug/2024:10:3{}:{:02} +0000] "GET /broken HTTP/1.1" 500 0 "-" "Mozilla/5.0 (X11; Linux x86_64) Firefox/128.0""#,
                i / 10,
                (i * 2) % 60
            );
            records.push(parse_line(&line).expect("parse"));
        }
        let anomalies = detect(&records);
        let errors: Vec<_> = anomalies
            .iter()
            .filter(|a| a.kind == AnomalyKind::ErrorRate && a.ip == "203.0.113.50")
            .collect();
        assert!(!errors.is_empty());
        assert!(errors.iter().any(|a| a.severity >= Severity::Critical));
    }

    #[test]
    fn empty_agent_is_a_user_agent_anomaly() {
        let mut records = background(40);
        for i in 0..3 {
            let line = format!(
                r#"203.0.113.77 - - [22/Aug/2024:10:40:{i:02} +0000] "GET /x HTTP/1.1" 200 10 "-" "-""#
            );
            records.push(parse_line(&line).expect("parse"));
        }
        let anomalies = detect(&records);
        assert!(
            anomalies
                .iter()
                .any(|a| a.kind == AnomalyKind::UserAgent && a.ip == "203.0.113.77")
        );
    }

    #[test]
    fn dominant_ip_is_a_concentration_anomaly() {
        let mut records = background(30);
        for i in 0..60 {
            let line = format!(
                r#"203.0.113.11 - - [22/Aug/2024:12:{:02}:{:02} +0000] "GET /only HTTP/1.1" 200 100 "-" "Mozilla/5.0 (X11; Linux x86_64) Firefox/128.0""#,
                i / 60,
                i % 60
            );
            records.push(parse_line(&line).expect("parse"));
        }
        let anomalies = detect(&records);
        let concentration = anomalies
            .iter()
            .find(|a| a.kind == AnomalyKind::GeographicConcentration && a.ip == "203.0.113.11")
            .expect("concentration anomaly");
        assert_eq!(concentration.severity, Severity::Critical);
    }

    #[test]
    fn wide_path_coverage_is_enumeration() {
        let records: Vec<crate::Record> = (0..40)
            .map(|i| {
                let line = format!(
                    r#"203.0.113.60 - - [22/Aug/2024:10:{:02}:{:02} +0000] "GET /probe/{i} HTTP/1.1" 404 0 "-" "Mozilla/5.0 (X11; Linux x86_64) Firefox/128.0""#,
                    30 + i / 60,
                    i % 60
                );
                parse_line(&line).expect("parse")
            })
            .collect();
        let anomalies = detect(&records);
        assert!(
            anomalies
                .iter()
                .any(|a| a.kind == AnomalyKind::EndpointEnumeration)
        );
    }

    #[test]
    fn anomalies_are_ordered_by_severity_then_id() {
        let mut records = background(120);
        for i in 0..500 {
            let line = format!(
                r#"203.0.113.99 - - [22/Aug/2024:10:{:02}:{:02} +0000] "GET /hit HTTP/1.1" 500 100 "-" "-""#,
                30 + (i / 60) % 5,
                i % 60
            );
            records.push(parse_line(&line).expect("parse"));
        }
        let anomalies = detect(&records);
        for pair in anomalies.windows(2) {
            assert!(pair[0].severity >= pair[1].severity);
            if pair[0].severity == pair[1].severity {
                assert!(pair[0].id < pair[1].id);
            }
        }
    }
}
