//! Period-to-period trend comparison and degradation detection.
//!
//! Degradation mode splits a single stream at the median-by-count and
//! compares the first half (baseline) against the second (current).
//! Every compared metric gets a direction, a significance band, and
//! alert text; the overall direction and a 0-100 risk score summarise
//! the comparison.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::Record;
use crate::analysis::classify_bot;
use crate::config::{ConfigError, TrendConfig};
use crate::security::Severity;

#[derive(Debug, Error)]
pub enum TrendError {
    #[error("insufficient data: need at least {needed} records, got {actual}")]
    InsufficientData { needed: usize, actual: usize },
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Direction of a metric (or the whole period) between two periods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendDirection {
    Improving,
    Stable,
    Degrading,
    Critical,
}

impl fmt::Display for TrendDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            TrendDirection::Improving => "improving",
            TrendDirection::Stable => "stable",
            TrendDirection::Degrading => "degrading",
            TrendDirection::Critical => "critical",
        };
        write!(f, "{label}")
    }
}

/// Weight band for the magnitude of a change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Significance {
    Low,
    Medium,
    High,
}

/// Snapshot of the compared metrics for one period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodMetrics {
    pub total_requests: u64,
    pub error_rate: f64,
    pub mean_response_size: f64,
    pub total_bytes: u64,
    pub unique_ips: u64,
    pub bot_percent: f64,
}

/// One compared metric with its classification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricChange {
    pub name: String,
    pub baseline: f64,
    pub current: f64,
    pub absolute: f64,
    pub percent: f64,
    pub direction: TrendDirection,
    pub significance: Significance,
    pub text: String,
}

/// Alert emitted for every degrading or critical metric.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DegradationAlert {
    pub severity: Severity,
    pub metric: String,
    pub current: f64,
    pub baseline: f64,
    pub threshold_pct: f64,
    pub impact: String,
    pub recommendation: String,
}

/// Full comparison output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeriodComparison {
    pub baseline: PeriodMetrics,
    pub current: PeriodMetrics,
    pub changes: Vec<MetricChange>,
    pub overall: TrendDirection,
    /// 0-100; higher means more degradation pressure.
    pub risk_score: f64,
    pub summary: String,
    pub alerts: Vec<DegradationAlert>,
}

enum Polarity {
    HigherWorse,
    HigherBetter,
    Neutral,
}

struct MetricSpec {
    name: &'static str,
    polarity: Polarity,
    doubled_in_risk: bool,
    recommendation: &'static str,
}

const METRICS: [MetricSpec; 6] = [
    MetricSpec {
        name: "Total Requests",
        polarity: Polarity::HigherBetter,
        doubled_in_risk: false,
        recommendation: "Check upstream availability and DNS for traffic loss",
    },
    MetricSpec {
        name: "Error Rate",
        polarity: Polarity::HigherWorse,
        doubled_in_risk: true,
        recommendation: "Inspect recent deploys and error URLs for the failing paths",
    },
    MetricSpec {
        name: "Mean Response Size",
        polarity: Polarity::HigherWorse,
        doubled_in_risk: false,
        recommendation: "Review payload growth and enable compression for large responses",
    },
    MetricSpec {
        name: "Total Bytes",
        polarity: Polarity::HigherBetter,
        doubled_in_risk: false,
        recommendation: "Verify content delivery and cache hit rates",
    },
    MetricSpec {
        name: "Unique IPs",
        polarity: Polarity::HigherBetter,
        doubled_in_risk: false,
        recommendation: "Check reachability from major networks and crawler access",
    },
    MetricSpec {
        name: "Bot Share",
        polarity: Polarity::Neutral,
        doubled_in_risk: false,
        recommendation: "Review bot policy if automated traffic keeps growing",
    },
];

/// Computes the metric snapshot for one period.
pub fn period_metrics(records: &[Record]) -> PeriodMetrics {
    let total = records.len() as u64;
    let mut errors = 0u64;
    let mut bytes = 0u64;
    let mut bots = 0u64;
    let mut ips: std::collections::BTreeSet<std::net::IpAddr> = std::collections::BTreeSet::new();
    for record in records {
        if record.status >= 400 {
            errors += 1;
        }
        bytes += record.size;
        if classify_bot(&record.user_agent).is_some() {
            bots += 1;
        }
        ips.insert(record.ip);
    }
    let denom = total.max(1) as f64;
    PeriodMetrics {
        total_requests: total,
        error_rate: errors as f64 / denom,
        mean_response_size: bytes as f64 / denom,
        total_bytes: bytes,
        unique_ips: ips.len() as u64,
        bot_percent: bots as f64 / denom * 100.0,
    }
}

/// Compares two periods metric by metric.
pub fn compare_trends(
    baseline: &PeriodMetrics,
    current: &PeriodMetrics,
    config: &TrendConfig,
) -> Result<PeriodComparison, TrendError> {
    config.validate()?;
    Ok(compare(baseline.clone(), current.clone(), config))
}

/// Splits a single stream at the median-by-count and compares the first
/// half (baseline) against the second (current).
pub fn detect_degradation(
    records: &[Record],
    config: &TrendConfig,
) -> Result<PeriodComparison, TrendError> {
    config.validate()?;
    if records.len() < config.minimum_sample_size {
        return Err(TrendError::InsufficientData {
            needed: config.minimum_sample_size,
            actual: records.len(),
        });
    }

    let mut ordered: Vec<&Record> = records.iter().collect();
    ordered.sort_by_key(|record| record.timestamp);
    let mid = ordered.len() / 2;
    let baseline: Vec<Record> = ordered[..mid].iter().map(|r| (*r).clone()).collect();
    let current: Vec<Record> = ordered[mid..].iter().map(|r| (*r).clone()).collect();
    debug!(baseline = baseline.len(), current = current.len(), "degradation split");

    Ok(compare(
        period_metrics(&baseline),
        period_metrics(&current),
        config,
    ))
}

fn compare(
    baseline: PeriodMetrics,
    current: PeriodMetrics,
    config: &TrendConfig,
) -> PeriodComparison {
    let values = |metrics: &PeriodMetrics| -> [f64; 6] {
        [
            metrics.total_requests as f64,
            metrics.error_rate,
            metrics.mean_response_size,
            metrics.total_bytes as f64,
            metrics.unique_ips as f64,
            metrics.bot_percent,
        ]
    };
    let old_values = values(&baseline);
    let new_values = values(&current);

    let mut changes = Vec::with_capacity(METRICS.len());
    let mut alerts = Vec::new();
    let mut weighted_sum = 0i64;
    let mut any_critical = false;
    let mut risk = 0.0f64;

    for (index, spec) in METRICS.iter().enumerate() {
        let old = old_values[index];
        let new = new_values[index];
        let absolute = new - old;
        let percent = percent_change(old, new);
        let threshold = threshold_for(spec.name, config);
        let direction = classify(&spec.polarity, percent, threshold);
        let significance = significance_of(percent);

        if matches!(direction, TrendDirection::Degrading | TrendDirection::Critical) {
            let mut contribution = percent.abs();
            if spec.doubled_in_risk {
                contribution *= 2.0;
            }
            contribution *= match significance {
                Significance::High => 2.0,
                Significance::Medium => 1.5,
                Significance::Low => 1.0,
            };
            risk += contribution;

            alerts.push(DegradationAlert {
                severity: alert_severity(direction, significance),
                metric: spec.name.to_string(),
                current: new,
                baseline: old,
                threshold_pct: threshold,
                impact: format!(
                    "{} moved {percent:+.1}% ({old:.2} -> {new:.2})",
                    spec.name
                ),
                recommendation: spec.recommendation.to_string(),
            });
        }

        if direction == TrendDirection::Critical {
            any_critical = true;
        }
        weighted_sum += direction_score(direction) * significance_weight(significance);

        changes.push(MetricChange {
            name: spec.name.to_string(),
            baseline: old,
            current: new,
            absolute,
            percent,
            direction,
            significance,
            text: format!("{}: {percent:+.1}% ({direction})", spec.name),
        });
    }

    let overall = overall_direction(weighted_sum, any_critical);
    let risk_score = risk.min(100.0);
    let summary = format!(
        "{} of {} metrics degrading; overall {overall}, risk {risk_score:.0}/100",
        alerts.len(),
        METRICS.len()
    );

    PeriodComparison {
        baseline,
        current,
        changes,
        overall,
        risk_score,
        summary,
        alerts,
    }
}

fn percent_change(old: f64, new: f64) -> f64 {
    if old == 0.0 {
        if new == 0.0 { 0.0 } else { 100.0 }
    } else {
        (new - old) / old * 100.0
    }
}

fn threshold_for(name: &str, config: &TrendConfig) -> f64 {
    match name {
        "Error Rate" => config.error_rate_threshold_pct,
        "Mean Response Size" => config.response_time_threshold_pct,
        _ => config.traffic_drop_threshold_pct,
    }
}

fn classify(polarity: &Polarity, percent: f64, threshold: f64) -> TrendDirection {
    match polarity {
        Polarity::HigherWorse => {
            if percent > threshold {
                TrendDirection::Critical
            } else if percent > 5.0 {
                TrendDirection::Degrading
            } else if percent < -5.0 {
                TrendDirection::Improving
            } else {
                TrendDirection::Stable
            }
        }
        Polarity::HigherBetter => {
            if percent < -threshold {
                TrendDirection::Critical
            } else if percent < -5.0 {
                TrendDirection::Degrading
            } else if percent > 5.0 {
                TrendDirection::Improving
            } else {
                TrendDirection::Stable
            }
        }
        Polarity::Neutral => TrendDirection::Stable,
    }
}

fn significance_of(percent: f64) -> Significance {
    let magnitude = percent.abs();
    if magnitude > 50.0 {
        Significance::High
    } else if magnitude > 15.0 {
        Significance::Medium
    } else {
        Significance::Low
    }
}

fn direction_score(direction: TrendDirection) -> i64 {
    match direction {
        TrendDirection::Critical => -3,
        TrendDirection::Degrading => -1,
        TrendDirection::Stable => 0,
        TrendDirection::Improving => 1,
    }
}

fn significance_weight(significance: Significance) -> i64 {
    match significance {
        Significance::High => 3,
        Significance::Medium => 2,
        Significance::Low => 1,
    }
}

fn overall_direction(weighted_sum: i64, any_critical: bool) -> TrendDirection {
    if (any_critical && weighted_sum < 0) || weighted_sum <= -6 {
        TrendDirection::Critical
    } else if weighted_sum < 0 {
        TrendDirection::Degrading
    } else if weighted_sum > 0 {
        TrendDirection::Improving
    } else {
        TrendDirection::Stable
    }
}

fn alert_severity(direction: TrendDirection, significance: Significance) -> Severity {
    match (direction, significance) {
        (TrendDirection::Critical, _) => Severity::Critical,
        (_, Significance::High) => Severity::High,
        (_, Significance::Medium) => Severity::Medium,
        _ => Severity::Low,
    }
}

#[cfg(test)]
mod tests {
    use crate::config::TrendConfig;
    use crate::parser::parse_line;
    use crate::security::Severity;

    use super::{TrendDirection, TrendError, compare_trends, detect_degradation, period_metrics};

    fn stream(baseline_error_pct: u64, current_error_pct: u64) -> Vec<crate::Record> {
        let mut records = Vec::new();
        for half in 0..2u64 {
            let error_pct = if half == 0 {
                baseline_error_pct
            } else {
                current_error_pct
            };
            for i in 0..100u64 {
                let status = if i % 100 < error_pct { 500 } else { 200 };
                let line = format!(
                    r#"10.0.{}.{} - - [22/Aug/2024:{:02}:{:02}:{:02} +0000] "GET /p{} HTTP/1.1" {status} 400 "-" "Mozilla/5.0 (X11; Linux x86_64) Firefox/128.0""#,
                    i % 4 + 1,
                    i % 20 + 1,
                    10 + half * 2,
                    (i / 60) % 60,
                    i % 60,
                    i % 6
                );
                records.push(parse_line(&line).expect("parse"));
            }
        }
        records
    }

    #[test]
    fn error_rate_spike_is_critical_overall() {
        let records = stream(1, 25);
        let comparison = detect_degradation(&records, &TrendConfig::default()).expect("trend");
        assert_eq!(comparison.overall, TrendDirection::Critical);
        assert!(comparison.risk_score >= 50.0);
        let alert = comparison
            .alerts
            .iter()
            .find(|a| a.metric == "Error Rate")
            .expect("error rate alert");
        assert_eq!(alert.severity, Severity::Critical);
    }

    #[test]
    fn steady_traffic_is_stable() {
        let records = stream(2, 2);
        let comparison = detect_degradation(&records, &TrendConfig::default()).expect("trend");
        assert_eq!(comparison.overall, TrendDirection::Stable);
        assert!(comparison.alerts.is_empty());
        assert_eq!(comparison.risk_score, 0.0);
    }

    #[test]
    fn improving_error_rate_is_improving() {
        let records = stream(25, 1);
        let comparison = detect_degradation(&records, &TrendConfig::default()).expect("trend");
        assert_eq!(comparison.overall, TrendDirection::Improving);
    }

    #[test]
    fn too_few_records_is_an_error() {
        let records = stream(1, 1).into_iter().take(50).collect::<Vec<_>>();
        let err = detect_degradation(&records, &TrendConfig::default()).unwrap_err();
        assert!(matches!(
            err,
            TrendError::InsufficientData {
                needed: 100,
                actual: 50
            }
        ));
    }

    #[test]
    fn compare_trends_reports_percentages() {
        let records = stream(1, 25);
        let mid = records.len() / 2;
        let baseline = period_metrics(&records[..mid]);
        let current = period_metrics(&records[mid..]);
        let comparison =
            compare_trends(&baseline, &current, &TrendConfig::default()).expect("compare");
        let change = comparison
            .changes
            .iter()
            .find(|c| c.name == "Error Rate")
            .expect("error rate change");
        assert!(change.percent > 1000.0);
        assert_eq!(change.direction, TrendDirection::Critical);
    }
}
