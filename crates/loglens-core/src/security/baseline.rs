use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::Record;

const TOP_USER_AGENTS: usize = 20;
const TOP_PATHS: usize = 50;
const MIN_ERROR_RATE_THRESHOLD: f64 = 0.05;

/// Behavioural baseline computed once per run over the full record set.
/// The anomaly detectors compare per-IP and per-record observations
/// against these expectations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Baseline {
    /// Mean requests per minute across the whole stream.
    pub mean_rpm: f64,
    pub mean_size: f64,
    pub stddev_size: f64,
    pub p95_size: u64,
    pub p99_size: u64,
    /// Relative frequency of each observed status code.
    pub status_frequencies: BTreeMap<u16, f64>,
    /// Most frequent user-agents (top 20, count descending).
    pub top_user_agents: Vec<(String, u64)>,
    /// Most frequent URL paths (top 50, count descending).
    pub top_paths: Vec<(String, u64)>,
    /// `max(observed error rate, 0.05)`.
    pub error_rate_threshold: f64,
    pub hour_frequencies: [u64; 24],
    /// Hours with more than 1.2x the hourly mean.
    pub peak_hours: Vec<u8>,
    /// Hours with less than 0.8x the hourly mean.
    pub off_peak_hours: Vec<u8>,
    pub total_records: u64,
}

/// Builds the baseline model for anomaly detection.
pub fn compute_baseline(records: &[Record]) -> Baseline {
    let total = records.len() as u64;

    let mut status_counts: BTreeMap<u16, u64> = BTreeMap::new();
    let mut agent_counts: BTreeMap<String, u64> = BTreeMap::new();
    let mut path_counts: BTreeMap<String, u64> = BTreeMap::new();
    let mut hour_frequencies = [0u64; 24];
    let mut sizes: Vec<u64> = Vec::with_capacity(records.len());
    let mut errors = 0u64;

    for record in records {
        *status_counts.entry(record.status).or_insert(0) += 1;
        *agent_counts.entry(record.user_agent.clone()).or_insert(0) += 1;
        *path_counts.entry(record.path().to_string()).or_insert(0) += 1;
        hour_frequencies[record.timestamp.hour() as usize] += 1;
        sizes.push(record.size);
        if record.status >= 400 {
            errors += 1;
        }
    }

    let mean_size = if sizes.is_empty() {
        0.0
    } else {
        sizes.iter().sum::<u64>() as f64 / sizes.len() as f64
    };
    let stddev_size = if sizes.len() < 2 {
        0.0
    } else {
        let variance = sizes
            .iter()
            .map(|&s| (s as f64 - mean_size).powi(2))
            .sum::<f64>()
            / sizes.len() as f64;
        variance.sqrt()
    };

    sizes.sort_unstable();
    let p95_size = crate::analysis::percentile(&sizes, 0.95);
    let p99_size = crate::analysis::percentile(&sizes, 0.99);

    let mean_rpm = match (
        records.iter().map(|r| r.timestamp).min(),
        records.iter().map(|r| r.timestamp).max(),
    ) {
        (Some(first), Some(last)) => {
            let minutes = ((last - first).whole_seconds() as f64 / 60.0).max(1.0);
            total as f64 / minutes
        }
        _ => 0.0,
    };

    let observed_error_rate = if total == 0 {
        0.0
    } else {
        errors as f64 / total as f64
    };

    let hourly_mean = total as f64 / 24.0;
    let mut peak_hours = Vec::new();
    let mut off_peak_hours = Vec::new();
    for (hour, &count) in hour_frequencies.iter().enumerate() {
        if count as f64 > hourly_mean * 1.2 {
            peak_hours.push(hour as u8);
        } else if (count as f64) < hourly_mean * 0.8 {
            off_peak_hours.push(hour as u8);
        }
    }

    Baseline {
        mean_rpm,
        mean_size,
        stddev_size,
        p95_size,
        p99_size,
        status_frequencies: status_counts
            .into_iter()
            .map(|(status, count)| (status, count as f64 / total.max(1) as f64))
            .collect(),
        top_user_agents: top_entries(agent_counts, TOP_USER_AGENTS),
        top_paths: top_entries(path_counts, TOP_PATHS),
        error_rate_threshold: observed_error_rate.max(MIN_ERROR_RATE_THRESHOLD),
        hour_frequencies,
        peak_hours,
        off_peak_hours,
        total_records: total,
    }
}

fn top_entries(map: BTreeMap<String, u64>, keep: usize) -> Vec<(String, u64)> {
    let mut entries: Vec<(String, u64)> = map.into_iter().collect();
    entries.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    entries.truncate(keep);
    entries
}

#[cfg(test)]
mod tests {
    use crate::parser::parse_line;

    use super::compute_baseline;

    fn records() -> Vec<crate::Record> {
        (0..20)
            .map(|i| {
                let status = if i % 10 == 0 { 500 } else { 200 };
                let line = format!(
                    r#"10.0.0.{} - - [22/Aug/2024:10:{:02}:00 +0000] "GET /page{} HTTP/1.1" {status} {} "-" "agent-{}""#,
                    i % 3 + 1,
                    30 + i,
                    i % 5,
                    100 + i,
                    i % 2
                );
                parse_line(&line).expect("parse")
            })
            .collect()
    }

    #[test]
    fn error_threshold_has_a_floor() {
        let baseline = compute_baseline(&records());
        // 2 errors over 20 records = 0.10 observed.
        assert!((baseline.error_rate_threshold - 0.10).abs() < 1e-9);

        let clean: Vec<crate::Record> = records()
            .into_iter()
            .map(|mut r| {
                r.status = 200;
                r
            })
            .collect();
        let baseline = compute_baseline(&clean);
        assert!((baseline.error_rate_threshold - 0.05).abs() < 1e-9);
    }

    #[test]
    fn rpm_reflects_the_observed_span() {
        let baseline = compute_baseline(&records());
        // 20 records over 19 minutes.
        assert!(baseline.mean_rpm > 1.0 && baseline.mean_rpm < 1.2);
    }

    #[test]
    fn status_frequencies_sum_to_one() {
        let baseline = compute_baseline(&records());
        let sum: f64 = baseline.status_frequencies.values().sum();
        assert!((sum - 1.0).abs() < 1e-9);
    }

    #[test]
    fn empty_input_is_harmless() {
        let baseline = compute_baseline(&[]);
        assert_eq!(baseline.total_records, 0);
        assert_eq!(baseline.mean_rpm, 0.0);
        assert!((baseline.error_rate_threshold - 0.05).abs() < 1e-9);
    }
}
