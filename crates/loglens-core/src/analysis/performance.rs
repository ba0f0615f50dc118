use serde::{Deserialize, Serialize};

use crate::config::PerformanceThresholds;

use super::Results;

// The log format carries no response times; latency is estimated from
// response sizes (fixed overhead plus transfer cost per 10 KiB).
const BASE_LATENCY_MS: f64 = 10.0;
const BYTES_PER_MS: f64 = 10_240.0;

/// Performance grading of an analysed period against configured
/// thresholds. Latency figures are size-derived estimates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceGrade {
    pub grade: String,
    pub estimated_latency_ms: f64,
    pub error_rate: f64,
    pub throughput_rps: f64,
    pub meets_error_budget: bool,
    pub meets_throughput: bool,
}

/// Grades an analysed period against the given thresholds.
pub fn grade_performance(results: &Results, thresholds: &PerformanceThresholds) -> PerformanceGrade {
    let estimated_latency_ms = BASE_LATENCY_MS + results.mean_bytes / BYTES_PER_MS * 1000.0;

    let errors: u64 = results
        .status_classes
        .iter()
        .filter(|class| class.class == "4xx" || class.class == "5xx")
        .map(|class| class.count)
        .sum();
    let error_rate = if results.total_requests == 0 {
        0.0
    } else {
        errors as f64 / results.total_requests as f64
    };
    let throughput_rps = results.average_requests_per_hour / 3600.0;

    let grade = if estimated_latency_ms <= thresholds.excellent_latency_ms {
        "excellent"
    } else if estimated_latency_ms <= thresholds.good_latency_ms {
        "good"
    } else if estimated_latency_ms <= thresholds.fair_latency_ms {
        "fair"
    } else if estimated_latency_ms <= thresholds.poor_latency_ms {
        "poor"
    } else {
        "critical"
    };

    PerformanceGrade {
        grade: grade.to_string(),
        estimated_latency_ms,
        error_rate,
        throughput_rps,
        meets_error_budget: error_rate <= thresholds.max_error_rate,
        meets_throughput: throughput_rps >= thresholds.min_throughput_rps,
    }
}

#[cfg(test)]
mod tests {
    use crate::config::PerformanceThresholds;
    use crate::parser::parse_line;

    use super::super::analyze;
    use super::grade_performance;

    #[test]
    fn small_fast_responses_grade_excellent() {
        let records: Vec<crate::Record> = (0..10)
            .map(|i| {
                let line = format!(
                    r#"10.0.0.1 - - [22/Aug/2024:10:30:{i:02} +0000] "GET /ok HTTP/1.1" 200 512 "-" "x""#
                );
                parse_line(&line).expect("parse")
            })
            .collect();
        let results = analyze(&records, None, None).expect("analyze");
        let grade = grade_performance(&results, &PerformanceThresholds::default());
        assert_eq!(grade.grade, "excellent");
        assert!(grade.meets_error_budget);
    }

    #[test]
    fn huge_responses_and_errors_degrade_the_grade() {
        let records: Vec<crate::Record> = (0..10)
            .map(|i| {
                let line = format!(
                    r#"10.0.0.1 - - [22/Aug/2024:10:30:{i:02} +0000] "GET /dump HTTP/1.1" 500 52428800 "-" "x""#
                );
                parse_line(&line).expect("parse")
            })
            .collect();
        let results = analyze(&records, None, None).expect("analyze");
        let grade = grade_performance(&results, &PerformanceThresholds::default());
        assert_eq!(grade.grade, "critical");
        assert!(!grade.meets_error_budget);
        assert!((grade.error_rate - 1.0).abs() < 1e-9);
    }
}
