//! Single-pass multi-dimensional aggregation over the parsed record
//! stream.
//!
//! One loop feeds every roll-up map; the `build_*` finalizers then sort
//! each output deterministically (count descending, key ascending on
//! ties), so results are stable for any permutation of the input.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::OffsetDateTime;
use tracing::debug;

use crate::security::{self, SecurityAnalysis};
use crate::{CancelToken, Record};

mod bots;
mod filetypes;
mod geo;
mod hours;
mod performance;
mod sizes;
mod tops;

pub use bots::BotSummary;
pub use filetypes::FileTypeStat;
pub use geo::GeoSummary;
pub use hours::{HourCount, TrafficPeak};
pub use performance::{PerformanceGrade, grade_performance};
pub use sizes::{SizeStats, UrlBytes, UrlMeanSize};
pub use tops::CountEntry;

pub(crate) use bots::classify_bot;
pub(crate) use sizes::percentile;
use filetypes::{build_file_types, extension_of};
use geo::GeoStats;
use hours::{build_hourly, detect_traffic_peaks, peak_hour, quietest_hour};
use sizes::{build_largest_urls, build_size_stats};
use tops::{percentage, ranked_entries};

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("operation cancelled")]
    Cancelled,
}

/// Inclusive first/last request instants of the filtered set.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeRange {
    #[serde(with = "time::serde::rfc3339")]
    pub start: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub end: OffsetDateTime,
}

/// One status class (`1xx`..`5xx`, plus `other` for out-of-range codes).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusClassCount {
    pub class: String,
    pub count: u64,
}

/// One detailed status code with its count.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusCount {
    pub status: u16,
    pub count: u64,
}

/// A URL that served at least one response with status >= 400.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorUrl {
    pub url: String,
    pub error_count: u64,
    pub total_count: u64,
}

/// Aggregate analytics over the filtered record set. All vectors are
/// deterministically ordered; serializing the same input twice produces
/// byte-identical JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Results {
    pub total_requests: u64,
    pub unique_ips: u64,
    pub unique_urls: u64,
    pub total_bytes: u64,
    pub mean_bytes: f64,
    pub time_range: Option<TimeRange>,
    pub status_classes: Vec<StatusClassCount>,
    pub status_codes: Vec<StatusCount>,
    pub top_ips: Vec<CountEntry>,
    pub top_urls: Vec<CountEntry>,
    pub methods: Vec<CountEntry>,
    pub bots: BotSummary,
    pub file_types: Vec<FileTypeStat>,
    pub hourly_traffic: Vec<HourCount>,
    pub peak_hour: HourCount,
    pub quietest_hour: HourCount,
    pub average_requests_per_hour: f64,
    pub traffic_peaks: Vec<TrafficPeak>,
    pub error_urls: Vec<ErrorUrl>,
    pub largest_urls: Vec<UrlBytes>,
    pub size_stats: SizeStats,
    pub geo: GeoSummary,
    pub security: SecurityAnalysis,
}

/// Runs the aggregate analysis over `records`, optionally restricted to
/// the inclusive `[since, until]` window.
///
/// Filtering happens before any aggregation, so every total and
/// denominator reflects the filtered set.
pub fn analyze(
    records: &[Record],
    since: Option<OffsetDateTime>,
    until: Option<OffsetDateTime>,
) -> Result<Results, AnalysisError> {
    analyze_with_cancel(records, since, until, &CancelToken::new())
}

/// Like [`analyze`], checking the token at the top of each pass.
pub fn analyze_with_cancel(
    records: &[Record],
    since: Option<OffsetDateTime>,
    until: Option<OffsetDateTime>,
    cancel: &CancelToken,
) -> Result<Results, AnalysisError> {
    if cancel.is_cancelled() {
        return Err(AnalysisError::Cancelled);
    }

    let filtered: Vec<&Record> = records
        .iter()
        .filter(|record| {
            since.is_none_or(|s| record.timestamp >= s)
                && until.is_none_or(|u| record.timestamp <= u)
        })
        .collect();
    let total = filtered.len() as u64;
    debug!(total, "aggregation pass starting");

    let mut class_counts: HashMap<String, u64> = HashMap::new();
    let mut status_counts: HashMap<u16, u64> = HashMap::new();
    let mut ip_counts: HashMap<String, u64> = HashMap::new();
    let mut url_counts: HashMap<String, u64> = HashMap::new();
    let mut method_counts: HashMap<String, u64> = HashMap::new();
    let mut bot_counts: HashMap<String, u64> = HashMap::new();
    let mut file_types: HashMap<String, (u64, u64)> = HashMap::new();
    let mut url_sizes: HashMap<String, (u64, u64)> = HashMap::new();
    let mut error_counts: HashMap<String, u64> = HashMap::new();
    let mut hour_buckets = [0u64; 24];
    let mut geo = GeoStats::default();
    let mut sizes: Vec<u64> = Vec::with_capacity(filtered.len());
    let mut timestamps: Vec<i64> = Vec::with_capacity(filtered.len());
    let mut total_bytes = 0u64;
    let mut bot_requests = 0u64;
    let mut range: Option<(OffsetDateTime, OffsetDateTime)> = None;

    for record in &filtered {
        *class_counts
            .entry(status_class_label(record.status).to_string())
            .or_insert(0) += 1;
        *status_counts.entry(record.status).or_insert(0) += 1;
        *ip_counts.entry(record.ip.to_string()).or_insert(0) += 1;
        *url_counts.entry(record.url.clone()).or_insert(0) += 1;
        *method_counts.entry(record.method.clone()).or_insert(0) += 1;

        if let Some(name) = classify_bot(&record.user_agent) {
            bot_requests += 1;
            *bot_counts.entry(name.to_string()).or_insert(0) += 1;
        }

        let file_entry = file_types.entry(extension_of(&record.url)).or_insert((0, 0));
        file_entry.0 += 1;
        file_entry.1 += record.size;

        let size_entry = url_sizes.entry(record.url.clone()).or_insert((0, 0));
        size_entry.0 += 1;
        size_entry.1 += record.size;

        if record.status >= 400 {
            *error_counts.entry(record.url.clone()).or_insert(0) += 1;
        }

        hour_buckets[record.timestamp.hour() as usize] += 1;
        geo.add(record.ip);
        sizes.push(record.size);
        timestamps.push(record.timestamp.unix_timestamp());
        total_bytes += record.size;
        range = Some(match range {
            None => (record.timestamp, record.timestamp),
            Some((start, end)) => (start.min(record.timestamp), end.max(record.timestamp)),
        });
    }

    timestamps.sort_unstable();
    let time_range = range.map(|(start, end)| TimeRange { start, end });
    let average_requests_per_hour = match time_range {
        Some(range) => {
            let span_hours = ((range.end - range.start).whole_seconds() as f64 / 3600.0).max(1.0);
            total as f64 / span_hours
        }
        None => 0.0,
    };

    let hourly_traffic = build_hourly(hour_buckets);
    let human_requests = total - bot_requests;

    let mut status_classes: Vec<StatusClassCount> = class_counts
        .into_iter()
        .map(|(class, count)| StatusClassCount { class, count })
        .collect();
    status_classes.sort_by(|a, b| a.class.cmp(&b.class));

    let mut status_codes: Vec<StatusCount> = status_counts
        .into_iter()
        .map(|(status, count)| StatusCount { status, count })
        .collect();
    status_codes.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.status.cmp(&b.status)));

    let mut error_urls: Vec<ErrorUrl> = error_counts
        .into_iter()
        .map(|(url, error_count)| {
            let total_count = url_counts.get(&url).copied().unwrap_or(error_count);
            ErrorUrl {
                url,
                error_count,
                total_count,
            }
        })
        .collect();
    error_urls.sort_by(|a, b| {
        b.error_count
            .cmp(&a.error_count)
            .then_with(|| a.url.cmp(&b.url))
    });

    if cancel.is_cancelled() {
        return Err(AnalysisError::Cancelled);
    }
    debug!("security summary pass starting");
    let security = if since.is_none() && until.is_none() {
        security::analysis_summary(records)
    } else {
        let owned: Vec<Record> = filtered.iter().map(|record| (*record).clone()).collect();
        security::analysis_summary(&owned)
    };

    Ok(Results {
        total_requests: total,
        unique_ips: ip_counts.len() as u64,
        unique_urls: url_counts.len() as u64,
        total_bytes,
        mean_bytes: if total == 0 {
            0.0
        } else {
            total_bytes as f64 / total as f64
        },
        time_range,
        status_classes,
        status_codes,
        top_ips: ranked_entries(ip_counts, total),
        top_urls: ranked_entries(url_counts, total),
        methods: ranked_entries(method_counts, total),
        bots: BotSummary {
            bot_requests,
            human_requests,
            bot_percent: percentage(bot_requests, total),
            top_bots: ranked_entries(bot_counts, total),
        },
        file_types: build_file_types(file_types),
        peak_hour: peak_hour(&hourly_traffic),
        quietest_hour: quietest_hour(&hourly_traffic),
        average_requests_per_hour,
        traffic_peaks: detect_traffic_peaks(&timestamps, average_requests_per_hour),
        hourly_traffic,
        error_urls,
        largest_urls: build_largest_urls(&url_sizes),
        size_stats: build_size_stats(sizes, &url_sizes),
        geo: geo.finish(total),
        security,
    })
}

fn status_class_label(status: u16) -> &'static str {
    match status / 100 {
        1 => "1xx",
        2 => "2xx",
        3 => "3xx",
        4 => "4xx",
        5 => "5xx",
        _ => "other",
    }
}

#[cfg(test)]
mod tests {
    use crate::CancelToken;
    use crate::parser::parse_line;

    use super::{AnalysisError, analyze, analyze_with_cancel};

    fn scenario_records() -> Vec<crate::Record> {
        [
            r#"10.0.0.1 - - [22/Aug/2024:10:30:45 +0000] "GET /a HTTP/1.1" 200 100 "-" "curl/8""#,
            r#"10.0.0.2 - - [22/Aug/2024:10:30:46 +0000] "GET /a HTTP/1.1" 404 50 "-" "Mozilla""#,
            r#"10.0.0.1 - - [22/Aug/2024:10:30:47 +0000] "POST /b HTTP/1.1" 500 0 "-" "curl/8""#,
        ]
        .iter()
        .map(|line| parse_line(line).expect("parse"))
        .collect()
    }

    #[test]
    fn basic_aggregation_matches_expectations() {
        let records = scenario_records();
        let results = analyze(&records, None, None).expect("analyze");

        assert_eq!(results.total_requests, 3);
        assert_eq!(results.unique_ips, 2);
        assert_eq!(results.unique_urls, 2);
        assert_eq!(results.total_bytes, 150);

        let classes: Vec<(&str, u64)> = results
            .status_classes
            .iter()
            .map(|c| (c.class.as_str(), c.count))
            .collect();
        assert_eq!(classes, vec![("2xx", 1), ("4xx", 1), ("5xx", 1)]);

        assert_eq!(results.top_ips[0].key, "10.0.0.1");
        assert_eq!(results.top_ips[0].count, 2);
        assert_eq!(results.top_urls[0].key, "/a");
        assert_eq!(results.top_urls[0].count, 2);
        assert_eq!(results.bots.bot_requests, 2);
        assert_eq!(results.bots.human_requests, 1);
        assert_eq!(results.bots.top_bots[0].key, "curl");
    }

    #[test]
    fn status_class_sum_equals_total() {
        let records = scenario_records();
        let results = analyze(&records, None, None).expect("analyze");
        let sum: u64 = results.status_classes.iter().map(|c| c.count).sum();
        assert_eq!(sum, results.total_requests);
    }

    #[test]
    fn time_filter_is_inclusive() {
        let records = scenario_records();
        let since = records[1].timestamp;
        let until = records[1].timestamp;
        let results = analyze(&records, Some(since), Some(until)).expect("analyze");
        assert_eq!(results.total_requests, 1);
        assert_eq!(results.top_ips[0].key, "10.0.0.2");
    }

    #[test]
    fn permuted_input_yields_identical_top_lists() {
        let records = scenario_records();
        let mut reversed = records.clone();
        reversed.reverse();

        let a = analyze(&records, None, None).expect("analyze");
        let b = analyze(&reversed, None, None).expect("analyze");
        assert_eq!(a.top_ips, b.top_ips);
        assert_eq!(a.top_urls, b.top_urls);
        assert_eq!(a.status_codes, b.status_codes);
    }

    #[test]
    fn empty_input_produces_empty_results() {
        let results = analyze(&[], None, None).expect("analyze");
        assert_eq!(results.total_requests, 0);
        assert!(results.time_range.is_none());
        assert_eq!(results.hourly_traffic.len(), 24);
    }

    #[test]
    fn cancellation_is_observed() {
        let records = scenario_records();
        let token = CancelToken::new();
        token.cancel();
        let err = analyze_with_cancel(&records, None, None, &token).unwrap_err();
        assert!(matches!(err, AnalysisError::Cancelled));
    }

    #[test]
    fn error_urls_require_status_at_least_400() {
        let records = scenario_records();
        let results = analyze(&records, None, None).expect("analyze");
        assert_eq!(results.error_urls.len(), 2);
        assert!(results.error_urls.iter().any(|e| e.url == "/a"));
        assert!(results.error_urls.iter().any(|e| e.url == "/b"));
    }
}
