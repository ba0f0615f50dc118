//! Result emission for external renderers.
//!
//! JSON is a direct field-by-field dump of the result structures with
//! stable key names; CSV is a long-form `(section, metric, value,
//! percentage)` table covering every section of the aggregate results.

use crate::analysis::Results;

/// Compact JSON dump of the aggregate results.
pub fn results_to_json(results: &Results) -> String {
    serde_json::to_string(results).unwrap_or_else(|_| "{}".to_string())
}

/// Pretty-printed JSON dump of the aggregate results.
pub fn results_to_json_pretty(results: &Results) -> String {
    serde_json::to_string_pretty(results).unwrap_or_else(|_| "{}".to_string())
}

/// Long-form CSV table over the aggregate results.
pub fn results_to_csv(results: &Results) -> String {
    let mut writer = csv::Writer::from_writer(Vec::new());
    let _ = writer.write_record(["section", "metric", "value", "percentage"]);
    let total = results.total_requests;
    let pct = |count: u64| -> String {
        if total == 0 {
            String::new()
        } else {
            format!("{:.2}", count as f64 / total as f64 * 100.0)
        }
    };

    let mut row = |section: &str, metric: &str, value: String, percentage: String| {
        let _ = writer.write_record([section, metric, value.as_str(), percentage.as_str()]);
    };

    row("overview", "total_requests", total.to_string(), String::new());
    row(
        "overview",
        "unique_ips",
        results.unique_ips.to_string(),
        String::new(),
    );
    row(
        "overview",
        "unique_urls",
        results.unique_urls.to_string(),
        String::new(),
    );
    row(
        "overview",
        "total_bytes",
        results.total_bytes.to_string(),
        String::new(),
    );
    row(
        "overview",
        "mean_bytes",
        format!("{:.2}", results.mean_bytes),
        String::new(),
    );
    row(
        "overview",
        "average_requests_per_hour",
        format!("{:.2}", results.average_requests_per_hour),
        String::new(),
    );

    for class in &results.status_classes {
        row("status_classes", &class.class, class.count.to_string(), pct(class.count));
    }
    for status in &results.status_codes {
        row(
            "status_codes",
            &status.status.to_string(),
            status.count.to_string(),
            pct(status.count),
        );
    }
    for entry in &results.top_ips {
        row("top_ips", &entry.key, entry.count.to_string(), format!("{:.2}", entry.percentage));
    }
    for entry in &results.top_urls {
        row("top_urls", &entry.key, entry.count.to_string(), format!("{:.2}", entry.percentage));
    }
    for entry in &results.methods {
        row("methods", &entry.key, entry.count.to_string(), format!("{:.2}", entry.percentage));
    }

    row(
        "bots",
        "bot_requests",
        results.bots.bot_requests.to_string(),
        format!("{:.2}", results.bots.bot_percent),
    );
    row(
        "bots",
        "human_requests",
        results.bots.human_requests.to_string(),
        String::new(),
    );
    for entry in &results.bots.top_bots {
        row("top_bots", &entry.key, entry.count.to_string(), format!("{:.2}", entry.percentage));
    }

    for stat in &results.file_types {
        row(
            "file_types",
            &stat.extension,
            format!("{} requests, {} bytes", stat.count, stat.bytes),
            pct(stat.count),
        );
    }
    for hour in &results.hourly_traffic {
        row(
            "hourly_traffic",
            &format!("{:02}:00", hour.hour),
            hour.count.to_string(),
            pct(hour.count),
        );
    }
    for peak in &results.traffic_peaks {
        let start = peak
            .start
            .format(&time::format_description::well_known::Rfc3339)
            .unwrap_or_default();
        row(
            "traffic_peaks",
            &start,
            format!("{} requests in {}s", peak.count, peak.duration_seconds),
            String::new(),
        );
    }
    for error in &results.error_urls {
        row(
            "error_urls",
            &error.url,
            error.error_count.to_string(),
            pct(error.error_count),
        );
    }
    for url in &results.largest_urls {
        row("largest_urls", &url.url, url.bytes.to_string(), String::new());
    }

    let sizes = &results.size_stats;
    for (metric, value) in [
        ("p50", sizes.p50),
        ("p95", sizes.p95),
        ("p99", sizes.p99),
        ("min", sizes.min),
        ("max", sizes.max),
    ] {
        row("size_stats", metric, value.to_string(), String::new());
    }
    row("size_stats", "mean", format!("{:.2}", sizes.mean), String::new());

    row("geo", "local_requests", results.geo.local_requests.to_string(), pct(results.geo.local_requests));
    row("geo", "cloud_requests", results.geo.cloud_requests.to_string(), pct(results.geo.cloud_requests));
    row(
        "geo",
        "unknown_requests",
        results.geo.unknown_requests.to_string(),
        pct(results.geo.unknown_requests),
    );
    for entry in &results.geo.countries {
        row("geo_countries", &entry.key, entry.count.to_string(), format!("{:.2}", entry.percentage));
    }

    row(
        "security",
        "threat_level",
        results.security.threat_level.clone(),
        String::new(),
    );
    row(
        "security",
        "score",
        format!("{:.0}", results.security.score),
        String::new(),
    );
    for attack in &results.security.attack_counts {
        row("security_attacks", &attack.kind, attack.count.to_string(), String::new());
    }
    for ip in &results.security.suspicious_ips {
        row("suspicious_ips", ip, String::new(), String::new());
    }

    match writer.into_inner() {
        Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        Err(_) => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use crate::analysis::analyze;
    use crate::parser::parse_line;

    use super::{results_to_csv, results_to_json};

    fn results() -> crate::analysis::Results {
        let records: Vec<crate::Record> = [
            r#"10.0.0.1 - - [22/Aug/2024:10:30:45 +0000] "GET /a.html HTTP/1.1" 200 100 "-" "curl/8""#,
            r#"10.0.0.2 - - [22/Aug/2024:11:30:46 +0000] "GET /b.css HTTP/1.1" 404 50 "-" "Mozilla""#,
        ]
        .iter()
        .map(|line| parse_line(line).expect("parse"))
        .collect();
        analyze(&records, None, None).expect("analyze")
    }

    #[test]
    fn json_round_trips_the_results() {
        let results = results();
        let json = results_to_json(&results);
        let reparsed: crate::analysis::Results =
            serde_json::from_str(&json).expect("round trip");
        assert_eq!(reparsed.total_requests, results.total_requests);
        assert_eq!(reparsed.top_ips, results.top_ips);
    }

    #[test]
    fn json_is_deterministic() {
        let results = results();
        assert_eq!(results_to_json(&results), results_to_json(&results));
    }

    #[test]
    fn csv_covers_every_section() {
        let csv = results_to_csv(&results());
        for section in [
            "overview",
            "status_classes",
            "top_ips",
            "top_urls",
            "methods",
            "bots",
            "file_types",
            "hourly_traffic",
            "size_stats",
            "geo",
            "security",
        ] {
            assert!(csv.lines().any(|line| line.starts_with(section)), "missing {section}");
        }
    }

    #[test]
    fn csv_has_the_long_form_header() {
        let csv = results_to_csv(&results());
        assert!(csv.starts_with("section,metric,value,percentage"));
    }
}
