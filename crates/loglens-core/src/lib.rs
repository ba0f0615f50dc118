//! LogLens core library for offline HTTP access-log analytics.
//!
//! This crate exposes the analysis pipeline used by the CLI and tests:
//! line sources feed the parser, which produces an immutable record stream
//! shared read-only by the aggregator, the SLAQ query engine, the security
//! detectors and the trend analyser. Parsing is line-oriented and
//! side-effect free; all I/O is isolated in `source` modules.
//!
//! Key guarantees:
//! - All result vectors are deterministically ordered (count descending,
//!   key ascending on ties) and stable across runs.
//! - Per-line parse failures are absorbed as warnings; analytics always
//!   return a result when at least one record survived.
//!
//! # Examples
//! ```no_run
//! use std::path::Path;
//!
//! use loglens_core::{analyze, parse_file};
//!
//! let parsed = parse_file(Path::new("access.log.gz"))?;
//! let results = analyze(&parsed.records, None, None)?;
//! println!("{} requests from {} IPs", results.total_requests, results.unique_ips);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use std::net::IpAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

mod analysis;
mod config;
mod parser;
mod query;
mod render;
mod security;
mod source;
mod trends;

pub use analysis::{
    AnalysisError, BotSummary, CountEntry, ErrorUrl, FileTypeStat, GeoSummary, HourCount,
    PerformanceGrade, Results, SizeStats, StatusClassCount, StatusCount, TimeRange, TrafficPeak,
    UrlBytes, UrlMeanSize, analyze, analyze_with_cancel, grade_performance,
};
pub use config::{ConfigError, PerformanceThresholds, SecurityConfig, TrendConfig};
pub use parser::{
    BatchResult, FileFailure, LineError, ParseSummary, ParsedLog, format_clf, parse_file,
    parse_file_with_cancel, parse_files, parse_files_with_cancel, parse_line,
};
pub use query::{
    QueryError, QueryErrorKind, QueryFormat, QueryResult, Value, render_query_result, run_query,
};
pub use render::{results_to_csv, results_to_json, results_to_json_pretty};
pub use security::{
    Anomaly, AnomalyKind, AttackCount, AttackVector, Baseline, InfraAttackKind, IpProfile,
    RiskLevel, SecurityAnalysis, SecurityReport, SecurityScore, Severity, Threat, ThreatKind,
    WebAttackKind, analyze_security, compute_baseline, detect_anomalies,
    detect_infrastructure_attacks, detect_threats, detect_web_attacks, profile_ips, score_security,
};
pub use source::{LineEvent, LineSource, LogFileSource, SourceError};
pub use trends::{
    DegradationAlert, MetricChange, PeriodComparison, PeriodMetrics, Significance, TrendDirection,
    TrendError, compare_trends, detect_degradation, period_metrics,
};

/// A single parsed access-log record.
///
/// Records are immutable after parsing and shared read-only with every
/// downstream component for the duration of an analysis run.
///
/// # Examples
/// ```
/// use loglens_core::parse_line;
///
/// let record = parse_line(
///     r#"10.0.0.1 - - [22/Aug/2024:10:30:45 +0000] "GET /a HTTP/1.1" 200 100 "-" "curl/8""#,
/// )?;
/// assert_eq!(record.status, 200);
/// assert_eq!(record.url, "/a");
/// # Ok::<(), loglens_core::LineError>(())
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Client IP address (IPv4 or IPv6).
    pub ip: IpAddr,
    /// Request instant, normalised to UTC.
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    /// HTTP method as written in the request line.
    pub method: String,
    /// Request target including any query string.
    pub url: String,
    /// Protocol token from the request line (e.g., "HTTP/1.1").
    pub protocol: String,
    /// Response status code.
    pub status: u16,
    /// Response size in bytes; `-` in the source parses as 0.
    pub size: u64,
    /// Referer header; empty for common-format lines.
    pub referer: String,
    /// User-Agent header; empty for common-format lines.
    pub user_agent: String,
}

impl Record {
    /// Path component of the URL, without the query string.
    pub fn path(&self) -> &str {
        match self.url.split_once('?') {
            Some((path, _)) => path,
            None => &self.url,
        }
    }
}

/// Cloneable cancellation flag checked at parse-loop boundaries (per line)
/// and at the top of each aggregation pass.
///
/// Partial results are discarded on cancellation; no external state is
/// mutated, so rollback is trivial.
///
/// # Examples
/// ```
/// use loglens_core::CancelToken;
///
/// let token = CancelToken::new();
/// assert!(!token.is_cancelled());
/// token.cancel();
/// assert!(token.is_cancelled());
/// ```
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    /// Creates a token in the not-cancelled state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation; visible to all clones of this token.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    /// Returns true once `cancel` has been called on any clone.
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}
