//! Access-log parsing: combined/common line formats, CLF timestamps, and
//! the per-file loop with partial-failure tolerance.
//!
//! Per-line failures are absorbed: the loop emits a `tracing` warning,
//! counts the line in the summary and continues. Open/decompress failures
//! are fatal for that file only.

mod error;
mod line;
mod timestamp;

pub use error::LineError;
pub use line::{format_clf, parse_line};

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::source::{LineSource, LogFileSource, SourceError};
use crate::{CancelToken, Record};

// Cap on per-file sample errors kept in the summary.
const MAX_SAMPLE_ERRORS: usize = 5;

/// Per-file outcome of a parse pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParseSummary {
    pub path: String,
    pub lines_read: u64,
    pub records_parsed: u64,
    pub lines_skipped: u64,
    /// Up to five sample messages describing skipped lines.
    pub sample_errors: Vec<String>,
}

/// Records plus the summary for a single parsed file.
#[derive(Debug, Clone)]
pub struct ParsedLog {
    pub records: Vec<Record>,
    pub summary: ParseSummary,
}

/// A file that could not be opened or decompressed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileFailure {
    pub path: String,
    pub error: String,
}

/// Outcome of parsing a batch of files: records concatenated in input
/// order, per-file summaries, and the files that failed outright.
#[derive(Debug, Clone, Default)]
pub struct BatchResult {
    pub records: Vec<Record>,
    pub summaries: Vec<ParseSummary>,
    pub failures: Vec<FileFailure>,
}

/// Parses a single log file (`.gz` transparently decompressed).
pub fn parse_file(path: &Path) -> Result<ParsedLog, SourceError> {
    parse_file_with_cancel(path, &CancelToken::new())
}

/// Parses a single log file, checking the token once per line.
pub fn parse_file_with_cancel(
    path: &Path,
    cancel: &CancelToken,
) -> Result<ParsedLog, SourceError> {
    let mut source = LogFileSource::open(path)?;
    let mut records = Vec::new();
    let mut summary = ParseSummary {
        path: path.display().to_string(),
        lines_read: 0,
        records_parsed: 0,
        lines_skipped: 0,
        sample_errors: Vec::new(),
    };

    loop {
        if cancel.is_cancelled() {
            return Err(SourceError::Cancelled);
        }
        let event = match source.next_line() {
            Ok(Some(event)) => event,
            Ok(None) => break,
            Err(SourceError::InvalidUtf8 { number }) => {
                skip_line(&mut summary, number, "line is not valid UTF-8");
                continue;
            }
            Err(err) => return Err(err),
        };
        summary.lines_read += 1;
        if event.text.is_empty() {
            continue;
        }
        match parse_line(&event.text) {
            Ok(record) => {
                records.push(record);
                summary.records_parsed += 1;
            }
            Err(err) => skip_line(&mut summary, event.number, &err.to_string()),
        }
    }

    Ok(ParsedLog { records, summary })
}

/// Parses multiple files, concatenating records in input order.
///
/// A file that fails to open or decompress is reported in `failures` and
/// skipped; the rest of the batch still parses.
pub fn parse_files(paths: &[std::path::PathBuf]) -> BatchResult {
    parse_files_with_cancel(paths, &CancelToken::new())
}

pub fn parse_files_with_cancel(paths: &[std::path::PathBuf], cancel: &CancelToken) -> BatchResult {
    let mut batch = BatchResult::default();
    for path in paths {
        match parse_file_with_cancel(path, cancel) {
            Ok(parsed) => {
                batch.records.extend(parsed.records);
                batch.summaries.push(parsed.summary);
            }
            Err(err) => {
                warn!(path = %path.display(), error = %err, "skipping unreadable log file");
                batch.failures.push(FileFailure {
                    path: path.display().to_string(),
                    error: err.to_string(),
                });
            }
        }
    }
    batch
}

fn skip_line(summary: &mut ParseSummary, number: u64, message: &str) {
    warn!(path = %summary.path, line = number, "{message}");
    summary.lines_skipped += 1;
    if summary.sample_errors.len() < MAX_SAMPLE_ERRORS {
        summary.sample_errors.push(format!("line {number}: {message}"));
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use flate2::Compression;
    use flate2::write::GzEncoder;

    use crate::CancelToken;
    use crate::source::SourceError;

    use super::{parse_file, parse_file_with_cancel, parse_files};

    const GOOD: &str = r#"10.0.0.1 - - [22/Aug/2024:10:30:45 +0000] "GET /a HTTP/1.1" 200 100 "-" "curl/8""#;
    const BAD: &str = "definitely not an access log line";

    #[test]
    fn bad_lines_are_skipped_and_counted() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("access.log");
        std::fs::write(&path, format!("{GOOD}\n{BAD}\n{GOOD}\n")).expect("write");

        let parsed = parse_file(&path).expect("parse");
        assert_eq!(parsed.records.len(), 2);
        assert_eq!(parsed.summary.lines_read, 3);
        assert_eq!(parsed.summary.records_parsed, 2);
        assert_eq!(parsed.summary.lines_skipped, 1);
        assert_eq!(parsed.summary.sample_errors.len(), 1);
    }

    #[test]
    fn gzip_input_parses_like_plain() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("access.log.gz");
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        writeln!(encoder, "{GOOD}").expect("compress");
        std::fs::write(&path, encoder.finish().expect("finish")).expect("write");

        let parsed = parse_file(&path).expect("parse");
        assert_eq!(parsed.records.len(), 1);
    }

    #[test]
    fn batch_preserves_input_order_and_reports_failures() {
        let dir = tempfile::tempdir().expect("tempdir");
        let first = dir.path().join("a.log");
        let second = dir.path().join("b.log");
        std::fs::write(&first, format!("{GOOD}\n")).expect("write");
        std::fs::write(
            &second,
            r#"10.0.0.9 - - [22/Aug/2024:11:00:00 +0000] "GET /b HTTP/1.1" 200 1 "-" "x""#,
        )
        .expect("write");
        let missing = dir.path().join("missing.log");

        let batch = parse_files(&[first, missing, second]);
        assert_eq!(batch.records.len(), 2);
        assert_eq!(batch.records[0].url, "/a");
        assert_eq!(batch.records[1].url, "/b");
        assert_eq!(batch.summaries.len(), 2);
        assert_eq!(batch.failures.len(), 1);
    }

    #[test]
    fn cancellation_aborts_the_parse() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("access.log");
        std::fs::write(&path, format!("{GOOD}\n")).expect("write");

        let token = CancelToken::new();
        token.cancel();
        let err = parse_file_with_cancel(&path, &token).unwrap_err();
        assert!(matches!(err, SourceError::Cancelled));
    }
}
