use std::net::IpAddr;
use std::sync::OnceLock;

use regex::Regex;

use crate::Record;

use super::error::LineError;
use super::timestamp::{format_clf_timestamp, parse_clf_timestamp};

// Anchored NCSA patterns. The user field tolerates `-`, the size field
// tolerates `-` (parsed as 0), and the request target may contain spaces
// only in pathological lines, which fall through to the format warning.
const COMBINED_PATTERN: &str = r#"^(\S+) (\S+) (\S+) \[([^\]]+)\] "(\S+) (\S+) (\S+)" (\S+) (\S+) "([^"]*)" "([^"]*)"$"#;
const COMMON_PATTERN: &str = r#"^(\S+) (\S+) (\S+) \[([^\]]+)\] "(\S+) (\S+) (\S+)" (\S+) (\S+)$"#;

fn combined_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(COMBINED_PATTERN).expect("combined pattern compiles"))
}

fn common_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(COMMON_PATTERN).expect("common pattern compiles"))
}

/// Parses one access-log line, trying the combined format first and
/// falling back to common.
///
/// # Examples
/// ```
/// use loglens_core::parse_line;
///
/// let record = parse_line(
///     r#"192.168.1.9 - alice [22/Aug/2024:10:30:45 +0000] "GET /index.html HTTP/1.1" 200 1234"#,
/// )?;
/// assert_eq!(record.size, 1234);
/// assert!(record.user_agent.is_empty());
/// # Ok::<(), loglens_core::LineError>(())
/// ```
pub fn parse_line(line: &str) -> Result<Record, LineError> {
    let line = line.trim_end();
    if let Some(caps) = combined_regex().captures(line) {
        return build_record(
            &caps[1],
            &caps[4],
            &caps[5],
            &caps[6],
            &caps[7],
            &caps[8],
            &caps[9],
            Some((&caps[10], &caps[11])),
        );
    }
    if let Some(caps) = common_regex().captures(line) {
        return build_record(
            &caps[1],
            &caps[4],
            &caps[5],
            &caps[6],
            &caps[7],
            &caps[8],
            &caps[9],
            None,
        );
    }
    Err(LineError::Format)
}

#[allow(clippy::too_many_arguments)]
fn build_record(
    ip: &str,
    time: &str,
    method: &str,
    url: &str,
    protocol: &str,
    status: &str,
    size: &str,
    quoted: Option<(&str, &str)>,
) -> Result<Record, LineError> {
    let ip: IpAddr = ip.parse().map_err(|_| LineError::InvalidIp {
        value: ip.to_string(),
    })?;
    let timestamp = parse_clf_timestamp(time)?;
    let status: u16 = status.parse().map_err(|_| LineError::InvalidStatus {
        value: status.to_string(),
    })?;
    let size: u64 = if size == "-" {
        0
    } else {
        size.parse().map_err(|_| LineError::InvalidSize {
            value: size.to_string(),
        })?
    };
    let (referer, user_agent) = match quoted {
        Some((referer, user_agent)) => (normalize_dash(referer), normalize_dash(user_agent)),
        None => (String::new(), String::new()),
    };

    Ok(Record {
        ip,
        timestamp,
        method: method.to_string(),
        url: url.to_string(),
        protocol: protocol.to_string(),
        status,
        size,
        referer,
        user_agent,
    })
}

fn normalize_dash(field: &str) -> String {
    if field == "-" {
        String::new()
    } else {
        field.to_string()
    }
}

/// Re-emits a record as a combined or common log line.
///
/// Empty referer/user-agent fields are written back as `-`, matching the
/// convention of the source format.
pub fn format_clf(record: &Record, combined: bool) -> String {
    let base = format!(
        "{} - - [{}] \"{} {} {}\" {} {}",
        record.ip,
        format_clf_timestamp(record.timestamp),
        record.method,
        record.url,
        record.protocol,
        record.status,
        record.size,
    );
    if !combined {
        return base;
    }
    format!(
        "{} \"{}\" \"{}\"",
        base,
        dash_if_empty(&record.referer),
        dash_if_empty(&record.user_agent),
    )
}

fn dash_if_empty(field: &str) -> &str {
    if field.is_empty() { "-" } else { field }
}

#[cfg(test)]
mod tests {
    use super::{format_clf, parse_line};
    use crate::parser::error::LineError;

    const COMBINED: &str = r#"10.0.0.1 - - [22/Aug/2024:10:30:45 +0000] "GET /a?q=1 HTTP/1.1" 200 100 "https://example.com/" "curl/8""#;
    const COMMON: &str =
        r#"10.0.0.2 - frank [22/Aug/2024:10:30:46 +0000] "POST /b HTTP/1.0" 404 -"#;

    #[test]
    fn parses_combined_line() {
        let record = parse_line(COMBINED).expect("parse");
        assert_eq!(record.ip.to_string(), "10.0.0.1");
        assert_eq!(record.method, "GET");
        assert_eq!(record.url, "/a?q=1");
        assert_eq!(record.protocol, "HTTP/1.1");
        assert_eq!(record.status, 200);
        assert_eq!(record.size, 100);
        assert_eq!(record.referer, "https://example.com/");
        assert_eq!(record.user_agent, "curl/8");
    }

    #[test]
    fn parses_common_line_with_dash_size() {
        let record = parse_line(COMMON).expect("parse");
        assert_eq!(record.status, 404);
        assert_eq!(record.size, 0);
        assert!(record.referer.is_empty());
        assert!(record.user_agent.is_empty());
    }

    #[test]
    fn parses_ipv6_source() {
        let line = r#"2001:db8::1 - - [22/Aug/2024:10:30:45 +0000] "GET / HTTP/1.1" 200 1"#;
        let record = parse_line(line).expect("parse");
        assert!(record.ip.is_ipv6());
    }

    #[test]
    fn dash_fields_in_combined_become_empty() {
        let line = r#"10.0.0.1 - - [22/Aug/2024:10:30:45 +0000] "GET / HTTP/1.1" 200 5 "-" "-""#;
        let record = parse_line(line).expect("parse");
        assert!(record.referer.is_empty());
        assert!(record.user_agent.is_empty());
    }

    #[test]
    fn rejects_bad_ip() {
        let line = r#"999.999.1.1 - - [22/Aug/2024:10:30:45 +0000] "GET / HTTP/1.1" 200 5"#;
        assert!(matches!(
            parse_line(line),
            Err(LineError::InvalidIp { .. })
        ));
    }

    #[test]
    fn rejects_non_numeric_status() {
        let line = r#"10.0.0.1 - - [22/Aug/2024:10:30:45 +0000] "GET / HTTP/1.1" abc 5"#;
        assert!(matches!(
            parse_line(line),
            Err(LineError::InvalidStatus { .. })
        ));
    }

    #[test]
    fn rejects_garbage_lines() {
        assert!(matches!(parse_line("not a log line"), Err(LineError::Format)));
        assert!(matches!(parse_line(""), Err(LineError::Format)));
    }

    #[test]
    fn round_trips_combined_records() {
        let record = parse_line(COMBINED).expect("parse");
        let reparsed = parse_line(&format_clf(&record, true)).expect("reparse");
        assert_eq!(record, reparsed);
    }

    #[test]
    fn round_trips_common_records() {
        let record = parse_line(COMMON).expect("parse");
        let emitted = format_clf(&record, false);
        let reparsed = parse_line(&emitted).expect("reparse");
        assert_eq!(record, reparsed);
    }
}
