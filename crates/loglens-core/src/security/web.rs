use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::Regex;

use crate::Record;
use crate::config::SecurityConfig;

use super::threat::{
    AttackVector, IdGen, Severity, Threat, ThreatKind, WebAttackKind, mitigation_advice,
};

struct Rule {
    id: &'static str,
    pattern: Regex,
    severity: Severity,
    description: &'static str,
}

struct RuleSet {
    kind: WebAttackKind,
    /// Header-style attacks only inspect the URL.
    url_only: bool,
    rules: Vec<Rule>,
}

// Payload fragments that independently corroborate a match.
const STRONG_INDICATORS: [&str; 6] = [
    "union",
    "<script",
    "../",
    "1'='1",
    "etc/passwd",
    "sleep(",
];

fn rule(
    id: &'static str,
    pattern: &str,
    severity: Severity,
    description: &'static str,
) -> Rule {
    Rule {
        id,
        // Rule-set errors are fatal at initialisation.
        pattern: Regex::new(pattern).expect("web attack pattern compiles"),
        severity,
        description,
    }
}

fn rule_sets() -> &'static [RuleSet] {
    static SETS: OnceLock<Vec<RuleSet>> = OnceLock::new();
    SETS.get_or_init(|| {
        vec![
            RuleSet {
                kind: WebAttackKind::SqlInjection,
                url_only: false,
                rules: vec![
                    rule(
                        "sqli-union-select",
                        r"union(\s|\+)+(all(\s|\+)+)?select",
                        Severity::High,
                        "UNION-based SQL injection",
                    ),
                    rule(
                        "sqli-quote-tautology",
                        r"'\s*(or|and)\s*'?\w+'?\s*=\s*'?\w+",
                        Severity::High,
                        "quoted boolean tautology",
                    ),
                    rule(
                        "sqli-numeric-tautology",
                        r"\b(or|and)\s+\d+\s*=\s*\d+",
                        Severity::Medium,
                        "numeric boolean tautology",
                    ),
                    rule(
                        "sqli-stacked-statement",
                        r";\s*(drop|truncate|delete|insert|update|alter)\s",
                        Severity::Critical,
                        "stacked destructive statement",
                    ),
                    rule(
                        "sqli-time-based",
                        r"(sleep\s*\(|benchmark\s*\(|waitfor\s+delay)",
                        Severity::High,
                        "time-based blind injection probe",
                    ),
                    rule(
                        "sqli-comment-terminator",
                        r"('|\d)\s*(--|%23|#)",
                        Severity::Low,
                        "statement comment terminator",
                    ),
                ],
            },
            RuleSet {
                kind: WebAttackKind::CrossSiteScripting,
                url_only: false,
                rules: vec![
                    rule(
                        "xss-script-tag",
                        r"<\s*script",
                        Severity::High,
                        "script tag injection",
                    ),
                    rule(
                        "xss-event-handler",
                        r"\bon(error|load|click|mouseover|focus)\s*=",
                        Severity::Medium,
                        "inline event handler injection",
                    ),
                    rule(
                        "xss-javascript-uri",
                        r"javascript\s*:",
                        Severity::Medium,
                        "javascript: URI",
                    ),
                    rule(
                        "xss-cookie-theft",
                        r"document\s*\.\s*cookie",
                        Severity::High,
                        "cookie access attempt",
                    ),
                    rule(
                        "xss-iframe",
                        r"<\s*iframe",
                        Severity::Medium,
                        "iframe injection",
                    ),
                ],
            },
            RuleSet {
                kind: WebAttackKind::CommandInjection,
                url_only: false,
                rules: vec![
                    rule(
                        "cmd-shell-chain",
                        r"(;|\||&&|`)\s*(cat|ls|id|whoami|uname|wget|curl|nc|bash|sh|powershell|cmd)\b",
                        Severity::High,
                        "shell command chaining",
                    ),
                    rule(
                        "cmd-substitution",
                        r"\$\([^)]*\)",
                        Severity::Medium,
                        "command substitution",
                    ),
                    rule(
                        "cmd-passwd-read",
                        r"(;|\||&&|`).{0,40}/etc/(passwd|shadow)",
                        Severity::Critical,
                        "credential file read attempt",
                    ),
                ],
            },
            RuleSet {
                kind: WebAttackKind::PathTraversal,
                url_only: false,
                rules: vec![
                    rule(
                        "trav-deep",
                        r"\.\./\.\./",
                        Severity::High,
                        "multi-level directory traversal",
                    ),
                    rule(
                        "trav-single",
                        r"\.\./",
                        Severity::Medium,
                        "directory traversal",
                    ),
                    rule(
                        "trav-backslash",
                        r"\.\.\\",
                        Severity::Medium,
                        "windows-style traversal",
                    ),
                    rule(
                        "trav-sensitive-file",
                        r"/etc/(passwd|shadow)|boot\.ini|win\.ini",
                        Severity::High,
                        "sensitive system file access",
                    ),
                ],
            },
            RuleSet {
                kind: WebAttackKind::FileInclusion,
                url_only: false,
                rules: vec![
                    rule(
                        "fi-remote-url",
                        r"=\s*(https?|ftp)://[^&\s]+",
                        Severity::Medium,
                        "remote file inclusion parameter",
                    ),
                    rule(
                        "fi-php-wrapper",
                        r"php://(filter|input|data)",
                        Severity::Critical,
                        "php stream wrapper",
                    ),
                    rule(
                        "fi-file-scheme",
                        r"=\s*file://",
                        Severity::High,
                        "file scheme inclusion",
                    ),
                    rule(
                        "fi-expect-wrapper",
                        r"expect://",
                        Severity::High,
                        "expect wrapper execution",
                    ),
                ],
            },
            RuleSet {
                kind: WebAttackKind::XmlExternalEntity,
                url_only: false,
                rules: vec![
                    rule(
                        "xxe-entity",
                        r"<!entity",
                        Severity::Critical,
                        "external entity declaration",
                    ),
                    rule(
                        "xxe-doctype-system",
                        r"<!doctype[^>]*system",
                        Severity::High,
                        "doctype with system identifier",
                    ),
                ],
            },
            RuleSet {
                kind: WebAttackKind::HeaderInjection,
                url_only: true,
                rules: vec![
                    rule(
                        "hdr-crlf",
                        r"[\r\n]",
                        Severity::High,
                        "CRLF sequence in request target",
                    ),
                    rule(
                        "hdr-set-cookie",
                        r"[\r\n]\s*set-cookie\s*:",
                        Severity::Critical,
                        "response cookie injection",
                    ),
                ],
            },
        ]
    })
}

/// Decodes percent-encoding (lossy: malformed escapes pass through) so
/// patterns match the payload an application would see.
pub(crate) fn percent_decode(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut index = 0;
    while index < bytes.len() {
        if bytes[index] == b'%' {
            if let Some(hex) = bytes.get(index + 1..index + 3) {
                if let Ok(value) = u8::from_str_radix(&String::from_utf8_lossy(hex), 16) {
                    out.push(value);
                    index += 3;
                    continue;
                }
            }
        }
        if bytes[index] == b'+' {
            out.push(b' ');
        } else {
            out.push(bytes[index]);
        }
        index += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn base_confidence(severity: Severity) -> f64 {
    match severity {
        Severity::Info => 0.3,
        Severity::Low => 0.45,
        Severity::Medium => 0.6,
        Severity::High => 0.75,
        Severity::Critical => 0.9,
    }
}

fn confidence_for(severity: Severity, haystack: &str) -> f64 {
    let mut confidence = base_confidence(severity);
    for indicator in STRONG_INDICATORS {
        if haystack.contains(indicator) {
            confidence += 0.1;
        }
    }
    confidence.min(1.0)
}

fn minimum_severity(config: &SecurityConfig) -> Severity {
    match config.threat_sensitivity {
        8..=10 => Severity::Info,
        5..=7 => Severity::Low,
        3..=4 => Severity::Medium,
        _ => Severity::High,
    }
}

fn snippet(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        return text.to_string();
    }
    text.chars().take(limit).collect()
}

/// Matches every record against the web attack rule sets. Multiple rules
/// may fire for a single record; each match emits a separate threat.
pub(crate) fn detect_web_attacks_with(
    records: &[Record],
    config: &SecurityConfig,
    ids: &mut IdGen,
) -> Vec<Threat> {
    let floor = minimum_severity(config);
    let mut threats = Vec::new();

    for record in records {
        let url = percent_decode(&record.url).to_lowercase();
        let full = format!(
            "{}\n{}\n{}",
            url,
            record.user_agent.to_lowercase(),
            percent_decode(&record.referer).to_lowercase()
        );

        for set in rule_sets() {
            let haystack: &str = if set.url_only { &url } else { &full };
            for rule in &set.rules {
                if rule.severity < floor {
                    continue;
                }
                let Some(found) = rule.pattern.find(haystack) else {
                    continue;
                };
                let vector = if set.url_only || url.contains(found.as_str()) {
                    AttackVector::Url
                } else if record.user_agent.to_lowercase().contains(found.as_str()) {
                    AttackVector::UserAgent
                } else {
                    AttackVector::Referer
                };
                let mut context = BTreeMap::new();
                context.insert("rule_description".to_string(), rule.description.to_string());
                threats.push(Threat {
                    id: ids.next(),
                    kind: ThreatKind::Web(set.kind),
                    severity: rule.severity,
                    confidence: confidence_for(rule.severity, haystack),
                    rule: rule.id.to_string(),
                    payload: snippet(found.as_str(), 120),
                    source_ip: record.ip.to_string(),
                    url: record.url.clone(),
                    user_agent: record.user_agent.clone(),
                    method: record.method.clone(),
                    status: record.status,
                    response_size: record.size,
                    timestamp: record.timestamp,
                    attack_vector: vector,
                    context,
                    mitigation: if config.incident_response_enabled {
                        mitigation_advice(ThreatKind::Web(set.kind))
                    } else {
                        Vec::new()
                    },
                });
            }
        }
    }
    threats
}

#[cfg(test)]
mod tests {
    use crate::config::SecurityConfig;
    use crate::parser::parse_line;

    use super::super::threat::{IdGen, Severity, ThreatKind, WebAttackKind};
    use super::{detect_web_attacks_with, percent_decode};

    fn detect(line: &str) -> Vec<super::Threat> {
        let record = parse_line(line).expect("parse");
        let mut ids = IdGen::new("T");
        detect_web_attacks_with(&[record], &SecurityConfig::default(), &mut ids)
    }

    #[test]
    fn decodes_percent_escapes() {
        assert_eq!(percent_decode("%27%20OR%20%271"), "' OR '1");
        assert_eq!(percent_decode("a+b"), "a b");
        assert_eq!(percent_decode("100%"), "100%");
    }

    #[test]
    fn encoded_sql_injection_is_detected_with_high_confidence() {
        let threats = detect(
            r#"203.0.113.7 - - [22/Aug/2024:10:30:45 +0000] "GET /search?q=%27%20OR%20%271%27=%271 HTTP/1.1" 200 512 "-" "Mozilla/5.0""#,
        );
        let sqli: Vec<_> = threats
            .iter()
            .filter(|t| t.kind == ThreatKind::Web(WebAttackKind::SqlInjection))
            .collect();
        assert!(!sqli.is_empty());
        assert!(sqli.iter().any(|t| t.severity >= Severity::High));
        assert!(sqli.iter().any(|t| t.confidence >= 0.8));
    }

    #[test]
    fn script_tag_in_query_is_xss() {
        let threats = detect(
            r#"203.0.113.7 - - [22/Aug/2024:10:30:45 +0000] "GET /p?c=<script>alert(1)</script> HTTP/1.1" 200 10 "-" "Mozilla""#,
        );
        assert!(
            threats
                .iter()
                .any(|t| t.kind == ThreatKind::Web(WebAttackKind::CrossSiteScripting))
        );
    }

    #[test]
    fn traversal_and_sensitive_file_both_fire() {
        let threats = detect(
            r#"203.0.113.7 - - [22/Aug/2024:10:30:45 +0000] "GET /../../../etc/passwd HTTP/1.1" 404 0 "-" "Mozilla""#,
        );
        let traversal: Vec<_> = threats
            .iter()
            .filter(|t| t.kind == ThreatKind::Web(WebAttackKind::PathTraversal))
            .collect();
        assert!(traversal.len() >= 2);
    }

    #[test]
    fn benign_traffic_is_clean() {
        let threats = detect(
            r#"203.0.113.7 - - [22/Aug/2024:10:30:45 +0000] "GET /index.html HTTP/1.1" 200 4096 "https://example.com/" "Mozilla/5.0""#,
        );
        assert!(threats.is_empty());
    }

    #[test]
    fn threat_ids_are_unique() {
        let threats = detect(
            r#"203.0.113.7 - - [22/Aug/2024:10:30:45 +0000] "GET /q?a=<script>&b=../../x HTTP/1.1" 200 1 "-" "Mozilla""#,
        );
        let mut ids: Vec<&str> = threats.iter().map(|t| t.id.as_str()).collect();
        let before = ids.len();
        ids.dedup();
        assert!(before >= 2);
        assert_eq!(ids.len(), before);
    }
}
