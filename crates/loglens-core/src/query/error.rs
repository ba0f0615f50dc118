use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure class for a query error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueryErrorKind {
    Syntax,
    Semantic,
    Runtime,
}

/// Structured query failure, always returned to the caller rather than
/// propagated out of the engine.
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
#[error("{} error at position {position}: {message}{}", kind_label(.kind), hint_suffix(.hint))]
pub struct QueryError {
    pub kind: QueryErrorKind,
    /// Byte offset into the query text.
    pub position: usize,
    pub message: String,
    pub hint: Option<String>,
}

impl QueryError {
    pub(crate) fn syntax(position: usize, message: impl Into<String>) -> Self {
        Self {
            kind: QueryErrorKind::Syntax,
            position,
            message: message.into(),
            hint: None,
        }
    }

    pub(crate) fn semantic(position: usize, message: impl Into<String>) -> Self {
        Self {
            kind: QueryErrorKind::Semantic,
            position,
            message: message.into(),
            hint: None,
        }
    }

    pub(crate) fn runtime(position: usize, message: impl Into<String>) -> Self {
        Self {
            kind: QueryErrorKind::Runtime,
            position,
            message: message.into(),
            hint: None,
        }
    }

    pub(crate) fn with_suggestion(mut self, unknown: &str, known: &[&str]) -> Self {
        self.hint = closest_identifier(unknown, known).map(|best| format!("did you mean `{best}`?"));
        self
    }
}

fn kind_label(kind: &QueryErrorKind) -> &'static str {
    match kind {
        QueryErrorKind::Syntax => "syntax",
        QueryErrorKind::Semantic => "semantic",
        QueryErrorKind::Runtime => "runtime",
    }
}

fn hint_suffix(hint: &Option<String>) -> String {
    match hint {
        Some(hint) => format!(" ({hint})"),
        None => String::new(),
    }
}

/// Closest known identifier by Levenshtein distance, if any is within
/// editing reach of the unknown name.
fn closest_identifier<'a>(unknown: &str, known: &[&'a str]) -> Option<&'a str> {
    let unknown = unknown.to_lowercase();
    known
        .iter()
        .map(|candidate| (levenshtein(&unknown, &candidate.to_lowercase()), *candidate))
        .filter(|(distance, _)| *distance <= 3)
        .min_by_key(|(distance, candidate)| (*distance, candidate.to_string()))
        .map(|(_, candidate)| candidate)
}

fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let mut previous: Vec<usize> = (0..=b.len()).collect();
    let mut current = vec![0usize; b.len() + 1];

    for (i, &ca) in a.iter().enumerate() {
        current[0] = i + 1;
        for (j, &cb) in b.iter().enumerate() {
            let substitution = previous[j] + usize::from(ca != cb);
            current[j + 1] = substitution
                .min(previous[j + 1] + 1)
                .min(current[j] + 1);
        }
        std::mem::swap(&mut previous, &mut current);
    }
    previous[b.len()]
}

#[cfg(test)]
mod tests {
    use super::{QueryError, closest_identifier, levenshtein};

    #[test]
    fn distance_basics() {
        assert_eq!(levenshtein("status", "status"), 0);
        assert_eq!(levenshtein("staus", "status"), 1);
        assert_eq!(levenshtein("", "abc"), 3);
    }

    #[test]
    fn suggests_near_misses_only() {
        let known = ["status", "size", "url"];
        assert_eq!(closest_identifier("staus", &known), Some("status"));
        assert_eq!(closest_identifier("zzzzzzzz", &known), None);
    }

    #[test]
    fn error_display_carries_hint() {
        let err = QueryError::runtime(10, "unknown column `staus`")
            .with_suggestion("staus", &["status", "size"]);
        let text = err.to_string();
        assert!(text.contains("position 10"));
        assert!(text.contains("did you mean `status`?"));
    }
}
