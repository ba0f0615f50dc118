//! Line sources for analysis.
//!
//! Sources abstract log inputs (plain or gzip-compressed files today) and
//! keep I/O separate from line parsing. A `LineSource` yields raw lines in
//! byte order with their one-based line numbers.

mod file;

pub use file::LogFileSource;

use thiserror::Error;

/// Raw line event emitted by a `LineSource`.
#[derive(Debug, Clone)]
pub struct LineEvent {
    /// One-based line number within the source.
    pub number: u64,
    /// Line content without the trailing newline.
    pub text: String,
}

/// Abstract line source for the parsing pipeline.
///
/// # Examples
/// ```
/// use loglens_core::{LineEvent, LineSource, SourceError};
///
/// struct OneLine(bool);
///
/// impl LineSource for OneLine {
///     fn next_line(&mut self) -> Result<Option<LineEvent>, SourceError> {
///         if self.0 {
///             return Ok(None);
///         }
///         self.0 = true;
///         Ok(Some(LineEvent { number: 1, text: "hello".to_string() }))
///     }
/// }
/// ```
pub trait LineSource {
    /// Returns the next line event, or `None` at end of stream.
    fn next_line(&mut self) -> Result<Option<LineEvent>, SourceError>;
}

/// Errors produced by `LineSource` implementations.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("decompression error: {0}")]
    Decompress(String),
    #[error("line {number} is not valid UTF-8")]
    InvalidUtf8 { number: u64 },
    #[error("operation cancelled")]
    Cancelled,
}
