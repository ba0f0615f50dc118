//! SLAQ: a restricted SQL-like query language over the virtual `logs`
//! table whose columns are the record fields.
//!
//! Classical three-phase pipeline: lexer → recursive-descent parser →
//! in-memory evaluator (filter, hash grouping, aggregation, HAVING,
//! stable ordering, limit). Errors never escape as panics; every failure
//! is a structured [`QueryError`] with a position and, where an unknown
//! identifier is involved, an edit-distance suggestion.

mod ast;
mod error;
mod eval;
mod lexer;
mod parser;
mod result;
mod value;

pub use error::{QueryError, QueryErrorKind};
pub use eval::run_query;
pub use result::{QueryFormat, QueryResult, render_query_result};
pub use value::Value;
