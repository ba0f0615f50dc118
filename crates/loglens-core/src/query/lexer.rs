use super::error::QueryError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Keyword {
    Select,
    From,
    Where,
    Group,
    By,
    Having,
    Order,
    Limit,
    As,
    Asc,
    Desc,
    And,
    Or,
    Not,
    Like,
    In,
    Between,
    Contains,
    StartsWith,
    EndsWith,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum TokenKind {
    Keyword(Keyword),
    Ident(String),
    Str(String),
    Int(i64),
    Float(f64),
    Star,
    Comma,
    LParen,
    RParen,
    Plus,
    Minus,
    Slash,
    Eq,
    NotEq,
    Lt,
    Gt,
    LtEq,
    GtEq,
    Eof,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Token {
    pub kind: TokenKind,
    /// Byte offset of the token start in the query text.
    pub position: usize,
}

pub(crate) fn tokenize(input: &str) -> Result<Vec<Token>, QueryError> {
    let bytes = input.as_bytes();
    let mut tokens = Vec::new();
    let mut pos = 0usize;

    while pos < bytes.len() {
        let byte = bytes[pos];
        if byte.is_ascii_whitespace() {
            pos += 1;
            continue;
        }

        let start = pos;
        let kind = match byte {
            b'*' => {
                pos += 1;
                TokenKind::Star
            }
            b',' => {
                pos += 1;
                TokenKind::Comma
            }
            b'(' => {
                pos += 1;
                TokenKind::LParen
            }
            b')' => {
                pos += 1;
                TokenKind::RParen
            }
            b'+' => {
                pos += 1;
                TokenKind::Plus
            }
            b'-' => {
                pos += 1;
                TokenKind::Minus
            }
            b'/' => {
                pos += 1;
                TokenKind::Slash
            }
            b'=' => {
                pos += 1;
                TokenKind::Eq
            }
            b'!' => {
                if bytes.get(pos + 1) == Some(&b'=') {
                    pos += 2;
                    TokenKind::NotEq
                } else {
                    return Err(QueryError::syntax(start, "expected `=` after `!`"));
                }
            }
            b'<' => {
                if bytes.get(pos + 1) == Some(&b'=') {
                    pos += 2;
                    TokenKind::LtEq
                } else if bytes.get(pos + 1) == Some(&b'>') {
                    pos += 2;
                    TokenKind::NotEq
                } else {
                    pos += 1;
                    TokenKind::Lt
                }
            }
            b'>' => {
                if bytes.get(pos + 1) == Some(&b'=') {
                    pos += 2;
                    TokenKind::GtEq
                } else {
                    pos += 1;
                    TokenKind::Gt
                }
            }
            b'\'' => {
                let (text, next) = lex_string(input, pos)?;
                pos = next;
                TokenKind::Str(text)
            }
            b'0'..=b'9' => {
                let (kind, next) = lex_number(input, pos)?;
                pos = next;
                kind
            }
            b'A'..=b'Z' | b'a'..=b'z' | b'_' => {
                let (kind, next) = lex_word(input, pos);
                pos = next;
                kind
            }
            other => {
                return Err(QueryError::syntax(
                    start,
                    format!("unexpected character `{}`", other as char),
                ));
            }
        };
        tokens.push(Token {
            kind,
            position: start,
        });
    }

    tokens.push(Token {
        kind: TokenKind::Eof,
        position: input.len(),
    });
    Ok(tokens)
}

// Single-quoted string; a doubled quote escapes a literal quote.
fn lex_string(input: &str, start: usize) -> Result<(String, usize), QueryError> {
    let bytes = input.as_bytes();
    let mut text = String::new();
    let mut pos = start + 1;
    while pos < bytes.len() {
        match bytes[pos] {
            b'\'' if bytes.get(pos + 1) == Some(&b'\'') => {
                text.push('\'');
                pos += 2;
            }
            b'\'' => return Ok((text, pos + 1)),
            _ => {
                let ch = input[pos..].chars().next().unwrap_or('\u{fffd}');
                text.push(ch);
                pos += ch.len_utf8();
            }
        }
    }
    Err(QueryError::syntax(start, "unterminated string literal"))
}

fn lex_number(input: &str, start: usize) -> Result<(TokenKind, usize), QueryError> {
    let bytes = input.as_bytes();
    let mut pos = start;
    while pos < bytes.len() && bytes[pos].is_ascii_digit() {
        pos += 1;
    }
    let mut is_float = false;
    if pos < bytes.len() && bytes[pos] == b'.' && bytes.get(pos + 1).is_some_and(u8::is_ascii_digit)
    {
        is_float = true;
        pos += 1;
        while pos < bytes.len() && bytes[pos].is_ascii_digit() {
            pos += 1;
        }
    }
    let text = &input[start..pos];
    let kind = if is_float {
        TokenKind::Float(text.parse().map_err(|_| {
            QueryError::syntax(start, format!("invalid number literal `{text}`"))
        })?)
    } else {
        TokenKind::Int(text.parse().map_err(|_| {
            QueryError::syntax(start, format!("integer literal out of range `{text}`"))
        })?)
    };
    Ok((kind, pos))
}

fn lex_word(input: &str, start: usize) -> (TokenKind, usize) {
    let bytes = input.as_bytes();
    let mut pos = start;
    while pos < bytes.len() && (bytes[pos].is_ascii_alphanumeric() || bytes[pos] == b'_') {
        pos += 1;
    }
    let word = &input[start..pos];
    let kind = match word.to_ascii_uppercase().as_str() {
        "SELECT" => TokenKind::Keyword(Keyword::Select),
        "FROM" => TokenKind::Keyword(Keyword::From),
        "WHERE" => TokenKind::Keyword(Keyword::Where),
        "GROUP" => TokenKind::Keyword(Keyword::Group),
        "BY" => TokenKind::Keyword(Keyword::By),
        "HAVING" => TokenKind::Keyword(Keyword::Having),
        "ORDER" => TokenKind::Keyword(Keyword::Order),
        "LIMIT" => TokenKind::Keyword(Keyword::Limit),
        "AS" => TokenKind::Keyword(Keyword::As),
        "ASC" => TokenKind::Keyword(Keyword::Asc),
        "DESC" => TokenKind::Keyword(Keyword::Desc),
        "AND" => TokenKind::Keyword(Keyword::And),
        "OR" => TokenKind::Keyword(Keyword::Or),
        "NOT" => TokenKind::Keyword(Keyword::Not),
        "LIKE" => TokenKind::Keyword(Keyword::Like),
        "IN" => TokenKind::Keyword(Keyword::In),
        "BETWEEN" => TokenKind::Keyword(Keyword::Between),
        "CONTAINS" => TokenKind::Keyword(Keyword::Contains),
        "STARTS_WITH" => TokenKind::Keyword(Keyword::StartsWith),
        "ENDS_WITH" => TokenKind::Keyword(Keyword::EndsWith),
        _ => TokenKind::Ident(word.to_string()),
    };
    (kind, pos)
}

#[cfg(test)]
mod tests {
    use super::{Keyword, TokenKind, tokenize};

    fn kinds(input: &str) -> Vec<TokenKind> {
        tokenize(input)
            .expect("tokenize")
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn lexes_a_simple_query() {
        let kinds = kinds("SELECT status FROM logs WHERE size >= 10");
        assert_eq!(kinds[0], TokenKind::Keyword(Keyword::Select));
        assert_eq!(kinds[1], TokenKind::Ident("status".to_string()));
        assert!(kinds.contains(&TokenKind::GtEq));
        assert!(kinds.contains(&TokenKind::Int(10)));
    }

    #[test]
    fn keywords_are_case_insensitive() {
        assert_eq!(kinds("select")[0], TokenKind::Keyword(Keyword::Select));
        assert_eq!(
            kinds("starts_with")[0],
            TokenKind::Keyword(Keyword::StartsWith)
        );
    }

    #[test]
    fn strings_support_doubled_quote_escape() {
        assert_eq!(
            kinds("'it''s'")[0],
            TokenKind::Str("it's".to_string())
        );
    }

    #[test]
    fn floats_and_ints_are_distinct() {
        assert_eq!(kinds("1.5")[0], TokenKind::Float(1.5));
        assert_eq!(kinds("15")[0], TokenKind::Int(15));
    }

    #[test]
    fn unterminated_string_is_a_syntax_error() {
        let err = tokenize("SELECT 'oops").unwrap_err();
        assert!(err.to_string().contains("unterminated"));
    }

    #[test]
    fn positions_are_byte_offsets() {
        let tokens = tokenize("SELECT url").expect("tokenize");
        assert_eq!(tokens[1].position, 7);
    }
}
