use super::ast::{BinaryOp, Expr, OrderItem, Projection, Query, TextOp};
use super::error::QueryError;
use super::lexer::{Keyword, Token, TokenKind, tokenize};
use super::value::Value;

pub(crate) fn parse_query(input: &str) -> Result<Query, QueryError> {
    let tokens = tokenize(input)?;
    let mut parser = Parser { tokens, index: 0 };
    let query = parser.query()?;
    parser.expect_eof()?;
    Ok(query)
}

struct Parser {
    tokens: Vec<Token>,
    index: usize,
}

impl Parser {
    fn peek(&self) -> &Token {
        &self.tokens[self.index.min(self.tokens.len() - 1)]
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.index < self.tokens.len() - 1 {
            self.index += 1;
        }
        token
    }

    fn eat_keyword(&mut self, keyword: Keyword) -> bool {
        if self.peek().kind == TokenKind::Keyword(keyword) {
            self.advance();
            return true;
        }
        false
    }

    fn expect_keyword(&mut self, keyword: Keyword, what: &str) -> Result<(), QueryError> {
        if self.eat_keyword(keyword) {
            return Ok(());
        }
        Err(QueryError::syntax(
            self.peek().position,
            format!("expected {what}"),
        ))
    }

    fn expect_eof(&mut self) -> Result<(), QueryError> {
        if self.peek().kind == TokenKind::Eof {
            return Ok(());
        }
        Err(QueryError::syntax(
            self.peek().position,
            "unexpected trailing input",
        ))
    }

    fn query(&mut self) -> Result<Query, QueryError> {
        self.expect_keyword(Keyword::Select, "SELECT")?;
        let projections = self.projection_list()?;
        self.expect_keyword(Keyword::From, "FROM")?;

        let table = self.advance();
        match &table.kind {
            TokenKind::Ident(name) if name.eq_ignore_ascii_case("logs") => {}
            TokenKind::Ident(name) => {
                return Err(QueryError::semantic(
                    table.position,
                    format!("unknown table `{name}`"),
                )
                .with_suggestion(name, &["logs"]));
            }
            _ => {
                return Err(QueryError::syntax(table.position, "expected table name"));
            }
        }

        let filter = if self.eat_keyword(Keyword::Where) {
            Some(self.expr()?)
        } else {
            None
        };

        let group_by = if self.eat_keyword(Keyword::Group) {
            self.expect_keyword(Keyword::By, "BY after GROUP")?;
            self.expr_list()?
        } else {
            Vec::new()
        };

        let having = if self.eat_keyword(Keyword::Having) {
            Some(self.expr()?)
        } else {
            None
        };

        let order_by = if self.eat_keyword(Keyword::Order) {
            self.expect_keyword(Keyword::By, "BY after ORDER")?;
            self.order_items()?
        } else {
            Vec::new()
        };

        let limit = if self.eat_keyword(Keyword::Limit) {
            let token = self.advance();
            match token.kind {
                TokenKind::Int(value) if value >= 0 => Some(value as usize),
                _ => {
                    return Err(QueryError::syntax(
                        token.position,
                        "LIMIT expects a non-negative integer",
                    ));
                }
            }
        } else {
            None
        };

        Ok(Query {
            projections,
            filter,
            group_by,
            having,
            order_by,
            limit,
        })
    }

    fn projection_list(&mut self) -> Result<Vec<Projection>, QueryError> {
        if self.peek().kind == TokenKind::Star {
            self.advance();
            return Ok(vec![Projection::All]);
        }
        let mut projections = Vec::new();
        loop {
            let expr = self.expr()?;
            let alias = if self.eat_keyword(Keyword::As) {
                let token = self.advance();
                match token.kind {
                    TokenKind::Ident(name) => Some(name),
                    _ => {
                        return Err(QueryError::syntax(
                            token.position,
                            "expected alias after AS",
                        ));
                    }
                }
            } else {
                None
            };
            projections.push(Projection::Expr { expr, alias });
            if !self.eat_comma() {
                break;
            }
        }
        Ok(projections)
    }

    fn eat_comma(&mut self) -> bool {
        if self.peek().kind == TokenKind::Comma {
            self.advance();
            return true;
        }
        false
    }

    fn expr_list(&mut self) -> Result<Vec<Expr>, QueryError> {
        let mut exprs = vec![self.expr()?];
        while self.eat_comma() {
            exprs.push(self.expr()?);
        }
        Ok(exprs)
    }

    fn order_items(&mut self) -> Result<Vec<OrderItem>, QueryError> {
        let mut items = Vec::new();
        loop {
            let expr = self.expr()?;
            let descending = if self.eat_keyword(Keyword::Desc) {
                true
            } else {
                self.eat_keyword(Keyword::Asc);
                false
            };
            items.push(OrderItem { expr, descending });
            if !self.eat_comma() {
                break;
            }
        }
        Ok(items)
    }

    fn expr(&mut self) -> Result<Expr, QueryError> {
        self.or_expr()
    }

    fn or_expr(&mut self) -> Result<Expr, QueryError> {
        let mut left = self.and_expr()?;
        while self.peek().kind == TokenKind::Keyword(Keyword::Or) {
            let position = self.advance().position;
            let right = self.and_expr()?;
            left = Expr::Binary {
                op: BinaryOp::Or,
                left: Box::new(left),
                right: Box::new(right),
                position,
            };
        }
        Ok(left)
    }

    fn and_expr(&mut self) -> Result<Expr, QueryError> {
        let mut left = self.not_expr()?;
        while self.peek().kind == TokenKind::Keyword(Keyword::And) {
            let position = self.advance().position;
            let right = self.not_expr()?;
            left = Expr::Binary {
                op: BinaryOp::And,
                left: Box::new(left),
                right: Box::new(right),
                position,
            };
        }
        Ok(left)
    }

    fn not_expr(&mut self) -> Result<Expr, QueryError> {
        if self.peek().kind == TokenKind::Keyword(Keyword::Not) {
            let position = self.advance().position;
            let expr = self.comparison()?;
            return Ok(Expr::Not {
                expr: Box::new(expr),
                position,
            });
        }
        self.comparison()
    }

    fn comparison(&mut self) -> Result<Expr, QueryError> {
        let left = self.additive()?;
        let position = self.peek().position;

        let op = match &self.peek().kind {
            TokenKind::Eq => Some(BinaryOp::Eq),
            TokenKind::NotEq => Some(BinaryOp::NotEq),
            TokenKind::Lt => Some(BinaryOp::Lt),
            TokenKind::Gt => Some(BinaryOp::Gt),
            TokenKind::LtEq => Some(BinaryOp::LtEq),
            TokenKind::GtEq => Some(BinaryOp::GtEq),
            _ => None,
        };
        if let Some(op) = op {
            self.advance();
            let right = self.additive()?;
            return Ok(Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
                position,
            });
        }

        if self.eat_keyword(Keyword::Like) {
            let pattern = self.string_literal("LIKE expects a string pattern")?;
            return Ok(Expr::Like {
                expr: Box::new(left),
                pattern,
                position,
            });
        }

        if self.eat_keyword(Keyword::In) {
            return self.in_list(left, position);
        }

        if self.eat_keyword(Keyword::Between) {
            let low = self.additive()?;
            self.expect_keyword(Keyword::And, "AND in BETWEEN")?;
            let high = self.additive()?;
            return Ok(Expr::Between {
                expr: Box::new(left),
                low: Box::new(low),
                high: Box::new(high),
                position,
            });
        }

        for (keyword, op) in [
            (Keyword::Contains, TextOp::Contains),
            (Keyword::StartsWith, TextOp::StartsWith),
            (Keyword::EndsWith, TextOp::EndsWith),
        ] {
            if self.eat_keyword(keyword) {
                let needle = self.string_literal("string operand expected")?;
                return Ok(Expr::Text {
                    op,
                    expr: Box::new(left),
                    needle,
                    position,
                });
            }
        }

        Ok(left)
    }

    fn in_list(&mut self, left: Expr, position: usize) -> Result<Expr, QueryError> {
        let open = self.advance();
        if open.kind != TokenKind::LParen {
            return Err(QueryError::syntax(open.position, "IN expects `(`"));
        }
        let mut items = Vec::new();
        loop {
            items.push(self.literal_value()?);
            if self.eat_comma() {
                continue;
            }
            let close = self.advance();
            if close.kind != TokenKind::RParen {
                return Err(QueryError::syntax(close.position, "expected `)` after IN list"));
            }
            break;
        }
        Ok(Expr::InList {
            expr: Box::new(left),
            items,
            position,
        })
    }

    fn literal_value(&mut self) -> Result<Value, QueryError> {
        let negative = if self.peek().kind == TokenKind::Minus {
            self.advance();
            true
        } else {
            false
        };
        let token = self.advance();
        let value = match token.kind {
            TokenKind::Int(v) => Value::Int(if negative { -v } else { v }),
            TokenKind::Float(v) => Value::Float(if negative { -v } else { v }),
            TokenKind::Str(s) if !negative => Value::Str(s),
            _ => {
                return Err(QueryError::syntax(
                    token.position,
                    "expected a literal value",
                ));
            }
        };
        Ok(value)
    }

    fn string_literal(&mut self, what: &str) -> Result<String, QueryError> {
        let token = self.advance();
        match token.kind {
            TokenKind::Str(s) => Ok(s),
            _ => Err(QueryError::syntax(token.position, what)),
        }
    }

    fn additive(&mut self) -> Result<Expr, QueryError> {
        let mut left = self.multiplicative()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Plus => BinaryOp::Add,
                TokenKind::Minus => BinaryOp::Sub,
                _ => break,
            };
            let position = self.advance().position;
            let right = self.multiplicative()?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
                position,
            };
        }
        Ok(left)
    }

    fn multiplicative(&mut self) -> Result<Expr, QueryError> {
        let mut left = self.unary()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Star => BinaryOp::Mul,
                TokenKind::Slash => BinaryOp::Div,
                _ => break,
            };
            let position = self.advance().position;
            let right = self.unary()?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
                position,
            };
        }
        Ok(left)
    }

    fn unary(&mut self) -> Result<Expr, QueryError> {
        if self.peek().kind == TokenKind::Minus {
            let position = self.advance().position;
            let expr = self.primary()?;
            return Ok(Expr::Neg {
                expr: Box::new(expr),
                position,
            });
        }
        self.primary()
    }

    fn primary(&mut self) -> Result<Expr, QueryError> {
        let token = self.advance();
        match token.kind {
            TokenKind::Int(v) => Ok(Expr::Literal {
                value: Value::Int(v),
                position: token.position,
            }),
            TokenKind::Float(v) => Ok(Expr::Literal {
                value: Value::Float(v),
                position: token.position,
            }),
            TokenKind::Str(s) => Ok(Expr::Literal {
                value: Value::Str(s),
                position: token.position,
            }),
            TokenKind::LParen => {
                let expr = self.expr()?;
                let close = self.advance();
                if close.kind != TokenKind::RParen {
                    return Err(QueryError::syntax(close.position, "expected `)`"));
                }
                Ok(expr)
            }
            TokenKind::Ident(name) => {
                if self.peek().kind == TokenKind::LParen {
                    self.advance();
                    let args = self.call_args()?;
                    return Ok(Expr::FuncCall {
                        name: name.to_uppercase(),
                        args,
                        position: token.position,
                    });
                }
                Ok(Expr::Column {
                    name: name.to_lowercase(),
                    position: token.position,
                })
            }
            _ => Err(QueryError::syntax(token.position, "expected an expression")),
        }
    }

    fn call_args(&mut self) -> Result<Vec<Expr>, QueryError> {
        if self.peek().kind == TokenKind::RParen {
            self.advance();
            return Ok(Vec::new());
        }
        // COUNT(*) is accepted as a spelling of COUNT().
        if self.peek().kind == TokenKind::Star {
            let star = self.advance();
            let close = self.advance();
            if close.kind != TokenKind::RParen {
                return Err(QueryError::syntax(star.position, "expected `)` after `*`"));
            }
            return Ok(Vec::new());
        }
        let mut args = vec![self.expr()?];
        while self.eat_comma() {
            args.push(self.expr()?);
        }
        let close = self.advance();
        if close.kind != TokenKind::RParen {
            return Err(QueryError::syntax(
                close.position,
                "expected `)` after arguments",
            ));
        }
        Ok(args)
    }
}

#[cfg(test)]
mod tests {
    use super::super::ast::{Expr, Projection};
    use super::super::error::QueryErrorKind;
    use super::parse_query;

    #[test]
    fn parses_the_full_clause_chain() {
        let query = parse_query(
            "SELECT status, COUNT() AS hits FROM logs WHERE url LIKE '/a%' \
             GROUP BY status HAVING COUNT() > 1 ORDER BY hits DESC, status LIMIT 5",
        )
        .expect("parse");
        assert_eq!(query.projections.len(), 2);
        assert!(query.filter.is_some());
        assert_eq!(query.group_by.len(), 1);
        assert!(query.having.is_some());
        assert_eq!(query.order_by.len(), 2);
        assert!(query.order_by[0].descending);
        assert!(!query.order_by[1].descending);
        assert_eq!(query.limit, Some(5));
    }

    #[test]
    fn select_star_is_a_single_projection() {
        let query = parse_query("SELECT * FROM logs").expect("parse");
        assert_eq!(query.projections, vec![Projection::All]);
    }

    #[test]
    fn count_star_is_count_with_no_args() {
        let query = parse_query("SELECT COUNT(*) FROM logs").expect("parse");
        let Projection::Expr { expr, .. } = &query.projections[0] else {
            panic!("expected expression projection");
        };
        assert!(matches!(expr, Expr::FuncCall { name, args, .. } if name == "COUNT" && args.is_empty()));
    }

    #[test]
    fn unknown_table_is_a_semantic_error_with_hint() {
        let err = parse_query("SELECT * FROM log").unwrap_err();
        assert_eq!(err.kind, QueryErrorKind::Semantic);
        assert_eq!(err.hint.as_deref(), Some("did you mean `logs`?"));
    }

    #[test]
    fn in_and_between_parse() {
        assert!(parse_query("SELECT * FROM logs WHERE status IN (200, 404)").is_ok());
        assert!(parse_query("SELECT * FROM logs WHERE size BETWEEN 10 AND 20").is_ok());
        assert!(parse_query("SELECT * FROM logs WHERE url STARTS_WITH '/api'").is_ok());
    }

    #[test]
    fn missing_from_is_a_syntax_error() {
        let err = parse_query("SELECT status").unwrap_err();
        assert_eq!(err.kind, QueryErrorKind::Syntax);
        assert!(err.message.contains("FROM"));
    }

    #[test]
    fn arithmetic_has_usual_precedence() {
        let query = parse_query("SELECT 1 + 2 * 3 FROM logs").expect("parse");
        let Projection::Expr { expr, .. } = &query.projections[0] else {
            panic!("expected expression projection");
        };
        assert_eq!(expr.to_string(), "1 + 2 * 3");
    }
}
