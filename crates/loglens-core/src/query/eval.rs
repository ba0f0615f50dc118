use std::cmp::Ordering;
use std::collections::HashMap;

use regex::Regex;
use time::format_description::BorrowedFormatItem;
use time::macros::format_description;

use crate::Record;

use super::ast::{BinaryOp, Expr, Projection, Query, TextOp};
use super::error::QueryError;
use super::parser::parse_query;
use super::result::QueryResult;
use super::value::Value;

pub(crate) const COLUMNS: [&str; 9] = [
    "ip",
    "timestamp",
    "method",
    "url",
    "protocol",
    "status",
    "size",
    "referer",
    "user_agent",
];

const SCALAR_FUNCTIONS: [&str; 8] = [
    "HOUR",
    "DAY",
    "DATE",
    "MINUTE",
    "UPPER",
    "LOWER",
    "LENGTH",
    "IS_PRIVATE_IP",
];

const AGGREGATE_FUNCTIONS: [&str; 5] = ["COUNT", "SUM", "AVG", "MIN", "MAX"];

static DATE_FORMAT: &[BorrowedFormatItem<'static>] = format_description!("[year]-[month]-[day]");

/// Parses and executes a SLAQ query over the record stream.
pub fn run_query(records: &[Record], sql: &str) -> Result<QueryResult, QueryError> {
    let query = parse_query(sql)?;
    Evaluator::new(records).execute(&query)
}

struct Group<'a> {
    rows: Vec<&'a Record>,
    keys: Vec<(Expr, Value)>,
}

struct Evaluator<'a> {
    records: &'a [Record],
    like_cache: HashMap<String, Regex>,
}

impl<'a> Evaluator<'a> {
    fn new(records: &'a [Record]) -> Self {
        Self {
            records,
            like_cache: HashMap::new(),
        }
    }

    fn execute(&mut self, query: &Query) -> Result<QueryResult, QueryError> {
        let filtered = self.filter_rows(query)?;
        let grouped = !query.group_by.is_empty() || query_has_aggregates(query);

        if grouped {
            self.execute_grouped(query, filtered)
        } else {
            self.execute_flat(query, filtered)
        }
    }

    fn filter_rows(&mut self, query: &Query) -> Result<Vec<&'a Record>, QueryError> {
        let mut rows = Vec::with_capacity(self.records.len());
        for record in self.records {
            let keep = match &query.filter {
                Some(filter) => self.eval_row(filter, record)?.truthy(),
                None => true,
            };
            if keep {
                rows.push(record);
            }
        }
        Ok(rows)
    }

    fn execute_flat(
        &mut self,
        query: &Query,
        rows: Vec<&'a Record>,
    ) -> Result<QueryResult, QueryError> {
        if let Some(having) = &query.having {
            return Err(QueryError::semantic(
                having.position(),
                "HAVING requires GROUP BY or an aggregate",
            ));
        }

        let columns = projection_columns(&query.projections);
        let mut projected: Vec<(Vec<Value>, &Record)> = Vec::with_capacity(rows.len());
        for record in rows {
            let mut values = Vec::with_capacity(columns.len());
            for projection in &query.projections {
                match projection {
                    Projection::All => {
                        for column in COLUMNS {
                            values.push(column_value(record, column).unwrap_or(Value::Null));
                        }
                    }
                    Projection::Expr { expr, .. } => values.push(self.eval_row(expr, record)?),
                }
            }
            projected.push((values, record));
        }

        if !query.order_by.is_empty() {
            let aliases = alias_positions(&query.projections);
            let mut keyed: Vec<(Vec<Value>, Vec<Value>, &Record)> = Vec::new();
            for (values, record) in projected {
                let mut keys = Vec::with_capacity(query.order_by.len());
                for item in &query.order_by {
                    let key = match alias_lookup(&item.expr, &aliases) {
                        Some(index) => values[index].clone(),
                        None => self.eval_row(&item.expr, record)?,
                    };
                    keys.push(key);
                }
                keyed.push((values, keys, record));
            }
            keyed.sort_by(|a, b| order_compare(&a.1, &b.1, &query.order_by));
            projected = keyed
                .into_iter()
                .map(|(values, _, record)| (values, record))
                .collect();
        }

        let mut rows: Vec<Vec<Value>> = projected.into_iter().map(|(values, _)| values).collect();
        if let Some(limit) = query.limit {
            rows.truncate(limit);
        }
        Ok(QueryResult { columns, rows })
    }

    fn execute_grouped(
        &mut self,
        query: &Query,
        rows: Vec<&'a Record>,
    ) -> Result<QueryResult, QueryError> {
        if query
            .projections
            .iter()
            .any(|projection| matches!(projection, Projection::All))
        {
            return Err(QueryError::semantic(
                0,
                "`*` cannot be projected from a grouped query",
            ));
        }

        let mut groups: Vec<Group<'a>> = Vec::new();
        if query.group_by.is_empty() {
            // Implicit single group: aggregates over the whole filtered set.
            groups.push(Group {
                rows,
                keys: Vec::new(),
            });
        } else {
            let mut index: HashMap<String, usize> = HashMap::new();
            for record in rows {
                let mut keys = Vec::with_capacity(query.group_by.len());
                let mut key_text = String::new();
                for expr in &query.group_by {
                    let value = self.eval_row(expr, record)?;
                    key_text.push_str(&type_tag(&value));
                    key_text.push(':');
                    key_text.push_str(&value.render());
                    key_text.push('\u{1f}');
                    keys.push((expr.clone(), value));
                }
                match index.get(&key_text) {
                    Some(&at) => groups[at].rows.push(record),
                    None => {
                        index.insert(key_text, groups.len());
                        groups.push(Group {
                            rows: vec![record],
                            keys,
                        });
                    }
                }
            }
            // Deterministic base order so ties in ORDER BY cannot leak
            // hash-map iteration order.
            groups.sort_by(|a, b| group_key_text(a).cmp(&group_key_text(b)));
        }

        if let Some(having) = &query.having {
            let mut kept = Vec::with_capacity(groups.len());
            for group in groups {
                if self.eval_group(having, &group)?.truthy() {
                    kept.push(group);
                }
            }
            groups = kept;
        }

        let columns = projection_columns(&query.projections);
        let mut projected: Vec<(Vec<Value>, Group<'a>)> = Vec::with_capacity(groups.len());
        for group in groups {
            let mut values = Vec::with_capacity(columns.len());
            for projection in &query.projections {
                let Projection::Expr { expr, .. } = projection else {
                    unreachable!("star projections are rejected above");
                };
                values.push(self.eval_group(expr, &group)?);
            }
            projected.push((values, group));
        }

        if !query.order_by.is_empty() {
            let aliases = alias_positions(&query.projections);
            let mut keyed: Vec<(Vec<Value>, Vec<Value>)> = Vec::new();
            for (values, group) in projected {
                let mut keys = Vec::with_capacity(query.order_by.len());
                for item in &query.order_by {
                    let key = match alias_lookup(&item.expr, &aliases) {
                        Some(index) => values[index].clone(),
                        None => self.eval_group(&item.expr, &group)?,
                    };
                    keys.push(key);
                }
                keyed.push((values, keys));
            }
            keyed.sort_by(|a, b| order_compare(&a.1, &b.1, &query.order_by));
            let mut rows: Vec<Vec<Value>> = keyed.into_iter().map(|(values, _)| values).collect();
            if let Some(limit) = query.limit {
                rows.truncate(limit);
            }
            return Ok(QueryResult { columns, rows });
        }

        let mut rows: Vec<Vec<Value>> = projected.into_iter().map(|(values, _)| values).collect();
        if let Some(limit) = query.limit {
            rows.truncate(limit);
        }
        Ok(QueryResult { columns, rows })
    }

    fn eval_row(&mut self, expr: &Expr, record: &Record) -> Result<Value, QueryError> {
        match expr {
            Expr::Literal { value, .. } => Ok(value.clone()),
            Expr::Column { name, position } => column_value(record, name).ok_or_else(|| {
                QueryError::runtime(*position, format!("unknown column `{name}`"))
                    .with_suggestion(name, &COLUMNS)
            }),
            Expr::FuncCall {
                name,
                args,
                position,
            } => {
                if is_aggregate(name) {
                    return Err(QueryError::semantic(
                        *position,
                        format!("aggregate `{name}` requires GROUP BY context"),
                    ));
                }
                let mut values = Vec::with_capacity(args.len());
                for arg in args {
                    values.push(self.eval_row(arg, record)?);
                }
                scalar_function(name, &values, *position)
            }
            Expr::Neg { expr, position } => negate(self.eval_row(expr, record)?, *position),
            Expr::Not { expr, .. } => {
                let value = self.eval_row(expr, record)?;
                Ok(Value::Bool(!value.truthy()))
            }
            Expr::Binary {
                op,
                left,
                right,
                position,
            } => {
                let left = self.eval_row(left, record)?;
                let right = self.eval_row(right, record)?;
                binary_op(*op, left, right, *position)
            }
            Expr::Like { expr, pattern, .. } => {
                let value = self.eval_row(expr, record)?;
                self.like_match(&value, pattern)
            }
            Expr::InList { expr, items, .. } => {
                let value = self.eval_row(expr, record)?;
                Ok(in_list(&value, items))
            }
            Expr::Between {
                expr, low, high, ..
            } => {
                let value = self.eval_row(expr, record)?;
                let low = self.eval_row(low, record)?;
                let high = self.eval_row(high, record)?;
                Ok(between(&value, &low, &high))
            }
            Expr::Text {
                op, expr, needle, ..
            } => {
                let value = self.eval_row(expr, record)?;
                Ok(text_op(*op, &value, needle))
            }
        }
    }

    fn eval_group(&mut self, expr: &Expr, group: &Group<'a>) -> Result<Value, QueryError> {
        if let Some((_, value)) = group.keys.iter().find(|(key, _)| key.same_shape(expr)) {
            return Ok(value.clone());
        }
        match expr {
            Expr::Literal { value, .. } => Ok(value.clone()),
            Expr::Column { name, position } => {
                if COLUMNS.contains(&name.as_str()) {
                    Err(QueryError::semantic(
                        *position,
                        format!("column `{name}` must appear in GROUP BY or inside an aggregate"),
                    ))
                } else {
                    Err(QueryError::runtime(*position, format!("unknown column `{name}`"))
                        .with_suggestion(name, &COLUMNS))
                }
            }
            Expr::FuncCall {
                name,
                args,
                position,
            } => {
                if is_aggregate(name) {
                    return self.eval_aggregate(name, args, group, *position);
                }
                let mut values = Vec::with_capacity(args.len());
                for arg in args {
                    values.push(self.eval_group(arg, group)?);
                }
                scalar_function(name, &values, *position)
            }
            Expr::Neg { expr, position } => negate(self.eval_group(expr, group)?, *position),
            Expr::Not { expr, .. } => {
                let value = self.eval_group(expr, group)?;
                Ok(Value::Bool(!value.truthy()))
            }
            Expr::Binary {
                op,
                left,
                right,
                position,
            } => {
                let left = self.eval_group(left, group)?;
                let right = self.eval_group(right, group)?;
                binary_op(*op, left, right, *position)
            }
            Expr::Like { expr, pattern, .. } => {
                let value = self.eval_group(expr, group)?;
                self.like_match(&value, pattern)
            }
            Expr::InList { expr, items, .. } => {
                let value = self.eval_group(expr, group)?;
                Ok(in_list(&value, items))
            }
            Expr::Between {
                expr, low, high, ..
            } => {
                let value = self.eval_group(expr, group)?;
                let low = self.eval_group(low, group)?;
                let high = self.eval_group(high, group)?;
                Ok(between(&value, &low, &high))
            }
            Expr::Text {
                op, expr, needle, ..
            } => {
                let value = self.eval_group(expr, group)?;
                Ok(text_op(*op, &value, needle))
            }
        }
    }

    fn eval_aggregate(
        &mut self,
        name: &str,
        args: &[Expr],
        group: &Group<'a>,
        position: usize,
    ) -> Result<Value, QueryError> {
        match name {
            "COUNT" => {
                if args.is_empty() {
                    return Ok(Value::Int(group.rows.len() as i64));
                }
                let mut count = 0i64;
                for record in &group.rows {
                    if !self.eval_row(&args[0], record)?.is_null() {
                        count += 1;
                    }
                }
                Ok(Value::Int(count))
            }
            "SUM" | "AVG" => {
                let arg = single_arg(name, args, position)?;
                let mut sum = 0.0f64;
                let mut int_sum = 0i64;
                let mut all_int = true;
                let mut count = 0u64;
                for record in &group.rows {
                    let value = self.eval_row(arg, record)?;
                    if value.is_null() {
                        continue;
                    }
                    let Some(number) = value.as_numeric() else {
                        continue;
                    };
                    if let Value::Int(v) = value {
                        int_sum = int_sum.saturating_add(v);
                    } else {
                        all_int = false;
                    }
                    sum += number;
                    count += 1;
                }
                if count == 0 {
                    return Ok(Value::Null);
                }
                if name == "AVG" {
                    return Ok(Value::Float(sum / count as f64));
                }
                if all_int {
                    Ok(Value::Int(int_sum))
                } else {
                    Ok(Value::Float(sum))
                }
            }
            "MIN" | "MAX" => {
                let arg = single_arg(name, args, position)?;
                let mut best: Option<Value> = None;
                for record in &group.rows {
                    let value = self.eval_row(arg, record)?;
                    if value.is_null() {
                        continue;
                    }
                    best = Some(match best {
                        None => value,
                        Some(current) => {
                            let keep_new = match value.compare(&current) {
                                Some(Ordering::Less) => name == "MIN",
                                Some(Ordering::Greater) => name == "MAX",
                                _ => false,
                            };
                            if keep_new { value } else { current }
                        }
                    });
                }
                Ok(best.unwrap_or(Value::Null))
            }
            _ => unreachable!("is_aggregate gates the names"),
        }
    }

    fn like_match(&mut self, value: &Value, pattern: &str) -> Result<Value, QueryError> {
        if value.is_null() {
            return Ok(Value::Bool(false));
        }
        if !self.like_cache.contains_key(pattern) {
            self.like_cache
                .insert(pattern.to_string(), like_to_regex(pattern));
        }
        let regex = &self.like_cache[pattern];
        Ok(Value::Bool(regex.is_match(&value.render())))
    }
}

fn group_key_text(group: &Group<'_>) -> String {
    group
        .keys
        .iter()
        .map(|(_, value)| format!("{}:{}", type_tag(value), value.render()))
        .collect::<Vec<_>>()
        .join("\u{1f}")
}

fn type_tag(value: &Value) -> String {
    let tag = match value {
        Value::Int(_) | Value::Float(_) => "n",
        Value::Str(_) => "s",
        Value::Time(_) => "t",
        Value::Bool(_) => "b",
        Value::Null => "0",
    };
    tag.to_string()
}

fn single_arg<'e>(name: &str, args: &'e [Expr], position: usize) -> Result<&'e Expr, QueryError> {
    if args.len() == 1 {
        return Ok(&args[0]);
    }
    Err(QueryError::semantic(
        position,
        format!("{name} expects exactly one argument"),
    ))
}

fn query_has_aggregates(query: &Query) -> bool {
    let in_projection = query.projections.iter().any(|projection| match projection {
        Projection::All => false,
        Projection::Expr { expr, .. } => contains_aggregate(expr),
    });
    in_projection
        || query.having.as_ref().is_some_and(contains_aggregate)
        || query
            .order_by
            .iter()
            .any(|item| contains_aggregate(&item.expr))
}

fn contains_aggregate(expr: &Expr) -> bool {
    match expr {
        Expr::Literal { .. } | Expr::Column { .. } => false,
        Expr::FuncCall { name, args, .. } => {
            is_aggregate(name) || args.iter().any(contains_aggregate)
        }
        Expr::Neg { expr, .. } | Expr::Not { expr, .. } => contains_aggregate(expr),
        Expr::Binary { left, right, .. } => contains_aggregate(left) || contains_aggregate(right),
        Expr::Like { expr, .. } | Expr::InList { expr, .. } | Expr::Text { expr, .. } => {
            contains_aggregate(expr)
        }
        Expr::Between {
            expr, low, high, ..
        } => contains_aggregate(expr) || contains_aggregate(low) || contains_aggregate(high),
    }
}

fn is_aggregate(name: &str) -> bool {
    AGGREGATE_FUNCTIONS.contains(&name)
}

fn projection_columns(projections: &[Projection]) -> Vec<String> {
    let mut columns = Vec::new();
    for projection in projections {
        match projection {
            Projection::All => columns.extend(COLUMNS.iter().map(|c| c.to_string())),
            Projection::Expr { expr, alias } => match alias {
                Some(alias) => columns.push(alias.clone()),
                None => columns.push(expr.to_string()),
            },
        }
    }
    columns
}

fn alias_positions(projections: &[Projection]) -> HashMap<String, usize> {
    let mut positions = HashMap::new();
    let mut index = 0usize;
    for projection in projections {
        match projection {
            Projection::All => index += COLUMNS.len(),
            Projection::Expr { alias, .. } => {
                if let Some(alias) = alias {
                    positions.entry(alias.to_lowercase()).or_insert(index);
                }
                index += 1;
            }
        }
    }
    positions
}

fn alias_lookup(expr: &Expr, aliases: &HashMap<String, usize>) -> Option<usize> {
    if let Expr::Column { name, .. } = expr {
        return aliases.get(name).copied();
    }
    None
}

fn order_compare(
    a: &[Value],
    b: &[Value],
    items: &[super::ast::OrderItem],
) -> Ordering {
    for (index, item) in items.iter().enumerate() {
        let ordering = cmp_with_nulls_last(&a[index], &b[index]);
        let ordering = if item.descending {
            ordering.reverse()
        } else {
            ordering
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

fn cmp_with_nulls_last(a: &Value, b: &Value) -> Ordering {
    match (a.is_null(), b.is_null()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => a.compare(b).unwrap_or(Ordering::Equal),
    }
}

fn column_value(record: &Record, name: &str) -> Option<Value> {
    let value = match name {
        "ip" => Value::Str(record.ip.to_string()),
        "timestamp" => Value::Time(record.timestamp),
        "method" => Value::Str(record.method.clone()),
        "url" => Value::Str(record.url.clone()),
        "protocol" => Value::Str(record.protocol.clone()),
        "status" => Value::Int(i64::from(record.status)),
        "size" => Value::Int(record.size as i64),
        "referer" => Value::Str(record.referer.clone()),
        "user_agent" => Value::Str(record.user_agent.clone()),
        _ => return None,
    };
    Some(value)
}

fn scalar_function(name: &str, args: &[Value], position: usize) -> Result<Value, QueryError> {
    let expect_args = |count: usize| -> Result<(), QueryError> {
        if args.len() == count {
            Ok(())
        } else {
            Err(QueryError::semantic(
                position,
                format!("{name} expects {count} argument(s), got {}", args.len()),
            ))
        }
    };

    match name {
        "HOUR" | "DAY" | "MINUTE" | "DATE" => {
            expect_args(1)?;
            match &args[0] {
                Value::Null => Ok(Value::Null),
                Value::Time(ts) => Ok(match name {
                    "HOUR" => Value::Int(i64::from(ts.hour())),
                    "DAY" => Value::Int(i64::from(ts.day())),
                    "MINUTE" => Value::Int(i64::from(ts.minute())),
                    _ => Value::Str(
                        ts.format(DATE_FORMAT)
                            .unwrap_or_else(|_| "invalid-date".to_string()),
                    ),
                }),
                other => Err(QueryError::runtime(
                    position,
                    format!("{name} expects a timestamp, got `{}`", other.render()),
                )),
            }
        }
        "UPPER" | "LOWER" => {
            expect_args(1)?;
            match &args[0] {
                Value::Null => Ok(Value::Null),
                Value::Str(s) => Ok(Value::Str(if name == "UPPER" {
                    s.to_uppercase()
                } else {
                    s.to_lowercase()
                })),
                other => Err(QueryError::runtime(
                    position,
                    format!("{name} expects a string, got `{}`", other.render()),
                )),
            }
        }
        "LENGTH" => {
            expect_args(1)?;
            match &args[0] {
                Value::Null => Ok(Value::Null),
                Value::Str(s) => Ok(Value::Int(s.chars().count() as i64)),
                other => Err(QueryError::runtime(
                    position,
                    format!("LENGTH expects a string, got `{}`", other.render()),
                )),
            }
        }
        "IS_PRIVATE_IP" => {
            expect_args(1)?;
            match &args[0] {
                Value::Null => Ok(Value::Null),
                value => {
                    let private = value
                        .render()
                        .parse::<std::net::IpAddr>()
                        .is_ok_and(is_private_ip);
                    Ok(Value::Bool(private))
                }
            }
        }
        _ => {
            let mut known: Vec<&str> = SCALAR_FUNCTIONS.to_vec();
            known.extend(AGGREGATE_FUNCTIONS);
            Err(
                QueryError::runtime(position, format!("unknown function `{name}`"))
                    .with_suggestion(name, &known),
            )
        }
    }
}

fn is_private_ip(ip: std::net::IpAddr) -> bool {
    match ip {
        std::net::IpAddr::V4(v4) => v4.is_private() || v4.is_loopback(),
        std::net::IpAddr::V6(v6) => v6.is_loopback() || (v6.segments()[0] & 0xfe00) == 0xfc00,
    }
}

fn binary_op(op: BinaryOp, left: Value, right: Value, position: usize) -> Result<Value, QueryError> {
    match op {
        BinaryOp::Or => Ok(Value::Bool(left.truthy() || right.truthy())),
        BinaryOp::And => Ok(Value::Bool(left.truthy() && right.truthy())),
        BinaryOp::Eq | BinaryOp::NotEq | BinaryOp::Lt | BinaryOp::Gt | BinaryOp::LtEq
        | BinaryOp::GtEq => {
            let Some(ordering) = left.compare(&right) else {
                // Any comparison with null yields false.
                return Ok(Value::Bool(false));
            };
            let result = match op {
                BinaryOp::Eq => ordering == Ordering::Equal,
                BinaryOp::NotEq => ordering != Ordering::Equal,
                BinaryOp::Lt => ordering == Ordering::Less,
                BinaryOp::Gt => ordering == Ordering::Greater,
                BinaryOp::LtEq => ordering != Ordering::Greater,
                BinaryOp::GtEq => ordering != Ordering::Less,
                _ => unreachable!(),
            };
            Ok(Value::Bool(result))
        }
        BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div => {
            if left.is_null() || right.is_null() {
                return Ok(Value::Null);
            }
            let (Some(a), Some(b)) = (left.as_numeric(), right.as_numeric()) else {
                return Err(QueryError::runtime(
                    position,
                    "arithmetic requires numeric operands",
                ));
            };
            if op == BinaryOp::Div {
                if b == 0.0 {
                    return Ok(Value::Null);
                }
                return Ok(Value::Float(a / b));
            }
            if let (Value::Int(x), Value::Int(y)) = (&left, &right) {
                let result = match op {
                    BinaryOp::Add => x.checked_add(*y),
                    BinaryOp::Sub => x.checked_sub(*y),
                    BinaryOp::Mul => x.checked_mul(*y),
                    _ => unreachable!(),
                };
                if let Some(result) = result {
                    return Ok(Value::Int(result));
                }
            }
            let result = match op {
                BinaryOp::Add => a + b,
                BinaryOp::Sub => a - b,
                BinaryOp::Mul => a * b,
                _ => unreachable!(),
            };
            Ok(Value::Float(result))
        }
    }
}

fn negate(value: Value, position: usize) -> Result<Value, QueryError> {
    match value {
        Value::Null => Ok(Value::Null),
        Value::Int(v) => Ok(Value::Int(-v)),
        Value::Float(v) => Ok(Value::Float(-v)),
        other => match other.as_numeric() {
            Some(v) => Ok(Value::Float(-v)),
            None => Err(QueryError::runtime(
                position,
                "unary minus requires a numeric operand",
            )),
        },
    }
}

fn in_list(value: &Value, items: &[Value]) -> Value {
    if value.is_null() {
        return Value::Bool(false);
    }
    let found = items
        .iter()
        .any(|item| value.compare(item) == Some(Ordering::Equal));
    Value::Bool(found)
}

fn between(value: &Value, low: &Value, high: &Value) -> Value {
    let (Some(lo), Some(hi)) = (value.compare(low), value.compare(high)) else {
        return Value::Bool(false);
    };
    Value::Bool(lo != Ordering::Less && hi != Ordering::Greater)
}

fn text_op(op: TextOp, value: &Value, needle: &str) -> Value {
    if value.is_null() {
        return Value::Bool(false);
    }
    let text = value.render();
    let result = match op {
        TextOp::Contains => text.contains(needle),
        TextOp::StartsWith => text.starts_with(needle),
        TextOp::EndsWith => text.ends_with(needle),
    };
    Value::Bool(result)
}

// SQL LIKE to anchored regex: `%` matches any run, `_` one character.
fn like_to_regex(pattern: &str) -> Regex {
    let mut regex = String::with_capacity(pattern.len() + 8);
    regex.push('^');
    for ch in pattern.chars() {
        match ch {
            '%' => regex.push_str(".*"),
            '_' => regex.push('.'),
            other => regex.push_str(&regex::escape(&other.to_string())),
        }
    }
    regex.push('$');
    Regex::new(&regex).unwrap_or_else(|_| Regex::new("^\u{0}$").expect("fallback regex"))
}

#[cfg(test)]
mod tests {
    use crate::parser::parse_line;

    use super::super::error::QueryErrorKind;
    use super::super::value::Value;
    use super::run_query;

    fn records() -> Vec<crate::Record> {
        [
            r#"10.0.0.1 - - [22/Aug/2024:10:30:45 +0000] "GET /a HTTP/1.1" 200 100 "-" "curl/8""#,
            r#"10.0.0.2 - - [22/Aug/2024:10:30:46 +0000] "GET /a HTTP/1.1" 404 50 "-" "Mozilla""#,
            r#"10.0.0.1 - - [22/Aug/2024:10:30:47 +0000] "POST /b HTTP/1.1" 500 0 "-" "curl/8""#,
        ]
        .iter()
        .map(|line| parse_line(line).expect("parse"))
        .collect()
    }

    #[test]
    fn count_matches_input_size() {
        let result = run_query(&records(), "SELECT COUNT() FROM logs").expect("query");
        assert_eq!(result.columns, vec!["COUNT()"]);
        assert_eq!(result.rows, vec![vec![Value::Int(3)]]);
    }

    #[test]
    fn grouped_aggregation_orders_deterministically() {
        let result = run_query(
            &records(),
            "SELECT status, COUNT() FROM logs WHERE url LIKE '/a%' \
             GROUP BY status ORDER BY COUNT() DESC",
        )
        .expect("query");
        assert_eq!(result.columns, vec!["status", "COUNT()"]);
        assert_eq!(
            result.rows,
            vec![
                vec![Value::Int(200), Value::Int(1)],
                vec![Value::Int(404), Value::Int(1)],
            ]
        );
    }

    #[test]
    fn where_filters_rows() {
        let result =
            run_query(&records(), "SELECT url FROM logs WHERE status >= 400").expect("query");
        assert_eq!(result.rows.len(), 2);
    }

    #[test]
    fn select_star_projects_all_columns() {
        let result = run_query(&records(), "SELECT * FROM logs LIMIT 1").expect("query");
        assert_eq!(result.columns.len(), 9);
        assert_eq!(result.rows.len(), 1);
        assert_eq!(result.rows[0][0], Value::Str("10.0.0.1".to_string()));
    }

    #[test]
    fn scalar_functions_work() {
        let result = run_query(
            &records(),
            "SELECT HOUR(timestamp), UPPER(method), LENGTH(url), IS_PRIVATE_IP(ip) \
             FROM logs LIMIT 1",
        )
        .expect("query");
        assert_eq!(
            result.rows[0],
            vec![
                Value::Int(10),
                Value::Str("GET".to_string()),
                Value::Int(2),
                Value::Bool(true),
            ]
        );
    }

    #[test]
    fn aggregates_over_implicit_group() {
        let result = run_query(
            &records(),
            "SELECT SUM(size), AVG(size), MIN(size), MAX(size) FROM logs",
        )
        .expect("query");
        assert_eq!(
            result.rows,
            vec![vec![
                Value::Int(150),
                Value::Float(50.0),
                Value::Int(0),
                Value::Int(100),
            ]]
        );
    }

    #[test]
    fn division_by_zero_is_null() {
        let result = run_query(&records(), "SELECT size / 0 FROM logs LIMIT 1").expect("query");
        assert_eq!(result.rows[0][0], Value::Null);
    }

    #[test]
    fn unknown_column_suggests_a_fix() {
        let err = run_query(&records(), "SELECT staus FROM logs").unwrap_err();
        assert_eq!(err.kind, QueryErrorKind::Runtime);
        assert_eq!(err.hint.as_deref(), Some("did you mean `status`?"));
    }

    #[test]
    fn unknown_function_suggests_a_fix() {
        let err = run_query(&records(), "SELECT COUN() FROM logs").unwrap_err();
        assert_eq!(err.kind, QueryErrorKind::Runtime);
        assert_eq!(err.hint.as_deref(), Some("did you mean `COUNT`?"));
    }

    #[test]
    fn ungrouped_column_next_to_aggregate_is_rejected() {
        let err = run_query(&records(), "SELECT url, COUNT() FROM logs").unwrap_err();
        assert_eq!(err.kind, QueryErrorKind::Semantic);
        assert!(err.message.contains("GROUP BY"));
    }

    #[test]
    fn having_filters_groups() {
        let result = run_query(
            &records(),
            "SELECT url, COUNT() FROM logs GROUP BY url HAVING COUNT() > 1",
        )
        .expect("query");
        assert_eq!(result.rows, vec![vec![Value::Str("/a".to_string()), Value::Int(2)]]);
    }

    #[test]
    fn in_between_and_text_operators() {
        let result = run_query(
            &records(),
            "SELECT url FROM logs WHERE status IN (200, 500) AND size BETWEEN 0 AND 100 \
             AND url STARTS_WITH '/'",
        )
        .expect("query");
        assert_eq!(result.rows.len(), 2);
    }

    #[test]
    fn order_by_alias_is_supported() {
        let result = run_query(
            &records(),
            "SELECT url, COUNT() AS hits FROM logs GROUP BY url ORDER BY hits DESC LIMIT 1",
        )
        .expect("query");
        assert_eq!(result.rows[0][0], Value::Str("/a".to_string()));
    }

    #[test]
    fn projection_without_aggregates_is_row_subset() {
        let result = run_query(&records(), "SELECT ip, url FROM logs").expect("query");
        assert_eq!(result.rows.len(), 3);
    }
}
