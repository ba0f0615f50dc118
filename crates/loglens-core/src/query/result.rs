use serde::Serialize;

use super::value::Value;

/// Output format for a rendered query result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryFormat {
    Table,
    Csv,
    Json,
}

/// Ordered columns and rows produced by a query. Rows align with the
/// column list positionally.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

/// Renders a result in the requested format.
pub fn render_query_result(result: &QueryResult, format: QueryFormat) -> String {
    match format {
        QueryFormat::Table => render_table(result),
        QueryFormat::Csv => render_csv(result),
        QueryFormat::Json => {
            serde_json::to_string_pretty(result).unwrap_or_else(|_| "{}".to_string())
        }
    }
}

fn render_table(result: &QueryResult) -> String {
    let mut widths: Vec<usize> = result.columns.iter().map(|c| c.chars().count()).collect();
    let rendered: Vec<Vec<String>> = result
        .rows
        .iter()
        .map(|row| row.iter().map(Value::render).collect())
        .collect();
    for row in &rendered {
        for (index, cell) in row.iter().enumerate() {
            if index < widths.len() {
                widths[index] = widths[index].max(cell.chars().count());
            }
        }
    }

    let mut out = String::new();
    for (index, column) in result.columns.iter().enumerate() {
        if index > 0 {
            out.push_str("  ");
        }
        out.push_str(&pad(column, widths[index]));
    }
    out.push('\n');
    for (index, width) in widths.iter().enumerate() {
        if index > 0 {
            out.push_str("  ");
        }
        out.push_str(&"-".repeat(*width));
    }
    out.push('\n');
    for row in &rendered {
        for (index, cell) in row.iter().enumerate() {
            if index > 0 {
                out.push_str("  ");
            }
            out.push_str(&pad(cell, widths[index]));
        }
        out.push('\n');
    }
    out
}

fn pad(text: &str, width: usize) -> String {
    let len = text.chars().count();
    if len >= width {
        return text.to_string();
    }
    format!("{text}{}", " ".repeat(width - len))
}

fn render_csv(result: &QueryResult) -> String {
    let mut writer = csv::Writer::from_writer(Vec::new());
    let _ = writer.write_record(&result.columns);
    for row in &result.rows {
        let cells: Vec<String> = row.iter().map(Value::render).collect();
        let _ = writer.write_record(&cells);
    }
    match writer.into_inner() {
        Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        Err(_) => String::new(),
    }
}
