//! Chart decisions: what the user asked for, what the data supports, and
//! the Vega-Lite spec handed to the page for rendering.

use serde::Serialize;
use serde_json::{json, Value};
use std::fmt;

use crate::db::executor::ResultTable;

/// Charts with more rows than this are refused rather than rendered badly.
const MAX_CHART_ROWS: usize = 1000;

/// Bar charts beyond this many categories degrade to the table.
const MAX_BAR_CATEGORIES: usize = 50;

/// Pie charts beyond this many slices are unreadable.
const MAX_PIE_SLICES: usize = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartKind {
    Bar,
    Line,
    Pie,
    Scatter,
    Histogram,
}

impl fmt::Display for ChartKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ChartKind::Bar => "bar",
            ChartKind::Line => "line",
            ChartKind::Pie => "pie",
            ChartKind::Scatter => "scatter",
            ChartKind::Histogram => "histogram",
        };
        write!(f, "{}", name)
    }
}

/// What the user's phrasing asked for: nothing, a chart of some kind the
/// data should pick, or a specific kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChartRequest {
    None,
    Auto,
    Explicit(ChartKind),
}

/// Keyword classification of chart intent in the user's phrasing.
///
/// A generic chart word alone defers kind selection to the data ("auto").
/// A kind word counts as explicit when a generic word backs it up, or when
/// the word is unambiguous on its own ("pie", "scatter", "histogram") -
/// "line" and "bar" appear in too many non-chart sentences to trust alone.
pub fn detect_chart_request(text: &str) -> ChartRequest {
    let text = text.to_lowercase();

    let generic = regex::Regex::new(
        r"\b(chart|charts|plot|plots|graph|graphs|diagram|visuali[sz]e|visuali[sz]ation|draw)\b",
    )
    .unwrap();
    let kinds = regex::Regex::new(r"\b(bar|column|line|trend|pie|donut|scatter|histogram)\b")
        .unwrap();

    let generic_hit = generic.is_match(&text);
    let kind = kinds.captures(&text).map(|caps| {
        let word = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
        match word {
            "bar" | "column" => ChartKind::Bar,
            "line" | "trend" => ChartKind::Line,
            "pie" | "donut" => ChartKind::Pie,
            "scatter" => ChartKind::Scatter,
            _ => ChartKind::Histogram,
        }
    });

    match (kind, generic_hit) {
        (Some(k), true) => ChartRequest::Explicit(k),
        (Some(k @ (ChartKind::Pie | ChartKind::Scatter | ChartKind::Histogram)), false) => {
            ChartRequest::Explicit(k)
        }
        (Some(_), false) => ChartRequest::None,
        (None, true) => ChartRequest::Auto,
        (None, false) => ChartRequest::None,
    }
}

/// Shape/content-based inference for the "auto" case. Absent means the
/// result does not suggest any sensible chart.
pub fn infer_chart_type(table: &ResultTable) -> Option<ChartKind> {
    let (rows, cols) = table.shape();
    if rows == 0 || rows > MAX_CHART_ROWS {
        return None;
    }

    if cols == 1 {
        return if rows >= 2 && column_is_numeric(table, 0) {
            Some(ChartKind::Histogram)
        } else {
            None
        };
    }

    // A measure column is required beyond the first column.
    (1..cols).find(|&i| column_is_numeric(table, i))?;

    if column_is_temporal(table, 0) {
        Some(ChartKind::Line)
    } else if column_is_numeric(table, 0) {
        Some(ChartKind::Scatter)
    } else if rows <= MAX_BAR_CATEGORIES {
        Some(ChartKind::Bar)
    } else {
        None
    }
}

/// Builds a Vega-Lite spec for the table, or absent when the data cannot
/// support the requested kind. Absence never raises; callers degrade to a
/// table rendering.
pub fn build_chart(table: &ResultTable, kind: ChartKind, caption: &str) -> Option<Value> {
    let (rows, cols) = table.shape();
    if rows == 0 || rows > MAX_CHART_ROWS {
        return None;
    }

    let (mark, encoding) = match kind {
        ChartKind::Histogram => {
            let value_col = (0..cols).find(|&i| column_is_numeric(table, i))?;
            let field = &table.columns[value_col];
            (
                json!("bar"),
                json!({
                    "x": {"field": field, "bin": true, "type": "quantitative"},
                    "y": {"aggregate": "count", "type": "quantitative"}
                }),
            )
        }
        ChartKind::Pie => {
            if cols < 2 || rows > MAX_PIE_SLICES {
                return None;
            }
            let value_col = (1..cols).find(|&i| column_is_numeric(table, i))?;
            let category = &table.columns[0];
            let value = &table.columns[value_col];
            (
                json!({"type": "arc", "tooltip": true}),
                json!({
                    "theta": {"field": value, "type": "quantitative"},
                    "color": {"field": category, "type": "nominal"}
                }),
            )
        }
        ChartKind::Bar | ChartKind::Line | ChartKind::Scatter => {
            if cols < 2 {
                return None;
            }
            let value_col = (1..cols).find(|&i| column_is_numeric(table, i))?;
            let x = &table.columns[0];
            let y = &table.columns[value_col];

            let (mark, x_type) = match kind {
                ChartKind::Bar => {
                    if rows > MAX_BAR_CATEGORIES {
                        return None;
                    }
                    (json!({"type": "bar", "tooltip": true}), "nominal")
                }
                ChartKind::Line => {
                    let x_type = if column_is_temporal(table, 0) {
                        "temporal"
                    } else if column_is_numeric(table, 0) {
                        "quantitative"
                    } else {
                        "ordinal"
                    };
                    (json!({"type": "line", "point": true, "tooltip": true}), x_type)
                }
                _ => {
                    if !column_is_numeric(table, 0) {
                        return None;
                    }
                    (json!({"type": "point", "tooltip": true}), "quantitative")
                }
            };

            (
                mark,
                json!({
                    "x": {"field": x, "type": x_type, "sort": null},
                    "y": {"field": y, "type": "quantitative"}
                }),
            )
        }
    };

    let values: Vec<Value> = table
        .rows
        .iter()
        .map(|row| {
            let mut object = serde_json::Map::new();
            for (column, value) in table.columns.iter().zip(row) {
                object.insert(column.clone(), value.clone());
            }
            Value::Object(object)
        })
        .collect();

    Some(json!({
        "$schema": "https://vega.github.io/schema/vega-lite/v5.json",
        "title": caption,
        "width": "container",
        "data": {"values": values},
        "mark": mark,
        "encoding": encoding
    }))
}

/// Every non-null cell is a number, with at least one non-null cell.
fn column_is_numeric(table: &ResultTable, index: usize) -> bool {
    let mut seen = false;
    for value in table.column_values(index) {
        match value {
            Value::Null => continue,
            Value::Number(_) => seen = true,
            _ => return false,
        }
    }
    seen
}

/// Every non-null cell parses as a date or timestamp.
fn column_is_temporal(table: &ResultTable, index: usize) -> bool {
    let mut seen = false;
    for value in table.column_values(index) {
        match value {
            Value::Null => continue,
            Value::String(s) if parses_as_temporal(s) => seen = true,
            _ => return false,
        }
    }
    seen
}

fn parses_as_temporal(s: &str) -> bool {
    chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok()
        || chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").is_ok()
        || chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f").is_ok()
        || chrono::DateTime::parse_from_rfc3339(s).is_ok()
}
