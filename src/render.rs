//! HTML rendering for the dashboard page.
//!
//! Charts are inline SVG bar charts so the page has no script or asset
//! dependencies. Every string that reaches the page (issue titles, user
//! names, comment text, search input, upstream error messages) is escaped.

use html_escape::{encode_double_quoted_attribute, encode_text};
use serde_json::Value;
use std::fmt::Write;

use crate::analytics::QueryResult;
use crate::pipeline::{RefreshReport, RefreshStatus};
use crate::search::RESULT_COLUMNS;

const MAX_BARS: usize = 20;
const LABEL_CHARS: usize = 48;
const BAR_WIDTH: f64 = 420.0;
const ROW_HEIGHT: usize = 22;
const LABEL_WIDTH: usize = 330;

/// One bar chart backed by an analytics query.
pub struct ChartView {
    pub title: &'static str,
    pub label_column: &'static str,
    pub value_column: &'static str,
    pub result: QueryResult,
}

/// A submitted search and its outcome.
pub struct SearchView {
    pub query: String,
    pub result: QueryResult,
}

/// Everything the dashboard page shows.
pub struct DashboardView {
    pub repository: String,
    pub last_refresh: Option<RefreshReport>,
    pub charts: Vec<ChartView>,
    pub search: Option<SearchView>,
}

pub fn render_dashboard(view: &DashboardView) -> String {
    let mut html = String::with_capacity(8 * 1024);
    html.push_str(
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n\
         <title>Issue Dashboard</title>\n<style>\n\
         body{font-family:sans-serif;margin:2rem;color:#222}\n\
         .banner{padding:.5rem 1rem;border-radius:4px;margin:.5rem 0}\n\
         .degraded{background:#fff3cd;border:1px solid #e0c36c}\n\
         .ok{background:#e7f5e9;border:1px solid #9fd3a8}\n\
         table{border-collapse:collapse}td,th{border:1px solid #ccc;padding:.25rem .5rem;text-align:left}\n\
         </style>\n</head>\n<body>\n",
    );
    let _ = writeln!(
        html,
        "<h1>Issue Dashboard: {}</h1>",
        encode_text(&view.repository)
    );

    html.push_str(&render_refresh_status(view.last_refresh.as_ref()));
    html.push_str(&render_search_form(view.search.as_ref().map(|s| s.query.as_str())));
    if let Some(search) = &view.search {
        html.push_str(&render_search_results(search));
    }
    for chart in &view.charts {
        html.push_str(&render_chart(chart));
    }

    html.push_str("</body>\n</html>\n");
    html
}

fn render_refresh_status(report: Option<&RefreshReport>) -> String {
    let Some(report) = report else {
        return "<div class=\"banner degraded\">No refresh has completed yet.</div>\n".to_string();
    };
    let when = report.finished_at.format("%Y-%m-%d %H:%M:%S UTC");
    match &report.status {
        RefreshStatus::Completed => format!(
            "<div class=\"banner ok\">Last refresh {}: {} issues, {} comments.</div>\n",
            when, report.issues, report.records
        ),
        RefreshStatus::SourceUnavailable { reason } => format!(
            "<div class=\"banner degraded\">Last refresh {} could not reach the issue source: {}. \
             Showing previously exported data.</div>\n",
            when,
            encode_text(reason)
        ),
        RefreshStatus::TableNotDefined { reason } => format!(
            "<div class=\"banner degraded\">Last refresh {} exported {} comments but the analytics \
             table was not updated: {}</div>\n",
            when,
            report.records,
            encode_text(reason)
        ),
    }
}

fn render_search_form(query: Option<&str>) -> String {
    format!(
        "<form method=\"post\" action=\"/\">\n\
         <input type=\"text\" name=\"query\" value=\"{}\" placeholder=\"Search comments\" size=\"50\">\n\
         <button type=\"submit\">Search</button>\n</form>\n",
        encode_double_quoted_attribute(query.unwrap_or(""))
    )
}

fn render_search_results(search: &SearchView) -> String {
    let mut html = format!(
        "<h2>Results for &ldquo;{}&rdquo;</h2>\n",
        encode_text(&search.query)
    );
    let table = match &search.result {
        Ok(table) => table,
        Err(e) => {
            html.push_str(&degraded_banner(e.kind(), &e.to_string()));
            return html;
        }
    };
    if table.is_empty() {
        html.push_str("<p>No matching comments.</p>\n");
        return html;
    }

    html.push_str("<table>\n<tr><th>Issue</th><th>Comment</th><th>Similarity</th></tr>\n");
    for row in &table.rows {
        let cells: Vec<String> = RESULT_COLUMNS
            .iter()
            .map(|c| encode_text(&cell_text(row.get(*c))).into_owned())
            .collect();
        let _ = writeln!(
            html,
            "<tr><td>{}</td><td>{}</td><td>{}</td></tr>",
            cells[0], cells[1], cells[2]
        );
    }
    html.push_str("</table>\n");
    html
}

fn render_chart(chart: &ChartView) -> String {
    let mut html = format!("<h2>{}</h2>\n", encode_text(chart.title));
    let table = match &chart.result {
        Ok(table) => table,
        Err(e) => {
            html.push_str(&degraded_banner(e.kind(), &e.to_string()));
            return html;
        }
    };
    let series = if table.has_columns(&[chart.label_column, chart.value_column]) {
        table.series(chart.label_column, chart.value_column)
    } else {
        Vec::new()
    };
    if series.is_empty() {
        html.push_str("<p>No data available.</p>\n");
        return html;
    }
    html.push_str(&bar_chart_svg(&series));
    html
}

fn degraded_banner(kind: &str, message: &str) -> String {
    let headline = match kind {
        "unavailable" => "Analytics service unavailable",
        "rejected" => "Query rejected by the analytics service",
        "malformed" => "Unexpected response from the analytics service",
        _ => "Query could not be prepared",
    };
    format!(
        "<div class=\"banner degraded\"><strong>{}.</strong> {}</div>\n",
        headline,
        encode_text(message)
    )
}

/// Horizontal bar chart, largest value first as given by the query order.
pub fn bar_chart_svg(series: &[(String, f64)]) -> String {
    let shown = &series[..series.len().min(MAX_BARS)];
    let max = shown.iter().map(|(_, v)| *v).fold(0.0_f64, f64::max);
    let height = shown.len() * ROW_HEIGHT + 4;
    let width = LABEL_WIDTH + BAR_WIDTH as usize + 60;

    let mut svg = format!(
        "<svg xmlns=\"http://www.w3.org/2000/svg\" width=\"{}\" height=\"{}\" role=\"img\">\n",
        width, height
    );
    for (i, (label, value)) in shown.iter().enumerate() {
        let y = i * ROW_HEIGHT;
        let bar = if max > 0.0 {
            (value / max * BAR_WIDTH).max(1.0)
        } else {
            1.0
        };
        let _ = writeln!(
            svg,
            "<text x=\"{}\" y=\"{}\" text-anchor=\"end\" font-size=\"12\">{}</text>\
             <rect x=\"{}\" y=\"{}\" width=\"{:.1}\" height=\"{}\" fill=\"#4c78a8\"><title>{}</title></rect>\
             <text x=\"{:.1}\" y=\"{}\" font-size=\"12\">{}</text>",
            LABEL_WIDTH - 6,
            y + 15,
            encode_text(&shorten(label, LABEL_CHARS)),
            LABEL_WIDTH,
            y + 3,
            bar,
            ROW_HEIGHT - 6,
            encode_text(label),
            LABEL_WIDTH as f64 + bar + 4.0,
            y + 15,
            format_value(*value),
        );
    }
    svg.push_str("</svg>\n");
    svg
}

fn shorten(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        let mut out: String = text.chars().take(max - 1).collect();
        out.push('…');
        out
    }
}

fn format_value(v: f64) -> String {
    if v.fract() == 0.0 {
        format!("{}", v as i64)
    } else {
        format!("{:.2}", v)
    }
}

fn cell_text(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => match n.as_f64() {
            Some(f) if f.fract() != 0.0 => format!("{:.3}", f),
            _ => n.to_string(),
        },
        Some(other) => other.to_string(),
    }
}
