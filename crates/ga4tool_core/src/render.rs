use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use serde_json::{Map, Value, json};

/// Rows shown by the table format before the "(showing N of M)" cutoff.
pub const TABLE_MAX_ROWS: usize = 50;

const MIN_COLUMN_WIDTH: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Csv,
    Json,
    Ndjson,
    Table,
}

impl OutputFormat {
    pub fn parse(value: &str) -> Result<Self> {
        if value.eq_ignore_ascii_case("csv") {
            return Ok(Self::Csv);
        }
        if value.eq_ignore_ascii_case("json") {
            return Ok(Self::Json);
        }
        if value.eq_ignore_ascii_case("ndjson") {
            return Ok(Self::Ndjson);
        }
        if value.eq_ignore_ascii_case("table") {
            return Ok(Self::Table);
        }
        bail!("unsupported output format: {value} (expected csv|json|ndjson|table)")
    }
}

/// Canonical headers-plus-rows result every report type is adapted into
/// before rendering. Cells are positionally aligned with the header lists;
/// a `None` cell renders as empty (csv/table) or null (ndjson).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReportTable {
    pub dimension_headers: Vec<String>,
    pub metric_headers: Vec<String>,
    pub rows: Vec<TableRow>,
    pub row_count: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableRow {
    pub dimension_values: Vec<Option<String>>,
    pub metric_values: Vec<Option<String>>,
}

pub fn render(table: &ReportTable, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Csv => Ok(render_csv(table)),
        OutputFormat::Json => render_json(table),
        OutputFormat::Ndjson => render_ndjson(table),
        OutputFormat::Table => Ok(render_table(table, TABLE_MAX_ROWS)),
    }
}

fn render_csv(table: &ReportTable) -> String {
    let mut columns: Vec<String> = table.dimension_headers.clone();
    columns.extend(table.metric_headers.iter().cloned());

    let mut lines = Vec::with_capacity(table.rows.len() + 1);
    lines.push(columns.join(","));
    for row in &table.rows {
        let mut fields = Vec::with_capacity(row.dimension_values.len() + row.metric_values.len());
        for cell in row.dimension_values.iter().chain(&row.metric_values) {
            fields.push(csv_escape(cell.as_deref().unwrap_or("")));
        }
        lines.push(fields.join(","));
    }
    lines.join("\n")
}

/// Quote a CSV field only when it contains a comma, quote, or newline;
/// internal quotes are doubled.
fn csv_escape(value: &str) -> String {
    if value.contains(',') || value.contains('"') || value.contains('\n') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

fn render_json(table: &ReportTable) -> Result<String> {
    let document = json!({
        "dimensionHeaders": header_objects(&table.dimension_headers),
        "metricHeaders": header_objects(&table.metric_headers),
        "rows": table.rows.iter().map(row_object).collect::<Vec<Value>>(),
    });
    serde_json::to_string_pretty(&document).context("failed to render report as JSON")
}

fn header_objects(names: &[String]) -> Vec<Value> {
    names.iter().map(|name| json!({ "name": name })).collect()
}

fn row_object(row: &TableRow) -> Value {
    json!({
        "dimensionValues": cell_objects(&row.dimension_values),
        "metricValues": cell_objects(&row.metric_values),
    })
}

fn cell_objects(cells: &[Option<String>]) -> Vec<Value> {
    cells.iter().map(|cell| json!({ "value": cell })).collect()
}

fn render_ndjson(table: &ReportTable) -> Result<String> {
    let mut lines = Vec::with_capacity(table.rows.len());
    for row in &table.rows {
        let mut object = Map::new();
        for (index, name) in table.dimension_headers.iter().enumerate() {
            object.insert(name.clone(), cell_value(row.dimension_values.get(index)));
        }
        for (index, name) in table.metric_headers.iter().enumerate() {
            object.insert(name.clone(), cell_value(row.metric_values.get(index)));
        }
        let line = serde_json::to_string(&Value::Object(object))
            .context("failed to render report as NDJSON")?;
        lines.push(line);
    }
    Ok(lines.join("\n"))
}

fn cell_value(cell: Option<&Option<String>>) -> Value {
    match cell {
        Some(Some(value)) => Value::String(value.clone()),
        _ => Value::Null,
    }
}

/// Fixed-width text table. Column width is the widest of the header, the
/// widest shown cell, and a floor of MIN_COLUMN_WIDTH. Only the display is
/// capped at `max_rows`; the other formats always render every row.
pub fn render_table(table: &ReportTable, max_rows: usize) -> String {
    let mut columns: Vec<&str> = Vec::new();
    columns.extend(table.dimension_headers.iter().map(String::as_str));
    columns.extend(table.metric_headers.iter().map(String::as_str));

    let shown: Vec<Vec<String>> = table
        .rows
        .iter()
        .take(max_rows)
        .map(|row| {
            row.dimension_values
                .iter()
                .chain(&row.metric_values)
                .map(|cell| cell.clone().unwrap_or_default())
                .collect()
        })
        .collect();

    let widths: Vec<usize> = columns
        .iter()
        .enumerate()
        .map(|(index, column)| {
            let widest = shown
                .iter()
                .map(|row| row.get(index).map_or(0, |value| value.chars().count()))
                .max()
                .unwrap_or(0);
            column.chars().count().max(widest).max(MIN_COLUMN_WIDTH)
        })
        .collect();

    let segments: Vec<String> = widths.iter().map(|width| "-".repeat(width + 2)).collect();
    let separator = format!("+{}+", segments.join("+"));

    let mut lines = Vec::with_capacity(shown.len() + 5);
    lines.push(separator.clone());
    lines.push(format_table_row(&columns, &widths));
    lines.push(separator.clone());
    for row in &shown {
        let cells: Vec<&str> = row.iter().map(String::as_str).collect();
        lines.push(format_table_row(&cells, &widths));
    }
    lines.push(separator);
    if table.rows.len() > max_rows {
        lines.push(format!("(showing {max_rows} of {} rows)", table.rows.len()));
    }
    lines.join("\n")
}

fn format_table_row(cells: &[&str], widths: &[usize]) -> String {
    let mut parts = Vec::with_capacity(widths.len());
    for (index, &width) in widths.iter().enumerate() {
        let cell = cells.get(index).copied().unwrap_or("");
        parts.push(format!(" {cell:<width$} "));
    }
    format!("|{}|", parts.join("|"))
}

/// Write rendered output to a file, creating parent directories as needed.
pub fn write_output_file(content: &str, path: &Path) -> Result<()> {
    ensure_parent_dir(path)?;
    fs::write(path, content).with_context(|| format!("failed to write {}", path.display()))
}

fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::tempdir;

    use super::{
        OutputFormat, ReportTable, TableRow, csv_escape, render, render_table, write_output_file,
    };

    fn sample_table() -> ReportTable {
        ReportTable {
            dimension_headers: vec!["country".to_string()],
            metric_headers: vec!["activeUsers".to_string()],
            rows: vec![
                TableRow {
                    dimension_values: vec![Some("US".to_string())],
                    metric_values: vec![Some("120".to_string())],
                },
                TableRow {
                    dimension_values: vec![Some("DE".to_string())],
                    metric_values: vec![None],
                },
            ],
            row_count: 2,
        }
    }

    #[test]
    fn parse_accepts_known_formats_case_insensitively() {
        assert_eq!(OutputFormat::parse("csv").expect("csv"), OutputFormat::Csv);
        assert_eq!(
            OutputFormat::parse("NDJSON").expect("ndjson"),
            OutputFormat::Ndjson
        );
        assert_eq!(
            OutputFormat::parse("Table").expect("table"),
            OutputFormat::Table
        );
    }

    #[test]
    fn parse_rejects_unknown_format() {
        let error = OutputFormat::parse("yaml").expect_err("must fail");
        assert!(error.to_string().contains("yaml"));
    }

    #[test]
    fn csv_escape_quotes_only_when_needed() {
        assert_eq!(csv_escape("plain"), "plain");
        assert_eq!(csv_escape("He said, \"hi\""), "\"He said, \"\"hi\"\"\"");
        assert_eq!(csv_escape("line\nbreak"), "\"line\nbreak\"");
    }

    #[test]
    fn csv_escaped_field_round_trips() {
        let original = "He said, \"hi\"";
        let escaped = csv_escape(original);
        let inner = escaped
            .strip_prefix('"')
            .and_then(|rest| rest.strip_suffix('"'))
            .expect("quoted");
        assert_eq!(inner.replace("\"\"", "\""), original);
    }

    #[test]
    fn csv_renders_headers_then_rows_with_empty_for_missing() {
        let rendered = render(&sample_table(), OutputFormat::Csv).expect("render");
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(lines, vec!["country,activeUsers", "US,120", "DE,"]);
    }

    #[test]
    fn ndjson_emits_one_object_per_row_with_nulls() {
        let rendered = render(&sample_table(), OutputFormat::Ndjson).expect("render");
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], "{\"country\":\"US\",\"activeUsers\":\"120\"}");
        assert_eq!(lines[1], "{\"country\":\"DE\",\"activeUsers\":null}");
    }

    #[test]
    fn json_and_ndjson_agree_on_values() {
        let table = sample_table();
        let pretty = render(&table, OutputFormat::Json).expect("json");
        let document: serde_json::Value = serde_json::from_str(&pretty).expect("reparse");
        assert_eq!(document["dimensionHeaders"][0]["name"], "country");
        assert_eq!(document["rows"][0]["dimensionValues"][0]["value"], "US");
        assert_eq!(document["rows"][1]["metricValues"][0]["value"], serde_json::Value::Null);

        let ndjson = render(&table, OutputFormat::Ndjson).expect("ndjson");
        let first: serde_json::Value =
            serde_json::from_str(ndjson.lines().next().expect("line")).expect("reparse");
        assert_eq!(first["country"], document["rows"][0]["dimensionValues"][0]["value"]);
        assert_eq!(first["activeUsers"], document["rows"][0]["metricValues"][0]["value"]);
    }

    #[test]
    fn table_pads_columns_to_width_floor() {
        let table = ReportTable {
            dimension_headers: vec!["cc".to_string()],
            metric_headers: vec!["n".to_string()],
            rows: vec![TableRow {
                dimension_values: vec![Some("US".to_string())],
                metric_values: vec![Some("7".to_string())],
            }],
            row_count: 1,
        };
        let rendered = render_table(&table, 50);
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(lines[0], "+--------+--------+");
        assert_eq!(lines[1], "| cc     | n      |");
        assert_eq!(lines[3], "| US     | 7      |");
        assert_eq!(lines.len(), 5);
    }

    #[test]
    fn table_widens_columns_to_fit_values() {
        let table = ReportTable {
            dimension_headers: vec!["country".to_string()],
            metric_headers: vec!["activeUsers".to_string()],
            rows: vec![TableRow {
                dimension_values: vec![Some("United Kingdom".to_string())],
                metric_values: vec![Some("42".to_string())],
            }],
            row_count: 1,
        };
        let rendered = render_table(&table, 50);
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(lines[1], "| country        | activeUsers |");
        assert_eq!(lines[3], "| United Kingdom | 42          |");
    }

    #[test]
    fn table_truncates_display_and_reports_shown_rows() {
        let rows: Vec<TableRow> = (0..5)
            .map(|index| TableRow {
                dimension_values: vec![Some(format!("row-{index}"))],
                metric_values: vec![Some(index.to_string())],
            })
            .collect();
        let table = ReportTable {
            dimension_headers: vec!["page".to_string()],
            metric_headers: vec!["views".to_string()],
            rows,
            row_count: 5,
        };

        let rendered = render_table(&table, 2);
        assert!(rendered.ends_with("(showing 2 of 5 rows)"));
        assert_eq!(rendered.matches("row-").count(), 2);

        // Full output formats ignore the display cap.
        let csv = render(&table, OutputFormat::Csv).expect("csv");
        assert_eq!(csv.lines().count(), 6);
    }

    #[test]
    fn write_output_file_creates_parent_directories() {
        let temp = tempdir().expect("tempdir");
        let target = temp.path().join("nested/out/report.csv");
        write_output_file("a,b\n1,2", &target).expect("write");
        assert_eq!(fs::read_to_string(&target).expect("read"), "a,b\n1,2");
    }
}
