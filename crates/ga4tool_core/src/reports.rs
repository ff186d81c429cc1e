use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::client::GaApiClient;
use crate::config::ToolConfig;
use crate::render::{ReportTable, TableRow};

const DEFAULT_ROW_LIMIT: u64 = 100_000;
const DEFAULT_START_DATE: &str = "7daysAgo";
const DEFAULT_END_DATE: &str = "yesterday";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportType {
    Standard,
    Pivot,
    Realtime,
}

impl ReportType {
    pub fn parse(value: &str) -> Result<Self> {
        if value.eq_ignore_ascii_case("standard") {
            return Ok(Self::Standard);
        }
        if value.eq_ignore_ascii_case("pivot") {
            return Ok(Self::Pivot);
        }
        if value.eq_ignore_ascii_case("realtime") {
            return Ok(Self::Realtime);
        }
        bail!("unknown report type: {value} (expected standard|pivot|realtime)")
    }
}

/// Declarative report spec loaded from a JSON file. Filter, order-by, pivot,
/// and minute-range subtrees are passed to the Data API untouched.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ReportSpec {
    pub report_type: Option<String>,
    pub property: Option<String>,
    pub date_ranges: Option<Vec<Value>>,
    pub dimensions: Option<Vec<FieldRef>>,
    pub metrics: Option<Vec<FieldRef>>,
    pub dimension_filter: Option<Value>,
    pub metric_filter: Option<Value>,
    pub order_bys: Option<Vec<Value>>,
    pub pivots: Option<Vec<Value>>,
    pub minute_ranges: Option<Vec<Value>>,
    pub keep_empty_rows: bool,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
    pub return_property_quota: Option<bool>,
}

/// A dimension or metric entry: either a bare name or a full object spec.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum FieldRef {
    Name(String),
    Spec(Value),
}

impl FieldRef {
    /// Canonical `{"name": ...}` object shape; object specs pass through
    /// unchanged, so normalizing twice is a no-op.
    pub fn normalized(&self) -> Value {
        match self {
            FieldRef::Name(name) => json!({ "name": name }),
            FieldRef::Spec(spec) => spec.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReportRequest {
    pub property: String,
    pub report_type: ReportType,
    pub body: Value,
}

pub trait ReportingApi {
    fn run_report(&mut self, property: &str, body: &Value) -> Result<Value>;
    fn run_pivot_report(&mut self, property: &str, body: &Value) -> Result<Value>;
    fn run_realtime_report(&mut self, property: &str, body: &Value) -> Result<Value>;
    fn request_count(&self) -> usize;
}

pub fn load_report_spec(path: &Path) -> Result<ReportSpec> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("failed to read report spec {}", path.display()))?;
    let spec: ReportSpec = serde_json::from_str(&content)
        .with_context(|| format!("failed to parse report spec {}", path.display()))?;
    Ok(spec)
}

/// Build the typed request body for the spec's report type. Fails on an
/// unknown report type before any remote call is made.
pub fn compile_request(property: &str, spec: &ReportSpec) -> Result<ReportRequest> {
    let report_type = ReportType::parse(spec.report_type.as_deref().unwrap_or("standard"))?;
    let body = match report_type {
        ReportType::Standard => standard_body(spec),
        ReportType::Pivot => pivot_body(spec),
        ReportType::Realtime => realtime_body(spec),
    };
    Ok(ReportRequest {
        property: property.to_string(),
        report_type,
        body,
    })
}

pub fn execute_report(config: &ToolConfig, request: &ReportRequest) -> Result<ReportTable> {
    let mut client = GaApiClient::from_config(config)?;
    execute_report_with_api(&mut client, request)
}

fn execute_report_with_api<A: ReportingApi>(
    api: &mut A,
    request: &ReportRequest,
) -> Result<ReportTable> {
    match request.report_type {
        ReportType::Standard => execute_standard(api, request),
        ReportType::Pivot => {
            let response = api.run_pivot_report(&request.property, &request.body)?;
            table_from_response(response)
        }
        ReportType::Realtime => {
            let response = api.run_realtime_report(&request.property, &request.body)?;
            table_from_response(response)
        }
    }
}

/// Pagination loop for standard reports. `limit` acts as the page size: each
/// call re-sends the request with the offset advanced by the rows fetched so
/// far, until the server-reported total is reached. An empty page terminates
/// the loop even when the reported total has not been reached, so an
/// inconsistent remote total cannot hang the run.
fn execute_standard<A: ReportingApi>(api: &mut A, request: &ReportRequest) -> Result<ReportTable> {
    let base_offset = request
        .body
        .get("offset")
        .and_then(Value::as_u64)
        .unwrap_or(0);
    let mut body = request.body.clone();
    let mut table = ReportTable::default();
    let mut fetched: u64 = 0;

    loop {
        if let Some(map) = body.as_object_mut() {
            map.insert("offset".to_string(), json!(base_offset + fetched));
        }
        let response = api.run_report(&request.property, &body)?;
        let ReportResponse {
            dimension_headers,
            metric_headers,
            rows,
            row_count,
        } = serde_json::from_value(response).context("failed to decode report response")?;

        // Headers can be missing on later pages; keep the ones already seen.
        if !dimension_headers.is_empty() {
            table.dimension_headers = header_names(&dimension_headers);
        }
        if !metric_headers.is_empty() {
            table.metric_headers = header_names(&metric_headers);
        }

        let batch = rows.len() as u64;
        table.rows.extend(rows.into_iter().map(table_row));
        fetched += batch;
        table.row_count = row_count.unwrap_or(table.rows.len() as u64);

        if fetched >= table.row_count || batch == 0 {
            break;
        }
    }

    Ok(table)
}

fn table_from_response(response: Value) -> Result<ReportTable> {
    let ReportResponse {
        dimension_headers,
        metric_headers,
        rows,
        row_count,
    } = serde_json::from_value(response).context("failed to decode report response")?;

    let row_count = row_count.unwrap_or(rows.len() as u64);
    Ok(ReportTable {
        dimension_headers: header_names(&dimension_headers),
        metric_headers: header_names(&metric_headers),
        rows: rows.into_iter().map(table_row).collect(),
        row_count,
    })
}

fn standard_body(spec: &ReportSpec) -> Value {
    let mut body = json!({
        "dateRanges": date_ranges_or_default(spec),
        "dimensions": normalize_fields(spec.dimensions.as_deref().unwrap_or_default()),
        "metrics": normalize_fields(spec.metrics.as_deref().unwrap_or_default()),
        "keepEmptyRows": spec.keep_empty_rows,
        "limit": spec.limit.unwrap_or(DEFAULT_ROW_LIMIT),
        "offset": spec.offset.unwrap_or(0),
        "returnPropertyQuota": spec.return_property_quota.unwrap_or(true),
    });
    if let Some(filter) = &spec.dimension_filter {
        body["dimensionFilter"] = filter.clone();
    }
    if let Some(filter) = &spec.metric_filter {
        body["metricFilter"] = filter.clone();
    }
    if let Some(order_bys) = &spec.order_bys {
        body["orderBys"] = json!(order_bys);
    }
    body
}

fn pivot_body(spec: &ReportSpec) -> Value {
    let mut body = json!({
        "dateRanges": date_ranges_or_default(spec),
        "dimensions": normalize_fields(spec.dimensions.as_deref().unwrap_or_default()),
        "metrics": normalize_fields(spec.metrics.as_deref().unwrap_or_default()),
        "pivots": spec.pivots.clone().unwrap_or_default(),
        "keepEmptyRows": spec.keep_empty_rows,
        "returnPropertyQuota": spec.return_property_quota.unwrap_or(true),
    });
    if let Some(filter) = &spec.dimension_filter {
        body["dimensionFilter"] = filter.clone();
    }
    if let Some(filter) = &spec.metric_filter {
        body["metricFilter"] = filter.clone();
    }
    body
}

fn realtime_body(spec: &ReportSpec) -> Value {
    let metrics = match &spec.metrics {
        Some(metrics) => normalize_fields(metrics),
        None => vec![json!({ "name": "activeUsers" })],
    };
    let mut body = json!({
        "dimensions": normalize_fields(spec.dimensions.as_deref().unwrap_or_default()),
        "metrics": metrics,
    });
    if let Some(ranges) = &spec.minute_ranges {
        body["minuteRanges"] = json!(ranges);
    }
    body
}

fn date_ranges_or_default(spec: &ReportSpec) -> Vec<Value> {
    spec.date_ranges.clone().unwrap_or_else(|| {
        vec![json!({ "startDate": DEFAULT_START_DATE, "endDate": DEFAULT_END_DATE })]
    })
}

fn normalize_fields(fields: &[FieldRef]) -> Vec<Value> {
    fields.iter().map(FieldRef::normalized).collect()
}

fn header_names(headers: &[HeaderItem]) -> Vec<String> {
    headers.iter().map(|header| header.name.clone()).collect()
}

fn table_row(row: RowItem) -> TableRow {
    TableRow {
        dimension_values: row.dimension_values.into_iter().map(|cell| cell.value).collect(),
        metric_values: row.metric_values.into_iter().map(|cell| cell.value).collect(),
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(default, rename_all = "camelCase")]
struct ReportResponse {
    dimension_headers: Vec<HeaderItem>,
    metric_headers: Vec<HeaderItem>,
    rows: Vec<RowItem>,
    row_count: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct HeaderItem {
    #[serde(default)]
    name: String,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default, rename_all = "camelCase")]
struct RowItem {
    dimension_values: Vec<CellItem>,
    metric_values: Vec<CellItem>,
}

#[derive(Debug, Deserialize, Default)]
struct CellItem {
    #[serde(default)]
    value: Option<String>,
}
