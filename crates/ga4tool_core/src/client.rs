use std::env;
use std::thread::sleep;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result, bail};
use reqwest::blocking::Client;
use reqwest::{Method, StatusCode};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::channels::{ChannelAdminApi, ChannelGroup};
use crate::config::ToolConfig;
use crate::reports::ReportingApi;

#[derive(Debug, Clone)]
pub struct GaClientConfig {
    pub admin_endpoint: String,
    pub data_endpoint: String,
    pub access_token: String,
    pub user_agent: String,
    pub timeout_ms: u64,
    pub max_retries: usize,
    pub retry_delay_ms: u64,
}

impl GaClientConfig {
    pub fn from_config(config: &ToolConfig) -> Self {
        Self {
            admin_endpoint: config.admin_endpoint(),
            data_endpoint: config.data_endpoint(),
            access_token: env_value("GA_ACCESS_TOKEN", ""),
            user_agent: config.user_agent(),
            timeout_ms: env_value_u64("GA_HTTP_TIMEOUT_MS", 30_000),
            max_retries: env_value_usize("GA_HTTP_RETRIES", 2),
            retry_delay_ms: env_value_u64("GA_HTTP_RETRY_DELAY_MS", 500),
        }
    }
}

/// Blocking client for the GA4 Admin and Data APIs. Both API traits are
/// implemented on the same client so one bearer token and one retry budget
/// cover a whole command run.
#[derive(Debug)]
pub struct GaApiClient {
    client: Client,
    config: GaClientConfig,
    request_count: usize,
}

impl GaApiClient {
    pub fn from_config(config: &ToolConfig) -> Result<Self> {
        Self::new(GaClientConfig::from_config(config))
    }

    pub fn new(config: GaClientConfig) -> Result<Self> {
        if config.access_token.trim().is_empty() {
            bail!("GA_ACCESS_TOKEN is required to call the GA4 APIs");
        }
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .context("failed to build GA4 HTTP client")?;

        Ok(Self {
            client,
            config,
            request_count: 0,
        })
    }

    fn request_json(
        &mut self,
        method: Method,
        url: &str,
        query: &[(&str, &str)],
        body: Option<&Value>,
    ) -> Result<Value> {
        for attempt in 0..=self.config.max_retries {
            self.request_count += 1;
            let mut request = self
                .client
                .request(method.clone(), url)
                .header("User-Agent", self.config.user_agent.clone())
                .bearer_auth(&self.config.access_token);
            if !query.is_empty() {
                request = request.query(query);
            }
            if let Some(body) = body {
                request = request.json(body);
            }

            match request.send() {
                Ok(response) => {
                    let status = response.status();
                    if !status.is_success() {
                        if attempt < self.config.max_retries && is_retryable_status(status) {
                            self.wait_before_retry(attempt);
                            continue;
                        }
                        let detail = response.text().unwrap_or_default();
                        if detail.trim().is_empty() {
                            bail!("GA4 API request failed with HTTP {status}");
                        }
                        bail!("GA4 API request failed with HTTP {status}: {detail}");
                    }
                    return response
                        .json()
                        .context("failed to decode GA4 API JSON response");
                }
                Err(error) => {
                    if attempt < self.config.max_retries && is_retryable_error(&error) {
                        self.wait_before_retry(attempt);
                        continue;
                    }
                    return Err(error).context("failed to call the GA4 API");
                }
            }
        }

        bail!("GA4 API request exhausted retry budget")
    }

    fn wait_before_retry(&self, attempt: usize) {
        let exponent = u32::try_from(attempt).unwrap_or(16);
        let base = self
            .config
            .retry_delay_ms
            .saturating_mul(2u64.saturating_pow(exponent));
        let jitter = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|duration| u64::from(duration.subsec_millis() % 100))
            .unwrap_or(0);
        sleep(Duration::from_millis(base.saturating_add(jitter)));
    }
}

impl ChannelAdminApi for GaApiClient {
    fn list_channel_groups(&mut self, property: &str) -> Result<Vec<ChannelGroup>> {
        let url = format!("{}/{property}/channelGroups", self.config.admin_endpoint);
        let payload = self.request_json(Method::GET, &url, &[], None)?;
        let response: ChannelGroupListResponse = serde_json::from_value(payload)
            .context("failed to decode channel group list response")?;
        Ok(response.channel_groups)
    }

    fn update_grouping_rule(&mut self, group_name: &str, rules: &[Value]) -> Result<ChannelGroup> {
        let url = format!("{}/{group_name}", self.config.admin_endpoint);
        let body = json!({ "name": group_name, "groupingRule": rules });
        let payload = self.request_json(
            Method::PATCH,
            &url,
            &[("updateMask", "grouping_rule")],
            Some(&body),
        )?;
        serde_json::from_value(payload).context("failed to decode updated channel group")
    }

    fn request_count(&self) -> usize {
        self.request_count
    }
}

impl ReportingApi for GaApiClient {
    fn run_report(&mut self, property: &str, body: &Value) -> Result<Value> {
        let url = format!("{}/{property}:runReport", self.config.data_endpoint);
        self.request_json(Method::POST, &url, &[], Some(body))
    }

    fn run_pivot_report(&mut self, property: &str, body: &Value) -> Result<Value> {
        let url = format!("{}/{property}:runPivotReport", self.config.data_endpoint);
        self.request_json(Method::POST, &url, &[], Some(body))
    }

    fn run_realtime_report(&mut self, property: &str, body: &Value) -> Result<Value> {
        let url = format!("{}/{property}:runRealtimeReport", self.config.data_endpoint);
        self.request_json(Method::POST, &url, &[], Some(body))
    }

    fn request_count(&self) -> usize {
        self.request_count
    }
}

fn env_value(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_value_u64(key: &str, default: u64) -> u64 {
    env::var(key)
        .ok()
        .and_then(|value| value.trim().parse::<u64>().ok())
        .unwrap_or(default)
}

fn env_value_usize(key: &str, default: usize) -> usize {
    env::var(key)
        .ok()
        .and_then(|value| value.trim().parse::<usize>().ok())
        .unwrap_or(default)
}

fn is_retryable_status(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::REQUEST_TIMEOUT
            | StatusCode::TOO_MANY_REQUESTS
            | StatusCode::BAD_GATEWAY
            | StatusCode::SERVICE_UNAVAILABLE
            | StatusCode::GATEWAY_TIMEOUT
    )
}

fn is_retryable_error(error: &reqwest::Error) -> bool {
    error.is_timeout() || error.is_connect() || error.is_request()
}

#[derive(Debug, Deserialize, Default)]
#[serde(default, rename_all = "camelCase")]
struct ChannelGroupListResponse {
    channel_groups: Vec<ChannelGroup>,
}
