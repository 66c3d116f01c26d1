use crate::config::{LokiConfig, Timezone};
use crate::http::{body_excerpt, describe_error};
use chrono::{DateTime, Local, TimeZone, Utc};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

pub const NO_LOGS_PLACEHOLDER: &str = "No logs for the selected period.";

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Error)]
pub enum LokiError {
    #[error("failed to reach Loki: {0}")]
    Transport(String),
    #[error("Loki returned HTTP {status}: {body}")]
    Status { status: StatusCode, body: String },
    #[error("unexpected response format from Loki: {0}")]
    Format(String),
    #[error("query window is out of range: {0}")]
    Window(String),
}

#[derive(Debug, Deserialize)]
struct QueryRangeResponse {
    data: QueryData,
}

#[derive(Debug, Deserialize)]
struct QueryData {
    result: Vec<StreamResult>,
}

#[derive(Debug, Deserialize)]
struct StreamResult {
    values: Vec<(String, String)>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub timestamp_nanos: i64,
    pub line: String,
}

#[derive(Debug, Clone, Copy)]
pub struct QueryWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl QueryWindow {
    pub fn ending_at(end: DateTime<Utc>, lookback: Duration) -> Result<Self, LokiError> {
        let lookback =
            chrono::Duration::from_std(lookback).map_err(|err| LokiError::Window(err.to_string()))?;
        let start = end
            .checked_sub_signed(lookback)
            .ok_or_else(|| LokiError::Window(format!("{end} minus {lookback}")))?;
        Ok(Self { start, end })
    }

    /// Bounds as nanoseconds since the Unix epoch, the unit `query_range` expects.
    pub fn as_nanos(&self) -> Result<(i64, i64), LokiError> {
        let start = self
            .start
            .timestamp_nanos_opt()
            .ok_or_else(|| LokiError::Window(format!("start {}", self.start)))?;
        let end = self
            .end
            .timestamp_nanos_opt()
            .ok_or_else(|| LokiError::Window(format!("end {}", self.end)))?;
        Ok((start, end))
    }
}

/// Fetches the window ending at `now` and renders it. Errors become placeholder text.
pub async fn collect_logs(client: &Client, cfg: &LokiConfig, now: DateTime<Utc>) -> String {
    info!(
        lookback = %humantime::format_duration(cfg.lookback),
        query = %cfg.selector(),
        "запрос логов из Loki"
    );

    match fetch_entries(client, cfg, now).await {
        Ok(entries) => {
            debug!(entries = entries.len(), "логи получены");
            render_entries(&entries, cfg.timezone)
        }
        Err(err) => {
            warn!(error = %err, "не удалось получить логи из Loki");
            format!("Error: {err}")
        }
    }
}

async fn fetch_entries(
    client: &Client,
    cfg: &LokiConfig,
    now: DateTime<Utc>,
) -> Result<Vec<LogEntry>, LokiError> {
    let window = QueryWindow::ending_at(now, cfg.lookback)?;
    let streams = query_range(client, cfg, &window).await?;
    merge_streams(streams)
}

async fn query_range(
    client: &Client,
    cfg: &LokiConfig,
    window: &QueryWindow,
) -> Result<Vec<StreamResult>, LokiError> {
    let (start, end) = window.as_nanos()?;
    let url = format!("{}/loki/api/v1/query_range", cfg.base_url.trim_end_matches('/'));
    let selector = cfg.selector();
    let start = start.to_string();
    let end = end.to_string();
    let limit = cfg.limit.to_string();

    let response = client
        .get(&url)
        .query(&[
            ("query", selector.as_str()),
            ("start", start.as_str()),
            ("end", end.as_str()),
            ("limit", limit.as_str()),
            ("direction", cfg.direction.as_str()),
        ])
        .timeout(cfg.timeout)
        .send()
        .await
        .map_err(|err| LokiError::Transport(describe_error(&err)))?;

    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|err| LokiError::Transport(describe_error(&err)))?;
    if !status.is_success() {
        return Err(LokiError::Status {
            status,
            body: body_excerpt(&body),
        });
    }

    let parsed: QueryRangeResponse =
        serde_json::from_str(&body).map_err(|err| LokiError::Format(err.to_string()))?;
    Ok(parsed.data.result)
}

/// Flattens all streams into one list ordered by timestamp.
/// Per-stream order from the server is not trusted; equal timestamps keep response order.
fn merge_streams(streams: Vec<StreamResult>) -> Result<Vec<LogEntry>, LokiError> {
    let mut entries = Vec::with_capacity(streams.iter().map(|s| s.values.len()).sum());
    for stream in streams {
        for (ts, line) in stream.values {
            let timestamp_nanos = ts
                .trim()
                .parse::<i64>()
                .map_err(|_| LokiError::Format(format!("invalid timestamp '{ts}'")))?;
            entries.push(LogEntry {
                timestamp_nanos,
                line,
            });
        }
    }
    entries.sort_by_key(|e| e.timestamp_nanos);
    Ok(entries)
}

pub fn render_entries(entries: &[LogEntry], timezone: Timezone) -> String {
    if entries.is_empty() {
        return NO_LOGS_PLACEHOLDER.to_string();
    }

    entries
        .iter()
        .map(|e| format!("[{}] {}", format_timestamp(e.timestamp_nanos, timezone), e.line))
        .collect::<Vec<_>>()
        .join("\n")
}

fn format_timestamp(nanos: i64, timezone: Timezone) -> String {
    match timezone {
        Timezone::Utc => Utc.timestamp_nanos(nanos).format(TIMESTAMP_FORMAT).to_string(),
        Timezone::Local => Local.timestamp_nanos(nanos).format(TIMESTAMP_FORMAT).to_string(),
    }
}
