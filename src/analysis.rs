use crate::config::{AnalysisConfig, GeminiConfig};
use crate::http::{body_excerpt, describe_error};
use clap::ValueEnum;
use reqwest::{Client, StatusCode};
use serde::Serialize;
use serde_json::Value;
use std::fmt::Write;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

const ANSWER_POINTER: &str = "/candidates/0/content/parts/0/text";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum AudienceProfile {
    /// Server administrator: terse and technical, with concrete commands.
    #[default]
    Admin,
    /// Informed user without admin experience: plain language, terms explained.
    User,
}

impl AudienceProfile {
    pub fn name(self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::User => "user",
        }
    }

    fn context(self) -> &'static str {
        match self {
            Self::Admin => {
                "The reader is an experienced Linux system administrator. Be concise and technical. \
                 Reference exact processes, files and log lines, and give shell commands or \
                 configuration changes that can be applied directly."
            }
            Self::User => {
                "The reader understands what a server is but is not a system administrator. \
                 Use plain language, briefly explain every technical term you use, and for each \
                 recommendation say whether they can do it themselves or should ask their administrator."
            }
        }
    }
}

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("failed to reach Gemini: {0}")]
    Transport(String),
    #[error("Gemini returned HTTP {status}: {body}")]
    Status { status: StatusCode, body: String },
    #[error("unexpected response format from Gemini (missing candidates[0].content.parts[0].text)\nRaw response: {body}")]
    Format { body: String },
}

#[derive(Debug, Serialize)]
struct GenerateContentRequest<'a> {
    contents: Vec<Content<'a>>,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

pub fn build_prompt(
    cfg: &AnalysisConfig,
    lookback: Duration,
    snapshot: &str,
    logs: &str,
    audience: AudienceProfile,
) -> String {
    let mut prompt = prompt_body(cfg, lookback, snapshot, logs);
    prompt.push_str("\n## Audience\n");
    prompt.push_str(audience.context());
    prompt.push('\n');
    prompt
}

fn prompt_body(cfg: &AnalysisConfig, lookback: Duration, snapshot: &str, logs: &str) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "You are an expert operations assistant for a {} server. \
         Analyze the data below and write a diagnostic report.",
        cfg.stack
    );
    let _ = write!(
        out,
        "\n## System snapshot\n```text\n{}\n```\n\n## Logs for the last {}\n```text\n{}\n```\n",
        snapshot.trim_end(),
        humantime::format_duration(lookback),
        logs.trim_end()
    );

    out.push_str("\n## Tasks\n");
    out.push_str("1. Summarize the overall status of the server in two or three sentences.\n");
    out.push_str(
        "2. List every anomaly you find in the metrics and logs: errors, warnings, \
         resource pressure and unusual patterns.\n",
    );
    out.push_str("3. For each anomaly give exactly one concrete, actionable recommendation.\n");
    out.push_str(
        "4. Format the whole answer in Markdown, with a heading per section and bullet lists.\n",
    );
    out.push_str("5. Apply these suppression rules:\n");
    out.push_str("   Ignore the following known noise:\n");
    push_bullets(&mut out, &cfg.ignore);
    out.push_str("   Do not recommend the following, it is already handled elsewhere:\n");
    push_bullets(&mut out, &cfg.skip_recommendations);
    out.push_str(
        "6. Give special weight to overload and high-load signals: CPU saturation, load average \
         above the CPU count, memory pressure or swapping, OOM kills, PHP-FPM reaching \
         max_children, MySQL running out of connections, upstream timeouts and 502/504 responses. \
         Finding overload is the main reason this report was requested, so list those findings first.\n",
    );
    out
}

fn push_bullets(out: &mut String, items: &[String]) {
    if items.is_empty() {
        out.push_str("   - (none)\n");
        return;
    }
    for item in items {
        let _ = writeln!(out, "   - {item}");
    }
}

/// Sends the prompt and returns the answer text or an error placeholder.
pub async fn analyze(client: &Client, cfg: &GeminiConfig, api_key: &str, prompt: &str) -> String {
    info!(model = %cfg.model, prompt_chars = prompt.len(), "отправка запроса в Gemini");

    match generate(client, cfg, api_key, prompt).await {
        Ok(text) => {
            debug!(answer_chars = text.len(), "ответ Gemini получен");
            text
        }
        Err(err) => {
            warn!(error = %err, "анализ Gemini не выполнен");
            format!("Error: {err}")
        }
    }
}

async fn generate(
    client: &Client,
    cfg: &GeminiConfig,
    api_key: &str,
    prompt: &str,
) -> Result<String, AnalysisError> {
    let url = format!(
        "{}/v1beta/models/{}:generateContent",
        cfg.base_url.trim_end_matches('/'),
        cfg.model
    );
    let request = GenerateContentRequest {
        contents: vec![Content {
            parts: vec![Part { text: prompt }],
        }],
    };

    // The key travels in the query string, so URLs are stripped from every reported error.
    let response = client
        .post(&url)
        .query(&[("key", api_key)])
        .timeout(cfg.timeout)
        .json(&request)
        .send()
        .await
        .map_err(|err| AnalysisError::Transport(describe_error(&err.without_url())))?;

    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|err| AnalysisError::Transport(describe_error(&err.without_url())))?;
    if !status.is_success() {
        return Err(AnalysisError::Status {
            status,
            body: body_excerpt(&body),
        });
    }

    extract_text(&body)
}

fn extract_text(body: &str) -> Result<String, AnalysisError> {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|value| {
            value
                .pointer(ANSWER_POINTER)
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .ok_or_else(|| AnalysisError::Format {
            body: body.to_string(),
        })
}
