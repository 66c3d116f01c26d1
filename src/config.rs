use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub loki: LokiConfig,
    #[serde(default)]
    pub gemini: GeminiConfig,
    #[serde(default)]
    pub analysis: AnalysisConfig,
    #[serde(default)]
    pub collector: CollectorConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LokiConfig {
    #[serde(default = "default_loki_base_url")]
    pub base_url: String,
    #[serde(default = "default_loki_label")]
    pub label: String,
    #[serde(default = "default_loki_streams")]
    pub streams: Vec<String>,
    /// LogQL selector used verbatim instead of `label`/`streams`.
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default = "default_lookback", with = "humantime_duration")]
    pub lookback: Duration,
    #[serde(default = "default_loki_limit")]
    pub limit: u32,
    #[serde(default)]
    pub direction: Direction,
    #[serde(default = "default_loki_timeout", with = "humantime_duration")]
    pub timeout: Duration,
    #[serde(default)]
    pub timezone: Timezone,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    #[default]
    Forward,
    Backward,
}

/// Zone used when rendering log timestamps.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Timezone {
    #[default]
    Utc,
    Local,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GeminiConfig {
    #[serde(default = "default_gemini_base_url")]
    pub base_url: String,
    #[serde(default = "default_gemini_model")]
    pub model: String,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_gemini_timeout", with = "humantime_duration")]
    pub timeout: Duration,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AnalysisConfig {
    #[serde(default = "default_stack")]
    pub stack: String,
    #[serde(default = "default_ignore")]
    pub ignore: Vec<String>,
    #[serde(default = "default_skip_recommendations")]
    pub skip_recommendations: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CollectorConfig {
    #[serde(default = "default_command_timeout", with = "humantime_duration")]
    pub timeout: Duration,
    #[serde(default = "default_commands")]
    pub commands: Vec<CommandConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CommandConfig {
    pub title: String,
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub max_lines: Option<usize>,
}

impl Default for LokiConfig {
    fn default() -> Self {
        Self {
            base_url: default_loki_base_url(),
            label: default_loki_label(),
            streams: default_loki_streams(),
            query: None,
            lookback: default_lookback(),
            limit: default_loki_limit(),
            direction: Direction::default(),
            timeout: default_loki_timeout(),
            timezone: Timezone::default(),
        }
    }
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            base_url: default_gemini_base_url(),
            model: default_gemini_model(),
            api_key_env: default_api_key_env(),
            timeout: default_gemini_timeout(),
        }
    }
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            stack: default_stack(),
            ignore: default_ignore(),
            skip_recommendations: default_skip_recommendations(),
        }
    }
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            timeout: default_command_timeout(),
            commands: default_commands(),
        }
    }
}

impl LokiConfig {
    /// Stream selector sent as the `query` parameter.
    pub fn selector(&self) -> String {
        match &self.query {
            Some(query) => query.trim().to_string(),
            None => format!("{{{}=~\"{}\"}}", self.label, self.streams.join("|")),
        }
    }
}

impl Direction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Forward => "forward",
            Self::Backward => "backward",
        }
    }
}

impl Timezone {
    pub fn label(self) -> &'static str {
        match self {
            Self::Utc => "UTC",
            Self::Local => "local time",
        }
    }
}

impl CommandConfig {
    /// Command line as shown in reports and error text.
    pub fn display(&self) -> String {
        let mut parts = Vec::with_capacity(self.args.len() + 1);
        parts.push(self.program.as_str());
        parts.extend(self.args.iter().map(String::as_str));
        parts.join(" ")
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("не удалось прочитать файл конфигурации {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("не удалось разобрать YAML в {path}: {source}")]
    Parse {
        path: String,
        source: serde_yaml::Error,
    },
    #[error("ошибка валидации конфигурации: {0}")]
    Validation(String),
}

impl Config {
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path_ref = path.as_ref();
        let path_display = path_ref.display().to_string();
        let text = fs::read_to_string(path_ref).map_err(|source| ConfigError::Read {
            path: path_display.clone(),
            source,
        })?;

        let cfg: Config = serde_yaml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path_display,
            source,
        })?;

        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_loki(&self.loki)?;
        validate_gemini(&self.gemini)?;
        if self.analysis.stack.trim().is_empty() {
            return Err(ConfigError::Validation(
                "analysis.stack не должен быть пустым".to_string(),
            ));
        }
        validate_collector(&self.collector)?;

        Ok(())
    }

    pub fn example_yaml() -> &'static str {
        include_str!("../config.yaml.example")
    }
}

fn validate_loki(cfg: &LokiConfig) -> Result<(), ConfigError> {
    validate_base_url("loki.base_url", &cfg.base_url)?;
    match &cfg.query {
        Some(query) if query.trim().is_empty() => {
            return Err(ConfigError::Validation(
                "loki.query не должен быть пустым".to_string(),
            ));
        }
        Some(_) => {}
        None => {
            if cfg.label.trim().is_empty() {
                return Err(ConfigError::Validation(
                    "loki.label обязателен, если не задан loki.query".to_string(),
                ));
            }
            if cfg.streams.is_empty() {
                return Err(ConfigError::Validation(
                    "loki.streams пуст: укажите хотя бы один поток или loki.query".to_string(),
                ));
            }
            if cfg.streams.iter().any(|s| s.trim().is_empty()) {
                return Err(ConfigError::Validation(
                    "loki.streams[*] не должен быть пустым".to_string(),
                ));
            }
        }
    }
    if cfg.lookback.is_zero() {
        return Err(ConfigError::Validation(
            "loki.lookback должно быть > 0".to_string(),
        ));
    }
    if cfg.limit < 1 {
        return Err(ConfigError::Validation(
            "loki.limit должно быть >= 1".to_string(),
        ));
    }
    if cfg.timeout.is_zero() {
        return Err(ConfigError::Validation(
            "loki.timeout должно быть > 0".to_string(),
        ));
    }
    Ok(())
}

fn validate_gemini(cfg: &GeminiConfig) -> Result<(), ConfigError> {
    validate_base_url("gemini.base_url", &cfg.base_url)?;
    if cfg.model.trim().is_empty() {
        return Err(ConfigError::Validation(
            "gemini.model не должен быть пустым".to_string(),
        ));
    }
    if cfg.api_key_env.trim().is_empty() {
        return Err(ConfigError::Validation(
            "gemini.api_key_env не должен быть пустым".to_string(),
        ));
    }
    if cfg.timeout.is_zero() {
        return Err(ConfigError::Validation(
            "gemini.timeout должно быть > 0".to_string(),
        ));
    }
    Ok(())
}

fn validate_collector(cfg: &CollectorConfig) -> Result<(), ConfigError> {
    if cfg.timeout.is_zero() {
        return Err(ConfigError::Validation(
            "collector.timeout должно быть > 0".to_string(),
        ));
    }

    let mut titles = HashSet::new();
    for command in &cfg.commands {
        if command.title.trim().is_empty() {
            return Err(ConfigError::Validation(
                "collector.commands[*].title не должен быть пустым".to_string(),
            ));
        }
        if !titles.insert(command.title.clone()) {
            return Err(ConfigError::Validation(format!(
                "заголовок команды '{}' должен быть уникальным",
                command.title
            )));
        }
        if command.program.trim().is_empty() {
            return Err(ConfigError::Validation(format!(
                "collector.commands '{}' program не должен быть пустым",
                command.title
            )));
        }
        if command.max_lines == Some(0) {
            return Err(ConfigError::Validation(format!(
                "collector.commands '{}' max_lines должно быть >= 1",
                command.title
            )));
        }
    }
    Ok(())
}

fn validate_base_url(field: &str, url: &str) -> Result<(), ConfigError> {
    let url = url.trim();
    if url.is_empty() {
        return Err(ConfigError::Validation(format!("поле {field} обязательно")));
    }
    if !url.starts_with("http://") && !url.starts_with("https://") {
        return Err(ConfigError::Validation(format!(
            "поле {field} должно начинаться с http:// или https://"
        )));
    }
    Ok(())
}

mod humantime_duration {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&humantime::format_duration(*value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let text = String::deserialize(deserializer)?;
        humantime::parse_duration(text.trim()).map_err(serde::de::Error::custom)
    }
}

fn default_loki_base_url() -> String {
    "http://localhost:3100".to_string()
}

fn default_loki_label() -> String {
    "job".to_string()
}

fn default_loki_streams() -> Vec<String> {
    ["nginx", "php_fpm", "mysql"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

const fn default_lookback() -> Duration {
    Duration::from_secs(15 * 60)
}

const fn default_loki_limit() -> u32 {
    1000
}

const fn default_loki_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_gemini_base_url() -> String {
    "https://generativelanguage.googleapis.com".to_string()
}

fn default_gemini_model() -> String {
    "gemini-2.5-flash".to_string()
}

fn default_api_key_env() -> String {
    "GEMINI_API_KEY".to_string()
}

const fn default_gemini_timeout() -> Duration {
    Duration::from_secs(5 * 60)
}

fn default_stack() -> String {
    "LEMP (Linux, Nginx, MySQL, PHP-FPM)".to_string()
}

fn default_ignore() -> Vec<String> {
    vec![
        "404 responses from bots and vulnerability scanners probing paths like /wp-login.php, /xmlrpc.php or /.env".to_string(),
        "PHP-FPM notices about children exiting during normal process recycling".to_string(),
        "MySQL warnings about deprecated configuration options".to_string(),
    ]
}

fn default_skip_recommendations() -> Vec<String> {
    vec![
        "firewall, fail2ban or other intrusion prevention hardening (already managed)".to_string(),
        "backup strategy (backups are handled by a separate system)".to_string(),
        "OS package updates (handled by unattended-upgrades)".to_string(),
    ]
}

const fn default_command_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_commands() -> Vec<CommandConfig> {
    vec![
        CommandConfig {
            title: "CPU and Memory Usage (top)".to_string(),
            program: "top".to_string(),
            args: vec!["-b".to_string(), "-n".to_string(), "1".to_string()],
            max_lines: Some(15),
        },
        CommandConfig {
            title: "Memory Usage (free)".to_string(),
            program: "free".to_string(),
            args: vec!["-h".to_string()],
            max_lines: None,
        },
        CommandConfig {
            title: "Disk Usage (df)".to_string(),
            program: "df".to_string(),
            args: vec!["-h".to_string()],
            max_lines: None,
        },
        CommandConfig {
            title: "System Uptime and Load".to_string(),
            program: "uptime".to_string(),
            args: vec![],
            max_lines: None,
        },
    ]
}
