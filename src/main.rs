mod analysis;
mod collectors;
mod config;
mod http;
mod report;

use analysis::{analyze, build_prompt, AudienceProfile};
use chrono::Utc;
use clap::Parser;
use collectors::logs::collect_logs;
use collectors::system::collect_system;
use config::Config;
use report::Report;
use reqwest::Client;
use sysinfo::{System, SystemExt};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const EXIT_MISSING_CREDENTIAL: i32 = 1;
const EXIT_INVALID_CONFIG: i32 = 2;

#[derive(Parser, Debug)]
#[command(name = "vps-doctor")]
#[command(version)]
#[command(about = "Collects a host snapshot and recent Loki logs and asks Gemini to diagnose them")]
struct Cli {
    /// Who the analysis is written for.
    #[arg(value_enum, default_value_t = AudienceProfile::Admin)]
    audience: AudienceProfile,
    /// YAML configuration; built-in defaults are used when omitted.
    #[arg(long)]
    config: Option<String>,
    #[arg(long)]
    print_default_config: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    init_tracing();

    let cli = Cli::parse();
    if cli.print_default_config {
        println!("{}", Config::example_yaml());
        return;
    }

    let cfg = match load_config(cli.config.as_deref()) {
        Ok(cfg) => cfg,
        Err(err) => {
            error!(error = %err, "не удалось загрузить конфигурацию");
            std::process::exit(EXIT_INVALID_CONFIG);
        }
    };

    let api_key = match ensure_api_key(&cfg) {
        Ok(key) => key,
        Err(err) => {
            error!(error = %err, "не найден ключ API Gemini");
            std::process::exit(EXIT_MISSING_CREDENTIAL);
        }
    };

    info!(
        audience = cli.audience.name(),
        model = %cfg.gemini.model,
        loki = %cfg.loki.base_url,
        "запуск vps-doctor"
    );

    let client = http::build_client();
    let mut system = System::new();
    let output = run_pipeline(&client, &mut system, &cfg, &api_key, cli.audience).await;
    println!("{output}");
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(path: Option<&str>) -> Result<Config, config::ConfigError> {
    match path {
        Some(path) => Config::load_from_file(path),
        None => {
            let cfg = Config::default();
            cfg.validate()?;
            Ok(cfg)
        }
    }
}

fn resolve_api_key_from_env(env_name: &str) -> Option<String> {
    if let Ok(v) = std::env::var(env_name) {
        if !v.trim().is_empty() {
            return Some(v.trim().to_string());
        }
    }
    None
}

fn ensure_api_key(cfg: &Config) -> Result<String, String> {
    let env_name = &cfg.gemini.api_key_env;
    resolve_api_key_from_env(env_name)
        .ok_or_else(|| format!("переменная окружения '{env_name}' не задана или пуста"))
}

/// Collect, query, analyze. Stage failures are embedded in the returned text.
async fn run_pipeline(
    client: &Client,
    system: &mut System,
    cfg: &Config,
    api_key: &str,
    audience: AudienceProfile,
) -> String {
    info!(commands = cfg.collector.commands.len(), "сбор системных данных");
    let snapshot = collect_system(system, &cfg.collector).await.render();

    let logs = collect_logs(client, &cfg.loki, Utc::now()).await;

    let prompt = build_prompt(&cfg.analysis, cfg.loki.lookback, &snapshot, &logs, audience);
    let analysis = analyze(client, &cfg.gemini, api_key, &prompt).await;

    Report {
        snapshot: &snapshot,
        logs: &logs,
        lookback: cfg.loki.lookback,
        timezone: cfg.loki.timezone,
        audience,
        analysis: &analysis,
    }
    .to_string()
}
