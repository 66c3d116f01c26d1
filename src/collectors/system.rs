use crate::collectors::{HostInfo, Section, SystemSnapshot};
use crate::config::{CollectorConfig, CommandConfig};
use std::process::Stdio;
use std::time::Duration;
use sysinfo::{System, SystemExt};
use thiserror::Error;
use tokio::process::Command;
use tokio::time;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("{0}")]
    Spawn(#[from] std::io::Error),
    #[error("{0}")]
    Failed(String),
    #[error("timed out after {}", format_timeout(.0))]
    Timeout(Duration),
}

fn format_timeout(timeout: &Duration) -> humantime::FormattedDuration {
    humantime::format_duration(*timeout)
}

pub async fn collect_system(system: &mut System, cfg: &CollectorConfig) -> SystemSnapshot {
    let host = collect_host_info(system);

    let mut sections = Vec::with_capacity(cfg.commands.len());
    for command in &cfg.commands {
        let body = run_command(command, cfg.timeout).await;
        sections.push(Section {
            title: command.title.clone(),
            body,
        });
    }

    SystemSnapshot { host, sections }
}

fn collect_host_info(system: &mut System) -> HostInfo {
    system.refresh_cpu();
    HostInfo {
        host_name: system.host_name(),
        os_name: system.long_os_version(),
        kernel_version: system.kernel_version(),
        cpu_count: system.cpus().len(),
    }
}

/// Runs one diagnostic command. Failures become the section text.
pub async fn run_command(command: &CommandConfig, timeout: Duration) -> String {
    match execute(command, timeout).await {
        Ok(stdout) => truncate_lines(&stdout, command.max_lines),
        Err(err) => {
            warn!(command = %command.display(), error = %err, "команда диагностики завершилась с ошибкой");
            format!("Error executing '{}': {}", command.display(), err)
        }
    }
}

async fn execute(command: &CommandConfig, timeout: Duration) -> Result<String, CommandError> {
    debug!(command = %command.display(), "запуск команды диагностики");

    let child = Command::new(&command.program)
        .args(&command.args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()?;

    let output = match time::timeout(timeout, child.wait_with_output()).await {
        Ok(result) => result?,
        Err(_elapsed) => return Err(CommandError::Timeout(timeout)),
    };

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        let message = if stderr.is_empty() {
            format!("exited with {}", output.status)
        } else {
            stderr
        };
        return Err(CommandError::Failed(message));
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

fn truncate_lines(text: &str, max_lines: Option<usize>) -> String {
    match max_lines {
        Some(limit) => text.split_inclusive('\n').take(limit).collect(),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn command(title: &str, program: &str, args: &[&str]) -> CommandConfig {
        CommandConfig {
            title: title.to_string(),
            program: program.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
            max_lines: None,
        }
    }

    fn collector(commands: Vec<CommandConfig>) -> CollectorConfig {
        CollectorConfig {
            timeout: Duration::from_secs(5),
            commands,
        }
    }

    #[tokio::test]
    async fn failing_command_is_reported_inline_and_collection_continues() {
        let cfg = collector(vec![
            command(
                "Processes",
                "sh",
                &["-c", "echo 'permission denied' >&2; exit 1"],
            ),
            command("Uptime", "echo", &["up 3 days"]),
        ]);
        let mut system = System::new();

        let snapshot = collect_system(&mut system, &cfg).await;

        assert_eq!(snapshot.sections.len(), 2);
        assert_eq!(
            snapshot.sections[0].body,
            "Error executing 'sh -c echo 'permission denied' >&2; exit 1': permission denied"
        );
        assert_eq!(snapshot.sections[1].body, "up 3 days\n");

        let text = snapshot.render();
        let failed_at = text.find("== Processes ==").expect("секция с ошибкой");
        let uptime_at = text.find("== Uptime ==\nup 3 days\n").expect("следующая секция");
        assert!(failed_at < uptime_at);
    }

    #[tokio::test]
    async fn missing_binary_becomes_section_error() {
        let cmd = command("Missing", "vps-doctor-no-such-binary", &["-h"]);

        let body = run_command(&cmd, Duration::from_secs(5)).await;

        assert!(
            body.starts_with("Error executing 'vps-doctor-no-such-binary -h': "),
            "{body}"
        );
    }

    #[tokio::test]
    async fn failure_without_stderr_reports_exit_status() {
        let cmd = command("False", "false", &[]);

        let body = run_command(&cmd, Duration::from_secs(5)).await;

        assert!(body.starts_with("Error executing 'false': exited with"), "{body}");
    }

    #[tokio::test]
    async fn slow_command_is_killed_after_timeout() {
        let cmd = command("Slow", "sleep", &["5"]);

        let body = run_command(&cmd, Duration::from_millis(200)).await;

        assert_eq!(body, "Error executing 'sleep 5': timed out after 200ms");
    }

    #[tokio::test]
    async fn output_is_truncated_to_max_lines() {
        let mut cmd = command("Top", "printf", &["one\\ntwo\\nthree\\nfour\\n"]);
        cmd.max_lines = Some(2);

        let body = run_command(&cmd, Duration::from_secs(5)).await;

        assert_eq!(body, "one\ntwo\n");
    }

    #[test]
    fn truncate_keeps_text_without_limit() {
        assert_eq!(truncate_lines("a\nb\n", None), "a\nb\n");
        assert_eq!(truncate_lines("a\nb", Some(5)), "a\nb");
    }
}
