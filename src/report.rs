use crate::analysis::AudienceProfile;
use crate::config::Timezone;
use std::fmt;
use std::time::Duration;

const BANNER: &str = "==================================================";

/// Console output of one run.
pub struct Report<'a> {
    pub snapshot: &'a str,
    pub logs: &'a str,
    pub lookback: Duration,
    pub timezone: Timezone,
    pub audience: AudienceProfile,
    pub analysis: &'a str,
}

impl fmt::Display for Report<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "--- Collected system data ---\n")?;
        writeln!(f, "{}", self.snapshot.trim_end())?;
        writeln!(
            f,
            "\n--- Logs for the last {} (timestamps in {}) ---\n",
            humantime::format_duration(self.lookback),
            self.timezone.label()
        )?;
        writeln!(f, "{}", self.logs.trim_end())?;
        writeln!(f, "\n{BANNER}")?;
        writeln!(f, "--- AI analysis ({}) ---", self.audience.name())?;
        writeln!(f, "{BANNER}\n")?;
        write!(f, "{}", self.analysis.trim_end())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_prints_snapshot_logs_then_analysis() {
        let report = Report {
            snapshot: "--- System Snapshot ---\n\n== Disk Usage (df) ==\n/dev/sda1 91%\n\n\n",
            logs: "No logs for the selected period.",
            lookback: Duration::from_secs(900),
            timezone: Timezone::Utc,
            audience: AudienceProfile::User,
            analysis: "Error: failed to reach Gemini: connection refused",
        };

        let text = report.to_string();

        let snapshot_at = text.find("== Disk Usage (df) ==").expect("снимок");
        let logs_at = text
            .find("--- Logs for the last 15m (timestamps in UTC) ---\n\nNo logs for the selected period.")
            .expect("логи");
        let analysis_at = text.find("--- AI analysis (user) ---").expect("анализ");
        assert!(text.starts_with("--- Collected system data ---\n\n"));
        assert!(snapshot_at < logs_at && logs_at < analysis_at);
        assert!(text.ends_with(&format!(
            "{BANNER}\n\nError: failed to reach Gemini: connection refused"
        )));
    }
}
