pub mod logs;
pub mod system;

use std::fmt::Write;

#[derive(Debug, Clone)]
pub struct HostInfo {
    pub host_name: Option<String>,
    pub os_name: Option<String>,
    pub kernel_version: Option<String>,
    pub cpu_count: usize,
}

/// Output of one diagnostic command, or the error text standing in for it.
#[derive(Debug, Clone)]
pub struct Section {
    pub title: String,
    pub body: String,
}

#[derive(Debug, Clone)]
pub struct SystemSnapshot {
    pub host: HostInfo,
    pub sections: Vec<Section>,
}

impl HostInfo {
    pub fn summary_line(&self) -> String {
        format!(
            "Host: {} | {} | kernel {} | {} CPUs",
            self.host_name.as_deref().unwrap_or("unknown"),
            self.os_name.as_deref().unwrap_or("unknown"),
            self.kernel_version.as_deref().unwrap_or("unknown"),
            self.cpu_count
        )
    }
}

impl SystemSnapshot {
    pub fn render(&self) -> String {
        let mut out = String::from("--- System Snapshot ---\n\n");
        out.push_str(&self.host.summary_line());
        out.push_str("\n\n");
        for section in &self.sections {
            let _ = write!(out, "== {} ==\n{}\n\n", section.title, section.body);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_keeps_section_order_and_labels() {
        let snapshot = SystemSnapshot {
            host: HostInfo {
                host_name: Some("web-01".to_string()),
                os_name: None,
                kernel_version: Some("6.1.0".to_string()),
                cpu_count: 4,
            },
            sections: vec![
                Section {
                    title: "Memory Usage (free)".to_string(),
                    body: "Mem: 2.0Gi\n".to_string(),
                },
                Section {
                    title: "System Uptime and Load".to_string(),
                    body: "load average: 0.10, 0.20, 0.30\n".to_string(),
                },
            ],
        };

        assert_eq!(
            snapshot.render(),
            "--- System Snapshot ---\n\n\
             Host: web-01 | unknown | kernel 6.1.0 | 4 CPUs\n\n\
             == Memory Usage (free) ==\nMem: 2.0Gi\n\n\n\
             == System Uptime and Load ==\nload average: 0.10, 0.20, 0.30\n\n\n"
        );
    }
}
