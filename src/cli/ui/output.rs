use console::style;

use crate::ai::{AttemptRecord, LineExplanation, RiskLevel};
use crate::storage::{HealthState, StoreHealth};

pub struct Output;

impl Output {
    pub fn new() -> Self {
        Self
    }

    pub fn success(&self, message: &str) {
        println!("{} {}", style("✓").green(), message);
    }

    pub fn error(&self, message: &str) {
        eprintln!("{} {}", style("✗").red(), message);
    }

    pub fn warning(&self, message: &str) {
        println!("{} {}", style("⚠").yellow(), message);
    }

    pub fn info(&self, message: &str) {
        println!("{} {}", style("ℹ").blue(), message);
    }

    pub fn header(&self, message: &str) {
        println!("\n{}", style(message).bold().underlined());
    }

    /// Failed candidates that preceded a result, dimmed on stderr
    pub fn attempts(&self, attempts: &[AttemptRecord]) {
        for attempt in attempts {
            eprintln!("  {} {}", style("↳").dim(), style(attempt).dim());
        }
    }

    /// One explained line: numbered source, then its notes indented below
    pub fn explanation(&self, line: &LineExplanation) {
        println!(
            "{} {} {}",
            style(format!("{:>4}", line.line_number)).dim(),
            style("│").dim(),
            line.code
        );
        println!("       {}", line.explanation);

        if let Some(level) = line.risk_level {
            println!("       risk: {}", risk_label(level));
        }
        if let Some(note) = &line.performance_note {
            println!("       perf: {}", note);
        }
        if let Some(issue) = &line.security_issue {
            println!("       {} {}", style("security:").red(), issue);
        }
    }

    pub fn health(&self, database_url: Option<&str>, health: &StoreHealth) {
        match (database_url, health.state) {
            (None, _) => self.info("No database_url configured; all data is kept in memory"),
            (Some(url), HealthState::Healthy) => {
                self.success(&format!("Durable store reachable: {}", url))
            }
            (Some(url), HealthState::Unreachable) => self.warning(&format!(
                "Durable store unreachable: {} (serving from memory)",
                url
            )),
            (Some(url), HealthState::Unknown) => {
                self.info(&format!("Durable store not probed yet: {}", url))
            }
        }

        if let Some(checked) = health.last_checked_at {
            println!("  Checked at: {}", checked.to_rfc3339());
        }
    }
}

fn risk_label(level: RiskLevel) -> String {
    match level {
        RiskLevel::High => style("high").red().bold().to_string(),
        RiskLevel::Medium => style("medium").yellow().to_string(),
        RiskLevel::Low => style("low").green().to_string(),
    }
}

impl Default for Output {
    fn default() -> Self {
        Self::new()
    }
}
