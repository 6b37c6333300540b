use console::{Emoji, style};

use crate::core::health::{HealthReport, HealthStatus};

pub static SUCCESS_ICON: Emoji<'_, '_> = Emoji("✅ ", "");
pub static INFO_ICON: Emoji<'_, '_> = Emoji("ℹ️  ", "");
pub static WARN_ICON: Emoji<'_, '_> = Emoji("⚠️  ", "");
pub static ERROR_ICON: Emoji<'_, '_> = Emoji("❌ ", "");
pub static GEAR: Emoji<'_, '_> = Emoji("⚙️  ", "");
pub static SPARKLE: Emoji<'_, '_> = Emoji("✨ ", "");
pub static BOOKS: Emoji<'_, '_> = Emoji("📚 ", "");

pub fn print_success(msg: &str) {
    println!("{} {}", SUCCESS_ICON, style(msg).green());
}

pub fn print_info(msg: &str) {
    println!("{} {}", INFO_ICON, style(msg).blue());
}

pub fn print_warn(msg: &str) {
    println!("{} {}", WARN_ICON, style(msg).yellow());
}

pub fn print_error(msg: &str) {
    eprintln!("{} {}", ERROR_ICON, style(msg).red().bold());
}

pub fn print_status(label: &str, msg: &str) {
    println!("  {} {}: {}", GEAR, style(label).bold().cyan(), msg);
}

pub fn print_step(step: &str) {
    println!("{} {}", SPARKLE, style(step).bold());
}

/// One row per component, coloured by outcome.
pub fn print_health(report: &HealthReport) {
    let width = report
        .entries
        .iter()
        .map(|(name, _)| name.len())
        .max()
        .unwrap_or(0);
    for (name, status) in &report.entries {
        let label = match status {
            HealthStatus::Ok => style(status.to_string()).green(),
            HealthStatus::Degraded(_) => style(status.to_string()).red().bold(),
            HealthStatus::Skipped(_) => style(status.to_string()).dim(),
        };
        println!("  {:<width$}  {}", style(name).bold(), label, width = width);
    }
}

/// A titled block of `command  description` rows for the help screen.
pub struct GuideSection {
    title: String,
    rows: Vec<(String, String)>,
}

impl GuideSection {
    pub fn new(title: &str) -> Self {
        Self {
            title: title.to_string(),
            rows: Vec::new(),
        }
    }

    pub fn command(mut self, command: &str, description: &str) -> Self {
        self.rows.push((command.to_string(), description.to_string()));
        self
    }

    pub fn print(&self) {
        println!("\n {}", style(&self.title).bold().underlined());
        let width = self.rows.iter().map(|(c, _)| c.len()).max().unwrap_or(0);
        for (command, description) in &self.rows {
            println!(
                "   {}  {}",
                style(format!("{:<width$}", command, width = width)).green(),
                description
            );
        }
    }
}

pub fn print_banner() {
    println!();
    println!(
        "{}{}",
        BOOKS,
        style("daily-bot").bold().cyan()
    );
    println!(
        "{}\n",
        style("One CS topic a day, delivered to your channel.").cyan()
    );
}

pub fn print_goodbye() {
    println!(
        "\n{} {}",
        SPARKLE,
        style("daily-bot stopped. See you tomorrow!").bold().cyan()
    );
}
