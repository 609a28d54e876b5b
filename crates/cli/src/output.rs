//! Output formatting utilities

use clap::ValueEnum;
use colored::Colorize;
use serde::{Deserialize, Serialize};
use tabled::{settings::Style, Table, Tabled};

/// Percentages at or above these are shown yellow and red
const PERCENT_WARN: f64 = 70.0;
const PERCENT_CRITICAL: f64 = 85.0;

/// Output format for CLI commands
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Table format (default)
    #[default]
    Table,
    /// JSON format
    Json,
}

/// Print a rounded table, or a notice when there is nothing to show
pub fn print_table<T: Tabled>(rows: Vec<T>, empty_message: &str) {
    if rows.is_empty() {
        print_warning(empty_message);
        return;
    }
    let table = Table::new(rows).with(Style::rounded()).to_string();
    println!("{}", table);
}

/// Print any serializable value as pretty JSON
pub fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Print a warning message
pub fn print_warning(message: &str) {
    println!("{} {}", "⚠".yellow().bold(), message);
}

/// Print an info message
pub fn print_info(message: &str) {
    println!("{} {}", "ℹ".blue().bold(), message);
}

pub fn format_percentage(value: f64) -> String {
    format!("{:.1}%", value)
}

/// Usage and request percentages: green below 70, yellow below 85, red above
pub fn color_percentage(value: f64) -> String {
    let formatted = format_percentage(value);
    if value >= PERCENT_CRITICAL {
        formatted.red().to_string()
    } else if value >= PERCENT_WARN {
        formatted.yellow().to_string()
    } else {
        formatted.green().to_string()
    }
}

/// Non-zero problem counts are highlighted
pub fn color_count(count: i64) -> String {
    if count > 0 {
        count.to_string().red().to_string()
    } else {
        count.to_string()
    }
}

/// Color status based on value
pub fn color_status(status: &str) -> String {
    match status.to_lowercase().as_str() {
        "healthy" | "ready" | "true" => status.green().to_string(),
        "degraded" | "unknown" => status.yellow().to_string(),
        "unhealthy" | "not ready" | "false" => status.red().to_string(),
        _ => status.to_string(),
    }
}

/// Format timestamp for display
pub fn format_timestamp(ts: &str) -> String {
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(ts) {
        dt.format("%Y-%m-%d %H:%M:%S").to_string()
    } else {
        ts.to_string()
    }
}
