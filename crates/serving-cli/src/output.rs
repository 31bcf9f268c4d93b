//! Output formatting utilities

use clap::ValueEnum;
use colored::Colorize;
use serde::Serialize;
use serving_lib::table::Values;
use serving_lib::Table;
use tabled::{builder::Builder, settings::Style};

/// Output format for CLI commands
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Table format (default)
    #[default]
    Table,
    /// JSON format
    Json,
}

impl OutputFormat {
    /// Parse a configured format name, ignoring case
    pub fn from_name(name: &str) -> Option<Self> {
        <Self as ValueEnum>::from_str(name, true).ok()
    }
}

/// Render a labeled table with row labels in the first column
pub fn render_table(table: &Table) -> String {
    let mut builder = Builder::default();

    let header = std::iter::once(String::new()).chain(table.cols().iter().map(|c| c.to_string()));
    builder.push_record(header);

    for (i, label) in table.rows().iter().enumerate() {
        let cells: Vec<String> = match table.values() {
            Values::Int(a) => a.row(i).iter().map(|v| v.to_string()).collect(),
            Values::Float(a) => a.row(i).iter().map(|v| format_float(*v)).collect(),
        };
        builder.push_record(std::iter::once(label.to_string().bold().to_string()).chain(cells));
    }

    builder.build().with(Style::rounded()).to_string()
}

/// Print a table, titled
pub fn print_table(title: &str, table: &Table) {
    let (rows, cols) = table.shape();
    println!("{} {}", title.bold(), format!("({} x {})", rows, cols).dimmed());
    println!("{}", render_table(table));
}

/// Print any response as pretty JSON
pub fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn format_float(v: f64) -> String {
    if v.is_nan() {
        "NaN".to_string()
    } else if v.fract() == 0.0 && v.abs() < 1e15 {
        format!("{:.1}", v)
    } else {
        format!("{:.4}", v)
    }
}

/// Print a success message
pub fn print_success(message: &str) {
    println!("{} {}", "✓".green().bold(), message);
}

/// Print an info message
pub fn print_info(message: &str) {
    println!("{} {}", "ℹ".blue().bold(), message);
}
