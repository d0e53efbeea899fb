//! CLI console utilities

use colored::*;

/// CLI console for formatted output
pub struct CliConsole;

impl CliConsole {
    pub const fn new() -> Self {
        Self
    }

    /// Print an info message
    pub fn info(&self, message: &str) {
        println!("{} {}", "ℹ".blue().bold(), message);
    }

    /// Print a success message
    pub fn success(&self, message: &str) {
        println!("{} {}", "✓".green().bold(), message.green());
    }

    /// Print a warning message
    pub fn warn(&self, message: &str) {
        println!("{} {}", "⚠".yellow().bold(), message.yellow());
    }

    /// Print an error message
    pub fn error(&self, message: &str) {
        eprintln!("{} {}", "✗".red().bold(), message.red());
    }

    /// Print a header
    pub fn print_header(&self, title: &str) {
        println!();
        println!("{}", title.bold().underline());
        println!("{}", "=".repeat(title.len()).dimmed());
    }

    /// Print a `label: value` line
    pub fn field(&self, label: &str, value: impl std::fmt::Display) {
        println!("  {:<20} {}", format!("{}:", label).dimmed(), value);
    }
}
