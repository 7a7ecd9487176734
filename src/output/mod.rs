//! Rendering of scan results.

mod cli;
mod json;

pub use cli::print_cli_table;
pub use json::print_json;

use crate::scanner::ScanResult;
use anyhow::Result;

/// Output format for scan results
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable table format
    Table,
    /// JSON format for programmatic use
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "table" => Ok(OutputFormat::Table),
            "json" => Ok(OutputFormat::Json),
            _ => Err(format!("Unknown format: {}. Use 'table' or 'json'", s)),
        }
    }
}

pub fn print_result(result: &ScanResult, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Table => print_cli_table(result),
        OutputFormat::Json => print_json(result),
    }
}

/// Format result to string for file output. Tables are written as JSON.
pub fn format_result_to_string(result: &ScanResult, _format: OutputFormat) -> Result<String> {
    Ok(serde_json::to_string_pretty(result)?)
}
