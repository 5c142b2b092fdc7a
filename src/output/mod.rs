use anyhow::Result;
use std::path::Path;

use crate::cli::OutputFormat;
use crate::render::RenderReport;
use crate::script::ParsedScript;

pub mod formatters;

pub use formatters::*;

fn script_content(script: &ParsedScript, format: &OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Text => Ok(format_script_as_text(script)),
        OutputFormat::Json => format_script_as_json(script),
    }
}

fn report_content(report: &RenderReport, format: &OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Text => Ok(format_report_as_text(report)),
        OutputFormat::Json => format_report_as_json(report),
    }
}

fn write_file(path: &Path, content: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs_err::create_dir_all(parent)?;
    }
    fs_err::write(path, content)?;
    Ok(())
}

/// Save a parsed script to file
pub async fn save_script(script: &ParsedScript, path: &Path, format: &OutputFormat) -> Result<()> {
    write_file(path, &script_content(script, format)?)
}

/// Print a parsed script to console
pub fn print_script(script: &ParsedScript, format: &OutputFormat) -> Result<()> {
    println!("{}", script_content(script, format)?);
    Ok(())
}

/// Save a render report to file
pub async fn save_report(report: &RenderReport, path: &Path, format: &OutputFormat) -> Result<()> {
    write_file(path, &report_content(report, format)?)
}

/// Print a render report to console
pub fn print_report(report: &RenderReport, format: &OutputFormat) -> Result<()> {
    println!("{}", report_content(report, format)?);
    Ok(())
}
