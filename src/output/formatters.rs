use anyhow::Result;
use std::fmt::Write;

use crate::render::{RenderReport, SegmentReport};
use crate::script::ParsedScript;
use crate::utils::format_duration;

/// Format a parsed script as plain text
pub fn format_script_as_text(script: &ParsedScript) -> String {
    let mut output = String::new();

    if script.segments.is_empty() {
        output.push_str("No segments found.\n");
    }

    for segment in &script.segments {
        if segment.wants_images() {
            let _ = writeln!(
                output,
                "Segment #{}: {} ({} images)",
                segment.ordinal, segment.image_keyword, segment.image_count
            );
        } else {
            let _ = writeln!(output, "Segment #{}: (no images)", segment.ordinal);
        }

        for unit in &segment.voiceover_units {
            let _ = writeln!(output, "  [{}] {}", unit.voice, unit.text);
        }
    }

    if !script.diagnostics.is_empty() {
        output.push_str("\nWarnings:\n");
        for diagnostic in &script.diagnostics {
            let _ = writeln!(output, "  - {}", diagnostic);
        }
    }

    output.trim_end().to_string()
}

/// Format a parsed script as JSON
pub fn format_script_as_json(script: &ParsedScript) -> Result<String> {
    Ok(serde_json::to_string_pretty(script)?)
}

/// Format a render report as plain text
pub fn format_report_as_text(report: &RenderReport) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "Video: {}", report.output.display());
    let _ = writeln!(output, "Duration: {}", format_duration(report.total_duration_seconds));
    let _ = writeln!(
        output,
        "Segments: {} rendered, {} skipped",
        report.rendered_count(),
        report.skipped_count()
    );

    for segment in &report.segments {
        match segment {
            SegmentReport::Rendered {
                ordinal,
                image_keyword,
                image_count,
                duration_seconds,
                ..
            } => {
                let _ = writeln!(
                    output,
                    "  #{:<3} {:<24} {} images, {}",
                    ordinal,
                    keyword_label(image_keyword),
                    image_count,
                    format_duration(*duration_seconds)
                );
            }
            SegmentReport::Skipped {
                ordinal,
                image_keyword,
                reason,
            } => {
                let _ = writeln!(
                    output,
                    "  #{:<3} {:<24} skipped: {}",
                    ordinal,
                    keyword_label(image_keyword),
                    reason
                );
            }
        }
    }

    let _ = write!(output, "Run {} finished at {}", report.run_id, report.completed_at.to_rfc3339());
    output
}

/// Format a render report as JSON
pub fn format_report_as_json(report: &RenderReport) -> Result<String> {
    Ok(serde_json::to_string_pretty(report)?)
}

fn keyword_label(keyword: &str) -> &str {
    if keyword.is_empty() {
        "(blank)"
    } else {
        keyword
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::{ParserOptions, ScriptParser};
    use std::path::PathBuf;

    fn script() -> ParsedScript {
        ScriptParser::new(ParserOptions::default())
            .unwrap()
            .parse("Intro. [IMAGE: cats2] Hello [VOICE: B]there[/VOICE]")
    }

    #[test]
    fn test_script_text_lists_units_and_warnings() {
        let text = format_script_as_text(&script());
        assert!(text.starts_with("Segment #1: cats (2 images)"));
        assert!(text.contains("  [DEFAULT] Hello"));
        assert!(text.contains("  [B] there"));
        assert!(text.contains("Warnings:"));
        assert!(text.contains("Intro."));
    }

    #[test]
    fn test_script_json_carries_diagnostic_kind() {
        let json: serde_json::Value = serde_json::from_str(&format_script_as_json(&script()).unwrap()).unwrap();
        assert_eq!(json["segments"][0]["image_keyword"], "cats");
        assert_eq!(json["segments"][0]["image_count"], 2);
        assert_eq!(json["diagnostics"][0]["kind"], "leading_text_dropped");
    }

    #[test]
    fn test_report_text() {
        let report = RenderReport {
            run_id: "run-1".to_string(),
            output: PathBuf::from("output/story.mp4"),
            total_duration_seconds: 7.5,
            segments: vec![
                SegmentReport::Rendered {
                    ordinal: 1,
                    image_keyword: "cats".to_string(),
                    image_count: 3,
                    duration_seconds: 7.5,
                    clip: None,
                },
                SegmentReport::Skipped {
                    ordinal: 2,
                    image_keyword: "dogs".to_string(),
                    reason: "Unknown voice: Z".to_string(),
                },
            ],
            completed_at: chrono::Utc::now(),
        };

        let text = format_report_as_text(&report);
        assert!(text.contains("Video: output/story.mp4"));
        assert!(text.contains("Duration: 7.5s"));
        assert!(text.contains("1 rendered, 1 skipped"));
        assert!(text.contains("skipped: Unknown voice: Z"));

        let json: serde_json::Value = serde_json::from_str(&format_report_as_json(&report).unwrap()).unwrap();
        assert_eq!(json["segments"][1]["status"], "skipped");
        assert_eq!(json["run_id"], "run-1");
    }
}
