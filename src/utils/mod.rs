use anyhow::Result;
use std::path::{Path, PathBuf};

/// Format duration in human-readable format
pub fn format_duration(seconds: f64) -> String {
    if seconds < 60.0 {
        return format!("{:.1}s", seconds);
    }

    let total_seconds = seconds as u64;
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let secs = total_seconds % 60;

    if hours > 0 {
        format!("{}h {}m {}s", hours, minutes, secs)
    } else {
        format!("{}m {}s", minutes, secs)
    }
}

/// Sanitize filename for safe filesystem usage
pub fn sanitize_filename(filename: &str) -> String {
    filename
        .chars()
        .map(|c| {
            match c {
                // Keep alphanumeric characters, spaces, hyphens, underscores, and dots
                c if c.is_alphanumeric() || c == ' ' || c == '-' || c == '_' || c == '.' => c,
                // Replace everything else with underscore
                _ => '_',
            }
        })
        .collect::<String>()
        .trim()
        .to_string()
}

/// Check if a file exists and is readable
pub fn check_file_accessible(path: &Path) -> Result<()> {
    if !path.exists() {
        anyhow::bail!("File does not exist: {}", path.display());
    }

    if !path.is_file() {
        anyhow::bail!("Path is not a file: {}", path.display());
    }

    // Try to read metadata to check permissions
    std::fs::metadata(path)
        .map_err(|e| anyhow::anyhow!("Cannot access file {}: {}", path.display(), e))?;

    Ok(())
}

/// Default video path for a script: `<output_dir>/<script stem>.mp4`
pub fn default_output_path(input: &Path, output_dir: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .and_then(|s| s.to_str())
        .map(sanitize_filename)
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "video".to_string());

    output_dir.join(format!("{}.mp4", stem))
}

/// Parse language code and return normalized version
pub fn normalize_language_code(lang: &str) -> String {
    // Common language code mappings
    let normalized = match lang.to_lowercase().as_str() {
        "en" | "english" => "en-US",
        "es" | "spanish" => "es-ES",
        "fr" | "french" => "fr-FR",
        "de" | "german" => "de-DE",
        "it" | "italian" => "it-IT",
        "pt" | "portuguese" => "pt-BR",
        "ja" | "japanese" => "ja-JP",
        "ko" | "korean" => "ko-KR",
        "zh" | "chinese" => "cmn-CN",
        "ar" | "arabic" => "arb",
        "hi" | "hindi" => "hi-IN",
        "ru" | "russian" => "ru-RU",
        _ => lang, // Return as-is if no mapping found
    };

    normalized.to_string()
}

/// Check if the current environment has required tools
pub async fn check_dependencies() -> Vec<String> {
    let mut missing = Vec::new();

    if !check_command_available("ffmpeg", "-version").await {
        missing.push("ffmpeg - required to compose and join video clips".to_string());
    }

    if !check_command_available("ffprobe", "-version").await {
        missing.push("ffprobe - required to measure narration length".to_string());
    }

    missing
}

/// Check if a command is available in PATH
async fn check_command_available(command: &str, version_flag: &str) -> bool {
    use tokio::process::Command;

    Command::new(command)
        .arg(version_flag)
        .output()
        .await
        .map(|output| output.status.success())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(4.3), "4.3s");
        assert_eq!(format_duration(30.0), "30.0s");
        assert_eq!(format_duration(90.0), "1m 30s");
        assert_eq!(format_duration(3661.0), "1h 1m 1s");
    }

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("Hello World!"), "Hello World_");
        assert_eq!(sanitize_filename("test/file?name"), "test_file_name");
        assert_eq!(sanitize_filename("  spaced  "), "spaced");
    }

    #[test]
    fn test_default_output_path() {
        let path = default_output_path(Path::new("scripts/anime story.txt"), Path::new("output"));
        assert_eq!(path, PathBuf::from("output/anime story.mp4"));

        let path = default_output_path(Path::new("notes"), Path::new("out"));
        assert_eq!(path, PathBuf::from("out/notes.mp4"));
    }

    #[test]
    fn test_normalize_language_code() {
        assert_eq!(normalize_language_code("en"), "en-US");
        assert_eq!(normalize_language_code("English"), "en-US");
        assert_eq!(normalize_language_code("es"), "es-ES");
        assert_eq!(normalize_language_code("en-GB"), "en-GB"); // Pass through
    }

    #[test]
    fn test_check_file_accessible() {
        let dir = tempfile::tempdir().unwrap();
        assert!(check_file_accessible(&dir.path().join("missing.txt")).is_err());
        assert!(check_file_accessible(dir.path()).is_err());

        let file = dir.path().join("script.txt");
        fs_err::write(&file, "text").unwrap();
        assert!(check_file_accessible(&file).is_ok());
    }
}
