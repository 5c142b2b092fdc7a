use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::process::Command;

use super::MediaComposer;
use crate::config::VideoConfig;
use crate::timing::TimingPlan;
use crate::VideoError;

/// Clip composition and concatenation through the ffmpeg CLI
pub struct FfmpegComposer {
    ffmpeg_path: String,
    fps: u32,
    width: u32,
    height: u32,
    video_codec: String,
    audio_codec: String,
}

impl FfmpegComposer {
    pub fn new(video: &VideoConfig) -> Self {
        Self {
            ffmpeg_path: "ffmpeg".to_string(),
            fps: video.fps,
            width: video.width,
            height: video.height,
            video_codec: video.video_codec.clone(),
            audio_codec: video.audio_codec.clone(),
        }
    }

    /// Letterbox every image into the output frame
    fn image_filter(&self) -> String {
        format!(
            "scale={w}:{h}:force_original_aspect_ratio=decrease,pad={w}:{h}:(ow-iw)/2:(oh-ih)/2,setsar=1,fps={fps},format=yuv420p",
            w = self.width,
            h = self.height,
            fps = self.fps,
        )
    }

    fn blank_source(&self) -> String {
        format!("color=c=black:s={}x{}:r={}", self.width, self.height, self.fps)
    }

    async fn run(&self, args: &[String]) -> Result<()> {
        tracing::debug!("Running {} {}", self.ffmpeg_path, args.join(" "));

        let output = Command::new(&self.ffmpeg_path)
            .args(args)
            .output()
            .await
            .with_context(|| format!("Failed to run {}", self.ffmpeg_path))?;

        if !output.status.success() {
            let error = String::from_utf8_lossy(&output.stderr);
            let tail: Vec<&str> = error.lines().rev().take(5).collect();
            return Err(VideoError::CompositionFailed(
                tail.into_iter().rev().collect::<Vec<_>>().join("\n"),
            )
            .into());
        }

        Ok(())
    }
}

#[async_trait]
impl MediaComposer for FfmpegComposer {
    async fn compose_clip(&self, plan: &TimingPlan, audio_tracks: &[PathBuf], output: &Path) -> Result<()> {
        if audio_tracks.is_empty() {
            return Err(VideoError::SilentSegment(plan.ordinal).into());
        }

        let audio_list = output.with_extension("audio.txt");
        fs_err::write(&audio_list, audio_concat_list(audio_tracks)?)?;

        let mut args: Vec<String> = vec!["-y".into()];

        if plan.is_blank() {
            args.extend(["-f", "lavfi", "-i"].map(String::from));
            args.push(self.blank_source());
        } else {
            let image_list = output.with_extension("images.txt");
            fs_err::write(&image_list, image_concat_list(plan)?)?;
            args.extend(["-f", "concat", "-safe", "0", "-i"].map(String::from));
            args.push(image_list.to_string_lossy().into_owned());
        }

        args.extend(["-f", "concat", "-safe", "0", "-i"].map(String::from));
        args.push(audio_list.to_string_lossy().into_owned());

        if plan.is_blank() {
            args.extend(["-vf", "format=yuv420p"].map(String::from));
        } else {
            args.push("-vf".into());
            args.push(self.image_filter());
        }

        args.extend(["-map", "0:v:0", "-map", "1:a:0", "-c:v"].map(String::from));
        args.push(self.video_codec.clone());
        args.push("-c:a".into());
        args.push(self.audio_codec.clone());
        args.push("-t".into());
        args.push(format_seconds(plan.total_duration));
        args.push(output.to_string_lossy().into_owned());

        tracing::info!(
            "Composing segment #{} ({} images, {:.2}s)",
            plan.ordinal,
            plan.image_count(),
            plan.total_seconds()
        );
        self.run(&args).await
    }

    async fn concatenate(&self, clips: &[PathBuf], output: &Path) -> Result<()> {
        if clips.is_empty() {
            return Err(VideoError::NoRenderableSegments.into());
        }

        let list = output.with_extension("clips.txt");
        fs_err::write(&list, audio_concat_list(clips)?)?;

        let args: Vec<String> = vec![
            "-y".into(),
            "-f".into(),
            "concat".into(),
            "-safe".into(),
            "0".into(),
            "-i".into(),
            list.to_string_lossy().into_owned(),
            "-c".into(),
            "copy".into(),
            output.to_string_lossy().into_owned(),
        ];

        tracing::info!("Concatenating {} clips into {}", clips.len(), output.display());
        let result = self.run(&args).await;
        remove_list(&list);
        result
    }
}

/// Get the duration of a media file using ffprobe
pub async fn probe_duration_seconds(path: &Path) -> Result<f64> {
    let output = Command::new("ffprobe")
        .args([
            "-v", "quiet",
            "-print_format", "json",
            "-show_format",
            &path.to_string_lossy(),
        ])
        .output()
        .await
        .with_context(|| format!("Failed to run ffprobe for {}", path.display()))?;

    if !output.status.success() {
        let error = String::from_utf8_lossy(&output.stderr);
        anyhow::bail!("Failed to analyze file with ffprobe: {}", error);
    }

    let info: serde_json::Value = serde_json::from_slice(&output.stdout)?;
    info["format"]["duration"]
        .as_str()
        .and_then(|d| d.parse::<f64>().ok())
        .ok_or_else(|| anyhow::anyhow!("ffprobe reported no duration for {}", path.display()))
}

/// Best-effort cleanup of a concat list; failures are only logged
fn remove_list(path: &Path) {
    if let Err(e) = fs_err::remove_file(path) {
        tracing::debug!("Could not remove concat list: {}", e);
    }
}

/// Seconds with microsecond precision, the resolution ffmpeg parses
pub fn format_seconds(duration: Duration) -> String {
    format_micros(duration.as_micros())
}

fn format_micros(micros: u128) -> String {
    format!("{}.{:06}", micros / 1_000_000, micros % 1_000_000)
}

/// Quoted absolute path; the demuxer resolves relative entries against the list's directory
fn quote(path: &Path) -> Result<String> {
    let path = std::path::absolute(path)
        .with_context(|| format!("Failed to resolve {}", path.display()))?;
    Ok(format!("'{}'", path.to_string_lossy().replace('\'', r"'\''")))
}

/// Concat demuxer script showing each slot for its duration.
///
/// Durations are taken from cumulative end times, so the written values add
/// up to the plan's total at microsecond resolution.
pub fn image_concat_list(plan: &TimingPlan) -> Result<String> {
    let mut list = String::from("ffconcat version 1.0\n");
    let mut shown = Duration::ZERO;
    let mut written_micros = 0;
    for slot in &plan.slots {
        shown = shown.saturating_add(slot.duration);
        let end_micros = shown.as_micros();
        list.push_str(&format!(
            "file {}\nduration {}\n",
            quote(&slot.path)?,
            format_micros(end_micros - written_micros)
        ));
        written_micros = end_micros;
    }
    // The demuxer ignores the last duration unless the file is listed again
    if let Some(last) = plan.slots.last() {
        list.push_str(&format!("file {}\n", quote(&last.path)?));
    }
    Ok(list)
}

/// Concat demuxer script playing files back to back
pub fn audio_concat_list(files: &[PathBuf]) -> Result<String> {
    let mut list = String::from("ffconcat version 1.0\n");
    for file in files {
        list.push_str(&format!("file {}\n", quote(file)?));
    }
    Ok(list)
}
