use anyhow::{Context, Result};
use futures_util::stream::{self, StreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use uuid::Uuid;

use crate::config::Config;
use crate::media::{FfmpegComposer, ImageGrabber, ImageSource, MediaComposer, PollySynthesizer, SpeechSynthesizer};
use crate::script::{Segment, DEFAULT_VOICE};
use crate::timing::{synchronize, TimingPlan};
use crate::VideoError;

/// Outcome of rendering one segment
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SegmentReport {
    Rendered {
        ordinal: usize,
        image_keyword: String,
        image_count: usize,
        duration_seconds: f64,
        /// Only set when intermediate files are kept
        clip: Option<PathBuf>,
    },
    Skipped {
        ordinal: usize,
        image_keyword: String,
        reason: String,
    },
}

impl SegmentReport {
    pub fn ordinal(&self) -> usize {
        match self {
            SegmentReport::Rendered { ordinal, .. } | SegmentReport::Skipped { ordinal, .. } => *ordinal,
        }
    }

    pub fn is_rendered(&self) -> bool {
        matches!(self, SegmentReport::Rendered { .. })
    }
}

/// Summary of a finished render
#[derive(Debug, Clone, Serialize)]
pub struct RenderReport {
    pub run_id: String,

    /// The video that was written
    pub output: PathBuf,

    /// Length of the video in seconds
    pub total_duration_seconds: f64,

    /// One entry per segment, in ordinal order
    pub segments: Vec<SegmentReport>,

    pub completed_at: chrono::DateTime<chrono::Utc>,
}

impl RenderReport {
    pub fn rendered_count(&self) -> usize {
        self.segments.iter().filter(|s| s.is_rendered()).count()
    }

    pub fn skipped_count(&self) -> usize {
        self.segments.len() - self.rendered_count()
    }
}

struct RenderedClip {
    path: PathBuf,
    plan: TimingPlan,
}

/// Main rendering pipeline
pub struct RenderPipeline {
    config: Config,
    images: Arc<dyn ImageSource>,
    speech: Arc<dyn SpeechSynthesizer>,
    composer: Arc<dyn MediaComposer>,
    work_dir: PathBuf,
    // Removes the work dir on drop unless intermediates are kept
    _temp_dir: Option<TempDir>,
    show_progress: bool,
}

impl RenderPipeline {
    /// Create a pipeline backed by Polly, the image grabber and ffmpeg
    pub async fn new(config: Config) -> Result<Self> {
        // Load AWS configuration
        let aws_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(config.aws_region())
            .load()
            .await;

        let speech = PollySynthesizer::new(&aws_config, &config.aws.polly);
        let images = ImageGrabber::new(&config.images)?;
        let composer = FfmpegComposer::new(&config.video);

        Self::with_collaborators(config, Arc::new(images), Arc::new(speech), Arc::new(composer))
    }

    /// Create a pipeline from explicit collaborators
    pub fn with_collaborators(
        config: Config,
        images: Arc<dyn ImageSource>,
        speech: Arc<dyn SpeechSynthesizer>,
        composer: Arc<dyn MediaComposer>,
    ) -> Result<Self> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("ttv-");
        let temp_dir = match &config.app.temp_dir {
            Some(base) => {
                fs_err::create_dir_all(base)?;
                builder.tempdir_in(base)
            }
            None => builder.tempdir(),
        }
        .context("Failed to create temporary directory")?;

        let (work_dir, guard) = if config.app.keep_intermediate {
            let path = temp_dir.into_path();
            tracing::info!("Keeping intermediate files in {}", path.display());
            (path, None)
        } else {
            (temp_dir.path().to_path_buf(), Some(temp_dir))
        };
        // Concat lists written here name their files by absolute path
        let work_dir = fs_err::canonicalize(&work_dir)?;

        Ok(Self {
            config,
            images,
            speech,
            composer,
            work_dir,
            _temp_dir: guard,
            show_progress: true,
        })
    }

    /// Toggle the progress bar
    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    /// Directory holding narration and clips for this run
    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    /// Render `segments` into one video at `output`.
    ///
    /// Segments are processed concurrently up to `max_concurrent_segments` and
    /// joined in ordinal order. A segment that fails is skipped; if none
    /// succeed nothing is written and [`VideoError::NoRenderableSegments`] is
    /// returned.
    pub async fn render(&self, segments: &[Segment], output: &Path) -> Result<RenderReport> {
        let run_id = Uuid::new_v4().to_string();
        tracing::info!("Rendering {} segments (run {})", segments.len(), run_id);

        let progress = self.progress_bar(segments.len() as u64);

        let outcomes: Vec<(SegmentReport, Option<PathBuf>)> = stream::iter(segments)
            .map(|segment| {
                let progress = &progress;
                async move {
                    let outcome = self.render_segment(segment).await;
                    progress.inc(1);
                    outcome
                }
            })
            .buffered(self.config.app.max_concurrent_segments.max(1))
            .collect()
            .await;

        progress.finish_and_clear();

        let (reports, clips): (Vec<SegmentReport>, Vec<Option<PathBuf>>) = outcomes.into_iter().unzip();
        let clips: Vec<PathBuf> = clips.into_iter().flatten().collect();

        if clips.is_empty() {
            return Err(VideoError::NoRenderableSegments.into());
        }

        if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs_err::create_dir_all(parent)?;
        }

        self.composer
            .concatenate(&clips, output)
            .await
            .context("Failed to join rendered segments")?;
        tracing::info!("Video saved to {}", output.display());

        let total_duration_seconds = reports
            .iter()
            .map(|report| match report {
                SegmentReport::Rendered { duration_seconds, .. } => *duration_seconds,
                SegmentReport::Skipped { .. } => 0.0,
            })
            .sum();

        Ok(RenderReport {
            run_id,
            output: output.to_path_buf(),
            total_duration_seconds,
            segments: reports,
            completed_at: chrono::Utc::now(),
        })
    }

    async fn render_segment(&self, segment: &Segment) -> (SegmentReport, Option<PathBuf>) {
        match self.try_render_segment(segment).await {
            Ok(clip) => {
                let report = SegmentReport::Rendered {
                    ordinal: segment.ordinal,
                    image_keyword: segment.image_keyword.clone(),
                    image_count: clip.plan.image_count(),
                    duration_seconds: clip.plan.total_seconds(),
                    clip: self.config.app.keep_intermediate.then(|| clip.path.clone()),
                };
                (report, Some(clip.path))
            }
            Err(e) => {
                tracing::error!("Error generating video segment #{}: {:#}", segment.ordinal, e);
                let report = SegmentReport::Skipped {
                    ordinal: segment.ordinal,
                    image_keyword: segment.image_keyword.clone(),
                    reason: format!("{:#}", e),
                };
                (report, None)
            }
        }
    }

    async fn try_render_segment(&self, segment: &Segment) -> Result<RenderedClip> {
        tracing::info!("Generating video segment #{}", segment.ordinal);

        let images = if segment.wants_images() {
            self.images.search(&segment.image_keyword).await?
        } else {
            Vec::new()
        };

        // Checked before synthesis so no narration is paid for
        if segment.wants_images() && images.is_empty() {
            return Err(VideoError::NoImages {
                keyword: segment.image_keyword.clone(),
                requested: segment.image_count,
            }
            .into());
        }

        let mut tracks = Vec::with_capacity(segment.voiceover_units.len());
        let mut durations = Vec::with_capacity(segment.voiceover_units.len());
        for (index, unit) in segment.voiceover_units.iter().enumerate() {
            let stem = self
                .work_dir
                .join(format!("segment_{:03}_voice_{:02}", segment.ordinal, index + 1));
            let voice = if self.speech.supports_voice(&unit.voice) {
                unit.voice.as_str()
            } else {
                tracing::warn!(
                    "Voice '{}' in segment #{} is not configured, using {}",
                    unit.voice,
                    segment.ordinal,
                    DEFAULT_VOICE
                );
                DEFAULT_VOICE
            };
            let audio = self.speech.synthesize(&unit.text, voice, &stem).await?;
            durations.push(audio.duration);
            tracks.push(audio.path);
        }

        let plan = {
            let mut rng = self.rng_for(segment.ordinal);
            synchronize(segment, &durations, &images, &mut rng)?
        };

        if plan.total_duration.is_zero() {
            return Err(VideoError::SilentSegment(segment.ordinal).into());
        }

        let path = self.work_dir.join(format!("segment_{:03}.mp4", segment.ordinal));
        self.composer.compose_clip(&plan, &tracks, &path).await?;

        Ok(RenderedClip { path, plan })
    }

    fn rng_for(&self, ordinal: usize) -> StdRng {
        match self.config.app.seed {
            Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(ordinal as u64)),
            None => StdRng::from_entropy(),
        }
    }

    fn progress_bar(&self, len: u64) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }

        let progress = ProgressBar::new(len);
        progress.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} segments")
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );
        progress
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::{MockImageSource, MockMediaComposer, MockSpeechSynthesizer, SynthesizedAudio};
    use crate::script::{ParserOptions, ScriptParser};
    use async_trait::async_trait;
    use std::time::Duration;

    const SCRIPT: &str = "[IMAGE: cats]A cat sat.[IMAGE: broken2]Nothing here.[IMAGE: dogs3][VOICE: B]A dog ran.[/VOICE]";

    fn segments(text: &str) -> Vec<Segment> {
        ScriptParser::new(ParserOptions::default()).unwrap().build_segments(text)
    }

    fn config(dir: &Path) -> Config {
        let mut config = Config::default();
        config.app.temp_dir = Some(dir.join("work"));
        config.app.seed = Some(42);
        config
    }

    fn images() -> MockImageSource {
        let mut images = MockImageSource::new();
        images.expect_search().returning(|keyword| match keyword {
            "broken" => Err(VideoError::ImageSearchFailed("offline".to_string()).into()),
            "empty" => Ok(Vec::new()),
            other => Ok((1..=4).map(|i| PathBuf::from(format!("/cache/{}/image_{}.jpg", other, i))).collect()),
        });
        images
    }

    fn speech() -> MockSpeechSynthesizer {
        let mut speech = MockSpeechSynthesizer::new();
        speech.expect_supports_voice().returning(|voice| voice != "Z");
        speech.expect_synthesize().returning(|_, _, stem| {
            Ok(SynthesizedAudio {
                path: stem.with_extension("mp3"),
                duration: 1.5,
            })
        });
        speech
    }

    fn composer(expected_clips: usize) -> MockMediaComposer {
        let mut composer = MockMediaComposer::new();
        composer.expect_compose_clip().returning(|_, _, _| Ok(()));
        composer
            .expect_concatenate()
            .times(1)
            .withf(move |clips, _| clips.len() == expected_clips)
            .returning(|_, _| Ok(()));
        composer
    }

    #[tokio::test]
    async fn test_failed_segment_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = RenderPipeline::with_collaborators(
            config(dir.path()),
            Arc::new(images()),
            Arc::new(speech()),
            Arc::new(composer(2)),
        )
        .unwrap()
        .with_progress(false);

        let report = pipeline
            .render(&segments(SCRIPT), &dir.path().join("out").join("video.mp4"))
            .await
            .unwrap();

        let ordinals: Vec<usize> = report.segments.iter().map(SegmentReport::ordinal).collect();
        assert_eq!(ordinals, vec![1, 2, 3]);
        assert_eq!(report.rendered_count(), 2);
        assert_eq!(report.skipped_count(), 1);
        assert!(matches!(
            &report.segments[1],
            SegmentReport::Skipped { reason, .. } if reason.contains("offline")
        ));
        assert_eq!(report.total_duration_seconds, 3.0);
        assert!(dir.path().join("out").exists());
    }

    #[tokio::test]
    async fn test_all_segments_failing_is_a_distinct_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut composer = MockMediaComposer::new();
        composer.expect_concatenate().times(0);

        let pipeline = RenderPipeline::with_collaborators(
            config(dir.path()),
            Arc::new(images()),
            Arc::new(speech()),
            Arc::new(composer),
        )
        .unwrap()
        .with_progress(false);

        let err = pipeline
            .render(&segments("[IMAGE: broken] a [IMAGE: empty] b"), &dir.path().join("video.mp4"))
            .await
            .unwrap_err();

        assert_eq!(err.downcast_ref::<VideoError>(), Some(&VideoError::NoRenderableSegments));
        assert!(!dir.path().join("video.mp4").exists());
    }

    #[tokio::test]
    async fn test_missing_images_skip_before_synthesis() {
        let dir = tempfile::tempdir().unwrap();
        let mut speech = MockSpeechSynthesizer::new();
        speech.expect_supports_voice().returning(|_| true);
        speech.expect_synthesize().times(0);

        let pipeline = RenderPipeline::with_collaborators(
            config(dir.path()),
            Arc::new(images()),
            Arc::new(speech),
            Arc::new(MockMediaComposer::new()),
        )
        .unwrap()
        .with_progress(false);

        let (report, clip) = pipeline.render_segment(&segments("[IMAGE: empty] words")[0]).await;
        assert!(clip.is_none());
        assert!(matches!(
            report,
            SegmentReport::Skipped { reason, .. } if reason.contains("No images available for keyword 'empty'")
        ));
    }

    #[tokio::test]
    async fn test_unknown_voice_reads_with_default_voice() {
        let dir = tempfile::tempdir().unwrap();
        let mut speech = MockSpeechSynthesizer::new();
        speech.expect_supports_voice().returning(|voice| voice != "Z");
        speech.expect_synthesize().times(1).returning(|text, voice, stem| {
            assert_eq!(text, "Who am I?");
            assert_eq!(voice, DEFAULT_VOICE);
            Ok(SynthesizedAudio {
                path: stem.with_extension("mp3"),
                duration: 2.0,
            })
        });
        let mut composer = MockMediaComposer::new();
        composer.expect_compose_clip().times(1).returning(|_, _, _| Ok(()));

        let pipeline = RenderPipeline::with_collaborators(
            config(dir.path()),
            Arc::new(images()),
            Arc::new(speech),
            Arc::new(composer),
        )
        .unwrap()
        .with_progress(false);

        let (report, clip) = pipeline
            .render_segment(&segments("[IMAGE: cats][VOICE: Z]Who am I?[/VOICE]")[0])
            .await;
        assert!(report.is_rendered());
        assert!(clip.is_some());
    }

    #[test]
    fn test_work_dir_is_canonical() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config(dir.path());
        config.app.temp_dir = Some(dir.path().join("work").join(".."));

        let pipeline = RenderPipeline::with_collaborators(
            config,
            Arc::new(MockImageSource::new()),
            Arc::new(MockSpeechSynthesizer::new()),
            Arc::new(MockMediaComposer::new()),
        )
        .unwrap();
        assert!(pipeline.work_dir().is_absolute());
        assert!(!pipeline.work_dir().components().any(|c| c == std::path::Component::ParentDir));
    }

    #[tokio::test]
    async fn test_clip_timing_matches_narration() {
        let dir = tempfile::tempdir().unwrap();
        let mut composer = MockMediaComposer::new();
        composer
            .expect_compose_clip()
            .times(1)
            .withf(|plan, tracks, output| {
                let shown: Duration = plan.slots.iter().map(|slot| slot.duration).sum();
                plan.image_count() == 3
                    && shown == plan.total_duration
                    && plan.total_duration == Duration::from_secs(3)
                    && tracks.len() == 2
                    && tracks[0].ends_with("segment_001_voice_01.mp3")
                    && output.ends_with("segment_001.mp4")
            })
            .returning(|_, _, _| Ok(()));

        let pipeline = RenderPipeline::with_collaborators(
            config(dir.path()),
            Arc::new(images()),
            Arc::new(speech()),
            Arc::new(composer),
        )
        .unwrap()
        .with_progress(false);

        let (report, clip) = pipeline
            .render_segment(&segments("[IMAGE: owls3] Hoot. [VOICE: A]Who?[/VOICE]")[0])
            .await;
        assert!(report.is_rendered());
        assert!(clip.is_some());
    }

    /// Answers later keywords first to shuffle completion order
    struct SlowImages;

    #[async_trait]
    impl ImageSource for SlowImages {
        async fn search(&self, keyword: &str) -> Result<Vec<PathBuf>> {
            let delay = match keyword {
                "first" => 60,
                "second" => 30,
                _ => 0,
            };
            tokio::time::sleep(Duration::from_millis(delay)).await;
            Ok(vec![PathBuf::from(format!("/cache/{}.jpg", keyword))])
        }
    }

    #[tokio::test]
    async fn test_clips_join_in_ordinal_order() {
        let dir = tempfile::tempdir().unwrap();
        let mut composer = MockMediaComposer::new();
        composer.expect_compose_clip().returning(|_, _, _| Ok(()));
        composer
            .expect_concatenate()
            .times(1)
            .withf(|clips, _| {
                clips.len() == 3
                    && clips[0].ends_with("segment_001.mp4")
                    && clips[1].ends_with("segment_002.mp4")
                    && clips[2].ends_with("segment_003.mp4")
            })
            .returning(|_, _| Ok(()));

        let pipeline = RenderPipeline::with_collaborators(
            config(dir.path()),
            Arc::new(SlowImages),
            Arc::new(speech()),
            Arc::new(composer),
        )
        .unwrap()
        .with_progress(false);

        let report = pipeline
            .render(
                &segments("[IMAGE: first] one [IMAGE: second] two [IMAGE: third] three"),
                &dir.path().join("video.mp4"),
            )
            .await
            .unwrap();
        assert_eq!(report.rendered_count(), 3);
    }

    #[test]
    fn test_work_dir_removed_unless_kept() {
        let dir = tempfile::tempdir().unwrap();
        let build = |config: Config| {
            RenderPipeline::with_collaborators(
                config,
                Arc::new(MockImageSource::new()),
                Arc::new(MockSpeechSynthesizer::new()),
                Arc::new(MockMediaComposer::new()),
            )
            .unwrap()
        };

        let pipeline = build(config(dir.path()));
        let work_dir = pipeline.work_dir().to_path_buf();
        assert!(work_dir.exists());
        drop(pipeline);
        assert!(!work_dir.exists());

        let mut kept = config(dir.path());
        kept.app.keep_intermediate = true;
        let pipeline = build(kept);
        let work_dir = pipeline.work_dir().to_path_buf();
        drop(pipeline);
        assert!(work_dir.exists());
    }
}
