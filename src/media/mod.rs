use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub mod ffmpeg;
pub mod images;
pub mod speech;

use crate::timing::TimingPlan;
use crate::Result;

pub use ffmpeg::FfmpegComposer;
pub use images::ImageGrabber;
pub use speech::{PollySynthesizer, VoiceTable};

/// Narration written to disk for one voiceover unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SynthesizedAudio {
    /// Audio file on disk
    pub path: PathBuf,

    /// Length in seconds
    pub duration: f64,
}

/// Trait for finding local images for a keyword
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ImageSource: Send + Sync {
    /// Local image files for `keyword`; repeated calls within a run return the same list
    async fn search(&self, keyword: &str) -> Result<Vec<PathBuf>>;
}

/// Trait for turning text into narration
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Synthesize `text` with `voice` into a file next to `output_stem`
    async fn synthesize(&self, text: &str, voice: &str, output_stem: &Path) -> Result<SynthesizedAudio>;

    /// Whether `voice` can be synthesized
    fn supports_voice(&self, voice: &str) -> bool;
}

/// Trait for assembling clips and the final video
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MediaComposer: Send + Sync {
    /// Render one clip showing `plan`'s images over the concatenated `audio_tracks`
    async fn compose_clip(&self, plan: &TimingPlan, audio_tracks: &[PathBuf], output: &Path) -> Result<()>;

    /// Join `clips` in order into `output`
    async fn concatenate(&self, clips: &[PathBuf], output: &Path) -> Result<()>;
}
