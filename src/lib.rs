//! Text to Video - A Rust CLI tool for turning annotated scripts into narrated slideshows
//!
//! This library parses scripts carrying inline `[IMAGE: ...]` and `[VOICE: ...]` directives,
//! fetches matching images, synthesizes the narration with AWS Polly and assembles the
//! result into a single video with ffmpeg.

pub mod cli;
pub mod config;
pub mod media;
pub mod output;
pub mod render;
pub mod script;
pub mod timing;
pub mod utils;

pub use cli::{Cli, Commands, OutputFormat};
pub use config::Config;
pub use media::{ImageSource, MediaComposer, SpeechSynthesizer, SynthesizedAudio};
pub use render::{RenderPipeline, RenderReport, SegmentReport};
pub use script::{ParsedScript, ParserOptions, ScriptParser, Segment, VoiceoverUnit};
pub use timing::{synchronize, ImageSlot, TimingPlan};

/// Result type used throughout the library
pub type Result<T> = anyhow::Result<T>;

/// Error types specific to video generation
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum VideoError {
    #[error("No renderable segments: every segment failed or the script has no [IMAGE: ...] directives")]
    NoRenderableSegments,

    #[error("No images available for keyword '{keyword}' ({requested} requested)")]
    NoImages { keyword: String, requested: u32 },

    #[error("Invalid audio duration: {0}")]
    InvalidDuration(f64),

    #[error("Expected {expected} audio durations, got {actual}")]
    AudioCountMismatch { expected: usize, actual: usize },

    #[error("Segment #{0} has no narration to time images against")]
    SilentSegment(usize),

    #[error("Unknown voice: {0}")]
    UnknownVoice(String),

    #[error("Image search failed: {0}")]
    ImageSearchFailed(String),

    #[error("Speech synthesis failed: {0}")]
    SynthesisFailed(String),

    #[error("Video composition failed: {0}")]
    CompositionFailed(String),
}
