use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "ttv",
    about = "Text to Video - Turn annotated scripts into narrated slideshow videos",
    version,
    long_about = "Reads a script marked up with [IMAGE: keyword N] and [VOICE: id]...[/VOICE] directives, fetches images for each keyword, narrates the text with AWS Polly and joins everything into one video with ffmpeg."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file (defaults to ./config.yaml or the user config directory)
    #[arg(short, long, global = true, value_name = "FILE", env = "TTV_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable progress indicators
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Write logs as JSON lines
    #[arg(long, global = true)]
    pub log_json: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Render a script into a video
    Render {
        /// Annotated script to render
        #[arg(value_name = "INPUT")]
        input: PathBuf,

        /// Output video path (defaults to <output_dir>/<input name>.mp4)
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,

        /// Number of segments rendered at the same time
        #[arg(short, long, value_name = "N")]
        jobs: Option<usize>,

        /// Seed for image selection, for repeatable renders
        #[arg(long, value_name = "N")]
        seed: Option<u64>,

        /// Narrate text that comes before the first image directive over a black frame
        #[arg(long)]
        keep_leading_text: bool,

        /// Save the render report to a file
        #[arg(long, value_name = "FILE")]
        report: Option<PathBuf>,

        /// Report format
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Show how a script will be split without rendering it
    Parse {
        /// Annotated script to parse
        #[arg(value_name = "INPUT")]
        input: PathBuf,

        /// Output file path (prints to console if not specified)
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,

        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,

        /// Keep text that comes before the first image directive
        #[arg(long)]
        keep_leading_text: bool,
    },

    /// List the voice ids a script can use
    Voices,

    /// Show or locate the configuration
    Config {
        /// Show current configuration
        #[arg(short, long)]
        show: bool,
    },
}

#[derive(ValueEnum, Clone, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    /// Plain text
    Text,
    /// JSON
    Json,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}
