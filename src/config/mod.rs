use anyhow::{Context, Result};
use aws_config::Region;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::script::{ParserOptions, DEFAULT_VOICE};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// AWS configuration
    pub aws: AwsConfig,

    /// Image search and cache settings
    pub images: ImageConfig,

    /// Output video settings
    pub video: VideoConfig,

    /// Script parsing settings
    #[serde(default)]
    pub parser: ParserOptions,

    /// Application settings
    pub app: AppConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AwsConfig {
    /// AWS region
    pub region: String,

    /// Speech synthesis settings
    pub polly: PollyConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollyConfig {
    /// Polly engine: standard, neural, long-form or generative
    pub engine: String,

    /// Language code passed with every request
    pub language_code: String,

    /// Script voice id -> Polly voice id
    pub voices: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageConfig {
    /// Cache directory, one subdirectory per keyword
    pub download_dir: PathBuf,

    /// Images downloaded per keyword on a cache miss
    pub to_download: usize,

    /// Safe search setting sent with the query ("off", "active")
    pub safe_search: String,

    /// Extra search filters ("ift:jpg" restricts results to JPEGs)
    pub search_options: String,

    /// User agent sent to the image search
    pub user_agent: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoConfig {
    /// Directory for rendered videos when no output path is given
    pub output_dir: PathBuf,

    /// Frames per second
    pub fps: u32,

    /// Frame width in pixels
    pub width: u32,

    /// Frame height in pixels
    pub height: u32,

    /// ffmpeg video codec
    pub video_codec: String,

    /// ffmpeg audio codec
    pub audio_codec: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Temporary directory for narration and clips
    pub temp_dir: Option<PathBuf>,

    /// Keep per-segment clips and narration after rendering
    pub keep_intermediate: bool,

    /// Segments processed at the same time
    pub max_concurrent_segments: usize,

    /// Seed for image selection; random when unset
    pub seed: Option<u64>,
}

/// Script voice ids and the Polly voices they map to
fn default_voices() -> BTreeMap<String, String> {
    [
        ("A", "Matthew"),
        ("B", "Joanna"),
        ("C", "Joey"),
        ("D", "Kendra"),
        ("E", "Justin"),
        ("F", "Kimberly"),
        ("G", "Salli"),
        ("H", "Ivy"),
        ("I", "Stephen"),
        ("J", "Gregory"),
        (DEFAULT_VOICE, "Matthew"),
    ]
    .into_iter()
    .map(|(id, voice)| (id.to_string(), voice.to_string()))
    .collect()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            aws: AwsConfig {
                region: "us-east-1".to_string(),
                polly: PollyConfig {
                    engine: "neural".to_string(),
                    language_code: "en-US".to_string(),
                    voices: default_voices(),
                },
            },
            images: ImageConfig {
                download_dir: PathBuf::from("downloads"),
                to_download: 20,
                safe_search: "off".to_string(),
                search_options: "ift:jpg".to_string(),
                user_agent: "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0 Safari/537.36".to_string(),
            },
            video: VideoConfig {
                output_dir: PathBuf::from("output"),
                fps: 24,
                width: 1920,
                height: 1080,
                video_codec: "libx264".to_string(),
                audio_codec: "aac".to_string(),
            },
            parser: ParserOptions::default(),
            app: AppConfig {
                temp_dir: None,
                keep_intermediate: false,
                max_concurrent_segments: 3,
                seed: None,
            },
        }
    }
}

impl Config {
    /// Load configuration from the default location or create it
    pub async fn load() -> Result<Self> {
        let config_path = Self::config_path()?;
        Self::load_from(&config_path).await
    }

    /// Load configuration from `path`, writing defaults there if it does not exist
    pub async fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = fs_err::read_to_string(path)
                .context("Failed to read config file")?;

            let config: Config = serde_yaml::from_str(&content)
                .context("Failed to parse config file")?;

            config.validate()?;
            Ok(config)
        } else {
            let config = Self::default();
            config.save_to(path).await?;
            Ok(config)
        }
    }

    /// Save configuration to `path`
    pub async fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs_err::create_dir_all(parent)?;
        }

        let content = serde_yaml::to_string(self)
            .context("Failed to serialize config")?;

        fs_err::write(path, content)
            .context("Failed to write config file")?;

        Ok(())
    }

    /// Get configuration file path
    pub fn config_path() -> Result<PathBuf> {
        // First try current directory for easy testing
        let local_config = PathBuf::from("config.yaml");
        if local_config.exists() {
            return Ok(local_config);
        }

        let config_dir = dirs::config_dir()
            .context("Could not determine config directory")?;

        Ok(config_dir.join("text-to-video").join("config.yaml"))
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.aws.region.trim().is_empty() {
            anyhow::bail!("AWS region must be configured");
        }

        if !self.aws.polly.voices.contains_key(DEFAULT_VOICE) {
            anyhow::bail!("The voice table must map the {} voice", DEFAULT_VOICE);
        }

        if self.video.fps == 0 {
            anyhow::bail!("Video fps must be greater than zero");
        }

        // yuv420p needs even dimensions
        if self.video.width == 0 || self.video.height == 0 || self.video.width % 2 != 0 || self.video.height % 2 != 0 {
            anyhow::bail!(
                "Video size must be even and non-zero, got {}x{}",
                self.video.width,
                self.video.height
            );
        }

        if self.app.max_concurrent_segments == 0 {
            anyhow::bail!("max_concurrent_segments must be at least 1");
        }

        if self.images.to_download == 0 {
            anyhow::bail!("images.to_download must be at least 1");
        }

        Ok(())
    }

    /// Display current configuration
    pub fn display(&self) {
        println!("Current Configuration:");
        println!("  AWS Region: {}", self.aws.region);
        println!("  Polly Engine: {}", self.aws.polly.engine);
        println!("  Language: {}", self.aws.polly.language_code);
        println!("  Voices: {}", self.aws.polly.voices.len());
        println!("  Image Cache: {}", self.images.download_dir.display());
        println!("  Output Dir: {}", self.video.output_dir.display());
        println!("  Video: {}x{} @ {} fps", self.video.width, self.video.height, self.video.fps);
        println!("  Default Image Count: {}", self.parser.default_image_count);
        println!("  Keep Intermediate: {}", self.app.keep_intermediate);
        println!("  Concurrent Segments: {}", self.app.max_concurrent_segments);
    }

    /// Get AWS region
    pub fn aws_region(&self) -> Region {
        Region::new(self.aws.region.clone())
    }
}
