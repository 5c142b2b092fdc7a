use anyhow::{Context, Result};
use async_trait::async_trait;
use aws_sdk_polly::types::{Engine, LanguageCode, OutputFormat, VoiceId};
use aws_sdk_polly::Client as PollyClient;
use aws_types::SdkConfig;
use std::collections::BTreeMap;
use std::path::Path;

use super::ffmpeg::probe_duration_seconds;
use super::{SpeechSynthesizer, SynthesizedAudio};
use crate::config::PollyConfig;
use crate::script::DEFAULT_VOICE;
use crate::utils::normalize_language_code;
use crate::VideoError;

/// Script voice ids mapped to provider voices
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoiceTable {
    voices: BTreeMap<String, String>,
}

impl VoiceTable {
    pub fn new(voices: BTreeMap<String, String>) -> Self {
        Self { voices }
    }

    /// Provider voice for `voice`; lookups ignore case
    pub fn resolve(&self, voice: &str) -> Option<&str> {
        self.voices
            .get(voice)
            .or_else(|| {
                self.voices
                    .iter()
                    .find(|(id, _)| id.eq_ignore_ascii_case(voice))
                    .map(|(_, provider)| provider)
            })
            .map(String::as_str)
    }

    pub fn contains(&self, voice: &str) -> bool {
        self.resolve(voice).is_some()
    }

    /// Script voice ids with their provider voices, sorted by id
    pub fn entries(&self) -> impl Iterator<Item = (&str, &str)> {
        self.voices.iter().map(|(id, provider)| (id.as_str(), provider.as_str()))
    }

    pub fn default_voice(&self) -> Option<&str> {
        self.resolve(DEFAULT_VOICE)
    }
}

/// Narration through AWS Polly
pub struct PollySynthesizer {
    client: PollyClient,
    engine: Engine,
    language_code: LanguageCode,
    voices: VoiceTable,
}

impl PollySynthesizer {
    pub fn new(sdk_config: &SdkConfig, polly: &PollyConfig) -> Self {
        Self {
            client: PollyClient::new(sdk_config),
            engine: Engine::from(polly.engine.as_str()),
            language_code: LanguageCode::from(normalize_language_code(&polly.language_code).as_str()),
            voices: VoiceTable::new(polly.voices.clone()),
        }
    }
}

#[async_trait]
impl SpeechSynthesizer for PollySynthesizer {
    async fn synthesize(&self, text: &str, voice: &str, output_stem: &Path) -> Result<SynthesizedAudio> {
        let provider_voice = self
            .voices
            .resolve(voice)
            .ok_or_else(|| VideoError::UnknownVoice(voice.to_string()))?;

        tracing::debug!("Synthesizing {} chars with voice {} ({})", text.len(), voice, provider_voice);

        let response = self
            .client
            .synthesize_speech()
            .text(text)
            .voice_id(VoiceId::from(provider_voice))
            .engine(self.engine.clone())
            .language_code(self.language_code.clone())
            .output_format(OutputFormat::Mp3)
            .send()
            .await
            .map_err(|e| VideoError::SynthesisFailed(e.to_string()))?;

        let audio = response
            .audio_stream
            .collect()
            .await
            .context("Failed to read synthesized audio stream")?
            .into_bytes();

        let path = output_stem.with_extension("mp3");
        fs_err::write(&path, &audio).context("Failed to write synthesized audio")?;
        tracing::info!("Audio content written to file \"{}\"", path.display());

        let duration = probe_duration_seconds(&path).await?;

        Ok(SynthesizedAudio { path, duration })
    }

    fn supports_voice(&self, voice: &str) -> bool {
        self.voices.contains(voice)
    }
}
