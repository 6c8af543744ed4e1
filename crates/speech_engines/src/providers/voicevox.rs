//! VOICEVOX-compatible local engines
//!
//! VOICEVOX and AivisSpeech expose the same two-step HTTP API and differ only
//! in base URL, default speaker and bundled voices:
//!
//! ```text
//! POST {base}/audio_query?text=..&speaker=<id>   -> JSON synthesis parameters
//! POST {base}/synthesis?speaker=<id>  (params)   -> WAV bytes
//! GET  {base}/speakers                           -> [{name, styles:[{name,id}]}]
//! GET  {base}/version                            -> probe
//! ```
//!
//! Voice names look like `"ずんだもん(ノーマル)"`, i.e. `Speaker(Style)`. They
//! are resolved to a numeric style id through the `/speakers` table. When the
//! name is malformed or unknown the profile's default speaker is used, so a
//! bad voice name still produces audible speech.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::{debug, instrument, warn};

use crate::config::LocalEngineConfig;
use crate::error::{ConfigError, SynthesisError};
use crate::ports::SpeechEngine;
use crate::probe::HttpProbe;
use crate::speed::SpeedRange;
use crate::types::{
    AudioArtifact, AudioFormat, CostTier, Credentials, EngineDescriptor, EngineInfo, QualityTier,
};

/// `speedScale` bounds accepted by VOICEVOX-compatible engines
pub const SPEED_RANGE: SpeedRange = SpeedRange::multiplier(0.5, 2.0);

/// Static facts distinguishing one VOICEVOX-compatible engine from another
#[derive(Debug, Clone, Copy)]
pub struct LocalEngineProfile {
    /// Engine id
    pub id: &'static str,
    /// Display name
    pub name: &'static str,
    /// Short description
    pub description: &'static str,
    /// Base URL when none is configured
    pub default_base_url: &'static str,
    /// Speaker id used when a voice cannot be resolved
    pub default_speaker_id: u32,
    /// Voices reported when `/speakers` is unreachable
    pub fallback_voices: &'static [&'static str],
    /// Longest text per request
    pub max_text_length: usize,
    /// Informational quality tier
    pub quality_tier: QualityTier,
}

/// VOICEVOX on its default port
pub const VOICEVOX: LocalEngineProfile = LocalEngineProfile {
    id: "voicevox",
    name: "VOICEVOX",
    description: "Local VOICEVOX engine (free, character voices)",
    default_base_url: "http://127.0.0.1:50021",
    default_speaker_id: 3,
    fallback_voices: &[
        "ずんだもん(ノーマル)",
        "四国めたん(ノーマル)",
        "春日部つむぎ(ノーマル)",
        "雨晴はう(ノーマル)",
    ],
    max_text_length: 500,
    quality_tier: QualityTier::Standard,
};

/// AivisSpeech on its default port
pub const AIVIS: LocalEngineProfile = LocalEngineProfile {
    id: "aivis",
    name: "AivisSpeech",
    description: "Local AivisSpeech engine (free, expressive voices)",
    default_base_url: "http://127.0.0.1:10101",
    default_speaker_id: 888_753_760,
    fallback_voices: &["Anneli(ノーマル)"],
    max_text_length: 500,
    quality_tier: QualityTier::High,
};

/// Entry of the `/speakers` response
#[derive(Debug, Deserialize)]
struct Speaker {
    name: String,
    styles: Vec<SpeakerStyle>,
}

#[derive(Debug, Deserialize)]
struct SpeakerStyle {
    name: String,
    id: u32,
}

/// Voice name to style id lookup built from `/speakers`
#[derive(Debug, Default)]
pub struct SpeakerTable {
    styles: HashMap<(String, String), u32>,
    first_style: HashMap<String, u32>,
    voices: Vec<String>,
}

impl SpeakerTable {
    fn from_speakers(speakers: Vec<Speaker>) -> Self {
        let mut table = Self::default();
        for speaker in speakers {
            for style in speaker.styles {
                table
                    .first_style
                    .entry(speaker.name.clone())
                    .or_insert(style.id);
                table
                    .voices
                    .push(format!("{}({})", speaker.name, style.name));
                table
                    .styles
                    .insert((speaker.name.clone(), style.name), style.id);
            }
        }
        table
    }

    /// Resolve a voice name to a style id
    #[must_use]
    pub fn resolve(&self, voice: &str) -> Option<u32> {
        let (speaker, style) = parse_voice_name(voice)?;
        match style {
            Some(style) => self
                .styles
                .get(&(speaker.to_string(), style.to_string()))
                .copied(),
            None => self.first_style.get(speaker).copied(),
        }
    }

    /// All voices as `Speaker(Style)` strings
    #[must_use]
    pub fn voices(&self) -> &[String] {
        &self.voices
    }
}

/// Split `"Speaker(Style)"` into its parts
///
/// Accepts ASCII or full-width parentheses. A bare `"Speaker"` yields no
/// style. Returns `None` for malformed names.
#[must_use]
pub fn parse_voice_name(voice: &str) -> Option<(&str, Option<&str>)> {
    let voice = voice.trim();
    if voice.is_empty() {
        return None;
    }

    let open = voice.find(['(', '（']);
    let close_ascii = voice.ends_with(')');
    let close_wide = voice.ends_with('）');

    match open {
        None if !close_ascii && !close_wide => Some((voice, None)),
        None => None,
        Some(start) => {
            let open_len = voice[start..].chars().next().map_or(1, char::len_utf8);
            let close_len = if close_ascii {
                1
            } else if close_wide {
                '）'.len_utf8()
            } else {
                return None;
            };
            let speaker = voice[..start].trim();
            let style = voice[start + open_len..voice.len() - close_len].trim();
            if speaker.is_empty() || style.is_empty() {
                return None;
            }
            Some((speaker, Some(style)))
        },
    }
}

/// VOICEVOX-compatible local engine
#[derive(Debug)]
pub struct VoicevoxEngine {
    profile: LocalEngineProfile,
    descriptor: EngineDescriptor,
    client: Client,
    base_url: String,
    default_speaker_id: u32,
    timeout: Duration,
    lookup_timeout: Duration,
    probe: HttpProbe,
    speakers: RwLock<Option<Arc<SpeakerTable>>>,
}

impl VoicevoxEngine {
    /// Create an engine from a profile and its configuration
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::HttpClient` if the HTTP client cannot be built.
    pub fn new(profile: LocalEngineProfile, config: &LocalEngineConfig) -> Result<Self, ConfigError> {
        let client = Client::builder()
            .build()
            .map_err(|e| ConfigError::HttpClient(e.to_string()))?;

        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| profile.default_base_url.to_string())
            .trim_end_matches('/')
            .to_string();

        let lookup_timeout = Duration::from_millis(config.probe_timeout_ms);
        let probe = HttpProbe::new(client.clone(), format!("{base_url}/version"), lookup_timeout);

        let descriptor = EngineDescriptor::new(profile.id, profile.max_text_length)
            .with_probe()
            .with_tiers(CostTier::Free, profile.quality_tier);

        Ok(Self {
            profile,
            descriptor,
            client,
            base_url,
            default_speaker_id: config
                .default_speaker_id
                .unwrap_or(profile.default_speaker_id),
            timeout: Duration::from_millis(config.timeout_ms),
            lookup_timeout,
            probe,
            speakers: RwLock::new(None),
        })
    }

    /// Speaker table, fetched once and cached after the first success
    async fn speaker_table(&self) -> Result<Arc<SpeakerTable>, SynthesisError> {
        if let Some(table) = self.speakers.read().await.as_ref() {
            return Ok(Arc::clone(table));
        }

        let response = self
            .client
            .get(format!("{}/speakers", self.base_url))
            .timeout(self.lookup_timeout)
            .send()
            .await
            .map_err(|e| SynthesisError::http(&e, self.lookup_timeout))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SynthesisError::from_status(status, body));
        }

        let speakers: Vec<Speaker> = response
            .json()
            .await
            .map_err(|e| SynthesisError::MalformedResponse(format!("speakers: {e}")))?;

        let table = Arc::new(SpeakerTable::from_speakers(speakers));
        debug!(engine = self.profile.id, voices = table.voices().len(), "Speaker table loaded");
        *self.speakers.write().await = Some(Arc::clone(&table));
        Ok(table)
    }

    /// Resolve a voice name, falling back to the default speaker
    async fn resolve_speaker(&self, voice: &str) -> u32 {
        if let Ok(id) = voice.trim().parse::<u32>() {
            return id;
        }

        let resolved = match self.speaker_table().await {
            Ok(table) => table.resolve(voice),
            Err(e) => {
                warn!(engine = self.profile.id, error = %e, "Speaker lookup failed");
                None
            },
        };

        resolved.unwrap_or_else(|| {
            debug!(
                engine = self.profile.id,
                voice,
                default = self.default_speaker_id,
                "Voice not resolved, using default speaker"
            );
            self.default_speaker_id
        })
    }

    async fn audio_query(&self, text: &str, speaker: &str) -> Result<serde_json::Value, SynthesisError> {
        let response = self
            .client
            .post(format!("{}/audio_query", self.base_url))
            .query(&[("text", text), ("speaker", speaker)])
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| SynthesisError::http(&e, self.timeout))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SynthesisError::from_status(status, body));
        }

        response
            .json()
            .await
            .map_err(|e| SynthesisError::MalformedResponse(format!("audio_query: {e}")))
    }

    async fn synthesis(&self, query: &serde_json::Value, speaker: &str) -> Result<Vec<u8>, SynthesisError> {
        let response = self
            .client
            .post(format!("{}/synthesis", self.base_url))
            .query(&[("speaker", speaker)])
            .json(query)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| SynthesisError::http(&e, self.timeout))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SynthesisError::from_status(status, body));
        }

        let audio = response
            .bytes()
            .await
            .map_err(|e| SynthesisError::http(&e, self.timeout))?;
        Ok(audio.to_vec())
    }
}

#[async_trait]
impl SpeechEngine for VoicevoxEngine {
    fn descriptor(&self) -> &EngineDescriptor {
        &self.descriptor
    }

    async fn list_voices(&self) -> Vec<String> {
        match self.speaker_table().await {
            Ok(table) if !table.voices().is_empty() => table.voices().to_vec(),
            Ok(_) => self.profile.fallback_voices.iter().map(ToString::to_string).collect(),
            Err(e) => {
                debug!(engine = self.profile.id, error = %e, "Using fallback voice list");
                self.profile.fallback_voices.iter().map(ToString::to_string).collect()
            },
        }
    }

    fn describe(&self) -> EngineInfo {
        EngineInfo {
            name: self.profile.name.to_string(),
            cost_tier: self.descriptor.cost_tier,
            quality_tier: self.descriptor.quality_tier,
            description: self.profile.description.to_string(),
        }
    }

    #[instrument(skip(self, text, _credentials), fields(engine = self.profile.id, text_len = text.len()))]
    async fn synthesize(
        &self,
        text: &str,
        voice: &str,
        speed: f32,
        _credentials: &Credentials,
    ) -> Result<Vec<AudioArtifact>, SynthesisError> {
        let speaker = self.resolve_speaker(voice).await.to_string();

        let mut query = self.audio_query(text, &speaker).await?;
        let params = query.as_object_mut().ok_or_else(|| {
            SynthesisError::MalformedResponse("audio_query did not return an object".to_string())
        })?;
        params.insert(
            "speedScale".to_string(),
            serde_json::json!(SPEED_RANGE.to_native(speed)),
        );

        let audio = self.synthesis(&query, &speaker).await?;
        if audio.is_empty() {
            return Err(SynthesisError::EmptyResult);
        }

        debug!(audio_size = audio.len(), speaker = %speaker, "Local synthesis complete");

        let artifact = AudioArtifact::write(&audio, AudioFormat::Wav, self.profile.id).await?;
        Ok(vec![artifact])
    }

    async fn is_available(&self) -> bool {
        self.probe.check().await
    }
}
