//! Configuration for speech engines and playback

use std::collections::HashSet;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::types::AudioFormat;

/// Top-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoxRelayConfig {
    /// Per-engine settings
    #[serde(default)]
    pub engines: EnginesConfig,

    /// Playback settings
    #[serde(default)]
    pub playback: PlaybackConfig,

    /// Fallback order when no engine is requested or the requested one fails
    #[serde(default = "default_priority")]
    pub priority: Vec<String>,
}

impl Default for VoxRelayConfig {
    fn default() -> Self {
        Self {
            engines: EnginesConfig::default(),
            playback: PlaybackConfig::default(),
            priority: default_priority(),
        }
    }
}

fn default_priority() -> Vec<String> {
    [
        "voicevox",
        "aivis",
        "google_ai_tts",
        "google_cloud_tts",
        "google_cloud_chirp",
        "system",
    ]
    .iter()
    .map(ToString::to_string)
    .collect()
}

impl VoxRelayConfig {
    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn validate(&self) -> Result<(), String> {
        let mut seen = HashSet::new();
        for id in &self.priority {
            if id.trim().is_empty() {
                return Err("Priority list contains an empty engine id".to_string());
            }
            if !seen.insert(id.as_str()) {
                return Err(format!("Engine '{id}' appears twice in the priority list"));
            }
        }

        self.engines.validate()?;
        self.playback.validate()
    }
}

/// Settings for every built-in engine
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EnginesConfig {
    /// VOICEVOX local engine
    #[serde(default)]
    pub voicevox: LocalEngineConfig,

    /// AivisSpeech local engine
    #[serde(default)]
    pub aivis: LocalEngineConfig,

    /// Google Cloud Text-to-Speech (standard and Chirp voices)
    #[serde(default)]
    pub google_cloud: CloudTtsConfig,

    /// Google AI generative speech
    #[serde(default)]
    pub google_ai: GenerativeTtsConfig,

    /// OS-native synthesizer
    #[serde(default)]
    pub system: SystemEngineConfig,
}

impl EnginesConfig {
    fn validate(&self) -> Result<(), String> {
        self.voicevox.validate("voicevox")?;
        self.aivis.validate("aivis")?;
        if self.google_cloud.timeout_ms == 0 {
            return Err("google_cloud: timeout must be greater than 0".to_string());
        }
        if self.google_ai.timeout_ms == 0 {
            return Err("google_ai: timeout must be greater than 0".to_string());
        }
        if self.system.timeout_ms == 0 {
            return Err("system: timeout must be greater than 0".to_string());
        }
        Ok(())
    }
}

/// Local two-step HTTP engine settings
///
/// `base_url` and `default_speaker_id` fall back to the engine's own
/// defaults when unset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalEngineConfig {
    /// Register the engine
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Service base URL
    #[serde(default)]
    pub base_url: Option<String>,

    /// Speaker id used when a voice name cannot be resolved
    #[serde(default)]
    pub default_speaker_id: Option<u32>,

    /// Synthesis timeout in milliseconds
    #[serde(default = "default_local_timeout_ms")]
    pub timeout_ms: u64,

    /// Availability probe timeout in milliseconds
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,
}

impl Default for LocalEngineConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: None,
            default_speaker_id: None,
            timeout_ms: default_local_timeout_ms(),
            probe_timeout_ms: default_probe_timeout_ms(),
        }
    }
}

impl LocalEngineConfig {
    fn validate(&self, name: &str) -> Result<(), String> {
        if self.timeout_ms == 0 {
            return Err(format!("{name}: timeout must be greater than 0"));
        }
        if self.probe_timeout_ms == 0 || self.probe_timeout_ms > 3000 {
            return Err(format!(
                "{name}: probe timeout must be between 1 and 3000ms, got {}",
                self.probe_timeout_ms
            ));
        }
        if self
            .base_url
            .as_deref()
            .is_some_and(|url| url.trim().is_empty())
        {
            return Err(format!("{name}: base_url cannot be empty"));
        }
        Ok(())
    }
}

/// Google Cloud Text-to-Speech settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloudTtsConfig {
    /// Register the standard (Neural2/WaveNet) engine
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Register the Chirp HD engine
    #[serde(default = "default_true")]
    pub chirp_enabled: bool,

    /// `text:synthesize` endpoint
    #[serde(default = "default_cloud_endpoint")]
    pub endpoint: String,

    /// Language code used when the voice name carries no `xx-YY-` prefix
    #[serde(default = "default_language")]
    pub default_language: String,

    /// Encoding requested from the API
    #[serde(default = "default_cloud_encoding")]
    pub audio_encoding: AudioFormat,

    /// Pitch in semitones (-20.0 to 20.0), ignored by Chirp voices
    #[serde(default)]
    pub pitch: f32,

    /// Volume gain in dB (-96.0 to 16.0)
    #[serde(default)]
    pub volume_gain_db: f32,

    /// Request timeout in milliseconds
    #[serde(default = "default_cloud_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for CloudTtsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            chirp_enabled: true,
            endpoint: default_cloud_endpoint(),
            default_language: default_language(),
            audio_encoding: default_cloud_encoding(),
            pitch: 0.0,
            volume_gain_db: 0.0,
            timeout_ms: default_cloud_timeout_ms(),
        }
    }
}

/// Google AI generative speech settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerativeTtsConfig {
    /// Register the engine
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Generative Language API base URL
    #[serde(default = "default_generative_base_url")]
    pub base_url: String,

    /// Speech-capable model name
    #[serde(default = "default_generative_model")]
    pub model: String,

    /// `text:synthesize` endpoint used by the second tier
    #[serde(default = "default_cloud_endpoint")]
    pub cloud_endpoint: String,

    /// Language code for the second tier's Chirp voice
    #[serde(default = "default_language")]
    pub language: String,

    /// Per-tier request timeout in milliseconds
    #[serde(default = "default_cloud_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for GenerativeTtsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: default_generative_base_url(),
            model: default_generative_model(),
            cloud_endpoint: default_cloud_endpoint(),
            language: default_language(),
            timeout_ms: default_cloud_timeout_ms(),
        }
    }
}

/// OS-native synthesizer settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemEngineConfig {
    /// Register the engine
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Override the platform executable (`say`, `powershell`, `espeak-ng`)
    #[serde(default)]
    pub executable: Option<PathBuf>,

    /// Subprocess timeout in milliseconds
    #[serde(default = "default_cloud_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for SystemEngineConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            executable: None,
            timeout_ms: default_cloud_timeout_ms(),
        }
    }
}

/// Playback settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaybackConfig {
    /// Pause between clips in milliseconds
    #[serde(default = "default_inter_clip_delay_ms")]
    pub inter_clip_delay_ms: u64,

    /// Longest a single clip may play, in milliseconds
    #[serde(default = "default_player_timeout_ms")]
    pub player_timeout_ms: u64,

    /// Override the primary player program
    #[serde(default)]
    pub primary_player: Option<String>,

    /// Override the fallback player program
    #[serde(default)]
    pub fallback_player: Option<String>,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            inter_clip_delay_ms: default_inter_clip_delay_ms(),
            player_timeout_ms: default_player_timeout_ms(),
            primary_player: None,
            fallback_player: None,
        }
    }
}

impl PlaybackConfig {
    fn validate(&self) -> Result<(), String> {
        if self.player_timeout_ms == 0 {
            return Err("Player timeout must be greater than 0".to_string());
        }
        if self.inter_clip_delay_ms > 10_000 {
            return Err(format!(
                "Inter-clip delay must be at most 10000ms, got {}",
                self.inter_clip_delay_ms
            ));
        }
        Ok(())
    }
}

const fn default_true() -> bool {
    true
}

const fn default_local_timeout_ms() -> u64 {
    30000 // 30 seconds
}

const fn default_probe_timeout_ms() -> u64 {
    3000
}

const fn default_cloud_timeout_ms() -> u64 {
    20000
}

fn default_cloud_endpoint() -> String {
    "https://texttospeech.googleapis.com/v1/text:synthesize".to_string()
}

fn default_language() -> String {
    "ja-JP".to_string()
}

const fn default_cloud_encoding() -> AudioFormat {
    AudioFormat::Mp3
}

fn default_generative_base_url() -> String {
    "https://generativelanguage.googleapis.com".to_string()
}

fn default_generative_model() -> String {
    "gemini-2.5-flash-preview-tts".to_string()
}

const fn default_inter_clip_delay_ms() -> u64 {
    200
}

const fn default_player_timeout_ms() -> u64 {
    120_000 // 2 minutes
}
