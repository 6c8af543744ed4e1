//! Types for speech synthesis
//!
//! Contains the synthesis request, credentials, engine descriptors and the
//! audio artifacts engines hand back to the caller.

use std::collections::HashMap;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tempfile::TempPath;

use crate::error::RequestError;
use crate::text::LengthUnit;

/// Credential key for the Google AI (Gemini) API
pub const GOOGLE_AI_API_KEY: &str = "google_ai_api_key";

/// Credential key for the Google Cloud Text-to-Speech API
pub const GOOGLE_CLOUD_API_KEY: &str = "google_cloud_api_key";

/// Audio formats engines produce
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioFormat {
    /// WAV (PCM)
    Wav,
    /// MP3
    Mp3,
}

impl AudioFormat {
    /// Get the file extension for this audio format
    #[must_use]
    pub const fn extension(&self) -> &'static str {
        match self {
            Self::Wav => "wav",
            Self::Mp3 => "mp3",
        }
    }

    /// Get the MIME type for this audio format
    #[must_use]
    pub const fn mime_type(&self) -> &'static str {
        match self {
            Self::Wav => "audio/wav",
            Self::Mp3 => "audio/mpeg",
        }
    }
}

/// One synthesized clip backed by a file on disk
///
/// The artifact exclusively owns its file. Consuming methods ([`dispose`],
/// [`persist_to`]) take `self`, so a clip cannot be deleted twice. An artifact
/// that is dropped without being consumed removes its file.
///
/// [`dispose`]: AudioArtifact::dispose
/// [`persist_to`]: AudioArtifact::persist_to
pub struct AudioArtifact {
    path: TempPath,
    format: AudioFormat,
    engine_id: String,
}

impl fmt::Debug for AudioArtifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AudioArtifact")
            .field("path", &self.path.display())
            .field("format", &self.format)
            .field("engine_id", &self.engine_id)
            .finish()
    }
}

impl AudioArtifact {
    /// Reserve an empty backing file for an engine to write into
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the temp file cannot be created.
    pub fn reserve(format: AudioFormat, engine_id: impl Into<String>) -> io::Result<Self> {
        let file = tempfile::Builder::new()
            .prefix("voxrelay-")
            .suffix(&format!(".{}", format.extension()))
            .tempfile()?;

        Ok(Self {
            path: file.into_temp_path(),
            format,
            engine_id: engine_id.into(),
        })
    }

    /// Write audio bytes into a new artifact
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the file cannot be created or written.
    pub async fn write(
        data: &[u8],
        format: AudioFormat,
        engine_id: impl Into<String>,
    ) -> io::Result<Self> {
        let artifact = Self::reserve(format, engine_id)?;
        tokio::fs::write(artifact.path(), data).await?;
        Ok(artifact)
    }

    /// Path of the backing file
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Audio format of the clip
    #[must_use]
    pub const fn format(&self) -> AudioFormat {
        self.format
    }

    /// Id of the engine that produced the clip
    #[must_use]
    pub fn engine_id(&self) -> &str {
        &self.engine_id
    }

    /// Delete the backing file
    ///
    /// # Errors
    ///
    /// Returns the I/O error from the removal. The artifact is consumed either way.
    pub fn dispose(self) -> io::Result<()> {
        self.path.close()
    }

    /// Copy the clip to `dest` and delete the backing file
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the copy fails. The temp file is still removed.
    pub async fn persist_to(self, dest: &Path) -> io::Result<PathBuf> {
        let copied = tokio::fs::copy(self.path(), dest).await;
        let disposed = self.dispose();
        copied?;
        disposed?;
        Ok(dest.to_path_buf())
    }
}

/// Opaque per-request secrets keyed by credential name
///
/// Values are never logged; `Debug` shows a short redacted prefix only.
#[derive(Clone, Default)]
pub struct Credentials {
    secrets: HashMap<String, SecretString>,
}

impl Credentials {
    /// Create an empty credential set
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a credential, builder style
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    /// Add or replace a credential
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.secrets
            .insert(key.into(), SecretString::from(value.into()));
    }

    /// Look up a non-blank credential
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&SecretString> {
        self.secrets
            .get(key)
            .filter(|secret| !secret.expose_secret().trim().is_empty())
    }

    /// Check whether a non-blank credential is present
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Number of stored credentials
    #[must_use]
    pub fn len(&self) -> usize {
        self.secrets.len()
    }

    /// Whether no credentials are stored
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.secrets.is_empty()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<&String> = self.secrets.keys().collect();
        keys.sort();
        let mut map = f.debug_map();
        for key in keys {
            map.entry(key, &redact(self.secrets[key].expose_secret()));
        }
        map.finish()
    }
}

/// Short diagnostic prefix of a secret
#[must_use]
pub fn redact(secret: &str) -> String {
    let prefix: String = secret.chars().take(4).collect();
    if secret.chars().count() > 8 {
        format!("{prefix}…")
    } else {
        "[REDACTED]".to_string()
    }
}

/// One synthesis request, owned by the caller and never mutated by the core
#[derive(Debug, Clone)]
pub struct SynthesisRequest {
    text: String,
    voice_model: String,
    speed: f32,
    preferred_engine: Option<String>,
    credentials: Credentials,
}

impl SynthesisRequest {
    /// Create a request with default speed and no preferred engine
    ///
    /// # Errors
    ///
    /// Returns `RequestError::EmptyText` for empty or whitespace-only text.
    pub fn new(
        text: impl Into<String>,
        voice_model: impl Into<String>,
    ) -> Result<Self, RequestError> {
        let text = text.into();
        if text.trim().is_empty() {
            return Err(RequestError::EmptyText);
        }

        Ok(Self {
            text,
            voice_model: voice_model.into(),
            speed: 1.0,
            preferred_engine: None,
            credentials: Credentials::default(),
        })
    }

    /// Set the speed multiplier
    ///
    /// Positive values outside an engine's range are accepted here and
    /// clamped by the engine.
    ///
    /// # Errors
    ///
    /// Returns `RequestError::InvalidSpeed` for zero, negative or non-finite values.
    pub fn with_speed(mut self, speed: f32) -> Result<Self, RequestError> {
        if !speed.is_finite() || speed <= 0.0 {
            return Err(RequestError::InvalidSpeed(speed));
        }
        self.speed = speed;
        Ok(self)
    }

    /// Request a specific engine to be tried first
    #[must_use]
    pub fn with_preferred_engine(mut self, engine_id: impl Into<String>) -> Self {
        self.preferred_engine = Some(engine_id.into());
        self
    }

    /// Attach credentials
    #[must_use]
    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = credentials;
        self
    }

    /// Text to synthesize
    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Engine-specific voice identifier
    #[must_use]
    pub fn voice_model(&self) -> &str {
        &self.voice_model
    }

    /// Speed multiplier
    #[must_use]
    pub const fn speed(&self) -> f32 {
        self.speed
    }

    /// Preferred engine id, if any
    #[must_use]
    pub fn preferred_engine(&self) -> Option<&str> {
        self.preferred_engine.as_deref()
    }

    /// Request credentials
    #[must_use]
    pub const fn credentials(&self) -> &Credentials {
        &self.credentials
    }
}

/// Informational cost tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CostTier {
    /// Runs locally, no per-request cost
    Free,
    /// Billed per character
    Paid,
    /// Preview API, free quota with billing beyond it
    Metered,
}

impl fmt::Display for CostTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Free => write!(f, "free"),
            Self::Paid => write!(f, "paid"),
            Self::Metered => write!(f, "metered"),
        }
    }
}

/// Informational quality tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityTier {
    /// Robotic but always available
    Basic,
    /// Natural sounding
    Standard,
    /// Expressive, near-human
    High,
}

impl fmt::Display for QualityTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Basic => write!(f, "basic"),
            Self::Standard => write!(f, "standard"),
            Self::High => write!(f, "high"),
        }
    }
}

/// Static facts about an engine, fixed for the process lifetime
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineDescriptor {
    /// Unique engine id
    pub id: String,
    /// Longest text accepted in one synthesize call, in `length_unit`
    pub max_text_length: usize,
    /// Unit `max_text_length` is measured in
    pub length_unit: LengthUnit,
    /// Credential key the engine needs, if any
    pub credential: Option<String>,
    /// Whether the orchestrator must probe before synthesizing
    pub requires_availability_probe: bool,
    /// Informational cost tier
    pub cost_tier: CostTier,
    /// Informational quality tier
    pub quality_tier: QualityTier,
}

impl EngineDescriptor {
    /// Create a descriptor for a free, standard-quality engine
    pub fn new(id: impl Into<String>, max_text_length: usize) -> Self {
        Self {
            id: id.into(),
            max_text_length,
            length_unit: LengthUnit::Chars,
            credential: None,
            requires_availability_probe: false,
            cost_tier: CostTier::Free,
            quality_tier: QualityTier::Standard,
        }
    }

    /// Require a credential
    #[must_use]
    pub fn with_credential(mut self, key: impl Into<String>) -> Self {
        self.credential = Some(key.into());
        self
    }

    /// Measure `max_text_length` in UTF-8 bytes
    #[must_use]
    pub const fn with_byte_limit(mut self) -> Self {
        self.length_unit = LengthUnit::Bytes;
        self
    }

    /// Require an availability probe before each attempt
    #[must_use]
    pub const fn with_probe(mut self) -> Self {
        self.requires_availability_probe = true;
        self
    }

    /// Set the informational tiers
    #[must_use]
    pub const fn with_tiers(mut self, cost: CostTier, quality: QualityTier) -> Self {
        self.cost_tier = cost;
        self.quality_tier = quality;
        self
    }

    /// Whether a credential is required
    #[must_use]
    pub const fn requires_credential(&self) -> bool {
        self.credential.is_some()
    }
}

/// Human-facing engine description
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EngineInfo {
    /// Display name
    pub name: String,
    /// Informational cost tier
    pub cost_tier: CostTier,
    /// Informational quality tier
    pub quality_tier: QualityTier,
    /// Short description
    pub description: String,
}
