//! Port definitions for speech synthesis
//!
//! Defines the traits (ports) that engine and player adapters must implement.

use std::path::Path;

use async_trait::async_trait;

use crate::error::{PlaybackError, SynthesisError};
use crate::types::{AudioArtifact, Credentials, EngineDescriptor, EngineInfo};

/// Port for speech synthesis engines
///
/// Every backend (local HTTP service, cloud API, OS synthesizer) implements
/// this trait and is registered with the orchestrator under its descriptor id.
///
/// # Example
///
/// ```ignore
/// use speech_engines::{Credentials, SpeechEngine};
///
/// async fn say(engine: &dyn SpeechEngine, text: &str) -> Result<(), SynthesisError> {
///     let voice = engine.list_voices().await.remove(0);
///     let clips = engine.synthesize(text, &voice, 1.0, &Credentials::new()).await?;
///     println!("{} clip(s) from {}", clips.len(), engine.descriptor().id);
///     Ok(())
/// }
/// ```
#[async_trait]
pub trait SpeechEngine: Send + Sync {
    /// Static engine facts
    fn descriptor(&self) -> &EngineDescriptor;

    /// Voice identifiers in display order
    ///
    /// Never fails: engines that look voices up remotely return a static
    /// fallback list when the lookup fails.
    async fn list_voices(&self) -> Vec<String>;

    /// Longest text accepted by one `synthesize` call, in characters
    fn max_text_length(&self) -> usize {
        self.descriptor().max_text_length
    }

    /// Informational description, never used for control flow
    fn describe(&self) -> EngineInfo;

    /// Synthesize `text` into one or more clips
    ///
    /// # Arguments
    ///
    /// * `text` - Text no longer than `max_text_length`
    /// * `voice` - Voice identifier in this engine's namespace
    /// * `speed` - Speed multiplier, clamped to the engine's supported range
    /// * `credentials` - Request credentials
    ///
    /// # Errors
    ///
    /// Returns `SynthesisError` if the backend fails, times out or produces
    /// no audio.
    async fn synthesize(
        &self,
        text: &str,
        voice: &str,
        speed: f32,
        credentials: &Credentials,
    ) -> Result<Vec<AudioArtifact>, SynthesisError>;

    /// Lightweight reachability check
    ///
    /// Only consulted when the descriptor sets `requires_availability_probe`.
    async fn is_available(&self) -> bool {
        true
    }
}

/// Port for audio players
#[async_trait]
pub trait AudioPlayer: Send + Sync {
    /// Play a file to completion
    ///
    /// # Errors
    ///
    /// Returns `PlaybackError` if the player cannot start, fails or times out.
    async fn play(&self, path: &Path) -> Result<(), PlaybackError>;

    /// Player name for diagnostics
    fn name(&self) -> &str;
}
