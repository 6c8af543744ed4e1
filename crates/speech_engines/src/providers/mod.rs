//! Speech engine implementations
//!
//! Contains concrete implementations of the `SpeechEngine` trait and the
//! builder that registers the enabled ones.

pub mod gemini;
pub mod google_cloud;
pub mod system;
pub mod voicevox;

use std::sync::Arc;

use tracing::info;

pub use gemini::GeminiTtsEngine;
pub use google_cloud::GoogleCloudTtsEngine;
pub use system::{PlatformStrategy, SystemSpeechEngine};
pub use voicevox::VoicevoxEngine;

use crate::config::EnginesConfig;
use crate::error::ConfigError;
use crate::orchestrator::EngineRegistry;

/// Register every enabled built-in engine
///
/// Engines are registered local first, then cloud, then the OS synthesizer.
/// That order is the tail of the candidate order for engines missing from the
/// priority list.
///
/// # Errors
///
/// Returns `ConfigError` if an engine cannot be constructed.
pub fn build_registry(config: &EnginesConfig) -> Result<EngineRegistry, ConfigError> {
    let mut registry = EngineRegistry::new();

    if config.voicevox.enabled {
        registry.register(Arc::new(VoicevoxEngine::new(
            voicevox::VOICEVOX,
            &config.voicevox,
        )?))?;
    }
    if config.aivis.enabled {
        registry.register(Arc::new(VoicevoxEngine::new(voicevox::AIVIS, &config.aivis)?))?;
    }
    if config.google_ai.enabled {
        registry.register(Arc::new(GeminiTtsEngine::new(config.google_ai.clone())?))?;
    }
    if config.google_cloud.enabled {
        registry.register(Arc::new(GoogleCloudTtsEngine::new(
            google_cloud::STANDARD_VOICES,
            config.google_cloud.clone(),
        )?))?;
    }
    if config.google_cloud.chirp_enabled {
        registry.register(Arc::new(GoogleCloudTtsEngine::new(
            google_cloud::CHIRP_VOICES,
            config.google_cloud.clone(),
        )?))?;
    }
    if config.system.enabled {
        registry.register(Arc::new(SystemSpeechEngine::new(&config.system)))?;
    }

    info!(engines = ?registry.ids().collect::<Vec<_>>(), "Speech engines registered");
    Ok(registry)
}
