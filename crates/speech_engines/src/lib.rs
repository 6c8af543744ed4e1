//! Speech Engines - text-to-speech with priority-based fallback
//!
//! Provides one contract over several independently failing backends and
//! the machinery to use them:
//! - `SpeechEngine` - Synthesize text into audio clips
//! - `FallbackOrchestrator` - Try engines in candidate order until one succeeds
//! - `PlaybackSequencer` - Play clips in order and delete them afterwards
//!
//! # Architecture
//!
//! This crate follows the ports & adapters pattern:
//! - `ports` module defines the traits (ports)
//! - `providers` module contains concrete implementations (adapters)
//!
//! # Supported Engines
//!
//! - VOICEVOX and AivisSpeech (local HTTP)
//! - Google Cloud Text-to-Speech, standard and Chirp 3 HD voices
//! - Google AI generative speech, with a Chirp 3 HD fallback tier
//! - The OS synthesizer (`say`, `System.Speech`, `espeak-ng`)
//!
//! # Example
//!
//! ```ignore
//! use speech_engines::{
//!     build_registry, Credentials, FallbackOrchestrator, PlaybackSequencer, PriorityList,
//!     SynthesisRequest, VoxRelayConfig,
//! };
//!
//! let config = VoxRelayConfig::default();
//! let orchestrator = FallbackOrchestrator::new(
//!     build_registry(&config.engines)?,
//!     PriorityList::new(config.priority.clone()),
//! );
//!
//! let request = SynthesisRequest::new("こんにちは", "四国めたん(ノーマル)")?
//!     .with_credentials(Credentials::new().with("google_ai_api_key", key));
//! let synthesized = orchestrator.synthesize(&request).await?;
//!
//! let report = PlaybackSequencer::from_config(&config.playback)
//!     .play(synthesized.artifacts)
//!     .await;
//! ```

pub mod config;
pub mod error;
pub mod orchestrator;
pub mod playback;
pub mod ports;
pub mod probe;
pub mod providers;
pub mod speed;
pub mod text;
pub mod types;

pub use config::VoxRelayConfig;
pub use error::{
    ConfigError, ExhaustedError, FailedAttempt, PlaybackError, RequestError, SynthesisError,
};
pub use orchestrator::{EngineRegistry, FallbackOrchestrator, PriorityList, Synthesized};
pub use playback::{CommandPlayer, PlaybackReport, PlaybackSequencer, PlayerStrategy};
pub use ports::{AudioPlayer, SpeechEngine};
pub use probe::HttpProbe;
pub use providers::build_registry;
pub use speed::SpeedRange;
pub use text::LengthUnit;
pub use types::{
    AudioArtifact, AudioFormat, CostTier, Credentials, EngineDescriptor, EngineInfo,
    GOOGLE_AI_API_KEY, GOOGLE_CLOUD_API_KEY, QualityTier, SynthesisRequest,
};
