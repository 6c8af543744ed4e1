//! Engine registry and priority-based fallback
//!
//! The orchestrator tries engines one at a time in candidate order until one
//! produces audio:
//!
//! ```text
//! preferred engine ─┐
//! priority list ────┼─▶ candidate order ─▶ probe ─▶ credential ─▶ synthesize
//! other engines ────┘          ▲                                      │
//!                              └────────── next candidate ◀── failure ┘
//! ```
//!
//! Every candidate yields exactly one outcome. When all of them fail the
//! caller receives an [`ExhaustedError`] listing each engine's reason.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use arc_swap::ArcSwap;
use tracing::{debug, info, instrument, warn};

use crate::error::{ConfigError, ExhaustedError, FailedAttempt, SynthesisError};
use crate::ports::SpeechEngine;
use crate::text::split_for_engine;
use crate::types::{AudioArtifact, SynthesisRequest};

/// Ordered, duplicate-free engine ids
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PriorityList {
    ids: Vec<String>,
}

impl PriorityList {
    /// Build a list, keeping the first occurrence of each id
    pub fn new<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut seen = HashSet::new();
        let ids = ids
            .into_iter()
            .map(Into::into)
            .filter(|id: &String| !id.trim().is_empty() && seen.insert(id.clone()))
            .collect();
        Self { ids }
    }

    /// Engine ids in priority order
    #[must_use]
    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    /// Number of ids
    #[must_use]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Whether the list is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Engines keyed by id, in registration order
#[derive(Default)]
pub struct EngineRegistry {
    engines: Vec<Arc<dyn SpeechEngine>>,
}

impl fmt::Debug for EngineRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.ids()).finish()
    }
}

impl EngineRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an engine
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if an engine with the same id exists.
    pub fn register(&mut self, engine: Arc<dyn SpeechEngine>) -> Result<(), ConfigError> {
        let id = &engine.descriptor().id;
        if self.get(id).is_some() {
            return Err(ConfigError::Invalid(format!(
                "Engine '{id}' is registered twice"
            )));
        }
        debug!(engine = %id, "Registered speech engine");
        self.engines.push(engine);
        Ok(())
    }

    /// Look up an engine by id
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&Arc<dyn SpeechEngine>> {
        self.engines.iter().find(|e| e.descriptor().id == id)
    }

    /// Registered ids in registration order
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.engines.iter().map(|e| e.descriptor().id.as_str())
    }

    /// Registered engines in registration order
    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn SpeechEngine>> {
        self.engines.iter()
    }

    /// Number of registered engines
    #[must_use]
    pub fn len(&self) -> usize {
        self.engines.len()
    }

    /// Whether no engine is registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.engines.is_empty()
    }
}

/// Successful fallback pass
#[derive(Debug)]
pub struct Synthesized {
    /// Engine that produced the audio
    pub engine_id: String,
    /// Clips in playback order, never empty
    pub artifacts: Vec<AudioArtifact>,
    /// Candidates that failed before the successful one
    pub failed_attempts: Vec<FailedAttempt>,
}

/// Priority-based fallback across registered engines
pub struct FallbackOrchestrator {
    registry: EngineRegistry,
    priority: ArcSwap<PriorityList>,
}

impl fmt::Debug for FallbackOrchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FallbackOrchestrator")
            .field("registry", &self.registry)
            .field("priority", &self.priority.load())
            .finish()
    }
}

impl FallbackOrchestrator {
    /// Create an orchestrator over a fixed registry
    #[must_use]
    pub fn new(registry: EngineRegistry, priority: PriorityList) -> Self {
        for id in priority.ids() {
            if registry.get(id).is_none() {
                warn!(engine = %id, "Priority list names an unregistered engine");
            }
        }

        Self {
            registry,
            priority: ArcSwap::from_pointee(priority),
        }
    }

    /// Registered engines
    #[must_use]
    pub const fn registry(&self) -> &EngineRegistry {
        &self.registry
    }

    /// Current priority list
    #[must_use]
    pub fn priority(&self) -> Arc<PriorityList> {
        self.priority.load_full()
    }

    /// Replace the priority list for subsequent requests
    ///
    /// Requests already in flight keep the list they started with.
    pub fn set_priority(&self, priority: PriorityList) {
        info!(priority = ?priority.ids(), "Priority list replaced");
        self.priority.store(Arc::new(priority));
    }

    /// Engines to try for a request, in order
    #[must_use]
    pub fn candidate_order(&self, preferred: Option<&str>) -> Vec<Arc<dyn SpeechEngine>> {
        self.candidates_from(&self.priority.load(), preferred)
    }

    fn candidates_from(
        &self,
        priority: &PriorityList,
        preferred: Option<&str>,
    ) -> Vec<Arc<dyn SpeechEngine>> {
        let mut placed: HashSet<&str> = HashSet::new();
        let mut order = Vec::with_capacity(self.registry.len());

        let listed = preferred
            .into_iter()
            .chain(priority.ids().iter().map(String::as_str))
            .chain(self.registry.ids());

        for id in listed {
            if placed.contains(id) {
                continue;
            }
            if let Some(engine) = self.registry.get(id) {
                placed.insert(id);
                order.push(Arc::clone(engine));
            }
        }

        order
    }

    /// Synthesize with the first engine that succeeds
    ///
    /// # Errors
    ///
    /// Returns `ExhaustedError` with one failure per candidate when no engine
    /// produced audio.
    #[instrument(skip(self, request), fields(text_len = request.text().len(), preferred = ?request.preferred_engine()))]
    pub async fn synthesize(
        &self,
        request: &SynthesisRequest,
    ) -> Result<Synthesized, ExhaustedError> {
        let snapshot = self.priority.load_full();
        let candidates = self.candidates_from(&snapshot, request.preferred_engine());

        if let Some(preferred) = request.preferred_engine() {
            if self.registry.get(preferred).is_none() {
                warn!(engine = %preferred, "Preferred engine is not registered");
            }
        }

        let mut failures: Vec<FailedAttempt> = Vec::new();

        for engine in candidates {
            let engine_id = engine.descriptor().id.clone();
            debug!(engine = %engine_id, attempt = failures.len() + 1, "Trying speech engine");

            match Self::attempt(engine.as_ref(), request).await {
                Ok(artifacts) => {
                    info!(
                        engine = %engine_id,
                        clips = artifacts.len(),
                        skipped = failures.len(),
                        "Speech synthesized"
                    );
                    return Ok(Synthesized {
                        engine_id,
                        artifacts,
                        failed_attempts: failures,
                    });
                },
                Err(e) => {
                    warn!(engine = %engine_id, error = %e, "Speech engine failed, trying next");
                    failures.push(FailedAttempt::new(engine_id, e));
                },
            }
        }

        warn!(attempted = failures.len(), "All speech engines failed");
        Err(ExhaustedError { attempts: failures })
    }

    /// One candidate: probe, credential check, then chunked synthesis
    async fn attempt(
        engine: &dyn SpeechEngine,
        request: &SynthesisRequest,
    ) -> Result<Vec<AudioArtifact>, SynthesisError> {
        let descriptor = engine.descriptor();

        if descriptor.requires_availability_probe && !engine.is_available().await {
            return Err(SynthesisError::Unreachable(format!(
                "{} did not answer its availability probe",
                descriptor.id
            )));
        }

        if let Some(key) = &descriptor.credential {
            if !request.credentials().contains(key) {
                return Err(SynthesisError::MissingCredential {
                    engine: descriptor.id.clone(),
                    key: key.clone(),
                });
            }
        }

        let chunks = split_for_engine(
            request.text(),
            engine.max_text_length(),
            descriptor.length_unit,
        );
        if chunks.len() > 1 {
            debug!(engine = %descriptor.id, chunks = chunks.len(), "Text split into chunks");
        }

        // Clips from earlier chunks are dropped, and their files deleted, if a later chunk fails
        let mut artifacts = Vec::new();
        for chunk in &chunks {
            let mut clips = engine
                .synthesize(
                    chunk,
                    request.voice_model(),
                    request.speed(),
                    request.credentials(),
                )
                .await?;
            if clips.is_empty() {
                return Err(SynthesisError::EmptyResult);
            }
            artifacts.append(&mut clips);
        }

        if artifacts.is_empty() {
            return Err(SynthesisError::EmptyResult);
        }

        Ok(artifacts)
    }
}
