//! Sequential playback of synthesized clips
//!
//! Each clip is played to completion with the primary player, retried once
//! with the fallback player if that fails, and then deleted whatever the
//! outcome. A failing clip never stops the rest of the queue.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info, instrument, warn};

use crate::config::PlaybackConfig;
use crate::error::PlaybackError;
use crate::ports::AudioPlayer;
use crate::types::AudioArtifact;

/// How a player program expects its arguments
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Invocation {
    /// `<program> <file>`
    Plain,
    /// `ffplay -nodisp -autoexit -loglevel quiet <file>`
    Ffplay,
    /// PowerShell `Media.SoundPlayer` (WAV only)
    SoundPlayer,
}

impl Invocation {
    fn for_program(program: &Path) -> Self {
        let stem = program
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        match stem.as_str() {
            "ffplay" => Self::Ffplay,
            "powershell" | "pwsh" => Self::SoundPlayer,
            _ => Self::Plain,
        }
    }
}

/// Audio player backed by an external program
#[derive(Debug, Clone)]
pub struct CommandPlayer {
    name: String,
    program: PathBuf,
    invocation: Invocation,
    timeout: Duration,
}

impl CommandPlayer {
    /// Create a player for `program`
    ///
    /// Arguments are chosen from the program name: `ffplay` runs headless,
    /// `powershell` uses `Media.SoundPlayer`, anything else gets the file path.
    pub fn new(program: impl Into<PathBuf>, timeout: Duration) -> Self {
        let program = program.into();
        let invocation = Invocation::for_program(&program);
        let name = program
            .file_name()
            .map_or_else(|| program.display().to_string(), |n| n.to_string_lossy().into_owned());

        Self {
            name,
            program,
            invocation,
            timeout,
        }
    }

    /// Arguments for playing `path`
    #[must_use]
    pub fn args(&self, path: &Path) -> Vec<OsString> {
        match self.invocation {
            Invocation::Plain => vec![path.as_os_str().to_os_string()],
            Invocation::Ffplay => vec![
                "-nodisp".into(),
                "-autoexit".into(),
                "-loglevel".into(),
                "quiet".into(),
                path.as_os_str().to_os_string(),
            ],
            Invocation::SoundPlayer => vec![
                "-NoProfile".into(),
                "-NonInteractive".into(),
                "-Command".into(),
                format!(
                    "(New-Object Media.SoundPlayer '{}').PlaySync()",
                    path.to_string_lossy().replace('\'', "''")
                )
                .into(),
            ],
        }
    }
}

#[async_trait]
impl AudioPlayer for CommandPlayer {
    async fn play(&self, path: &Path) -> Result<(), PlaybackError> {
        let mut child = Command::new(&self.program)
            .args(self.args(path))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| PlaybackError::Spawn {
                player: self.name.clone(),
                reason: e.to_string(),
            })?;

        let status = tokio::time::timeout(self.timeout, child.wait())
            .await
            .map_err(|_| PlaybackError::Timeout(self.name.clone()))?
            .map_err(|e| PlaybackError::Spawn {
                player: self.name.clone(),
                reason: e.to_string(),
            })?;

        if status.success() {
            Ok(())
        } else {
            Err(PlaybackError::Exit {
                player: self.name.clone(),
                status: status.to_string(),
            })
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Platform player pair, chosen once per sequencer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerStrategy {
    /// `afplay`, then `ffplay`
    MacAfplay,
    /// `ffplay`, then `paplay`
    LinuxFfplay,
    /// PowerShell `Media.SoundPlayer`, then `ffplay`
    WindowsSoundPlayer,
}

impl PlayerStrategy {
    /// Strategy for the OS this binary was built for
    #[must_use]
    pub const fn detect() -> Self {
        if cfg!(target_os = "macos") {
            Self::MacAfplay
        } else if cfg!(target_os = "windows") {
            Self::WindowsSoundPlayer
        } else {
            Self::LinuxFfplay
        }
    }

    /// Primary player program
    #[must_use]
    pub const fn primary_program(self) -> &'static str {
        match self {
            Self::MacAfplay => "afplay",
            Self::LinuxFfplay => "ffplay",
            Self::WindowsSoundPlayer => "powershell",
        }
    }

    /// Fallback player program
    #[must_use]
    pub const fn fallback_program(self) -> &'static str {
        match self {
            Self::MacAfplay | Self::WindowsSoundPlayer => "ffplay",
            Self::LinuxFfplay => "paplay",
        }
    }
}

/// Playback failure of one clip
#[derive(Debug)]
pub struct ClipFailure {
    /// Position of the clip in the queue
    pub index: usize,
    /// Errors from each player that was tried, in order
    pub errors: Vec<PlaybackError>,
}

/// Outcome of playing a queue of clips
#[derive(Debug, Default)]
pub struct PlaybackReport {
    /// Clips played successfully
    pub played: usize,
    /// Clips no player could play
    pub failures: Vec<ClipFailure>,
    /// Clips whose backing file could not be deleted
    pub disposal_failures: usize,
}

impl PlaybackReport {
    /// Whether every clip played
    #[must_use]
    pub fn all_played(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Plays clips in order and disposes each one afterwards
pub struct PlaybackSequencer {
    primary: Arc<dyn AudioPlayer>,
    fallback: Option<Arc<dyn AudioPlayer>>,
    inter_clip_delay: Duration,
}

impl std::fmt::Debug for PlaybackSequencer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaybackSequencer")
            .field("primary", &self.primary.name())
            .field("fallback", &self.fallback.as_ref().map(|p| p.name()))
            .field("inter_clip_delay", &self.inter_clip_delay)
            .finish()
    }
}

impl PlaybackSequencer {
    /// Create a sequencer from explicit players
    #[must_use]
    pub fn new(
        primary: Arc<dyn AudioPlayer>,
        fallback: Option<Arc<dyn AudioPlayer>>,
        inter_clip_delay: Duration,
    ) -> Self {
        Self {
            primary,
            fallback,
            inter_clip_delay,
        }
    }

    /// Create a sequencer with the host platform's players
    ///
    /// Programs configured in `config` replace the platform defaults.
    #[must_use]
    pub fn from_config(config: &PlaybackConfig) -> Self {
        let strategy = PlayerStrategy::detect();
        let timeout = Duration::from_millis(config.player_timeout_ms);

        let primary = config
            .primary_player
            .as_deref()
            .unwrap_or_else(|| strategy.primary_program());
        let fallback = config
            .fallback_player
            .as_deref()
            .unwrap_or_else(|| strategy.fallback_program());

        debug!(?strategy, primary, fallback, "Playback players selected");

        Self::new(
            Arc::new(CommandPlayer::new(primary, timeout)),
            (fallback != primary)
                .then(|| Arc::new(CommandPlayer::new(fallback, timeout)) as Arc<dyn AudioPlayer>),
            Duration::from_millis(config.inter_clip_delay_ms),
        )
    }

    /// Play every clip in order, then delete it
    ///
    /// Clips are consumed: each backing file is removed once the clip has
    /// been played or has failed to play.
    #[instrument(skip(self, artifacts), fields(clips = artifacts.len()))]
    pub async fn play(&self, artifacts: Vec<AudioArtifact>) -> PlaybackReport {
        let mut report = PlaybackReport::default();
        let total = artifacts.len();

        for (index, artifact) in artifacts.into_iter().enumerate() {
            match self.play_one(artifact.path()).await {
                Ok(()) => report.played += 1,
                Err(errors) => {
                    warn!(
                        index,
                        path = %artifact.path().display(),
                        errors = errors.len(),
                        "Clip could not be played"
                    );
                    report.failures.push(ClipFailure { index, errors });
                },
            }

            if index + 1 < total && !self.inter_clip_delay.is_zero() {
                tokio::time::sleep(self.inter_clip_delay).await;
            }

            let path = artifact.path().to_path_buf();
            if let Err(e) = artifact.dispose() {
                warn!(path = %path.display(), error = %e, "Failed to delete clip");
                report.disposal_failures += 1;
            }
        }

        info!(
            played = report.played,
            failed = report.failures.len(),
            "Playback finished"
        );
        report
    }

    async fn play_one(&self, path: &Path) -> Result<(), Vec<PlaybackError>> {
        let mut errors = Vec::new();

        match self.primary.play(path).await {
            Ok(()) => return Ok(()),
            Err(e) => {
                debug!(player = self.primary.name(), error = %e, "Primary player failed");
                errors.push(e);
            },
        }

        if let Some(fallback) = &self.fallback {
            match fallback.play(path).await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    debug!(player = fallback.name(), error = %e, "Fallback player failed");
                    errors.push(e);
                },
            }
        }

        Err(errors)
    }
}
