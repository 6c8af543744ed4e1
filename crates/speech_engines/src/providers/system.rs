//! OS-native speech synthesizer
//!
//! Runs the platform's built-in synthesizer as a subprocess and records a WAV
//! file:
//!
//! - macOS: `say`
//! - Windows: PowerShell with `System.Speech`
//! - Linux: `espeak-ng`
//!
//! Text is always passed on stdin so it is never parsed as a flag.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, instrument, warn};

use crate::config::SystemEngineConfig;
use crate::error::SynthesisError;
use crate::ports::SpeechEngine;
use crate::speed::SpeedRange;
use crate::types::{
    AudioArtifact, AudioFormat, CostTier, Credentials, EngineDescriptor, EngineInfo, QualityTier,
};

/// Engine id
pub const ENGINE_ID: &str = "system";

/// Longest text passed to one subprocess
pub const MAX_TEXT_LENGTH: usize = 1000;

/// Words per minute at 1.0x for `say` and `espeak-ng`
const BASE_WPM: f32 = 175.0;

/// How to drive the host's synthesizer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlatformStrategy {
    /// macOS `say`
    MacSay,
    /// Windows `System.Speech` through PowerShell
    WindowsSapi,
    /// `espeak-ng`
    LinuxEspeak,
}

impl PlatformStrategy {
    /// Strategy for the OS this binary was built for
    #[must_use]
    pub const fn detect() -> Self {
        if cfg!(target_os = "macos") {
            Self::MacSay
        } else if cfg!(target_os = "windows") {
            Self::WindowsSapi
        } else {
            Self::LinuxEspeak
        }
    }

    /// Name used in logs
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::MacSay => "say",
            Self::WindowsSapi => "System.Speech",
            Self::LinuxEspeak => "espeak-ng",
        }
    }

    /// Executable used when none is configured
    #[must_use]
    pub const fn default_executable(self) -> &'static str {
        match self {
            Self::MacSay => "say",
            Self::WindowsSapi => "powershell",
            Self::LinuxEspeak => "espeak-ng",
        }
    }

    /// Speed bounds and mapping to words per minute or the SAPI rate delta
    #[must_use]
    pub const fn speed_range(self) -> SpeedRange {
        match self {
            Self::MacSay | Self::LinuxEspeak => SpeedRange::linear(0.5, 2.0, BASE_WPM, 0.0),
            // Rate runs from -10 to 10 with 0 at normal speed
            Self::WindowsSapi => SpeedRange::linear(0.5, 1.5, 20.0, -20.0),
        }
    }

    /// Voices commonly installed on the platform
    #[must_use]
    pub const fn voices(self) -> &'static [&'static str] {
        match self {
            Self::MacSay => &["Kyoko", "Otoya", "Samantha", "Daniel"],
            Self::WindowsSapi => &[
                "Microsoft Haruka Desktop",
                "Microsoft Zira Desktop",
                "Microsoft David Desktop",
            ],
            Self::LinuxEspeak => &["ja", "en-us", "en", "de", "fr"],
        }
    }

    /// Arguments for one synthesis run; text is supplied on stdin
    #[must_use]
    pub fn build_args(self, voice: &str, speed: f32, output: &Path) -> Vec<OsString> {
        let native = self.speed_range().to_native_rounded(speed);
        let voice = voice.trim();
        let mut args: Vec<OsString> = Vec::new();

        match self {
            Self::MacSay => {
                push_option(&mut args, "-r", native.to_string());
                if !voice.is_empty() {
                    push_option(&mut args, "-v", voice);
                }
                push_option(&mut args, "-o", output);
                args.push("--file-format=WAVE".into());
                args.push("--data-format=LEI16@22050".into());
                push_option(&mut args, "-f", "-");
            },
            Self::WindowsSapi => {
                args.push("-NoProfile".into());
                args.push("-NonInteractive".into());
                push_option(&mut args, "-Command", sapi_script(voice, native, output));
            },
            Self::LinuxEspeak => {
                push_option(&mut args, "-s", native.to_string());
                if !voice.is_empty() {
                    push_option(&mut args, "-v", voice);
                }
                push_option(&mut args, "-w", output);
                args.push("--stdin".into());
            },
        }

        args
    }
}

fn push_option(args: &mut Vec<OsString>, name: &str, value: impl AsRef<std::ffi::OsStr>) {
    args.push(name.into());
    args.push(value.as_ref().to_os_string());
}

/// Quote a value for a single-quoted PowerShell string
fn ps_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

fn sapi_script(voice: &str, rate: i32, output: &Path) -> String {
    let select_voice = if voice.is_empty() {
        String::new()
    } else {
        format!("$s.SelectVoice({}); ", ps_quote(voice))
    };

    format!(
        "[Console]::InputEncoding = [System.Text.Encoding]::UTF8; \
         Add-Type -AssemblyName System.Speech; \
         $s = New-Object System.Speech.Synthesis.SpeechSynthesizer; \
         $s.Rate = {rate}; \
         {select_voice}\
         $s.SetOutputToWaveFile({}); \
         $s.Speak([Console]::In.ReadToEnd()); \
         $s.Dispose()",
        ps_quote(&output.to_string_lossy())
    )
}

/// OS-native speech engine
#[derive(Debug)]
pub struct SystemSpeechEngine {
    strategy: PlatformStrategy,
    executable: PathBuf,
    timeout: Duration,
    descriptor: EngineDescriptor,
}

impl SystemSpeechEngine {
    /// Create an engine for the host platform
    #[must_use]
    pub fn new(config: &SystemEngineConfig) -> Self {
        Self::with_strategy(PlatformStrategy::detect(), config)
    }

    /// Create an engine with an explicit strategy
    #[must_use]
    pub fn with_strategy(strategy: PlatformStrategy, config: &SystemEngineConfig) -> Self {
        let executable = config
            .executable
            .clone()
            .unwrap_or_else(|| PathBuf::from(strategy.default_executable()));

        Self {
            strategy,
            executable,
            timeout: Duration::from_millis(config.timeout_ms),
            descriptor: EngineDescriptor::new(ENGINE_ID, MAX_TEXT_LENGTH)
                .with_tiers(CostTier::Free, QualityTier::Basic),
        }
    }

    /// Selected platform strategy
    #[must_use]
    pub const fn strategy(&self) -> PlatformStrategy {
        self.strategy
    }

    async fn run(&self, text: &str, args: Vec<OsString>) -> Result<(), SynthesisError> {
        let mut cmd = Command::new(&self.executable);
        cmd.args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!(?cmd, "Running system synthesizer");

        let mut child = cmd.spawn().map_err(|e| {
            SynthesisError::SubprocessFailure(format!(
                "Failed to start '{}': {e}",
                self.executable.display()
            ))
        })?;

        if let Some(mut stdin) = child.stdin.take() {
            // A synthesizer that exits without reading is judged by its exit status
            if let Err(e) = stdin.write_all(text.as_bytes()).await {
                debug!(error = %e, "Synthesizer closed stdin early");
            }
        }

        let output = child.wait_with_output().await.map_err(|e| {
            SynthesisError::SubprocessFailure(format!("Failed to wait for synthesizer: {e}"))
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(SynthesisError::SubprocessFailure(format!(
                "{} exited with {}: {}",
                self.strategy.name(),
                output.status,
                stderr.trim()
            )));
        }

        Ok(())
    }
}

#[async_trait]
impl SpeechEngine for SystemSpeechEngine {
    fn descriptor(&self) -> &EngineDescriptor {
        &self.descriptor
    }

    async fn list_voices(&self) -> Vec<String> {
        self.strategy
            .voices()
            .iter()
            .map(ToString::to_string)
            .collect()
    }

    fn describe(&self) -> EngineInfo {
        EngineInfo {
            name: format!("System TTS ({})", self.strategy.name()),
            cost_tier: self.descriptor.cost_tier,
            quality_tier: self.descriptor.quality_tier,
            description: "Built-in OS speech synthesizer, works offline".to_string(),
        }
    }

    #[instrument(skip(self, text, _credentials), fields(engine = ENGINE_ID, strategy = self.strategy.name(), text_len = text.len()))]
    async fn synthesize(
        &self,
        text: &str,
        voice: &str,
        speed: f32,
        _credentials: &Credentials,
    ) -> Result<Vec<AudioArtifact>, SynthesisError> {
        let artifact = AudioArtifact::reserve(AudioFormat::Wav, ENGINE_ID)?;
        let args = self.strategy.build_args(voice, speed, artifact.path());

        #[allow(clippy::cast_possible_truncation)]
        let timeout_ms = self.timeout.as_millis() as u64;
        tokio::time::timeout(self.timeout, self.run(text, args))
            .await
            .map_err(|_| {
                warn!(timeout_ms, "System synthesizer timed out");
                SynthesisError::Timeout(timeout_ms)
            })??;

        let size = tokio::fs::metadata(artifact.path())
            .await
            .map(|m| m.len())
            .unwrap_or(0);
        if size == 0 {
            return Err(SynthesisError::SubprocessFailure(format!(
                "{} exited successfully but wrote no audio",
                self.strategy.name()
            )));
        }

        debug!(audio_size = size, "System synthesis complete");
        Ok(vec![artifact])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with(executable: &str, timeout_ms: u64) -> SystemEngineConfig {
        SystemEngineConfig {
            enabled: true,
            executable: Some(PathBuf::from(executable)),
            timeout_ms,
        }
    }

    mod strategy_tests {
        use super::*;

        fn args_as_strings(args: &[OsString]) -> Vec<String> {
            args.iter().map(|a| a.to_string_lossy().into_owned()).collect()
        }

        #[test]
        fn espeak_args() {
            let args = PlatformStrategy::LinuxEspeak.build_args("ja", 1.0, Path::new("/tmp/out.wav"));
            assert_eq!(
                args_as_strings(&args),
                vec!["-s", "175", "-v", "ja", "-w", "/tmp/out.wav", "--stdin"]
            );
        }

        #[test]
        fn espeak_omits_blank_voice_and_clamps_speed() {
            let args = PlatformStrategy::LinuxEspeak.build_args(" ", 5.0, Path::new("/tmp/out.wav"));
            assert_eq!(
                args_as_strings(&args),
                vec!["-s", "350", "-w", "/tmp/out.wav", "--stdin"]
            );
        }

        #[test]
        fn say_args() {
            let args = PlatformStrategy::MacSay.build_args("Kyoko", 0.5, Path::new("/tmp/out.wav"));
            assert_eq!(
                args_as_strings(&args),
                vec![
                    "-r",
                    "88",
                    "-v",
                    "Kyoko",
                    "-o",
                    "/tmp/out.wav",
                    "--file-format=WAVE",
                    "--data-format=LEI16@22050",
                    "-f",
                    "-"
                ]
            );
        }

        #[test]
        fn sapi_rate_range() {
            let range = PlatformStrategy::WindowsSapi.speed_range();
            assert_eq!(range.to_native_rounded(1.0), 0);
            assert_eq!(range.to_native_rounded(0.1), -10);
            assert_eq!(range.to_native_rounded(1.5), 10);
            assert_eq!(range.to_native_rounded(3.0), 10);
        }

        #[test]
        fn sapi_script_quotes_values() {
            let args =
                PlatformStrategy::WindowsSapi.build_args("O'Brien", 1.25, Path::new("C:\\tmp\\a.wav"));
            let args = args_as_strings(&args);

            assert_eq!(args[..3], ["-NoProfile", "-NonInteractive", "-Command"]);
            let script = &args[3];
            assert!(script.contains("$s.Rate = 5;"));
            assert!(script.contains("SelectVoice('O''Brien')"));
            assert!(script.contains("SetOutputToWaveFile('C:\\tmp\\a.wav')"));
            assert!(script.contains("[Console]::In.ReadToEnd()"));
        }

        #[test]
        fn sapi_script_without_voice() {
            let args = PlatformStrategy::WindowsSapi.build_args("", 1.0, Path::new("a.wav"));
            let script = args[3].to_string_lossy();
            assert!(!script.contains("SelectVoice"));
        }

        #[test]
        fn every_strategy_lists_voices() {
            for strategy in [
                PlatformStrategy::MacSay,
                PlatformStrategy::WindowsSapi,
                PlatformStrategy::LinuxEspeak,
            ] {
                assert!(!strategy.voices().is_empty());
            }
        }
    }

    #[test]
    fn descriptor_needs_nothing() {
        let engine = SystemSpeechEngine::new(&SystemEngineConfig::default());
        let descriptor = engine.descriptor();

        assert_eq!(descriptor.id, ENGINE_ID);
        assert!(!descriptor.requires_credential());
        assert!(!descriptor.requires_availability_probe);
        assert_eq!(descriptor.quality_tier, QualityTier::Basic);
        assert_eq!(engine.strategy(), PlatformStrategy::detect());
    }

    #[tokio::test]
    async fn missing_executable_is_subprocess_failure() {
        let engine = SystemSpeechEngine::with_strategy(
            PlatformStrategy::LinuxEspeak,
            &config_with("/nonexistent/voxrelay-synth", 2000),
        );
        let result = engine.synthesize("hello", "", 1.0, &Credentials::new()).await;

        assert!(matches!(result, Err(SynthesisError::SubprocessFailure(_))));
    }

    #[cfg(unix)]
    mod subprocess_tests {
        use super::*;
        use std::os::unix::fs::PermissionsExt;

        fn write_script(dir: &Path, body: &str) -> PathBuf {
            let path = dir.join("synth.sh");
            std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
            path
        }

        fn engine_for(script: &Path, timeout_ms: u64) -> SystemSpeechEngine {
            SystemSpeechEngine::with_strategy(
                PlatformStrategy::LinuxEspeak,
                &config_with(&script.to_string_lossy(), timeout_ms),
            )
        }

        #[tokio::test]
        async fn non_zero_exit_is_failure() {
            let engine = SystemSpeechEngine::with_strategy(
                PlatformStrategy::LinuxEspeak,
                &config_with("false", 2000),
            );
            let result = engine.synthesize("hello", "", 1.0, &Credentials::new()).await;

            assert!(matches!(result, Err(SynthesisError::SubprocessFailure(_))));
        }

        #[tokio::test]
        async fn zero_exit_without_audio_is_failure() {
            let engine = SystemSpeechEngine::with_strategy(
                PlatformStrategy::LinuxEspeak,
                &config_with("true", 2000),
            );
            let result = engine.synthesize("hello", "", 1.0, &Credentials::new()).await;

            let Err(SynthesisError::SubprocessFailure(message)) = result else {
                panic!("expected SubprocessFailure");
            };
            assert!(message.contains("no audio"));
        }

        #[tokio::test]
        async fn writes_stdin_text_to_output_file() {
            let dir = tempfile::tempdir().unwrap();
            let script = write_script(
                dir.path(),
                r#"while [ $# -gt 0 ]; do
  if [ "$1" = "-w" ]; then shift; cat > "$1"; exit 0; fi
  shift
done
exit 1"#,
            );

            let engine = engine_for(&script, 5000);
            let clips = engine
                .synthesize("こんにちは", "ja", 1.0, &Credentials::new())
                .await
                .unwrap();

            assert_eq!(clips.len(), 1);
            assert_eq!(clips[0].format(), AudioFormat::Wav);
            assert_eq!(clips[0].engine_id(), ENGINE_ID);
            assert_eq!(std::fs::read_to_string(clips[0].path()).unwrap(), "こんにちは");
        }

        #[tokio::test]
        async fn slow_synthesizer_times_out() {
            let dir = tempfile::tempdir().unwrap();
            let script = write_script(dir.path(), "sleep 5");

            let engine = engine_for(&script, 100);
            let result = engine.synthesize("hello", "", 1.0, &Credentials::new()).await;

            assert!(matches!(result, Err(SynthesisError::Timeout(100))));
        }

        #[tokio::test]
        async fn failed_attempt_leaves_no_file_behind() {
            let dir = tempfile::tempdir().unwrap();
            let script = write_script(
                dir.path(),
                &format!("echo \"$@\" > {}/args.txt\nexit 3", dir.path().display()),
            );

            let engine = engine_for(&script, 5000);
            let result = engine.synthesize("hello", "", 1.0, &Credentials::new()).await;
            assert!(matches!(result, Err(SynthesisError::SubprocessFailure(_))));

            let args = std::fs::read_to_string(dir.path().join("args.txt")).unwrap();
            let output = args
                .split_whitespace()
                .skip_while(|a| *a != "-w")
                .nth(1)
                .unwrap()
                .to_string();
            assert!(!Path::new(&output).exists());
        }
    }
}
