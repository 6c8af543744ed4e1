//! VoxRelay CLI
//!
//! Speak or save text through the configured speech engines.

#![allow(clippy::print_stdout)]

mod settings;

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use speech_engines::{
    AudioFormat, Credentials, ExhaustedError, FallbackOrchestrator, GOOGLE_AI_API_KEY,
    GOOGLE_CLOUD_API_KEY, PlaybackSequencer, PriorityList, SpeechEngine, SynthesisRequest,
    Synthesized, VoxRelayConfig, build_registry,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// VoxRelay CLI
#[derive(Parser)]
#[command(name = "voxrelay")]
#[command(author, version, about = "Text-to-speech with engine fallback", long_about = None)]
struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Configuration file (default: ./voxrelay.toml if present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// API key for the Google AI generative engine
    #[arg(long, env = "GOOGLE_AI_API_KEY", hide_env_values = true, global = true)]
    google_ai_api_key: Option<String>,

    /// API key for Google Cloud Text-to-Speech
    #[arg(
        long,
        env = "GOOGLE_CLOUD_API_KEY",
        hide_env_values = true,
        global = true
    )]
    google_cloud_api_key: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Synthesize text and play it
    Speak {
        /// Text to speak
        text: String,

        #[command(flatten)]
        voice: VoiceArgs,
    },

    /// Synthesize text and write the clips to a directory
    ///
    /// Example: voxrelay save "こんにちは" --output ./out/
    Save {
        /// Text to synthesize
        text: String,

        /// Output directory (created if missing)
        #[arg(short, long)]
        output: PathBuf,

        #[command(flatten)]
        voice: VoiceArgs,
    },

    /// List the voices an engine offers
    Voices {
        /// Engine id (all engines if not specified)
        #[arg(short, long)]
        engine: Option<String>,
    },

    /// Show registered engines in candidate order
    Engines,

    /// Check which local engines are reachable
    Probe,
}

#[derive(clap::Args)]
struct VoiceArgs {
    /// Voice name (engine default if not specified)
    #[arg(long, default_value = "")]
    voice: String,

    /// Speed multiplier, 1.0 is normal pace
    #[arg(short, long, default_value = "1.0")]
    speed: f32,

    /// Engine to try first
    #[arg(short, long)]
    engine: Option<String>,
}

/// Determine log filter level from verbosity count
const fn log_filter_from_verbosity(verbose: u8) -> &'static str {
    match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}

/// Collect the non-empty API keys into request credentials
fn credentials_from(google_ai: Option<String>, google_cloud: Option<String>) -> Credentials {
    let mut credentials = Credentials::new();
    for (key, value) in [
        (GOOGLE_AI_API_KEY, google_ai),
        (GOOGLE_CLOUD_API_KEY, google_cloud),
    ] {
        if let Some(value) = value.filter(|v| !v.trim().is_empty()) {
            credentials.insert(key, value);
        }
    }
    credentials
}

/// File name for the `index`-th clip of a saved synthesis
fn clip_file_name(engine_id: &str, index: usize, format: AudioFormat) -> String {
    format!("{engine_id}-{:02}.{}", index + 1, format.extension())
}

fn build_orchestrator(config: &VoxRelayConfig) -> anyhow::Result<FallbackOrchestrator> {
    let registry = build_registry(&config.engines)?;
    Ok(FallbackOrchestrator::new(
        registry,
        PriorityList::new(config.priority.iter().cloned()),
    ))
}

fn build_request(
    text: String,
    args: VoiceArgs,
    credentials: Credentials,
) -> anyhow::Result<SynthesisRequest> {
    let mut request = SynthesisRequest::new(text, args.voice)?
        .with_speed(args.speed)?
        .with_credentials(credentials);
    if let Some(engine) = args.engine {
        request = request.with_preferred_engine(engine);
    }
    Ok(request)
}

async fn synthesize_or_exit(
    orchestrator: &FallbackOrchestrator,
    request: &SynthesisRequest,
) -> Synthesized {
    match orchestrator.synthesize(request).await {
        Ok(synthesized) => {
            for attempt in &synthesized.failed_attempts {
                println!("   ⚠️  Skipped {attempt}");
            }
            synthesized
        },
        Err(e) => {
            print_exhausted(&e);
            std::process::exit(1);
        },
    }
}

fn print_exhausted(error: &ExhaustedError) {
    println!("❌ No speech engine could synthesize the text:");
    for attempt in &error.attempts {
        println!("   • {attempt}");
    }
}

async fn save_clips(synthesized: Synthesized, dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
    tokio::fs::create_dir_all(dir).await?;

    let mut saved = Vec::with_capacity(synthesized.artifacts.len());
    for (index, artifact) in synthesized.artifacts.into_iter().enumerate() {
        let name = clip_file_name(&synthesized.engine_id, index, artifact.format());
        saved.push(artifact.persist_to(&dir.join(name)).await?);
    }
    Ok(saved)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = log_filter_from_verbosity(cli.verbose);

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(filter))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = settings::load_config(cli.config.as_deref())?;
    let orchestrator = build_orchestrator(&config)?;
    let credentials = credentials_from(cli.google_ai_api_key, cli.google_cloud_api_key);

    match cli.command {
        Commands::Speak { text, voice } => {
            let request = build_request(text, voice, credentials)?;
            let synthesized = synthesize_or_exit(&orchestrator, &request).await;

            println!(
                "🔊 Playing {} clip(s) from {}",
                synthesized.artifacts.len(),
                synthesized.engine_id
            );

            let report = PlaybackSequencer::from_config(&config.playback)
                .play(synthesized.artifacts)
                .await;

            for failure in &report.failures {
                println!("   ⚠️  Clip {} could not be played:", failure.index + 1);
                for error in &failure.errors {
                    println!("      • {error}");
                }
            }
            if report.disposal_failures > 0 {
                println!(
                    "   ⚠️  {} temporary file(s) could not be deleted",
                    report.disposal_failures
                );
            }

            if report.all_played() {
                println!("✅ Done");
            } else {
                std::process::exit(1);
            }
        },

        Commands::Save {
            text,
            output,
            voice,
        } => {
            let request = build_request(text, voice, credentials)?;
            let synthesized = synthesize_or_exit(&orchestrator, &request).await;
            let engine_id = synthesized.engine_id.clone();

            match save_clips(synthesized, &output).await {
                Ok(paths) => {
                    println!("✅ Saved {} clip(s) from {engine_id}:", paths.len());
                    for path in paths {
                        println!("   📁 {}", path.display());
                    }
                },
                Err(e) => {
                    println!("❌ Failed to save audio: {e}");
                    std::process::exit(1);
                },
            }
        },

        Commands::Voices { engine } => {
            let registry = orchestrator.registry();
            if let Some(id) = engine.as_deref() {
                if registry.get(id).is_none() {
                    anyhow::bail!("Unknown engine: {id}");
                }
            }

            for candidate in registry.iter() {
                let id = candidate.descriptor().id.as_str();
                if engine.as_deref().is_some_and(|wanted| wanted != id) {
                    continue;
                }

                println!("🎙️  {id}:");
                let voices = candidate.list_voices().await;
                if voices.is_empty() {
                    println!("   (no voices reported)");
                }
                for voice in voices {
                    println!("   {voice}");
                }
            }
        },

        Commands::Engines => {
            println!("📦 Engines in candidate order:");
            for (position, candidate) in orchestrator.candidate_order(None).iter().enumerate() {
                let descriptor = candidate.descriptor();
                let info = candidate.describe();
                println!(
                    "{:>3}. {} - {} [{}, {}]",
                    position + 1,
                    descriptor.id,
                    info.name,
                    info.cost_tier,
                    info.quality_tier
                );
                if let Some(key) = &descriptor.credential {
                    let status = if credentials.contains(key) { "set" } else { "missing" };
                    println!("      🔑 {key}: {status}");
                }
            }
        },

        Commands::Probe => {
            let mut any_probed = false;
            for candidate in orchestrator.registry().iter() {
                let descriptor = candidate.descriptor();
                if !descriptor.requires_availability_probe {
                    continue;
                }
                any_probed = true;
                if candidate.is_available().await {
                    println!("✅ {} is reachable", descriptor.id);
                } else {
                    println!("❌ {} is not reachable", descriptor.id);
                }
            }
            if !any_probed {
                println!("ℹ️  No enabled engine needs a probe");
            }
        },
    }

    Ok(())
}
