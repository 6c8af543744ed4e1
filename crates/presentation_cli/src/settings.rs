//! Configuration loading
//!
//! Layers, later ones winning:
//! 1. Built-in defaults
//! 2. `voxrelay.toml` in the working directory, or the file given with `--config`
//! 3. `VOXRELAY_*` environment variables, `__` between sections
//!    (e.g. `VOXRELAY_PLAYBACK__INTER_CLIP_DELAY_MS=500`,
//!    `VOXRELAY_PRIORITY=system,voicevox`)

use std::path::Path;

use speech_engines::VoxRelayConfig;

/// Load and validate the configuration
pub fn load_config(path: Option<&Path>) -> anyhow::Result<VoxRelayConfig> {
    let file = match path {
        Some(path) => config::File::from(path).required(true),
        None => config::File::with_name("voxrelay").required(false),
    };

    let config: VoxRelayConfig = config::Config::builder()
        .add_source(file)
        .add_source(
            config::Environment::with_prefix("VOXRELAY")
                .prefix_separator("_")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("priority")
                .try_parsing(true),
        )
        .build()?
        .try_deserialize()?;

    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid configuration: {e}"))?;

    Ok(config)
}
