mod types;

pub use types::*;

use anyhow::{Context, Result};
use std::path::Path;

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let config: Config = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    validate_config(&config)?;

    Ok(config)
}

/// Load config from default locations or return default config
pub fn load_config_or_default(custom_path: Option<&Path>) -> Result<Config> {
    if let Some(path) = custom_path {
        return load_config(path);
    }

    let default_paths = [
        "./config.toml",
        "./vidsplit.toml",
        "~/.config/vidsplit/config.toml",
        "/etc/vidsplit/config.toml",
    ];

    for path_str in default_paths {
        let path = shellexpand::tilde(path_str);
        let path = Path::new(path.as_ref());
        if path.exists() {
            tracing::debug!("Using config file {:?}", path);
            return load_config(path);
        }
    }

    Ok(Config::default())
}

/// Validate configuration
pub fn validate_config(config: &Config) -> Result<()> {
    if config.server.port == 0 {
        anyhow::bail!("Server port cannot be 0");
    }

    if config.storage.upload_dir == config.storage.segments_dir {
        anyhow::bail!(
            "upload_dir and segments_dir must differ (both are {:?})",
            config.storage.upload_dir
        );
    }

    if config.storage.allowed_extensions.is_empty() {
        anyhow::bail!("storage.allowed_extensions cannot be empty");
    }

    if config.storage.max_upload_mb == 0 {
        anyhow::bail!("storage.max_upload_mb must be at least 1");
    }

    vidsplit_av::segment::validate_segment_secs(i64::from(config.segmenting.default_segment_secs))
        .context("Invalid segmenting.default_segment_secs")?;

    if config.segmenting.segment_timeout_secs == 0 {
        anyhow::bail!("segmenting.segment_timeout_secs must be at least 1");
    }

    if config.segmenting.container.is_empty()
        || !vidsplit_common::paths::is_plain_file_name(&config.segmenting.container)
    {
        anyhow::bail!(
            "segmenting.container {:?} is not a usable file extension",
            config.segmenting.container
        );
    }

    if config.jobs.max_concurrent == 0 {
        anyhow::bail!("jobs.max_concurrent must be at least 1");
    }

    for (name, path) in [
        ("ffmpeg", &config.tools.ffmpeg_path),
        ("ffprobe", &config.tools.ffprobe_path),
    ] {
        if let Some(path) = path {
            if !path.exists() {
                tracing::warn!("Configured {} path does not exist: {:?}", name, path);
            }
        }
    }

    Ok(())
}

/// Create the upload and segment directories if missing.
pub fn ensure_directories(config: &Config) -> Result<()> {
    for dir in [&config.storage.upload_dir, &config.storage.segments_dir] {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create directory: {:?}", dir))?;
    }
    Ok(())
}
