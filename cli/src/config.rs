use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use browser_bridge::ipc::Endpoint;
use browser_bridge::{BridgeConfig, EngineSettings};

use crate::cli::Cli;

/// TOML config file structure
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    /// Listening and session settings
    pub server: ServerSection,

    /// Headless engine settings
    pub engine: EngineSection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    pub pipe: Option<PathBuf>,
    pub port: Option<u16>,
    pub timeout_ms: Option<u64>,
    pub max_frame_len: Option<usize>,
    pub outbox_capacity: Option<usize>,
    pub backward_connect_timeout_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct EngineSection {
    pub cache_path: Option<PathBuf>,
    pub max_browsers: Option<usize>,
    pub download_size: Option<i64>,
    pub download_steps: Option<u32>,
}

/// Merged configuration from file + CLI
#[derive(Debug)]
pub struct MergedConfig {
    pub bridge: BridgeConfig,
    pub engine: EngineSettings,
}

/// Load config from file
pub fn load_config(path: Option<&Path>) -> Result<FileConfig> {
    match path {
        Some(path) => {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read config file: {}", path.display()))?;
            let config: FileConfig = toml::from_str(&content)
                .with_context(|| format!("failed to parse config file: {}", path.display()))?;
            Ok(config)
        }
        None => Ok(FileConfig::default()),
    }
}

/// Merge file config with CLI args (CLI takes precedence)
pub fn merge_config(file: FileConfig, cli: &Cli) -> Result<MergedConfig> {
    let server = file.server;

    // Endpoint: CLI > file > default pipe; a CLI choice replaces the file's entirely
    let endpoint = match (&cli.pipe, cli.port) {
        (Some(pipe), _) => Endpoint::Pipe(pipe.clone()),
        (None, Some(port)) => Endpoint::Tcp(port),
        (None, None) => match (server.pipe, server.port) {
            (Some(_), Some(_)) => anyhow::bail!("config sets both server.pipe and server.port"),
            (Some(pipe), None) => Endpoint::Pipe(pipe),
            (None, Some(port)) => Endpoint::Tcp(port),
            (None, None) => Endpoint::default_pipe(),
        },
    };

    let mut bridge = BridgeConfig::builder().endpoint(endpoint);
    if let Some(ms) = cli.timeout_ms.or(server.timeout_ms) {
        bridge = bridge.sync_timeout(Duration::from_millis(ms));
    }
    if let Some(len) = server.max_frame_len {
        bridge = bridge.max_frame_len(len);
    }
    if let Some(capacity) = server.outbox_capacity {
        bridge = bridge.outbox_capacity(capacity);
    }
    if let Some(ms) = server.backward_connect_timeout_ms {
        bridge = bridge.backward_connect_timeout(Duration::from_millis(ms));
    }
    let bridge = bridge.build().context("invalid server configuration")?;

    let engine_file = file.engine;
    let mut engine = EngineSettings::builder();
    if let Some(path) = cli.cache_path.as_ref().or(engine_file.cache_path.as_ref()) {
        engine = engine.cache_path(path);
    }
    if let Some(count) = engine_file.max_browsers {
        engine = engine.max_browsers(count);
    }
    if let Some(bytes) = engine_file.download_size {
        engine = engine.download_size(bytes);
    }
    if let Some(steps) = engine_file.download_steps {
        engine = engine.download_steps(steps);
    }

    Ok(MergedConfig {
        bridge,
        engine: engine.build(),
    })
}
