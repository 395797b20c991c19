use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use tickbridge::{BridgeConfig, ProtocolLimits};

use crate::cli::CommonArgs;

const DEFAULT_WINDOW: (u32, u32) = (320, 240);
const DEFAULT_SENSITIVITY: f64 = 0.5;
const DEFAULT_CONNECT_ATTEMPTS: u32 = 3;
const DEFAULT_CONNECT_DELAY: Duration = Duration::from_secs(1);

/// TOML config file structure
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    /// Socket paths
    pub sockets: SocketsSection,

    /// Wire limits
    pub limits: LimitsSection,

    /// Input injection settings
    pub input: InputSection,

    /// Synthetic window used by `serve`
    pub window: WindowSection,

    /// Connection and shutdown timing
    pub transport: TransportSection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SocketsSection {
    pub observation: Option<PathBuf>,
    pub command: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct LimitsSection {
    pub max_keys: Option<usize>,
    pub max_text_bytes: Option<usize>,
    pub max_frame_bytes: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct InputSection {
    pub suppress_system_pointer: Option<bool>,
    pub mouse_sensitivity: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct WindowSection {
    pub width: Option<u32>,
    pub height: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct TransportSection {
    pub shutdown_timeout_ms: Option<u64>,
    pub connect_attempts: Option<u32>,
    pub connect_delay_ms: Option<u64>,
}

/// Merged configuration from file + CLI
pub struct MergedConfig {
    pub bridge: BridgeConfig,
    pub window: (u32, u32),
    pub mouse_sensitivity: f64,
    pub connect_attempts: u32,
    pub connect_delay: Duration,
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
pub fn merge_config(file: FileConfig, cli: &CommonArgs) -> Result<MergedConfig> {
    let mut builder = BridgeConfig::builder();

    // Sockets: CLI > file > library default
    if let Some(path) = cli.observation_socket.as_ref().or(file.sockets.observation.as_ref()) {
        builder = builder.observation_socket(path);
    }
    if let Some(path) = cli.command_socket.as_ref().or(file.sockets.command.as_ref()) {
        builder = builder.command_socket(path);
    }

    builder = builder.limits(build_limits(&file.limits, cli));

    if let Some(ms) = file.transport.shutdown_timeout_ms {
        builder = builder.shutdown_timeout(Duration::from_millis(ms));
    }
    if let Some(suppress) = file.input.suppress_system_pointer {
        builder = builder.suppress_system_pointer(suppress);
    }

    let width = cli
        .width
        .or(file.window.width)
        .unwrap_or(DEFAULT_WINDOW.0);
    let height = cli
        .height
        .or(file.window.height)
        .unwrap_or(DEFAULT_WINDOW.1);
    if width == 0 || height == 0 {
        anyhow::bail!("window size must be non-zero, got {width}x{height}");
    }

    let mouse_sensitivity = cli
        .sensitivity
        .or(file.input.mouse_sensitivity)
        .unwrap_or(DEFAULT_SENSITIVITY);
    if !(0.0..=1.0).contains(&mouse_sensitivity) {
        anyhow::bail!("mouse sensitivity must be within [0, 1], got {mouse_sensitivity}");
    }

    let connect_attempts = cli
        .connect_attempts
        .or(file.transport.connect_attempts)
        .unwrap_or(DEFAULT_CONNECT_ATTEMPTS);
    let connect_delay = file
        .transport
        .connect_delay_ms
        .map(Duration::from_millis)
        .unwrap_or(DEFAULT_CONNECT_DELAY);

    Ok(MergedConfig {
        bridge: builder.build(),
        window: (width, height),
        mouse_sensitivity,
        connect_attempts,
        connect_delay,
    })
}

fn build_limits(file: &LimitsSection, cli: &CommonArgs) -> ProtocolLimits {
    let defaults = ProtocolLimits::default();
    ProtocolLimits {
        max_keys: cli.max_keys.or(file.max_keys).unwrap_or(defaults.max_keys),
        max_text_bytes: cli
            .max_text_bytes
            .or(file.max_text_bytes)
            .unwrap_or(defaults.max_text_bytes),
        max_frame_bytes: cli
            .max_frame_bytes
            .or(file.max_frame_bytes)
            .unwrap_or(defaults.max_frame_bytes),
    }
}
