use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::ipc::ProtocolLimits;

/// Default path of the observation socket
pub const DEFAULT_OBSERVATION_SOCKET: &str = "/tmp/tickbridge_observation.sock";

/// Default path of the command socket
pub const DEFAULT_COMMAND_SOCKET: &str = "/tmp/tickbridge_command.sock";

/// Configuration for the bridge and its transport
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    observation_socket: PathBuf,
    command_socket: PathBuf,
    limits: ProtocolLimits,
    shutdown_timeout: Duration,
    suppress_system_pointer: bool,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            observation_socket: PathBuf::from(DEFAULT_OBSERVATION_SOCKET),
            command_socket: PathBuf::from(DEFAULT_COMMAND_SOCKET),
            limits: ProtocolLimits::default(),
            shutdown_timeout: Duration::from_secs(5),
            suppress_system_pointer: true,
        }
    }
}

impl BridgeConfig {
    /// Create a new builder for BridgeConfig
    pub fn builder() -> BridgeConfigBuilder {
        BridgeConfigBuilder::default()
    }

    pub fn observation_socket(&self) -> &Path {
        &self.observation_socket
    }

    pub fn command_socket(&self) -> &Path {
        &self.command_socket
    }

    pub fn limits(&self) -> &ProtocolLimits {
        &self.limits
    }

    /// How long `stop()` waits for the transport thread before giving up on it
    pub fn shutdown_timeout(&self) -> Duration {
        self.shutdown_timeout
    }

    pub fn suppress_system_pointer(&self) -> bool {
        self.suppress_system_pointer
    }
}

/// Builder for BridgeConfig
#[derive(Debug, Default)]
pub struct BridgeConfigBuilder {
    inner: BridgeConfig,
}

impl BridgeConfigBuilder {
    pub fn observation_socket(mut self, path: impl AsRef<Path>) -> Self {
        self.inner.observation_socket = path.as_ref().to_path_buf();
        self
    }

    pub fn command_socket(mut self, path: impl AsRef<Path>) -> Self {
        self.inner.command_socket = path.as_ref().to_path_buf();
        self
    }

    pub fn limits(mut self, limits: ProtocolLimits) -> Self {
        self.inner.limits = limits;
        self
    }

    pub fn max_keys(mut self, max: usize) -> Self {
        self.inner.limits.max_keys = max;
        self
    }

    pub fn max_text_bytes(mut self, max: usize) -> Self {
        self.inner.limits.max_text_bytes = max;
        self
    }

    pub fn max_frame_bytes(mut self, max: usize) -> Self {
        self.inner.limits.max_frame_bytes = max;
        self
    }

    pub fn shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.inner.shutdown_timeout = timeout;
        self
    }

    pub fn suppress_system_pointer(mut self, enabled: bool) -> Self {
        self.inner.suppress_system_pointer = enabled;
        self
    }

    pub fn build(self) -> BridgeConfig {
        self.inner
    }
}
