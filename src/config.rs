use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::dispatcher::DEFAULT_SYNC_TIMEOUT;
use crate::error::{BridgeError, Result};
use crate::ipc::{DEFAULT_MAX_FRAME_LEN, Endpoint};

/// Events queued per backward channel before new ones are dropped
pub const DEFAULT_OUTBOX_CAPACITY: usize = 256;

/// How long opening a backward channel may take
pub const DEFAULT_BACKWARD_CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

/// Smallest frame limit that still fits every fixed-size request
const MIN_FRAME_LEN: usize = 64;

/// Runtime configuration of the bridge
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    endpoint: Endpoint,
    sync_timeout: Duration,
    max_frame_len: usize,
    outbox_capacity: usize,
    backward_connect_timeout: Duration,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            endpoint: Endpoint::default_pipe(),
            sync_timeout: DEFAULT_SYNC_TIMEOUT,
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
            outbox_capacity: DEFAULT_OUTBOX_CAPACITY,
            backward_connect_timeout: DEFAULT_BACKWARD_CONNECT_TIMEOUT,
        }
    }
}

impl BridgeConfig {
    /// Create a new builder for BridgeConfig
    pub fn builder() -> BridgeConfigBuilder {
        BridgeConfigBuilder::default()
    }

    /// Where the forward RPC server listens
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// How long a synchronous engine call may block its caller
    pub fn sync_timeout(&self) -> Duration {
        self.sync_timeout
    }

    pub fn max_frame_len(&self) -> usize {
        self.max_frame_len
    }

    pub fn outbox_capacity(&self) -> usize {
        self.outbox_capacity
    }

    pub fn backward_connect_timeout(&self) -> Duration {
        self.backward_connect_timeout
    }
}

/// Builder for BridgeConfig
#[derive(Debug, Default)]
pub struct BridgeConfigBuilder {
    inner: BridgeConfig,
}

impl BridgeConfigBuilder {
    pub fn endpoint(mut self, endpoint: Endpoint) -> Self {
        self.inner.endpoint = endpoint;
        self
    }

    /// Listen on a local socket path
    pub fn pipe(self, path: impl AsRef<Path>) -> Self {
        self.endpoint(Endpoint::Pipe(path.as_ref().to_path_buf()))
    }

    /// Listen on a loopback TCP port
    pub fn tcp_port(self, port: u16) -> Self {
        self.endpoint(Endpoint::Tcp(port))
    }

    pub fn sync_timeout(mut self, timeout: Duration) -> Self {
        self.inner.sync_timeout = timeout;
        self
    }

    pub fn max_frame_len(mut self, len: usize) -> Self {
        self.inner.max_frame_len = len;
        self
    }

    pub fn outbox_capacity(mut self, capacity: usize) -> Self {
        self.inner.outbox_capacity = capacity;
        self
    }

    pub fn backward_connect_timeout(mut self, timeout: Duration) -> Self {
        self.inner.backward_connect_timeout = timeout;
        self
    }

    /// Validate and build the configuration
    pub fn build(self) -> Result<BridgeConfig> {
        let config = self.inner;
        if config.sync_timeout.is_zero() {
            return Err(BridgeError::Config("sync timeout must be positive".to_string()));
        }
        if config.max_frame_len < MIN_FRAME_LEN || config.max_frame_len > u32::MAX as usize {
            return Err(BridgeError::Config(format!(
                "max frame length must be between {MIN_FRAME_LEN} and {}",
                u32::MAX
            )));
        }
        if config.outbox_capacity == 0 {
            return Err(BridgeError::Config("outbox capacity must be positive".to_string()));
        }
        if config.backward_connect_timeout.is_zero() {
            return Err(BridgeError::Config(
                "backward connect timeout must be positive".to_string(),
            ));
        }
        Ok(config)
    }
}

/// Settings of the headless engine
#[derive(Debug, Clone)]
pub struct EngineSettings {
    cache_path: Option<PathBuf>,
    max_browsers: usize,
    download_size: i64,
    download_steps: u32,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            cache_path: None,
            max_browsers: 64,
            download_size: 1024 * 1024,
            download_steps: 4,
        }
    }
}

impl EngineSettings {
    /// Create a new builder for EngineSettings
    pub fn builder() -> EngineSettingsBuilder {
        EngineSettingsBuilder::default()
    }

    /// Directory for persistent engine data; created at init
    pub fn cache_path(&self) -> Option<&Path> {
        self.cache_path.as_deref()
    }

    /// Browser creation fails once this many are open
    pub fn max_browsers(&self) -> usize {
        self.max_browsers
    }

    /// Simulated size of every download, in bytes
    pub fn download_size(&self) -> i64 {
        self.download_size
    }

    /// Progress updates sent per download
    pub fn download_steps(&self) -> u32 {
        self.download_steps
    }
}

/// Builder for EngineSettings
#[derive(Debug, Default)]
pub struct EngineSettingsBuilder {
    inner: EngineSettings,
}

impl EngineSettingsBuilder {
    pub fn cache_path(mut self, path: impl AsRef<Path>) -> Self {
        self.inner.cache_path = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn max_browsers(mut self, count: usize) -> Self {
        self.inner.max_browsers = count;
        self
    }

    pub fn download_size(mut self, bytes: i64) -> Self {
        self.inner.download_size = bytes.max(0);
        self
    }

    pub fn download_steps(mut self, steps: u32) -> Self {
        self.inner.download_steps = steps.max(1);
        self
    }

    pub fn build(self) -> EngineSettings {
        self.inner
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = BridgeConfig::builder().build().unwrap();
        assert_eq!(config.sync_timeout(), Duration::from_millis(1000));
        assert_eq!(config.max_frame_len(), 16 * 1024 * 1024);
        assert_eq!(*config.endpoint(), Endpoint::default_pipe());
    }

    #[test]
    fn test_builder_rejects_invalid_values() {
        assert!(matches!(
            BridgeConfig::builder().sync_timeout(Duration::ZERO).build(),
            Err(BridgeError::Config(_))
        ));
        assert!(BridgeConfig::builder().max_frame_len(8).build().is_err());
        assert!(BridgeConfig::builder().outbox_capacity(0).build().is_err());
    }

    #[test]
    fn test_builder_sets_endpoint() {
        let config = BridgeConfig::builder().tcp_port(4000).build().unwrap();
        assert_eq!(*config.endpoint(), Endpoint::Tcp(4000));

        let config = BridgeConfig::builder().pipe("/tmp/bridge.sock").build().unwrap();
        assert_eq!(*config.endpoint(), Endpoint::Pipe(PathBuf::from("/tmp/bridge.sock")));
    }

    #[test]
    fn test_engine_settings_clamp() {
        let settings = EngineSettings::builder().download_steps(0).download_size(-5).build();
        assert_eq!(settings.download_steps(), 1);
        assert_eq!(settings.download_size(), 0);
        assert!(settings.cache_path().is_none());
    }
}
