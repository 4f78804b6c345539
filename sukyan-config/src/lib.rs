//! Configuration for the scan core: worker-pool sizes, timeouts, and
//! per-phase toggles (SPEC_FULL §1). Loaded from a TOML file with an
//! environment overlay, the way `NexusConfig::from_file` layers
//! configuration for the teacher's gRPC server.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    ReadFailed(String),
    #[error("failed to parse config: {0}")]
    ParseFailed(String),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateScannerConfig {
    pub worker_pool_size: usize,
    pub max_retries: u32,
    pub retry_backoff_seconds: u64,
    pub default_timeout_seconds: u64,
    pub time_based_min_timeout_seconds: u64,
    pub time_based_max_timeout_seconds: u64,
    pub revalidation_rounds: u32,
    pub avoid_repeated_issues: bool,
}

impl Default for TemplateScannerConfig {
    fn default() -> Self {
        Self {
            worker_pool_size: 4,
            max_retries: 2,
            retry_backoff_seconds: 10,
            default_timeout_seconds: 120,
            time_based_min_timeout_seconds: 30,
            time_based_max_timeout_seconds: 300,
            revalidation_rounds: 7,
            avoid_repeated_issues: true,
        }
    }
}

impl TemplateScannerConfig {
    /// `2 * expected_sleep` clamped to `[30s, 5m]` (spec §4.4).
    pub fn time_based_timeout(&self, expected_sleep: Duration) -> Duration {
        let doubled = expected_sleep * 2;
        doubled.clamp(
            Duration::from_secs(self.time_based_min_timeout_seconds),
            Duration::from_secs(self.time_based_max_timeout_seconds),
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebSocketScannerConfig {
    pub worker_pool_size: usize,
    pub observation_window_seconds: u64,
    pub revalidation_rounds: u32,
    pub message_channel_capacity: usize,
    pub message_channel_send_timeout_seconds: u64,
    pub replay_inter_message_delay_ms: u64,
    pub max_message_bytes: usize,
}

impl Default for WebSocketScannerConfig {
    fn default() -> Self {
        Self {
            worker_pool_size: 6,
            observation_window_seconds: 10,
            revalidation_rounds: 5,
            message_channel_capacity: 100,
            message_channel_send_timeout_seconds: 5,
            replay_inter_message_delay_ms: 100,
            max_message_bytes: 1024 * 1024,
        }
    }
}

impl WebSocketScannerConfig {
    pub fn observation_window(&self) -> Duration {
        Duration::from_secs(self.observation_window_seconds)
    }

    /// The context deadline is `2 * observation_window` (spec §5).
    pub fn context_deadline(&self) -> Duration {
        self.observation_window() * 2
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    pub poll_interval_seconds: u64,
    pub fingerprint_batch_size: usize,
    pub retirejs_max_parallel_per_base_url: usize,
    pub enable_nuclei: bool,
    pub enable_fingerprint: bool,
    pub enable_site_behavior: bool,
    pub enable_discovery: bool,
    pub enable_api_behavior: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            poll_interval_seconds: 10,
            fingerprint_batch_size: 500,
            retirejs_max_parallel_per_base_url: 10,
            enable_nuclei: true,
            enable_fingerprint: true,
            enable_site_behavior: true,
            enable_discovery: true,
            enable_api_behavior: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyConfig {
    pub bind_address: String,
    pub port: u16,
    pub vhost: String,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1".to_string(),
            port: 8008,
            vhost: "sukyan".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SukyanConfig {
    pub template_scanner: TemplateScannerConfig,
    pub websocket_scanner: WebSocketScannerConfig,
    pub orchestrator: OrchestratorConfig,
    pub proxy: ProxyConfig,
}

impl SukyanConfig {
    /// Load from a TOML file, overlaying `SUKYAN_*` environment variables
    /// (e.g. `SUKYAN_PROXY__PORT=9000`), the way the teacher's
    /// `NexusConfig::from_file` layers file and override configuration.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let builder = config::Config::builder()
            .add_source(config::File::from(path.as_ref()).required(true))
            .add_source(config::Environment::with_prefix("SUKYAN").separator("__"));

        let built = builder
            .build()
            .map_err(|e| ConfigError::ReadFailed(e.to_string()))?;

        let config: Self = built
            .try_deserialize()
            .map_err(|e| ConfigError::ParseFailed(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.template_scanner.worker_pool_size == 0 {
            return Err(ConfigError::Invalid(
                "template_scanner.worker_pool_size must be at least 1".to_string(),
            ));
        }
        if self.websocket_scanner.worker_pool_size == 0 {
            return Err(ConfigError::Invalid(
                "websocket_scanner.worker_pool_size must be at least 1".to_string(),
            ));
        }
        if self.template_scanner.time_based_min_timeout_seconds
            >= self.template_scanner.time_based_max_timeout_seconds
        {
            return Err(ConfigError::Invalid(
                "template_scanner time-based timeout bounds are inverted".to_string(),
            ));
        }
        if self.orchestrator.poll_interval_seconds == 0 {
            return Err(ConfigError::Invalid(
                "orchestrator.poll_interval_seconds must be at least 1".to_string(),
            ));
        }
        if self.proxy.vhost.is_empty() {
            return Err(ConfigError::Invalid("proxy.vhost must not be empty".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        assert!(SukyanConfig::default().validate().is_ok());
    }

    #[test]
    fn zero_worker_pool_is_rejected() {
        let mut config = SukyanConfig::default();
        config.template_scanner.worker_pool_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn time_based_timeout_is_clamped() {
        let config = TemplateScannerConfig::default();
        assert_eq!(
            config.time_based_timeout(Duration::from_secs(1)),
            Duration::from_secs(30)
        );
        assert_eq!(
            config.time_based_timeout(Duration::from_secs(5)),
            Duration::from_secs(30)
        );
        assert_eq!(
            config.time_based_timeout(Duration::from_secs(200)),
            Duration::from_secs(300)
        );
        assert_eq!(
            config.time_based_timeout(Duration::from_secs(60)),
            Duration::from_secs(120)
        );
    }

    #[test]
    fn websocket_context_deadline_is_double_the_window() {
        let config = WebSocketScannerConfig::default();
        assert_eq!(config.context_deadline(), config.observation_window() * 2);
    }
}
