// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Relay Node Configuration
//
// Defines the configuration schema for relay nodes, including:
// - Kubernetes-style manifest format (apiVersion/kind/metadata/spec)
// - Shared store backend selection
// - Presence, liveness and history tuning
// - Network and observability settings

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::domain::history::{HistoryPolicy, DEFAULT_HISTORY_CAPACITY, DEFAULT_MAX_PAGE, DEFAULT_PAGE};
use crate::domain::repository::{RedisConfig, StorageBackend};

pub const API_VERSION: &str = "agent-relay/v1";
pub const KIND: &str = "RelayNodeConfig";

/// Top-level Kubernetes-style node configuration manifest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfigManifest {
    /// API version (must be "agent-relay/v1")
    #[serde(rename = "apiVersion")]
    pub api_version: String,

    /// Resource kind (must be "RelayNodeConfig")
    pub kind: String,

    pub metadata: ManifestMetadata,

    pub spec: RelayConfigSpec,
}

/// Manifest metadata (Kubernetes-style)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestMetadata {
    /// Human-readable node name
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<HashMap<String, String>>,
}

/// Node configuration specification (content under spec:)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfigSpec {
    pub node: NodeIdentity,

    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub presence: PresenceConfig,

    #[serde(default)]
    pub liveness: LivenessConfig,

    #[serde(default)]
    pub history: HistoryConfig,

    #[serde(default)]
    pub network: NetworkConfig,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub observability: Option<ObservabilityConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeIdentity {
    /// Unique stable node identifier, reported by /health and in logs
    pub id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackendKind {
    Memory,
    Redis,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_backend")]
    pub backend: StoreBackendKind,

    /// Redis connection URL, required when backend is "redis"
    #[serde(default = "default_redis_url")]
    pub url: String,

    /// Bound applied to every store, bus and queue round-trip
    #[serde(default = "default_operation_timeout_ms")]
    pub operation_timeout_ms: u64,

    #[serde(default)]
    pub key_prefix: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            url: default_redis_url(),
            operation_timeout_ms: default_operation_timeout_ms(),
            key_prefix: String::new(),
        }
    }
}

impl StoreConfig {
    pub fn operation_timeout(&self) -> Duration {
        Duration::from_millis(self.operation_timeout_ms)
    }

    pub fn storage_backend(&self) -> StorageBackend {
        match self.backend {
            StoreBackendKind::Memory => StorageBackend::InMemory,
            StoreBackendKind::Redis => StorageBackend::Redis(RedisConfig {
                url: self.url.clone(),
                operation_timeout: self.operation_timeout(),
                key_prefix: self.key_prefix.clone(),
            }),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresenceConfig {
    /// Expiry of a role presence flag
    #[serde(default = "default_presence_ttl_secs")]
    pub ttl_secs: u64,

    /// Delay between connection establishment and the ONLINE flip
    #[serde(default = "default_online_delay_ms")]
    pub online_delay_ms: u64,
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_presence_ttl_secs(),
            online_delay_ms: default_online_delay_ms(),
        }
    }
}

impl PresenceConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn online_delay(&self) -> Duration {
        Duration::from_millis(self.online_delay_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LivenessConfig {
    /// Expected client heartbeat period
    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,

    /// Delay before a heartbeat is rechecked; must exceed the interval
    #[serde(default = "default_check_delay_ms")]
    pub check_delay_ms: u64,

    /// How often the delayed queue is polled for due tasks
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Maximum tasks claimed per poll
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

impl Default for LivenessConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
            check_delay_ms: default_check_delay_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            batch_size: default_batch_size(),
        }
    }
}

impl LivenessConfig {
    pub fn check_delay(&self) -> Duration {
        Duration::from_millis(self.check_delay_ms)
    }

    /// Heartbeat and client status records outlive two check delays.
    pub fn record_ttl(&self) -> Duration {
        Duration::from_millis(self.check_delay_ms.saturating_mul(2))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    #[serde(default = "default_history_capacity")]
    pub capacity: usize,

    #[serde(default = "default_max_page")]
    pub max_page: usize,

    #[serde(default = "default_page")]
    pub default_page: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            capacity: default_history_capacity(),
            max_page: default_max_page(),
            default_page: default_page(),
        }
    }
}

impl HistoryConfig {
    pub fn policy(&self) -> HistoryPolicy {
        HistoryPolicy {
            capacity: self.capacity,
            max_page: self.max_page,
            default_page: self.default_page,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Network bind address (e.g. "0.0.0.0" or "127.0.0.1")
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// HTTP/WebSocket port
    #[serde(default = "default_api_port")]
    pub port: u16,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_api_port(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logging: Option<LoggingConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics: Option<MetricsConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (e.g., "info", "debug", "trace")
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format ("json" or "text")
    #[serde(default = "default_log_format")]
    pub format: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Prometheus scrape port
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

// Default value functions
fn default_backend() -> StoreBackendKind {
    StoreBackendKind::Memory
}

fn default_redis_url() -> String {
    "redis://127.0.0.1:6379".to_string()
}

fn default_operation_timeout_ms() -> u64 {
    2_000
}

fn default_presence_ttl_secs() -> u64 {
    30
}

fn default_online_delay_ms() -> u64 {
    250
}

fn default_heartbeat_interval_ms() -> u64 {
    30_000
}

fn default_check_delay_ms() -> u64 {
    60_000
}

fn default_poll_interval_ms() -> u64 {
    500
}

fn default_batch_size() -> usize {
    64
}

fn default_history_capacity() -> usize {
    DEFAULT_HISTORY_CAPACITY
}

fn default_max_page() -> usize {
    DEFAULT_MAX_PAGE
}

fn default_page() -> usize {
    DEFAULT_PAGE
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_api_port() -> u16 {
    8080
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

fn default_metrics_port() -> u16 {
    9091
}

impl Default for RelayConfigSpec {
    fn default() -> Self {
        Self {
            node: NodeIdentity {
                id: uuid::Uuid::new_v4().to_string(),
            },
            store: StoreConfig::default(),
            presence: PresenceConfig::default(),
            liveness: LivenessConfig::default(),
            history: HistoryConfig::default(),
            network: NetworkConfig::default(),
            observability: None,
        }
    }
}

impl Default for RelayConfigManifest {
    fn default() -> Self {
        let hostname = hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .unwrap_or_else(|| "relay-node".to_string());

        Self {
            api_version: API_VERSION.to_string(),
            kind: KIND.to_string(),
            metadata: ManifestMetadata {
                name: hostname,
                version: Some("1.0.0".to_string()),
                labels: None,
            },
            spec: RelayConfigSpec::default(),
        }
    }
}

impl RelayConfigManifest {
    /// Load configuration from YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to YAML file
    pub fn to_yaml_file(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        let config = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    /// Discover configuration file using precedence order
    /// 1. AGENT_RELAY_CONFIG_PATH environment variable
    /// 2. ./agent-relay.yaml (working directory)
    /// 3. ~/.agent-relay/config.yaml (user home)
    /// 4. /etc/agent-relay/config.yaml (system, Unix) or C:\ProgramData\AgentRelay\config.yaml (Windows)
    pub fn discover_config() -> Option<PathBuf> {
        if let Ok(path) = std::env::var("AGENT_RELAY_CONFIG_PATH") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        let cwd = PathBuf::from("./agent-relay.yaml");
        if cwd.exists() {
            return Some(cwd);
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".agent-relay").join("config.yaml");
            if user_config.exists() {
                return Some(user_config);
            }
        }

        #[cfg(unix)]
        let system_config = PathBuf::from("/etc/agent-relay/config.yaml");
        #[cfg(windows)]
        let system_config = PathBuf::from("C:\\ProgramData\\AgentRelay\\config.yaml");

        if system_config.exists() {
            return Some(system_config);
        }

        None
    }

    /// Load configuration with discovery, fallback to default
    pub fn load_or_default(cli_path: Option<PathBuf>) -> anyhow::Result<Self> {
        // Explicit CLI path fails if missing/invalid
        if let Some(path) = cli_path {
            tracing::info!("Loading configuration from explicit path: {:?}", path);
            let mut config = Self::from_yaml_file(&path).map_err(|e| {
                anyhow::anyhow!("Failed to load config at {:?}: {}", path, e)
            })?;
            config.apply_env_overrides();
            return Ok(config);
        }

        if let Some(config_path) = Self::discover_config() {
            tracing::info!("Loading configuration from discovered path: {:?}", config_path);
            let mut config = Self::from_yaml_file(config_path)?;
            config.apply_env_overrides();
            Ok(config)
        } else {
            tracing::warn!("No configuration file found in standard locations. Using defaults.");
            let mut config = Self::default();
            config.apply_env_overrides();
            Ok(config)
        }
    }

    /// Apply environment variable overrides to configuration
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup("AGENT_RELAY_REDIS_URL") {
            tracing::info!("Environment override: AGENT_RELAY_REDIS_URL");
            self.spec.store.url = url;
        }

        if let Some(val) = lookup("AGENT_RELAY_STORE_BACKEND") {
            match val.to_lowercase().as_str() {
                "memory" => self.spec.store.backend = StoreBackendKind::Memory,
                "redis" => self.spec.store.backend = StoreBackendKind::Redis,
                _ => {
                    tracing::warn!(
                        "Invalid value for AGENT_RELAY_STORE_BACKEND: '{}'. Expected memory/redis. Ignoring.",
                        val
                    );
                }
            }
        }

        if let Some(val) = lookup("AGENT_RELAY_PORT") {
            match val.parse::<u16>() {
                Ok(port) => {
                    tracing::info!("Environment override: AGENT_RELAY_PORT={}", port);
                    self.spec.network.port = port;
                }
                Err(_) => {
                    tracing::warn!("Invalid value for AGENT_RELAY_PORT: '{}'. Ignoring.", val);
                }
            }
        }

        if let Some(id) = lookup("AGENT_RELAY_NODE_ID") {
            self.spec.node.id = id;
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.api_version != API_VERSION {
            anyhow::bail!(
                "Invalid apiVersion: '{}'. Must be '{}'",
                self.api_version,
                API_VERSION
            );
        }

        if self.kind != KIND {
            anyhow::bail!("Invalid kind: '{}'. Must be '{}'", self.kind, KIND);
        }

        if self.metadata.name.is_empty() {
            anyhow::bail!("metadata.name cannot be empty");
        }

        if self.spec.node.id.is_empty() {
            anyhow::bail!("spec.node.id cannot be empty");
        }

        if self.spec.store.backend == StoreBackendKind::Redis && self.spec.store.url.is_empty() {
            anyhow::bail!("spec.store.url is required for the redis backend");
        }

        if self.spec.store.operation_timeout_ms == 0 {
            anyhow::bail!("spec.store.operation_timeout_ms must be greater than 0");
        }

        let liveness = &self.spec.liveness;
        if liveness.heartbeat_interval_ms == 0 {
            anyhow::bail!("spec.liveness.heartbeat_interval_ms must be greater than 0");
        }
        if liveness.check_delay_ms <= liveness.heartbeat_interval_ms {
            anyhow::bail!(
                "spec.liveness.check_delay_ms ({}) must be greater than heartbeat_interval_ms ({})",
                liveness.check_delay_ms,
                liveness.heartbeat_interval_ms
            );
        }
        if liveness.batch_size == 0 || liveness.poll_interval_ms == 0 {
            anyhow::bail!("spec.liveness.batch_size and poll_interval_ms must be greater than 0");
        }

        let history = &self.spec.history;
        if history.capacity == 0 {
            anyhow::bail!("spec.history.capacity must be greater than 0");
        }
        if history.default_page == 0 || history.default_page > history.max_page {
            anyhow::bail!(
                "spec.history.default_page ({}) must be between 1 and max_page ({})",
                history.default_page,
                history.max_page
            );
        }

        Ok(())
    }

    pub fn logging(&self) -> Option<&LoggingConfig> {
        self.spec.observability.as_ref().and_then(|o| o.logging.as_ref())
    }

    pub fn metrics(&self) -> Option<&MetricsConfig> {
        self.spec.observability.as_ref().and_then(|o| o.metrics.as_ref())
    }
}
