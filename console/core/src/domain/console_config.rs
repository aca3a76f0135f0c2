// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Console Configuration Types
//
// Defines the configuration schema for an Aether console session:
// - Kubernetes-style manifest format (apiVersion/kind/metadata/spec)
// - Playback clock and entity store bounds
// - Generation endpoint and model defaults
// - Credential vault location
// - Remote sync (studio) connection settings

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const API_VERSION: &str = "aether.console/v1";
pub const KIND: &str = "ConsoleConfig";

/// Top-level console configuration manifest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsoleConfig {
    /// API version (must be "aether.console/v1")
    #[serde(rename = "apiVersion")]
    pub api_version: String,

    /// Resource kind (must be "ConsoleConfig")
    pub kind: String,

    pub metadata: ConfigMetadata,

    #[serde(default)]
    pub spec: ConsoleConfigSpec,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigMetadata {
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConsoleConfigSpec {
    #[serde(default)]
    pub playback: PlaybackConfig,

    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub llm: LlmConfig,

    #[serde(default)]
    pub vault: VaultConfig,

    #[serde(default)]
    pub sync: SyncConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackConfig {
    /// Real-time period between ticks
    #[serde(default = "default_tick_interval")]
    pub tick_interval_ms: u64,

    #[serde(default = "default_speed")]
    pub default_speed: f64,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval(),
            default_speed: default_speed(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreConfig {
    #[serde(default = "default_max_messages")]
    pub max_messages: usize,

    #[serde(default = "default_max_logs")]
    pub max_logs: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            max_messages: default_max_messages(),
            max_logs: default_max_logs(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LlmConfig {
    #[serde(default = "default_llm_endpoint")]
    pub endpoint: String,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            endpoint: default_llm_endpoint(),
            model: default_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VaultConfig {
    /// Where the encrypted API key is persisted
    #[serde(default = "default_vault_path")]
    pub path: PathBuf,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            path: default_vault_path(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncConfig {
    #[serde(default = "default_studio_url")]
    pub studio_url: String,

    /// Reconnect once after an unexpected close
    #[serde(default)]
    pub auto_sync: bool,

    #[serde(default = "default_reconnect_delay")]
    pub reconnect_delay_ms: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            studio_url: default_studio_url(),
            auto_sync: false,
            reconnect_delay_ms: default_reconnect_delay(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_tick_interval() -> u64 {
    100
}

fn default_speed() -> f64 {
    1.0
}

fn default_max_messages() -> usize {
    100
}

fn default_max_logs() -> usize {
    500
}

fn default_llm_endpoint() -> String {
    "https://generativelanguage.googleapis.com/v1beta/models".to_string()
}

fn default_model() -> String {
    "gemini-2.0-flash".to_string()
}

fn default_temperature() -> f32 {
    0.7
}

fn default_max_tokens() -> u32 {
    1024
}

fn default_vault_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".aether")
        .join("credentials.json")
}

fn default_studio_url() -> String {
    "ws://localhost:3001/api/ws".to_string()
}

fn default_reconnect_delay() -> u64 {
    5000
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            api_version: API_VERSION.to_string(),
            kind: KIND.to_string(),
            metadata: ConfigMetadata {
                name: "aether-console".to_string(),
                version: Some("1.0.0".to_string()),
            },
            spec: ConsoleConfigSpec::default(),
        }
    }
}

impl ConsoleConfig {
    /// Load configuration from YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
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
    /// 1. AETHER_CONFIG_PATH environment variable
    /// 2. ./aether-config.yaml (working directory)
    /// 3. ~/.aether/config.yaml (user home)
    /// 4. /etc/aether/config.yaml (Unix)
    pub fn discover_config() -> Option<PathBuf> {
        if let Ok(path) = std::env::var("AETHER_CONFIG_PATH") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        let cwd = PathBuf::from("./aether-config.yaml");
        if cwd.exists() {
            return Some(cwd);
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".aether").join("config.yaml");
            if user_config.exists() {
                return Some(user_config);
            }
        }

        #[cfg(unix)]
        {
            let system_config = PathBuf::from("/etc/aether/config.yaml");
            if system_config.exists() {
                return Some(system_config);
            }
        }

        None
    }

    /// Load configuration with discovery, fallback to default
    pub fn load_or_default(cli_path: Option<PathBuf>) -> anyhow::Result<Self> {
        // Explicit CLI path must exist and parse
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
            tracing::debug!("No configuration file found in standard locations. Using defaults.");
            let mut config = Self::default();
            config.apply_env_overrides();
            Ok(config)
        }
    }

    /// Apply environment variable overrides to configuration
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary key lookup (the environment in production)
    pub fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup("AETHER_STUDIO_URL") {
            tracing::info!("Environment override: AETHER_STUDIO_URL={}", url);
            self.spec.sync.studio_url = url;
        }

        if let Some(val) = lookup("AETHER_AUTO_SYNC") {
            match val.to_lowercase().as_str() {
                "true" | "1" | "yes" | "on" => {
                    tracing::info!("Environment override: AETHER_AUTO_SYNC=true");
                    self.spec.sync.auto_sync = true;
                }
                "false" | "0" | "no" | "off" => {
                    tracing::info!("Environment override: AETHER_AUTO_SYNC=false");
                    self.spec.sync.auto_sync = false;
                }
                _ => {
                    tracing::warn!(
                        "Invalid value for AETHER_AUTO_SYNC: '{}'. Expected true/false. Ignoring.",
                        val
                    );
                }
            }
        }

        if let Some(model) = lookup("AETHER_LLM_MODEL") {
            tracing::info!("Environment override: AETHER_LLM_MODEL={}", model);
            self.spec.llm.model = model;
        }
    }

    /// Validate configuration
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

        if self.spec.playback.tick_interval_ms == 0 {
            anyhow::bail!("spec.playback.tickIntervalMs must be greater than zero");
        }

        let speed = self.spec.playback.default_speed;
        if !speed.is_finite() || speed <= 0.0 {
            anyhow::bail!("spec.playback.defaultSpeed must be a positive number, got {}", speed);
        }

        if self.spec.store.max_messages == 0 || self.spec.store.max_logs == 0 {
            anyhow::bail!("spec.store bounds must be greater than zero");
        }

        if self.spec.llm.model.is_empty() {
            anyhow::bail!("spec.llm.model cannot be empty");
        }

        let url = &self.spec.sync.studio_url;
        if !(url.starts_with("ws://") || url.starts_with("wss://")) {
            anyhow::bail!("spec.sync.studioUrl must use ws:// or wss://, got '{}'", url);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = ConsoleConfig::default();
        assert_eq!(config.api_version, API_VERSION);
        assert_eq!(config.spec.playback.tick_interval_ms, 100);
        assert_eq!(config.spec.store.max_messages, 100);
        assert_eq!(config.spec.store.max_logs, 500);
        assert_eq!(config.spec.sync.reconnect_delay_ms, 5000);
        assert!(!config.spec.sync.auto_sync);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_yaml_fills_defaults() {
        let yaml = r#"
apiVersion: aether.console/v1
kind: ConsoleConfig
metadata:
  name: demo
spec:
  playback:
    defaultSpeed: 4
  sync:
    autoSync: true
"#;
        let config = ConsoleConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(config.spec.playback.default_speed, 4.0);
        assert_eq!(config.spec.playback.tick_interval_ms, 100);
        assert!(config.spec.sync.auto_sync);
        assert_eq!(config.spec.llm.model, "gemini-2.0-flash");
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("AETHER_STUDIO_URL", "wss://studio.example/ws"),
            ("AETHER_AUTO_SYNC", "yes"),
            ("AETHER_LLM_MODEL", "gemini-1.5-pro"),
        ]);
        let mut config = ConsoleConfig::default();
        config.apply_overrides_from(|k| env.get(k).map(|v| v.to_string()));

        assert_eq!(config.spec.sync.studio_url, "wss://studio.example/ws");
        assert!(config.spec.sync.auto_sync);
        assert_eq!(config.spec.llm.model, "gemini-1.5-pro");
    }

    #[test]
    fn test_invalid_auto_sync_value_is_ignored() {
        let mut config = ConsoleConfig::default();
        config.apply_overrides_from(|k| (k == "AETHER_AUTO_SYNC").then(|| "maybe".to_string()));
        assert!(!config.spec.sync.auto_sync);
    }

    #[test]
    fn test_validation() {
        let mut config = ConsoleConfig::default();

        config.kind = "NodeConfig".to_string();
        assert!(config.validate().is_err());
        config.kind = KIND.to_string();

        config.spec.playback.default_speed = 0.0;
        assert!(config.validate().is_err());
        config.spec.playback.default_speed = f64::NAN;
        assert!(config.validate().is_err());
        config.spec.playback.default_speed = 2.0;

        config.spec.sync.studio_url = "http://localhost:3001".to_string();
        assert!(config.validate().is_err());
        config.spec.sync.studio_url = "wss://localhost:3001/api/ws".to_string();

        config.spec.store.max_logs = 0;
        assert!(config.validate().is_err());
        config.spec.store.max_logs = 10;

        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_yaml_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("aether-config.yaml");

        let mut config = ConsoleConfig::default();
        config.metadata.name = "roundtrip".to_string();
        config.to_yaml_file(&path).unwrap();

        let loaded = ConsoleConfig::load_or_default(Some(path)).unwrap();
        assert_eq!(loaded.metadata.name, "roundtrip");
    }
}
