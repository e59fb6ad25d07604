//! Configuration types for the mesh stack
//!
//! [`StackConfig`] covers client transaction defaults, the capacities of the two
//! dispatch queues, deep-copy behaviour and the roles the stack may act as.
//! Every field has a default so partial JSON files are accepted.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

use crate::error::{MeshError, Result};
use crate::role::Capabilities;

/// Default client response timeout
pub const DEFAULT_CLIENT_TIMEOUT_MS: u64 = 4000;

/// Default capacity of each dispatch queue
pub const DEFAULT_QUEUE_SIZE: usize = 128;

/// Default limit for a single deep-copied field
pub const DEFAULT_MAX_FIELD_LEN: usize = 384;

/// Main configuration for a mesh stack instance
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StackConfig {
    /// Client model settings
    #[serde(default)]
    pub client: ClientConfig,

    /// Dispatch queue settings
    #[serde(default)]
    pub bridge: BridgeConfig,

    /// Deep-copy settings
    #[serde(default)]
    pub copy: CopyConfig,

    /// Roles this stack supports
    #[serde(default)]
    pub capabilities: Capabilities,
}

/// Client model settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Timeout used when a request does not carry one
    #[serde(with = "humantime_serde", default = "default_client_timeout")]
    pub default_timeout: Duration,
}

fn default_client_timeout() -> Duration {
    Duration::from_millis(DEFAULT_CLIENT_TIMEOUT_MS)
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            default_timeout: default_client_timeout(),
        }
    }
}

/// Capacities of the caller-to-processing and processing-to-application queues
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    #[serde(default = "default_queue_size")]
    pub call_queue_size: usize,

    #[serde(default = "default_queue_size")]
    pub event_queue_size: usize,
}

fn default_queue_size() -> usize {
    DEFAULT_QUEUE_SIZE
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            call_queue_size: DEFAULT_QUEUE_SIZE,
            event_queue_size: DEFAULT_QUEUE_SIZE,
        }
    }
}

/// What to do when a nested field cannot be copied
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CopyPolicy {
    /// Fail the whole submission with `AllocationFailure`
    #[default]
    Reject,
    /// Deliver the field empty and mark the envelope degraded
    Degrade,
}

/// Deep-copy settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CopyConfig {
    #[serde(default)]
    pub policy: CopyPolicy,

    /// Largest variable-length field accepted by a single copy
    #[serde(default = "default_max_field_len")]
    pub max_field_len: usize,
}

fn default_max_field_len() -> usize {
    DEFAULT_MAX_FIELD_LEN
}

impl Default for CopyConfig {
    fn default() -> Self {
        Self {
            policy: CopyPolicy::Reject,
            max_field_len: DEFAULT_MAX_FIELD_LEN,
        }
    }
}

impl StackConfig {
    /// Parse a JSON document
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: StackConfig =
            serde_json::from_str(json).map_err(|e| MeshError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a JSON file
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| MeshError::InvalidConfig(format!("{}: {}", path.display(), e)))?;
        let config = Self::from_json_str(&json)?;
        debug!("Loaded stack config from {}", path.display());
        Ok(config)
    }

    /// Reject values the stack cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.client.default_timeout.is_zero() {
            return Err(MeshError::InvalidConfig(
                "client.default_timeout must be non-zero".to_string(),
            ));
        }
        if self.bridge.call_queue_size == 0 || self.bridge.event_queue_size == 0 {
            return Err(MeshError::InvalidConfig(
                "queue sizes must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Builder for StackConfig
#[derive(Debug, Default)]
pub struct StackConfigBuilder {
    config: StackConfig,
}

impl StackConfigBuilder {
    /// Create a new builder with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the fallback client timeout
    pub fn default_timeout(mut self, timeout: Duration) -> Self {
        self.config.client.default_timeout = timeout;
        self
    }

    /// Set the capacity of the call queue
    pub fn call_queue_size(mut self, size: usize) -> Self {
        self.config.bridge.call_queue_size = size;
        self
    }

    /// Set the capacity of the event queue
    pub fn event_queue_size(mut self, size: usize) -> Self {
        self.config.bridge.event_queue_size = size;
        self
    }

    /// Set the deep-copy failure policy
    pub fn copy_policy(mut self, policy: CopyPolicy) -> Self {
        self.config.copy.policy = policy;
        self
    }

    /// Set the per-field deep-copy limit
    pub fn max_field_len(mut self, len: usize) -> Self {
        self.config.copy.max_field_len = len;
        self
    }

    /// Enable or disable the provisioner role
    pub fn provisioner(mut self, enabled: bool) -> Self {
        self.config.capabilities.provisioner = enabled;
        self
    }

    /// Enable or disable the fast-provisioning role
    pub fn fast_prov(mut self, enabled: bool) -> Self {
        self.config.capabilities.fast_prov = enabled;
        self
    }

    /// Build the configuration
    pub fn build(self) -> StackConfig {
        self.config
    }
}

// Custom serde module for Duration with humantime
mod humantime_serde {
    use serde::{self, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let s = humantime::format_duration(*duration).to_string();
        serializer.serialize_str(&s)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = StackConfig::default();
        assert_eq!(config.client.default_timeout, Duration::from_secs(4));
        assert_eq!(config.bridge.call_queue_size, DEFAULT_QUEUE_SIZE);
        assert_eq!(config.copy.policy, CopyPolicy::Reject);
        assert!(config.capabilities.provisioner);
        assert!(!config.capabilities.fast_prov);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_builder() {
        let config = StackConfigBuilder::new()
            .default_timeout(Duration::from_millis(250))
            .copy_policy(CopyPolicy::Degrade)
            .max_field_len(16)
            .fast_prov(true)
            .build();

        assert_eq!(config.client.default_timeout, Duration::from_millis(250));
        assert_eq!(config.copy.policy, CopyPolicy::Degrade);
        assert_eq!(config.copy.max_field_len, 16);
        assert!(config.capabilities.fast_prov);
    }

    #[test]
    fn test_partial_json() {
        let config = StackConfig::from_json_str(
            r#"{ "client": { "default_timeout": "1s 500ms" }, "copy": { "policy": "degrade" } }"#,
        )
        .unwrap();

        assert_eq!(config.client.default_timeout, Duration::from_millis(1500));
        assert_eq!(config.copy.policy, CopyPolicy::Degrade);
        assert_eq!(config.copy.max_field_len, DEFAULT_MAX_FIELD_LEN);
        assert_eq!(config.bridge.event_queue_size, DEFAULT_QUEUE_SIZE);
    }

    #[test]
    fn test_validate_rejects_zero_queue() {
        let config = StackConfigBuilder::new().call_queue_size(0).build();
        assert!(matches!(
            config.validate(),
            Err(MeshError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_bad_duration() {
        let result = StackConfig::from_json_str(r#"{ "client": { "default_timeout": "soon" } }"#);
        assert!(result.is_err());
    }
}
