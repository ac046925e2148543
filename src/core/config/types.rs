//! Public configuration types.
//!
//! [`HostConfig`] is what the loader produces: operator settings only, no
//! derived identities. [`RuntimeConfig`] is the canonical, reconciled shape
//! that every subsystem reads through a [`FrozenConfig`] handle.
//! Raw TOML deserialization types live in `raw.rs`.

use std::collections::BTreeMap;
use std::ops::Deref;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::raw;

// ── Loaded ───────────────────────────────────────────────────────────────────

/// One lattice connection (NATS-style host, port and credentials).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointConfig {
    pub host: String,
    pub port: u16,
    /// Connection seed; empty for anonymous connections.
    pub seed: String,
    /// Connection JWT; empty for anonymous connections.
    pub jwt: String,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            host: raw::default_host(),
            port: raw::default_port(),
            seed: String::new(),
            jwt: String::new(),
        }
    }
}

/// Policy service settings. Evaluation itself happens elsewhere.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyConfig {
    pub topic: Option<String>,
    pub changes_topic: Option<String>,
    pub timeout_ms: u64,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            topic: None,
            changes_topic: None,
            timeout_ms: raw::default_policy_timeout_ms(),
        }
    }
}

/// Logging preferences.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    /// Level for the default plain-text sink.
    pub level: String,
    /// Swap the default sink for a JSON sink once boot completes.
    pub structured: bool,
    pub structured_level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: raw::default_log_level(),
            structured: false,
            structured_level: raw::default_log_level(),
        }
    }
}

/// Operator-supplied host configuration, before identities are resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostConfig {
    pub lattice_prefix: String,
    /// Host seed; `None` generates a fresh host identity every boot.
    pub host_seed: Option<String>,
    /// Cluster seed; empty means ad-hoc.
    pub cluster_seed: String,
    /// Additional accepted signing issuers, kept verbatim.
    pub cluster_issuers: Vec<String>,
    pub rpc: EndpointConfig,
    pub rpc_timeout_ms: u64,
    pub prov_rpc: EndpointConfig,
    pub ctl: EndpointConfig,
    pub ctl_topic_prefix: String,
    pub js_domain: Option<String>,
    pub allow_latest: bool,
    pub allowed_insecure: Vec<String>,
    pub provider_delay_ms: u64,
    pub config_service_enabled: bool,
    pub host_labels: BTreeMap<String, String>,
    pub policy: PolicyConfig,
    pub logging: LoggingConfig,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            lattice_prefix: raw::default_lattice_prefix(),
            host_seed: None,
            cluster_seed: String::new(),
            cluster_issuers: Vec::new(),
            rpc: EndpointConfig::default(),
            rpc_timeout_ms: raw::default_rpc_timeout_ms(),
            prov_rpc: EndpointConfig::default(),
            ctl: EndpointConfig::default(),
            ctl_topic_prefix: raw::default_ctl_topic_prefix(),
            js_domain: None,
            allow_latest: false,
            allowed_insecure: Vec::new(),
            provider_delay_ms: raw::default_provider_delay_ms(),
            config_service_enabled: false,
            host_labels: BTreeMap::new(),
            policy: PolicyConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

// ── Reconciled ───────────────────────────────────────────────────────────────

/// Canonical runtime configuration: operator settings, resolved identities
/// and per-boot ephemeral fields in one flat, serializable document.
///
/// Field names are the keys of the persisted `host_config.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    pub lattice_prefix: String,
    pub host_key: String,
    pub host_seed: String,
    pub cluster_key: String,
    pub cluster_seed: String,
    pub cluster_issuers: Vec<String>,
    pub cluster_adhoc: bool,
    pub rpc_host: String,
    pub rpc_port: u16,
    pub rpc_seed: String,
    pub rpc_jwt: String,
    pub rpc_timeout_ms: u64,
    pub prov_rpc_host: String,
    pub prov_rpc_port: u16,
    pub prov_rpc_seed: String,
    pub prov_rpc_jwt: String,
    pub ctl_host: String,
    pub ctl_port: u16,
    pub ctl_seed: String,
    pub ctl_jwt: String,
    pub ctl_topic_prefix: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub js_domain: Option<String>,
    pub allow_latest: bool,
    pub allowed_insecure: Vec<String>,
    pub provider_delay_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy_topic: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy_changes_topic: Option<String>,
    pub policy_timeout_ms: u64,
    pub config_service_enabled: bool,
    pub host_labels: BTreeMap<String, String>,
    /// Per-boot subject prefix for chunked-transfer replies.
    pub reply_prefix: String,
    pub log_level: String,
    pub enable_structured_logging: bool,
    pub structured_log_level: String,
}

impl RuntimeConfig {
    /// Consume and freeze. No mutation is possible through the returned handle.
    pub fn freeze(self) -> FrozenConfig {
        FrozenConfig(Arc::new(self))
    }
}

/// Read-only, shareable handle to the reconciled configuration.
#[derive(Debug, Clone)]
pub struct FrozenConfig(Arc<RuntimeConfig>);

impl Deref for FrozenConfig {
    type Target = RuntimeConfig;

    fn deref(&self) -> &RuntimeConfig {
        &self.0
    }
}
