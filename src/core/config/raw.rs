//! Raw TOML deserialization types.
//!
//! These structs mirror the TOML file shape and use `serde` defaults.
//! The `load` module converts them into the public `types` structs.

use std::collections::BTreeMap;

use serde::Deserialize;

// ── Top-level ────────────────────────────────────────────────────────────────

/// Raw TOML shape: serde target before resolution.
#[derive(Deserialize, Default)]
pub(super) struct RawConfig {
    #[serde(default)]
    pub host: RawHost,
    #[serde(default)]
    pub cluster: RawCluster,
    #[serde(default)]
    pub rpc: RawEndpoint,
    #[serde(default)]
    pub prov_rpc: RawEndpoint,
    #[serde(default)]
    pub ctl: RawCtl,
    #[serde(default)]
    pub jetstream: RawJetStream,
    #[serde(default)]
    pub policy: RawPolicy,
    #[serde(default)]
    pub logging: RawLogging,
}

#[derive(Deserialize)]
pub(super) struct RawHost {
    #[serde(default = "default_lattice_prefix")]
    pub lattice_prefix: String,
    #[serde(default)]
    pub host_seed: Option<String>,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default = "default_false")]
    pub allow_latest: bool,
    #[serde(default)]
    pub allowed_insecure: Vec<String>,
    #[serde(default = "default_provider_delay_ms")]
    pub provider_delay_ms: u64,
    #[serde(default = "default_false")]
    pub config_service_enabled: bool,
}

impl Default for RawHost {
    fn default() -> Self {
        Self {
            lattice_prefix: default_lattice_prefix(),
            host_seed: None,
            labels: BTreeMap::new(),
            allow_latest: false,
            allowed_insecure: Vec::new(),
            provider_delay_ms: default_provider_delay_ms(),
            config_service_enabled: false,
        }
    }
}

#[derive(Deserialize, Default)]
pub(super) struct RawCluster {
    /// Empty string means "generate an ad-hoc cluster identity".
    #[serde(default)]
    pub seed: String,
    #[serde(default)]
    pub issuers: Vec<String>,
}

// ── Lattice connections ──────────────────────────────────────────────────────

#[derive(Deserialize)]
pub(super) struct RawEndpoint {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub seed: String,
    #[serde(default)]
    pub jwt: String,
    #[serde(default = "default_rpc_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for RawEndpoint {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            seed: String::new(),
            jwt: String::new(),
            timeout_ms: default_rpc_timeout_ms(),
        }
    }
}

#[derive(Deserialize)]
pub(super) struct RawCtl {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub seed: String,
    #[serde(default)]
    pub jwt: String,
    #[serde(default = "default_ctl_topic_prefix")]
    pub topic_prefix: String,
}

impl Default for RawCtl {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            seed: String::new(),
            jwt: String::new(),
            topic_prefix: default_ctl_topic_prefix(),
        }
    }
}

#[derive(Deserialize, Default)]
pub(super) struct RawJetStream {
    #[serde(default)]
    pub domain: Option<String>,
}

// ── Policy ───────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub(super) struct RawPolicy {
    #[serde(default)]
    pub topic: Option<String>,
    #[serde(default)]
    pub changes_topic: Option<String>,
    #[serde(default = "default_policy_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for RawPolicy {
    fn default() -> Self {
        Self {
            topic: None,
            changes_topic: None,
            timeout_ms: default_policy_timeout_ms(),
        }
    }
}

// ── Logging ──────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub(super) struct RawLogging {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_false")]
    pub structured: bool,
    #[serde(default = "default_log_level")]
    pub structured_level: String,
}

impl Default for RawLogging {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            structured: false,
            structured_level: default_log_level(),
        }
    }
}

// ── Defaults ─────────────────────────────────────────────────────────────────

pub(super) fn default_lattice_prefix() -> String { "default".to_string() }
pub(super) fn default_host() -> String { "127.0.0.1".to_string() }
pub(super) fn default_port() -> u16 { 4222 }
pub(super) fn default_rpc_timeout_ms() -> u64 { 2_000 }
pub(super) fn default_provider_delay_ms() -> u64 { 300 }
pub(super) fn default_ctl_topic_prefix() -> String { "wasmbus.ctl".to_string() }
pub(super) fn default_policy_timeout_ms() -> u64 { 1_000 }
pub(super) fn default_log_level() -> String { "info".to_string() }

fn default_false() -> bool {
    false
}
