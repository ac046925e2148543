//! Configuration loading with env-var overrides.
//!
//! Reads TOML files, supports `[meta] base = "..."` inheritance chains,
//! and applies `WASMHOST_*` env overrides on top.

use std::collections::HashSet;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::AppError;

use super::raw::RawConfig;
use super::types::*;

/// Values read from `WASMHOST_*` environment variables.
///
/// Tests build this directly instead of mutating the process environment.
#[derive(Debug, Clone, Default)]
pub struct EnvOverrides {
    pub host_seed: Option<String>,
    pub cluster_seed: Option<String>,
    /// Comma-separated list.
    pub cluster_issuers: Option<String>,
    pub lattice_prefix: Option<String>,
    pub rpc_host: Option<String>,
    pub rpc_port: Option<String>,
    pub rpc_seed: Option<String>,
    pub rpc_jwt: Option<String>,
    pub js_domain: Option<String>,
    pub log_level: Option<String>,
    pub structured_logging: Option<String>,
    pub structured_log_level: Option<String>,
}

impl EnvOverrides {
    pub fn from_env() -> Self {
        let var = |name: &str| env::var(name).ok();
        Self {
            host_seed: var("WASMHOST_HOST_SEED"),
            cluster_seed: var("WASMHOST_CLUSTER_SEED"),
            cluster_issuers: var("WASMHOST_CLUSTER_ISSUERS"),
            lattice_prefix: var("WASMHOST_LATTICE_PREFIX"),
            rpc_host: var("WASMHOST_RPC_HOST"),
            rpc_port: var("WASMHOST_RPC_PORT"),
            rpc_seed: var("WASMHOST_RPC_SEED"),
            rpc_jwt: var("WASMHOST_RPC_JWT"),
            js_domain: var("WASMHOST_JS_DOMAIN"),
            log_level: var("WASMHOST_LOG_LEVEL"),
            structured_logging: var("WASMHOST_ENABLE_STRUCTURED_LOGGING"),
            structured_log_level: var("WASMHOST_STRUCTURED_LOG_LEVEL"),
        }
    }
}

/// Deep-merge two TOML values.
/// Tables are merged recursively: the overlay only needs to specify keys that
/// differ from the base. For every other type (string, integer, array, …)
/// the overlay value replaces the base value wholesale.
fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_tbl), toml::Value::Table(overlay_tbl)) => {
            for (key, ov_val) in overlay_tbl {
                let merged = match base_tbl.remove(&key) {
                    Some(base_val) => merge_toml(base_val, ov_val),
                    None => ov_val,
                };
                base_tbl.insert(key, merged);
            }
            toml::Value::Table(base_tbl)
        }
        (_, overlay) => overlay,
    }
}

/// Read a config file, follow any `[meta] base = "..."` chain, and return the
/// fully merged `toml::Value`. `visited` carries canonicalized paths already
/// seen in this chain so circular references are caught early.
fn load_raw_merged(
    path: &Path,
    visited: &mut HashSet<PathBuf>,
) -> Result<toml::Value, AppError> {
    let canonical = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
    if !visited.insert(canonical) {
        return Err(AppError::Config(format!(
            "circular base reference detected at: {}",
            path.display()
        )));
    }

    let raw = fs::read_to_string(path)
        .map_err(|e| AppError::Config(format!("cannot read {}: {e}", path.display())))?;

    let overlay_val: toml::Value = toml::from_str(&raw)
        .map_err(|e| AppError::Config(format!("parse error in {}: {e}", path.display())))?;

    if let Some(base_str) = overlay_val
        .get("meta")
        .and_then(|m| m.get("base"))
        .and_then(|b| b.as_str())
    {
        let base_path = if Path::new(base_str).is_absolute() {
            PathBuf::from(base_str)
        } else {
            path.parent().unwrap_or(Path::new(".")).join(base_str)
        };
        let base_val = load_raw_merged(&base_path, visited)?;
        Ok(merge_toml(base_val, overlay_val))
    } else {
        Ok(overlay_val)
    }
}

/// Load config from the given path, or `config/default.toml`, then apply env-var overrides.
/// If no path is given and `config/default.toml` does not exist, the built-in
/// defaults are used.
pub fn load(config_path: Option<&str>) -> Result<HostConfig, AppError> {
    let overrides = EnvOverrides::from_env();

    if let Some(path) = config_path {
        return load_from(Path::new(path), &overrides);
    }

    let default_path = Path::new("config/default.toml");
    if default_path.exists() {
        load_from(default_path, &overrides)
    } else {
        apply_overrides(HostConfig::default(), &overrides)
    }
}

/// Internal loader: accepts an explicit path and overrides.
/// Follows `[meta] base = "..."` inheritance chains before resolving.
pub fn load_from(path: &Path, overrides: &EnvOverrides) -> Result<HostConfig, AppError> {
    let merged_val = load_raw_merged(path, &mut HashSet::new())?;

    let parsed: RawConfig = Deserialize::deserialize(merged_val)
        .map_err(|e: toml::de::Error| {
            AppError::Config(format!("config error in {}: {e}", path.display()))
        })?;

    let config = HostConfig {
        lattice_prefix: parsed.host.lattice_prefix,
        host_seed: parsed.host.host_seed.filter(|s| !s.is_empty()),
        cluster_seed: parsed.cluster.seed,
        cluster_issuers: parsed.cluster.issuers,
        rpc: EndpointConfig {
            host: parsed.rpc.host,
            port: parsed.rpc.port,
            seed: parsed.rpc.seed,
            jwt: parsed.rpc.jwt,
        },
        rpc_timeout_ms: parsed.rpc.timeout_ms,
        prov_rpc: EndpointConfig {
            host: parsed.prov_rpc.host,
            port: parsed.prov_rpc.port,
            seed: parsed.prov_rpc.seed,
            jwt: parsed.prov_rpc.jwt,
        },
        ctl: EndpointConfig {
            host: parsed.ctl.host,
            port: parsed.ctl.port,
            seed: parsed.ctl.seed,
            jwt: parsed.ctl.jwt,
        },
        ctl_topic_prefix: parsed.ctl.topic_prefix,
        js_domain: parsed.jetstream.domain,
        allow_latest: parsed.host.allow_latest,
        allowed_insecure: parsed.host.allowed_insecure,
        provider_delay_ms: parsed.host.provider_delay_ms,
        config_service_enabled: parsed.host.config_service_enabled,
        host_labels: parsed.host.labels,
        policy: PolicyConfig {
            topic: parsed.policy.topic,
            changes_topic: parsed.policy.changes_topic,
            timeout_ms: parsed.policy.timeout_ms,
        },
        logging: LoggingConfig {
            level: parsed.logging.level,
            structured: parsed.logging.structured,
            structured_level: parsed.logging.structured_level,
        },
    };

    apply_overrides(config, overrides)
}

/// Layer environment overrides on top of a resolved config.
pub fn apply_overrides(
    mut config: HostConfig,
    overrides: &EnvOverrides,
) -> Result<HostConfig, AppError> {
    if let Some(seed) = &overrides.host_seed {
        config.host_seed = Some(seed.clone()).filter(|s| !s.is_empty());
    }
    if let Some(seed) = &overrides.cluster_seed {
        config.cluster_seed = seed.clone();
    }
    if let Some(issuers) = &overrides.cluster_issuers {
        config.cluster_issuers = split_list(issuers);
    }
    if let Some(prefix) = &overrides.lattice_prefix {
        config.lattice_prefix = prefix.clone();
    }
    if let Some(host) = &overrides.rpc_host {
        config.rpc.host = host.clone();
    }
    if let Some(port) = &overrides.rpc_port {
        config.rpc.port = port
            .parse()
            .map_err(|e| AppError::Config(format!("invalid WASMHOST_RPC_PORT '{port}': {e}")))?;
    }
    if let Some(seed) = &overrides.rpc_seed {
        config.rpc.seed = seed.clone();
    }
    if let Some(jwt) = &overrides.rpc_jwt {
        config.rpc.jwt = jwt.clone();
    }
    if let Some(domain) = &overrides.js_domain {
        config.js_domain = Some(domain.clone());
    }
    if let Some(level) = &overrides.log_level {
        config.logging.level = level.clone();
    }
    if let Some(flag) = &overrides.structured_logging {
        config.logging.structured = parse_bool(flag).ok_or_else(|| {
            AppError::Config(format!(
                "invalid WASMHOST_ENABLE_STRUCTURED_LOGGING '{flag}': expected true or false"
            ))
        })?;
    }
    if let Some(level) = &overrides.structured_log_level {
        config.logging.structured_level = level.clone();
    }
    Ok(config)
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
