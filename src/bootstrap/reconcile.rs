//! Configuration reconciliation.
//!
//! Folds resolved identities and per-boot ephemeral values into the loaded
//! config, negotiates chunking, and freezes the result. No step here aborts
//! boot: anything that fails degrades and is logged.

use rand_core::{OsRng, RngCore};
use tracing::{error, info, warn};

use crate::config::{FrozenConfig, HostConfig, RuntimeConfig};

use super::chunking::{ChunkingConfigurator, ChunkingConnection};
use super::identity::HostIdentity;
use super::trust::ClusterTrust;

/// Subject prefix for chunked-transfer replies.
pub const REPLY_PREFIX: &str = "_INBOX.";

/// Token symbols; `c f h i s t u` are left out in both cases.
const TOKEN_ALPHABET: &[u8; 48] = b"gY5mBkqW2xVeLr9zNjA7dPoR1lXwE8bZn4GvJyM3aQ6pDKO0";
const MIN_TOKEN_LEN: usize = 4;

/// Reconcile loaded settings with resolved identities into a frozen config.
pub fn reconcile(
    loaded: HostConfig,
    host: &HostIdentity,
    trust: &ClusterTrust,
    chunking: &dyn ChunkingConfigurator,
) -> FrozenConfig {
    let js_domain = normalize_js_domain(loaded.js_domain.as_deref());

    let config = RuntimeConfig {
        lattice_prefix: loaded.lattice_prefix,
        host_key: host.public_key.to_string(),
        host_seed: host.seed.as_str().to_string(),
        cluster_key: trust.public_key.to_string(),
        cluster_seed: trust.seed.as_str().to_string(),
        cluster_issuers: trust.issuers.clone(),
        cluster_adhoc: trust.is_adhoc,
        rpc_host: loaded.rpc.host,
        rpc_port: loaded.rpc.port,
        rpc_seed: loaded.rpc.seed,
        rpc_jwt: loaded.rpc.jwt,
        rpc_timeout_ms: loaded.rpc_timeout_ms,
        prov_rpc_host: loaded.prov_rpc.host,
        prov_rpc_port: loaded.prov_rpc.port,
        prov_rpc_seed: loaded.prov_rpc.seed,
        prov_rpc_jwt: loaded.prov_rpc.jwt,
        ctl_host: loaded.ctl.host,
        ctl_port: loaded.ctl.port,
        ctl_seed: loaded.ctl.seed,
        ctl_jwt: loaded.ctl.jwt,
        ctl_topic_prefix: loaded.ctl_topic_prefix,
        js_domain,
        allow_latest: loaded.allow_latest,
        allowed_insecure: loaded.allowed_insecure,
        provider_delay_ms: loaded.provider_delay_ms,
        policy_topic: loaded.policy.topic,
        policy_changes_topic: loaded.policy.changes_topic,
        policy_timeout_ms: loaded.policy.timeout_ms,
        config_service_enabled: loaded.config_service_enabled,
        host_labels: loaded.host_labels,
        reply_prefix: reply_prefix(),
        log_level: loaded.logging.level,
        enable_structured_logging: loaded.logging.structured,
        structured_log_level: loaded.logging.structured_level,
    };

    configure_chunking(&config, chunking);

    config.freeze()
}

/// Fresh reply prefix for this boot.
///
/// Only 2^32 tokens exist, so two hosts can collide. The prefix correlates
/// replies; it is not a secret and not a security boundary.
pub fn reply_prefix() -> String {
    reply_prefix_for(OsRng.next_u32())
}

pub fn reply_prefix_for(value: u32) -> String {
    format!("{REPLY_PREFIX}{}", encode_token(value))
}

fn encode_token(mut value: u32) -> String {
    let base = TOKEN_ALPHABET.len() as u32;
    let mut symbols = Vec::with_capacity(MIN_TOKEN_LEN + 2);
    loop {
        symbols.push(TOKEN_ALPHABET[(value % base) as usize]);
        value /= base;
        if value == 0 {
            break;
        }
    }
    while symbols.len() < MIN_TOKEN_LEN {
        symbols.push(TOKEN_ALPHABET[0]);
    }
    symbols.reverse();
    symbols.into_iter().map(char::from).collect()
}

/// Blank domains are treated as unset.
fn normalize_js_domain(domain: Option<&str>) -> Option<String> {
    match domain.map(str::trim) {
        None => None,
        Some("") => {
            warn!("ignoring blank JetStream domain");
            None
        }
        Some(domain) => {
            info!(js_domain = %domain, "using JetStream domain");
            Some(domain.to_string())
        }
    }
}

fn configure_chunking(config: &RuntimeConfig, chunking: &dyn ChunkingConfigurator) {
    let connection = ChunkingConnection {
        host: config.rpc_host.clone(),
        port: config.rpc_port,
        seed: config.rpc_seed.clone(),
        lattice: config.lattice_prefix.clone(),
        jwt: config.rpc_jwt.clone(),
        js_domain: config.js_domain.clone(),
    };

    match chunking.configure(&connection) {
        Ok(()) => info!(host = %connection.host, port = connection.port, "chunking connection configured"),
        Err(e) => error!(
            error = %e,
            "failed to configure chunking connection, large invocations may fail"
        ),
    }
}
