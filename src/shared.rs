//! Process-wide shared tables.
//!
//! Created once by [`init_shared_state`] before any topology node starts, then
//! handed out by cloning [`SharedState`]. Every table is a sharded concurrent
//! map: operations on different keys never contend on a table-wide lock.
//!
//! # Key ownership
//!
//! Each key is owned by whichever subsystem writes it. Concurrent writes to
//! the same key are unordered and the last write wins; consumers that need
//! anything stronger arbitrate among themselves.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

/// A logical host context running inside this process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VirtualHostDescriptor {
    pub host_key: String,
    pub lattice_prefix: String,
    pub labels: BTreeMap<String, String>,
    pub started_at: DateTime<Utc>,
}

impl VirtualHostDescriptor {
    pub fn new(
        host_key: impl Into<String>,
        lattice_prefix: impl Into<String>,
        labels: BTreeMap<String, String>,
    ) -> Self {
        Self {
            host_key: host_key.into(),
            lattice_prefix: lattice_prefix.into(),
            labels,
            started_at: Utc::now(),
        }
    }
}

/// Memoization key for an authorization decision.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PolicyCacheKey {
    pub source: String,
    pub target: String,
    pub action: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyDecision {
    pub permitted: bool,
    pub message: Option<String>,
    pub decided_at: DateTime<Utc>,
}

impl PolicyDecision {
    pub fn permit() -> Self {
        Self { permitted: true, message: None, decided_at: Utc::now() }
    }

    pub fn deny(message: impl Into<String>) -> Self {
        Self { permitted: false, message: Some(message.into()), decided_at: Utc::now() }
    }
}

/// SHA-256 of a module's bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContentHash([u8; 32]);

impl ContentHash {
    pub fn of(bytes: &[u8]) -> Self {
        Self(Sha256::digest(bytes).into())
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

/// A compiled module as stored in the cache. Compilation happens elsewhere;
/// the cache only keys the artifact by the hash of its source.
#[derive(Debug)]
pub struct CompiledModule {
    pub hash: ContentHash,
    pub artifact: Vec<u8>,
}

impl CompiledModule {
    pub fn new(source: &[u8], artifact: Vec<u8>) -> Self {
        Self { hash: ContentHash::of(source), artifact }
    }
}

/// Handles to the three shared tables. Clone freely.
#[derive(Clone, Default)]
pub struct SharedState {
    pub vhosts: Arc<DashMap<String, VirtualHostDescriptor>>,
    pub policy: Arc<DashMap<PolicyCacheKey, PolicyDecision>>,
    pub modules: Arc<DashMap<ContentHash, Arc<CompiledModule>>>,
}

impl SharedState {
    /// Insert a module unless one with the same hash is already cached.
    /// Returns the cached entry either way.
    pub fn cache_module(&self, module: CompiledModule) -> Arc<CompiledModule> {
        self.modules
            .entry(module.hash)
            .or_insert_with(|| Arc::new(module))
            .value()
            .clone()
    }
}

impl fmt::Debug for SharedState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedState")
            .field("vhosts", &self.vhosts.len())
            .field("policy", &self.policy.len())
            .field("modules", &self.modules.len())
            .finish()
    }
}

pub fn init_shared_state() -> SharedState {
    let state = SharedState::default();
    debug!("shared tables initialised");
    state
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(n: usize) -> PolicyCacheKey {
        PolicyCacheKey {
            source: format!("actor-{n}"),
            target: "provider".into(),
            action: "invoke".into(),
        }
    }

    #[test]
    fn tables_start_empty() {
        let state = init_shared_state();
        assert!(state.vhosts.is_empty());
        assert!(state.policy.is_empty());
        assert!(state.modules.is_empty());
    }

    #[test]
    fn clones_share_tables() {
        let state = init_shared_state();
        let other = state.clone();
        other.vhosts.insert(
            "NHOST".into(),
            VirtualHostDescriptor::new("NHOST", "default", BTreeMap::new()),
        );
        assert_eq!(state.vhosts.get("NHOST").unwrap().lattice_prefix, "default");
    }

    #[test]
    fn content_hash_is_sha256_hex() {
        let hash = ContentHash::of(b"abc");
        assert_eq!(
            hash.to_string(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(ContentHash::of(b"abc"), hash);
        assert_ne!(ContentHash::of(b"abd"), hash);
    }

    #[test]
    fn cache_module_keeps_first_artifact() {
        let state = init_shared_state();
        let first = state.cache_module(CompiledModule::new(b"wasm", vec![1]));
        let second = state.cache_module(CompiledModule::new(b"wasm", vec![2]));
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(second.artifact, vec![1]);
        assert_eq!(state.modules.len(), 1);
    }

    #[test]
    fn same_key_is_last_write_wins() {
        let state = init_shared_state();
        state.policy.insert(key(0), PolicyDecision::permit());
        state.policy.insert(key(0), PolicyDecision::deny("revoked"));
        let decision = state.policy.get(&key(0)).unwrap();
        assert!(!decision.permitted);
        assert_eq!(decision.message.as_deref(), Some("revoked"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_writers_on_distinct_keys() {
        let state = init_shared_state();
        let mut tasks = Vec::new();
        for worker in 0..8 {
            let state = state.clone();
            tasks.push(tokio::spawn(async move {
                for i in 0..250 {
                    let n = worker * 250 + i;
                    state.policy.insert(key(n), PolicyDecision::permit());
                    state.vhosts.insert(
                        format!("host-{n}"),
                        VirtualHostDescriptor::new(format!("host-{n}"), "default", BTreeMap::new()),
                    );
                }
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }
        assert_eq!(state.policy.len(), 2000);
        assert_eq!(state.vhosts.len(), 2000);
        assert!(state.policy.get(&key(1999)).unwrap().permitted);
    }
}
