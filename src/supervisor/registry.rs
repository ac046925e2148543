//! Discovery registries: sharded key → process maps.
//!
//! A registry is split into N shards, each behind its own `RwLock`. A key's
//! shard is picked by hashing it, so registrations under different keys
//! usually touch different locks. Every entry records the [`ProcessHandle`]
//! of the process that registered it, which lets a stopping process drop all
//! of its entries at once with [`Registry::unregister_owner`].

use std::collections::HashMap;
use std::fmt;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::{PoisonError, RwLock};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Identifies one supervised process. Time-ordered (UUIDv7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProcessHandle(Uuid);

impl ProcessHandle {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for ProcessHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ProcessHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Whether more than one process may hold the same key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegistryKeys {
    Unique,
    Duplicate,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("registry '{registry}': key '{key}' is already registered")]
    AlreadyRegistered { registry: String, key: String },

    #[error("registry '{0}' needs at least one partition")]
    NoPartitions(String),
}

#[derive(Debug, Clone)]
struct Entry<V> {
    owner: ProcessHandle,
    value: V,
}

type Shard<V> = RwLock<HashMap<String, Vec<Entry<V>>>>;

pub struct Registry<V> {
    name: String,
    keys: RegistryKeys,
    shards: Box<[Shard<V>]>,
}

impl<V: Clone> Registry<V> {
    pub fn new(
        name: impl Into<String>,
        keys: RegistryKeys,
        partitions: usize,
    ) -> Result<Self, RegistryError> {
        let name = name.into();
        if partitions == 0 {
            return Err(RegistryError::NoPartitions(name));
        }
        let shards = (0..partitions).map(|_| RwLock::new(HashMap::new())).collect();
        Ok(Self { name, keys, shards })
    }

    fn shard(&self, key: &str) -> &Shard<V> {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        let index = (hasher.finish() % self.shards.len() as u64) as usize;
        &self.shards[index]
    }

    /// Register `value` under `key` on behalf of `owner`.
    ///
    /// Unique registries reject a key that already has a live entry. Re-registering
    /// the same owner under a duplicate key replaces its previous value.
    pub fn register(
        &self,
        key: impl Into<String>,
        owner: ProcessHandle,
        value: V,
    ) -> Result<(), RegistryError> {
        let key = key.into();
        let mut shard = self.shard(&key).write().unwrap_or_else(PoisonError::into_inner);
        let entries = shard.entry(key.clone()).or_default();

        match self.keys {
            RegistryKeys::Unique if !entries.is_empty() => {
                Err(RegistryError::AlreadyRegistered { registry: self.name.clone(), key })
            }
            _ => {
                match entries.iter_mut().find(|e| e.owner == owner) {
                    Some(existing) => existing.value = value,
                    None => entries.push(Entry { owner, value }),
                }
                Ok(())
            }
        }
    }

    /// Remove `owner`'s entry under `key`. Returns `true` if one was removed.
    pub fn unregister(&self, key: &str, owner: ProcessHandle) -> bool {
        let mut shard = self.shard(key).write().unwrap_or_else(PoisonError::into_inner);
        let Some(entries) = shard.get_mut(key) else {
            return false;
        };
        let before = entries.len();
        entries.retain(|e| e.owner != owner);
        let removed = entries.len() != before;
        if entries.is_empty() {
            shard.remove(key);
        }
        removed
    }

    /// Remove every entry held by `owner`. Returns how many were removed.
    pub fn unregister_owner(&self, owner: ProcessHandle) -> usize {
        let mut removed = 0;
        for shard in self.shards.iter() {
            let mut shard = shard.write().unwrap_or_else(PoisonError::into_inner);
            shard.retain(|_, entries| {
                let before = entries.len();
                entries.retain(|e| e.owner != owner);
                removed += before - entries.len();
                !entries.is_empty()
            });
        }
        removed
    }

    pub fn lookup(&self, key: &str) -> Vec<(ProcessHandle, V)> {
        let shard = self.shard(key).read().unwrap_or_else(PoisonError::into_inner);
        shard
            .get(key)
            .map(|entries| entries.iter().map(|e| (e.owner, e.value.clone())).collect())
            .unwrap_or_default()
    }

    /// Total number of entries across all keys.
    pub fn count(&self) -> usize {
        self.shards
            .iter()
            .map(|s| {
                let s = s.read().unwrap_or_else(PoisonError::into_inner);
                s.values().map(Vec::len).sum::<usize>()
            })
            .sum()
    }

    /// All registered keys, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .shards
            .iter()
            .flat_map(|s| {
                let s = s.read().unwrap_or_else(PoisonError::into_inner);
                s.keys().cloned().collect::<Vec<_>>()
            })
            .collect();
        keys.sort();
        keys
    }

    /// Every `(key, owner, value)` triple, sorted by key.
    pub fn entries(&self) -> Vec<(String, ProcessHandle, V)> {
        let mut out = Vec::new();
        for shard in self.shards.iter() {
            let shard = shard.read().unwrap_or_else(PoisonError::into_inner);
            for (key, entries) in shard.iter() {
                out.extend(entries.iter().map(|e| (key.clone(), e.owner, e.value.clone())));
            }
        }
        out.sort_by(|a, b| a.0.cmp(&b.0).then(a.1.cmp(&b.1)));
        out
    }
}

impl<V> fmt::Debug for Registry<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("name", &self.name)
            .field("keys", &self.keys)
            .field("partitions", &self.shards.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn zero_partitions_rejected() {
        let err = Registry::<u32>::new("events", RegistryKeys::Duplicate, 0).unwrap_err();
        assert_eq!(err, RegistryError::NoPartitions("events".into()));
    }

    #[test]
    fn unique_keys_reject_second_owner() {
        let reg = Registry::new("hosts", RegistryKeys::Unique, 4).unwrap();
        let a = ProcessHandle::new();
        let b = ProcessHandle::new();

        reg.register("NKEY", a, 1).unwrap();
        let err = reg.register("NKEY", b, 2).unwrap_err();
        assert!(matches!(err, RegistryError::AlreadyRegistered { .. }));
        assert_eq!(reg.lookup("NKEY"), vec![(a, 1)]);
    }

    #[test]
    fn duplicate_keys_hold_many_owners() {
        let reg = Registry::new("actors", RegistryKeys::Duplicate, 4).unwrap();
        let a = ProcessHandle::new();
        let b = ProcessHandle::new();

        reg.register("MACTOR", a, "first").unwrap();
        reg.register("MACTOR", b, "second").unwrap();
        reg.register("MACTOR", a, "replaced").unwrap();

        let mut found = reg.lookup("MACTOR");
        found.sort();
        let mut expected = vec![(a, "replaced"), (b, "second")];
        expected.sort();
        assert_eq!(found, expected);
        assert_eq!(reg.count(), 2);
    }

    #[test]
    fn unregister_removes_only_that_owner() {
        let reg = Registry::new("actors", RegistryKeys::Duplicate, 2).unwrap();
        let a = ProcessHandle::new();
        let b = ProcessHandle::new();
        reg.register("k", a, ()).unwrap();
        reg.register("k", b, ()).unwrap();

        assert!(reg.unregister("k", a));
        assert!(!reg.unregister("k", a));
        assert_eq!(reg.lookup("k"), vec![(b, ())]);

        assert!(reg.unregister("k", b));
        assert!(reg.keys().is_empty());
    }

    #[test]
    fn unregister_owner_sweeps_all_shards() {
        let reg = Registry::new("subs", RegistryKeys::Duplicate, 8).unwrap();
        let owner = ProcessHandle::new();
        let other = ProcessHandle::new();
        for i in 0..32 {
            reg.register(format!("topic.{i}"), owner, i).unwrap();
        }
        reg.register("topic.0", other, 100).unwrap();

        assert_eq!(reg.unregister_owner(owner), 32);
        assert_eq!(reg.count(), 1);
        assert_eq!(reg.keys(), vec!["topic.0".to_string()]);
    }

    #[test]
    fn unique_key_is_free_after_unregister() {
        let reg = Registry::new("hosts", RegistryKeys::Unique, 1).unwrap();
        let a = ProcessHandle::new();
        let b = ProcessHandle::new();
        reg.register("NKEY", a, ()).unwrap();
        reg.unregister_owner(a);
        reg.register("NKEY", b, ()).unwrap();
        assert_eq!(reg.lookup("NKEY"), vec![(b, ())]);
    }

    #[test]
    fn process_handles_are_v7_and_distinct() {
        let first = ProcessHandle::new();
        let second = ProcessHandle::new();
        assert_ne!(first, second);
        assert_eq!(first.as_uuid().get_version_num(), 7);
    }

    #[test]
    fn concurrent_register_and_lookup() {
        let reg = Arc::new(Registry::new("events", RegistryKeys::Duplicate, 4).unwrap());
        let threads: Vec<_> = (0..8)
            .map(|t| {
                let reg = Arc::clone(&reg);
                std::thread::spawn(move || {
                    let owner = ProcessHandle::new();
                    for i in 0..100 {
                        let key = format!("evt.{}", i % 10);
                        reg.register(key.clone(), owner, t).unwrap();
                        assert!(!reg.lookup(&key).is_empty());
                    }
                    owner
                })
            })
            .collect();

        let owners: Vec<_> = threads.into_iter().map(|t| t.join().unwrap()).collect();
        assert_eq!(reg.count(), 8 * 10);
        assert_eq!(reg.keys().len(), 10);

        reg.unregister_owner(owners[0]);
        assert_eq!(reg.count(), 7 * 10);
    }
}
