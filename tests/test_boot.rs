//! End-to-end boot tests: identities, trust, persistence and topology.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use serde_json::Value;
use tempfile::TempDir;
use tracing_subscriber::fmt::MakeWriter;

use wasmhost::bootstrap::chunking::ChunkingSlot;
use wasmhost::bootstrap::identity::{self, KeyKind, PublicKey};
use wasmhost::bootstrap::persist::{CONFIG_FILE_NAME, PersistTargets, USER_CONFIG_DIR};
use wasmhost::config::HostConfig;
use wasmhost::host::{self, Host};

#[derive(Clone, Default)]
struct Capture(Arc<Mutex<Vec<u8>>>);

impl Capture {
    fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl io::Write for Capture {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for Capture {
    type Writer = Capture;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

fn targets(dir: &Path) -> (PathBuf, PathBuf, PersistTargets) {
    let cwd = dir.join(CONFIG_FILE_NAME);
    let user = dir.join("home").join(USER_CONFIG_DIR).join(CONFIG_FILE_NAME);
    let targets = PersistTargets::Paths(vec![cwd.clone(), user.clone()]);
    (cwd, user, targets)
}

async fn boot_with(loaded: HostConfig, targets: &PersistTargets) -> Host {
    host::boot(move || Ok(loaded), &ChunkingSlot::new(), None, targets)
        .await
        .unwrap()
}

fn read_doc(path: &Path) -> Value {
    serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap()
}

const NEVER_PERSISTED: &[&str] = &[
    "cluster_adhoc",
    "reply_prefix",
    "host_seed",
    "log_level",
    "enable_structured_logging",
    "structured_log_level",
    "host_key",
];

#[tokio::test]
async fn test_boot_without_host_seed_persists_valid_cluster_key() {
    let tmp = TempDir::new().unwrap();
    let (cwd, user, targets) = targets(tmp.path());

    let host = boot_with(HostConfig::default(), &targets).await;

    for path in [&cwd, &user] {
        let doc = read_doc(path);
        let cluster_key = doc["cluster_key"].as_str().unwrap();
        let parsed = PublicKey::parse(cluster_key).unwrap();
        assert_eq!(parsed.kind(), KeyKind::Cluster);
        for field in NEVER_PERSISTED {
            assert!(doc.get(*field).is_none(), "{field} persisted to {}", path.display());
        }
        assert_eq!(doc["lattice_prefix"], "default");
        assert_eq!(doc["rpc_port"], 4222);
    }
    assert_eq!(fs::read_to_string(&cwd).unwrap(), fs::read_to_string(&user).unwrap());

    assert!(PublicKey::parse(&host.config.host_key).is_ok());
    assert_eq!(host.topology.host_count(), 1);
    let hosts = host.topology.hosts();
    assert_eq!(hosts[0].public_key, host.config.host_key);
    assert_eq!(hosts[0].lattice_prefix, "default");

    host.shutdown().await;
}

#[tokio::test]
async fn test_boot_with_malformed_cluster_seed_falls_back_to_adhoc() {
    let tmp = TempDir::new().unwrap();
    let (cwd, _, targets) = targets(tmp.path());
    let capture = Capture::default();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(capture.clone())
        .with_ansi(false)
        .finish();
    let _guard = tracing::subscriber::set_default(subscriber);

    let mut loaded = HostConfig::default();
    loaded.cluster_seed = "bad-seed".into();
    loaded.cluster_issuers = vec![];
    let host = boot_with(loaded, &targets).await;

    let logs = capture.contents();
    assert!(logs.contains("ERROR"), "no error logged:\n{logs}");
    assert!(logs.contains("bad-seed"), "seed not named in logs:\n{logs}");

    assert!(host.config.cluster_adhoc);
    assert_eq!(host.config.cluster_issuers, vec![host.config.cluster_key.clone()]);

    let doc = read_doc(&cwd);
    let issuers = doc["cluster_issuers"].as_array().unwrap();
    assert_eq!(issuers.len(), 1);
    assert_eq!(issuers[0], doc["cluster_key"]);
    assert!(!fs::read_to_string(&cwd).unwrap().contains("bad-seed"));

    host.shutdown().await;
}

#[tokio::test]
async fn test_different_cluster_seeds_persist_different_keys() {
    let a = identity::generate(KeyKind::Cluster);
    let b = identity::generate(KeyKind::Cluster);

    let mut keys = Vec::new();
    for pair in [&a, &b] {
        let tmp = TempDir::new().unwrap();
        let (cwd, _, targets) = targets(tmp.path());
        let mut loaded = HostConfig::default();
        loaded.cluster_seed = pair.seed.as_str().to_string();

        let host = boot_with(loaded, &targets).await;
        assert!(!host.config.cluster_adhoc);

        let doc = read_doc(&cwd);
        let key = doc["cluster_key"].as_str().unwrap().to_string();
        let derived = identity::derive_public_key(pair.seed.as_str(), KeyKind::Cluster).unwrap();
        assert_eq!(key, derived.to_string());
        assert_eq!(doc["cluster_seed"], pair.seed.as_str());
        keys.push(key);
        host.shutdown().await;
    }
    assert_ne!(keys[0], keys[1]);
}

#[tokio::test]
async fn test_operator_issuers_are_preserved_in_order() {
    let cluster = identity::generate(KeyKind::Cluster);
    let other = identity::generate(KeyKind::Cluster).public_key.to_string();

    let mut loaded = HostConfig::default();
    loaded.cluster_seed = cluster.seed.as_str().to_string();
    loaded.cluster_issuers = vec![other.clone()];
    let host = boot_with(loaded, &PersistTargets::Disabled).await;

    assert_eq!(
        host.config.cluster_issuers,
        vec![other, cluster.public_key.to_string()]
    );
    host.shutdown().await;
}

#[tokio::test]
async fn test_unwritable_target_does_not_block_boot() {
    let tmp = TempDir::new().unwrap();
    let blocker = tmp.path().join("blocker");
    fs::write(&blocker, "file, not a directory").unwrap();
    let good = tmp.path().join(CONFIG_FILE_NAME);
    let targets = PersistTargets::Paths(vec![blocker.join(CONFIG_FILE_NAME), good.clone()]);

    let host = boot_with(HostConfig::default(), &targets).await;

    assert!(good.exists());
    assert_eq!(host.topology.host_count(), 1);
    host.shutdown().await;
}

#[tokio::test]
async fn test_shutdown_releases_host_registration() {
    let host = boot_with(HostConfig::default(), &PersistTargets::Disabled).await;
    let shared = host.shared.clone();
    let key = host.config.host_key.clone();
    assert!(shared.vhosts.contains_key(&key));

    host.shutdown().await;
    assert!(!shared.vhosts.contains_key(&key));
}
