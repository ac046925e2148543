//! Config persistence: best-effort JSON snapshots of the reconciled config.
//!
//! Two targets by default, each written independently:
//! ```text
//! ./host_config.json
//! ~/.wasmhost/host_config.json
//! ```
//! A failed target is logged and skipped. Nothing here blocks boot.

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::{Map, Value};
use tracing::{debug, error, warn};

use crate::config::RuntimeConfig;
use crate::error::AppError;

pub const CONFIG_FILE_NAME: &str = "host_config.json";
pub const USER_CONFIG_DIR: &str = ".wasmhost";

/// Fields never written to disk: per-boot values, the host seed, logging
/// toggles, and the host public key.
// The host key omission matches long-standing behavior; see DESIGN.md.
pub const REDACTED_FIELDS: &[&str] = &[
    "cluster_adhoc",
    "reply_prefix",
    "host_seed",
    "log_level",
    "enable_structured_logging",
    "structured_log_level",
    "host_key",
];

/// Where snapshots go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PersistTargets {
    /// Working directory plus the user config directory when one exists.
    Default,
    /// Exactly these files.
    Paths(Vec<PathBuf>),
    /// Skip persistence.
    Disabled,
}

impl PersistTargets {
    fn resolve(&self, cwd: &Path, home: Option<&Path>) -> Vec<PathBuf> {
        match self {
            PersistTargets::Default => {
                let mut paths = vec![cwd.join(CONFIG_FILE_NAME)];
                match home {
                    Some(home) => paths.push(user_config_path(home)),
                    None => warn!("no home directory found, skipping user-scoped config persistence"),
                }
                paths
            }
            PersistTargets::Paths(paths) => paths.clone(),
            PersistTargets::Disabled => Vec::new(),
        }
    }
}

/// Result of one persistence pass.
#[derive(Debug, Default)]
pub struct PersistSummary {
    pub written: Vec<PathBuf>,
    pub failed: Vec<(PathBuf, String)>,
}

/// `<home>/.wasmhost/host_config.json`.
pub fn user_config_path(home: &Path) -> PathBuf {
    home.join(USER_CONFIG_DIR).join(CONFIG_FILE_NAME)
}

/// Redacted JSON view of the config.
pub fn redacted_document(config: &RuntimeConfig) -> Result<Map<String, Value>, AppError> {
    let value = serde_json::to_value(config)
        .map_err(|e| AppError::Persist(format!("cannot serialize config: {e}")))?;
    let Value::Object(mut doc) = value else {
        return Err(AppError::Persist("config did not serialize to an object".into()));
    };
    for field in REDACTED_FIELDS {
        doc.remove(*field);
    }
    Ok(doc)
}

/// Write the redacted config to every target. Each target succeeds or fails alone.
pub fn persist(config: &RuntimeConfig, targets: &PersistTargets) -> PersistSummary {
    persist_in(config, targets, Path::new("."), dirs::home_dir().as_deref())
}

fn persist_in(
    config: &RuntimeConfig,
    targets: &PersistTargets,
    cwd: &Path,
    home: Option<&Path>,
) -> PersistSummary {
    let mut summary = PersistSummary::default();
    let paths = targets.resolve(cwd, home);
    if paths.is_empty() {
        return summary;
    }

    let body = match redacted_document(config)
        .and_then(|doc| {
            serde_json::to_string_pretty(&doc)
                .map_err(|e| AppError::Persist(format!("cannot encode config: {e}")))
        }) {
        Ok(body) => body,
        Err(e) => {
            error!(error = %e, "failed to render config for persistence");
            summary.failed = paths.into_iter().map(|p| (p, e.to_string())).collect();
            return summary;
        }
    };

    for path in paths {
        match write_file(&path, &body) {
            Ok(()) => {
                debug!(path = %path.display(), "persisted host config");
                summary.written.push(path);
            }
            Err(e) => {
                error!(path = %path.display(), error = %e, "failed to persist host config");
                summary.failed.push((path, e.to_string()));
            }
        }
    }
    summary
}

fn write_file(path: &Path, body: &str) -> Result<(), AppError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, body)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bootstrap::chunking::ChunkingSlot;
    use crate::bootstrap::identity::{self, KeyKind};
    use crate::bootstrap::reconcile::reconcile;
    use crate::bootstrap::trust::reconcile_cluster_trust;
    use crate::config::{FrozenConfig, HostConfig};
    use tempfile::TempDir;

    fn config() -> FrozenConfig {
        let mut loaded = HostConfig::default();
        loaded.logging.structured = true;
        loaded.js_domain = Some("edge".into());
        reconcile(
            loaded,
            &identity::resolve(None, KeyKind::Server),
            &reconcile_cluster_trust("", &[]),
            &ChunkingSlot::new(),
        )
    }

    #[test]
    fn redacted_document_drops_sensitive_fields() {
        let cfg = config();
        let doc = redacted_document(&cfg).unwrap();
        for field in REDACTED_FIELDS {
            assert!(!doc.contains_key(*field), "{field} must not be persisted");
        }
        for field in [
            "lattice_prefix",
            "rpc_host",
            "rpc_port",
            "rpc_seed",
            "rpc_jwt",
            "js_domain",
            "cluster_seed",
            "cluster_key",
            "cluster_issuers",
            "allow_latest",
            "allowed_insecure",
        ] {
            assert!(doc.contains_key(field), "{field} must be persisted");
        }
        assert_eq!(doc["cluster_key"], cfg.cluster_key.as_str());
    }

    #[test]
    fn serialized_document_never_mentions_host_secrets() {
        let cfg = config();
        let body = serde_json::to_string(&redacted_document(&cfg).unwrap()).unwrap();
        assert!(!body.contains(&cfg.host_seed));
        assert!(!body.contains(&cfg.host_key));
        assert!(!body.contains(&cfg.reply_prefix));
    }

    #[test]
    fn writes_every_target() {
        let tmp = TempDir::new().unwrap();
        let a = tmp.path().join("a").join(CONFIG_FILE_NAME);
        let b = tmp.path().join("b.json");

        let summary = persist(&config(), &PersistTargets::Paths(vec![a.clone(), b.clone()]));

        assert_eq!(summary.written, vec![a.clone(), b.clone()]);
        assert!(summary.failed.is_empty());
        let doc: Value = serde_json::from_str(&fs::read_to_string(&a).unwrap()).unwrap();
        assert!(doc.get("host_seed").is_none());
    }

    #[test]
    fn one_failed_target_does_not_block_the_other() {
        let tmp = TempDir::new().unwrap();
        let blocker = tmp.path().join("blocker");
        fs::write(&blocker, "not a directory").unwrap();
        let bad = blocker.join(CONFIG_FILE_NAME);
        let good = tmp.path().join(CONFIG_FILE_NAME);

        let summary = persist(&config(), &PersistTargets::Paths(vec![bad.clone(), good.clone()]));

        assert_eq!(summary.written, vec![good.clone()]);
        assert_eq!(summary.failed.len(), 1);
        assert_eq!(summary.failed[0].0, bad);
        assert!(good.exists());
    }

    #[test]
    fn default_targets_write_cwd_and_user_dir() {
        let tmp = TempDir::new().unwrap();
        let home = tmp.path().join("home");

        let summary = persist_in(&config(), &PersistTargets::Default, tmp.path(), Some(&home));

        let user = home.join(USER_CONFIG_DIR).join(CONFIG_FILE_NAME);
        assert_eq!(summary.written, vec![tmp.path().join(CONFIG_FILE_NAME), user.clone()]);
        assert!(summary.failed.is_empty());
        let doc: Value = serde_json::from_str(&fs::read_to_string(&user).unwrap()).unwrap();
        assert!(doc.get("cluster_key").is_some());
        assert!(doc.get("host_key").is_none());
    }

    #[test]
    fn default_targets_without_home_skip_user_dir() {
        let tmp = TempDir::new().unwrap();

        let summary = persist_in(&config(), &PersistTargets::Default, tmp.path(), None);

        assert_eq!(summary.written, vec![tmp.path().join(CONFIG_FILE_NAME)]);
        assert!(summary.failed.is_empty());
        assert!(!tmp.path().join(USER_CONFIG_DIR).exists());
    }

    #[test]
    fn disabled_writes_nothing() {
        let summary = persist(&config(), &PersistTargets::Disabled);
        assert!(summary.written.is_empty());
        assert!(summary.failed.is_empty());
    }
}
