//! Host boot sequence.
//!
//! Order matters and nothing runs concurrently:
//!   1. Create the shared tables
//!   2. Load config (caller-supplied loader)
//!   3. Reconcile cluster trust
//!   4. Resolve host identity
//!   5. Reconcile and freeze the runtime config
//!   6. Persist the redacted config (best effort)
//!   7. Start the supervision topology (fatal on failure)
//!   8. Swap to the structured log sink if configured
//!   9. Log readiness

use tracing::{info, warn};

use crate::bootstrap::chunking::ChunkingConfigurator;
use crate::bootstrap::identity::{self, KeyKind};
use crate::bootstrap::logger::LogHandle;
use crate::bootstrap::persist::{self, PersistTargets};
use crate::bootstrap::reconcile::reconcile;
use crate::bootstrap::trust::reconcile_cluster_trust;
use crate::config::{FrozenConfig, HostConfig};
use crate::error::AppError;
use crate::shared::{SharedState, init_shared_state};
use crate::supervisor::{self, Topology};

/// A running host.
pub struct Host {
    pub config: FrozenConfig,
    pub shared: SharedState,
    pub topology: Topology,
}

impl Host {
    /// Stop every topology node and wait for them to exit.
    pub async fn shutdown(self) {
        self.topology.shutdown().await;
        info!("host stopped");
    }
}

/// Boot a host. Only a config load failure or a topology start failure
/// returns an error; everything else degrades and is logged.
pub async fn boot<F>(
    load: F,
    chunking: &dyn ChunkingConfigurator,
    log: Option<&LogHandle>,
    targets: &PersistTargets,
) -> Result<Host, AppError>
where
    F: FnOnce() -> Result<HostConfig, AppError>,
{
    let shared = init_shared_state();
    let loaded = load()?;

    let trust = reconcile_cluster_trust(&loaded.cluster_seed, &loaded.cluster_issuers);
    let host = identity::resolve(loaded.host_seed.as_deref(), KeyKind::Server);
    info!(
        host_key = %host.public_key,
        cluster_key = %trust.public_key,
        cluster_adhoc = trust.is_adhoc,
        "identities resolved"
    );

    let config = reconcile(loaded, &host, &trust, chunking);

    let summary = persist::persist(&config, targets);
    if !summary.failed.is_empty() {
        warn!(
            written = summary.written.len(),
            failed = summary.failed.len(),
            "host config only partially persisted"
        );
    }

    let topology = supervisor::start(supervisor::build_topology(&config), &shared).await?;

    if config.enable_structured_logging {
        match log {
            Some(handle) => {
                if let Err(e) = handle.install_structured(&config.structured_log_level) {
                    warn!(error = %e, "structured logging not enabled, keeping default sink");
                }
            }
            None => warn!("structured logging requested but no log handle was provided"),
        }
    }

    info!(
        version = env!("CARGO_PKG_VERSION"),
        host_key = %config.host_key,
        lattice = %config.lattice_prefix,
        "started host runtime"
    );

    Ok(Host { config, shared, topology })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bootstrap::chunking::ChunkingSlot;
    use crate::bootstrap::identity::PublicKey;

    #[tokio::test]
    async fn boot_wires_config_into_topology() {
        let slot = ChunkingSlot::new();
        let host = boot(
            || Ok(HostConfig::default()),
            &slot,
            None,
            &PersistTargets::Disabled,
        )
        .await
        .unwrap();

        assert!(PublicKey::parse(&host.config.host_key).is_ok());
        assert_eq!(host.topology.host_count(), 1);
        assert_eq!(host.topology.hosts()[0].public_key, host.config.host_key);
        assert!(host.shared.vhosts.contains_key(&host.config.host_key));
        assert_eq!(slot.get().map(|c| c.port), Some(host.config.rpc_port));

        host.shutdown().await;
    }

    #[tokio::test]
    async fn load_failure_aborts_boot() {
        let result = boot(
            || Err(AppError::Config("unreadable".into())),
            &ChunkingSlot::new(),
            None,
            &PersistTargets::Disabled,
        )
        .await;
        assert!(matches!(result, Err(AppError::Config(_))));
    }

    #[tokio::test]
    async fn configured_host_seed_is_kept() {
        let seed = identity::generate(KeyKind::Server);
        let mut loaded = HostConfig::default();
        loaded.host_seed = Some(seed.seed.as_str().to_string());

        let host = boot(move || Ok(loaded), &ChunkingSlot::new(), None, &PersistTargets::Disabled)
            .await
            .unwrap();

        assert_eq!(host.config.host_key, seed.public_key.to_string());
        assert_eq!(host.config.host_seed, seed.seed.as_str());
        host.shutdown().await;
    }

    #[tokio::test]
    async fn structured_logging_without_handle_still_boots() {
        let mut loaded = HostConfig::default();
        loaded.logging.structured = true;
        let host = boot(move || Ok(loaded), &ChunkingSlot::new(), None, &PersistTargets::Disabled)
            .await
            .unwrap();
        assert!(host.config.enable_structured_logging);
        host.shutdown().await;
    }
}
