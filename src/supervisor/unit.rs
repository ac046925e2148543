//! Supervised units and the one-for-one restart loop.
//!
//! A [`Unit`] is a long-lived process owned by the topology. [`supervise`]
//! runs it under a [`RestartPolicy`]: every attempt is spawned as its own
//! Tokio task, so an attempt that panics is observed as a failed `JoinHandle`
//! and never takes down a sibling. A unit is restarted on its own; the rest
//! of the topology is not touched.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::error::AppError;

use super::status::StatusReporter;

/// Pause between a unit exiting and its next attempt.
pub const RESTART_BACKOFF: Duration = Duration::from_millis(100);

pub type UnitFuture = Pin<Box<dyn Future<Output = Result<(), AppError>> + Send + 'static>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RestartPolicy {
    /// Run once, whatever the outcome.
    Never,
    /// Restart after an error or panic, not after a clean exit.
    OnFailure,
    /// Restart after any exit until shutdown.
    Always,
}

impl RestartPolicy {
    fn should_restart(self, failed: bool) -> bool {
        match self {
            RestartPolicy::Never => false,
            RestartPolicy::OnFailure => failed,
            RestartPolicy::Always => true,
        }
    }
}

/// A restartable long-lived process.
///
/// [`Unit::run`] is called once per attempt and should return when `shutdown`
/// is cancelled. Shared state is captured at construction time.
pub trait Unit: Send + Sync + 'static {
    fn id(&self) -> &str;

    fn run(self: Arc<Self>, shutdown: CancellationToken) -> UnitFuture;
}

/// Run `unit` under `policy` until it settles or `shutdown` is cancelled.
pub fn supervise(
    unit: Arc<dyn Unit>,
    policy: RestartPolicy,
    shutdown: CancellationToken,
    status: StatusReporter,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let id = unit.id().to_string();
        loop {
            status.running().await;
            let attempt = tokio::spawn(Arc::clone(&unit).run(shutdown.clone()));

            let (failed, reason) = match attempt.await {
                Ok(Ok(())) => (false, "exited".to_string()),
                Ok(Err(e)) => {
                    error!(unit = %id, error = %e, "unit failed");
                    (true, e.to_string())
                }
                Err(e) => {
                    error!(unit = %id, error = %e, "unit panicked");
                    (true, format!("panicked: {e}"))
                }
            };

            if shutdown.is_cancelled() {
                status.stopped().await;
                debug!(unit = %id, "unit stopped");
                break;
            }

            if !policy.should_restart(failed) {
                if failed {
                    status.failed(reason).await;
                } else {
                    status.stopped().await;
                }
                debug!(unit = %id, ?policy, "unit settled");
                break;
            }

            warn!(unit = %id, %reason, "restarting unit");
            status.restarting(reason).await;

            tokio::select! {
                _ = shutdown.cancelled() => {
                    status.stopped().await;
                    break;
                }
                _ = tokio::time::sleep(RESTART_BACKOFF) => {}
            }
        }
    })
}
