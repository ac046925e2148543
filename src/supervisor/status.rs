//! Status board: push-based per-node lifecycle state.
//!
//! Each supervised node holds a [`StatusReporter`] and writes its state when
//! it changes (started, restarting, stopped, failed). The [`StatusBoard`]
//! keeps the last-written state per node and returns a snapshot on demand,
//! so introspection never waits on a node.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeState {
    Running,
    Restarting,
    Stopped,
    Failed,
}

/// Last reported state of a single node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeStatus {
    pub id: String,
    pub state: NodeState,
    /// Restarts since the topology started.
    pub restarts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Shared map of node id to last reported status. Clone freely.
#[derive(Clone, Default)]
pub struct StatusBoard {
    inner: Arc<RwLock<HashMap<String, NodeStatus>>>,
}

impl StatusBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reporter(&self, id: impl Into<String>) -> StatusReporter {
        StatusReporter { id: id.into(), board: self.clone() }
    }

    /// All node states, sorted by id.
    pub async fn snapshot(&self) -> Vec<NodeStatus> {
        let map = self.inner.read().await;
        let mut v: Vec<_> = map.values().cloned().collect();
        v.sort_by(|a, b| a.id.cmp(&b.id));
        v
    }

    pub async fn get(&self, id: &str) -> Option<NodeStatus> {
        self.inner.read().await.get(id).cloned()
    }
}

/// Per-node write handle into the [`StatusBoard`].
#[derive(Clone)]
pub struct StatusReporter {
    id: String,
    board: StatusBoard,
}

impl StatusReporter {
    pub async fn running(&self) {
        self.update(NodeState::Running, None, false).await;
    }

    pub async fn restarting(&self, reason: impl Into<String>) {
        self.update(NodeState::Restarting, Some(reason.into()), true).await;
    }

    pub async fn stopped(&self) {
        self.update(NodeState::Stopped, None, false).await;
    }

    pub async fn failed(&self, reason: impl Into<String>) {
        self.update(NodeState::Failed, Some(reason.into()), false).await;
    }

    async fn update(&self, state: NodeState, message: Option<String>, restarted: bool) {
        let mut map = self.board.inner.write().await;
        let entry = map.entry(self.id.clone()).or_insert_with(|| NodeStatus {
            id: self.id.clone(),
            state,
            restarts: 0,
            message: None,
        });
        entry.state = state;
        entry.message = message;
        if restarted {
            entry.restarts += 1;
        }
    }
}
