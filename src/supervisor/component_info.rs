//! Component info: serialisable view of the running topology.

use serde::{Deserialize, Serialize};

use super::status::NodeState;

/// One node of the component tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentInfo {
    /// Stable machine identifier (e.g. `"host_registry"`, `"lattice"`).
    pub id: String,
    /// Human-readable display name.
    pub name: String,
    pub state: NodeState,
    pub restarts: u32,
    /// Live entry count, registries only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entries: Option<usize>,
    /// Root only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uptime_ms: Option<u64>,
    pub children: Vec<ComponentInfo>,
}

impl ComponentInfo {
    pub fn node(id: &str, state: NodeState, restarts: u32) -> Self {
        Self {
            id: id.to_string(),
            name: Self::display_name(id),
            state,
            restarts,
            entries: None,
            uptime_ms: None,
            children: vec![],
        }
    }

    pub fn root(id: &str, uptime_ms: u64, children: Vec<ComponentInfo>) -> Self {
        Self {
            uptime_ms: Some(uptime_ms),
            children,
            ..Self::node(id, NodeState::Running, 0)
        }
    }

    pub fn with_entries(mut self, entries: usize) -> Self {
        self.entries = Some(entries);
        self
    }

    /// Depth-first search by id.
    pub fn find(&self, id: &str) -> Option<&ComponentInfo> {
        if self.id == id {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.find(id))
    }

    /// `"rpc_subscriber_registry"` → `"Rpc Subscriber Registry"`.
    pub fn display_name(id: &str) -> String {
        id.split('_')
            .filter(|w| !w.is_empty())
            .map(|w| {
                let mut chars = w.chars();
                match chars.next() {
                    None => String::new(),
                    Some(c) => c.to_uppercase().collect::<String>() + chars.as_str(),
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}
