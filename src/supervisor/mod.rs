//! Supervisor: builds and runs the host's process topology.
//!
//! [`build_topology`] turns the frozen config into an ordered list of
//! [`NodeSpec`]s; [`start`] brings them up in that order under a one-for-one
//! strategy. Discovery registries come first because every other node
//! registers into at least one of them. A registrant whose registry has not
//! been started yet fails, and any start failure tears down everything that
//! was already running before returning the error.

pub mod component_info;
pub mod registry;
pub mod status;
pub mod unit;

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::config::RuntimeConfig;
use crate::shared::{SharedState, VirtualHostDescriptor};

use component_info::ComponentInfo;
use registry::{ProcessHandle, Registry, RegistryError, RegistryKeys};
use status::{NodeState, StatusBoard};
use unit::{RestartPolicy, Unit, UnitFuture, supervise};

/// Subject prefix for lattice event monitors.
pub const EVENT_TOPIC_PREFIX: &str = "wasmbus.evt";

// ── Node kinds ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    HostRegistry,
    ActorRegistry,
    ProviderRegistry,
    RpcSubscriberRegistry,
    EventMonitorRegistry,
    ProviderSupervisor,
    ActorSupervisor,
    LatticeRoot,
    VirtualHostRoot,
}

impl NodeKind {
    pub fn id(self) -> &'static str {
        match self {
            NodeKind::HostRegistry => "host_registry",
            NodeKind::ActorRegistry => "actor_registry",
            NodeKind::ProviderRegistry => "provider_registry",
            NodeKind::RpcSubscriberRegistry => "rpc_subscriber_registry",
            NodeKind::EventMonitorRegistry => "event_monitor_registry",
            NodeKind::ProviderSupervisor => "provider_supervisor",
            NodeKind::ActorSupervisor => "actor_supervisor",
            NodeKind::LatticeRoot => "lattice",
            NodeKind::VirtualHostRoot => "virtual_host",
        }
    }

    pub fn is_registry(self) -> bool {
        matches!(
            self,
            NodeKind::HostRegistry
                | NodeKind::ActorRegistry
                | NodeKind::ProviderRegistry
                | NodeKind::RpcSubscriberRegistry
                | NodeKind::EventMonitorRegistry
        )
    }

    /// Registries this node registers into. They must already be running.
    pub fn requires(self) -> &'static [NodeKind] {
        match self {
            NodeKind::ProviderSupervisor => &[NodeKind::ProviderRegistry],
            NodeKind::ActorSupervisor => &[NodeKind::ActorRegistry],
            NodeKind::LatticeRoot => {
                &[NodeKind::RpcSubscriberRegistry, NodeKind::EventMonitorRegistry]
            }
            NodeKind::VirtualHostRoot => &[NodeKind::HostRegistry],
            _ => &[],
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

// ── Specs ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeParams {
    Registry { keys: RegistryKeys, partitions: usize },
    Supervisor,
    Lattice { lattice_prefix: String, host_key: String, ctl_topic_prefix: String },
    VirtualHost { host_key: String, lattice_prefix: String, labels: BTreeMap<String, String> },
}

/// One long-lived node to start. List order is start order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeSpec {
    pub kind: NodeKind,
    pub params: NodeParams,
    pub restart: RestartPolicy,
}

impl NodeSpec {
    pub fn registry(kind: NodeKind, keys: RegistryKeys, partitions: usize) -> Self {
        Self::permanent(kind, NodeParams::Registry { keys, partitions })
    }

    fn permanent(kind: NodeKind, params: NodeParams) -> Self {
        Self { kind, params, restart: RestartPolicy::Always }
    }
}

/// A registry value: which lattice the registered process belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registration {
    pub lattice_prefix: String,
}

pub type SharedRegistry = Arc<Registry<Registration>>;

/// Partition count for the event-monitor registry.
pub fn event_monitor_partitions() -> usize {
    std::thread::available_parallelism().map(NonZeroUsize::get).unwrap_or(1)
}

/// Ordered node list for this host. Registries first, then their registrants.
pub fn build_topology(config: &RuntimeConfig) -> Vec<NodeSpec> {
    vec![
        NodeSpec::registry(NodeKind::HostRegistry, RegistryKeys::Unique, 1),
        NodeSpec::registry(NodeKind::ActorRegistry, RegistryKeys::Duplicate, 1),
        NodeSpec::registry(NodeKind::ProviderRegistry, RegistryKeys::Duplicate, 1),
        NodeSpec::registry(NodeKind::RpcSubscriberRegistry, RegistryKeys::Duplicate, 1),
        NodeSpec::registry(
            NodeKind::EventMonitorRegistry,
            RegistryKeys::Duplicate,
            event_monitor_partitions(),
        ),
        NodeSpec::permanent(NodeKind::ProviderSupervisor, NodeParams::Supervisor),
        NodeSpec::permanent(NodeKind::ActorSupervisor, NodeParams::Supervisor),
        NodeSpec::permanent(
            NodeKind::LatticeRoot,
            NodeParams::Lattice {
                lattice_prefix: config.lattice_prefix.clone(),
                host_key: config.host_key.clone(),
                ctl_topic_prefix: config.ctl_topic_prefix.clone(),
            },
        ),
        NodeSpec::permanent(
            NodeKind::VirtualHostRoot,
            NodeParams::VirtualHost {
                host_key: config.host_key.clone(),
                lattice_prefix: config.lattice_prefix.clone(),
                labels: config.host_labels.clone(),
            },
        ),
    ]
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum TopologyError {
    #[error("topology has no nodes")]
    EmptyTopology,

    #[error("{node} requires {registry}, which is not running")]
    MissingRegistry { node: NodeKind, registry: NodeKind },

    #[error("{0} is already running")]
    DuplicateNode(NodeKind),

    #[error("{0}: parameters do not match node kind")]
    InvalidParams(NodeKind),

    #[error("{node}: {source}")]
    Registration { node: NodeKind, source: RegistryError },
}

// ── Running topology ──────────────────────────────────────────────────────────

/// A `(public key, process, lattice)` row from the host registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HostSummary {
    pub public_key: String,
    pub handle: ProcessHandle,
    pub lattice_prefix: String,
}

struct RunningNode {
    kind: NodeKind,
    handle: ProcessHandle,
    task: JoinHandle<()>,
}

pub struct Topology {
    nodes: Vec<RunningNode>,
    registries: HashMap<NodeKind, SharedRegistry>,
    board: StatusBoard,
    shutdown: CancellationToken,
    started_at: Instant,
}

impl Topology {
    pub fn host_count(&self) -> usize {
        self.registry(NodeKind::HostRegistry).map(|r| r.count()).unwrap_or(0)
    }

    pub fn hosts(&self) -> Vec<HostSummary> {
        let Some(hosts) = self.registry(NodeKind::HostRegistry) else {
            return Vec::new();
        };
        hosts
            .entries()
            .into_iter()
            .map(|(public_key, handle, reg)| HostSummary {
                public_key,
                handle,
                lattice_prefix: reg.lattice_prefix,
            })
            .collect()
    }

    pub fn registry(&self, kind: NodeKind) -> Option<SharedRegistry> {
        self.registries.get(&kind).cloned()
    }

    /// Running nodes in start order.
    pub fn nodes(&self) -> Vec<(NodeKind, ProcessHandle)> {
        self.nodes.iter().map(|n| (n.kind, n.handle)).collect()
    }

    pub fn status(&self) -> &StatusBoard {
        &self.board
    }

    pub async fn component_tree(&self) -> ComponentInfo {
        let mut children = Vec::with_capacity(self.nodes.len());
        for node in &self.nodes {
            let (state, restarts) = match self.board.get(node.kind.id()).await {
                Some(s) => (s.state, s.restarts),
                None => (NodeState::Stopped, 0),
            };
            let mut info = ComponentInfo::node(node.kind.id(), state, restarts);
            if let Some(reg) = self.registries.get(&node.kind) {
                info = info.with_entries(reg.count());
            }
            children.push(info);
        }
        let uptime_ms = self.started_at.elapsed().as_millis() as u64;
        ComponentInfo::root("topology", uptime_ms, children)
    }

    /// Cancel every node and wait for all of them to exit.
    pub async fn shutdown(self) {
        info!(nodes = self.nodes.len(), "stopping topology");
        stop_nodes(&self.shutdown, self.nodes).await;
    }
}

/// Start `specs` in order. Fails fast: on the first node that cannot start,
/// every node started so far is stopped before the error is returned.
pub async fn start(specs: Vec<NodeSpec>, shared: &SharedState) -> Result<Topology, TopologyError> {
    if specs.is_empty() {
        return Err(TopologyError::EmptyTopology);
    }

    let shutdown = CancellationToken::new();
    let board = StatusBoard::new();
    let mut registries: HashMap<NodeKind, SharedRegistry> = HashMap::new();
    let mut nodes: Vec<RunningNode> = Vec::with_capacity(specs.len());

    for spec in specs {
        let prepared = if nodes.iter().any(|n| n.kind == spec.kind) {
            Err(TopologyError::DuplicateNode(spec.kind))
        } else {
            prepare(&spec, &registries, shared)
        };

        let (unit, registry) = match prepared {
            Ok(prepared) => prepared,
            Err(e) => {
                error!(node = %spec.kind, error = %e, "topology node failed to start");
                stop_nodes(&shutdown, nodes).await;
                return Err(e);
            }
        };

        if let Some(registry) = registry {
            registries.insert(spec.kind, registry);
        }
        let handle = unit.owner;
        let reporter = board.reporter(spec.kind.id());
        reporter.running().await;
        let task = supervise(
            Arc::new(unit),
            spec.restart,
            shutdown.clone(),
            reporter,
        );
        debug!(node = %spec.kind, %handle, restart = ?spec.restart, "node started");
        nodes.push(RunningNode { kind: spec.kind, handle, task });
    }

    info!(nodes = nodes.len(), "topology started");
    Ok(Topology { nodes, registries, board, shutdown, started_at: Instant::now() })
}

async fn stop_nodes(shutdown: &CancellationToken, nodes: Vec<RunningNode>) {
    shutdown.cancel();
    for node in nodes.into_iter().rev() {
        if let Err(e) = node.task.await {
            error!(node = %node.kind, error = %e, "node task did not exit cleanly");
        }
    }
}

// ── Node construction ─────────────────────────────────────────────────────────

/// A registration held by a node, released when the node stops.
struct Claim {
    registry: SharedRegistry,
    key: String,
}

/// The unit every topology node runs. Claims are taken when the node is
/// prepared and released when it stops.
struct NodeUnit {
    kind: NodeKind,
    owner: ProcessHandle,
    claims: Vec<Claim>,
    vhost: Option<(String, SharedState)>,
}

impl Unit for NodeUnit {
    fn id(&self) -> &str {
        self.kind.id()
    }

    fn run(self: Arc<Self>, shutdown: CancellationToken) -> UnitFuture {
        Box::pin(async move {
            shutdown.cancelled().await;
            self.release();
            Ok(())
        })
    }
}

fn require(
    node: NodeKind,
    registry: NodeKind,
    registries: &HashMap<NodeKind, SharedRegistry>,
) -> Result<SharedRegistry, TopologyError> {
    registries
        .get(&registry)
        .cloned()
        .ok_or(TopologyError::MissingRegistry { node, registry })
}

fn prepare(
    spec: &NodeSpec,
    registries: &HashMap<NodeKind, SharedRegistry>,
    shared: &SharedState,
) -> Result<(NodeUnit, Option<SharedRegistry>), TopologyError> {
    for registry in spec.kind.requires() {
        require(spec.kind, *registry, registries)?;
    }

    let mut unit = NodeUnit {
        kind: spec.kind,
        owner: ProcessHandle::new(),
        claims: Vec::new(),
        vhost: None,
    };
    match attach(&mut unit, &spec.params, registries, shared) {
        Ok(registry) => Ok((unit, registry)),
        Err(e) => {
            unit.release();
            Err(e)
        }
    }
}

/// Create the node's registry or take its registrations.
fn attach(
    unit: &mut NodeUnit,
    params: &NodeParams,
    registries: &HashMap<NodeKind, SharedRegistry>,
    shared: &SharedState,
) -> Result<Option<SharedRegistry>, TopologyError> {
    let kind = unit.kind;
    match (params, kind) {
        (NodeParams::Registry { keys, partitions }, _) if kind.is_registry() => {
            let registry = Registry::new(kind.id(), *keys, *partitions)
                .map_err(|source| TopologyError::Registration { node: kind, source })?;
            return Ok(Some(Arc::new(registry)));
        }
        (NodeParams::Supervisor, NodeKind::ActorSupervisor | NodeKind::ProviderSupervisor) => {}
        (NodeParams::Lattice { lattice_prefix, host_key, ctl_topic_prefix }, NodeKind::LatticeRoot) => {
            let value = Registration { lattice_prefix: lattice_prefix.clone() };
            let rpc = require(kind, NodeKind::RpcSubscriberRegistry, registries)?;
            let events = require(kind, NodeKind::EventMonitorRegistry, registries)?;
            unit.claim(rpc, format!("{ctl_topic_prefix}.{lattice_prefix}.{host_key}"), value.clone())?;
            unit.claim(events, format!("{EVENT_TOPIC_PREFIX}.{lattice_prefix}"), value)?;
        }
        (NodeParams::VirtualHost { host_key, lattice_prefix, labels }, NodeKind::VirtualHostRoot) => {
            let hosts = require(kind, NodeKind::HostRegistry, registries)?;
            let value = Registration { lattice_prefix: lattice_prefix.clone() };
            unit.claim(hosts, host_key.clone(), value)?;
            shared.vhosts.insert(
                host_key.clone(),
                VirtualHostDescriptor::new(host_key.clone(), lattice_prefix.clone(), labels.clone()),
            );
            unit.vhost = Some((host_key.clone(), shared.clone()));
        }
        _ => return Err(TopologyError::InvalidParams(kind)),
    }
    Ok(None)
}

impl NodeUnit {
    fn claim(
        &mut self,
        registry: SharedRegistry,
        key: String,
        value: Registration,
    ) -> Result<(), TopologyError> {
        registry
            .register(key.clone(), self.owner, value)
            .map_err(|source| TopologyError::Registration { node: self.kind, source })?;
        self.claims.push(Claim { registry, key });
        Ok(())
    }

    fn release(&self) {
        for claim in &self.claims {
            claim.registry.unregister(&claim.key, self.owner);
        }
        if let Some((host_key, shared)) = &self.vhost {
            shared.vhosts.remove(host_key);
        }
    }
}
