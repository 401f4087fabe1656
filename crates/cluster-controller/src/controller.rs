use crate::config;
use crate::launch::LaunchFn;
use crate::multicast::Multicaster;
use coordination::{Coordination, CreateMode};
use hash_ring::{CachePolicy, CacheStrategy, HashRange, HashRing, Node, Status};
use protocol::{AdminMessage, MetadataSnapshot};
use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Copy, Clone, Debug)]
pub struct Timeouts {
    /// Deadline for establishing the coordination session.
    pub connect: Duration,
    /// Deadline for collecting the acknowledgements of one multicast.
    pub multicast: Duration,
    /// Deadline for one remote process launch.
    pub launch: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            connect: CONNECT_TIMEOUT,
            multicast: MULTICAST_TIMEOUT,
            launch: LAUNCH_TIMEOUT,
        }
    }
}

/// Controller drives the cluster's node lifecycle and owns its routing
/// metadata: it provisions nodes from the idle pool, multicasts admin
/// commands, mutates the hash ring as nodes come and go, and publishes the
/// active ring for storage nodes to read.
///
/// Control operations are serialized (they take `&mut self`); the only
/// internal fan-out is the multicaster's, within a single operation.
impl std::fmt::Debug for Controller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Controller")
            .field("table", &self.table)
            .field("ring", &self.ring)
            .field("timeouts", &self.timeouts)
            .finish_non_exhaustive()
    }
}

pub struct Controller {
    dcs: Arc<dyn Coordination>,
    multicaster: Multicaster,
    // Candidate nodes not yet provisioned, drained in seed-config order.
    pool: Mutex<VecDeque<Node>>,
    // Every provisioned node, by name.
    table: BTreeMap<String, Node>,
    ring: HashRing,
    launch_fn: LaunchFn,
    timeouts: Timeouts,
}

impl Controller {
    /// Initialize from the seed configuration: populate the idle pool,
    /// block until the coordination session is confirmed, and ensure the
    /// server root znode exists.
    pub async fn init(
        dcs: Arc<dyn Coordination>,
        config_path: &std::path::Path,
        launch_fn: LaunchFn,
        timeouts: Timeouts,
    ) -> anyhow::Result<Self> {
        let seed = config::load_seed_config(config_path)?;
        tracing::info!(candidates = seed.len(), "loaded seed configuration");

        coordination::sync_connected(dcs.as_ref(), timeouts.connect).await?;
        if dcs.exists(protocol::SERVER_ROOT).await?.is_none() {
            dcs.create(protocol::SERVER_ROOT, Vec::new(), CreateMode::Persistent)
                .await?;
        }

        Ok(Self {
            multicaster: Multicaster::new(dcs.clone()),
            dcs,
            pool: Mutex::new(seed.into()),
            table: BTreeMap::new(),
            ring: HashRing::new(),
            launch_fn,
            timeouts,
        })
    }

    /// Reserve `count` idle nodes, provision and launch each, and await
    /// their INIT acknowledgements. Nodes which acknowledge are returned
    /// as STOPPED; nodes which fail to provision or acknowledge are
    /// REMOVED and dropped from the table. Returns None when fewer than
    /// `count` idle nodes remain.
    #[tracing::instrument(skip(self))]
    pub async fn add_nodes(
        &mut self,
        count: usize,
        strategy: CacheStrategy,
        size: u64,
    ) -> Option<Vec<Node>> {
        let mut reserved: Vec<Node> = {
            let mut pool = self.pool.lock().unwrap();
            if pool.len() < count {
                tracing::warn!(
                    requested = count,
                    available = pool.len(),
                    "insufficient idle capacity"
                );
                return None;
            }
            pool.drain(..count).collect()
        };

        let policy = CachePolicy { strategy, size };
        let init = AdminMessage::init(&policy);

        let mut provisioned = Vec::new();
        for node in &mut reserved {
            match self.provision(node, &init).await {
                Ok(()) => {
                    node.status = Status::Inactive;
                    node.policy = Some(policy);
                    self.table.insert(node.name.clone(), node.clone());
                    provisioned.push(node.clone());
                }
                Err(err) => {
                    tracing::error!(node = %node.name, ?err, "dropping node: provisioning failed");
                    node.status = Status::Removed;
                }
            }
        }
        if provisioned.is_empty() {
            return Some(Vec::new());
        }

        // Await INIT acknowledgements from every node just provisioned.
        let outcome = self
            .multicaster
            .send(&init, &provisioned, self.timeouts.multicast)
            .await;

        for (name, err) in &outcome.errors {
            tracing::warn!(node = %name, %err, "dropping node: INIT not acknowledged");
            self.table.remove(name);
        }
        let mut ready = Vec::new();
        for name in &outcome.acked {
            self.transition(name, Status::Stopped);
            if let Some(node) = self.table.get(name) {
                ready.push(node.clone());
            }
        }
        Some(ready)
    }

    /// add_nodes, for a single node.
    pub async fn add_node(&mut self, strategy: CacheStrategy, size: u64) -> Option<Node> {
        self.add_nodes(1, strategy, size)
            .await
            .and_then(|nodes| nodes.into_iter().next())
    }

    /// Start every STOPPED node: acknowledged nodes join the ring and
    /// become ACTIVE, and the updated ring is published.
    #[tracing::instrument(skip_all)]
    pub async fn start(&mut self) -> bool {
        let targets = self.collect(Status::Stopped);
        if targets.is_empty() {
            tracing::debug!("no stopped nodes to start");
            return true;
        }

        let outcome = self
            .multicaster
            .send(&AdminMessage::start(), &targets, self.timeouts.multicast)
            .await;
        for (name, err) in &outcome.errors {
            tracing::warn!(node = %name, %err, "node failed to acknowledge START");
        }

        let mut aborted = false;
        for name in &outcome.acked {
            let Some(node) = self.table.get(name) else { continue };
            if let Err(err) = self.ring.add(node) {
                tracing::error!(node = %name, %err, "aborting start: ring insert failed");
                aborted = true;
                break;
            }
            self.transition(name, Status::Active);
        }

        let published = self.publish_metadata().await;
        outcome.all_ok() && published && !aborted
    }

    /// Stop every ACTIVE node: acknowledged nodes leave the ring and
    /// return to STOPPED, and the updated ring is published.
    #[tracing::instrument(skip_all)]
    pub async fn stop(&mut self) -> bool {
        let targets = self.collect(Status::Active);
        if targets.is_empty() {
            tracing::debug!("no active nodes to stop");
            return true;
        }

        let outcome = self
            .multicaster
            .send(&AdminMessage::stop(), &targets, self.timeouts.multicast)
            .await;
        for (name, err) in &outcome.errors {
            tracing::warn!(node = %name, %err, "node failed to acknowledge STOP");
        }

        let mut aborted = false;
        for name in &outcome.acked {
            let Some(node) = self.table.get(name) else { continue };
            if let Err(err) = self.ring.remove(node) {
                tracing::error!(node = %name, %err, "aborting stop: ring removal failed");
                aborted = true;
                break;
            }
            self.transition(name, Status::Stopped);
        }

        let published = self.publish_metadata().await;
        outcome.all_ok() && published && !aborted
    }

    /// Shut down every provisioned node. Acknowledged nodes leave the ring
    /// and the table; the (then empty, on full success) ring is published.
    #[tracing::instrument(skip_all)]
    pub async fn shut_down(&mut self) -> bool {
        let targets: Vec<Node> = self.table.values().cloned().collect();
        if targets.is_empty() {
            return self.publish_metadata().await;
        }

        let outcome = self
            .multicaster
            .send(&AdminMessage::shutdown(), &targets, self.timeouts.multicast)
            .await;
        for (name, err) in &outcome.errors {
            tracing::warn!(node = %name, %err, "node failed to acknowledge SHUTDOWN");
        }
        for name in &outcome.acked {
            self.retire(name);
        }

        let published = self.publish_metadata().await;
        outcome.all_ok() && published
    }

    /// Shut down the named subset of provisioned nodes. Ring and table
    /// mutate only for nodes which acknowledge, so invariants hold under
    /// partial success.
    #[tracing::instrument(skip(self))]
    pub async fn remove_nodes(&mut self, names: &[String]) -> bool {
        let mut targets = Vec::new();
        let mut missing = false;
        for name in names {
            match self.table.get(name) {
                Some(node) => targets.push(node.clone()),
                None => {
                    tracing::warn!(node = %name, "cannot remove unknown node");
                    missing = true;
                }
            }
        }
        if targets.is_empty() {
            return !missing;
        }

        let outcome = self
            .multicaster
            .send(&AdminMessage::shutdown(), &targets, self.timeouts.multicast)
            .await;
        for (name, err) in &outcome.errors {
            tracing::warn!(node = %name, %err, "node failed to acknowledge SHUTDOWN");
        }
        for name in &outcome.acked {
            self.retire(name);
        }

        let published = self.publish_metadata().await;
        outcome.all_ok() && published && !missing
    }

    /// Every provisioned node, by name.
    pub fn nodes(&self) -> &BTreeMap<String, Node> {
        &self.table
    }

    /// The node responsible for `key` under the ring's upper-bound rule.
    pub fn node_by_key(&self, key: &str) -> Option<Node> {
        match self.ring.node_for_key(key) {
            Ok(member) => self.table.get(&member.name).cloned(),
            Err(err) => {
                tracing::debug!(key, %err, "no node for key");
                None
            }
        }
    }

    /// Block until at least `count` provisioned nodes are STOPPED, or the
    /// timeout elapses.
    pub async fn await_nodes(&self, count: usize, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let stopped = self
                .table
                .values()
                .filter(|node| node.status == Status::Stopped)
                .count();
            if stopped >= count {
                return true;
            }
            let tick = tokio::time::sleep(AWAIT_POLL_INTERVAL);
            if tokio::time::timeout_at(deadline, tick).await.is_err() {
                return false;
            }
        }
    }

    /// Instruct `from` to hand the key-value pairs of `range` to `to`, and
    /// `to` to receive them. This drives the hand-off protocol only; when
    /// to rearrange is left to the operator, and doing so between a ring
    /// mutation and its publication preserves the lifecycle ordering.
    #[tracing::instrument(skip_all, fields(from = from, to = to, range = %range))]
    pub async fn transfer_data(&mut self, from: &str, to: &str, range: HashRange) -> bool {
        let (Some(source), Some(destination)) =
            (self.table.get(from).cloned(), self.table.get(to).cloned())
        else {
            tracing::warn!(from, to, "cannot transfer between unknown nodes");
            return false;
        };

        let move_data = AdminMessage::move_data(range, destination.endpoint());
        let moved = self
            .multicaster
            .send(&move_data, std::slice::from_ref(&source), self.timeouts.multicast)
            .await;
        if !moved.all_ok() {
            return false;
        }

        let received = self
            .multicaster
            .send(
                &AdminMessage::receive_data(),
                std::slice::from_ref(&destination),
                self.timeouts.multicast,
            )
            .await;
        received.all_ok()
    }

    // Write the node's admin znode with the INIT blob, purging message
    // znodes left by a prior provisioning of the same name, then launch
    // its process.
    async fn provision(&self, node: &Node, init: &AdminMessage) -> anyhow::Result<()> {
        let path = protocol::server_znode(&node.name);

        match self.dcs.exists(&path).await? {
            None => {
                self.dcs
                    .create(&path, init.encode(), CreateMode::Persistent)
                    .await?;
            }
            Some(_) => {
                for child in self.dcs.children(&path).await? {
                    self.dcs.delete(&format!("{path}/{child}"), None).await?;
                }
                self.dcs.set(&path, init.encode(), None).await?;
            }
        }

        // A hung launch must not stall the serialized control loop.
        let launched = tokio::time::timeout(self.timeouts.launch, (self.launch_fn)(node))
            .await
            .map_err(|_| anyhow::anyhow!("timed out launching '{}'", node.name))?;
        launched.map_err(|err| err.context(format!("failed to launch '{}'", node.name)))
    }

    // Publish the active ring to the metadata znode. A ring change is
    // observable by storage nodes only once this completes.
    async fn publish_metadata(&self) -> bool {
        let snapshot = MetadataSnapshot::of_ring(&self.ring).encode();

        let result = match self.dcs.exists(protocol::METADATA).await {
            Ok(None) => self
                .dcs
                .create(protocol::METADATA, snapshot, CreateMode::Persistent)
                .await
                .map(|_| ()),
            Ok(Some(_)) => self
                .dcs
                .set(protocol::METADATA, snapshot, None)
                .await
                .map(|_| ()),
            Err(err) => Err(err),
        };

        match result {
            Ok(()) => true,
            Err(err) => {
                tracing::error!(%err, "failed to publish metadata");
                false
            }
        }
    }

    // Advance `name` in the lifecycle, refusing transitions the state
    // machine forbids.
    fn transition(&mut self, name: &str, next: Status) {
        let Some(node) = self.table.get_mut(name) else { return };
        if node.status == next {
            return;
        }
        if !node.status.may_transition(next) {
            tracing::error!(
                node = %name,
                from = %node.status,
                to = %next,
                "refusing illegal lifecycle transition"
            );
            return;
        }
        node.status = next;
    }

    // Remove a node from the table, and from the ring if it was active.
    fn retire(&mut self, name: &str) {
        let Some(node) = self.table.remove(name) else { return };
        if node.status == Status::Active {
            if let Err(err) = self.ring.remove(&node) {
                tracing::error!(node = %name, %err, "retired node was not a ring member");
            }
        }
    }

    fn collect(&self, status: Status) -> Vec<Node> {
        self.table
            .values()
            .filter(|node| node.status == status)
            .cloned()
            .collect()
    }

    /// Read-only view of the active ring.
    pub fn ring(&self) -> &HashRing {
        &self.ring
    }
}

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const MULTICAST_TIMEOUT: Duration = Duration::from_secs(15);
const LAUNCH_TIMEOUT: Duration = Duration::from_secs(30);
const AWAIT_POLL_INTERVAL: Duration = Duration::from_millis(50);
