use crate::integration::{NetworkSimulator, SimulatedNetworkClient};
use chordal_lib::{NodeId, NodeInfo, NodeSnapshot, Ring};
use chordal_node::{
    ChordError, ChordNode, JoinOutcome, Result, Stabilizer, StabilizerConfig,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

pub type SimNode = ChordNode<SimulatedNetworkClient>;

/// Orchestrates an in-process ring of real `ChordNode`s over the simulator.
pub struct TestHarness {
    network: NetworkSimulator,
    ring: Ring,
    nodes: BTreeMap<NodeId, SimNode>,
    /// Message processing loops, one per node
    tasks: Vec<JoinHandle<()>>,
    stabilizers: Vec<Stabilizer>,
}

impl TestHarness {
    pub fn new(bits: u32) -> Self {
        Self {
            network: NetworkSimulator::new(),
            ring: Ring::new(bits).expect("ring width"),
            nodes: BTreeMap::new(),
            tasks: Vec::new(),
            stabilizers: Vec::new(),
        }
    }

    pub fn address_of(id: NodeId) -> String {
        format!("127.0.0.1:{}", 8000 + id)
    }

    pub fn ring(&self) -> Ring {
        self.ring
    }

    pub fn network(&self) -> &NetworkSimulator {
        &self.network
    }

    /// Creates a node and starts answering its messages. The node is not joined yet.
    pub async fn add_node(&mut self, id: NodeId) -> SimNode {
        let address = Self::address_of(id);
        let (tx, mut rx) = mpsc::unbounded_channel();
        self.network.register_node(address.clone(), tx).await;

        let client = self.network.create_client(address.clone());
        let node = ChordNode::new(NodeInfo::new(id, address), self.ring, Arc::new(client))
            .expect("node id fits the ring");

        let serving = node.clone();
        self.tasks.push(tokio::spawn(async move {
            while let Some(request) = rx.recv().await {
                // Requests may call back into this node, so each gets its own task.
                let node = serving.clone();
                tokio::spawn(async move {
                    let response = node.handle_message(request.message).await;
                    let _ = request.respond_to.send(response);
                });
            }
        }));

        self.nodes.insert(id, node.clone());
        node
    }

    pub async fn join_node(&self, id: NodeId, bootstrap: Option<NodeId>) -> Result<JoinOutcome> {
        let node = self.node(id).ok_or(ChordError::UnknownAddress(id))?;
        let bootstrap = bootstrap.map(|known| NodeInfo::new(known, Self::address_of(known)));
        node.join(bootstrap).await
    }

    /// Adds and joins `ids` one after another, all through the first. Returns the join outcomes.
    pub async fn build_ring(&mut self, ids: &[NodeId]) -> Result<Vec<JoinOutcome>> {
        let mut outcomes = Vec::new();
        let bootstrap = ids.first().copied();
        for &id in ids {
            self.add_node(id).await;
            let via = bootstrap.filter(|known| *known != id);
            outcomes.push(self.join_node(id, via).await?);
        }
        Ok(outcomes)
    }

    pub fn node(&self, id: NodeId) -> Option<&SimNode> {
        self.nodes.get(&id)
    }

    /// Node identifiers in ascending order.
    pub fn node_ids(&self) -> Vec<NodeId> {
        self.nodes.keys().copied().collect()
    }

    pub fn snapshot(&self, id: NodeId) -> Option<NodeSnapshot> {
        self.node(id).map(|node| node.snapshot())
    }

    pub fn snapshots(&self) -> Vec<NodeSnapshot> {
        self.nodes.values().map(|node| node.snapshot()).collect()
    }

    /// One `stabilize` on every node in identifier order. Returns the failures.
    pub async fn stabilization_round(&self) -> Vec<(NodeId, ChordError)> {
        let mut failures = Vec::new();
        for (id, node) in &self.nodes {
            if let Err(e) = node.stabilize().await {
                failures.push((*id, e));
            }
        }
        failures
    }

    /// Refreshes every finger of every node.
    pub async fn fix_all_fingers(&self) -> Vec<(NodeId, ChordError)> {
        let mut failures = Vec::new();
        for (id, node) in &self.nodes {
            for index in 1..=self.ring.bits() as usize {
                if let Err(e) = node.fix_finger(index).await {
                    failures.push((*id, e));
                }
            }
        }
        failures
    }

    pub async fn lookup(&self, from: NodeId, key: NodeId) -> Result<NodeInfo> {
        let node = self.node(from).ok_or(ChordError::UnknownAddress(from))?;
        node.find_successor(key).await
    }

    pub async fn fail_node(&self, id: NodeId) {
        self.network.mark_node_failed(&Self::address_of(id)).await;
    }

    /// Takes a node off the network without telling anyone. Its request loop ends.
    pub async fn remove_node(&mut self, id: NodeId) -> Option<SimNode> {
        self.network.unregister_node(&Self::address_of(id)).await;
        self.nodes.remove(&id)
    }

    pub fn start_stabilizers(&mut self, config: StabilizerConfig) {
        for node in self.nodes.values() {
            self.stabilizers.push(Stabilizer::spawn(node.clone(), config));
        }
    }

    pub async fn shutdown(mut self) {
        for stabilizer in std::mem::take(&mut self.stabilizers) {
            stabilizer.shutdown().await;
        }
        for task in &self.tasks {
            task.abort();
        }
    }
}

impl Drop for TestHarness {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}
