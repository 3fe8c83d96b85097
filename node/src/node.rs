use chordal_lib::{Finger, NodeId, NodeInfo, NodeSnapshot, Ring};
use log::debug;
use rand::Rng;
use sha1::{Digest, Sha1};
use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;

use crate::address_book::AddressBook;
use crate::error::{ChordError, Result};
use crate::finger_table::FingerTable;
use crate::network_client::NetworkClient;
use crate::peer::{LocalPeer, RemotePeer, RingPeer};

/// Ring membership of a node. `Joined` is terminal; a failed join falls back to `Unjoined`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinState {
    Unjoined,
    Joining,
    Joined,
}

/// Result of one `UpdateFingers` step on a single node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FingerUpdate {
    pub updated: bool,
    /// Where the propagation continues. `None` once the chain reaches the new node.
    pub next: Option<NodeInfo>,
}

impl FingerUpdate {
    fn unchanged() -> Self {
        Self {
            updated: false,
            next: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct JoinOutcome {
    /// Number of nodes whose finger tables changed while announcing this node.
    pub finger_updates: usize,
}

pub(crate) fn lock<U>(mutex: &Mutex<U>) -> MutexGuard<'_, U> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// SHA-1 of the address, first eight digest bytes big-endian, reduced onto the ring.
pub fn derive_node_id(address: &str, ring: &Ring) -> NodeId {
    let digest = Sha1::digest(address.as_bytes());
    let prefix = digest
        .iter()
        .take(8)
        .fold(0u64, |acc, byte| (acc << 8) | u64::from(*byte));
    ring.reduce(prefix)
}

pub struct ChordNode<T: NetworkClient> {
    pub info: NodeInfo,
    ring: Ring,
    pub(crate) predecessor: Arc<Mutex<NodeId>>,
    pub(crate) finger_table: Arc<Mutex<FingerTable>>,
    pub(crate) address_book: AddressBook,
    join_state: Arc<watch::Sender<JoinState>>,
    pub(crate) network_client: Arc<T>,
}

impl<T: NetworkClient> Clone for ChordNode<T> {
    fn clone(&self) -> Self {
        ChordNode {
            info: self.info.clone(),
            ring: self.ring,
            predecessor: self.predecessor.clone(),
            finger_table: self.finger_table.clone(),
            address_book: self.address_book.clone(),
            join_state: self.join_state.clone(),
            network_client: self.network_client.clone(),
        }
    }
}

impl<T: NetworkClient> fmt::Debug for ChordNode<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChordNode")
            .field("info", &self.info)
            .field("bits", &self.ring.bits())
            .field("predecessor", &self.predecessor_id())
            .field("successor", &self.successor_id())
            .field("join_state", &self.join_state())
            .finish()
    }
}

impl<T: NetworkClient> ChordNode<T> {
    pub fn new(info: NodeInfo, ring: Ring, network_client: Arc<T>) -> Result<Self> {
        if info.id >= ring.size() {
            return Err(ChordError::IdOutOfRange {
                id: info.id,
                bits: ring.bits(),
            });
        }
        let (join_state, _) = watch::channel(JoinState::Unjoined);

        Ok(ChordNode {
            predecessor: Arc::new(Mutex::new(info.id)),
            finger_table: Arc::new(Mutex::new(FingerTable::new(&ring, info.id))),
            address_book: AddressBook::new(&info),
            join_state: Arc::new(join_state),
            info,
            ring,
            network_client,
        })
    }

    /// Node whose identifier is derived from its own address.
    pub fn with_address(address: &str, ring: Ring, network_client: Arc<T>) -> Result<Self> {
        let id = derive_node_id(address, &ring);
        Self::new(NodeInfo::new(id, address), ring, network_client)
    }

    pub fn id(&self) -> NodeId {
        self.info.id
    }

    pub fn ring(&self) -> Ring {
        self.ring
    }

    pub fn address_book(&self) -> &AddressBook {
        &self.address_book
    }

    pub fn join_state(&self) -> JoinState {
        *self.join_state.borrow()
    }

    pub fn is_joined(&self) -> bool {
        self.join_state() == JoinState::Joined
    }

    /// Resolves once the node has joined. Returns false if the state channel closed first.
    pub async fn wait_until_joined(&self) -> bool {
        let mut state = self.join_state.subscribe();
        // Drop the borrowed state before `state` itself goes out of scope.
        let outcome = state.wait_for(|s| *s == JoinState::Joined).await.map(|_| ());
        outcome.is_ok()
    }

    /// Local handle for our own identifier, remote handle for everyone else.
    pub fn peer(&self, id: NodeId) -> Result<Box<dyn RingPeer + '_>> {
        if id == self.info.id {
            return Ok(Box::new(LocalPeer::new(self)));
        }
        let target = self.resolve(id)?;
        Ok(Box::new(RemotePeer::new(self, target)))
    }

    pub fn resolve(&self, id: NodeId) -> Result<NodeInfo> {
        if id == self.info.id {
            return Ok(self.info.clone());
        }
        self.address_book
            .resolve(id)
            .ok_or(ChordError::UnknownAddress(id))
    }

    pub fn successor_id(&self) -> NodeId {
        lock(&self.finger_table)
            .successor()
            .unwrap_or(self.info.id)
    }

    pub fn successor(&self) -> Result<NodeInfo> {
        self.resolve(self.successor_id())
    }

    pub fn predecessor_id(&self) -> NodeId {
        *lock(&self.predecessor)
    }

    pub fn predecessor(&self) -> Result<NodeInfo> {
        self.resolve(self.predecessor_id())
    }

    pub fn set_predecessor(&self, node: NodeInfo) {
        self.address_book.remember(&node);
        let mut predecessor = lock(&self.predecessor);
        if *predecessor != node.id {
            debug!(
                "[{}] predecessor {} -> {}",
                self.info.address, *predecessor, node.id
            );
        }
        *predecessor = node.id;
    }

    pub fn finger(&self, index: usize) -> Result<Finger> {
        Ok(lock(&self.finger_table).get(index)?)
    }

    pub fn fingers(&self) -> Vec<Finger> {
        lock(&self.finger_table).to_vec()
    }

    pub fn set_finger(&self, index: usize, node: NodeInfo) -> Result<()> {
        self.address_book.remember(&node);
        let previous = lock(&self.finger_table).set_node(index, node.id)?;
        if previous != node.id {
            debug!(
                "[{}] finger {} {} -> {}",
                self.info.address, index, previous, node.id
            );
        }
        Ok(())
    }

    pub fn snapshot(&self) -> NodeSnapshot {
        let fingers = self.fingers();
        NodeSnapshot {
            id: self.info.id,
            address: self.info.address.clone(),
            bits: self.ring.bits(),
            joined: self.is_joined(),
            predecessor: self.predecessor_id(),
            successor: fingers.first().map_or(self.info.id, |f| f.node),
            fingers,
            known_addresses: self.address_book.len(),
        }
    }

    // Finds the node responsible for `id`
    pub async fn find_successor(&self, id: NodeId) -> Result<NodeInfo> {
        let id = self.ring.reduce(id);
        let n_prime = self.find_predecessor(id).await?;
        if n_prime.id == id {
            return Ok(n_prime);
        }
        self.peer(n_prime.id)?.successor().await
    }

    /// Walks the ring until `id` falls in `(candidate, candidate.successor]`.
    ///
    /// When `id` is exactly that successor's identifier the successor itself
    /// is returned, so `find_successor` can hand it back unchanged.
    pub async fn find_predecessor(&self, id: NodeId) -> Result<NodeInfo> {
        let id = self.ring.reduce(id);
        let mut candidate = self.info.clone();
        let mut successor = self.successor()?;
        let mut hops = 0usize;

        while !self.ring.in_open_closed(id, candidate.id, successor.id) {
            let next = self
                .peer(candidate.id)?
                .closest_preceding_finger(id)
                .await?;
            if next.id == candidate.id {
                return Err(ChordError::RoutingStalled {
                    key: id,
                    at: candidate.id,
                });
            }
            candidate = next;
            successor = self.peer(candidate.id)?.successor().await?;
            hops += 1;
        }

        debug!(
            "[{}] predecessor of {} is {} after {} hops",
            self.info.address, id, candidate.id, hops
        );
        if successor.id == id {
            return Ok(successor);
        }
        Ok(candidate)
    }

    // Highest finger strictly inside (self, id), or self.
    pub fn closest_preceding_finger(&self, id: NodeId) -> Result<NodeInfo> {
        let id = self.ring.reduce(id);
        let closest = lock(&self.finger_table)
            .iter_descending()
            .map(|finger| finger.node)
            .find(|node| self.ring.in_open(*node, self.info.id, id));

        match closest {
            Some(node) => self.resolve(node),
            None => Ok(self.info.clone()),
        }
    }

    pub async fn join(&self, bootstrap: Option<NodeInfo>) -> Result<JoinOutcome> {
        let began = self.join_state.send_if_modified(|state| {
            if *state == JoinState::Unjoined {
                *state = JoinState::Joining;
                true
            } else {
                false
            }
        });
        if !began {
            return Err(ChordError::AlreadyJoined);
        }

        let result = match bootstrap {
            Some(known) if known.id != self.info.id => {
                log_info!(
                    self.info.address,
                    "Joining ring via {} ({})",
                    known.id,
                    known.address
                );
                self.join_via(known).await
            }
            _ => {
                self.start_new_ring();
                Ok(JoinOutcome::default())
            }
        };

        match &result {
            Ok(outcome) => {
                self.join_state.send_replace(JoinState::Joined);
                log_info!(
                    self.info.address,
                    "Joined as {}: successor {}, predecessor {}, {} finger updates",
                    self.info.id,
                    self.successor_id(),
                    self.predecessor_id(),
                    outcome.finger_updates
                );
            }
            Err(e) => {
                self.reset_routing();
                self.join_state.send_replace(JoinState::Unjoined);
                log_error!(self.info.address, "Join failed: {}", e);
            }
        }
        result
    }

    fn start_new_ring(&self) {
        self.reset_routing();
        log_info!(
            self.info.address,
            "No bootstrap node provided. Starting a new ring as {}.",
            self.info.id
        );
    }

    fn reset_routing(&self) {
        lock(&self.finger_table).fill(self.info.id);
        *lock(&self.predecessor) = self.info.id;
    }

    async fn join_via(&self, known: NodeInfo) -> Result<JoinOutcome> {
        self.address_book.remember(&known);
        self.init_fingers(known.id).await?;
        let finger_updates = self.update_others().await?;
        Ok(JoinOutcome { finger_updates })
    }

    /// Fills the finger table through the bootstrap node and splices this node
    /// in front of its successor.
    pub async fn init_fingers(&self, known: NodeId) -> Result<()> {
        let bootstrap = self.peer(known)?;

        let first_start = self.finger(1)?.start;
        let successor = bootstrap.find_successor(first_start).await?;
        self.set_finger(1, successor.clone())?;

        let predecessor = self.peer(successor.id)?.predecessor().await?;
        self.set_predecessor(predecessor);
        self.peer(successor.id)?
            .set_predecessor(self.info.clone())
            .await?;

        for index in 1..self.ring.bits() as usize {
            let current = self.finger(index)?;
            let next_start = self.finger(index + 1)?.start;
            // Starts only grow, so the next slot often has the same owner.
            let owner = if self.ring.in_half_open(next_start, self.info.id, current.node) {
                self.resolve(current.node)?
            } else {
                bootstrap.find_successor(next_start).await?
            };
            self.set_finger(index + 1, owner)?;
        }
        Ok(())
    }

    /// Tells every node that should now point finger `i` at us. Returns how many tables changed.
    pub async fn update_others(&self) -> Result<usize> {
        let mut updated = 0;
        for index in 1..=self.ring.bits() as usize {
            let target = self.ring.sub(self.info.id, self.ring.finger_offset(index)?);
            let p = self.find_predecessor(target).await?;
            if p.id == self.info.id {
                continue;
            }
            updated += self
                .propagate_finger_update(self.info.clone(), p, index)
                .await?;
        }
        Ok(updated)
    }

    /// Offers `s` for finger `index` here and keeps walking predecessors while tables change.
    pub async fn update_fingers(&self, s: NodeInfo, index: usize) -> Result<usize> {
        self.propagate_finger_update(s, self.info.clone(), index)
            .await
    }

    // Work-list form of the recursive update: each hop only reports its predecessor.
    async fn propagate_finger_update(
        &self,
        s: NodeInfo,
        first: NodeInfo,
        index: usize,
    ) -> Result<usize> {
        let mut visited = HashSet::new();
        let mut updated = 0;
        let mut next = Some(first);

        while let Some(target) = next.take() {
            if !visited.insert(target.id) {
                break;
            }
            let step = self
                .peer(target.id)?
                .update_fingers(s.clone(), index)
                .await?;
            if !step.updated {
                break;
            }
            updated += 1;
            next = step.next;
        }
        Ok(updated)
    }

    /// One propagation step: adopt `s` for finger `index` if it lies in `[self, finger.node)`.
    pub fn apply_finger_update(&self, s: NodeInfo, index: usize) -> Result<FingerUpdate> {
        if s.id == self.info.id {
            return Ok(FingerUpdate::unchanged());
        }
        self.address_book.remember(&s);

        let changed = {
            let mut table = lock(&self.finger_table);
            let current = table.get(index)?;
            if self.ring.in_half_open(s.id, self.info.id, current.node) {
                table.set_node(index, s.id)?;
                true
            } else {
                false
            }
        };
        if !changed {
            return Ok(FingerUpdate::unchanged());
        }

        debug!(
            "[{}] finger {} now {} (join propagation)",
            self.info.address, index, s.id
        );
        let predecessor = self.predecessor()?;
        let next = (predecessor.id != s.id).then_some(predecessor);
        Ok(FingerUpdate {
            updated: true,
            next,
        })
    }

    /// Adopts `node` as predecessor if it sits strictly between the current one and us.
    pub fn notify(&self, node: NodeInfo) -> bool {
        let mut predecessor = lock(&self.predecessor);
        if !self.ring.in_open(node.id, *predecessor, self.info.id) {
            return false;
        }
        self.address_book.remember(&node);
        debug!(
            "[{}] Notify: predecessor {} -> {}",
            self.info.address, *predecessor, node.id
        );
        *predecessor = node.id;
        true
    }

    pub async fn stabilize(&self) -> Result<()> {
        let successor = self.successor()?;
        let x = self.peer(successor.id)?.predecessor().await?;

        if x.id != self.info.id && self.ring.in_open(x.id, self.info.id, successor.id) {
            debug!(
                "[{}] Stabilize: successor {} -> {}",
                self.info.address, successor.id, x.id
            );
            self.set_finger(1, x)?;
        }

        let successor = self.successor()?;
        self.peer(successor.id)?
            .notify(self.info.clone())
            .await
    }

    // Refreshes one finger picked uniformly at random; returns its index.
    pub async fn fix_fingers(&self) -> Result<usize> {
        let index = rand::thread_rng().gen_range(1..=self.ring.bits() as usize);
        self.fix_finger(index).await?;
        Ok(index)
    }

    pub async fn fix_finger(&self, index: usize) -> Result<()> {
        let start = self.finger(index)?.start;
        let owner = self.find_successor(start).await?;
        self.set_finger(index, owner)
    }
}
