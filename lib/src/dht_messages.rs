use serde::{Deserialize, Serialize};

/// Position of a node (or key) on the identifier ring, always in `[0, 2^m)`.
pub type NodeId = u64;

/// An identifier together with the address its owner can be called on.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeInfo {
    pub id: NodeId,
    pub address: String,
}

impl NodeInfo {
    pub fn new(id: NodeId, address: impl Into<String>) -> Self {
        Self {
            id,
            address: address.into(),
        }
    }
}

/// One finger-table slot. `start` is fixed for the owner's lifetime, `node` is repaired over time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finger {
    pub start: NodeId,
    pub node: NodeId,
}

/// Point-in-time view of a node's routing state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeSnapshot {
    pub id: NodeId,
    pub address: String,
    pub bits: u32,
    pub joined: bool,
    pub predecessor: NodeId,
    pub successor: NodeId,
    /// Entries for finger indices `1..=bits`, in order.
    pub fingers: Vec<Finger>,
    pub known_addresses: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DhtMessage {
    // Liveness check
    Ping,
    Pong,
    // Generic acknowledgement for requests without a payload in the reply
    Ack,
    // Read the receiver's predecessor
    GetPredecessor,
    Predecessor {
        node: NodeInfo,
    },
    // Overwrite the receiver's predecessor (sent by a joining node to its new successor)
    SetPredecessor {
        node: NodeInfo,
    },
    // Read the receiver's successor (finger 1)
    GetSuccessor,
    Successor {
        node: NodeInfo,
    },
    // Resolve the owner of `id`
    FindSuccessor {
        id: NodeId,
    },
    FoundSuccessor {
        node: NodeInfo,
    },
    // Ask for the receiver's finger that most closely precedes `id`
    ClosestPrecedingFinger {
        id: NodeId,
    },
    FoundClosestPrecedingFinger {
        node: NodeInfo,
    },
    // Tell the receiver that `node` might be its predecessor
    Notify {
        node: NodeInfo,
    },
    // One step of finger propagation after a join: `node` may replace finger `index`
    UpdateFingers {
        node: NodeInfo,
        index: usize,
    },
    // `next` is the node the caller should continue the propagation with, if any
    FingersUpdated {
        updated: bool,
        next: Option<NodeInfo>,
    },
    // Address book lookup and registration
    GetAddress {
        id: NodeId,
    },
    Address {
        id: NodeId,
        address: Option<String>,
    },
    SetAddress {
        node: NodeInfo,
    },
    // Routing state dump
    GetState,
    State {
        snapshot: NodeSnapshot,
    },
    Error {
        message: String,
    },
}
