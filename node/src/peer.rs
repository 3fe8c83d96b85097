use async_trait::async_trait;
use chordal_lib::{DhtMessage, NodeId, NodeInfo};

use crate::error::{ChordError, Result};
use crate::network_client::{request, NetworkClient};
use crate::node::{ChordNode, FingerUpdate};

/// The operations a node answers for other nodes.
///
/// `LocalPeer` runs them on the calling node itself, `RemotePeer` sends them
/// over the node's `NetworkClient`. `ChordNode::peer` picks one per call.
#[async_trait]
pub trait RingPeer: Send + Sync {
    async fn successor(&self) -> Result<NodeInfo>;

    async fn predecessor(&self) -> Result<NodeInfo>;

    async fn set_predecessor(&self, node: NodeInfo) -> Result<()>;

    async fn find_successor(&self, id: NodeId) -> Result<NodeInfo>;

    async fn closest_preceding_finger(&self, id: NodeId) -> Result<NodeInfo>;

    async fn notify(&self, node: NodeInfo) -> Result<()>;

    async fn update_fingers(&self, node: NodeInfo, index: usize) -> Result<FingerUpdate>;
}

pub struct LocalPeer<'a, T: NetworkClient> {
    node: &'a ChordNode<T>,
}

impl<'a, T: NetworkClient> LocalPeer<'a, T> {
    pub fn new(node: &'a ChordNode<T>) -> Self {
        Self { node }
    }
}

#[async_trait]
impl<'a, T: NetworkClient> RingPeer for LocalPeer<'a, T> {
    async fn successor(&self) -> Result<NodeInfo> {
        self.node.successor()
    }

    async fn predecessor(&self) -> Result<NodeInfo> {
        self.node.predecessor()
    }

    async fn set_predecessor(&self, node: NodeInfo) -> Result<()> {
        self.node.set_predecessor(node);
        Ok(())
    }

    async fn find_successor(&self, id: NodeId) -> Result<NodeInfo> {
        self.node.find_successor(id).await
    }

    async fn closest_preceding_finger(&self, id: NodeId) -> Result<NodeInfo> {
        self.node.closest_preceding_finger(id)
    }

    async fn notify(&self, node: NodeInfo) -> Result<()> {
        self.node.notify(node);
        Ok(())
    }

    async fn update_fingers(&self, node: NodeInfo, index: usize) -> Result<FingerUpdate> {
        self.node.apply_finger_update(node, index)
    }
}

pub struct RemotePeer<'a, T: NetworkClient> {
    node: &'a ChordNode<T>,
    target: NodeInfo,
}

impl<'a, T: NetworkClient> RemotePeer<'a, T> {
    pub fn new(node: &'a ChordNode<T>, target: NodeInfo) -> Self {
        Self { node, target }
    }

    async fn call(&self, message: DhtMessage) -> Result<DhtMessage> {
        request(
            self.node.network_client.as_ref(),
            &self.target.address,
            message,
        )
        .await
    }

    // Every identifier that comes back is cached before anyone can store it.
    fn learn(&self, node: NodeInfo) -> NodeInfo {
        self.node.address_book.remember(&node);
        node
    }

    fn unexpected(&self, response: DhtMessage) -> ChordError {
        ChordError::UnexpectedResponse {
            address: self.target.address.clone(),
            response: format!("{:?}", response),
        }
    }
}

#[async_trait]
impl<'a, T: NetworkClient> RingPeer for RemotePeer<'a, T> {
    async fn successor(&self) -> Result<NodeInfo> {
        match self.call(DhtMessage::GetSuccessor).await? {
            DhtMessage::Successor { node } => Ok(self.learn(node)),
            other => Err(self.unexpected(other)),
        }
    }

    async fn predecessor(&self) -> Result<NodeInfo> {
        match self.call(DhtMessage::GetPredecessor).await? {
            DhtMessage::Predecessor { node } => Ok(self.learn(node)),
            other => Err(self.unexpected(other)),
        }
    }

    async fn set_predecessor(&self, node: NodeInfo) -> Result<()> {
        match self.call(DhtMessage::SetPredecessor { node }).await? {
            DhtMessage::Ack => Ok(()),
            other => Err(self.unexpected(other)),
        }
    }

    async fn find_successor(&self, id: NodeId) -> Result<NodeInfo> {
        match self.call(DhtMessage::FindSuccessor { id }).await? {
            DhtMessage::FoundSuccessor { node } => Ok(self.learn(node)),
            other => Err(self.unexpected(other)),
        }
    }

    async fn closest_preceding_finger(&self, id: NodeId) -> Result<NodeInfo> {
        match self.call(DhtMessage::ClosestPrecedingFinger { id }).await? {
            DhtMessage::FoundClosestPrecedingFinger { node } => Ok(self.learn(node)),
            other => Err(self.unexpected(other)),
        }
    }

    async fn notify(&self, node: NodeInfo) -> Result<()> {
        match self.call(DhtMessage::Notify { node }).await? {
            DhtMessage::Ack => Ok(()),
            other => Err(self.unexpected(other)),
        }
    }

    async fn update_fingers(&self, node: NodeInfo, index: usize) -> Result<FingerUpdate> {
        match self.call(DhtMessage::UpdateFingers { node, index }).await? {
            DhtMessage::FingersUpdated { updated, next } => Ok(FingerUpdate {
                updated,
                next: next.map(|next| self.learn(next)),
            }),
            other => Err(self.unexpected(other)),
        }
    }
}
