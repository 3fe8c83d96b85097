//! Outside-the-ring entry points: ask any member who owns a key, or what its routing state is.

use chordal_lib::{DhtMessage, NodeId, NodeInfo, NodeSnapshot, Ring};

use crate::error::{ChordError, Result};
use crate::network_client::{request, NetworkClient};

pub async fn lookup<C: NetworkClient + ?Sized>(
    client: &C,
    address: &str,
    key: NodeId,
) -> Result<NodeInfo> {
    match request(client, address, DhtMessage::FindSuccessor { id: key }).await? {
        DhtMessage::FoundSuccessor { node } => Ok(node),
        other => Err(unexpected(address, other)),
    }
}

pub async fn fetch_state<C: NetworkClient + ?Sized>(
    client: &C,
    address: &str,
) -> Result<NodeSnapshot> {
    match request(client, address, DhtMessage::GetState).await? {
        DhtMessage::State { snapshot } => Ok(snapshot),
        other => Err(unexpected(address, other)),
    }
}

/// Asks the node at `address` for its identifier. Fails when it runs a ring of another width.
pub async fn identify<C: NetworkClient + ?Sized>(
    client: &C,
    address: &str,
    ring: &Ring,
) -> Result<NodeInfo> {
    let snapshot = fetch_state(client, address).await?;
    if snapshot.bits != ring.bits() {
        return Err(ChordError::Config(format!(
            "{} runs a {}-bit ring, this node uses {} bits",
            address,
            snapshot.bits,
            ring.bits()
        )));
    }
    Ok(NodeInfo::new(snapshot.id, address))
}

pub async fn ping<C: NetworkClient + ?Sized>(client: &C, address: &str) -> Result<()> {
    match request(client, address, DhtMessage::Ping).await? {
        DhtMessage::Pong => Ok(()),
        other => Err(unexpected(address, other)),
    }
}

fn unexpected(address: &str, response: DhtMessage) -> ChordError {
    ChordError::UnexpectedResponse {
        address: address.to_string(),
        response: format!("{:?}", response),
    }
}
