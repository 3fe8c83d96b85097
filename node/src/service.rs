use chordal_lib::DhtMessage;
use log::debug;

use crate::error::{ChordError, Result};
use crate::network_client::NetworkClient;
use crate::node::ChordNode;

impl<T: NetworkClient> ChordNode<T> {
    /// Answers one inbound request. Failures go back to the caller as `DhtMessage::Error`.
    pub async fn handle_message(&self, message: DhtMessage) -> DhtMessage {
        debug!("[{}] Handling {:?}", self.info.address, message);
        match self.dispatch(message).await {
            Ok(response) => response,
            Err(e) => {
                log_error!(self.info.address, "Request failed: {}", e);
                DhtMessage::Error {
                    message: e.to_string(),
                }
            }
        }
    }

    async fn dispatch(&self, message: DhtMessage) -> Result<DhtMessage> {
        let response = match message {
            DhtMessage::Ping => DhtMessage::Pong,
            DhtMessage::GetSuccessor => DhtMessage::Successor {
                node: self.successor()?,
            },
            DhtMessage::GetPredecessor => DhtMessage::Predecessor {
                node: self.predecessor()?,
            },
            DhtMessage::SetPredecessor { node } => {
                self.set_predecessor(node);
                DhtMessage::Ack
            }
            DhtMessage::FindSuccessor { id } => DhtMessage::FoundSuccessor {
                node: self.find_successor(id).await?,
            },
            DhtMessage::ClosestPrecedingFinger { id } => DhtMessage::FoundClosestPrecedingFinger {
                node: self.closest_preceding_finger(id)?,
            },
            DhtMessage::Notify { node } => {
                self.notify(node);
                DhtMessage::Ack
            }
            DhtMessage::UpdateFingers { node, index } => {
                let step = self.apply_finger_update(node, index)?;
                DhtMessage::FingersUpdated {
                    updated: step.updated,
                    next: step.next,
                }
            }
            DhtMessage::GetAddress { id } => DhtMessage::Address {
                id,
                address: self.resolve(id).ok().map(|node| node.address),
            },
            DhtMessage::SetAddress { node } => {
                self.address_book.remember(&node);
                DhtMessage::Ack
            }
            DhtMessage::GetState => DhtMessage::State {
                snapshot: self.snapshot(),
            },
            reply @ (DhtMessage::Pong
            | DhtMessage::Ack
            | DhtMessage::Predecessor { .. }
            | DhtMessage::Successor { .. }
            | DhtMessage::FoundSuccessor { .. }
            | DhtMessage::FoundClosestPrecedingFinger { .. }
            | DhtMessage::FingersUpdated { .. }
            | DhtMessage::Address { .. }
            | DhtMessage::State { .. }
            | DhtMessage::Error { .. }) => {
                return Err(ChordError::NotARequest(format!("{:?}", reply)))
            }
        };
        Ok(response)
    }
}
