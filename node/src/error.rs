use chordal_lib::{NodeId, RingError};
use thiserror::Error;

/// What a `NetworkClient` reports when a call cannot complete.
pub type TransportError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Error)]
pub enum ChordError {
    #[error("call to {address} failed: {source}")]
    Transport {
        address: String,
        #[source]
        source: TransportError,
    },

    #[error("unexpected response from {address}: {response}")]
    UnexpectedResponse { address: String, response: String },

    #[error("{address} replied with an error: {message}")]
    Remote { address: String, message: String },

    #[error("not a request: {0}")]
    NotARequest(String),

    #[error("no known address for node {0}")]
    UnknownAddress(NodeId),

    #[error("node already joined or joining")]
    AlreadyJoined,

    #[error("lookup of {key} cannot advance past node {at}")]
    RoutingStalled { key: NodeId, at: NodeId },

    #[error("node id {id} does not fit a {bits}-bit ring")]
    IdOutOfRange { id: NodeId, bits: u32 },

    #[error(transparent)]
    Ring(#[from] RingError),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ChordError>;
