// Shared types for chordal nodes: wire messages and identifier-ring arithmetic.
pub mod dht_messages;
pub mod ring;

pub use dht_messages::{DhtMessage, Finger, NodeId, NodeInfo, NodeSnapshot};
pub use ring::{Ring, RingError, MAX_BITS};
