//! Chord DHT node library.
//!
//! Provides the routing core (`ChordNode`), its TCP service boundary and
//! transport, periodic maintenance, and a small lookup client. Used both by
//! the `chordal_node` binary and by the integration test harness.

macro_rules! log_info {
    ($address:expr, $($arg:tt)*) => ({
        log::info!("[{}] {}", $address, format_args!($($arg)*));
    })
}

macro_rules! log_error {
    ($address:expr, $($arg:tt)*) => ({
        log::error!("[{}] {}", $address, format_args!($($arg)*));
    })
}

pub mod address_book;
pub mod api;
pub mod client;
pub mod error;
pub mod finger_table;
pub mod network_client;
pub mod node;
pub mod peer;
pub mod server;
pub mod service;
pub mod stabilizer;


use std::str::FromStr;
use std::time::Duration;

pub use address_book::AddressBook;
pub use error::{ChordError, Result, TransportError};
pub use finger_table::FingerTable;
pub use network_client::{NetworkClient, TcpNetworkClient, MAX_MESSAGE_BYTES};
pub use node::{derive_node_id, ChordNode, FingerUpdate, JoinOutcome, JoinState};
pub use peer::RingPeer;
pub use stabilizer::{Stabilizer, StabilizerConfig};

pub use chordal_lib::{DhtMessage, NodeId, NodeInfo, NodeSnapshot, Ring};

/// Configuration for a ChordNode
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub p2p_address: String,
    /// HTTP API is only started when this is set.
    pub api_address: Option<String>,
    pub bootstrap_address: Option<String>,
    /// Identifier of the bootstrap peer. Asked from the peer itself when unset.
    pub bootstrap_id: Option<NodeId>,
    pub bits: u32,
    /// Overrides the identifier derived from `p2p_address`.
    pub node_id: Option<NodeId>,
    pub stabilize_interval: Duration,
    pub fix_fingers_interval: Duration,
    pub call_timeout: Option<Duration>,
    /// Run as a one-shot lookup client instead of a ring member.
    pub lookup_key: Option<NodeId>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            p2p_address: "127.0.0.1:8000".to_string(),
            api_address: None,
            bootstrap_address: None,
            bootstrap_id: None,
            bits: 32,
            node_id: None,
            stabilize_interval: Duration::from_secs(5),
            fix_fingers_interval: Duration::from_secs(5),
            call_timeout: None,
            lookup_key: None,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_vars(|name| std::env::var(name).ok())
    }

    /// Builds a config from any variable source; unset variables keep their defaults.
    pub fn from_vars<F>(var: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let millis = |name: &str| -> Result<Option<Duration>> {
            Ok(parse_var::<u64>(&var, name)?.map(Duration::from_millis))
        };

        Ok(Self {
            p2p_address: var("NODE_ADDRESS").unwrap_or(defaults.p2p_address),
            api_address: var("API_ADDRESS"),
            bootstrap_address: var("BOOTSTRAP_ADDRESS"),
            bootstrap_id: parse_var(&var, "BOOTSTRAP_ID")?,
            bits: parse_var(&var, "RING_BITS")?.unwrap_or(defaults.bits),
            node_id: parse_var(&var, "NODE_ID")?,
            stabilize_interval: millis("STABILIZE_INTERVAL_MS")?
                .unwrap_or(defaults.stabilize_interval),
            fix_fingers_interval: millis("FIX_FINGERS_INTERVAL_MS")?
                .unwrap_or(defaults.fix_fingers_interval),
            call_timeout: millis("CALL_TIMEOUT_MS")?,
            lookup_key: parse_var(&var, "LOOKUP_KEY")?,
        })
    }

    pub fn ring(&self) -> Result<Ring> {
        Ok(Ring::new(self.bits)?)
    }

    pub fn node_info(&self, ring: &Ring) -> NodeInfo {
        let id = self
            .node_id
            .unwrap_or_else(|| derive_node_id(&self.p2p_address, ring));
        NodeInfo::new(id, self.p2p_address.clone())
    }

    /// Bootstrap peer, if configured. Without `bootstrap_id` the peer is asked for its identifier.
    pub async fn bootstrap_node<C: NetworkClient + ?Sized>(
        &self,
        client: &C,
        ring: &Ring,
    ) -> Result<Option<NodeInfo>> {
        let Some(address) = self.bootstrap_address.as_deref() else {
            return Ok(None);
        };
        match self.bootstrap_id {
            Some(id) if id < ring.size() => Ok(Some(NodeInfo::new(id, address))),
            Some(id) => Err(ChordError::IdOutOfRange {
                id,
                bits: ring.bits(),
            }),
            None => client::identify(client, address, ring).await.map(Some),
        }
    }
}

fn parse_var<V>(var: &impl Fn(&str) -> Option<String>, name: &str) -> Result<Option<V>>
where
    V: FromStr,
    V::Err: std::fmt::Display,
{
    var(name)
        .map(|raw| {
            raw.trim()
                .parse()
                .map_err(|e| ChordError::Config(format!("{}={:?}: {}", name, raw, e)))
        })
        .transpose()
}

impl ChordNode<TcpNetworkClient> {
    /// Node with the TCP transport, identifier from `NODE_ID` or the address hash.
    pub fn from_config(config: &Config) -> Result<Self> {
        let ring = config.ring()?;
        let info = config.node_info(&ring);
        ChordNode::new(
            info,
            ring,
            std::sync::Arc::new(TcpNetworkClient::new(config.call_timeout)),
        )
    }
}
