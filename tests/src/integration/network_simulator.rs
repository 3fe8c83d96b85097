use async_trait::async_trait;
use chordal_lib::DhtMessage;
use chordal_node::{NetworkClient, TransportError};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, RwLock};

/// A request routed by the simulator, answered through `respond_to`.
#[derive(Debug)]
pub struct SimulatorMessage {
    pub from: String,
    pub message: DhtMessage,
    pub respond_to: oneshot::Sender<DhtMessage>,
}

#[derive(Default)]
struct DeliveryController {
    /// Addresses that should fail message delivery
    failed_nodes: HashSet<String>,
    latency: Duration,
    /// Drop rate for messages (0.0 to 1.0)
    drop_rate: f64,
}

/// Routes DHT messages between in-process nodes without TCP connections.
#[derive(Clone)]
pub struct NetworkSimulator {
    nodes: Arc<RwLock<HashMap<String, mpsc::UnboundedSender<SimulatorMessage>>>>,
    delivery_controller: Arc<RwLock<DeliveryController>>,
    delivered: Arc<AtomicU64>,
    response_timeout: Duration,
}

impl Default for NetworkSimulator {
    fn default() -> Self {
        Self::new()
    }
}

impl NetworkSimulator {
    pub fn new() -> Self {
        Self {
            nodes: Arc::new(RwLock::new(HashMap::new())),
            delivery_controller: Arc::new(RwLock::new(DeliveryController::default())),
            delivered: Arc::new(AtomicU64::new(0)),
            response_timeout: Duration::from_secs(5),
        }
    }

    pub async fn register_node(
        &self,
        address: String,
        sender: mpsc::UnboundedSender<SimulatorMessage>,
    ) {
        self.nodes.write().await.insert(address, sender);
    }

    /// The address stops resolving; calls to it fail as unknown hosts.
    pub async fn unregister_node(&self, address: &str) {
        self.nodes.write().await.remove(address);
    }

    /// Messages to a failed node are refused as if the host were unreachable.
    pub async fn mark_node_failed(&self, address: &str) {
        self.delivery_controller
            .write()
            .await
            .failed_nodes
            .insert(address.to_string());
    }

    pub async fn mark_node_recovered(&self, address: &str) {
        self.delivery_controller
            .write()
            .await
            .failed_nodes
            .remove(address);
    }

    /// Delay applied to every call before delivery.
    pub async fn set_latency(&self, latency: Duration) {
        self.delivery_controller.write().await.latency = latency;
    }

    /// Set message drop rate (0.0 = no drops, 1.0 = drop all)
    pub async fn set_drop_rate(&self, drop_rate: f64) {
        self.delivery_controller.write().await.drop_rate = drop_rate.clamp(0.0, 1.0);
    }

    pub async fn is_node_registered(&self, address: &str) -> bool {
        self.nodes.read().await.contains_key(address)
    }

    /// Requests answered so far.
    pub fn delivered_requests(&self) -> u64 {
        self.delivered.load(Ordering::SeqCst)
    }

    pub fn create_client(&self, from_address: String) -> SimulatedNetworkClient {
        SimulatedNetworkClient {
            simulator: self.clone(),
            from_address,
        }
    }
}

/// NetworkClient implementation that uses the simulator for message delivery
#[derive(Clone)]
pub struct SimulatedNetworkClient {
    simulator: NetworkSimulator,
    from_address: String,
}

#[async_trait]
impl NetworkClient for SimulatedNetworkClient {
    async fn call_node(
        &self,
        address: &str,
        message: DhtMessage,
    ) -> Result<DhtMessage, TransportError> {
        let latency = {
            let controller = self.simulator.delivery_controller.read().await;
            if controller.failed_nodes.contains(address) {
                return Err(format!("Node {} is marked as failed", address).into());
            }
            if controller.drop_rate > 0.0 && rand::random::<f64>() < controller.drop_rate {
                return Err("Message dropped by simulator".into());
            }
            controller.latency
        };
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        let sender = self
            .simulator
            .nodes
            .read()
            .await
            .get(address)
            .cloned()
            .ok_or_else(|| format!("Node {} not registered", address))?;

        let (respond_to, response) = oneshot::channel();
        sender
            .send(SimulatorMessage {
                from: self.from_address.clone(),
                message,
                respond_to,
            })
            .map_err(|_| format!("Node {} stopped receiving", address))?;

        match tokio::time::timeout(self.simulator.response_timeout, response).await {
            Ok(Ok(reply)) => {
                self.simulator.delivered.fetch_add(1, Ordering::SeqCst);
                Ok(reply)
            }
            Ok(Err(_)) => Err("Response channel closed".into()),
            Err(_) => Err("Request timeout".into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_request_reaches_registered_node() {
        let simulator = NetworkSimulator::new();
        let (tx, mut rx) = mpsc::unbounded_channel::<SimulatorMessage>();
        simulator.register_node("127.0.0.1:8001".to_string(), tx).await;

        tokio::spawn(async move {
            while let Some(request) = rx.recv().await {
                assert_eq!(request.from, "127.0.0.1:8000");
                let _ = request.respond_to.send(DhtMessage::Pong);
            }
        });

        let client = simulator.create_client("127.0.0.1:8000".to_string());
        let response = client.call_node("127.0.0.1:8001", DhtMessage::Ping).await;
        assert_eq!(response.unwrap(), DhtMessage::Pong);
        assert_eq!(simulator.delivered_requests(), 1);
    }

    #[tokio::test]
    async fn test_failed_and_unknown_nodes_are_errors() {
        let simulator = NetworkSimulator::new();
        let (tx, _rx) = mpsc::unbounded_channel::<SimulatorMessage>();
        simulator.register_node("127.0.0.1:8001".to_string(), tx).await;
        simulator.mark_node_failed("127.0.0.1:8001").await;

        let client = simulator.create_client("127.0.0.1:8000".to_string());
        assert!(client
            .call_node("127.0.0.1:8001", DhtMessage::Ping)
            .await
            .is_err());
        assert!(client
            .call_node("127.0.0.1:8002", DhtMessage::Ping)
            .await
            .is_err());

        simulator.set_drop_rate(1.0).await;
        simulator.mark_node_recovered("127.0.0.1:8001").await;
        assert!(client
            .call_node("127.0.0.1:8001", DhtMessage::Ping)
            .await
            .is_err());
    }
}
