use log::debug;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

use crate::error::Result;
use crate::network_client::NetworkClient;
use crate::node::ChordNode;
use crate::Config;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StabilizerConfig {
    pub stabilize_interval: Duration,
    pub fix_fingers_interval: Duration,
}

impl Default for StabilizerConfig {
    fn default() -> Self {
        Self {
            stabilize_interval: Duration::from_secs(5),
            fix_fingers_interval: Duration::from_secs(5),
        }
    }
}

impl From<&Config> for StabilizerConfig {
    fn from(config: &Config) -> Self {
        Self {
            stabilize_interval: config.stabilize_interval,
            fix_fingers_interval: config.fix_fingers_interval,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Maintenance {
    Stabilize,
    FixFingers,
}

impl Maintenance {
    async fn run<T: NetworkClient>(self, node: &ChordNode<T>) -> Result<()> {
        match self {
            Maintenance::Stabilize => node.stabilize().await,
            Maintenance::FixFingers => {
                let index = node.fix_fingers().await?;
                debug!("[{}] Refreshed finger {}", node.info.address, index);
                Ok(())
            }
        }
    }
}

/// Background maintenance for one node: `stabilize` and `fix_fingers` on
/// independent intervals, both idle until the node has joined.
///
/// Dropping the handle closes the shutdown channel, which also stops the tasks.
#[derive(Debug)]
pub struct Stabilizer {
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl Stabilizer {
    pub fn spawn<T: NetworkClient>(node: ChordNode<T>, config: StabilizerConfig) -> Self {
        let (shutdown, _) = watch::channel(false);
        let tasks = vec![
            tokio::spawn(run_periodically(
                node.clone(),
                Maintenance::Stabilize,
                config.stabilize_interval,
                shutdown.subscribe(),
            )),
            tokio::spawn(run_periodically(
                node,
                Maintenance::FixFingers,
                config.fix_fingers_interval,
                shutdown.subscribe(),
            )),
        ];
        Self { shutdown, tasks }
    }

    pub async fn shutdown(self) {
        self.shutdown.send_replace(true);
        for task in self.tasks {
            if let Err(e) = task.await {
                log::error!("Maintenance task ended abnormally: {}", e);
            }
        }
    }
}

/// Completes once shutdown is requested or the sending side is gone.
pub(crate) async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}

async fn run_periodically<T: NetworkClient>(
    node: ChordNode<T>,
    task: Maintenance,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    tokio::select! {
        joined = node.wait_until_joined() => {
            if !joined {
                return;
            }
        }
        _ = shutdown_requested(&mut shutdown) => return,
    }

    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = shutdown_requested(&mut shutdown) => break,
        }
        let outcome = tokio::select! {
            outcome = task.run(&node) => outcome,
            _ = shutdown_requested(&mut shutdown) => break,
        };
        if let Err(e) = outcome {
            log_error!(node.info.address, "{:?} failed: {}", task, e);
        }
    }
    debug!("[{}] {:?} task stopped", node.info.address, task);
}
