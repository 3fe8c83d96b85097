use std::process::ExitCode;

use chordal_node::{
    api, client, server, ChordNode, Config, Result, Stabilizer, StabilizerConfig,
    TcpNetworkClient,
};
use log::{error, info};
use tokio::net::TcpListener;
use tokio::sync::watch;

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    let outcome = match config.lookup_key {
        Some(key) => run_lookup(&config, key).await,
        None => run_node(config).await,
    };
    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run_lookup(config: &Config, key: u64) -> Result<()> {
    let address = config.bootstrap_address.as_deref().ok_or_else(|| {
        chordal_node::ChordError::Config("LOOKUP_KEY requires BOOTSTRAP_ADDRESS".to_string())
    })?;
    let transport = TcpNetworkClient::new(config.call_timeout);
    let owner = client::lookup(&transport, address, key).await?;
    println!(
        "The key {} is handled by node {} at {}",
        key, owner.id, owner.address
    );
    Ok(())
}

async fn run_node(config: Config) -> Result<()> {
    let node = ChordNode::from_config(&config)?;
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let listener = TcpListener::bind(&config.p2p_address).await?;
    let server = tokio::spawn(server::serve(node.clone(), listener, shutdown_rx.clone()));

    let api_task = match &config.api_address {
        Some(address) => {
            let listener = TcpListener::bind(address).await?;
            Some(tokio::spawn(api::run(
                node.clone(),
                listener,
                shutdown_rx.clone(),
            )))
        }
        None => None,
    };

    let stabilizer = Stabilizer::spawn(node.clone(), StabilizerConfig::from(&config));

    let transport = TcpNetworkClient::new(config.call_timeout);
    let joined = match config.bootstrap_node(&transport, &node.ring()).await {
        Ok(bootstrap) => node.join(bootstrap).await.map(|_| ()),
        Err(e) => Err(e),
    };
    if let Err(e) = joined {
        stabilizer.shutdown().await;
        shutdown_tx.send_replace(true);
        return Err(e);
    }

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for Ctrl-C: {}", e);
    }
    info!("Shutting down node {}", node.id());

    stabilizer.shutdown().await;
    shutdown_tx.send_replace(true);
    if let Ok(Err(e)) = server.await {
        error!("Server stopped with error: {}", e);
    }
    if let Some(task) = api_task {
        if let Ok(Err(e)) = task.await {
            error!("API stopped with error: {}", e);
        }
    }
    Ok(())
}
