use chordal_lib::DhtMessage;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;

use crate::error::Result;
use crate::network_client::{read_bounded, NetworkClient, MAX_MESSAGE_BYTES};
use crate::node::ChordNode;
use crate::stabilizer::shutdown_requested;

/// Accept loop for the peer protocol. One task per connection, one request per connection.
pub async fn serve<T: NetworkClient>(
    node: ChordNode<T>,
    listener: TcpListener,
    mut shutdown: watch::Receiver<bool>,
) -> Result<()> {
    log_info!(
        node.info.address,
        "Chord node {} listening on {}",
        node.id(),
        listener.local_addr()?
    );

    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((socket, _)) => {
                    let node = node.clone();
                    tokio::spawn(async move {
                        node.handle_connection(socket).await;
                    });
                }
                Err(e) => {
                    log_error!(node.info.address, "Failed to accept connection: {}", e);
                }
            },
            _ = shutdown_requested(&mut shutdown) => break,
        }
    }

    log_info!(node.info.address, "Stopped accepting connections");
    Ok(())
}

impl<T: NetworkClient> ChordNode<T> {
    async fn handle_connection(&self, mut socket: TcpStream) {
        let request = match read_bounded(&mut socket).await {
            Ok(request) => request,
            Err(e) => {
                log_error!(self.info.address, "Failed to read from socket: {}", e);
                return;
            }
        };

        let response = match request {
            Some(buffer) => match bincode::deserialize::<DhtMessage>(&buffer) {
                Ok(message) => self.handle_message(message).await,
                Err(e) => {
                    log_error!(self.info.address, "Failed to deserialize message: {}", e);
                    DhtMessage::Error {
                        message: format!("malformed request: {}", e),
                    }
                }
            },
            None => {
                log_error!(
                    self.info.address,
                    "Dropping request larger than {} bytes",
                    MAX_MESSAGE_BYTES
                );
                DhtMessage::Error {
                    message: format!("request exceeds {} bytes", MAX_MESSAGE_BYTES),
                }
            }
        };

        let encoded = match bincode::serialize(&response) {
            Ok(encoded) => encoded,
            Err(e) => {
                log_error!(self.info.address, "Failed to serialize response: {}", e);
                return;
            }
        };
        if let Err(e) = socket.write_all(&encoded).await {
            log_error!(self.info.address, "Failed to write response to socket: {}", e);
            return;
        }
        if let Err(e) = socket.shutdown().await {
            log_error!(self.info.address, "Failed to close connection: {}", e);
        }
    }
}
