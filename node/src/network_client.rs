use async_trait::async_trait;
use chordal_lib::DhtMessage;
use log::{debug, error};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

use crate::error::{ChordError, Result, TransportError};

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NetworkClient: Send + Sync + 'static {
    async fn call_node(
        &self,
        address: &str,
        message: DhtMessage,
    ) -> std::result::Result<DhtMessage, TransportError>;
}

/// Sends `message` and maps transport failures and `Error` replies into `ChordError`.
pub async fn request<T: NetworkClient + ?Sized>(
    client: &T,
    address: &str,
    message: DhtMessage,
) -> Result<DhtMessage> {
    match client.call_node(address, message).await {
        Ok(DhtMessage::Error { message }) => Err(ChordError::Remote {
            address: address.to_string(),
            message,
        }),
        Ok(response) => Ok(response),
        Err(source) => Err(ChordError::Transport {
            address: address.to_string(),
            source,
        }),
    }
}

/// Largest encoded message either end of a connection will buffer.
pub const MAX_MESSAGE_BYTES: u64 = 1 << 20;

/// Reads to EOF, stopping one byte past `MAX_MESSAGE_BYTES`. `None` when the peer sent more.
pub(crate) async fn read_bounded<R: AsyncRead + Unpin>(
    reader: R,
) -> std::io::Result<Option<Vec<u8>>> {
    let mut buffer = Vec::new();
    reader
        .take(MAX_MESSAGE_BYTES + 1)
        .read_to_end(&mut buffer)
        .await?;
    if buffer.len() as u64 > MAX_MESSAGE_BYTES {
        return Ok(None);
    }
    Ok(Some(buffer))
}

/// One TCP connection per call: bincode request, half-close, read the reply to EOF.
///
/// There is no retry. Without a configured timeout a silent peer blocks the
/// caller until the operating system gives up on the connection.
#[derive(Debug, Clone, Default)]
pub struct TcpNetworkClient {
    call_timeout: Option<Duration>,
}

impl TcpNetworkClient {
    pub fn new(call_timeout: Option<Duration>) -> Self {
        Self { call_timeout }
    }

    async fn exchange(
        address: &str,
        message: &DhtMessage,
    ) -> std::result::Result<DhtMessage, TransportError> {
        let mut stream = TcpStream::connect(address).await.map_err(|e| {
            error!("Failed to connect to {}: {}", address, e);
            e
        })?;

        let encoded = bincode::serialize(message)?;
        debug!("Sending message to {}: {:?}", address, message);
        stream.write_all(&encoded).await?;
        stream.shutdown().await?;

        let buffer = read_bounded(&mut stream).await?.ok_or_else(|| {
            format!(
                "response from {} exceeds {} bytes",
                address, MAX_MESSAGE_BYTES
            )
        })?;

        let response = bincode::deserialize(&buffer)?;
        debug!("Received response from {}: {:?}", address, response);
        Ok(response)
    }
}

#[async_trait]
impl NetworkClient for TcpNetworkClient {
    async fn call_node(
        &self,
        address: &str,
        message: DhtMessage,
    ) -> std::result::Result<DhtMessage, TransportError> {
        match self.call_timeout {
            Some(limit) => match timeout(limit, Self::exchange(address, &message)).await {
                Ok(result) => result,
                Err(_) => {
                    error!("Call to {} timed out after {:?}", address, limit);
                    Err(format!("call to {} timed out after {:?}", address, limit).into())
                }
            },
            None => Self::exchange(address, &message).await,
        }
    }
}
