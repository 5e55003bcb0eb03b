use crate::socket::error::Result;
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Something the secure channel tells the client about.
#[derive(Debug, Clone)]
pub enum ChannelEvent {
    /// One decrypted frame, carrying exactly one encoded node.
    Frame(Bytes),
    /// The channel is gone. `remote` is false when the close was requested locally.
    Closed { remote: bool },
}

/// One authenticated, encrypted duplex connection.
///
/// Implementations own the socket, the handshake and the frame cipher. The
/// client never looks below this boundary.
#[async_trait]
pub trait SecureChannel: Send + Sync {
    /// Encrypts and sends one frame.
    async fn send(&self, frame: &[u8]) -> Result<()>;

    fn is_connected(&self) -> bool;

    /// Closes the channel. With `flush_first`, queued outgoing frames are written before closing.
    async fn stop(&self, flush_first: bool);
}

/// Dials the server and performs the handshake.
#[async_trait]
pub trait SecureChannelFactory: Send + Sync {
    /// Returns the channel together with the stream of events it produces.
    ///
    /// The stream must end with `ChannelEvent::Closed` or by being dropped
    /// once the channel is gone.
    async fn connect(
        &self,
    ) -> std::result::Result<(Arc<dyn SecureChannel>, mpsc::Receiver<ChannelEvent>), anyhow::Error>;
}
