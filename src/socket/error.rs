use thiserror::Error;

#[derive(Debug, Error)]
pub enum SocketError {
    #[error("Socket is closed")]
    SocketClosed,
    #[error("Failed to open secure channel: {0}")]
    Connect(#[source] anyhow::Error),
    #[error("Secure channel handshake failed: {0}")]
    Handshake(String),
    #[error("Send failed: {0}")]
    Send(#[source] anyhow::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SocketError>;
