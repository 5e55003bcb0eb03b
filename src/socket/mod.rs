pub mod channel;
pub mod error;

pub use channel::{ChannelEvent, SecureChannel, SecureChannelFactory};
pub use error::{Result, SocketError};
