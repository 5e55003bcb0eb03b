pub mod binary;
pub mod client;
pub mod codec;
pub mod config;
pub mod events;
pub mod failure;
pub mod handlers;
pub mod request;
pub mod socket;
pub mod store;
pub mod types;
pub mod waiters;

// Connection-scoped tasks, reachable only through `Client`
mod handler_queue;
mod keepalive;
pub mod prekeys;

#[cfg(test)]
mod test_utils;

pub use client::{Client, ClientBuilder, ClientError};
pub use codec::{JsonNodeCodec, NodeCodec};
pub use config::ClientConfig;
pub use events::{EventDispatcher, EventHandler};
pub use request::{InfoQuery, InfoQueryType, IqError};
pub use types::events::Event;
