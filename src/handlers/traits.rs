use crate::binary::Node;
use crate::client::Client;
use async_trait::async_trait;
use std::sync::Arc;

/// Trait for handling one kind of top-level stanza received from the server.
///
/// Each handler owns a single tag (e.g. "message", "iq", "receipt"). Handlers
/// run one at a time, in arrival order, on the connection's dispatch task.
#[async_trait]
pub trait StanzaHandler: Send + Sync {
    /// Returns the tag this handler is responsible for (e.g. "message", "iq").
    fn tag(&self) -> &'static str;

    /// Asynchronously handle the incoming node.
    ///
    /// Returns `true` if the node was handled. A `false` return is logged as unhandled.
    async fn handle(&self, client: Arc<Client>, node: Arc<Node>) -> bool;
}
