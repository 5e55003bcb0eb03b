use super::traits::StanzaHandler;
use crate::binary::Node;
use crate::client::Client;
use async_trait::async_trait;
use log::warn;
use std::sync::Arc;

/// Handler for `<iq>` stanzas the server initiates.
///
/// Replies to our own requests never get here; they are handed to the
/// waiting caller before routing.
#[derive(Default)]
pub struct IqHandler;

#[async_trait]
impl StanzaHandler for IqHandler {
    fn tag(&self) -> &'static str {
        "iq"
    }

    async fn handle(&self, client: Arc<Client>, node: Arc<Node>) -> bool {
        if !client.handle_iq(&node).await {
            warn!(target: "Client", "Received unhandled IQ: {node}");
        }
        true
    }
}
