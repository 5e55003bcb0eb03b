use super::traits::StanzaHandler;
use crate::binary::Node;
use crate::client::Client;
use async_trait::async_trait;
use std::sync::Arc;

/// Handler for `<ib>` (info bulletin) stanzas.
#[derive(Default)]
pub struct IbHandler;

#[async_trait]
impl StanzaHandler for IbHandler {
    fn tag(&self) -> &'static str {
        "ib"
    }

    async fn handle(&self, client: Arc<Client>, node: Arc<Node>) -> bool {
        client.handle_ib(&node);
        true
    }
}
