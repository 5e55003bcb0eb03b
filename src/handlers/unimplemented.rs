use super::traits::StanzaHandler;
use crate::binary::Node;
use crate::client::Client;
use crate::types::events::Event;
use async_trait::async_trait;
use log::debug;
use std::sync::Arc;

/// Stand-in for business stanzas this crate does not interpret.
///
/// Decryption and parsing of `<message>`, `<receipt>` and friends belong to
/// the embedding application, which replaces these through
/// [`ClientBuilder::with_handler`](crate::client::ClientBuilder::with_handler).
/// Until then the raw node is logged and, where an event exists for it,
/// forwarded to event handlers as is.
pub struct UnimplementedHandler {
    tag: &'static str,
    forward: Option<fn(Arc<Node>) -> Event>,
}

impl UnimplementedHandler {
    pub fn new(tag: &'static str, forward: Option<fn(Arc<Node>) -> Event>) -> Self {
        Self { tag, forward }
    }

    pub fn for_message() -> Self {
        Self::new("message", Some(Event::Message))
    }

    pub fn for_receipt() -> Self {
        Self::new("receipt", Some(Event::Receipt))
    }

    pub fn for_presence() -> Self {
        Self::new("presence", Some(Event::Presence))
    }

    pub fn for_notification() -> Self {
        Self::new(
            "notification",
            Some(|node: Arc<Node>| {
                let is_group = node
                    .attrs
                    .get("type")
                    .is_some_and(|t| *t == "w:gp2");
                if is_group {
                    Event::GroupInfo(node)
                } else {
                    Event::Notification(node)
                }
            }),
        )
    }

    pub fn for_call() -> Self {
        Self::new("call", None)
    }

    pub fn for_chatstate() -> Self {
        Self::new("chatstate", None)
    }

    /// Placeholders for every business tag, in routing-table order.
    pub fn all() -> Vec<Self> {
        vec![
            Self::for_message(),
            Self::for_receipt(),
            Self::for_call(),
            Self::for_chatstate(),
            Self::for_presence(),
            Self::for_notification(),
        ]
    }
}

#[async_trait]
impl StanzaHandler for UnimplementedHandler {
    fn tag(&self) -> &'static str {
        self.tag
    }

    async fn handle(&self, client: Arc<Client>, node: Arc<Node>) -> bool {
        debug!(target: "Client", "No handler installed for <{}>, passing it through", self.tag);
        if let Some(forward) = self.forward {
            client.dispatch_event(forward(node));
        }
        true
    }
}
