use super::traits::StanzaHandler;
use crate::binary::Node;
use crate::client::Client;
use std::collections::HashMap;
use std::sync::Arc;

/// Central router for dispatching stanzas to their handlers by tag.
pub struct StanzaRouter {
    handlers: HashMap<&'static str, Arc<dyn StanzaHandler>>,
}

impl StanzaRouter {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Register a handler for its tag.
    ///
    /// # Panics
    /// Panics if a handler is already registered for the same tag to prevent
    /// accidental overwrites during initialization.
    pub fn register(&mut self, handler: Arc<dyn StanzaHandler>) {
        let tag = handler.tag();
        if self.handlers.insert(tag, handler).is_some() {
            panic!("Handler for tag '{}' already registered", tag);
        }
    }

    /// Registers `handler` unless its tag is already taken. Returns whether it was added.
    pub fn register_if_absent(&mut self, handler: Arc<dyn StanzaHandler>) -> bool {
        let tag = handler.tag();
        if self.handlers.contains_key(tag) {
            return false;
        }
        self.handlers.insert(tag, handler);
        true
    }

    pub fn has_handler(&self, tag: &str) -> bool {
        self.handlers.contains_key(tag)
    }

    /// Dispatch a node to its handler.
    ///
    /// Returns `false` if no handler is registered for the node's tag or the
    /// handler reported that it could not process the node.
    pub async fn dispatch(&self, client: Arc<Client>, node: Arc<Node>) -> bool {
        match self.handlers.get(node.tag.as_str()) {
            Some(handler) => handler.handle(client, node).await,
            None => false,
        }
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }
}

impl Default for StanzaRouter {
    fn default() -> Self {
        Self::new()
    }
}
