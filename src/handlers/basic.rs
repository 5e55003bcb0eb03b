use super::traits::StanzaHandler;
use crate::binary::Node;
use crate::client::Client;
use async_trait::async_trait;
use std::sync::Arc;

/// Handler for `<success>` stanzas.
///
/// Processes successful authentication.
#[derive(Default)]
pub struct SuccessHandler;

#[async_trait]
impl StanzaHandler for SuccessHandler {
    fn tag(&self) -> &'static str {
        "success"
    }

    async fn handle(&self, client: Arc<Client>, node: Arc<Node>) -> bool {
        client.handle_success(&node).await;
        true
    }
}

/// Handler for `<failure>` stanzas.
///
/// Processes authentication failures.
#[derive(Default)]
pub struct FailureHandler;

#[async_trait]
impl StanzaHandler for FailureHandler {
    fn tag(&self) -> &'static str {
        "failure"
    }

    async fn handle(&self, client: Arc<Client>, node: Arc<Node>) -> bool {
        client.handle_connect_failure(&node).await;
        true
    }
}

/// Handler for `<stream:error>` stanzas.
///
/// Processes stream-level errors that may require connection reset.
#[derive(Default)]
pub struct StreamErrorHandler;

#[async_trait]
impl StanzaHandler for StreamErrorHandler {
    fn tag(&self) -> &'static str {
        "stream:error"
    }

    async fn handle(&self, client: Arc<Client>, node: Arc<Node>) -> bool {
        client.handle_stream_error(&node).await;
        true
    }
}
