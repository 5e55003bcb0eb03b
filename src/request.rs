use crate::binary::{BinaryError, Jid, Node, NodeBuilder, NodeContent};
use crate::client::{Client, ClientError};
use crate::socket::SocketError;
use crate::waiters::WaiterError;
use log::warn;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;
use thiserror::Error;
use tokio::time::timeout;

/// Represents the type of an IQ stanza.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InfoQueryType {
    Set,
    Get,
}

impl InfoQueryType {
    fn as_str(&self) -> &'static str {
        match self {
            InfoQueryType::Set => "set",
            InfoQueryType::Get => "get",
        }
    }
}

/// Defines an IQ request to be sent to the server.
#[derive(Debug, Clone)]
pub struct InfoQuery<'a> {
    pub namespace: &'a str,
    pub query_type: InfoQueryType,
    pub to: Jid,
    pub target: Option<Jid>,
    pub id: Option<String>,
    pub content: Option<NodeContent>,
    /// Overrides [`ClientConfig::iq_timeout`](crate::config::ClientConfig::iq_timeout).
    pub timeout: Option<Duration>,
}

impl<'a> InfoQuery<'a> {
    /// A query to the server JID with the given children.
    pub fn new(namespace: &'a str, query_type: InfoQueryType, children: Vec<Node>) -> Self {
        Self {
            namespace,
            query_type,
            to: Jid::server(),
            target: None,
            id: None,
            content: Some(NodeContent::Nodes(children)),
            timeout: None,
        }
    }
}

#[derive(Debug, Error)]
pub enum IqError {
    #[error("IQ request timed out")]
    Timeout,
    #[error("Client is not connected")]
    NotConnected,
    #[error("Socket error: {0}")]
    Socket(#[from] SocketError),
    #[error("Failed to encode request: {0}")]
    Codec(#[from] BinaryError),
    #[error("Request id '{0}' is already awaiting a response")]
    DuplicateId(String),
    #[error("Connection closed while waiting for the response")]
    Disconnected,
    #[error("Received a server error response: code={code}, text='{text}'")]
    ServerError { code: u16, text: String },
}

impl From<ClientError> for IqError {
    fn from(err: ClientError) -> Self {
        match err {
            ClientError::NotConnected => IqError::NotConnected,
            ClientError::Socket(e) => IqError::Socket(e),
            ClientError::Codec(e) => IqError::Codec(e),
            other => IqError::Socket(SocketError::Send(other.into())),
        }
    }
}

impl Client {
    /// Generates a new unique request ID string.
    pub fn generate_request_id(&self) -> String {
        let count = self.id_counter.fetch_add(1, Ordering::Relaxed);
        format!("{}-{}", self.unique_id, count)
    }

    /// Sends an IQ (Info/Query) stanza and asynchronously waits for a response.
    pub async fn send_iq(&self, query: InfoQuery<'_>) -> Result<Arc<Node>, IqError> {
        let req_id = query
            .id
            .clone()
            .unwrap_or_else(|| self.generate_request_id());

        let rx = self
            .response_waiters
            .register(&req_id)
            .await
            .map_err(|e| match e {
                WaiterError::Duplicate(id) => IqError::DuplicateId(id),
                WaiterError::ConnectionClosed => IqError::Disconnected,
            })?;

        let mut builder = NodeBuilder::new("iq")
            .attr("id", req_id.as_str())
            .attr("xmlns", query.namespace)
            .attr("type", query.query_type.as_str())
            .attr("to", query.to);
        if let Some(target) = query.target
            && !target.is_empty()
        {
            builder = builder.attr("target", target);
        }
        let node = builder.apply_content(query.content).build();

        if let Err(e) = self.send_node(node).await {
            self.response_waiters.cancel(&req_id).await;
            return Err(e.into());
        }

        match timeout(query.timeout.unwrap_or(self.config.iq_timeout), rx).await {
            Ok(Ok(Ok(response))) => check_iq_error(response),
            Ok(Ok(Err(_))) | Ok(Err(_)) => Err(IqError::Disconnected),
            Err(_) => {
                self.response_waiters.cancel(&req_id).await;
                Err(IqError::Timeout)
            }
        }
    }
}

fn check_iq_error(response: Arc<Node>) -> Result<Arc<Node>, IqError> {
    let is_error = response
        .attrs
        .get("type")
        .is_some_and(|t| *t == "error");
    if !is_error {
        return Ok(response);
    }

    let Some(error_node) = response.get_optional_child("error") else {
        return Err(IqError::ServerError {
            code: 0,
            text: "Malformed error response".to_string(),
        });
    };
    let mut parser = error_node.attrs();
    let code = parser.optional_u64("code").unwrap_or(0) as u16;
    let text = parser
        .optional_string("text")
        .map(|t| t.into_owned())
        .unwrap_or_default();
    if !parser.ok() {
        warn!(
            target: "Client/IQ",
            "Attribute parsing errors in IQ error response: {:?}",
            parser.errors
        );
    }
    Err(IqError::ServerError { code, text })
}
