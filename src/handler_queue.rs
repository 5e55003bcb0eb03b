use crate::binary::Node;
use crate::client::Client;
use log::{debug, warn};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};

/// Ordered hand-off from the frame reader to the stanza handlers of one connection.
#[derive(Clone)]
pub(crate) struct HandlerQueue {
    tx: mpsc::Sender<Arc<Node>>,
}

impl HandlerQueue {
    pub(crate) fn new(capacity: usize) -> (Self, mpsc::Receiver<Arc<Node>>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    /// Queues `node` without waiting. When the queue is full the node is
    /// handed to a detached sender instead, which may reorder it.
    pub(crate) fn enqueue(&self, node: Arc<Node>) {
        match self.tx.try_send(node) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(node)) => {
                warn!(
                    target: "Client",
                    "Handler queue is full, message ordering is no longer guaranteed"
                );
                let tx = self.tx.clone();
                tokio::spawn(async move {
                    if tx.send(node).await.is_err() {
                        debug!(target: "Client", "Connection retired before an overflowed node was queued");
                    }
                });
            }
            Err(mpsc::error::TrySendError::Closed(node)) => {
                debug!(target: "Client", "Dropping <{}>: handler queue is closed", node.tag);
            }
        }
    }
}

/// Feeds queued nodes to the stanza router one at a time until the
/// connection shuts down or the queue is closed.
pub(crate) async fn run_dispatch_loop(
    client: Arc<Client>,
    mut rx: mpsc::Receiver<Arc<Node>>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            biased;
            _ = shutdown.changed() => {
                debug!(target: "Client", "Shutdown signaled, exiting handler queue loop");
                return;
            }
            node = rx.recv() => {
                let Some(node) = node else {
                    return;
                };
                let tag = node.tag.clone();
                if !client.stanza_router.dispatch(client.clone(), node).await {
                    warn!(target: "Client", "Handler for <{tag}> did not process the node");
                }
            }
        }
    }
}
