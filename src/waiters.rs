use crate::binary::Node;
use log::{debug, warn};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{Mutex, oneshot};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum WaiterError {
    #[error("a waiter for request id '{0}' is already registered")]
    Duplicate(String),
    #[error("connection closed before a response arrived")]
    ConnectionClosed,
}

pub type WaiterResult = Result<Arc<Node>, WaiterError>;

/// Correlates outgoing requests with the node that answers them.
///
/// Every registered waiter is resolved exactly once: with the reply, with
/// the reason passed to [`cancel_all`](Self::cancel_all), or silently by
/// [`cancel`](Self::cancel) when the caller gave up.
#[derive(Default)]
pub struct ResponseWaiters {
    waiters: Mutex<HashMap<String, oneshot::Sender<WaiterResult>>>,
}

impl ResponseWaiters {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, id: &str) -> Result<oneshot::Receiver<WaiterResult>, WaiterError> {
        let mut waiters = self.waiters.lock().await;
        if waiters.contains_key(id) {
            return Err(WaiterError::Duplicate(id.to_string()));
        }
        let (tx, rx) = oneshot::channel();
        waiters.insert(id.to_string(), tx);
        Ok(rx)
    }

    /// Hands `node` to the waiter registered under `id`.
    ///
    /// Returns false when nobody was waiting, in which case the node should
    /// go through normal routing.
    pub async fn deliver(&self, id: &str, node: Arc<Node>) -> bool {
        let Some(waiter) = self.waiters.lock().await.remove(id) else {
            return false;
        };
        if waiter.send(Ok(node)).is_err() {
            warn!(target: "Client/IQ", "Waiter for {id} went away before its response arrived");
        }
        true
    }

    pub async fn cancel(&self, id: &str) -> bool {
        self.waiters.lock().await.remove(id).is_some()
    }

    /// Resolves every outstanding waiter with `reason`. Returns how many there were.
    pub async fn cancel_all(&self, reason: WaiterError) -> usize {
        let drained: Vec<_> = self.waiters.lock().await.drain().collect();
        let count = drained.len();
        for (_, waiter) in drained {
            let _ = waiter.send(Err(reason.clone()));
        }
        if count > 0 {
            debug!(target: "Client/IQ", "Cancelled {count} pending response waiters: {reason}");
        }
        count
    }

    pub async fn contains(&self, id: &str) -> bool {
        self.waiters.lock().await.contains_key(id)
    }

    pub async fn len(&self) -> usize {
        self.waiters.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
