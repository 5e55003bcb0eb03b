use super::Client;
use crate::binary::{Node, NodeBuilder};
use crate::failure::{
    ConnectFailureOutcome, StreamErrorOutcome, classify_connect_failure, classify_stream_error,
};
use crate::types::events::{Connected, Event, QrScannedWithoutMultidevice};
use chrono::Utc;
use log::{debug, error, info, warn};
use std::sync::Arc;
use std::sync::atomic::Ordering;

impl Client {
    pub(crate) async fn handle_success(self: &Arc<Self>, _node: &Node) {
        if self.is_logged_in.swap(true, Ordering::SeqCst) {
            debug!(target: "Client", "Ignoring duplicate <success> stanza");
            return;
        }

        let generation = self.connection_generation.fetch_add(1, Ordering::SeqCst) + 1;
        info!(target: "Client", "Successfully authenticated (gen={generation})");
        *self.last_successful_connect.lock().await = Some(Utc::now());
        self.auto_reconnect_errors.store(0, Ordering::SeqCst);

        let client = self.clone();
        tokio::spawn(async move { client.post_login(generation).await });
    }

    async fn post_login(&self, generation: u64) {
        let client = self;
        macro_rules! check_generation {
            () => {
                if client.connection_generation.load(Ordering::SeqCst) != generation {
                    debug!(target: "Client", "Post-login task cancelled: connection generation changed");
                    return;
                }
            };
        }

        if let Err(e) = client.ensure_pre_keys().await {
            warn!(target: "Client/PreKeys", "Failed to reconcile pre-keys: {e:#}");
        }

        check_generation!();
        if let Err(e) = client.set_passive(false).await {
            warn!(target: "Client", "Failed to send post-connect passive IQ: {e}");
        }

        check_generation!();
        client.dispatch_event(Event::Connected(Connected));
    }

    pub(crate) async fn handle_stream_error(self: &Arc<Self>, node: &Node) {
        self.is_logged_in.store(false, Ordering::SeqCst);

        let outcome = classify_stream_error(node);
        match &outcome {
            StreamErrorOutcome::Reconnect => {
                info!(target: "Client", "Got 515 code, reconnecting...");
                let client = self.clone();
                tokio::spawn(async move {
                    client.disconnect().await;
                    if let Err(e) = client.connect().await {
                        error!(target: "Client", "Failed to reconnect after 515 code: {e}");
                    }
                });
            }
            StreamErrorOutcome::LoggedOut => {
                info!(target: "Client", "Got device removed stream error, sending LoggedOut event and deleting session");
            }
            StreamErrorOutcome::Replaced => {
                info!(target: "Client", "Got replaced stream error, sending StreamReplaced event");
            }
            StreamErrorOutcome::SelfHeal => {
                warn!(target: "Client", "Got 503 stream error, assuming automatic reconnect will handle it");
            }
            StreamErrorOutcome::Unknown { .. } => {
                error!(target: "Client", "Unknown stream error: {node}");
            }
        }

        if outcome.marks_disconnect_expected() {
            self.expected_disconnect.store(true, Ordering::SeqCst);
        }
        if outcome.purges_credentials()
            && let Err(e) = self.store.delete().await
        {
            warn!(target: "Client", "Failed to delete store after device_removed error: {e:#}");
        }
        if let Some(event) = outcome.event() {
            self.dispatch_event(event);
        }
    }

    pub(crate) async fn handle_connect_failure(&self, node: &Node) {
        let outcome = classify_connect_failure(node);
        if outcome.marks_disconnect_expected() {
            self.expected_disconnect.store(true, Ordering::SeqCst);
        }

        match &outcome {
            ConnectFailureOutcome::LoggedOut => {
                info!(target: "Client", "Got 401 connect failure, sending LoggedOut event and deleting session");
            }
            ConnectFailureOutcome::Other { reason, .. } => {
                warn!(target: "Client", "Unknown connect failure ({reason}): {node}");
            }
        }

        if outcome.purges_credentials()
            && let Err(e) = self.store.delete().await
        {
            warn!(target: "Client", "Failed to delete store after 401 failure: {e:#}");
        }
        self.dispatch_event(outcome.event());
    }

    pub(crate) fn handle_ib(&self, node: &Node) {
        match node.children() {
            Some([only]) if only.tag == "downgrade_webclient" => {
                self.dispatch_event(Event::QrScannedWithoutMultidevice(
                    QrScannedWithoutMultidevice,
                ));
            }
            children => {
                for child in children.unwrap_or_default() {
                    debug!(target: "Client", "Unhandled ib child: <{}>", child.tag);
                }
            }
        }
    }

    /// Answers server-initiated IQs this crate understands. Returns false for anything else.
    pub(crate) async fn handle_iq(&self, node: &Node) -> bool {
        let is_get = node.attrs.get("type").is_some_and(|t| *t == "get");
        if !is_get || node.get_optional_child("ping").is_none() {
            return false;
        }

        info!(target: "Client", "Received ping, sending pong.");
        let mut parser = node.attrs();
        let from = parser.optional_jid("from").unwrap_or_else(crate::binary::Jid::server);
        let id = parser.string("id");
        let pong = NodeBuilder::new("iq")
            .attr("to", from)
            .attr("id", id)
            .attr("type", "result")
            .build();
        if let Err(e) = self.send_node(pong).await {
            warn!(target: "Client", "Failed to send pong: {e}");
        }
        true
    }
}
