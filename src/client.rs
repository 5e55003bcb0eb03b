mod stanzas;

use crate::binary::{BinaryError, Node, NodeBuilder};
use crate::codec::NodeCodec;
use crate::config::ClientConfig;
use crate::events::{EventDispatcher, EventHandler};
use crate::handler_queue::{self, HandlerQueue};
use crate::handlers::basic::{FailureHandler, StreamErrorHandler, SuccessHandler};
use crate::handlers::ib::IbHandler;
use crate::handlers::iq::IqHandler;
use crate::handlers::unimplemented::UnimplementedHandler;
use crate::handlers::{StanzaHandler, StanzaRouter};
use crate::request::{InfoQuery, InfoQueryType, IqError};
use crate::socket::{ChannelEvent, SecureChannel, SecureChannelFactory, SocketError};
use crate::store::CredentialStore;
use crate::types::events::{Disconnected, Event};
use crate::waiters::{ResponseWaiters, WaiterError};

use bytes::Bytes;
use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use rand::RngCore;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use thiserror::Error;
use tokio::sync::{Mutex, mpsc, watch};
use tokio::time::sleep;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("client is not connected")]
    NotConnected,
    #[error("client is already connected")]
    AlreadyConnected,
    #[error("client is not logged in")]
    NotLoggedIn,
    #[error("socket error: {0}")]
    Socket(#[from] SocketError),
    #[error("codec error: {0}")]
    Codec(#[from] BinaryError),
    #[error("request failed: {0}")]
    Iq(#[from] IqError),
    #[error("credential store error: {0}")]
    Store(#[source] anyhow::Error),
}

/// The one live secure channel and the switch that stops its tasks.
struct ActiveConnection {
    channel: Arc<dyn SecureChannel>,
    shutdown: watch::Sender<bool>,
}

impl ActiveConnection {
    async fn retire(self, flush: bool) {
        let _ = self.shutdown.send(true);
        self.channel.stop(flush).await;
    }
}

pub struct Client {
    pub(crate) config: ClientConfig,
    channel_factory: Arc<dyn SecureChannelFactory>,
    codec: Arc<dyn NodeCodec>,
    pub(crate) store: Arc<dyn CredentialStore>,

    connection: Mutex<Option<ActiveConnection>>,
    /// Copy of the slot's channel for lock-free liveness checks.
    live_channel: RwLock<Option<Arc<dyn SecureChannel>>>,
    pub(crate) is_logged_in: AtomicBool,
    pub(crate) expected_disconnect: AtomicBool,
    pub(crate) enable_auto_reconnect: AtomicBool,
    pub(crate) auto_reconnect_errors: AtomicU32,
    pub(crate) last_successful_connect: Mutex<Option<DateTime<Utc>>>,
    /// Bumped on every successful login; detached post-login work bails out when it moves.
    pub(crate) connection_generation: AtomicU64,

    pub(crate) response_waiters: ResponseWaiters,
    pub(crate) unique_id: String,
    pub(crate) id_counter: AtomicU64,

    pub(crate) stanza_router: StanzaRouter,
    event_dispatcher: Arc<EventDispatcher>,
    pub(crate) prekey_upload_lock: Mutex<()>,
}

/// Assembles a [`Client`] together with the stanza handlers of the embedding application.
pub struct ClientBuilder {
    channel_factory: Arc<dyn SecureChannelFactory>,
    codec: Arc<dyn NodeCodec>,
    store: Arc<dyn CredentialStore>,
    config: ClientConfig,
    handlers: Vec<Arc<dyn StanzaHandler>>,
}

impl ClientBuilder {
    pub fn new(
        channel_factory: Arc<dyn SecureChannelFactory>,
        codec: Arc<dyn NodeCodec>,
        store: Arc<dyn CredentialStore>,
    ) -> Self {
        Self {
            channel_factory,
            codec,
            store,
            config: ClientConfig::default(),
            handlers: Vec::new(),
        }
    }

    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    /// Installs a handler for a business tag such as `message` or `receipt`,
    /// replacing the logging placeholder.
    ///
    /// # Panics
    /// `build` panics if two handlers claim the same tag, or if a handler
    /// claims one of `success`, `failure`, `stream:error`, `iq` or `ib`.
    pub fn with_handler(mut self, handler: Arc<dyn StanzaHandler>) -> Self {
        self.handlers.push(handler);
        self
    }

    pub fn build(self) -> Arc<Client> {
        let mut router = StanzaRouter::new();
        for handler in self.handlers {
            router.register(handler);
        }
        router.register(Arc::new(SuccessHandler));
        router.register(Arc::new(FailureHandler));
        router.register(Arc::new(StreamErrorHandler));
        router.register(Arc::new(IqHandler));
        router.register(Arc::new(IbHandler));
        for placeholder in UnimplementedHandler::all() {
            router.register_if_absent(Arc::new(placeholder));
        }

        let mut unique_id_bytes = [0u8; 2];
        rand::rng().fill_bytes(&mut unique_id_bytes);

        Arc::new(Client {
            enable_auto_reconnect: AtomicBool::new(self.config.enable_auto_reconnect),
            config: self.config,
            channel_factory: self.channel_factory,
            codec: self.codec,
            store: self.store,

            connection: Mutex::new(None),
            live_channel: RwLock::new(None),
            is_logged_in: AtomicBool::new(false),
            expected_disconnect: AtomicBool::new(false),
            auto_reconnect_errors: AtomicU32::new(0),
            last_successful_connect: Mutex::new(None),
            connection_generation: AtomicU64::new(0),

            response_waiters: ResponseWaiters::new(),
            unique_id: format!("{}.{}", unique_id_bytes[0], unique_id_bytes[1]),
            id_counter: AtomicU64::new(0),

            stanza_router: router,
            event_dispatcher: Arc::new(EventDispatcher::new()),
            prekey_upload_lock: Mutex::new(()),
        })
    }
}

impl Client {
    pub fn new(
        channel_factory: Arc<dyn SecureChannelFactory>,
        codec: Arc<dyn NodeCodec>,
        store: Arc<dyn CredentialStore>,
        config: ClientConfig,
    ) -> Arc<Self> {
        ClientBuilder::new(channel_factory, codec, store)
            .config(config)
            .build()
    }

    pub fn builder(
        channel_factory: Arc<dyn SecureChannelFactory>,
        codec: Arc<dyn NodeCodec>,
        store: Arc<dyn CredentialStore>,
    ) -> ClientBuilder {
        ClientBuilder::new(channel_factory, codec, store)
    }

    /// Opens the secure channel and starts this connection's tasks.
    ///
    /// Returns once the channel is up; authentication completes later and is
    /// reported through [`Event::Connected`] or a failure event.
    pub async fn connect(self: &Arc<Self>) -> Result<(), ClientError> {
        let mut slot = self.connection.lock().await;
        if let Some(active) = slot.as_ref() {
            if active.channel.is_connected() {
                return Err(ClientError::AlreadyConnected);
            }
            if let Some(stale) = slot.take() {
                debug!(target: "Client", "Retiring dead channel before connecting");
                self.set_live_channel(None);
                stale.retire(false).await;
                self.response_waiters
                    .cancel_all(WaiterError::ConnectionClosed)
                    .await;
            }
        }

        self.expected_disconnect.store(false, Ordering::SeqCst);
        self.is_logged_in.store(false, Ordering::SeqCst);

        let (channel, events) = self
            .channel_factory
            .connect()
            .await
            .map_err(SocketError::Connect)?;

        let (queue, queue_rx) = HandlerQueue::new(self.config.handler_queue_size);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        *slot = Some(ActiveConnection {
            channel: channel.clone(),
            shutdown: shutdown_tx,
        });
        self.set_live_channel(Some(channel.clone()));
        drop(slot);

        info!(target: "Client", "Secure channel established, waiting for authentication");

        tokio::spawn(
            self.clone()
                .read_frames_loop(channel, events, queue, shutdown_rx.clone()),
        );
        tokio::spawn(handler_queue::run_dispatch_loop(
            self.clone(),
            queue_rx,
            shutdown_rx.clone(),
        ));
        if self.config.enable_keepalive {
            tokio::spawn(self.clone().keepalive_loop(shutdown_rx));
        }
        Ok(())
    }

    /// Closes the current connection, if any, without triggering auto-reconnect.
    pub async fn disconnect(&self) {
        {
            let mut slot = self.connection.lock().await;
            let Some(active) = slot.take() else {
                return;
            };
            info!(target: "Client", "Disconnecting client intentionally");
            self.expected_disconnect.store(true, Ordering::SeqCst);
            self.set_live_channel(None);
            active.retire(true).await;
        }
        self.is_logged_in.store(false, Ordering::SeqCst);
        self.response_waiters
            .cancel_all(WaiterError::ConnectionClosed)
            .await;
    }

    async fn read_frames_loop(
        self: Arc<Self>,
        channel: Arc<dyn SecureChannel>,
        mut events: mpsc::Receiver<ChannelEvent>,
        queue: HandlerQueue,
        mut shutdown: watch::Receiver<bool>,
    ) {
        loop {
            tokio::select! {
                biased;
                _ = shutdown.changed() => {
                    debug!(target: "Client", "Shutdown signaled, exiting frame reader");
                    return;
                }
                event = events.recv() => match event {
                    Some(ChannelEvent::Frame(frame)) => self.handle_frame(&queue, &frame).await,
                    Some(ChannelEvent::Closed { remote }) => {
                        self.on_disconnect(&channel, remote).await;
                        return;
                    }
                    None => {
                        self.on_disconnect(&channel, true).await;
                        return;
                    }
                }
            }
        }
    }

    async fn handle_frame(&self, queue: &HandlerQueue, frame: &Bytes) {
        let node = match self.codec.decode(frame) {
            Ok(node) => Arc::new(node),
            Err(e) => {
                warn!(target: "Client/Recv", "Failed to decode node in frame: {e}");
                debug!(target: "Client/Recv", "Errored frame hex: {}", hex::encode(frame));
                return;
            }
        };
        debug!(target: "Client/Recv", "{node}");

        if node.tag == "xmlstreamend" {
            if !self.expected_disconnect.load(Ordering::SeqCst) {
                warn!(target: "Client", "Received stream end frame");
            }
            return;
        }

        let id = node
            .attrs()
            .optional_string("id")
            .map(|id| id.into_owned());
        if let Some(id) = id
            && self.response_waiters.deliver(&id, node.clone()).await
        {
            return;
        }

        if self.stanza_router.has_handler(&node.tag) {
            queue.enqueue(node);
        } else {
            debug!(target: "Client", "Didn't handle node <{}>", node.tag);
        }
    }

    async fn on_disconnect(self: &Arc<Self>, channel: &Arc<dyn SecureChannel>, remote: bool) {
        channel.stop(false).await;
        {
            let mut slot = self.connection.lock().await;
            let is_current = slot
                .as_ref()
                .is_some_and(|active| Arc::ptr_eq(&active.channel, channel));
            if !is_current {
                debug!(target: "Client", "Ignoring close of a retired channel");
                return;
            }
            if let Some(active) = slot.take() {
                let _ = active.shutdown.send(true);
            }
            self.set_live_channel(None);
        }
        self.is_logged_in.store(false, Ordering::SeqCst);
        self.response_waiters
            .cancel_all(WaiterError::ConnectionClosed)
            .await;

        if remote && !self.expected_disconnect.load(Ordering::SeqCst) {
            info!(target: "Client", "Channel closed unexpectedly, emitting Disconnected");
            self.dispatch_event(Event::Disconnected(Disconnected));
            tokio::spawn(self.clone().auto_reconnect());
        } else if remote {
            debug!(target: "Client", "Channel closed by server as expected");
        } else {
            debug!(target: "Client", "Channel closed after local disconnect");
        }
    }

    /// Reconnects with a linearly growing delay until a connection is up.
    ///
    /// The delay has no ceiling: attempt `n` waits `n * reconnect_backoff_unit`.
    ///
    /// Boxed because `connect` spawns the tasks that spawn this loop again.
    pub(crate) fn auto_reconnect(self: Arc<Self>) -> Pin<Box<dyn Future<Output = ()> + Send>> {
        Box::pin(async move {
            if !self.enable_auto_reconnect.load(Ordering::SeqCst)
                || !self.store.is_registered().await
            {
                return;
            }
            loop {
                if !self.enable_auto_reconnect.load(Ordering::SeqCst) {
                    debug!(target: "Client", "Auto-reconnect was disabled, giving up");
                    return;
                }
                let errors = self.auto_reconnect_errors.fetch_add(1, Ordering::SeqCst) + 1;
                let delay = self.config.reconnect_backoff_unit * errors;
                debug!(target: "Client", "Automatically reconnecting after {delay:?}");
                sleep(delay).await;

                match self.connect().await {
                    Ok(()) => return,
                    Err(ClientError::AlreadyConnected) => {
                        debug!(target: "Client", "Already connected after auto-reconnect sleep");
                        return;
                    }
                    Err(e) => {
                        error!(target: "Client", "Error reconnecting after auto-reconnect sleep: {e}")
                    }
                }
            }
        })
    }

    /// Encodes `node` and sends it on the current channel.
    pub async fn send_node(&self, node: Node) -> Result<(), ClientError> {
        let channel = self
            .connection
            .lock()
            .await
            .as_ref()
            .map(|active| active.channel.clone())
            .ok_or(ClientError::NotConnected)?;

        debug!(target: "Client/Send", "{node}");
        let payload = self.codec.encode(&node)?;
        channel.send(&payload).await?;
        Ok(())
    }

    pub async fn set_passive(&self, passive: bool) -> Result<(), IqError> {
        let tag = if passive { "passive" } else { "active" };
        let query = InfoQuery::new("passive", InfoQueryType::Set, vec![NodeBuilder::new(tag).build()]);
        self.send_iq(query).await.map(|_| ())
    }

    /// Unlinks this device from the account and wipes the credential store.
    pub async fn logout(&self) -> Result<(), ClientError> {
        let Some(own_jid) = self.store.jid().await else {
            return Err(ClientError::NotLoggedIn);
        };

        let remove = NodeBuilder::new("remove-companion-device")
            .attr("jid", own_jid)
            .attr("reason", "user_initiated")
            .build();
        self.send_iq(InfoQuery::new("md", InfoQueryType::Set, vec![remove]))
            .await?;

        self.disconnect().await;
        self.store.delete().await.map_err(ClientError::Store)
    }

    /// Emits `event` to the registered handlers on a detached task.
    pub fn dispatch_event(&self, event: Event) {
        let dispatcher = self.event_dispatcher.clone();
        tokio::spawn(async move {
            dispatcher.dispatch(&event);
        });
    }

    /// Registers a handler for every event this client emits. Returns its id.
    pub fn add_event_handler(&self, handler: Arc<dyn EventHandler>) -> u32 {
        self.event_dispatcher.add(handler)
    }

    /// See [`EventDispatcher::remove`].
    pub fn remove_event_handler(&self, id: u32) -> bool {
        self.event_dispatcher.remove(id)
    }

    pub fn remove_event_handlers(&self) -> usize {
        self.event_dispatcher.remove_all()
    }

    /// True while a channel is installed and reports itself alive.
    pub fn is_connected(&self) -> bool {
        self.live_channel
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|channel| channel.is_connected())
    }

    fn set_live_channel(&self, channel: Option<Arc<dyn SecureChannel>>) {
        *self
            .live_channel
            .write()
            .unwrap_or_else(PoisonError::into_inner) = channel;
    }

    pub fn is_logged_in(&self) -> bool {
        self.is_logged_in.load(Ordering::SeqCst)
    }

    pub fn set_auto_reconnect(&self, enabled: bool) {
        self.enable_auto_reconnect.store(enabled, Ordering::SeqCst);
    }

    /// Consecutive failed reconnect attempts since the last successful login.
    pub fn auto_reconnect_errors(&self) -> u32 {
        self.auto_reconnect_errors.load(Ordering::SeqCst)
    }

    pub async fn last_successful_connect(&self) -> Option<DateTime<Utc>> {
        *self.last_successful_connect.lock().await
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binary::NodeContent;
    use crate::test_utils::{
        TestHarness, create_test_client, create_test_client_with, event_recorder, test_config,
    };
    use crate::types::events::Connected;
    use async_trait::async_trait;
    use std::time::Duration;

    #[tokio::test]
    async fn test_connect_twice_is_rejected() {
        let (client, harness) = create_test_client().await;
        client.connect().await.unwrap();
        assert!(client.is_connected());
        assert!(matches!(
            client.connect().await,
            Err(ClientError::AlreadyConnected)
        ));
        assert_eq!(harness.factory.connect_count(), 1);
    }

    #[tokio::test]
    async fn test_connect_replaces_dead_channel() {
        let (client, harness) = create_test_client().await;
        client.connect().await.unwrap();
        harness.factory.latest().unwrap().mark_dead();

        client.connect().await.unwrap();
        assert_eq!(harness.factory.connect_count(), 2);
        assert!(client.is_connected());
    }

    #[tokio::test]
    async fn test_disconnect_is_idempotent() {
        let (client, harness) = create_test_client().await;
        client.disconnect().await;
        client.connect().await.unwrap();
        client.disconnect().await;
        client.disconnect().await;

        assert!(!client.is_connected());
        let channel = harness.factory.latest().unwrap();
        assert_eq!(channel.stop_calls(), vec![true]);
    }

    #[tokio::test]
    async fn test_disconnect_without_connection_changes_nothing() {
        let (client, _harness) = create_test_client().await;
        let _rx = client.response_waiters.register("pending").await.unwrap();

        client.disconnect().await;
        assert!(!client.expected_disconnect.load(Ordering::SeqCst));
        assert!(client.response_waiters.contains("pending").await);
    }

    #[tokio::test]
    async fn test_silently_dead_channel_is_not_connected() {
        let (client, harness) = create_test_client().await;
        client.connect().await.unwrap();
        assert!(client.is_connected());

        harness.factory.latest().unwrap().mark_dead();
        assert!(!client.is_connected());
    }

    #[tokio::test]
    async fn test_remote_close_stops_the_channel() {
        let (client, harness) = create_test_client().await;
        client.set_auto_reconnect(false);
        client.connect().await.unwrap();
        let channel = harness.factory.latest().unwrap();

        channel.close_remote();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(channel.stop_calls(), vec![false]);
        assert!(!client.is_connected());
    }

    #[tokio::test]
    async fn test_send_node_requires_connection() {
        let (client, _harness) = create_test_client().await;
        let result = client.send_node(NodeBuilder::new("presence").build()).await;
        assert!(matches!(result, Err(ClientError::NotConnected)));
    }

    #[tokio::test]
    async fn test_send_iq_round_trip() {
        let (client, harness) = create_test_client().await;
        client.connect().await.unwrap();
        let channel = harness.factory.latest().unwrap();

        let responder = tokio::spawn(async move {
            let request = channel.wait_for_sent("iq").await;
            let id = request.attrs().string("id");
            channel.inject(
                &NodeBuilder::new("iq")
                    .attr("id", id)
                    .attr("type", "result")
                    .children([NodeBuilder::new("pong").build()])
                    .build(),
            );
        });

        let reply = client
            .send_iq(InfoQuery::new("w:p", InfoQueryType::Get, vec![NodeBuilder::new("ping").build()]))
            .await
            .unwrap();
        assert!(reply.get_optional_child("pong").is_some());
        responder.await.unwrap();
        assert!(client.response_waiters.is_empty().await);
    }

    #[tokio::test]
    async fn test_send_iq_times_out_and_cleans_up() {
        let (client, _harness) = create_test_client().await;
        client.connect().await.unwrap();

        let mut query = InfoQuery::new("w:p", InfoQueryType::Get, vec![]);
        query.timeout = Some(Duration::from_millis(50));
        assert!(matches!(client.send_iq(query).await, Err(IqError::Timeout)));
        assert!(client.response_waiters.is_empty().await);
    }

    #[tokio::test]
    async fn test_send_iq_without_connection_leaves_no_waiter() {
        let (client, _harness) = create_test_client().await;
        let query = InfoQuery::new("w:p", InfoQueryType::Get, vec![]);
        assert!(matches!(client.send_iq(query).await, Err(IqError::NotConnected)));
        assert!(client.response_waiters.is_empty().await);
    }

    #[tokio::test]
    async fn test_disconnect_cancels_every_waiter_once() {
        let (client, _harness) = create_test_client().await;
        client.connect().await.unwrap();

        let pending: Vec<_> = (0..3)
            .map(|_| {
                let client = client.clone();
                tokio::spawn(async move {
                    client
                        .send_iq(InfoQuery::new("w:p", InfoQueryType::Get, vec![]))
                        .await
                })
            })
            .collect();
        while client.response_waiters.len().await < 3 {
            tokio::task::yield_now().await;
        }

        client.disconnect().await;
        for task in pending {
            assert!(matches!(task.await.unwrap(), Err(IqError::Disconnected)));
        }

        client.connect().await.unwrap();
        assert!(client.response_waiters.is_empty().await);
    }

    struct RecordingHandler {
        tag: &'static str,
        seen: mpsc::UnboundedSender<Arc<Node>>,
    }

    #[async_trait]
    impl StanzaHandler for RecordingHandler {
        fn tag(&self) -> &'static str {
            self.tag
        }

        async fn handle(&self, _client: Arc<Client>, node: Arc<Node>) -> bool {
            let _ = self.seen.send(node);
            true
        }
    }

    fn recording(tag: &'static str) -> (Arc<RecordingHandler>, mpsc::UnboundedReceiver<Arc<Node>>) {
        let (seen, rx) = mpsc::unbounded_channel();
        (Arc::new(RecordingHandler { tag, seen }), rx)
    }

    async fn client_with_message_handler() -> (
        Arc<Client>,
        TestHarness,
        mpsc::UnboundedReceiver<Arc<Node>>,
    ) {
        let (handler, rx) = recording("message");
        let (client, harness) =
            create_test_client_with(test_config(), |builder| builder.with_handler(handler)).await;
        (client, harness, rx)
    }

    #[tokio::test]
    async fn test_queued_nodes_are_handled_in_arrival_order() {
        let (client, harness, mut seen) = client_with_message_handler().await;
        client.connect().await.unwrap();
        let channel = harness.factory.latest().unwrap();

        for i in 0..50 {
            channel.inject(&NodeBuilder::new("message").attr("id", format!("m{i}")).build());
        }
        for i in 0..50 {
            let node = tokio::time::timeout(Duration::from_secs(2), seen.recv())
                .await
                .unwrap()
                .unwrap();
            assert_eq!(node.attrs().string("id"), format!("m{i}"));
        }
    }

    #[tokio::test]
    async fn test_waiter_match_bypasses_router() {
        let (client, harness, mut seen) = client_with_message_handler().await;
        client.connect().await.unwrap();
        let channel = harness.factory.latest().unwrap();

        let rx = client.response_waiters.register("wanted").await.unwrap();
        channel.inject(&NodeBuilder::new("message").attr("id", "wanted").build());
        channel.inject(&NodeBuilder::new("message").attr("id", "routed").build());

        let delivered = rx.await.unwrap().unwrap();
        assert_eq!(delivered.attrs().string("id"), "wanted");
        let routed = tokio::time::timeout(Duration::from_secs(2), seen.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(routed.attrs().string("id"), "routed");
        assert!(seen.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_undecodable_frame_is_skipped() {
        let (client, harness, mut seen) = client_with_message_handler().await;
        client.connect().await.unwrap();
        let channel = harness.factory.latest().unwrap();

        channel.inject_raw(b"definitely not a node".to_vec());
        channel.inject(&NodeBuilder::new("message").attr("id", "after").build());

        let node = tokio::time::timeout(Duration::from_secs(2), seen.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(node.attrs().string("id"), "after");
        assert!(client.is_connected());
    }

    #[tokio::test]
    async fn test_remote_close_emits_disconnected_and_reconnects() {
        let (client, harness) = create_test_client().await;
        let mut events = event_recorder(&client);
        client.connect().await.unwrap();

        harness.factory.latest().unwrap().close_remote();

        assert!(matches!(events.next().await, Event::Disconnected(_)));
        harness.factory.wait_for_connects(2).await;
        assert!(client.is_connected());
        assert_eq!(client.auto_reconnect_errors(), 1);
    }

    #[tokio::test]
    async fn test_expected_close_stays_quiet() {
        let (client, harness) = create_test_client().await;
        let mut events = event_recorder(&client);
        client.connect().await.unwrap();

        client.expected_disconnect.store(true, Ordering::SeqCst);
        harness.factory.latest().unwrap().close_remote();

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!client.is_connected());
        assert!(events.try_next().is_none());
        assert_eq!(harness.factory.connect_count(), 1);
    }

    #[tokio::test]
    async fn test_unregistered_store_does_not_reconnect() {
        let (client, harness) = crate::test_utils::create_unpaired_test_client().await;
        client.connect().await.unwrap();

        harness.factory.latest().unwrap().close_remote();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(harness.factory.connect_count(), 1);
    }

    #[tokio::test]
    async fn test_reconnect_keeps_trying_after_failures() {
        let (client, harness) = create_test_client().await;
        client.connect().await.unwrap();
        harness.factory.fail_next(2);

        harness.factory.latest().unwrap().close_remote();
        harness.factory.wait_for_connects(4).await;
        assert!(client.is_connected());
        assert_eq!(client.auto_reconnect_errors(), 3);
    }

    #[tokio::test]
    async fn test_disabling_auto_reconnect_stops_the_loop() {
        let (client, harness) = create_test_client().await;
        client.set_auto_reconnect(false);
        client.connect().await.unwrap();

        harness.factory.latest().unwrap().close_remote();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(harness.factory.connect_count(), 1);
    }

    #[tokio::test]
    async fn test_stale_close_is_ignored() {
        let (client, harness) = create_test_client().await;
        client.connect().await.unwrap();
        let first = harness.factory.latest().unwrap();
        first.mark_dead();
        client.connect().await.unwrap();

        first.close_remote();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(client.is_connected());
        assert_eq!(harness.factory.connect_count(), 2);
    }

    #[tokio::test]
    async fn test_logout_requires_pairing() {
        let (client, _harness) = crate::test_utils::create_unpaired_test_client().await;
        assert!(matches!(client.logout().await, Err(ClientError::NotLoggedIn)));
    }

    #[tokio::test]
    async fn test_logout_unlinks_then_wipes_store() {
        let (client, harness) = create_test_client().await;
        client.connect().await.unwrap();
        let channel = harness.factory.latest().unwrap();

        let responder = tokio::spawn(async move {
            let request = channel.wait_for_sent("iq").await;
            assert_eq!(request.attrs().string("xmlns"), "md");
            let remove = request.get_optional_child("remove-companion-device").unwrap();
            assert_eq!(remove.attrs().string("reason"), "user_initiated");
            channel.inject(
                &NodeBuilder::new("iq")
                    .attr("id", request.attrs().string("id"))
                    .attr("type", "result")
                    .build(),
            );
        });

        client.logout().await.unwrap();
        responder.await.unwrap();
        assert!(!client.is_connected());
        assert_eq!(harness.store.deletion_count(), 1);
    }

    #[tokio::test]
    async fn test_set_passive_sends_active_child() {
        let (client, harness) = create_test_client().await;
        client.connect().await.unwrap();
        let channel = harness.factory.latest().unwrap();

        let responder = tokio::spawn(async move {
            let request = channel.wait_for_sent("iq").await;
            assert_eq!(request.attrs().string("xmlns"), "passive");
            assert!(matches!(
                &request.content,
                Some(NodeContent::Nodes(children)) if children[0].tag == "active"
            ));
            channel.inject(
                &NodeBuilder::new("iq")
                    .attr("id", request.attrs().string("id"))
                    .attr("type", "result")
                    .build(),
            );
        });

        client.set_passive(false).await.unwrap();
        responder.await.unwrap();
    }

    #[tokio::test]
    async fn test_events_reach_registered_handlers() {
        let (client, _harness) = create_test_client().await;
        let mut events = event_recorder(&client);
        client.dispatch_event(Event::Connected(Connected));
        assert!(matches!(events.next().await, Event::Connected(_)));

        assert!(client.remove_event_handler(events.id()));
        assert!(!client.remove_event_handler(events.id()));
        assert_eq!(client.remove_event_handlers(), 0);
    }
}
