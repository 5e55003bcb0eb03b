use crate::binary::jid::SERVER_JID;
use crate::binary::{Jid, Node, NodeBuilder};
use crate::client::{Client, ClientBuilder};
use crate::codec::{JsonNodeCodec, NodeCodec};
use crate::config::ClientConfig;
use crate::socket::{ChannelEvent, SecureChannel, SecureChannelFactory, SocketError};
use crate::store::MemoryStore;
use crate::types::events::Event;
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

const WAIT_LIMIT: Duration = Duration::from_secs(2);
const POLL_INTERVAL: Duration = Duration::from_millis(5);

/// In-process stand-in for an encrypted server connection, speaking JSON nodes.
pub struct MockChannel {
    events: mpsc::Sender<ChannelEvent>,
    connected: AtomicBool,
    sent: Mutex<Vec<Node>>,
    returned: Mutex<HashSet<usize>>,
    stops: Mutex<Vec<bool>>,
}

impl MockChannel {
    fn new() -> (Arc<Self>, mpsc::Receiver<ChannelEvent>) {
        let (events, rx) = mpsc::channel(1024);
        let channel = Arc::new(Self {
            events,
            connected: AtomicBool::new(true),
            sent: Mutex::new(Vec::new()),
            returned: Mutex::new(HashSet::new()),
            stops: Mutex::new(Vec::new()),
        });
        (channel, rx)
    }

    /// Delivers `node` to the client as if the server had sent it.
    pub fn inject(&self, node: &Node) {
        let frame = JsonNodeCodec.encode(node).expect("test node should encode");
        self.inject_raw(frame);
    }

    pub fn inject_raw(&self, frame: Vec<u8>) {
        let _ = self.events.try_send(ChannelEvent::Frame(Bytes::from(frame)));
    }

    /// Simulates the server hanging up.
    pub fn close_remote(&self) {
        self.connected.store(false, Ordering::SeqCst);
        let _ = self.events.try_send(ChannelEvent::Closed { remote: true });
    }

    /// The channel reports itself dead without emitting any event.
    pub fn mark_dead(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }

    /// The `flush_first` flag of every `stop` call, in order.
    pub fn stop_calls(&self) -> Vec<bool> {
        self.stops.lock().unwrap().clone()
    }

    pub fn sent_nodes(&self) -> Vec<Node> {
        self.sent.lock().unwrap().clone()
    }

    /// Waits for the next sent node with `tag` that no earlier call returned.
    pub async fn next_sent(&self, tag: &str, limit: Duration) -> Option<Node> {
        let deadline = tokio::time::Instant::now() + limit;
        loop {
            {
                let sent = self.sent.lock().unwrap();
                let mut returned = self.returned.lock().unwrap();
                let found = sent
                    .iter()
                    .enumerate()
                    .find(|(i, node)| node.tag == tag && !returned.contains(i));
                if let Some((i, node)) = found {
                    returned.insert(i);
                    return Some(node.clone());
                }
            }
            if tokio::time::Instant::now() >= deadline {
                return None;
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    pub async fn wait_for_sent(&self, tag: &str) -> Node {
        match self.next_sent(tag, WAIT_LIMIT).await {
            Some(node) => node,
            None => panic!("no <{tag}> was sent within {WAIT_LIMIT:?}"),
        }
    }
}

#[async_trait]
impl SecureChannel for MockChannel {
    async fn send(&self, frame: &[u8]) -> Result<(), SocketError> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(SocketError::SocketClosed);
        }
        let node = JsonNodeCodec
            .decode(frame)
            .map_err(|e| SocketError::Send(e.into()))?;
        self.sent.lock().unwrap().push(node);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn stop(&self, flush_first: bool) {
        self.stops.lock().unwrap().push(flush_first);
        self.connected.store(false, Ordering::SeqCst);
        let _ = self.events.try_send(ChannelEvent::Closed { remote: false });
    }
}

#[derive(Default)]
pub struct MockChannelFactory {
    channels: Mutex<Vec<Arc<MockChannel>>>,
    attempts: AtomicUsize,
    failures_left: AtomicUsize,
}

impl MockChannelFactory {
    /// Connect attempts so far, failed ones included.
    pub fn connect_count(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn latest(&self) -> Option<Arc<MockChannel>> {
        self.channels.lock().unwrap().last().cloned()
    }

    /// Makes the next `n` connect attempts fail.
    pub fn fail_next(&self, n: usize) {
        self.failures_left.store(n, Ordering::SeqCst);
    }

    /// Waits until `n` attempts were made, then gives the client a moment to settle.
    pub async fn wait_for_connects(&self, n: usize) {
        let deadline = tokio::time::Instant::now() + WAIT_LIMIT;
        while self.connect_count() < n {
            if tokio::time::Instant::now() >= deadline {
                panic!(
                    "expected {n} connect attempts, saw {} within {WAIT_LIMIT:?}",
                    self.connect_count()
                );
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

#[async_trait]
impl SecureChannelFactory for MockChannelFactory {
    async fn connect(
        &self,
    ) -> Result<(Arc<dyn SecureChannel>, mpsc::Receiver<ChannelEvent>), anyhow::Error> {
        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            anyhow::bail!("mock dial refused");
        }

        let (channel, events) = MockChannel::new();
        self.channels.lock().unwrap().push(channel.clone());
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Ok((channel as Arc<dyn SecureChannel>, events))
    }
}

/// The collaborators behind a test client.
pub struct TestHarness {
    pub factory: Arc<MockChannelFactory>,
    pub store: Arc<MemoryStore>,
}

/// Fast reconnects, no keep-alive, short IQ deadline.
pub fn test_config() -> ClientConfig {
    ClientConfig {
        reconnect_backoff_unit: Duration::from_millis(10),
        enable_keepalive: false,
        iq_timeout: Duration::from_secs(2),
        ..ClientConfig::default()
    }
}

fn paired_store() -> MemoryStore {
    MemoryStore::paired(Jid {
        device: 3,
        ..Jid::new("15550009999", SERVER_JID)
    })
}

async fn build_client(
    store: MemoryStore,
    config: ClientConfig,
    customize: impl FnOnce(ClientBuilder) -> ClientBuilder,
) -> (Arc<Client>, TestHarness) {
    let factory = Arc::new(MockChannelFactory::default());
    let store = Arc::new(store);
    let builder = Client::builder(factory.clone(), Arc::new(JsonNodeCodec), store.clone()).config(config);
    let client = customize(builder).build();
    (client, TestHarness { factory, store })
}

/// A client whose store is already paired, so it reconnects on its own.
pub async fn create_test_client() -> (Arc<Client>, TestHarness) {
    build_client(paired_store(), test_config(), |b| b).await
}

pub async fn create_test_client_with(
    config: ClientConfig,
    customize: impl FnOnce(ClientBuilder) -> ClientBuilder,
) -> (Arc<Client>, TestHarness) {
    build_client(paired_store(), config, customize).await
}

pub async fn create_unpaired_test_client() -> (Arc<Client>, TestHarness) {
    build_client(MemoryStore::new(), test_config(), |b| b).await
}

/// Collects every event the client emits.
pub struct EventRecorder {
    id: u32,
    rx: mpsc::UnboundedReceiver<Event>,
}

impl EventRecorder {
    pub fn id(&self) -> u32 {
        self.id
    }

    pub async fn next(&mut self) -> Event {
        match tokio::time::timeout(WAIT_LIMIT, self.rx.recv()).await {
            Ok(Some(event)) => event,
            Ok(None) => panic!("event handler was dropped"),
            Err(_) => panic!("no event within {WAIT_LIMIT:?}"),
        }
    }

    pub fn try_next(&mut self) -> Option<Event> {
        self.rx.try_recv().ok()
    }
}

pub fn event_recorder(client: &Client) -> EventRecorder {
    let (tx, rx) = mpsc::unbounded_channel();
    let id = client.add_event_handler(Arc::new(move |event: &Event| {
        let _ = tx.send(event.clone());
    }));
    EventRecorder { id, rx }
}

/// Plays a cooperative server: answers every IQ the client sends with a result.
/// Pre-key count queries report an empty server.
pub async fn answer_iqs(channel: Arc<MockChannel>) {
    while let Some(request) = channel.next_sent("iq", Duration::from_secs(30)).await {
        let mut attrs = request.attrs();
        let id = attrs.string("id");
        let is_count_query = attrs.string("xmlns") == "encrypt"
            && attrs.string("type") == "get"
            && request.get_optional_child("count").is_some();

        let children = if is_count_query {
            vec![NodeBuilder::new("count").attr("value", "0").build()]
        } else {
            Vec::new()
        };
        channel.inject(
            &NodeBuilder::new("iq")
                .attr("id", id)
                .attr("type", "result")
                .children(children)
                .build(),
        );
    }
}
