use crate::binary::NodeBuilder;
use crate::client::Client;
use crate::request::{InfoQuery, InfoQueryType, IqError};
use crate::types::events::{Event, KeepAliveRestored, KeepAliveTimeout};
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use rand::Rng;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;
use tokio::sync::watch;

enum PingOutcome {
    Pong,
    Failed,
    ConnectionGone,
}

impl Client {
    fn next_keepalive_interval(&self) -> Duration {
        let min = self.config.keepalive_interval_min.as_millis() as u64;
        let max = self.config.keepalive_interval_max.as_millis() as u64;
        let (low, high) = if min <= max { (min, max) } else { (max, min) };
        Duration::from_millis(rand::rng().random_range(low..=high))
    }

    async fn send_keepalive(&self) -> PingOutcome {
        debug!(target: "Client/Keepalive", "Sending keepalive ping");

        let mut query = InfoQuery::new(
            "w:p",
            InfoQueryType::Get,
            vec![NodeBuilder::new("ping").build()],
        );
        query.timeout = Some(self.config.keepalive_response_deadline);

        match self.send_iq(query).await {
            Ok(_) => {
                debug!(target: "Client/Keepalive", "Received keepalive pong");
                PingOutcome::Pong
            }
            Err(IqError::NotConnected | IqError::Disconnected) => PingOutcome::ConnectionGone,
            Err(e) => {
                warn!(target: "Client/Keepalive", "Keepalive ping failed: {e}");
                PingOutcome::Failed
            }
        }
    }

    fn failing_for_too_long(&self, last_success: DateTime<Utc>) -> bool {
        (Utc::now() - last_success)
            .to_std()
            .is_ok_and(|elapsed| elapsed > self.config.keepalive_max_fail_time)
    }

    /// Pings the server at random intervals for as long as this connection lives.
    pub(crate) async fn keepalive_loop(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut last_success = Utc::now();
        let mut error_count = 0u32;

        loop {
            tokio::select! {
                biased;
                _ = shutdown.changed() => {
                    debug!(target: "Client/Keepalive", "Shutdown signaled, exiting keepalive loop.");
                    return;
                }
                _ = tokio::time::sleep(self.next_keepalive_interval()) => {}
            }

            match self.send_keepalive().await {
                PingOutcome::Pong => {
                    if error_count > 0 {
                        info!(target: "Client/Keepalive", "Keepalive restored after {error_count} failures");
                        self.dispatch_event(Event::KeepAliveRestored(KeepAliveRestored));
                    }
                    error_count = 0;
                    last_success = Utc::now();
                }
                PingOutcome::ConnectionGone => {
                    debug!(target: "Client/Keepalive", "Not connected, exiting keepalive loop.");
                    return;
                }
                PingOutcome::Failed => {
                    error_count += 1;
                    warn!(target: "Client/Keepalive", "Keepalive timeout, error count: {error_count}");
                    self.dispatch_event(Event::KeepAliveTimeout(KeepAliveTimeout {
                        error_count,
                        last_success,
                    }));

                    if self.enable_auto_reconnect.load(Ordering::SeqCst)
                        && self.failing_for_too_long(last_success)
                    {
                        warn!(
                            target: "Client/Keepalive",
                            "Forcing reconnect due to keepalive failure for over {} seconds",
                            self.config.keepalive_max_fail_time.as_secs()
                        );
                        self.disconnect().await;
                        tokio::spawn(self.clone().auto_reconnect());
                        return;
                    }
                }
            }
        }
    }
}
