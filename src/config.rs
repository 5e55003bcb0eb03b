use std::time::Duration;

/// Tunables for a [`Client`](crate::client::Client).
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// Capacity of the per-connection handler queue.
    pub handler_queue_size: usize,
    /// Default deadline for [`send_iq`](crate::client::Client::send_iq).
    pub iq_timeout: Duration,
    /// Reconnect attempt `n` waits `n * reconnect_backoff_unit`.
    pub reconnect_backoff_unit: Duration,
    pub enable_auto_reconnect: bool,
    pub enable_keepalive: bool,
    pub keepalive_interval_min: Duration,
    pub keepalive_interval_max: Duration,
    pub keepalive_response_deadline: Duration,
    /// Without a successful ping for this long the connection is dropped.
    pub keepalive_max_fail_time: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            handler_queue_size: 2048,
            iq_timeout: Duration::from_secs(75),
            reconnect_backoff_unit: Duration::from_secs(2),
            enable_auto_reconnect: true,
            enable_keepalive: true,
            keepalive_interval_min: Duration::from_secs(20),
            keepalive_interval_max: Duration::from_secs(30),
            keepalive_response_deadline: Duration::from_secs(20),
            keepalive_max_fail_time: Duration::from_secs(180),
        }
    }
}
