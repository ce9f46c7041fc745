//! Live connection to the streaming state feed.
//!
//! Owns the connection state machine, scoped channel subscriptions, and the
//! inbound batching layer. Inbound messages are queued and flushed on a
//! debounce window instead of being processed one by one; within a flush,
//! `driver-location` messages collapse to the latest per driver.
//!
//! The channel is sans-IO: the host feeds it socket events and the current
//! clock, and polls it for due work (reconnect attempts, batch flushes).

use std::collections::{BTreeSet, HashMap};

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::model::StreamMessage;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("socket open failed: {0}")]
    Open(String),
    #[error("socket send failed: {0}")]
    Send(String),
}

/// The raw socket this channel drives. Implemented over a real websocket in
/// the host; tests use an in-memory fake.
pub trait SocketTransport {
    /// Begin opening a connection. Completion arrives later via
    /// [`RealtimeSyncChannel::handle_open`].
    fn open(&mut self) -> Result<(), TransportError>;

    fn send(&mut self, text: &str) -> Result<(), TransportError>;

    fn close(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

/// Work surfaced to the consumer by [`RealtimeSyncChannel::poll`].
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    /// A flushed, deduplicated batch in delivery order.
    Batch(Vec<StreamMessage>),
    /// Reconnect attempts are exhausted; the channel stays down until an
    /// explicit `connect`.
    Offline,
}

#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Base reconnect delay; attempt N waits N times this.
    pub reconnect_delay_ms: i64,
    pub max_reconnect_attempts: u32,
    /// Inbound batch debounce window.
    pub batch_window_ms: i64,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            reconnect_delay_ms: 1000,
            max_reconnect_attempts: 5,
            batch_window_ms: 100,
        }
    }
}

pub struct RealtimeSyncChannel<T: SocketTransport> {
    transport: T,
    options: SyncOptions,
    state: ConnectionState,
    subscriptions: BTreeSet<String>,
    reconnect_attempt: u32,
    reconnect_due_ms: Option<i64>,
    pending: Vec<StreamMessage>,
    flush_due_ms: Option<i64>,
    offline_pending: bool,
    torn_down: bool,
}

impl<T: SocketTransport> RealtimeSyncChannel<T> {
    pub fn new(transport: T, options: SyncOptions) -> Self {
        Self {
            transport,
            options,
            state: ConnectionState::Disconnected,
            subscriptions: BTreeSet::new(),
            reconnect_attempt: 0,
            reconnect_due_ms: None,
            pending: Vec::new(),
            flush_due_ms: None,
            offline_pending: false,
            torn_down: false,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    /// Starts a fresh connection, resetting any exhausted-backoff state.
    pub fn connect(&mut self) -> Result<(), TransportError> {
        self.torn_down = false;
        self.reconnect_attempt = 0;
        self.reconnect_due_ms = None;
        self.state = ConnectionState::Connecting;
        self.transport.open()
    }

    /// Registers interest in a logical channel ("routes", "drivers").
    ///
    /// Idempotent; subscriptions survive reconnects and are replayed on
    /// every successful open.
    pub fn subscribe(&mut self, channel: &str) {
        if self.subscriptions.insert(channel.to_string()) && self.is_connected() {
            self.send_subscribe(channel);
        }
    }

    pub fn unsubscribe(&mut self, channel: &str) {
        if self.subscriptions.remove(channel) && self.is_connected() {
            let frame = format!(r#"{{"action":"unsubscribe","channel":"{}"}}"#, channel);
            if let Err(err) = self.transport.send(&frame) {
                warn!(channel, %err, "unsubscribe frame dropped");
            }
        }
    }

    pub fn send(&mut self, text: &str) -> Result<(), TransportError> {
        self.transport.send(text)
    }

    /// Socket open completion from the host.
    pub fn handle_open(&mut self, _now_ms: i64) {
        info!(attempt = self.reconnect_attempt, "stream connected");
        self.state = ConnectionState::Connected;
        self.reconnect_attempt = 0;
        self.reconnect_due_ms = None;
        let channels: Vec<String> = self.subscriptions.iter().cloned().collect();
        for channel in channels {
            self.send_subscribe(&channel);
        }
    }

    /// Socket close or error from the host. Schedules a linearly backed-off
    /// reconnect until the attempt cap, then goes persistently offline.
    pub fn handle_close(&mut self, now_ms: i64) {
        if self.torn_down {
            return;
        }
        if self.reconnect_attempt >= self.options.max_reconnect_attempts {
            warn!(
                attempts = self.reconnect_attempt,
                "reconnect attempts exhausted, staying offline"
            );
            self.state = ConnectionState::Disconnected;
            self.reconnect_due_ms = None;
            self.offline_pending = true;
            return;
        }
        self.reconnect_attempt += 1;
        let delay = self.options.reconnect_delay_ms * self.reconnect_attempt as i64;
        self.reconnect_due_ms = Some(now_ms + delay);
        self.state = ConnectionState::Reconnecting;
        debug!(
            attempt = self.reconnect_attempt,
            delay_ms = delay,
            "reconnect scheduled"
        );
    }

    /// An inbound frame. Unparseable frames are dropped with a warning; the
    /// rest of the stream is unaffected.
    pub fn handle_raw_message(&mut self, raw: &str, now_ms: i64) {
        match serde_json::from_str::<StreamMessage>(raw) {
            Ok(message) => {
                if self.flush_due_ms.is_none() {
                    self.flush_due_ms = Some(now_ms + self.options.batch_window_ms);
                }
                self.pending.push(message);
            }
            Err(err) => {
                warn!(%err, raw, "dropping unparseable stream message");
            }
        }
    }

    /// Runs due timers: issues a scheduled reconnect attempt, flushes the
    /// batch window, and surfaces the offline signal.
    pub fn poll(&mut self, now_ms: i64) -> Vec<ChannelEvent> {
        let mut events = Vec::new();

        if self.offline_pending {
            self.offline_pending = false;
            events.push(ChannelEvent::Offline);
        }

        if let Some(due) = self.reconnect_due_ms {
            if now_ms >= due && !self.torn_down {
                self.reconnect_due_ms = None;
                self.state = ConnectionState::Connecting;
                if let Err(err) = self.transport.open() {
                    warn!(%err, attempt = self.reconnect_attempt, "reconnect open failed");
                    self.handle_close(now_ms);
                }
            }
        }

        if let Some(due) = self.flush_due_ms {
            if now_ms >= due {
                self.flush_due_ms = None;
                let batch = flush_batch(std::mem::take(&mut self.pending));
                if !batch.is_empty() {
                    events.push(ChannelEvent::Batch(batch));
                }
            }
        }

        events
    }

    /// Explicit teardown: closes the socket and clears all timer state.
    /// After this the channel emits nothing until `connect` is called again.
    pub fn shutdown(&mut self) {
        self.torn_down = true;
        self.state = ConnectionState::Disconnected;
        self.reconnect_due_ms = None;
        self.flush_due_ms = None;
        self.pending.clear();
        self.offline_pending = false;
        self.transport.close();
    }

    /// Next instant at which `poll` has due work, for host timer scheduling.
    pub fn next_deadline_ms(&self) -> Option<i64> {
        match (self.reconnect_due_ms, self.flush_due_ms) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    fn send_subscribe(&mut self, channel: &str) {
        let frame = format!(r#"{{"action":"subscribe","channel":"{}"}}"#, channel);
        if let Err(err) = self.transport.send(&frame) {
            warn!(channel, %err, "subscribe frame dropped");
        }
    }
}

/// Delivery-order flush: route updates and stop statuses in arrival order,
/// then driver locations collapsed to the latest per driver. Per-type order
/// is preserved; cross-type interleaving is not.
fn flush_batch(pending: Vec<StreamMessage>) -> Vec<StreamMessage> {
    let mut structural = Vec::new();
    let mut latest_location: HashMap<String, StreamMessage> = HashMap::new();
    let mut location_order: Vec<String> = Vec::new();

    for message in pending {
        match &message {
            StreamMessage::DriverLocation {
                driver_id,
                timestamp_ms,
                ..
            } => {
                let keep = match latest_location.get(driver_id) {
                    Some(StreamMessage::DriverLocation {
                        timestamp_ms: seen, ..
                    }) => timestamp_ms >= seen,
                    _ => true,
                };
                if keep {
                    if !latest_location.contains_key(driver_id) {
                        location_order.push(driver_id.clone());
                    }
                    latest_location.insert(driver_id.clone(), message);
                } else {
                    debug!(%driver_id, "superseded stale location in batch");
                }
            }
            _ => structural.push(message),
        }
    }

    let mut out = structural;
    for driver_id in location_order {
        if let Some(message) = latest_location.remove(&driver_id) {
            out.push(message);
        }
    }
    out
}
