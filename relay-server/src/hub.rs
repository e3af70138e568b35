//! In-process channel relay (spec §6 "Channel relay protocol"): the pub/sub
//! broker every websocket connection and `game-server`'s [`ChannelRelay`]
//! wiring share. Plays the same role as the teacher's `AppState` — one
//! `Arc`-shared registry behind a handful of locks, swept by a watchdog
//! rather than torn down and rebuilt.
//!
//! A channel is nothing but a `broadcast::Sender<ChannelEvent>` created
//! lazily on first subscribe or publish. Subscriber fan-out is what
//! `tokio::sync::broadcast` already does; "except sender" is enforced by
//! the forwarder task in `connection.rs` filtering out events whose
//! `sender` is its own client, not by the hub withholding anything.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use game_server::{ChannelRelay, ClientId, RelayObservation};
use serde_json::Value;
use tokio::sync::broadcast;

/// Reserved sender identity for [`Hub::publish`] — never assigned to a real
/// connection, so a forwarder's "skip my own broadcast" check never
/// swallows a server-injected message.
const SERVER_SENTINEL: ClientId = ClientId(u64::MAX);

#[derive(Clone)]
pub(crate) struct ChannelEvent {
    pub(crate) sender: ClientId,
    pub(crate) payload: Value,
}

struct HubInner {
    channels: Mutex<HashMap<String, broadcast::Sender<ChannelEvent>>>,
    observations: broadcast::Sender<RelayObservation>,
    disconnects: broadcast::Sender<ClientId>,
    next_client_id: AtomicU64,
}

#[derive(Clone)]
pub struct Hub {
    inner: Arc<HubInner>,
}

impl Hub {
    pub fn new() -> Hub {
        let (observations, _) = broadcast::channel(protocol::CHANNEL_BUFFER_SIZE);
        let (disconnects, _) = broadcast::channel(protocol::CHANNEL_BUFFER_SIZE);
        Hub {
            inner: Arc::new(HubInner {
                channels: Mutex::new(HashMap::new()),
                observations,
                disconnects,
                next_client_id: AtomicU64::new(0),
            }),
        }
    }

    pub fn next_client_id(&self) -> ClientId {
        ClientId(self.inner.next_client_id.fetch_add(1, Ordering::Relaxed))
    }

    fn channel_sender(&self, channel: &str) -> broadcast::Sender<ChannelEvent> {
        let mut channels = self.inner.channels.lock().unwrap();
        channels
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(protocol::CHANNEL_BUFFER_SIZE).0)
            .clone()
    }

    pub(crate) fn subscribe(&self, channel: &str) -> broadcast::Receiver<ChannelEvent> {
        self.channel_sender(channel).subscribe()
    }

    /// Fans a client-authored `Broadcast` frame out to the channel's other
    /// subscribers and tees it to [`ChannelRelay::observe`] so `game-server`
    /// can interpret it. Callers must already have confirmed `sender` is
    /// subscribed to `channel` — the hub itself does not track who is
    /// subscribed where, only the channels themselves.
    pub(crate) fn broadcast_from_client(&self, sender: ClientId, channel: &str, payload: Value) {
        let tx = self.channel_sender(channel);
        let _ = tx.send(ChannelEvent { sender, payload: payload.clone() });
        let _ = self.inner.observations.send(RelayObservation { sender, channel: channel.to_string(), payload });
    }

    pub(crate) fn disconnect(&self, client: ClientId) {
        let _ = self.inner.disconnects.send(client);
    }

    /// Drops channels with no subscribers left, so an emptied room or a
    /// lobby nobody is watching doesn't pin a `broadcast::Sender` forever.
    /// Mirrors the teacher's `cleanup_dead_rooms` watchdog in shape, not in
    /// mechanism — there is no per-room task here to check `is_closed` on.
    pub fn sweep_empty_channels(&self) -> usize {
        let mut channels = self.inner.channels.lock().unwrap();
        let before = channels.len();
        channels.retain(|_, tx| tx.receiver_count() > 0);
        before - channels.len()
    }

    pub fn channel_count(&self) -> usize {
        self.inner.channels.lock().unwrap().len()
    }

    /// Spec §6 `GET /rooms` parity with the teacher's `/enlist`: every live
    /// channel and how many subscribers it currently has.
    pub fn channel_subscriber_counts(&self) -> Vec<(String, usize)> {
        self.inner
            .channels
            .lock()
            .unwrap()
            .iter()
            .map(|(channel, tx)| (channel.clone(), tx.receiver_count()))
            .collect()
    }
}

impl Default for Hub {
    fn default() -> Self {
        Hub::new()
    }
}

impl ChannelRelay for Hub {
    fn observe(&self) -> broadcast::Receiver<RelayObservation> {
        self.inner.observations.subscribe()
    }

    fn publish(&self, channel: &str, payload: Value) {
        let tx = self.channel_sender(channel);
        let _ = tx.send(ChannelEvent { sender: SERVER_SENTINEL, payload });
    }

    fn on_disconnect(&self) -> broadcast::Receiver<ClientId> {
        self.inner.disconnects.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn broadcast_reaches_other_subscriber_but_not_sender() {
        let hub = Hub::new();
        let sender_id = hub.next_client_id();
        let other_id = hub.next_client_id();

        let mut sender_view = hub.subscribe("asterobia:lobby");
        let mut other_view = hub.subscribe("asterobia:lobby");

        hub.broadcast_from_client(sender_id, "asterobia:lobby", serde_json::json!({"type": "PING"}));

        let received = other_view.recv().await.unwrap();
        assert_eq!(received.sender.0, sender_id.0);

        // The sender's own view still receives the event off the broadcast
        // channel itself — filtering "except sender" is the forwarder
        // task's job, not the hub's.
        let echoed = sender_view.recv().await.unwrap();
        assert_eq!(echoed.sender.0, sender_id.0);
        let _ = other_id;
    }

    #[tokio::test]
    async fn published_server_message_uses_sentinel_sender() {
        let hub = Hub::new();
        let mut view = hub.subscribe("asterobia:session:room-1");
        hub.publish("asterobia:session:room-1", serde_json::json!({"type": "SERVER_SNAPSHOT"}));
        let received = view.recv().await.unwrap();
        assert_eq!(received.sender, SERVER_SENTINEL);
    }

    #[test]
    fn sweep_drops_channels_with_no_subscribers() {
        let hub = Hub::new();
        {
            let _receiver = hub.subscribe("asterobia:lobby");
            hub.channel_sender("asterobia:ghost");
        }
        assert_eq!(hub.channel_count(), 2);
        let dropped = hub.sweep_empty_channels();
        assert_eq!(dropped, 1);
        assert_eq!(hub.channel_count(), 1);
    }
}
