//! The boundary between `GameServer` and whatever pub/sub channel relay it
//! is wired to (spec §4.8 `wire_to_relay`, §6 "Channel relay protocol").
//!
//! Unlike the teacher's per-game `BackEndArchitecture` trait — built for a
//! client-hosted authority model, where the relay only forwarded bytes
//! between a designated host and its guests — this server is itself the
//! authority. It needs to *observe* every relayed message (to dispatch it)
//! and *inject* its own (to publish snapshots), so the seam here is a
//! narrower, server-authoritative one: observe, publish, and learn of
//! disconnects.

use serde_json::Value;
use tokio::sync::broadcast;

/// The relay's server-assigned connection identity (spec §4.8) — the only
/// identity the game server trusts. Never constructed from a client-supplied
/// payload field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClientId(pub u64);

/// One message as the relay actually delivered it: who sent it, on which
/// channel, and its decoded JSON payload (still untyped — `dispatch`
/// interprets it as a [`protocol::GameMessage`]).
#[derive(Debug, Clone)]
pub struct RelayObservation {
    pub sender: ClientId,
    pub channel: String,
    pub payload: Value,
}

/// What `GameServer` needs from a concrete relay implementation. A relay
/// (e.g. `relay-server`'s `Hub`) implements this once; `GameServer` never
/// depends on the relay's own connection/transport types.
pub trait ChannelRelay: Send + Sync {
    /// Every message broadcast through the relay, after its normal
    /// subscriber fan-out — a tee, not an interception point. The game
    /// server cannot block or drop a message other subscribers would see.
    fn observe(&self) -> broadcast::Receiver<RelayObservation>;

    /// Injects a message as if `channel`'s subscribers had broadcast it
    /// themselves — used for `SERVER_SNAPSHOT` and `JOIN_ACK` rebroadcasts.
    fn publish(&self, channel: &str, payload: Value);

    /// Fires once per client as its connection is torn down, so the game
    /// server can drop its `client_slots` entry.
    fn on_disconnect(&self) -> broadcast::Receiver<ClientId>;
}
