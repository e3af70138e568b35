//! Transport-authenticated identity map, message routing, and relay wiring
//! (spec §4.8): the boundary between a channel relay (like `relay-server`)
//! and the room simulation `room-core` owns. Holds the `rooms: room-id ->
//! Room` registry and the `client_slots: transport-client-id -> {room-id,
//! slot}` mapping that is only ever populated from the relay's
//! server-assigned client id — never from a payload-declared field.

pub mod config;
pub mod dispatch;
pub mod relay;

pub use config::ServerConfig;
pub use dispatch::GameServer;
pub use relay::{ChannelRelay, ClientId, RelayObservation};
