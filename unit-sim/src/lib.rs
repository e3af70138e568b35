//! Headless per-unit simulation (spec §4.5): the hybrid kinematic/dynamic
//! state machine plus the deterministic physics/collision event services
//! that drive transitions between its states. No networking, no room
//! orchestration — `room-core` owns when these methods get called.

pub mod consts;
pub mod event_service;
pub mod ids;
pub mod snapshot;
pub mod unit;

pub use event_service::{CollisionOutcome, CollisionService, ImpulseResult, PhysicsEventService};
pub use ids::{Slot, UnitId};
pub use snapshot::UnitSnapshot;
pub use unit::{DynamicOutcome, MoveInput, MovementMode, PathState, PhysicsMode, Unit, UnitTuning};
