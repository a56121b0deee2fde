//! braid-state
//!
//! The acceptance path of a braid node: the sled-backed vertex store, the
//! validation engine that owns it, and the event fan-out announcing what the
//! engine accepts.

pub mod db;
pub mod engine;
pub mod pubsub;

pub use db::SledStore;
pub use engine::{AcceptOutcome, ValidationEngine};
pub use pubsub::{Event, EventHandler, EventKind, PubSub};
