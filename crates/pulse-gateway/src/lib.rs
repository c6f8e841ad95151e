//! WebSocket gateway pushing live conversation and feed snapshots.

pub mod connection;
pub mod subscriptions;
