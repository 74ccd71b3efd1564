//! SpaceSync Transport Layer
//!
//! Moves messages between clients and the space server:
//! - EventBus: client end, request/reply plus routed server pushes
//! - LocalHub: in-process space server with leader election
//! - Connection: framed duplex channel between the two
//! - Cancellation and bounded retry for requests

pub mod bus;
pub mod cancel;
pub mod connection;
pub mod hub;
pub mod retry;

pub use bus::EventBus;
pub use cancel::CancellationToken;
pub use connection::Connection;
pub use hub::LocalHub;
pub use retry::retry;
