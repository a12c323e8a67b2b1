//! WebSocket support for store subscriptions.
//!
//! A client subscribes to one store with a session id. While the socket is
//! open the session counts as present; every snapshot written to the store
//! by another session is pushed to it.

mod manager;
mod protocol;

pub use manager::{ConnectionManager, PresenceEntry};
pub use protocol::*;
