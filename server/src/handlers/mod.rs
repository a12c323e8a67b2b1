//! Request handlers for the realtime store and the document store.

mod documents;
mod stores;
mod websocket;

pub use documents::*;
pub use stores::*;
pub use websocket::*;
