//! Database module for PostgreSQL persistence.

mod documents;
mod pool;
mod stores;

pub use documents::*;
pub use pool::*;
pub use stores::*;
