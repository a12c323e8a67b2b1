//! # Lounge Sync
//!
//! Runtime around [`lounge_engine`]: keeps the store on disk, talks to the
//! remote stores and runs the merge scheduler on tokio.
//!
//! ```rust,no_run
//! use lounge_sync::{AgentBuilder, FilePersistence, MemoryHub, MemoryTransport};
//! use lounge_engine::Mutation;
//!
//! # async fn run() -> lounge_sync::Result<()> {
//! let hub = MemoryHub::new();
//! let agent = AgentBuilder::new(FilePersistence::new("./data"))
//!     .transport(MemoryTransport::realtime(hub))
//!     .spawn()?;
//!
//! agent
//!     .apply(Mutation::AddEmployee {
//!         name: "Aiko".into(),
//!         join_date: "2024-01-01".into(),
//!     })
//!     .await?;
//! agent.shutdown().await?;
//! # Ok(())
//! # }
//! ```

pub mod agent;
pub mod config;
pub mod error;
pub mod persistence;
pub mod transport;

pub use agent::{AgentBuilder, AgentHandle, AgentUpdate, TokioClock};
pub use config::{Config, ConfigError, DocumentConfig};
pub use error::{PersistenceError, Result, SyncError, TransportError};
pub use persistence::{FilePersistence, LocalPersistence, MemoryPersistence};
pub use transport::{
    DocumentTransport, MemoryHub, MemoryTransport, RealtimeTransport, RemoteTransport,
    TransportEvent,
};
