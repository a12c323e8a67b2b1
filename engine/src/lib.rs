//! # Lounge Engine
//!
//! The offline-first sync core of the Rush Lounge back office.
//!
//! This crate holds every business record of the bar (attendance, sales,
//! revenue, expenses, the cash vault, products, courses, staff) and merges
//! concurrently edited copies of that state from several writers.
//!
//! ## Design Principles
//!
//! - **No IO**: the engine never touches files, sockets or the system clock
//! - **Pure merge**: [`reconcile`] borrows both sides and returns a new value
//! - **Explicit scheduling**: timing decisions are a state machine driven by
//!   events, so they can be tested without a runtime
//!
//! ## Core Concepts
//!
//! ### Records and snapshots
//!
//! Every collection holds one typed record (see [`Record`]). Records share
//! the [`Entity`] surface: a numeric [`RecordId`] and an optional ISO-8601
//! `timestamp`. A [`Snapshot`] is the whole store serialized as one unit; it
//! is what gets persisted, pushed and pulled.
//!
//! ### Tombstones
//!
//! Deleting a record writes a [`Tombstone`]. Tombstones are permanent: no
//! merge brings a tombstoned id back, however new the other copy is.
//!
//! ### Merge
//!
//! [`reconcile`] unions tombstones, then resolves every id present on both
//! sides by last-writer-wins on `timestamp`. Scalars take the remote value.
//!
//! ### Scheduling
//!
//! [`SyncScheduler`] turns [`SyncEvent`]s into [`SyncAction`]s. It defers
//! remote merges while the [`ActivityTracker`] reports a field in use and
//! rate-limits them otherwise. Local mutations are never deferred.
//!
//! ## Quick Start
//!
//! ```rust
//! use lounge_engine::{reconcile, Category, Mutation, RecordStore, Snapshot};
//! use serde_json::json;
//!
//! let mut store = RecordStore::new();
//! let now = 1_704_067_200_000;
//!
//! // Local edit
//! let applied = store
//!     .apply(
//!         Mutation::AddAttendance {
//!             employee_name: "Aiko".into(),
//!             date: "2024-01-01T09:00".into(),
//!         },
//!         now,
//!     )
//!     .unwrap();
//! let id = applied.created.unwrap();
//!
//! // A peer deleted the same record
//! let remote = Snapshot::from_value(json!({
//!     "deletedRecords": {
//!         "attendance": [{"id": id, "deletedAt": "2024-01-01T10:00:00.000Z"}]
//!     }
//! }))
//! .unwrap();
//!
//! let merged = reconcile(store.state(), &remote);
//! assert!(!merged.contains(Category::Attendance, id));
//! store.replace(merged);
//! ```

pub mod activity;
pub mod amount;
pub mod category;
pub mod clock;
pub mod error;
pub mod merge;
pub mod mutation;
pub mod record;
pub mod scheduler;
pub mod snapshot;
pub mod store;
pub mod summary;
pub mod tombstone;

// Re-export main types at crate root
pub use activity::{ActivityTracker, FieldEvent, FieldKind};
pub use amount::Amount;
pub use category::Category;
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{Error, Result};
pub use merge::{reconcile, reconcile_with_stats, MergeStats};
pub use mutation::Mutation;
pub use record::{Entity, Record, RecordId};
pub use scheduler::{
    ConnectionStatus, MergePhase, Notice, NoticeLevel, SchedulerConfig, Source, SyncAction,
    SyncEvent, SyncScheduler, TimerKind, TimerToken,
};
pub use snapshot::{Backup, Snapshot};
pub use store::{Applied, DeleteOutcome, RecordStore};
pub use summary::{FinancialSummary, WeekSummary};
pub use tombstone::Tombstone;

/// Milliseconds since the Unix epoch.
pub type Millis = u64;
