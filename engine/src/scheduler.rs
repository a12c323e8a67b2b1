//! SyncScheduler - decides when remote state is merged and when local state
//! is saved and pushed.
//!
//! The scheduler is a plain state machine. It consumes [`SyncEvent`]s and
//! returns [`SyncAction`]s for the runtime to execute; it never sleeps,
//! spawns or performs IO itself. Timers are requested with
//! [`SyncAction::ArmTimer`] and come back as [`SyncEvent::TimerFired`].
//!
//! # Remote merges
//!
//! Each source has a single pending slot:
//!
//! ```text
//! Idle -> PendingMerge -> Deferred -> (timer) -> PendingMerge -> ...
//!                      \-> Applying -> Idle
//! ```
//!
//! - While the user is editing a watched field the merge is deferred by
//!   [`DEFER_IN_USE_MS`].
//! - If the previous merge was less than [`MIN_MERGE_INTERVAL_MS`] ago it is
//!   deferred by that interval.
//! - Otherwise the merge is applied immediately and the result pushed back
//!   to the source, unless the source already holds the same content.
//!
//! A newer snapshot replaces the pending one and re-arms the timer. Each arm
//! carries a fresh generation, so a superseded timer that still fires is
//! ignored. When a timer fires the latest snapshot and the current in-use
//! state are evaluated again.
//!
//! # Local changes
//!
//! Local mutations bypass deferral entirely: they are applied, persisted
//! and pushed to every online source at once.

use crate::{
    merge, ActivityTracker, Applied, Millis, Mutation, RecordStore, Result, Snapshot,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;

/// Delay applied while a watched field is in use.
pub const DEFER_IN_USE_MS: Millis = 2_000;
/// Minimum spacing between two applied merges.
pub const MIN_MERGE_INTERVAL_MS: Millis = 1_000;
/// Debounce for save requests.
pub const SAVE_DEBOUNCE_MS: Millis = 500;
/// Default polling interval of the document store.
pub const DOCUMENT_POLL_MS: Millis = 30_000;

/// A remote store the agent syncs with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    /// Presence + snapshot store with change subscription.
    Realtime,
    /// Versioned document store, polled.
    Document,
}

impl Source {
    pub const ALL: [Source; 2] = [Source::Realtime, Source::Document];
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::Realtime => f.write_str("realtime"),
            Source::Document => f.write_str("document"),
        }
    }
}

/// Purpose of a timer. At most one timer per kind is live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKind {
    Merge(Source),
    Save,
    Poll,
}

/// Identifies one arming of a timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerToken {
    pub kind: TimerKind,
    pub generation: u64,
}

/// Severity of a user-facing notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    Info,
    Success,
    Warning,
    Error,
}

/// A transient, auto-dismissed message for the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    pub fn new(level: NoticeLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
        }
    }
}

/// Input to the scheduler.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    ApplyLocalMutation(Mutation),
    SaveRequested,
    RemoteSnapshotReceived { source: Source, snapshot: Value },
    /// First read after connecting. `None` means the remote is empty.
    InitialSnapshot {
        source: Source,
        snapshot: Option<Value>,
    },
    TimerFired(TimerToken),
    ConnectionChanged { source: Source, online: bool },
    PresenceChanged { count: usize },
    RestoreBackup(Snapshot),
}

/// Effect requested by the scheduler.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncAction {
    Persist(Snapshot),
    Push { target: Source, snapshot: Snapshot },
    Pull(Source),
    ArmTimer { token: TimerToken, delay_ms: Millis },
    Notice(Notice),
    /// Redraw. `limited` asks for statistics only, leaving forms alone.
    Refresh { limited: bool },
}

/// Where a source's pending merge stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MergePhase {
    Idle,
    Deferred,
}

/// Online flags and presence, for display.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionStatus {
    pub realtime_online: bool,
    pub document_online: bool,
    /// Sessions currently present on the realtime store.
    pub presence: usize,
}

/// Scheduler settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Poll the document store periodically.
    pub poll_document: bool,
    pub poll_interval_ms: Millis,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_document: false,
            poll_interval_ms: DOCUMENT_POLL_MS,
        }
    }
}

#[derive(Debug, Clone)]
struct SourceState {
    online: bool,
    pending: Option<Snapshot>,
    phase: MergePhase,
}

impl Default for SourceState {
    fn default() -> Self {
        Self {
            online: false,
            pending: None,
            phase: MergePhase::Idle,
        }
    }
}

/// The sync state machine.
#[derive(Debug, Clone)]
pub struct SyncScheduler {
    config: SchedulerConfig,
    sources: HashMap<Source, SourceState>,
    timers: HashMap<TimerKind, u64>,
    next_generation: u64,
    last_merge_at: Option<Millis>,
    presence: usize,
    merges_applied: u64,
}

impl SyncScheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        Self {
            config,
            sources: Source::ALL
                .into_iter()
                .map(|s| (s, SourceState::default()))
                .collect(),
            timers: HashMap::new(),
            next_generation: 0,
            last_merge_at: None,
            presence: 0,
            merges_applied: 0,
        }
    }

    /// Actions to run once at startup.
    pub fn start(&mut self) -> Vec<SyncAction> {
        if self.config.poll_document {
            vec![self.arm(TimerKind::Poll, self.config.poll_interval_ms)]
        } else {
            Vec::new()
        }
    }

    pub fn status(&self) -> ConnectionStatus {
        ConnectionStatus {
            realtime_online: self.is_online(Source::Realtime),
            document_online: self.is_online(Source::Document),
            presence: self.presence,
        }
    }

    pub fn is_online(&self, source: Source) -> bool {
        self.sources.get(&source).is_some_and(|s| s.online)
    }

    pub fn phase(&self, source: Source) -> MergePhase {
        self.sources
            .get(&source)
            .map_or(MergePhase::Idle, |s| s.phase)
    }

    /// Snapshot waiting to be merged from `source`, if any.
    pub fn pending(&self, source: Source) -> Option<&Snapshot> {
        self.sources.get(&source).and_then(|s| s.pending.as_ref())
    }

    /// Number of merges applied so far.
    pub fn merges_applied(&self) -> u64 {
        self.merges_applied
    }

    /// Whether `token` is the live arming of its timer.
    pub fn is_current(&self, token: TimerToken) -> bool {
        self.timers.get(&token.kind) == Some(&token.generation)
    }

    /// Feed one event through the state machine.
    pub fn handle(
        &mut self,
        store: &mut RecordStore,
        tracker: &ActivityTracker,
        event: SyncEvent,
        now: Millis,
    ) -> Vec<SyncAction> {
        match event {
            SyncEvent::ApplyLocalMutation(mutation) => {
                match self.apply_local(store, mutation, now) {
                    Ok((_, actions)) => actions,
                    Err(err) => vec![SyncAction::Notice(Notice::new(
                        if err.is_rejection() {
                            NoticeLevel::Warning
                        } else {
                            NoticeLevel::Error
                        },
                        err.to_string(),
                    ))],
                }
            }
            SyncEvent::SaveRequested => vec![self.arm(TimerKind::Save, SAVE_DEBOUNCE_MS)],
            SyncEvent::RemoteSnapshotReceived { source, snapshot } => {
                self.receive(store, tracker, source, snapshot, now)
            }
            SyncEvent::InitialSnapshot { source, snapshot } => {
                self.initial(store, tracker, source, snapshot, now)
            }
            SyncEvent::TimerFired(token) => self.timer_fired(store, tracker, token, now),
            SyncEvent::ConnectionChanged { source, online } => {
                self.connection_changed(source, online)
            }
            SyncEvent::PresenceChanged { count } => {
                self.presence = count;
                Vec::new()
            }
            SyncEvent::RestoreBackup(snapshot) => {
                store.restore(snapshot);
                let mut actions = self.save_and_push(store);
                actions.push(SyncAction::Refresh { limited: false });
                actions.push(SyncAction::Notice(Notice::new(
                    NoticeLevel::Success,
                    "restored from backup",
                )));
                actions
            }
        }
    }

    /// Apply a local mutation, bypassing any deferral.
    ///
    /// Errors are returned before any state changes and produce no actions.
    pub fn apply_local(
        &mut self,
        store: &mut RecordStore,
        mutation: Mutation,
        now: Millis,
    ) -> Result<(Applied, Vec<SyncAction>)> {
        let name = mutation.name();
        let applied = store.apply(mutation, now)?;
        tracing::debug!(mutation = name, changed = applied.changed, "applied local mutation");
        if !applied.changed {
            return Ok((applied, Vec::new()));
        }
        let mut actions = self.save_and_push(store);
        actions.push(SyncAction::Refresh { limited: false });
        Ok((applied, actions))
    }

    fn receive(
        &mut self,
        store: &mut RecordStore,
        tracker: &ActivityTracker,
        source: Source,
        value: Value,
        now: Millis,
    ) -> Vec<SyncAction> {
        let snapshot = match Snapshot::from_value(value) {
            Ok(snapshot) => snapshot,
            Err(err) => {
                tracing::warn!(%source, error = %err, "dropping malformed remote snapshot");
                return vec![SyncAction::Notice(Notice::new(
                    NoticeLevel::Warning,
                    format!("{source} sync skipped: {err}"),
                ))];
            }
        };
        self.source_mut(source).pending = Some(snapshot);
        self.evaluate(store, tracker, source, now)
    }

    fn initial(
        &mut self,
        store: &mut RecordStore,
        tracker: &ActivityTracker,
        source: Source,
        value: Option<Value>,
        now: Millis,
    ) -> Vec<SyncAction> {
        self.source_mut(source).online = true;
        let remote = match value.map(Snapshot::from_value) {
            None => None,
            Some(Ok(snapshot)) if snapshot.is_empty() => None,
            Some(Ok(snapshot)) => Some(snapshot),
            Some(Err(err)) => {
                tracing::warn!(%source, error = %err, "initial remote snapshot is malformed");
                return vec![SyncAction::Notice(Notice::new(
                    NoticeLevel::Warning,
                    format!("{source} sync skipped: {err}"),
                ))];
            }
        };
        match remote {
            Some(snapshot) => {
                tracing::info!(%source, "merging initial remote snapshot");
                self.merge_now(store, tracker, source, snapshot, now)
            }
            None => {
                tracing::info!(%source, "remote is empty, uploading local state");
                vec![SyncAction::Push {
                    target: source,
                    snapshot: store.snapshot(),
                }]
            }
        }
    }

    fn evaluate(
        &mut self,
        store: &mut RecordStore,
        tracker: &ActivityTracker,
        source: Source,
        now: Millis,
    ) -> Vec<SyncAction> {
        if self.pending(source).is_none() {
            self.source_mut(source).phase = MergePhase::Idle;
            return Vec::new();
        }

        let delay = if tracker.is_in_use(now) {
            Some(DEFER_IN_USE_MS)
        } else if self
            .last_merge_at
            .is_some_and(|at| now.saturating_sub(at) < MIN_MERGE_INTERVAL_MS)
        {
            Some(MIN_MERGE_INTERVAL_MS)
        } else {
            None
        };

        if let Some(delay) = delay {
            tracing::debug!(%source, delay_ms = delay, "deferring remote merge");
            self.source_mut(source).phase = MergePhase::Deferred;
            return vec![self.arm(TimerKind::Merge(source), delay)];
        }

        let Some(snapshot) = self.source_mut(source).pending.take() else {
            return Vec::new();
        };
        self.merge_now(store, tracker, source, snapshot, now)
    }

    fn merge_now(
        &mut self,
        store: &mut RecordStore,
        tracker: &ActivityTracker,
        source: Source,
        remote: Snapshot,
        now: Millis,
    ) -> Vec<SyncAction> {
        let merged = merge::reconcile(store.state(), &remote);
        let state = self.source_mut(source);
        state.phase = MergePhase::Idle;
        state.pending = None;
        let online = state.online;
        self.timers.remove(&TimerKind::Merge(source));
        self.last_merge_at = Some(now);
        self.merges_applied += 1;

        let mut actions = Vec::new();
        if merged != *store.state() {
            store.replace(merged.clone());
            actions.push(SyncAction::Persist(merged.clone()));
            actions.push(SyncAction::Refresh {
                limited: tracker.is_in_use(now),
            });
        }
        // Order-insensitive: peers list the same records in different orders.
        if online && !merged.same_content(&remote) {
            actions.push(SyncAction::Push {
                target: source,
                snapshot: merged,
            });
        }
        tracing::debug!(%source, actions = actions.len(), "applied remote merge");
        actions
    }

    fn timer_fired(
        &mut self,
        store: &mut RecordStore,
        tracker: &ActivityTracker,
        token: TimerToken,
        now: Millis,
    ) -> Vec<SyncAction> {
        if !self.is_current(token) {
            tracing::trace!(?token, "ignoring stale timer");
            return Vec::new();
        }
        self.timers.remove(&token.kind);

        match token.kind {
            TimerKind::Merge(source) => self.evaluate(store, tracker, source, now),
            TimerKind::Save => self.save_and_push(store),
            // Pulls while offline too: a successful read brings the source back.
            TimerKind::Poll => vec![
                SyncAction::Pull(Source::Document),
                self.arm(TimerKind::Poll, self.config.poll_interval_ms),
            ],
        }
    }

    fn connection_changed(&mut self, source: Source, online: bool) -> Vec<SyncAction> {
        let state = self.source_mut(source);
        if state.online == online {
            return Vec::new();
        }
        state.online = online;
        tracing::info!(%source, online, "connection changed");
        let (level, message) = if online {
            (NoticeLevel::Success, format!("{source} sync connected"))
        } else {
            (NoticeLevel::Warning, format!("{source} sync offline"))
        };
        vec![SyncAction::Notice(Notice::new(level, message))]
    }

    fn save_and_push(&self, store: &RecordStore) -> Vec<SyncAction> {
        let snapshot = store.snapshot();
        let mut actions = Vec::with_capacity(3);
        for source in Source::ALL {
            if self.is_online(source) {
                actions.push(SyncAction::Push {
                    target: source,
                    snapshot: snapshot.clone(),
                });
            }
        }
        actions.insert(0, SyncAction::Persist(snapshot));
        actions
    }

    fn arm(&mut self, kind: TimerKind, delay_ms: Millis) -> SyncAction {
        self.next_generation += 1;
        let generation = self.next_generation;
        self.timers.insert(kind, generation);
        SyncAction::ArmTimer {
            token: TimerToken { kind, generation },
            delay_ms,
        }
    }

    fn source_mut(&mut self, source: Source) -> &mut SourceState {
        self.sources.entry(source).or_default()
    }
}

impl Default for SyncScheduler {
    fn default() -> Self {
        Self::new(SchedulerConfig::default())
    }
}
