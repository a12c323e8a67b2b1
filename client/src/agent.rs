//! SyncAgent - the single-writer actor that owns the store.
//!
//! One tokio task owns the [`RecordStore`], the [`SyncScheduler`] and the
//! [`ActivityTracker`]. Everything else talks to it through an
//! [`AgentHandle`], whose requests arrive as commands on one channel, so a
//! local mutation is never interleaved with a merge.
//!
//! The agent turns each command into scheduler events and executes the
//! returned [`SyncAction`]s:
//!
//! - `Persist` writes through [`LocalPersistence`]
//! - `Push` hands the snapshot to the source's push task; a newer snapshot
//!   replaces one still waiting
//! - `Pull` and every transport call run in spawned tasks whose results
//!   re-enter the actor as commands
//! - `ArmTimer` spawns a sleep, aborting the previous one of the same kind
//! - `Notice` and `Refresh` go out on the [`AgentUpdate`] broadcast

use crate::error::{PersistenceError, Result, SyncError};
use crate::persistence::{self, LocalPersistence};
use crate::transport::{RemoteTransport, TransportEvent};
use chrono::NaiveDate;
use lounge_engine::summary::{self, FinancialSummary, WeekSummary};
use lounge_engine::{
    ActivityTracker, Applied, Backup, Clock, ConnectionStatus, FieldEvent, FieldKind, Millis,
    Mutation, Notice, NoticeLevel, RecordStore, SchedulerConfig, Snapshot, Source, SyncAction,
    SyncEvent, SyncScheduler, SystemClock, TimerKind, TimerToken,
};
use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;

const COMMAND_BUFFER: usize = 256;
const UPDATE_BUFFER: usize = 64;
/// Wait before reconnecting a dropped or failed transport.
pub const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Something the UI should react to.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentUpdate {
    Notice(Notice),
    /// Redraw. `limited` asks for statistics only.
    Refresh { limited: bool },
    Status(ConnectionStatus),
}

/// Wall clock that follows tokio's timer, so paused-time tests see time
/// advance consistently with their sleeps.
#[derive(Debug, Clone)]
pub struct TokioClock {
    origin: Millis,
    started: tokio::time::Instant,
}

impl TokioClock {
    pub fn new() -> Self {
        Self::starting_at(SystemClock.now_millis())
    }

    pub fn starting_at(origin: Millis) -> Self {
        Self {
            origin,
            started: tokio::time::Instant::now(),
        }
    }
}

impl Default for TokioClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for TokioClock {
    fn now_millis(&self) -> Millis {
        self.origin + self.started.elapsed().as_millis() as Millis
    }
}

enum Command {
    Mutate {
        mutation: Mutation,
        respond_to: oneshot::Sender<lounge_engine::Result<Applied>>,
    },
    RequestSave,
    Watch {
        field: String,
        kind: FieldKind,
    },
    Field {
        field: String,
        event: FieldEvent,
    },
    SyncNow,
    Snapshot(oneshot::Sender<Snapshot>),
    Status(oneshot::Sender<ConnectionStatus>),
    Summary(oneshot::Sender<FinancialSummary>),
    Week {
        date: NaiveDate,
        respond_to: oneshot::Sender<WeekSummary>,
    },
    ExportBackup {
        path: PathBuf,
        respond_to: oneshot::Sender<std::result::Result<Backup, PersistenceError>>,
    },
    Restore {
        backup: Backup,
        respond_to: oneshot::Sender<()>,
    },
    Shutdown(oneshot::Sender<()>),

    // Internal
    TimerFired(TimerToken),
    Pulled {
        source: Source,
        result: std::result::Result<Option<Value>, String>,
    },
    Pushed {
        source: Source,
        result: std::result::Result<(), String>,
    },
    Remote {
        source: Source,
        event: TransportEvent,
    },
    Disconnected {
        source: Source,
    },
}

/// Cloneable handle to a running agent.
#[derive(Clone)]
pub struct AgentHandle {
    commands: mpsc::Sender<Command>,
    updates: broadcast::Sender<AgentUpdate>,
}

impl AgentHandle {
    /// Apply a local mutation. Rejections come back as [`SyncError::Engine`]
    /// and are also announced as a notice.
    pub async fn apply(&self, mutation: Mutation) -> Result<Applied> {
        let applied = self
            .request(|respond_to| Command::Mutate {
                mutation,
                respond_to,
            })
            .await?;
        Ok(applied?)
    }

    /// Ask for a debounced save and push.
    pub async fn request_save(&self) -> Result<()> {
        self.send(Command::RequestSave).await
    }

    pub async fn watch_field(&self, field: impl Into<String>, kind: FieldKind) -> Result<()> {
        self.send(Command::Watch {
            field: field.into(),
            kind,
        })
        .await
    }

    pub async fn field_event(&self, field: impl Into<String>, event: FieldEvent) -> Result<()> {
        self.send(Command::Field {
            field: field.into(),
            event,
        })
        .await
    }

    /// Pull every source now instead of waiting for the next tick.
    pub async fn sync_now(&self) -> Result<()> {
        self.send(Command::SyncNow).await
    }

    pub async fn snapshot(&self) -> Result<Snapshot> {
        self.request(Command::Snapshot).await
    }

    pub async fn status(&self) -> Result<ConnectionStatus> {
        self.request(Command::Status).await
    }

    pub async fn summary(&self) -> Result<FinancialSummary> {
        self.request(Command::Summary).await
    }

    /// Attendance and bonuses for the week containing `date`.
    pub async fn week(&self, date: NaiveDate) -> Result<WeekSummary> {
        self.request(|respond_to| Command::Week { date, respond_to })
            .await
    }

    /// Write the current state to a backup file.
    pub async fn export_backup(&self, path: impl Into<PathBuf>) -> Result<Backup> {
        let path = path.into();
        let backup = self
            .request(|respond_to| Command::ExportBackup { path, respond_to })
            .await?;
        Ok(backup?)
    }

    /// Replace all state with `backup`. This overwrites, it does not merge.
    pub async fn restore(&self, backup: Backup) -> Result<()> {
        self.request(|respond_to| Command::Restore { backup, respond_to })
            .await
    }

    /// Read a backup file and restore it.
    pub async fn import_backup(&self, path: impl Into<PathBuf>) -> Result<()> {
        let path: PathBuf = path.into();
        let backup = persistence::import_backup(&path)?;
        self.restore(backup).await
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AgentUpdate> {
        self.updates.subscribe()
    }

    /// Stop the agent after a final save.
    pub async fn shutdown(&self) -> Result<()> {
        self.request(Command::Shutdown).await
    }

    async fn send(&self, command: Command) -> Result<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| SyncError::AgentClosed)
    }

    async fn request<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.send(make(tx)).await?;
        rx.await.map_err(|_| SyncError::AgentClosed)
    }
}

/// Configures and starts an agent.
pub struct AgentBuilder {
    persistence: Box<dyn LocalPersistence>,
    transports: Vec<Arc<dyn RemoteTransport>>,
    clock: Option<Arc<dyn Clock>>,
    touch_device: bool,
    poll_interval: Duration,
    reconnect_delay: Duration,
    defaults: Snapshot,
}

impl AgentBuilder {
    pub fn new(persistence: impl LocalPersistence + 'static) -> Self {
        Self {
            persistence: Box::new(persistence),
            transports: Vec::new(),
            clock: None,
            touch_device: false,
            poll_interval: Duration::from_millis(lounge_engine::scheduler::DOCUMENT_POLL_MS),
            reconnect_delay: RECONNECT_DELAY,
            defaults: Snapshot::new(),
        }
    }

    /// Add a remote. One transport per [`Source`]; a later one replaces an
    /// earlier one for the same source.
    pub fn transport(mut self, transport: impl RemoteTransport + 'static) -> Self {
        let source = transport.source();
        self.transports.retain(|t| t.source() != source);
        self.transports.push(Arc::new(transport));
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn touch_device(mut self, touch_device: bool) -> Self {
        self.touch_device = touch_device;
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    /// State used for keys the saved snapshot lacks.
    pub fn defaults(mut self, defaults: Snapshot) -> Self {
        self.defaults = defaults;
        self
    }

    /// Load local state and start the agent on the current runtime.
    ///
    /// Fails when saved state cannot be read, rather than starting empty
    /// and overwriting it on the first save.
    pub fn spawn(self) -> Result<AgentHandle> {
        let state = self.persistence.load(&self.defaults)?;
        tracing::info!(records = state.record_count(), "loaded local state");

        let (commands, inbox) = mpsc::channel(COMMAND_BUFFER);
        let (updates, _) = broadcast::channel(UPDATE_BUFFER);

        let poll_document = self
            .transports
            .iter()
            .any(|t| t.source() == Source::Document);
        let scheduler = SyncScheduler::new(SchedulerConfig {
            poll_document,
            poll_interval_ms: self.poll_interval.as_millis() as Millis,
        });

        let agent = SyncAgent {
            store: RecordStore::from_snapshot(state),
            scheduler,
            tracker: ActivityTracker::new(self.touch_device),
            persistence: self.persistence,
            clock: self
                .clock
                .unwrap_or_else(|| Arc::new(TokioClock::new()) as Arc<dyn Clock>),
            links: HashMap::new(),
            timers: HashMap::new(),
            background: Vec::new(),
            commands: commands.clone(),
            updates: updates.clone(),
        };
        tokio::spawn(agent.run(inbox, self.transports, self.reconnect_delay));

        Ok(AgentHandle { commands, updates })
    }
}

struct Link {
    transport: Arc<dyn RemoteTransport>,
    outbox: watch::Sender<Option<Snapshot>>,
}

struct SyncAgent {
    store: RecordStore,
    scheduler: SyncScheduler,
    tracker: ActivityTracker,
    persistence: Box<dyn LocalPersistence>,
    clock: Arc<dyn Clock>,
    links: HashMap<Source, Link>,
    timers: HashMap<TimerKind, JoinHandle<()>>,
    background: Vec<JoinHandle<()>>,
    commands: mpsc::Sender<Command>,
    updates: broadcast::Sender<AgentUpdate>,
}

impl SyncAgent {
    async fn run(
        mut self,
        mut inbox: mpsc::Receiver<Command>,
        transports: Vec<Arc<dyn RemoteTransport>>,
        reconnect_delay: Duration,
    ) {
        for transport in transports {
            self.connect(transport, reconnect_delay);
        }
        let actions = self.scheduler.start();
        self.execute(actions);

        while let Some(command) = inbox.recv().await {
            let before = self.scheduler.status();
            if let Some(done) = self.dispatch(command) {
                self.stop();
                let _ = done.send(());
                return;
            }
            let after = self.scheduler.status();
            if after != before {
                self.broadcast(AgentUpdate::Status(after));
            }
        }
        self.stop();
    }

    /// Handle one command. Returns the responder when asked to stop.
    fn dispatch(&mut self, command: Command) -> Option<oneshot::Sender<()>> {
        match command {
            Command::Mutate {
                mutation,
                respond_to,
            } => {
                let now = self.now();
                let result = self.scheduler.apply_local(&mut self.store, mutation, now);
                let result = match result {
                    Ok((applied, actions)) => {
                        self.execute(actions);
                        Ok(applied)
                    }
                    Err(err) => {
                        let level = if err.is_rejection() {
                            NoticeLevel::Warning
                        } else {
                            NoticeLevel::Error
                        };
                        self.broadcast(AgentUpdate::Notice(Notice::new(level, err.to_string())));
                        Err(err)
                    }
                };
                let _ = respond_to.send(result);
            }
            Command::RequestSave => self.feed(SyncEvent::SaveRequested),
            Command::Watch { field, kind } => self.tracker.watch(field, kind),
            Command::Field { field, event } => {
                let now = self.now();
                self.tracker.record(&field, event, now);
            }
            Command::SyncNow => {
                let sources: Vec<Source> = self.links.keys().copied().collect();
                self.execute(sources.into_iter().map(SyncAction::Pull).collect());
            }
            Command::Snapshot(respond_to) => {
                let _ = respond_to.send(self.store.snapshot());
            }
            Command::Status(respond_to) => {
                let _ = respond_to.send(self.scheduler.status());
            }
            Command::Summary(respond_to) => {
                let _ = respond_to.send(FinancialSummary::of(self.store.state()));
            }
            Command::Week { date, respond_to } => {
                let _ = respond_to.send(summary::weekly_attendance(self.store.state(), date));
            }
            Command::ExportBackup { path, respond_to } => {
                let result = persistence::export_backup(self.store.state(), &path, self.now());
                let _ = respond_to.send(result);
            }
            Command::Restore { backup, respond_to } => {
                tracing::info!(
                    version = %backup.version,
                    taken = %backup.timestamp,
                    "restoring backup"
                );
                self.feed(SyncEvent::RestoreBackup(backup.data));
                let _ = respond_to.send(());
            }
            Command::Shutdown(done) => return Some(done),
            Command::TimerFired(token) => {
                if self.scheduler.is_current(token) {
                    self.timers.remove(&token.kind);
                }
                self.feed(SyncEvent::TimerFired(token));
            }
            Command::Pulled { source, result } => self.pulled(source, result),
            Command::Pushed { source, result } => {
                if let Err(message) = result {
                    tracing::warn!(%source, error = %message, "push failed");
                    self.broadcast(AgentUpdate::Notice(Notice::new(
                        NoticeLevel::Warning,
                        format!("{source} sync failed: {message}"),
                    )));
                }
            }
            Command::Remote { source, event } => match event {
                TransportEvent::Snapshot(snapshot) => {
                    self.feed(SyncEvent::RemoteSnapshotReceived { source, snapshot })
                }
                TransportEvent::Presence(count) => self.feed(SyncEvent::PresenceChanged { count }),
            },
            Command::Disconnected { source } => self.feed(SyncEvent::ConnectionChanged {
                source,
                online: false,
            }),
        }
        None
    }

    fn pulled(&mut self, source: Source, result: std::result::Result<Option<Value>, String>) {
        match result {
            // First successful read since going offline.
            Ok(snapshot) if !self.scheduler.is_online(source) => {
                self.feed(SyncEvent::ConnectionChanged {
                    source,
                    online: true,
                });
                self.feed(SyncEvent::InitialSnapshot { source, snapshot });
            }
            Ok(Some(snapshot)) => self.feed(SyncEvent::RemoteSnapshotReceived { source, snapshot }),
            Ok(None) => self.feed(SyncEvent::InitialSnapshot {
                source,
                snapshot: None,
            }),
            Err(message) => {
                tracing::warn!(%source, error = %message, "pull failed");
                self.feed(SyncEvent::ConnectionChanged {
                    source,
                    online: false,
                });
            }
        }
    }

    fn feed(&mut self, event: SyncEvent) {
        let now = self.now();
        let actions = self
            .scheduler
            .handle(&mut self.store, &self.tracker, event, now);
        self.execute(actions);
    }

    fn execute(&mut self, actions: Vec<SyncAction>) {
        for action in actions {
            match action {
                SyncAction::Persist(snapshot) => {
                    if let Err(err) = self.persistence.save(&snapshot) {
                        tracing::error!(error = %err, "failed to save local state");
                        self.broadcast(AgentUpdate::Notice(Notice::new(
                            NoticeLevel::Error,
                            format!("could not save: {err}"),
                        )));
                    }
                }
                SyncAction::Push { target, snapshot } => match self.links.get(&target) {
                    Some(link) => {
                        link.outbox.send_replace(Some(snapshot));
                    }
                    None => tracing::trace!(%target, "no transport for push"),
                },
                SyncAction::Pull(source) => self.pull(source),
                SyncAction::ArmTimer { token, delay_ms } => self.arm(token, delay_ms),
                SyncAction::Notice(notice) => self.broadcast(AgentUpdate::Notice(notice)),
                SyncAction::Refresh { limited } => {
                    self.broadcast(AgentUpdate::Refresh { limited })
                }
            }
        }
    }

    fn pull(&mut self, source: Source) {
        let Some(link) = self.links.get(&source) else {
            return;
        };
        let transport = link.transport.clone();
        let commands = self.commands.clone();
        self.background.retain(|task| !task.is_finished());
        self.background.push(tokio::spawn(async move {
            let result = transport.pull().await.map_err(|e| e.to_string());
            let _ = commands.send(Command::Pulled { source, result }).await;
        }));
    }

    fn arm(&mut self, token: TimerToken, delay_ms: Millis) {
        let commands = self.commands.clone();
        let timer = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            let _ = commands.send(Command::TimerFired(token)).await;
        });
        if let Some(previous) = self.timers.insert(token.kind, timer) {
            previous.abort();
        }
    }

    /// Start the push task and the connection task of one transport.
    fn connect(&mut self, transport: Arc<dyn RemoteTransport>, reconnect_delay: Duration) {
        let source = transport.source();
        let (outbox, pending) = watch::channel(None);
        self.links.insert(
            source,
            Link {
                transport: transport.clone(),
                outbox,
            },
        );
        self.background.push(tokio::spawn(push_loop(
            transport.clone(),
            pending,
            self.commands.clone(),
        )));
        self.background.push(tokio::spawn(connect_loop(
            transport,
            self.commands.clone(),
            reconnect_delay,
        )));
    }

    fn stop(&mut self) {
        for (_, timer) in self.timers.drain() {
            timer.abort();
        }
        for task in self.background.drain(..) {
            task.abort();
        }
        if let Err(err) = self.persistence.save(self.store.state()) {
            tracing::error!(error = %err, "final save failed");
        }
        tracing::info!("sync agent stopped");
    }

    fn broadcast(&self, update: AgentUpdate) {
        // No listeners is fine.
        let _ = self.updates.send(update);
    }

    fn now(&self) -> Millis {
        self.clock.now_millis()
    }
}

/// Push the newest waiting snapshot, one push at a time.
async fn push_loop(
    transport: Arc<dyn RemoteTransport>,
    mut pending: watch::Receiver<Option<Snapshot>>,
    commands: mpsc::Sender<Command>,
) {
    let source = transport.source();
    while pending.changed().await.is_ok() {
        let Some(snapshot) = pending.borrow_and_update().clone() else {
            continue;
        };
        let result = transport.push(&snapshot).await.map_err(|e| e.to_string());
        if result.is_ok() {
            tracing::debug!(%source, records = snapshot.record_count(), "pushed snapshot");
        }
        if commands.send(Command::Pushed { source, result }).await.is_err() {
            break;
        }
    }
}

/// Initial read, then subscription. Retries after `reconnect_delay` on
/// failure or when the subscription drops. Polled transports stop after
/// the first successful read.
async fn connect_loop(
    transport: Arc<dyn RemoteTransport>,
    commands: mpsc::Sender<Command>,
    reconnect_delay: Duration,
) {
    let source = transport.source();
    loop {
        let result = transport.pull().await.map_err(|e| e.to_string());
        let connected = result.is_ok();
        if commands.send(Command::Pulled { source, result }).await.is_err() {
            return;
        }

        if connected {
            match transport.subscribe().await {
                Ok(None) => return,
                Ok(Some(mut events)) => {
                    while let Some(event) = events.recv().await {
                        if commands.send(Command::Remote { source, event }).await.is_err() {
                            return;
                        }
                    }
                    tracing::warn!(%source, "subscription ended");
                }
                Err(err) => tracing::warn!(%source, error = %err, "subscribe failed"),
            }
            if commands.send(Command::Disconnected { source }).await.is_err() {
                return;
            }
        }

        tokio::time::sleep(reconnect_delay).await;
    }
}
