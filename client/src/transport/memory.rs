//! In-process remote store. Several agents sharing one [`MemoryHub`] sync
//! with each other the way they would through the relay.

use super::{RemoteTransport, TransportEvent, EVENT_BUFFER};
use crate::error::TransportError;
use async_trait::async_trait;
use lounge_engine::{Snapshot, Source};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;

#[derive(Debug)]
struct Subscriber {
    session: u64,
    tx: mpsc::Sender<TransportEvent>,
}

#[derive(Debug, Default)]
struct HubState {
    data: Option<Value>,
    subscribers: Vec<Subscriber>,
}

impl HubState {
    fn live(&mut self) -> Vec<mpsc::Sender<TransportEvent>> {
        self.subscribers.retain(|s| !s.tx.is_closed());
        self.subscribers.iter().map(|s| s.tx.clone()).collect()
    }
}

/// Shared snapshot slot plus subscribers.
///
/// A write is announced to every subscriber except the session that made it.
#[derive(Debug, Default)]
pub struct MemoryHub {
    state: Mutex<HubState>,
    writes: AtomicU64,
    sessions: AtomicU64,
}

impl MemoryHub {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Hub pre-loaded with `data`.
    pub fn with_data(data: Value) -> Arc<Self> {
        let hub = Self::default();
        hub.lock().data = Some(data);
        Arc::new(hub)
    }

    /// Current remote value.
    pub fn data(&self) -> Option<Value> {
        self.lock().data.clone()
    }

    /// Number of pushes received.
    pub fn writes(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }

    /// Live subscriptions.
    pub fn presence(&self) -> usize {
        self.lock().live().len()
    }

    /// Write `data` as an outside writer would, notifying every subscriber.
    pub fn publish(&self, data: Value) {
        self.write(data, None);
    }

    fn write(&self, data: Value, writer: Option<u64>) {
        let subscribers: Vec<_> = {
            let mut state = self.lock();
            state.data = Some(data.clone());
            state.live();
            state
                .subscribers
                .iter()
                .filter(|s| Some(s.session) != writer)
                .map(|s| s.tx.clone())
                .collect()
        };
        for tx in subscribers {
            // A full or closed channel drops the notification, like a lossy socket.
            let _ = tx.try_send(TransportEvent::Snapshot(data.clone()));
        }
    }

    /// Drop every subscription, as if the server went away.
    pub fn disconnect_all(&self) {
        self.lock().subscribers.clear();
    }

    fn subscribe(&self, session: u64) -> mpsc::Receiver<TransportEvent> {
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let subscribers = {
            let mut state = self.lock();
            state.subscribers.push(Subscriber { session, tx });
            state.live()
        };
        let count = subscribers.len();
        for tx in subscribers {
            let _ = tx.try_send(TransportEvent::Presence(count));
        }
        rx
    }

    fn lock(&self) -> MutexGuard<'_, HubState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// One client's view of a [`MemoryHub`].
#[derive(Debug, Clone)]
pub struct MemoryTransport {
    hub: Arc<MemoryHub>,
    source: Source,
    session: u64,
    failing: Arc<AtomicBool>,
    notify: bool,
}

impl MemoryTransport {
    /// A realtime-like transport that pushes change notifications.
    pub fn realtime(hub: Arc<MemoryHub>) -> Self {
        Self {
            session: hub.sessions.fetch_add(1, Ordering::SeqCst),
            hub,
            source: Source::Realtime,
            failing: Arc::new(AtomicBool::new(false)),
            notify: true,
        }
    }

    /// A document-like transport that must be polled.
    pub fn document(hub: Arc<MemoryHub>) -> Self {
        Self {
            session: hub.sessions.fetch_add(1, Ordering::SeqCst),
            hub,
            source: Source::Document,
            failing: Arc::new(AtomicBool::new(false)),
            notify: false,
        }
    }

    /// Make every call fail until cleared. Shared by clones.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn hub(&self) -> &Arc<MemoryHub> {
        &self.hub
    }

    fn check(&self) -> Result<(), TransportError> {
        if self.failing.load(Ordering::SeqCst) {
            Err(TransportError::Unavailable)
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl RemoteTransport for MemoryTransport {
    fn source(&self) -> Source {
        self.source
    }

    async fn pull(&self) -> Result<Option<Value>, TransportError> {
        self.check()?;
        Ok(self.hub.data())
    }

    async fn push(&self, snapshot: &Snapshot) -> Result<(), TransportError> {
        self.check()?;
        self.hub.writes.fetch_add(1, Ordering::SeqCst);
        let value = snapshot.to_value()?;
        if self.notify {
            self.hub.write(value, Some(self.session));
        } else {
            self.hub.lock().data = Some(value);
        }
        Ok(())
    }

    async fn subscribe(&self) -> Result<Option<mpsc::Receiver<TransportEvent>>, TransportError> {
        self.check()?;
        Ok(self.notify.then(|| self.hub.subscribe(self.session)))
    }
}
