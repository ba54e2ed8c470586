//! The sync engine.
//!
//! One engine drives at most one session at a time. Public calls validate
//! and record the first transition, then hand the session to a spawned task
//! that drives it to `Success` or `Error`. Every task is tagged with a
//! generation number; `cancel`, `reset` and a new start bump it, after which
//! the stale task can no longer change the state.

use crate::applier::DatabaseApplier;
use crate::config::SyncConfig;
use crate::error::{SyncError, SyncErrorKind, SyncResult};
use crate::state::{SyncPhase, SyncReport, SyncRole, SyncState};
use crate::transport::{
    Session, SessionCloser, SessionEvent, SessionListener, SessionSender, Transport,
};
use parking_lot::{Mutex, RwLock};
use shadowdex_core::{CoreError, Database, Note};
use shadowdex_sync_protocol::{Decoded, RendezvousId, SyncMessage};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Running totals across sessions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncStats {
    /// Sessions that reached `Success`.
    pub sessions_completed: u64,
    /// Sessions that ended in `Error`, cancellations included.
    pub sessions_failed: u64,
    /// Notes sent to peers.
    pub notes_sent: u64,
    /// Notes received from peers.
    pub notes_received: u64,
    /// Message of the most recent failure.
    pub last_error: Option<String>,
}

/// Peer-to-peer sync engine.
///
/// # Example
///
/// ```rust
/// use shadowdex_core::{Database, NoteDraft};
/// use shadowdex_sync_engine::{MemoryHub, SyncConfig, SyncEngine, SyncState};
/// use std::sync::Arc;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let hub = MemoryHub::new();
/// let a = Arc::new(Database::open_in_memory().unwrap());
/// let b = Arc::new(Database::open_in_memory().unwrap());
/// a.create_note(NoteDraft::new("Alice", "人物メモ")).unwrap();
///
/// let host = SyncEngine::new(a, hub.transport(), SyncConfig::default());
/// let guest = SyncEngine::new(b.clone(), hub.transport(), SyncConfig::default());
///
/// let id = host.start_hosting().await.unwrap();
/// guest.connect_to_host(id.as_str()).await.unwrap();
/// guest.wait_for_completion().await.unwrap();
/// assert_eq!(b.note_count(), 1);
/// # }
/// ```
pub struct SyncEngine<T: Transport> {
    inner: Arc<Inner<T>>,
}

struct Inner<T> {
    config: SyncConfig,
    transport: T,
    applier: DatabaseApplier,
    state: watch::Sender<SyncState>,
    stats: RwLock<SyncStats>,
    generation: AtomicU64,
    session: Mutex<SessionSlot>,
}

#[derive(Default)]
struct SessionSlot {
    task: Option<JoinHandle<()>>,
    closer: Option<SessionCloser>,
}

impl SessionSlot {
    fn teardown(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        if let Some(closer) = self.closer.take() {
            if closer.close() {
                debug!("closed sync session");
            }
        }
    }
}

impl<T: Transport> SyncEngine<T> {
    /// Creates an idle engine over `database`.
    pub fn new(database: Arc<Database>, transport: T, config: SyncConfig) -> Self {
        let (state, _) = watch::channel(SyncState::Idle);
        Self {
            inner: Arc::new(Inner {
                config,
                transport,
                applier: DatabaseApplier::new(database),
                state,
                stats: RwLock::new(SyncStats::default()),
                generation: AtomicU64::new(0),
                session: Mutex::new(SessionSlot::default()),
            }),
        }
    }

    /// Gets the current state.
    pub fn state(&self) -> SyncState {
        self.inner.state.borrow().clone()
    }

    /// Subscribes to state changes. The receiver sees the current state
    /// first, then every transition.
    pub fn subscribe(&self) -> watch::Receiver<SyncState> {
        self.inner.state.subscribe()
    }

    /// Gets the current stats.
    pub fn stats(&self) -> SyncStats {
        self.inner.stats.read().clone()
    }

    /// Gets the configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.inner.config
    }

    /// Gets the transport.
    pub fn transport(&self) -> &T {
        &self.inner.transport
    }

    /// Gets the local store.
    pub fn database(&self) -> &Arc<Database> {
        self.inner.applier.database()
    }

    /// Starts a session as host.
    ///
    /// Returns once the rendezvous id is published; the engine is then
    /// `Waiting` and moves on by itself when a guest joins.
    pub async fn start_hosting(&self) -> SyncResult<RendezvousId> {
        let generation = self.inner.begin(SyncState::Generating)?;

        let listener = match self.inner.transport.create_session().await {
            Ok(listener) => listener,
            Err(e) => {
                self.inner.fail(generation, &e);
                return Err(e);
            }
        };
        let id = listener.rendezvous_id().clone();

        if !self.inner.transition(
            generation,
            SyncState::Waiting {
                rendezvous_id: id.clone(),
            },
        ) {
            return Err(SyncError::Cancelled);
        }
        info!(rendezvous_id = %id, "hosting sync session");

        let task = tokio::spawn(self.inner.clone().run_host(generation, listener));
        self.inner.attach_task(generation, task);
        Ok(id)
    }

    /// Starts a session as guest of the host that published `id`.
    ///
    /// A malformed id fails at once with [`SyncError::Connection`] without
    /// touching the transport. Otherwise this returns while the engine is
    /// `Connecting`; use [`Self::subscribe`] or
    /// [`Self::wait_for_completion`] to follow the session.
    pub async fn connect_to_host(&self, id: &str) -> SyncResult<()> {
        let generation = self.inner.begin(SyncState::Connecting)?;

        let id = match RendezvousId::parse(id) {
            Ok(id) => id,
            Err(e) => {
                let err = SyncError::connection(e);
                self.inner.fail(generation, &err);
                return Err(err);
            }
        };
        info!(rendezvous_id = %id, "joining sync session");

        let task = tokio::spawn(self.inner.clone().run_guest(generation, id));
        self.inner.attach_task(generation, task);
        Ok(())
    }

    /// Waits for the current session to end.
    ///
    /// Returns the report on `Success` and the recorded error on `Error`.
    /// Fails with [`SyncError::InvalidStateTransition`] when idle.
    pub async fn wait_for_completion(&self) -> SyncResult<SyncReport> {
        let mut rx = self.inner.state.subscribe();
        loop {
            let state = rx.borrow_and_update().clone();
            match state {
                SyncState::Idle => {
                    return Err(SyncError::InvalidStateTransition {
                        from: "Idle".into(),
                        to: "Success".into(),
                    })
                }
                SyncState::Success(report) => return Ok(report),
                SyncState::Error { kind, message } => {
                    return Err(SyncError::from_failure(kind, &message))
                }
                _ => {}
            }
            if rx.changed().await.is_err() {
                return Err(SyncError::Cancelled);
            }
        }
    }

    /// Aborts the session in flight and moves to `Error`.
    ///
    /// Returns false if no session was in flight.
    pub fn cancel(&self) -> bool {
        let inner = &self.inner;
        let mut slot = inner.session.lock();
        let cancelled = inner.state.send_if_modified(|state| {
            if !state.is_active() {
                return false;
            }
            inner.generation.fetch_add(1, Ordering::AcqRel);
            debug!(from = %state.phase(), "sync cancelled");
            *state = SyncState::Error {
                kind: SyncErrorKind::Cancelled,
                message: SyncError::Cancelled.detail(),
            };
            true
        });
        slot.teardown();
        if cancelled {
            inner.record_failure(&SyncError::Cancelled);
        }
        cancelled
    }

    /// Returns a finished engine to `Idle`, closing any lingering session.
    ///
    /// Does nothing when already idle. Fails while a session is in flight.
    pub fn reset(&self) -> SyncResult<()> {
        let inner = &self.inner;
        let mut slot = inner.session.lock();
        let mut result = Ok(());
        inner.state.send_if_modified(|state| {
            let from = state.phase();
            if !from.can_transition_to(SyncPhase::Idle) {
                if from.is_active() {
                    result = Err(SyncError::InvalidStateTransition {
                        from: from.to_string(),
                        to: "Idle".into(),
                    });
                }
                return false;
            }
            inner.generation.fetch_add(1, Ordering::AcqRel);
            debug!(%from, "sync reset");
            *state = SyncState::Idle;
            true
        });
        if result.is_ok() {
            slot.teardown();
        }
        result
    }
}

impl<T: Transport> Drop for SyncEngine<T> {
    fn drop(&mut self) {
        self.inner.generation.fetch_add(1, Ordering::AcqRel);
        self.inner.session.lock().teardown();
    }
}

impl<T: Transport> std::fmt::Debug for SyncEngine<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("state", &*self.inner.state.borrow())
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

impl<T: Transport> Inner<T> {
    /// Records the first transition of a new session and returns its
    /// generation. A previous session that ended in `Error` is closed.
    fn begin(&self, next: SyncState) -> SyncResult<u64> {
        let mut slot = self.session.lock();
        let to = next.phase();
        let mut result = Err(SyncError::Cancelled);
        self.state.send_if_modified(|state| {
            let from = state.phase();
            if !from.can_start_sync() || !from.can_transition_to(to) {
                result = Err(SyncError::InvalidStateTransition {
                    from: from.to_string(),
                    to: to.to_string(),
                });
                return false;
            }
            let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
            debug!(%from, %to, generation, "sync state");
            *state = next;
            result = Ok(generation);
            true
        });
        if result.is_ok() {
            slot.teardown();
        }
        result
    }

    /// Applies `next` if `generation` is still current and the move is
    /// allowed. Returns true if applied.
    fn transition(&self, generation: u64, next: SyncState) -> bool {
        self.state.send_if_modified(|state| {
            if self.generation.load(Ordering::Acquire) != generation {
                return false;
            }
            let (from, to) = (state.phase(), next.phase());
            if !from.can_transition_to(to) {
                warn!(%from, %to, "refused sync state transition");
                return false;
            }
            debug!(%from, %to, generation, "sync state");
            *state = next;
            true
        })
    }

    fn fail(&self, generation: u64, error: &SyncError) {
        let failed = self.transition(
            generation,
            SyncState::Error {
                kind: error.kind(),
                message: error.detail(),
            },
        );
        if failed {
            warn!(error = %error, "sync failed");
            self.record_failure(error);
        }
    }

    fn record_failure(&self, error: &SyncError) {
        let mut stats = self.stats.write();
        stats.sessions_failed += 1;
        stats.last_error = Some(error.to_string());
    }

    fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::Acquire) == generation
    }

    fn attach_task(&self, generation: u64, task: JoinHandle<()>) {
        let mut slot = self.session.lock();
        if self.is_current(generation) {
            slot.task = Some(task);
        } else {
            task.abort();
        }
    }

    fn attach_closer(&self, generation: u64, closer: &SessionCloser) -> bool {
        let mut slot = self.session.lock();
        if !self.is_current(generation) {
            return false;
        }
        slot.closer = Some(closer.clone());
        true
    }

    async fn run_host(self: Arc<Self>, generation: u64, listener: T::Listener) {
        match listener.accept().await {
            Ok(session) => self.run_session(generation, SyncRole::Host, session).await,
            Err(e) => self.fail(generation, &e),
        }
    }

    async fn run_guest(self: Arc<Self>, generation: u64, id: RendezvousId) {
        let timeout = self.config.connect_timeout;
        let joined = tokio::time::timeout(timeout, self.transport.join_session(&id)).await;
        let session = match joined {
            Ok(Ok(session)) => session,
            Ok(Err(e)) => return self.fail(generation, &e),
            Err(_) => {
                let err = SyncError::connection(format!(
                    "could not reach host within {}ms",
                    timeout.as_millis()
                ));
                return self.fail(generation, &err);
            }
        };
        self.run_session(generation, SyncRole::Guest, session).await;
    }

    async fn run_session(&self, generation: u64, role: SyncRole, session: Session) {
        let (sender, mut inbound) = session.into_parts();
        let closer = sender.closer().clone();

        if !self.attach_closer(generation, &closer)
            || !self.transition(generation, SyncState::Syncing)
        {
            closer.close();
            return;
        }

        match self.exchange(role, &sender, &mut inbound).await {
            Ok(report) => {
                if self.transition(generation, SyncState::Success(report.clone())) {
                    info!(
                        ?role,
                        sent = report.sent,
                        inserted = report.inserted,
                        replaced = report.replaced,
                        kept = report.kept,
                        "sync complete"
                    );
                    let mut stats = self.stats.write();
                    stats.sessions_completed += 1;
                    stats.notes_sent += report.sent as u64;
                    stats.notes_received += (report.inserted + report.replaced + report.kept) as u64;
                }
                tokio::time::sleep(self.config.linger).await;
            }
            Err(e) => self.fail(generation, &e),
        }
        closer.close();
    }

    /// Sends the local collection and merges the peer's, concurrently.
    async fn exchange(
        &self,
        role: SyncRole,
        sender: &SessionSender,
        inbound: &mut mpsc::Receiver<SessionEvent>,
    ) -> SyncResult<SyncReport> {
        let max = self.config.max_payload_bytes;
        let notes = self.applier.snapshot_notes()?;
        let sent = notes.len();
        let payload = SyncMessage::sync_data(notes).encode(max)?;
        debug!(notes = sent, bytes = payload.len(), "sending local notes");

        let ((), (entries, ignored_messages)) =
            tokio::try_join!(sender.send(payload), receive_entries(inbound, max))?;
        debug!(notes = entries.len(), "received remote notes");

        let applier = self.applier.clone();
        let merge = tokio::task::spawn_blocking(move || applier.apply_remote_notes(entries))
            .await
            .map_err(|e| SyncError::Storage(CoreError::transaction_aborted(e.to_string())))??;

        Ok(SyncReport {
            role,
            sent,
            inserted: merge.inserted,
            replaced: merge.replaced,
            kept: merge.kept,
            ignored_messages,
        })
    }
}

/// Reads events until the peer's notes arrive. Messages that are not
/// understood are skipped and counted.
async fn receive_entries(
    inbound: &mut mpsc::Receiver<SessionEvent>,
    max: usize,
) -> SyncResult<(Vec<Note>, usize)> {
    let mut ignored = 0;
    loop {
        match inbound.recv().await {
            Some(SessionEvent::Data(bytes)) => match SyncMessage::decode(&bytes, max)? {
                Decoded::Message(SyncMessage::SyncData { entries }) => {
                    return Ok((entries, ignored))
                }
                Decoded::Ignored { reason } => {
                    warn!(%reason, "ignoring peer message");
                    ignored += 1;
                }
            },
            Some(SessionEvent::Failed(reason)) => return Err(SyncError::transport(reason)),
            Some(SessionEvent::Closed) | None => {
                return Err(SyncError::transport(
                    "peer closed the session before sending its notes",
                ))
            }
        }
    }
}
