//! Transport layer abstraction for sync sessions.
//!
//! A transport opens a [`Session`]: a bidirectional byte channel between two
//! peers. The engine only ever talks to the session through tokio channels;
//! transports run their own tasks that move bytes between those channels
//! and the wire.
//!
//! A send completes only once the transport reports the bytes delivered
//! (written to the socket, or handed to the peer's session), so a peer that
//! disappears mid-send surfaces as an error rather than a silent loss.

use crate::error::{SyncError, SyncResult};
use shadowdex_sync_protocol::RendezvousId;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};

/// Default capacity of the channels between a session and its transport.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 16;

/// Opens sessions.
///
/// This trait abstracts the network layer, allowing for different
/// implementations (TCP, in-memory for tests, ...).
pub trait Transport: Send + Sync + 'static {
    /// A host waiting for its guest.
    type Listener: SessionListener;

    /// Mints a rendezvous id and starts waiting for a guest.
    ///
    /// Fails with [`SyncError::Signaling`] if the id cannot be published.
    fn create_session(&self) -> impl Future<Output = SyncResult<Self::Listener>> + Send;

    /// Connects to the host that published `id`.
    ///
    /// Fails with [`SyncError::Connection`] if the id is unknown or the host
    /// is unreachable.
    fn join_session(&self, id: &RendezvousId)
        -> impl Future<Output = SyncResult<Session>> + Send;
}

/// A published rendezvous id waiting for exactly one guest.
///
/// Dropping the listener withdraws the id.
pub trait SessionListener: Send + 'static {
    /// Returns the published id.
    fn rendezvous_id(&self) -> &RendezvousId;

    /// Waits for the guest.
    fn accept(self) -> impl Future<Output = SyncResult<Session>> + Send;
}

/// Something that happened on a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// The peer sent bytes.
    Data(Vec<u8>),
    /// The session closed, from either side.
    Closed,
    /// The session broke.
    Failed(String),
}

/// Bytes the engine wants sent, with the channel that reports their fate.
#[derive(Debug)]
pub struct Outbound {
    /// Bytes for the peer.
    pub bytes: Vec<u8>,
    delivered: oneshot::Sender<Result<(), String>>,
}

impl Outbound {
    /// Reports the bytes delivered.
    pub fn delivered(self) {
        let _ = self.delivered.send(Ok(()));
    }

    /// Reports that the bytes could not be delivered.
    pub fn failed(self, reason: impl Into<String>) {
        let _ = self.delivered.send(Err(reason.into()));
    }
}

/// An established session.
#[derive(Debug)]
pub struct Session {
    sender: SessionSender,
    inbound: mpsc::Receiver<SessionEvent>,
}

/// The transport side of a [`Session`].
#[derive(Debug)]
pub struct SessionIo {
    /// Bytes the engine wants sent. Each must be acknowledged; dropping one
    /// fails its send.
    pub outbound: mpsc::Receiver<Outbound>,
    /// Events for the engine.
    pub inbound: mpsc::Sender<SessionEvent>,
    /// Resolves once the session is closed.
    pub closed: ClosedSignal,
}

impl Session {
    /// Creates a session and the channel ends a transport drives it with.
    pub fn channel(capacity: usize) -> (Session, SessionIo) {
        let (out_tx, out_rx) = mpsc::channel(capacity.max(1));
        let (in_tx, in_rx) = mpsc::channel(capacity.max(1));
        let closer = SessionCloser::new();
        let closed = closer.signal();
        let session = Session {
            sender: SessionSender {
                outbound: out_tx,
                closer,
            },
            inbound: in_rx,
        };
        let io = SessionIo {
            outbound: out_rx,
            inbound: in_tx,
            closed,
        };
        (session, io)
    }

    /// Sends bytes to the peer and waits until the transport delivers them.
    pub async fn send(&self, bytes: Vec<u8>) -> SyncResult<()> {
        self.sender.send(bytes).await
    }

    /// Waits for the next event. A session whose transport went away reports
    /// [`SessionEvent::Closed`].
    pub async fn recv(&mut self) -> SessionEvent {
        self.inbound.recv().await.unwrap_or(SessionEvent::Closed)
    }

    /// Closes the session. Returns true if this call closed it.
    pub fn close(&self) -> bool {
        self.sender.closer.close()
    }

    /// Returns a handle that can close the session from elsewhere.
    pub fn closer(&self) -> SessionCloser {
        self.sender.closer.clone()
    }

    /// Splits into a sending half and the inbound event stream, so both can
    /// be driven at once.
    pub fn into_parts(self) -> (SessionSender, mpsc::Receiver<SessionEvent>) {
        (self.sender, self.inbound)
    }
}

/// Sending half of a [`Session`].
#[derive(Debug, Clone)]
pub struct SessionSender {
    outbound: mpsc::Sender<Outbound>,
    closer: SessionCloser,
}

impl SessionSender {
    /// Sends bytes to the peer and waits until the transport delivers them.
    ///
    /// Fails with [`SyncError::Transport`] if the session is closed or the
    /// bytes never reach the other end.
    pub async fn send(&self, bytes: Vec<u8>) -> SyncResult<()> {
        if self.closer.is_closed() {
            return Err(SyncError::transport("session is closed"));
        }
        let (delivered, ack) = oneshot::channel();
        self.outbound
            .send(Outbound { bytes, delivered })
            .await
            .map_err(|_| SyncError::transport("session transport has stopped"))?;
        match ack.await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(reason)) => Err(SyncError::transport(reason)),
            Err(_) => Err(SyncError::transport(
                "session ended before the peer received the data",
            )),
        }
    }

    /// Returns the session's close handle.
    pub fn closer(&self) -> &SessionCloser {
        &self.closer
    }
}

/// Closes a session exactly once, from any number of places.
#[derive(Debug, Clone)]
pub struct SessionCloser {
    inner: Arc<CloserInner>,
}

#[derive(Debug)]
struct CloserInner {
    closed: AtomicBool,
    signal: watch::Sender<bool>,
}

impl SessionCloser {
    fn new() -> Self {
        let (signal, _) = watch::channel(false);
        Self {
            inner: Arc::new(CloserInner {
                closed: AtomicBool::new(false),
                signal,
            }),
        }
    }

    /// Closes the session. Returns true if this call closed it; later calls
    /// and calls after a failure do nothing.
    pub fn close(&self) -> bool {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.inner.signal.send_replace(true);
        true
    }

    /// Returns true once closed.
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    fn signal(&self) -> ClosedSignal {
        ClosedSignal(self.inner.signal.subscribe())
    }
}

/// Resolves once a session is closed or every handle to it is gone.
#[derive(Debug, Clone)]
pub struct ClosedSignal(watch::Receiver<bool>);

impl ClosedSignal {
    /// Waits for the close.
    pub async fn wait(&mut self) {
        let _ = self.0.wait_for(|closed| *closed).await;
    }

    /// Returns true if already closed.
    pub fn is_closed(&self) -> bool {
        *self.0.borrow() || self.0.has_changed().is_err()
    }
}
