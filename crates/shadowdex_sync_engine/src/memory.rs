//! In-process transport.
//!
//! [`MemoryHub`] stands in for both the rendezvous service and the network,
//! so two engines in the same process can sync without sockets. The hub
//! can be told to refuse registrations, delay joins, or hand out a known
//! rendezvous id next.

use crate::error::{SyncError, SyncResult};
use crate::transport::{
    ClosedSignal, Outbound, Session, SessionEvent, SessionListener, Transport,
    DEFAULT_CHANNEL_CAPACITY,
};
use parking_lot::Mutex;
use shadowdex_sync_protocol::RendezvousId;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

/// Shared rendezvous point for [`MemoryTransport`]s.
#[derive(Debug, Clone)]
pub struct MemoryHub {
    inner: Arc<HubInner>,
}

#[derive(Debug)]
struct HubInner {
    waiting: Mutex<HashMap<RendezvousId, oneshot::Sender<Session>>>,
    queued_ids: Mutex<VecDeque<RendezvousId>>,
    available: AtomicBool,
    join_delay: Mutex<Duration>,
    join_attempts: AtomicUsize,
    capacity: usize,
}

impl MemoryHub {
    /// Creates a hub with the default channel capacity.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Creates a hub whose sessions buffer up to `capacity` messages.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Arc::new(HubInner {
                waiting: Mutex::new(HashMap::new()),
                queued_ids: Mutex::new(VecDeque::new()),
                available: AtomicBool::new(true),
                join_delay: Mutex::new(Duration::ZERO),
                join_attempts: AtomicUsize::new(0),
                capacity,
            }),
        }
    }

    /// Returns a transport attached to this hub.
    pub fn transport(&self) -> MemoryTransport {
        MemoryTransport { hub: self.clone() }
    }

    /// Makes the hub accept or refuse new hosts.
    pub fn set_available(&self, available: bool) {
        self.inner.available.store(available, Ordering::Release);
    }

    /// Delays every join by `delay`.
    pub fn set_join_delay(&self, delay: Duration) {
        *self.inner.join_delay.lock() = delay;
    }

    /// Hands out `id` to the next host instead of a random one.
    pub fn queue_id(&self, id: RendezvousId) {
        self.inner.queued_ids.lock().push_back(id);
    }

    /// Returns how many joins have been attempted.
    pub fn join_attempts(&self) -> usize {
        self.inner.join_attempts.load(Ordering::Acquire)
    }

    /// Returns how many hosts are waiting for a guest.
    pub fn waiting_count(&self) -> usize {
        self.inner.waiting.lock().len()
    }

    fn next_id(&self) -> RendezvousId {
        self.inner
            .queued_ids
            .lock()
            .pop_front()
            .unwrap_or_else(RendezvousId::generate)
    }
}

impl Default for MemoryHub {
    fn default() -> Self {
        Self::new()
    }
}

/// Transport over a [`MemoryHub`].
#[derive(Debug, Clone)]
pub struct MemoryTransport {
    hub: MemoryHub,
}

impl MemoryTransport {
    /// Returns the hub this transport is attached to.
    pub fn hub(&self) -> &MemoryHub {
        &self.hub
    }
}

impl Transport for MemoryTransport {
    type Listener = MemoryListener;

    async fn create_session(&self) -> SyncResult<MemoryListener> {
        if !self.hub.inner.available.load(Ordering::Acquire) {
            return Err(SyncError::signaling("rendezvous service unavailable"));
        }

        let (tx, rx) = oneshot::channel();
        let mut id = self.hub.next_id();
        {
            let mut waiting = self.hub.inner.waiting.lock();
            while waiting.contains_key(&id) {
                id = RendezvousId::generate();
            }
            waiting.insert(id.clone(), tx);
        }
        debug!(rendezvous_id = %id, "memory host registered");

        Ok(MemoryListener {
            id,
            accepted: Some(rx),
            hub: self.hub.clone(),
        })
    }

    async fn join_session(&self, id: &RendezvousId) -> SyncResult<Session> {
        let inner = &self.hub.inner;
        inner.join_attempts.fetch_add(1, Ordering::AcqRel);

        let delay = *inner.join_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if !inner.available.load(Ordering::Acquire) {
            return Err(SyncError::connection("rendezvous service unavailable"));
        }

        let host = inner
            .waiting
            .lock()
            .remove(id)
            .ok_or_else(|| SyncError::connection(format!("no host is waiting for {id}")))?;

        let (host_session, host_io) = Session::channel(inner.capacity);
        let (guest_session, guest_io) = Session::channel(inner.capacity);

        tokio::spawn(relay(
            host_io.outbound,
            host_io.closed.clone(),
            guest_io.inbound,
            guest_io.closed.clone(),
        ));
        tokio::spawn(relay(
            guest_io.outbound,
            guest_io.closed,
            host_io.inbound,
            host_io.closed,
        ));

        host.send(host_session)
            .map_err(|_| SyncError::connection(format!("host for {id} went away")))?;
        debug!(rendezvous_id = %id, "memory guest joined");
        Ok(guest_session)
    }
}

/// A host waiting on a [`MemoryHub`].
#[derive(Debug)]
pub struct MemoryListener {
    id: RendezvousId,
    accepted: Option<oneshot::Receiver<Session>>,
    hub: MemoryHub,
}

impl SessionListener for MemoryListener {
    fn rendezvous_id(&self) -> &RendezvousId {
        &self.id
    }

    async fn accept(mut self) -> SyncResult<Session> {
        let accepted = self
            .accepted
            .take()
            .ok_or_else(|| SyncError::signaling("listener already used"))?;
        accepted
            .await
            .map_err(|_| SyncError::signaling(format!("registration for {} was withdrawn", self.id)))
    }
}

impl Drop for MemoryListener {
    fn drop(&mut self) {
        self.hub.inner.waiting.lock().remove(&self.id);
    }
}

/// Moves one direction of a session pair. Queued bytes are delivered
/// before the close is passed on. Bytes count as delivered once they sit in
/// the peer's inbound queue; a peer that stopped reading fails the send.
async fn relay(
    mut from: mpsc::Receiver<Outbound>,
    mut from_closed: ClosedSignal,
    to: mpsc::Sender<SessionEvent>,
    mut to_closed: ClosedSignal,
) {
    loop {
        tokio::select! {
            biased;
            outbound = from.recv() => match outbound {
                Some(mut outbound) => {
                    if to_closed.is_closed() {
                        outbound.failed("peer has left the session");
                        return;
                    }
                    let bytes = std::mem::take(&mut outbound.bytes);
                    if to.send(SessionEvent::Data(bytes)).await.is_err() {
                        outbound.failed("peer has left the session");
                        return;
                    }
                    outbound.delivered();
                }
                None => break,
            },
            _ = from_closed.wait() => break,
            _ = to_closed.wait() => return,
        }
    }
    let _ = to.send(SessionEvent::Closed).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> RendezvousId {
        RendezvousId::parse(s).unwrap()
    }

    #[tokio::test]
    async fn host_and_guest_exchange_bytes() {
        let hub = MemoryHub::new();
        hub.queue_id(id("shadow-dex-ab12cd34"));
        let transport = hub.transport();

        let listener = transport.create_session().await.unwrap();
        assert_eq!(listener.rendezvous_id().as_str(), "shadow-dex-ab12cd34");
        assert_eq!(hub.waiting_count(), 1);

        let accept = tokio::spawn(listener.accept());
        let mut guest = transport.join_session(&id("shadow-dex-ab12cd34")).await.unwrap();
        let mut host = accept.await.unwrap().unwrap();
        assert_eq!(hub.waiting_count(), 0);

        host.send(b"from host".to_vec()).await.unwrap();
        guest.send(b"from guest".to_vec()).await.unwrap();
        assert_eq!(guest.recv().await, SessionEvent::Data(b"from host".to_vec()));
        assert_eq!(host.recv().await, SessionEvent::Data(b"from guest".to_vec()));
    }

    #[tokio::test]
    async fn closing_one_side_reaches_the_other_after_pending_data() {
        let hub = MemoryHub::new();
        let transport = hub.transport();
        let listener = transport.create_session().await.unwrap();
        let id = listener.rendezvous_id().clone();
        let accept = tokio::spawn(listener.accept());
        let mut guest = transport.join_session(&id).await.unwrap();
        let host = accept.await.unwrap().unwrap();

        host.send(vec![7]).await.unwrap();
        assert!(host.close());
        assert_eq!(guest.recv().await, SessionEvent::Data(vec![7]));
        assert_eq!(guest.recv().await, SessionEvent::Closed);
    }

    #[tokio::test]
    async fn unknown_id_is_a_connection_error() {
        let hub = MemoryHub::new();
        let result = hub.transport().join_session(&id("shadow-dex-nobody00")).await;
        assert!(matches!(result, Err(SyncError::Connection(_))));
        assert_eq!(hub.join_attempts(), 1);
    }

    #[tokio::test]
    async fn unavailable_hub_refuses_hosts() {
        let hub = MemoryHub::new();
        hub.set_available(false);
        let result = hub.transport().create_session().await;
        assert!(matches!(result, Err(SyncError::Signaling(_))));
    }

    #[tokio::test]
    async fn dropping_the_listener_withdraws_the_id() {
        let hub = MemoryHub::new();
        let transport = hub.transport();
        let listener = transport.create_session().await.unwrap();
        let id = listener.rendezvous_id().clone();
        drop(listener);

        assert_eq!(hub.waiting_count(), 0);
        assert!(matches!(
            transport.join_session(&id).await,
            Err(SyncError::Connection(_))
        ));
    }
}
