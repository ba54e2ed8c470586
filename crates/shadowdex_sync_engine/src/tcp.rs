//! TCP transport.
//!
//! The host binds an ephemeral port and registers it with a rendezvous
//! service under the token of its rendezvous id. The guest looks the token
//! up and connects directly. The registration stays open until a guest
//! connects, so the service forgets hosts that go away.
//!
//! Session bytes travel as length-prefixed frames sealed with keys derived
//! from the rendezvous id (see [`crate::cipher`]). The host only takes a
//! connection whose first frame opens with those keys; anything else is
//! dropped and the host keeps waiting.

use crate::cipher::{session_ciphers, FrameOpener, FrameSealer, TAG_SIZE};
use crate::error::{SyncError, SyncResult};
use crate::state::SyncRole;
use crate::transport::{
    ClosedSignal, Outbound, Session, SessionEvent, SessionListener, Transport,
    DEFAULT_CHANNEL_CAPACITY,
};
use shadowdex_rendezvous::{read_frame, write_frame, Registration, RendezvousClient};
use shadowdex_sync_protocol::{RendezvousId, DEFAULT_MAX_PAYLOAD_BYTES};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Configuration for [`TcpTransport`].
#[derive(Debug, Clone)]
pub struct TcpTransportConfig {
    /// Rendezvous service address (`host:port`).
    pub rendezvous_addr: String,
    /// Interface hosts listen on.
    pub bind_addr: IpAddr,
    /// Address hosts advertise to guests. Defaults to the local address of
    /// the connection to the rendezvous service.
    pub advertise_addr: Option<IpAddr>,
    /// Timeout for each rendezvous request.
    pub rendezvous_timeout: Duration,
    /// How long the host waits for a new connection's first frame.
    pub handshake_timeout: Duration,
    /// Messages buffered between the engine and the socket.
    pub channel_capacity: usize,
    /// Largest sealed frame accepted from a peer.
    pub max_frame_bytes: usize,
}

impl TcpTransportConfig {
    /// Creates a configuration for the given rendezvous service.
    pub fn new(rendezvous_addr: impl Into<String>) -> Self {
        Self {
            rendezvous_addr: rendezvous_addr.into(),
            bind_addr: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            advertise_addr: None,
            rendezvous_timeout: Duration::from_secs(5),
            handshake_timeout: Duration::from_secs(5),
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            max_frame_bytes: DEFAULT_MAX_PAYLOAD_BYTES + TAG_SIZE,
        }
    }

    /// Sets the interface hosts listen on.
    pub fn with_bind_addr(mut self, addr: IpAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    /// Sets the advertised host address.
    pub fn with_advertise_addr(mut self, addr: IpAddr) -> Self {
        self.advertise_addr = Some(addr);
        self
    }

    /// Sets the rendezvous request timeout.
    pub fn with_rendezvous_timeout(mut self, timeout: Duration) -> Self {
        self.rendezvous_timeout = timeout;
        self
    }

    /// Sets the first-frame timeout for incoming connections.
    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Sets the channel capacity.
    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity;
        self
    }

    /// Sets the largest accepted payload; the frame limit adds room for the
    /// authentication tag.
    pub fn with_max_payload_bytes(mut self, max: usize) -> Self {
        self.max_frame_bytes = max.saturating_add(TAG_SIZE);
        self
    }
}

/// Transport over TCP with a rendezvous service.
#[derive(Debug, Clone)]
pub struct TcpTransport {
    config: TcpTransportConfig,
    client: RendezvousClient,
}

impl TcpTransport {
    /// Creates a transport.
    pub fn new(config: TcpTransportConfig) -> Self {
        let client = RendezvousClient::new(config.rendezvous_addr.clone(), config.rendezvous_timeout);
        Self { config, client }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &TcpTransportConfig {
        &self.config
    }
}

impl Transport for TcpTransport {
    type Listener = TcpSessionListener;

    async fn create_session(&self) -> SyncResult<TcpSessionListener> {
        let id = RendezvousId::generate();

        let listener = TcpListener::bind((self.config.bind_addr, 0))
            .await
            .map_err(|e| SyncError::signaling(format!("cannot listen for guests: {e}")))?;
        let port = listener
            .local_addr()
            .map_err(SyncError::signaling)?
            .port();

        let conn = self.client.connect().await.map_err(|e| {
            SyncError::signaling(format!(
                "rendezvous service {} unreachable: {e}",
                self.client.addr()
            ))
        })?;
        let ip = match self.config.advertise_addr {
            Some(ip) => ip,
            None => conn.local_addr().map_err(SyncError::signaling)?.ip(),
        };
        let advertised = SocketAddr::new(ip, port);

        let registration = conn
            .register(&id.token(), advertised)
            .await
            .map_err(|e| SyncError::signaling(format!("registration failed: {e}")))?;
        info!(rendezvous_id = %id, addr = %advertised, "waiting for guest");

        Ok(TcpSessionListener {
            id,
            listener,
            registration,
            config: self.config.clone(),
        })
    }

    async fn join_session(&self, id: &RendezvousId) -> SyncResult<Session> {
        let addr = self
            .client
            .lookup(&id.token())
            .await
            .map_err(|e| SyncError::connection(format!("rendezvous lookup failed: {e}")))?
            .ok_or_else(|| SyncError::connection(format!("no host is waiting for {id}")))?;

        let stream = TcpStream::connect(addr)
            .await
            .map_err(|e| SyncError::connection(format!("cannot reach host at {addr}: {e}")))?;
        stream.set_nodelay(true).map_err(SyncError::connection)?;
        debug!(rendezvous_id = %id, %addr, "connected to host");

        stream_session(stream, id, SyncRole::Guest, &self.config)
    }
}

/// A registered host waiting for its guest.
#[derive(Debug)]
pub struct TcpSessionListener {
    id: RendezvousId,
    listener: TcpListener,
    registration: Registration,
    config: TcpTransportConfig,
}

impl TcpSessionListener {
    /// Returns the address guests connect to.
    pub fn local_addr(&self) -> SyncResult<SocketAddr> {
        self.listener.local_addr().map_err(SyncError::transport)
    }
}

impl SessionListener for TcpSessionListener {
    fn rendezvous_id(&self) -> &RendezvousId {
        &self.id
    }

    async fn accept(self) -> SyncResult<Session> {
        let TcpSessionListener {
            id,
            listener,
            mut registration,
            config,
        } = self;
        let (sealer, mut opener) = session_ciphers(&id, SyncRole::Host)?;

        loop {
            let (mut stream, peer) = tokio::select! {
                accepted = listener.accept() => accepted
                    .map_err(|e| SyncError::transport(format!("accept failed: {e}")))?,
                _ = registration.closed() => {
                    return Err(SyncError::signaling("rendezvous service dropped the registration"));
                }
            };
            match first_frame(&mut stream, &mut opener, &config).await {
                Ok(first) => {
                    drop(registration);
                    stream.set_nodelay(true).map_err(SyncError::transport)?;
                    debug!(rendezvous_id = %id, %peer, "guest connected");
                    return Ok(spawn_session(stream, sealer, opener, Some(first), &config));
                }
                Err(e) => warn!(%peer, error = %e, "dropped connection from a stranger"),
            }
        }
    }
}

/// Reads and opens the first frame of a new connection. Only the guest
/// holds the keys, so a stray connection fails here.
async fn first_frame(
    stream: &mut TcpStream,
    opener: &mut FrameOpener,
    config: &TcpTransportConfig,
) -> SyncResult<Vec<u8>> {
    let read = read_frame(stream, config.max_frame_bytes);
    let frame = tokio::time::timeout(config.handshake_timeout, read)
        .await
        .map_err(|_| SyncError::transport("no frame before the handshake timeout"))?
        .map_err(SyncError::transport)?
        .ok_or_else(|| SyncError::transport("connection closed before its first frame"))?;
    opener.open(&frame)
}

fn stream_session(
    stream: TcpStream,
    id: &RendezvousId,
    role: SyncRole,
    config: &TcpTransportConfig,
) -> SyncResult<Session> {
    let (sealer, opener) = session_ciphers(id, role)?;
    Ok(spawn_session(stream, sealer, opener, None, config))
}

fn spawn_session(
    stream: TcpStream,
    sealer: FrameSealer,
    opener: FrameOpener,
    first: Option<Vec<u8>>,
    config: &TcpTransportConfig,
) -> Session {
    let (session, io) = Session::channel(config.channel_capacity);
    let (reader, writer) = stream.into_split();

    tokio::spawn(write_loop(writer, sealer, io.outbound, io.closed.clone()));
    tokio::spawn(read_loop(
        reader,
        opener,
        first,
        io.inbound,
        io.closed,
        config.max_frame_bytes,
    ));
    session
}

/// Writes outbound frames, acknowledging each once it is on the socket.
/// After a failed write every later send fails too.
async fn write_loop(
    mut writer: OwnedWriteHalf,
    mut sealer: FrameSealer,
    mut outbound: mpsc::Receiver<Outbound>,
    mut closed: ClosedSignal,
) {
    loop {
        tokio::select! {
            biased;
            next = outbound.recv() => match next {
                Some(next) => {
                    if !write_acked(&mut writer, &mut sealer, next).await {
                        return;
                    }
                }
                None => break,
            },
            _ = closed.wait() => {
                while let Ok(next) = outbound.try_recv() {
                    if !write_acked(&mut writer, &mut sealer, next).await {
                        return;
                    }
                }
                break;
            }
        }
    }
    let _ = writer.shutdown().await;
}

async fn write_acked(
    writer: &mut OwnedWriteHalf,
    sealer: &mut FrameSealer,
    outbound: Outbound,
) -> bool {
    match write_sealed(writer, sealer, &outbound.bytes).await {
        Ok(()) => {
            outbound.delivered();
            true
        }
        Err(e) => {
            warn!(error = %e, "session write failed");
            outbound.failed(e.detail());
            false
        }
    }
}

async fn write_sealed(
    writer: &mut OwnedWriteHalf,
    sealer: &mut FrameSealer,
    bytes: &[u8],
) -> SyncResult<()> {
    let sealed = sealer.seal(bytes)?;
    write_frame(writer, &sealed)
        .await
        .map_err(SyncError::transport)
}

async fn read_loop(
    mut reader: OwnedReadHalf,
    mut opener: FrameOpener,
    first: Option<Vec<u8>>,
    events: mpsc::Sender<SessionEvent>,
    mut closed: ClosedSignal,
    max_frame_bytes: usize,
) {
    if let Some(bytes) = first {
        if events.send(SessionEvent::Data(bytes)).await.is_err() {
            return;
        }
    }
    loop {
        let frame = tokio::select! {
            frame = read_frame(&mut reader, max_frame_bytes) => frame,
            _ = closed.wait() => return,
        };
        let event = match frame {
            Ok(Some(sealed)) => match opener.open(&sealed) {
                Ok(bytes) => SessionEvent::Data(bytes),
                Err(e) => SessionEvent::Failed(e.detail()),
            },
            Ok(None) => SessionEvent::Closed,
            Err(e) => SessionEvent::Failed(format!("session read failed: {e}")),
        };
        let last = !matches!(event, SessionEvent::Data(_));
        if events.send(event).await.is_err() || last {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults() {
        let config = TcpTransportConfig::new("127.0.0.1:7410");
        assert_eq!(config.bind_addr, IpAddr::V4(Ipv4Addr::UNSPECIFIED));
        assert_eq!(config.advertise_addr, None);
        assert_eq!(config.handshake_timeout, Duration::from_secs(5));
        assert_eq!(config.max_frame_bytes, DEFAULT_MAX_PAYLOAD_BYTES + TAG_SIZE);
    }

    #[test]
    fn config_builder() {
        let loopback = IpAddr::V4(Ipv4Addr::LOCALHOST);
        let config = TcpTransportConfig::new("127.0.0.1:7410")
            .with_bind_addr(loopback)
            .with_advertise_addr(loopback)
            .with_channel_capacity(2)
            .with_max_payload_bytes(100);
        assert_eq!(config.bind_addr, loopback);
        assert_eq!(config.advertise_addr, Some(loopback));
        assert_eq!(config.channel_capacity, 2);
        assert_eq!(config.max_frame_bytes, 100 + TAG_SIZE);
    }

    #[tokio::test]
    async fn sealed_stream_pair_exchanges_bytes() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let config = TcpTransportConfig::new("unused:0");
        let id = RendezvousId::parse("shadow-dex-ab12cd34").unwrap();

        let (guest_stream, accepted) =
            tokio::join!(TcpStream::connect(addr), listener.accept());
        let (host_stream, _) = accepted.unwrap();
        let mut host = stream_session(host_stream, &id, SyncRole::Host, &config).unwrap();
        let mut guest = stream_session(guest_stream.unwrap(), &id, SyncRole::Guest, &config).unwrap();

        host.send(b"notes".to_vec()).await.unwrap();
        assert_eq!(guest.recv().await, SessionEvent::Data(b"notes".to_vec()));
        guest.send(b"more notes".to_vec()).await.unwrap();
        assert_eq!(host.recv().await, SessionEvent::Data(b"more notes".to_vec()));

        host.close();
        assert_eq!(guest.recv().await, SessionEvent::Closed);
    }

    #[tokio::test]
    async fn mismatched_ids_fail_the_session() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let config = TcpTransportConfig::new("unused:0");

        let (guest_stream, accepted) =
            tokio::join!(TcpStream::connect(addr), listener.accept());
        let (host_stream, _) = accepted.unwrap();
        let host_id = RendezvousId::parse("shadow-dex-aaaaaaaa").unwrap();
        let guest_id = RendezvousId::parse("shadow-dex-bbbbbbbb").unwrap();
        let host = stream_session(host_stream, &host_id, SyncRole::Host, &config).unwrap();
        let mut guest =
            stream_session(guest_stream.unwrap(), &guest_id, SyncRole::Guest, &config).unwrap();

        host.send(b"notes".to_vec()).await.unwrap();
        assert!(matches!(guest.recv().await, SessionEvent::Failed(_)));
    }
}
