//! TCP accept loop.

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::frame_io::{read_frame, write_frame};
use crate::handler::{ConnectionId, RequestHandler};
use crate::registry::Registry;
use shadowdex_sync_protocol::{ControlRequest, ControlResponse, MAX_CONTROL_FRAME};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// The rendezvous service.
///
/// # Example
///
/// ```no_run
/// use shadowdex_rendezvous::{RendezvousServer, ServerConfig};
///
/// # async fn run() -> shadowdex_rendezvous::ServerResult<()> {
/// let server = RendezvousServer::bind(ServerConfig::default()).await?;
/// println!("listening on {}", server.local_addr()?);
/// server.run().await
/// # }
/// ```
pub struct RendezvousServer {
    config: ServerConfig,
    listener: TcpListener,
    handler: Arc<RequestHandler>,
    next_conn: AtomicU64,
}

impl RendezvousServer {
    /// Binds the configured address.
    pub async fn bind(config: ServerConfig) -> ServerResult<Self> {
        let listener = TcpListener::bind(config.bind_addr).await?;
        let registry = Arc::new(Registry::new(config.max_registrations));
        Ok(Self {
            config,
            listener,
            handler: Arc::new(RequestHandler::new(registry)),
            next_conn: AtomicU64::new(1),
        })
    }

    /// Returns the bound address.
    pub fn local_addr(&self) -> ServerResult<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Returns the request handler.
    pub fn handler(&self) -> &Arc<RequestHandler> {
        &self.handler
    }

    /// Serves connections until the task is dropped.
    pub async fn run(self) -> ServerResult<()> {
        info!(addr = %self.local_addr()?, "rendezvous service listening");
        loop {
            let (stream, peer) = match self.listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    warn!(error = %e, "accept failed");
                    continue;
                }
            };
            let conn = self.next_conn.fetch_add(1, Ordering::Relaxed);
            let handler = Arc::clone(&self.handler);
            let config = self.config.clone();
            tokio::spawn(async move {
                debug!(conn, %peer, "control connection opened");
                if let Err(e) = serve_connection(&handler, &config, conn, stream).await {
                    debug!(conn, error = %e, "control connection ended with error");
                }
                handler.connection_closed(conn);
            });
        }
    }

    /// Runs the service on a background task.
    pub fn spawn(self) -> ServerResult<ServerHandle> {
        let addr = self.local_addr()?;
        let handler = Arc::clone(&self.handler);
        let task = tokio::spawn(self.run());
        Ok(ServerHandle {
            addr,
            handler,
            task,
        })
    }
}

/// A rendezvous service running in the background. Stops on drop.
pub struct ServerHandle {
    addr: SocketAddr,
    handler: Arc<RequestHandler>,
    task: JoinHandle<ServerResult<()>>,
}

impl ServerHandle {
    /// Returns the address the service listens on.
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Returns the number of hosts currently registered.
    pub fn registrations(&self) -> usize {
        self.handler.registry().len()
    }

    /// Stops accepting connections.
    pub fn shutdown(&self) {
        self.task.abort();
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn serve_connection(
    handler: &RequestHandler,
    config: &ServerConfig,
    conn: ConnectionId,
    mut stream: TcpStream,
) -> ServerResult<()> {
    let mut registered = false;
    loop {
        let frame = if registered {
            read_frame(&mut stream, MAX_CONTROL_FRAME).await?
        } else {
            tokio::time::timeout(
                config.request_timeout,
                read_frame(&mut stream, MAX_CONTROL_FRAME),
            )
            .await
            .map_err(|_| ServerError::Timeout)??
        };
        let Some(frame) = frame else {
            return Ok(());
        };

        let response = match ControlRequest::decode(&frame) {
            Ok(request @ ControlRequest::Register { .. }) if registered => {
                debug!(conn, ?request, "second registration on one connection");
                ControlResponse::rejected("connection already holds a registration")
            }
            Ok(request) => handler.handle(conn, request),
            Err(e) => ControlResponse::rejected(format!("malformed request: {e}")),
        };
        registered |= response == ControlResponse::Registered;
        write_frame(&mut stream, &response.encode()?).await?;
    }
}
