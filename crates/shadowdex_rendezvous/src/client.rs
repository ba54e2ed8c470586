//! Rendezvous client.

use crate::error::{ServerError, ServerResult};
use crate::frame_io::{read_frame, write_frame};
use shadowdex_sync_protocol::{
    ControlRequest, ControlResponse, RendezvousToken, MAX_CONTROL_FRAME,
};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;

/// Connects to a rendezvous service.
#[derive(Debug, Clone)]
pub struct RendezvousClient {
    addr: String,
    timeout: Duration,
}

impl RendezvousClient {
    /// Creates a client for the service at `addr` (`host:port`).
    pub fn new(addr: impl Into<String>, timeout: Duration) -> Self {
        Self {
            addr: addr.into(),
            timeout,
        }
    }

    /// Returns the service address.
    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Opens a control connection.
    pub async fn connect(&self) -> ServerResult<ControlConnection> {
        let stream = tokio::time::timeout(self.timeout, TcpStream::connect(&self.addr))
            .await
            .map_err(|_| ServerError::Timeout)??;
        stream.set_nodelay(true)?;
        Ok(ControlConnection {
            stream,
            timeout: self.timeout,
        })
    }

    /// Looks up the host registered under `token`.
    pub async fn lookup(&self, token: &RendezvousToken) -> ServerResult<Option<SocketAddr>> {
        let mut conn = self.connect().await?;
        conn.lookup(token).await
    }
}

/// An open control connection.
#[derive(Debug)]
pub struct ControlConnection {
    stream: TcpStream,
    timeout: Duration,
}

impl ControlConnection {
    /// Returns the local end of the connection.
    ///
    /// Its IP is the interface that reaches the service, which is usually
    /// the one a peer on the same network can reach too.
    pub fn local_addr(&self) -> ServerResult<SocketAddr> {
        Ok(self.stream.local_addr()?)
    }

    /// Sends a request and waits for its response.
    pub async fn request(&mut self, request: &ControlRequest) -> ServerResult<ControlResponse> {
        tokio::time::timeout(self.timeout, exchange(&mut self.stream, request))
            .await
            .map_err(|_| ServerError::Timeout)?
    }

    /// Registers a host and turns the connection into its registration.
    pub async fn register(
        mut self,
        token: &RendezvousToken,
        addr: SocketAddr,
    ) -> ServerResult<Registration> {
        let request = ControlRequest::Register {
            token: token.as_str().to_string(),
            addr: addr.to_string(),
        };
        match self.request(&request).await? {
            ControlResponse::Registered => Ok(Registration { conn: self }),
            ControlResponse::Rejected { reason } => Err(ServerError::Rejected(reason)),
            other => Err(ServerError::UnexpectedResponse(format!("{other:?}"))),
        }
    }

    /// Looks up the host registered under `token`.
    pub async fn lookup(&mut self, token: &RendezvousToken) -> ServerResult<Option<SocketAddr>> {
        let request = ControlRequest::Lookup {
            token: token.as_str().to_string(),
        };
        match self.request(&request).await? {
            ControlResponse::Found { addr } => addr
                .parse()
                .map(Some)
                .map_err(|_| ServerError::UnexpectedResponse(format!("bad address {addr}"))),
            ControlResponse::NotFound => Ok(None),
            ControlResponse::Rejected { reason } => Err(ServerError::Rejected(reason)),
            other => Err(ServerError::UnexpectedResponse(format!("{other:?}"))),
        }
    }
}

async fn exchange(stream: &mut TcpStream, request: &ControlRequest) -> ServerResult<ControlResponse> {
    write_frame(stream, &request.encode()?).await?;
    match read_frame(stream, MAX_CONTROL_FRAME).await? {
        Some(frame) => Ok(ControlResponse::decode(&frame)?),
        None => Err(ServerError::ConnectionClosed),
    }
}

/// A live host registration. Dropping it withdraws the registration.
#[derive(Debug)]
pub struct Registration {
    conn: ControlConnection,
}

impl Registration {
    /// Returns the local end of the control connection.
    pub fn local_addr(&self) -> ServerResult<SocketAddr> {
        self.conn.local_addr()
    }

    /// Resolves when the service drops the connection.
    pub async fn closed(&mut self) {
        let mut buf = [0u8; 64];
        loop {
            match self.conn.stream.read(&mut buf).await {
                Ok(0) | Err(_) => return,
                Ok(_) => {}
            }
        }
    }
}
