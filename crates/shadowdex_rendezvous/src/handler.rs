//! Request handling, independent of the socket loop.

use crate::registry::Registry;
use shadowdex_sync_protocol::{ControlRequest, ControlResponse};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{debug, info};

/// Identifies a control connection.
pub type ConnectionId = u64;

/// Handles control requests against a shared registry.
pub struct RequestHandler {
    registry: Arc<Registry>,
}

impl RequestHandler {
    /// Creates a handler over a registry.
    pub fn new(registry: Arc<Registry>) -> Self {
        Self { registry }
    }

    /// Returns the registry.
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Handles one request from connection `conn`.
    pub fn handle(&self, conn: ConnectionId, request: ControlRequest) -> ControlResponse {
        match request {
            ControlRequest::Register { token, addr } => self.handle_register(conn, &token, &addr),
            ControlRequest::Lookup { token } => self.handle_lookup(&token),
        }
    }

    /// Drops the registrations held by a closed connection.
    pub fn connection_closed(&self, conn: ConnectionId) {
        let released = self.registry.release(conn);
        if released > 0 {
            info!(conn, "host registration released");
        }
    }

    fn handle_register(&self, conn: ConnectionId, token: &str, addr: &str) -> ControlResponse {
        if !is_token(token) {
            return ControlResponse::rejected("malformed token");
        }
        let addr: SocketAddr = match addr.parse() {
            Ok(addr) => addr,
            Err(_) => return ControlResponse::rejected("malformed address"),
        };
        match self.registry.register(token, addr, conn) {
            Ok(()) => {
                info!(conn, %addr, "host registered");
                ControlResponse::Registered
            }
            Err(reason) => ControlResponse::Rejected { reason },
        }
    }

    fn handle_lookup(&self, token: &str) -> ControlResponse {
        if !is_token(token) {
            return ControlResponse::rejected("malformed token");
        }
        match self.registry.lookup(token) {
            Some(addr) => {
                debug!(%addr, "lookup hit");
                ControlResponse::Found {
                    addr: addr.to_string(),
                }
            }
            None => ControlResponse::NotFound,
        }
    }
}

fn is_token(token: &str) -> bool {
    token.len() == 64 && token.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use shadowdex_sync_protocol::RendezvousId;

    fn handler() -> RequestHandler {
        RequestHandler::new(Arc::new(Registry::new(4)))
    }

    fn token() -> String {
        RendezvousId::parse("shadow-dex-ab12cd34")
            .unwrap()
            .token()
            .into_string()
    }

    #[test]
    fn register_then_lookup_then_release() {
        let handler = handler();
        let response = handler.handle(
            7,
            ControlRequest::Register {
                token: token(),
                addr: "10.0.0.5:4000".into(),
            },
        );
        assert_eq!(response, ControlResponse::Registered);

        let response = handler.handle(8, ControlRequest::Lookup { token: token() });
        assert_eq!(
            response,
            ControlResponse::Found {
                addr: "10.0.0.5:4000".into()
            }
        );

        handler.connection_closed(7);
        let response = handler.handle(8, ControlRequest::Lookup { token: token() });
        assert_eq!(response, ControlResponse::NotFound);
    }

    #[test]
    fn malformed_input_rejected() {
        let handler = handler();
        let response = handler.handle(
            1,
            ControlRequest::Register {
                token: "shadow-dex-ab12cd34".into(),
                addr: "10.0.0.5:4000".into(),
            },
        );
        assert!(matches!(response, ControlResponse::Rejected { .. }));

        let response = handler.handle(
            1,
            ControlRequest::Register {
                token: token(),
                addr: "somewhere".into(),
            },
        );
        assert!(matches!(response, ControlResponse::Rejected { .. }));
        assert!(handler.registry().is_empty());
    }
}
