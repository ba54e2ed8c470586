//! Rendezvous service command.

use super::CliResult;
use shadowdex_rendezvous::{RendezvousServer, ServerConfig};
use std::net::SocketAddr;
use tracing::info;

/// Runs a rendezvous service until interrupted.
pub fn run(bind: SocketAddr, max_registrations: usize) -> CliResult<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async {
        let config = ServerConfig::new(bind).with_max_registrations(max_registrations);
        let server = RendezvousServer::bind(config).await?;
        let addr = server.local_addr()?;
        info!(%addr, max_registrations, "rendezvous service listening");
        println!("Rendezvous service listening on {addr}");

        tokio::select! {
            result = server.run() => result?,
            _ = tokio::signal::ctrl_c() => info!("shutting down"),
        }
        Ok(())
    })
}
