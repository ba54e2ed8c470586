//! Host and join commands.

use super::CliResult;
use shadowdex_core::Database;
use shadowdex_sync_engine::{
    SyncConfig, SyncEngine, SyncReport, SyncResult, TcpTransport, TcpTransportConfig,
};
use std::net::IpAddr;
use std::sync::Arc;
use tokio::runtime::Runtime;
use tracing::{info, warn};

/// Builds the TCP transport configuration from command-line options.
pub fn transport_config(
    rendezvous: &str,
    advertise: Option<IpAddr>,
    bind: Option<IpAddr>,
) -> TcpTransportConfig {
    let mut config = TcpTransportConfig::new(rendezvous);
    if let Some(addr) = bind {
        config = config.with_bind_addr(addr);
    }
    if let Some(addr) = advertise {
        config = config.with_advertise_addr(addr);
    }
    config
}

/// Publishes a rendezvous id and syncs with the device that joins it.
pub fn host(db: Database, transport: TcpTransportConfig) -> CliResult<()> {
    let runtime = runtime()?;
    runtime.block_on(async {
        let engine = engine(db, transport);
        let id = engine.start_hosting().await?;
        println!("Rendezvous id: {id}");
        println!("On the other device run: shadowdex join {id} --rendezvous <addr>");
        finish(&engine).await
    })
}

/// Joins the host waiting at `id` and syncs.
pub fn join(db: Database, transport: TcpTransportConfig, id: &str) -> CliResult<()> {
    let runtime = runtime()?;
    runtime.block_on(async {
        let engine = engine(db, transport);
        engine.connect_to_host(id).await?;
        println!("Connecting to {id}...");
        finish(&engine).await
    })
}

fn runtime() -> CliResult<Runtime> {
    Ok(tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?)
}

fn engine(db: Database, transport: TcpTransportConfig) -> SyncEngine<TcpTransport> {
    SyncEngine::new(
        Arc::new(db),
        TcpTransport::new(transport),
        SyncConfig::default(),
    )
}

/// Waits for the session, cancelling on Ctrl-C.
async fn finish(engine: &SyncEngine<TcpTransport>) -> CliResult<()> {
    let outcome: SyncResult<SyncReport> = tokio::select! {
        outcome = engine.wait_for_completion() => outcome,
        _ = tokio::signal::ctrl_c() => {
            warn!("interrupted");
            engine.cancel();
            engine.wait_for_completion().await
        }
    };

    let report = outcome?;
    info!(role = ?report.role, "sync complete");
    println!("{}", summary(&report));

    // Let the peer drain our payload before the session closes.
    tokio::time::sleep(engine.config().linger).await;
    engine.reset()?;
    Ok(())
}

fn summary(report: &SyncReport) -> String {
    format!(
        "Synced: sent {}, received {} new, {} updated, {} unchanged",
        report.sent, report.inserted, report.replaced, report.kept
    )
}
