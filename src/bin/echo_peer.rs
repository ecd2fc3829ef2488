//! CLI entry point for the cooperating echo peer (spec §6 "Peer
//! contract"). The connection-handling logic lives in
//! [`raw_tcp_probe::echo`] so the integration tests under `tests/` can
//! reuse it directly over a loopback listener instead of spawning a
//! separate process.
//!
//! Implements only the required byte-reverse echo (§6(b)); the
//! optional covert-value reveal replies in §6(c) are not implemented
//! here. `run_ack_only`, `run_urg_only`, `run_urg_synack_only`, and
//! `run_urg_urg` in `scenarios.rs` depend on a peer that reveals the
//! covert SYN/SYN-ACK value instead of reversing the payload, and will
//! not reach `test_complete` against this one.

use raw_tcp_probe::echo::serve;
use std::io;
use tokio::net::TcpListener;
use tracing::info;

fn bind_addr() -> String {
    std::env::var("RTP_ECHO_BIND").unwrap_or_else(|_| "127.0.0.1:8080".to_string())
}

#[tokio::main]
async fn main() -> io::Result<()> {
    tracing_subscriber::fmt::init();

    let bind = bind_addr();
    let listener = TcpListener::bind(&bind).await?;
    info!(%bind, "echo peer listening");
    serve(listener).await
}
