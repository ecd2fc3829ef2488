//! Reversed-payload echo peer (spec §6 "Peer contract" (a)/(b)):
//! completes the handshake via the kernel TCP stack and echoes the
//! byte-reverse of the first payload it reads on each connection.
//!
//! Lives in the library (not just `src/bin/echo_peer.rs`) so the
//! integration tests under `tests/` can drive a scenario against a
//! real loopback listener without a separate process.

use std::net::SocketAddr;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{error, info};

/// Reads from `socket` in a loop, replying to each read with the
/// byte-reversed payload, until the peer closes the connection.
pub async fn handle_connection(mut socket: TcpStream, addr: SocketAddr) {
    let mut buffer = [0u8; 4096];
    loop {
        let n = match socket.read(&mut buffer).await {
            Ok(0) => {
                info!(%addr, "connection closed");
                return;
            }
            Ok(n) => n,
            Err(e) => {
                error!(%addr, error = %e, "read failed");
                return;
            }
        };

        let mut reply = buffer[..n].to_vec();
        reply.reverse();
        info!(%addr, length = n, "echoing reversed payload");
        if let Err(e) = socket.write_all(&reply).await {
            error!(%addr, error = %e, "write failed");
            return;
        }
    }
}

/// Accepts connections on `listener` forever, spawning
/// [`handle_connection`] for each one.
pub async fn serve(listener: TcpListener) -> std::io::Result<()> {
    loop {
        let (socket, addr) = listener.accept().await?;
        tokio::spawn(handle_connection(socket, addr));
    }
}
