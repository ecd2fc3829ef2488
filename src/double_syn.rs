//! Concurrent two-worker handshake scenario (spec §4.9 "double_syn",
//! §5 "Parallel handshake probe", §9 "second handshake" open question).
//!
//! Two workers open independent flows to the same peer over one
//! shared raw socket, using consecutive source ports. Each worker owns
//! its own [`SegmentBuffer`] and [`ConnState`] — unlike the source this
//! is grounded on, which assigns the second worker's (still zeroed)
//! state onto the first worker's struct before spawning (spec §9:
//! "this appears to be a bug... do not reproduce it").

use crate::error::{ProbeError, Verdict};
use crate::handshake;
use crate::headers::{build_ack, SegmentBuffer};
use crate::pipeline::{add_syn_extras, dummy};
use crate::socket::RawSocket;
use crate::state::{ConnState, Endpoint};
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

fn worker(socket: Arc<RawSocket>, src: Endpoint, dst: Endpoint, local_isn: u32) -> Option<(SegmentBuffer, ConnState)> {
    let mut seg = SegmentBuffer::new();
    let mut state = ConnState::new();
    match handshake::open(
        &socket,
        &mut seg,
        src,
        dst,
        &mut state,
        local_isn,
        &add_syn_extras(0, 0, 0),
        &dummy(),
    ) {
        Ok(()) => Some((seg, state)),
        Err(e) => {
            warn!(error = %e, ?src, "double_syn worker handshake failed");
            None
        }
    }
}

/// Runs two handshakes from `src_port` and `src_port + 1` concurrently
/// over one raw socket, then — after a 10s pause — sends a zero-window
/// ACK on the first flow as an implicit reset (spec §4.9 "double_syn").
pub fn run_double_syn(src_ip: Ipv4Addr, src_port: u16, dst_ip: Ipv4Addr, dst_port: u16) -> Verdict {
    let socket = match RawSocket::new() {
        Ok(s) => Arc::new(s),
        Err(e) => {
            warn!(error = %e, "failed to acquire raw socket");
            return Verdict::TestFailed;
        }
    };
    let dst = Endpoint::new(dst_ip, dst_port);
    let src1 = Endpoint::new(src_ip, src_port);
    let src2 = Endpoint::new(src_ip, src_port.wrapping_add(1));

    let (result1, result2) = std::thread::scope(|scope| {
        let socket1 = Arc::clone(&socket);
        let socket2 = Arc::clone(&socket);
        let handle1 = scope.spawn(move || worker(socket1, src1, dst, 0x1000_0000));
        let handle2 = scope.spawn(move || worker(socket2, src2, dst, 0x2000_0000));
        (handle1.join(), handle2.join())
    });

    let (mut seg1, state1) = match result1 {
        Ok(Some(v)) => v,
        _ => {
            warn!("double_syn: first handshake failed or panicked");
            return Verdict::TestFailed;
        }
    };
    if !matches!(result2, Ok(Some(_))) {
        warn!("double_syn: second handshake failed or panicked");
        return Verdict::TestFailed;
    }

    info!("double_syn: both handshakes established, sleeping 10s before reset");
    std::thread::sleep(Duration::from_secs(10));

    build_ack(&mut seg1, src1, dst, state1.seq_local, state1.seq_remote);
    crate::headers::set_tcp_window_for_reset(&mut seg1);
    let len = crate::headers::ip_total_len(seg1.as_slice()) as usize;
    if let Err(e) = socket.send(&seg1, len, dst.addr).map_err(|_| ProbeError::AckError) {
        warn!(error = %e, "double_syn: zero-window ACK send failed");
        return Verdict::TestFailed;
    }

    std::thread::sleep(Duration::from_secs(5));
    info!("double_syn complete");
    Verdict::TestComplete
}
