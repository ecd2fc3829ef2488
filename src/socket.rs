//! Raw socket acquisition, send, and flow-filtered receive (spec §4.5).

use crate::error::{ProbeError, ProbeResult};
use crate::headers::{ip_dst, ip_src, tcp_dest_port, tcp_source_port, SegmentBuffer};
use crate::state::{is_for_flow, Endpoint};
use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use std::mem::MaybeUninit;
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

const RECV_TIMEOUT: Duration = Duration::from_secs(10);

/// One IPv4 raw TCP socket with header-included send mode and a
/// receive timeout, as used by every probe in this engine.
pub struct RawSocket {
    socket: Socket,
}

impl RawSocket {
    /// Acquires a `SOCK_RAW` socket for `IPPROTO_TCP`, enables
    /// `IP_HDRINCL`, and sets `SO_RCVTIMEO` to 10s (spec §4.5, §6).
    pub fn new() -> ProbeResult<Self> {
        let socket = Socket::new(Domain::IPV4, Type::RAW, Some(Protocol::TCP))
            .map_err(ProbeError::from)?;
        socket.set_header_included_v4(true).map_err(ProbeError::from)?;
        socket.set_read_timeout(Some(RECV_TIMEOUT)).map_err(ProbeError::from)?;
        Ok(Self { socket })
    }

    /// Transmits exactly the first `len` bytes of `seg` to `dst`, no
    /// retry (spec §4.5).
    pub fn send(&self, seg: &SegmentBuffer, len: usize, dst: std::net::Ipv4Addr) -> ProbeResult<()> {
        let addr = SockAddr::from(SocketAddr::new(dst.into(), 0));
        self.socket
            .send_to(&seg.as_slice()[..len], &addr)
            .map_err(|e| {
                debug!(error = %e, "send_to failed");
                ProbeError::SendError
            })?;
        Ok(())
    }

    /// Reads segments until one matches `(expected_src, expected_dst)`
    /// or the overall 10s wall-clock deadline (measured from this
    /// call) elapses (spec §4.5).
    pub fn recv_one(
        &self,
        seg: &mut SegmentBuffer,
        expected_src: Endpoint,
        expected_dst: Endpoint,
    ) -> ProbeResult<usize> {
        let deadline = Instant::now() + RECV_TIMEOUT;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                warn!(kind = "timeout", "recv_one deadline elapsed");
                return Err(ProbeError::ReceiveError);
            }
            self.socket
                .set_read_timeout(Some(remaining))
                .map_err(ProbeError::from)?;

            let n = match self.socket.recv(as_uninit_mut(seg.as_mut_slice())) {
                Ok(n) => n,
                Err(e) if is_timeout(&e) => {
                    warn!(kind = "timeout", "recv_one timed out");
                    return Err(ProbeError::ReceiveError);
                }
                Err(e) => return Err(ProbeError::from(e)),
            };

            let buf = seg.as_slice();
            let src = Endpoint::new(ip_src(buf), tcp_source_port(buf));
            let dst = Endpoint::new(ip_dst(buf), tcp_dest_port(buf));
            if is_for_flow(src, dst, expected_src, expected_dst) {
                return Ok(n);
            }
            debug!(?src, ?dst, "discarding out-of-flow segment");
        }
    }
}

fn is_timeout(err: &std::io::Error) -> bool {
    matches!(
        err.kind(),
        std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
    )
}

/// Views an initialized `&mut [u8]` as `&mut [MaybeUninit<u8>]` for
/// `socket2::Socket::recv`. Sound because `MaybeUninit<u8>` and `u8`
/// share layout and every `u8` is already a valid `MaybeUninit<u8>`.
fn as_uninit_mut(buf: &mut [u8]) -> &mut [MaybeUninit<u8>] {
    unsafe { &mut *(buf as *mut [u8] as *mut [MaybeUninit<u8>]) }
}
