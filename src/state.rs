//! Connection state and endpoint types (spec §3).

use std::net::Ipv4Addr;

/// A (IPv4 address, port) pair. Frozen once constructed; the wire
/// representation is big-endian but callers work in host order
/// throughout, matching the teacher's builder API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Endpoint {
    pub addr: Ipv4Addr,
    pub port: u16,
}

impl Endpoint {
    pub fn new(addr: Ipv4Addr, port: u16) -> Self {
        Self { addr, port }
    }
}

/// Per-probe connection state, created zeroed at socket setup,
/// mutated by the handshake and each data step, dropped when the
/// probe returns (spec §3).
#[derive(Debug, Clone, Copy, Default)]
pub struct ConnState {
    pub seq_local: u32,
    pub seq_remote: u32,
    pub rcv_tsval: u32,
    pub ts_recent: u32,
    pub doff_words: u8,
}

impl ConnState {
    pub fn new() -> Self {
        Self {
            doff_words: 5,
            ..Default::default()
        }
    }
}

/// True iff `src`→`dst` on the wire match `expected_src`→`expected_dst`
/// exactly — source address, destination address, source port, and
/// destination port (spec §3 invariant "A segment is 'for this flow'").
pub fn is_for_flow(src: Endpoint, dst: Endpoint, expected_src: Endpoint, expected_dst: Endpoint) -> bool {
    src == expected_src && dst == expected_dst
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conn_state_starts_zeroed() {
        let state = ConnState::new();
        assert_eq!(state.seq_local, 0);
        assert_eq!(state.seq_remote, 0);
        assert_eq!(state.doff_words, 5);
    }

    #[test]
    fn flow_match_requires_all_four_fields() {
        let a = Endpoint::new(Ipv4Addr::new(1, 2, 3, 4), 100);
        let b = Endpoint::new(Ipv4Addr::new(5, 6, 7, 8), 200);
        let b_wrong_port = Endpoint::new(Ipv4Addr::new(5, 6, 7, 8), 201);

        assert!(is_for_flow(a, b, a, b));
        assert!(!is_for_flow(a, b_wrong_port, a, b));
    }
}
