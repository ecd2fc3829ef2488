//! TCP option appender (spec §4.4).

use crate::error::{ProbeError, ProbeResult};
use crate::headers::{
    option_bytes, payload_len, recompute_checksum, set_ip_total_len, SegmentBuffer, IP_HDR_LEN,
    OPTIONS_OFFSET, TCP_HDR_LEN,
};

/// Kinds of options the engine knows how to append. Each carries its
/// RFC-assigned kind byte and total on-wire length (kind + length +
/// data bytes).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionKind {
    /// RFC 2018: kind 4, length 2, no data.
    SackPermitted,
    /// RFC 7323: kind 8, length 10, 8 bytes of data (TSval || TSecr).
    Timestamp,
}

impl OptionKind {
    fn kind_byte(self) -> u8 {
        match self {
            OptionKind::SackPermitted => 4,
            OptionKind::Timestamp => 8,
        }
    }

    fn total_len(self) -> usize {
        match self {
            OptionKind::SackPermitted => 2,
            OptionKind::Timestamp => 10,
        }
    }
}

const TCP_NOP: u8 = 1;
/// 60-byte TCP header limit: `doff` is a 4-bit word count (spec §4.4).
const MAX_DOFF_WORDS: u8 = 15;

/// Appends one TCP option immediately after the current last option,
/// shifting any existing payload rightward, updating `doff` and IP
/// total length, and recomputing the checksum (spec §4.4).
///
/// `data` must be exactly `kind.total_len() - 2` bytes (the option's
/// data portion, excluding its own kind/length bytes).
pub fn append_option(seg: &mut SegmentBuffer, kind: OptionKind, data: &[u8]) -> ProbeResult<()> {
    let opt_len = kind.total_len();
    debug_assert_eq!(data.len(), opt_len - 2);

    let buf = seg.as_mut_slice();
    let old_option_bytes = option_bytes(buf);
    let old_payload_len = payload_len(buf);
    let old_payload_start = OPTIONS_OFFSET + old_option_bytes;

    let mut payload_copy = vec![0u8; old_payload_len];
    payload_copy.copy_from_slice(&buf[old_payload_start..old_payload_start + old_payload_len]);

    let new_unpadded = old_option_bytes + opt_len;
    let padded_option_bytes = new_unpadded.div_ceil(4) * 4;
    let new_doff_words = (TCP_HDR_LEN + padded_option_bytes) / 4;
    if new_doff_words > MAX_DOFF_WORDS as usize {
        return Err(ProbeError::OptionsTooLong);
    }

    buf[old_payload_start] = kind.kind_byte();
    buf[old_payload_start + 1] = opt_len as u8;
    buf[old_payload_start + 2..old_payload_start + opt_len].copy_from_slice(data);
    for i in old_option_bytes + opt_len..padded_option_bytes {
        buf[OPTIONS_OFFSET + i] = TCP_NOP;
    }

    let new_payload_start = OPTIONS_OFFSET + padded_option_bytes;
    buf[new_payload_start..new_payload_start + old_payload_len].copy_from_slice(&payload_copy);

    crate::headers::set_tcp_doff_words(buf, new_doff_words as u8);
    let new_total_len = (IP_HDR_LEN + TCP_HDR_LEN + padded_option_bytes + old_payload_len) as u16;
    set_ip_total_len(buf, new_total_len);
    recompute_checksum(buf);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headers::{build_data, build_syn, ip_total_len, payload, tcp_doff_words};
    use crate::state::Endpoint;
    use std::net::Ipv4Addr;

    fn endpoints() -> (Endpoint, Endpoint) {
        (
            Endpoint::new(Ipv4Addr::new(10, 0, 0, 1), 1234),
            Endpoint::new(Ipv4Addr::new(10, 0, 0, 2), 80),
        )
    }

    #[test]
    fn sack_permitted_sets_doff_and_checksum() {
        let (src, dst) = endpoints();
        let mut seg = SegmentBuffer::new();
        build_syn(&mut seg, src, dst, 1, 0, 0, 0);
        append_option(&mut seg, OptionKind::SackPermitted, &[]).unwrap();
        let buf = seg.as_slice();
        assert_eq!(tcp_doff_words(buf), 6); // 20 + 4 padded to 4 = 24 bytes = 6 words
        assert_eq!(ip_total_len(buf) as usize, IP_HDR_LEN + 24);
    }

    #[test]
    fn timestamp_option_preserves_payload_contiguity() {
        let (src, dst) = endpoints();
        let mut seg = SegmentBuffer::new();
        build_data(&mut seg, src, dst, 1, 1, 0, b"HELLO").unwrap();
        let ts = [0u8; 8];
        append_option(&mut seg, OptionKind::Timestamp, &ts).unwrap();
        assert_eq!(payload(seg.as_slice()), b"HELLO");
    }

    #[test]
    fn appending_past_60_bytes_fails() {
        let (src, dst) = endpoints();
        let mut seg = SegmentBuffer::new();
        build_syn(&mut seg, src, dst, 1, 0, 0, 0);
        // Each 10-byte timestamp option pads to 12 bytes; three fit
        // within the 60-byte header limit (doff=14), a fourth doesn't.
        for _ in 0..3 {
            append_option(&mut seg, OptionKind::Timestamp, &[0u8; 8]).unwrap();
        }
        let result = append_option(&mut seg, OptionKind::Timestamp, &[0u8; 8]);
        assert_eq!(result, Err(ProbeError::OptionsTooLong));
    }
}
