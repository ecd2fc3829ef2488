//! Segment buffer and IPv4/TCP header builders (spec §3, §4.3).
//!
//! The segment buffer is a single contiguous region holding the IPv4
//! header, TCP header, options, and payload in place at fixed offsets
//! (IP header at byte 0, TCP header at byte 20, options/payload
//! starting at byte `20 + 20`). The engine never allocates per
//! segment — [`SegmentBuffer::new`] is the one allocation a probe
//! makes, reused for every transmit and receive.

use crate::checksum::tcp_checksum;
use crate::error::{ProbeError, ProbeResult};
use crate::flags::{res1_nibble, TcpFlags};
use crate::state::Endpoint;
use std::net::Ipv4Addr;

pub const IP_HDR_LEN: usize = 20;
pub const TCP_HDR_LEN: usize = 20;
/// At least 65,535 bytes per spec §3, with headroom past the largest
/// possible segment for the pseudo-header-aliasing trick in
/// [`crate::checksum::tcp_checksum`] (spec §9).
pub const BUF_CAPACITY: usize = 65535 + 16;
const IPPROTO_TCP: u8 = 6;

/// The single contiguous region a probe sends from and receives into.
pub struct SegmentBuffer {
    buf: Vec<u8>,
}

impl SegmentBuffer {
    pub fn new() -> Self {
        Self {
            buf: vec![0u8; BUF_CAPACITY],
        }
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.buf
    }

    /// Zeros the header-and-forward region (spec §4.8 step 3: "zero
    /// the buffer from the header forward" before re-emitting the
    /// base data segment template for the next step).
    pub fn zero_from_header(&mut self) {
        for b in self.buf.iter_mut() {
            *b = 0;
        }
    }
}

impl Default for SegmentBuffer {
    fn default() -> Self {
        Self::new()
    }
}

// ---- IPv4 header accessors (offsets 0..20) ----

pub fn ip_total_len(buf: &[u8]) -> u16 {
    u16::from_be_bytes([buf[2], buf[3]])
}

pub(crate) fn set_ip_total_len(buf: &mut [u8], len: u16) {
    buf[2..4].copy_from_slice(&len.to_be_bytes());
}

pub fn ip_src(buf: &[u8]) -> Ipv4Addr {
    Ipv4Addr::new(buf[12], buf[13], buf[14], buf[15])
}

pub fn ip_dst(buf: &[u8]) -> Ipv4Addr {
    Ipv4Addr::new(buf[16], buf[17], buf[18], buf[19])
}

fn set_ip_header(buf: &mut [u8], src: Ipv4Addr, dst: Ipv4Addr, total_len: u16) {
    buf[0] = (4 << 4) | 5; // version=4, IHL=5 (no IP options)
    buf[1] = 0; // DSCP/ECN
    set_ip_total_len(buf, total_len);
    buf[4..6].copy_from_slice(&0u16.to_be_bytes()); // identification
    buf[6..8].copy_from_slice(&0u16.to_be_bytes()); // flags/fragment offset
    buf[8] = 40; // TTL
    buf[9] = IPPROTO_TCP;
    buf[10..12].copy_from_slice(&0u16.to_be_bytes()); // IP checksum left to the kernel/NIC
    buf[12..16].copy_from_slice(&src.octets());
    buf[16..20].copy_from_slice(&dst.octets());
}

// ---- TCP header accessors (offsets 20..40, options/payload at 40..) ----

pub fn tcp_source_port(buf: &[u8]) -> u16 {
    u16::from_be_bytes([buf[20], buf[21]])
}

pub fn tcp_dest_port(buf: &[u8]) -> u16 {
    u16::from_be_bytes([buf[22], buf[23]])
}

pub fn tcp_seq(buf: &[u8]) -> u32 {
    u32::from_be_bytes(buf[24..28].try_into().unwrap())
}

pub fn tcp_ack_seq(buf: &[u8]) -> u32 {
    u32::from_be_bytes(buf[28..32].try_into().unwrap())
}

pub(crate) fn set_tcp_seq(buf: &mut [u8], seq: u32) {
    buf[24..28].copy_from_slice(&seq.to_be_bytes());
}

pub(crate) fn set_tcp_ack_seq(buf: &mut [u8], ack: u32) {
    buf[28..32].copy_from_slice(&ack.to_be_bytes());
}

pub fn tcp_doff_words(buf: &[u8]) -> u8 {
    buf[32] >> 4
}

pub fn set_tcp_doff_words(buf: &mut [u8], words: u8) {
    let res1 = buf[32] & 0x0F;
    buf[32] = (words << 4) | res1;
}

pub fn tcp_res1(buf: &[u8]) -> u8 {
    buf[32] & 0x0F
}

pub fn set_tcp_res1(buf: &mut [u8], res1: u8) {
    let doff = buf[32] & 0xF0;
    buf[32] = doff | res1_nibble(res1);
}

pub fn tcp_flags(buf: &[u8]) -> TcpFlags {
    TcpFlags::from_bits_truncate(buf[33])
}

pub fn set_tcp_flags(buf: &mut [u8], flags: TcpFlags) {
    buf[33] = flags.bits();
}

pub fn tcp_window(buf: &[u8]) -> u16 {
    u16::from_be_bytes([buf[34], buf[35]])
}

fn set_tcp_window(buf: &mut [u8], window: u16) {
    buf[34..36].copy_from_slice(&window.to_be_bytes());
}

pub fn tcp_checksum_field(buf: &[u8]) -> u16 {
    u16::from_be_bytes([buf[36], buf[37]])
}

fn set_tcp_checksum_field(buf: &mut [u8], check: u16) {
    buf[36..38].copy_from_slice(&check.to_be_bytes());
}

pub fn tcp_urg_ptr(buf: &[u8]) -> u16 {
    u16::from_be_bytes([buf[38], buf[39]])
}

pub(crate) fn set_tcp_urg_ptr(buf: &mut [u8], urg: u16) {
    buf[38..40].copy_from_slice(&urg.to_be_bytes());
}

/// Byte offset where TCP options (and, past them, the payload) begin.
pub const OPTIONS_OFFSET: usize = IP_HDR_LEN + TCP_HDR_LEN;

pub fn option_bytes(buf: &[u8]) -> usize {
    (tcp_doff_words(buf) as usize * 4).saturating_sub(TCP_HDR_LEN)
}

pub fn payload_len(buf: &[u8]) -> usize {
    let tot_len = ip_total_len(buf) as usize;
    tot_len.saturating_sub(IP_HDR_LEN + TCP_HDR_LEN + option_bytes(buf))
}

pub fn payload<'a>(buf: &'a [u8]) -> &'a [u8] {
    let start = OPTIONS_OFFSET + option_bytes(buf);
    &buf[start..start + payload_len(buf)]
}

/// Recomputes and writes the TCP checksum field for the segment
/// currently laid out in `buf` (header through payload, honoring
/// whatever `doff`/options/payload length are already set).
pub(crate) fn recompute_checksum(buf: &mut [u8]) {
    let src = ip_src(buf);
    let dst = ip_dst(buf);
    let tcp_len = (tcp_doff_words(buf) as usize * 4) + payload_len(buf);
    set_tcp_checksum_field(buf, 0);
    let check = tcp_checksum(&mut buf[IP_HDR_LEN..], tcp_len, src, dst);
    set_tcp_checksum_field(buf, check);
}

fn finish_segment(seg: &mut SegmentBuffer, src: Endpoint, dst: Endpoint, payload_len: usize) -> usize {
    let buf = seg.as_mut_slice();
    let total_len = (IP_HDR_LEN + TCP_HDR_LEN + payload_len) as u16;
    set_ip_header(buf, src.addr, dst.addr, total_len);
    buf[20..22].copy_from_slice(&src.port.to_be_bytes());
    buf[22..24].copy_from_slice(&dst.port.to_be_bytes());
    set_tcp_doff_words(buf, 5);
    set_tcp_window(buf, (BUF_CAPACITY - IP_HDR_LEN - TCP_HDR_LEN) as u16);
    set_tcp_urg_ptr(buf, 0);
    recompute_checksum(buf);
    total_len as usize
}

/// Builds a SYN segment with the covert-channel values in `syn_ack`,
/// `syn_urg`, `syn_res` written into fields that are normally zero in
/// a SYN (spec §4.6 step 1, GLOSSARY "Covert channel").
pub fn build_syn(
    seg: &mut SegmentBuffer,
    src: Endpoint,
    dst: Endpoint,
    local_isn: u32,
    syn_ack: u32,
    syn_urg: u16,
    syn_res: u8,
) -> usize {
    seg.zero_from_header();
    let buf = seg.as_mut_slice();
    buf[24..28].copy_from_slice(&local_isn.to_be_bytes());
    buf[28..32].copy_from_slice(&syn_ack.to_be_bytes());
    set_tcp_res1(buf, syn_res);
    set_tcp_flags(buf, TcpFlags::SYN);
    let urg = syn_urg;
    let len = finish_segment(seg, src, dst, 0);
    // urg_ptr must survive finish_segment's reset; re-apply then re-checksum.
    let buf = seg.as_mut_slice();
    set_tcp_urg_ptr(buf, urg);
    recompute_checksum(buf);
    len
}

/// Builds a bare ACK segment (spec §4.6 step 7, §4.6 teardown step 2).
pub fn build_ack(seg: &mut SegmentBuffer, src: Endpoint, dst: Endpoint, seq_local: u32, seq_remote: u32) -> usize {
    seg.zero_from_header();
    let buf = seg.as_mut_slice();
    buf[24..28].copy_from_slice(&seq_local.to_be_bytes());
    buf[28..32].copy_from_slice(&seq_remote.to_be_bytes());
    set_tcp_flags(buf, TcpFlags::ACK);
    finish_segment(seg, src, dst, 0)
}

/// Builds a FIN+ACK segment (spec §4.6 teardown step 1).
pub fn build_fin(seg: &mut SegmentBuffer, src: Endpoint, dst: Endpoint, seq_local: u32, seq_remote: u32) -> usize {
    seg.zero_from_header();
    let buf = seg.as_mut_slice();
    buf[24..28].copy_from_slice(&seq_local.to_be_bytes());
    buf[28..32].copy_from_slice(&seq_remote.to_be_bytes());
    set_tcp_flags(buf, TcpFlags::FIN | TcpFlags::ACK);
    finish_segment(seg, src, dst, 0)
}

/// Builds an ACK+PSH(-if-payload) data segment carrying `payload`,
/// with the given reserved-bits value (spec §4.3 step (c): "ACK+PSH
/// if payload").
pub fn build_data(
    seg: &mut SegmentBuffer,
    src: Endpoint,
    dst: Endpoint,
    seq_local: u32,
    seq_remote: u32,
    reserved: u8,
    payload: &[u8],
) -> ProbeResult<usize> {
    if OPTIONS_OFFSET + payload.len() + 16 > seg.as_slice().len() {
        return Err(ProbeError::BufferTooSmall);
    }
    seg.zero_from_header();
    let buf = seg.as_mut_slice();
    buf[24..28].copy_from_slice(&seq_local.to_be_bytes());
    buf[28..32].copy_from_slice(&seq_remote.to_be_bytes());
    set_tcp_res1(buf, reserved);
    let mut flags = TcpFlags::ACK;
    if !payload.is_empty() {
        flags |= TcpFlags::PSH;
    }
    set_tcp_flags(buf, flags);
    buf[OPTIONS_OFFSET..OPTIONS_OFFSET + payload.len()].copy_from_slice(payload);
    Ok(finish_segment(seg, src, dst, payload.len()))
}

/// Zeroes the advertised window and recomputes the checksum, turning
/// a built ACK into the zero-window "reset" step of `double_syn`
/// (spec §4.9 "double_syn").
pub fn set_tcp_window_for_reset(seg: &mut SegmentBuffer) {
    let buf = seg.as_mut_slice();
    set_tcp_window(buf, 0);
    recompute_checksum(buf);
}

/// Appends `bytes` after the current payload, extending IP total
/// length and re-checksumming (used by the `append_data` modifier,
/// spec §4.7). Sets `PSH` if the resulting payload is non-empty.
pub fn append_payload(seg: &mut SegmentBuffer, bytes: &[u8]) -> ProbeResult<()> {
    let buf = seg.as_mut_slice();
    let opt_bytes = option_bytes(buf);
    let old_payload_len = payload_len(buf);
    let start = OPTIONS_OFFSET + opt_bytes + old_payload_len;
    if start + bytes.len() + 16 > buf.len() {
        return Err(ProbeError::BufferTooSmall);
    }

    buf[start..start + bytes.len()].copy_from_slice(bytes);
    let new_total = (IP_HDR_LEN + TCP_HDR_LEN + opt_bytes + old_payload_len + bytes.len()) as u16;
    set_ip_total_len(buf, new_total);
    if !bytes.is_empty() {
        set_tcp_flags(buf, tcp_flags(buf) | TcpFlags::PSH);
    }
    recompute_checksum(buf);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::Endpoint;

    fn endpoints() -> (Endpoint, Endpoint) {
        (
            Endpoint::new(Ipv4Addr::new(192, 168, 1, 1), 49320),
            Endpoint::new(Ipv4Addr::new(192, 168, 1, 2), 8080),
        )
    }

    #[test]
    fn syn_has_correct_flags_and_covert_fields() {
        let (src, dst) = endpoints();
        let mut seg = SegmentBuffer::new();
        build_syn(&mut seg, src, dst, 0x1234_5678, 0xBEEF0001, 0xBE02, 0b0101);
        let buf = seg.as_slice();
        assert_eq!(tcp_flags(buf), TcpFlags::SYN);
        assert_eq!(tcp_seq(buf), 0x1234_5678);
        assert_eq!(tcp_ack_seq(buf), 0xBEEF0001);
        assert_eq!(tcp_urg_ptr(buf), 0xBE02);
        assert_eq!(tcp_res1(buf), 0b0101);
        assert_eq!(ip_total_len(buf), 40);
    }

    #[test]
    fn data_segment_checksum_is_self_consistent() {
        let (src, dst) = endpoints();
        let mut seg = SegmentBuffer::new();
        build_data(&mut seg, src, dst, 1, 1, 0, b"HELLO").unwrap();
        let buf = seg.as_mut_slice();
        let received = tcp_checksum_field(buf);
        set_tcp_checksum_field(buf, 0);
        let tcp_len = (tcp_doff_words(buf) as usize * 4) + payload_len(buf);
        let recomputed = tcp_checksum(&mut buf[IP_HDR_LEN..], tcp_len, ip_src(buf), ip_dst(buf));
        assert_eq!(received, recomputed);
    }

    #[test]
    fn zero_length_data_step_has_no_psh() {
        let (src, dst) = endpoints();
        let mut seg = SegmentBuffer::new();
        build_data(&mut seg, src, dst, 1, 1, 0, b"").unwrap();
        assert!(!tcp_flags(seg.as_slice()).contains(TcpFlags::PSH));
    }

    #[test]
    fn odd_length_payload_checksums_correctly() {
        let (src, dst) = endpoints();
        let mut seg = SegmentBuffer::new();
        build_data(&mut seg, src, dst, 1, 1, 0, b"odd").unwrap();
        let buf = seg.as_mut_slice();
        let received = tcp_checksum_field(buf);
        set_tcp_checksum_field(buf, 0);
        let tcp_len = (tcp_doff_words(buf) as usize * 4) + payload_len(buf);
        let recomputed = tcp_checksum(&mut buf[IP_HDR_LEN..], tcp_len, ip_src(buf), ip_dst(buf));
        assert_eq!(received, recomputed);
    }

    #[test]
    fn ack_and_fin_set_expected_flags() {
        let (src, dst) = endpoints();
        let mut seg = SegmentBuffer::new();
        build_ack(&mut seg, src, dst, 5, 9);
        assert_eq!(tcp_flags(seg.as_slice()), TcpFlags::ACK);

        build_fin(&mut seg, src, dst, 5, 9);
        assert_eq!(tcp_flags(seg.as_slice()), TcpFlags::FIN | TcpFlags::ACK);
    }

    #[test]
    fn append_payload_extends_and_sets_psh() {
        let (src, dst) = endpoints();
        let mut seg = SegmentBuffer::new();
        build_data(&mut seg, src, dst, 1, 1, 0, b"").unwrap();
        assert!(!tcp_flags(seg.as_slice()).contains(TcpFlags::PSH));
        append_payload(&mut seg, b"HELLO").unwrap();
        assert!(tcp_flags(seg.as_slice()).contains(TcpFlags::PSH));
        assert_eq!(payload(seg.as_slice()), b"HELLO");
    }

    #[test]
    fn total_len_invariant_holds() {
        let (src, dst) = endpoints();
        let mut seg = SegmentBuffer::new();
        build_data(&mut seg, src, dst, 1, 1, 0, b"HELLO").unwrap();
        let buf = seg.as_slice();
        assert_eq!(
            ip_total_len(buf) as usize,
            IP_HDR_LEN + TCP_HDR_LEN + payload_len(buf)
        );
    }
}
