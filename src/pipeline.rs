//! Composable packet modifier / checker pipeline (spec §4.7, design
//! note in spec §9).
//!
//! The source this spec is drawn from builds these out of bound
//! closures (`std::bind` + composition functions). Without closure
//! sugar this would need virtual dispatch; instead each modifier and
//! checker is a tagged variant over a closed set, interpreted by a
//! small visitor (`apply_modifier`/`apply_checker`). This keeps the
//! set auditable and avoids allocation for anything but the variants
//! that inherently own bytes.

use crate::checksum::undo_natting;
use crate::error::{ProbeError, ProbeResult};
use crate::headers::{
    self, append_payload, ip_dst, payload, tcp_checksum_field, tcp_dest_port, tcp_res1,
    tcp_urg_ptr, SegmentBuffer,
};
use crate::options::{append_option, OptionKind};
use crate::state::ConnState;
use std::time::{SystemTime, UNIX_EPOCH};

/// A single-shot transform over an in-flight segment and the probe's
/// connection state (spec §3 "Packet modifier").
#[derive(Debug, Clone)]
pub enum Modifier {
    Identity,
    AppendData(Vec<u8>),
    IncreaseSeq(u32),
    Delay(u64),
    AddTimestampOption,
    AddSackPermittedOption,
    AddSynExtras { ack: u32, urg: u16, res: u8 },
    Concat(Box<Modifier>, Box<Modifier>),
}

pub fn identity() -> Modifier {
    Modifier::Identity
}

pub fn append_data(bytes: impl Into<Vec<u8>>) -> Modifier {
    Modifier::AppendData(bytes.into())
}

pub fn increase_seq(delta: u32) -> Modifier {
    Modifier::IncreaseSeq(delta)
}

pub fn delay(seconds: u64) -> Modifier {
    Modifier::Delay(seconds)
}

pub fn add_timestamp_option() -> Modifier {
    Modifier::AddTimestampOption
}

pub fn add_sack_permitted_option() -> Modifier {
    Modifier::AddSackPermittedOption
}

pub fn add_syn_extras(ack: u32, urg: u16, res: u8) -> Modifier {
    Modifier::AddSynExtras { ack, urg, res }
}

/// `concat_modifiers(a, b)` runs `a` then `b`; associative, with
/// [`identity`] as both left and right identity (spec §4.7, §8 "Laws").
pub fn concat_modifiers(a: Modifier, b: Modifier) -> Modifier {
    Modifier::Concat(Box::new(a), Box::new(b))
}

pub fn apply_modifier(m: &Modifier, seg: &mut SegmentBuffer, state: &mut ConnState) -> ProbeResult<()> {
    match m {
        Modifier::Identity => Ok(()),
        Modifier::AppendData(bytes) => append_payload(seg, bytes),
        Modifier::IncreaseSeq(delta) => {
            state.seq_local = state.seq_local.wrapping_add(*delta);
            Ok(())
        }
        Modifier::Delay(secs) => {
            std::thread::sleep(std::time::Duration::from_secs(*secs));
            Ok(())
        }
        Modifier::AddTimestampOption => {
            let tsval = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_millis() as u32)
                .unwrap_or(0);
            state.rcv_tsval = tsval;
            state.ts_recent = 0;
            let mut data = [0u8; 8];
            data[0..4].copy_from_slice(&state.rcv_tsval.to_be_bytes());
            data[4..8].copy_from_slice(&state.ts_recent.to_be_bytes());
            append_option(seg, OptionKind::Timestamp, &data)
        }
        Modifier::AddSackPermittedOption => append_option(seg, OptionKind::SackPermitted, &[]),
        Modifier::AddSynExtras { ack, urg, res } => {
            let buf = seg.as_mut_slice();
            headers::set_tcp_ack_seq(buf, *ack);
            headers::set_tcp_urg_ptr(buf, *urg);
            headers::set_tcp_res1(buf, *res);
            headers::recompute_checksum(buf);
            Ok(())
        }
        Modifier::Concat(a, b) => {
            apply_modifier(a, seg, state)?;
            apply_modifier(b, seg, state)
        }
    }
}

/// A predicate over a received segment and the probe's connection
/// state (spec §3 "Packet checker").
#[derive(Debug, Clone)]
pub enum Checker {
    Dummy,
    HasTcpOption(u8),
    CheckSynAckValues { urg: u16, check: u16, res: u8 },
    CheckData(Vec<u8>),
    CheckReserved(u8),
    Concat(Box<Checker>, Box<Checker>),
}

pub fn dummy() -> Checker {
    Checker::Dummy
}

pub fn has_tcp_option(kind: u8) -> Checker {
    Checker::HasTcpOption(kind)
}

pub fn check_syn_ack_values(urg: u16, check: u16, res: u8) -> Checker {
    Checker::CheckSynAckValues { urg, check, res }
}

pub fn check_data(expected: impl Into<Vec<u8>>) -> Checker {
    Checker::CheckData(expected.into())
}

/// Checks a data segment's reserved nibble against `expected` (spec
/// §8 seed test 6, `reserved_est`'s `data_in_res`).
pub fn check_reserved(expected: u8) -> Checker {
    Checker::CheckReserved(expected)
}

/// `concat_checkers(a, b)` runs `a`, returns its error if any, else
/// runs `b`; [`dummy`] is identity (spec §4.7, §8 "Laws").
pub fn concat_checkers(a: Checker, b: Checker) -> Checker {
    Checker::Concat(Box::new(a), Box::new(b))
}

pub fn apply_checker(c: &Checker, seg: &SegmentBuffer, _state: &ConnState) -> ProbeResult<()> {
    let buf = seg.as_slice();
    match c {
        Checker::Dummy => Ok(()),
        Checker::HasTcpOption(kind) => {
            if has_option_kind(buf, *kind) {
                Ok(())
            } else {
                Err(ProbeError::SynAckMismatch)
            }
        }
        Checker::CheckSynAckValues { urg, check, res } => {
            if *urg != 0 && tcp_urg_ptr(buf) != *urg {
                return Err(ProbeError::SynAckMismatch);
            }
            if *check != 0 {
                let recovered = undo_natting(ip_dst(buf), tcp_dest_port(buf), tcp_checksum_field(buf));
                if recovered != *check {
                    return Err(ProbeError::SynAckMismatch);
                }
            }
            if *res != 0 && tcp_res1(buf) != *res {
                return Err(ProbeError::SynAckMismatch);
            }
            Ok(())
        }
        Checker::CheckData(expected) => {
            if payload(buf) == expected.as_slice() {
                Ok(())
            } else {
                Err(ProbeError::ProtocolError)
            }
        }
        Checker::CheckReserved(expected) => {
            if tcp_res1(buf) == *expected {
                Ok(())
            } else {
                Err(ProbeError::ProtocolError)
            }
        }
        Checker::Concat(a, b) => {
            apply_checker(a, seg, _state)?;
            apply_checker(b, seg, _state)
        }
    }
}

fn has_option_kind(buf: &[u8], kind: u8) -> bool {
    let opt_bytes = headers::option_bytes(buf);
    let mut i = 0usize;
    while i < opt_bytes {
        let opt_kind = buf[headers::OPTIONS_OFFSET + i];
        if opt_kind == 0 {
            break; // end-of-options
        }
        if opt_kind == 1 {
            i += 1; // NOP
            continue;
        }
        if opt_kind == kind {
            return true;
        }
        let len = buf[headers::OPTIONS_OFFSET + i + 1].max(2) as usize;
        i += len;
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headers::{build_data, build_syn};
    use crate::state::Endpoint;
    use std::net::Ipv4Addr;

    fn endpoints() -> (Endpoint, Endpoint) {
        (
            Endpoint::new(Ipv4Addr::new(10, 0, 0, 1), 1111),
            Endpoint::new(Ipv4Addr::new(10, 0, 0, 2), 2222),
        )
    }

    #[test]
    fn concat_modifiers_is_associative_with_identity() {
        let (src, dst) = endpoints();
        let mut seg_a = SegmentBuffer::new();
        let mut seg_b = SegmentBuffer::new();
        build_data(&mut seg_a, src, dst, 1, 1, 0, b"x").unwrap();
        build_data(&mut seg_b, src, dst, 1, 1, 0, b"x").unwrap();
        let mut state_a = ConnState::new();
        let mut state_b = ConnState::new();

        let m = concat_modifiers(identity(), increase_seq(5));
        apply_modifier(&m, &mut seg_a, &mut state_a).unwrap();
        let m2 = concat_modifiers(increase_seq(5), identity());
        apply_modifier(&m2, &mut seg_b, &mut state_b).unwrap();

        assert_eq!(state_a.seq_local, state_b.seq_local);
    }

    #[test]
    fn dummy_is_checker_identity() {
        let (src, dst) = endpoints();
        let mut seg = SegmentBuffer::new();
        build_syn(&mut seg, src, dst, 1, 0xBEEF, 0, 0);
        let state = ConnState::new();

        let c = concat_checkers(check_syn_ack_values(0, 0, 0), dummy());
        assert!(apply_checker(&c, &seg, &state).is_ok());
    }

    #[test]
    fn check_data_matches_reversed_echo() {
        let (src, dst) = endpoints();
        let mut seg = SegmentBuffer::new();
        build_data(&mut seg, src, dst, 1, 1, 0, b"OLLEH").unwrap();
        let state = ConnState::new();
        let c = check_data(*b"OLLEH");
        assert!(apply_checker(&c, &seg, &state).is_ok());

        let c_wrong = check_data(*b"WRONG");
        assert!(apply_checker(&c_wrong, &seg, &state).is_err());
    }

    #[test]
    fn syn_ack_urg_mismatch_is_detected() {
        let (src, dst) = endpoints();
        let mut seg = SegmentBuffer::new();
        build_syn(&mut seg, src, dst, 1, 0, 0xBE03, 0);
        let state = ConnState::new();
        assert!(apply_checker(&check_syn_ack_values(0xBE03, 0, 0), &seg, &state).is_ok());
        assert!(apply_checker(&check_syn_ack_values(0xBE04, 0, 0), &seg, &state).is_err());
    }
}
