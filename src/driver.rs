//! Scenario driver (spec §4.8): opens, steps, tears down, verdicts.

use crate::error::{ProbeResult, Verdict};
use crate::handshake;
use crate::headers::{build_data, payload_len, tcp_ack_seq, SegmentBuffer};
use crate::pipeline::{apply_checker, apply_modifier, Checker, Modifier};
use crate::socket::RawSocket;
use crate::state::{ConnState, Endpoint};
use tracing::{info, warn};

/// One (modify, send, maybe-receive, check) step between open and
/// close (spec §4.8 step 3, §3 "Scenario").
pub struct Step {
    pub modifier: Modifier,
    pub checker: Checker,
    /// Whether this step expects a response segment at all. False for
    /// a fire-and-forget step (e.g. the last leg of `sack_gap`'s
    /// padding burst).
    pub expects_response: bool,
    /// Reserved nibble baked into this step's outgoing data segment
    /// (`reserved_est`'s `data_out_res`, spec §4.9 table).
    pub reserved: u8,
}

impl Step {
    pub fn new(modifier: Modifier, checker: Checker) -> Self {
        Self {
            modifier,
            checker,
            expects_response: true,
            reserved: 0,
        }
    }

    pub fn fire_and_forget(modifier: Modifier) -> Self {
        Self {
            modifier,
            checker: crate::pipeline::dummy(),
            expects_response: false,
            reserved: 0,
        }
    }

    pub fn with_reserved(mut self, reserved: u8) -> Self {
        self.reserved = reserved;
        self
    }
}

/// A complete probe recipe (spec §3 "Scenario", §4.8 "Inputs").
pub struct Scenario {
    pub syn_modifier: Modifier,
    pub syn_ack_checker: Checker,
    pub steps: Vec<Step>,
}

/// Runs one scenario end to end against `(src, dst)` and returns its
/// verdict (spec §4.8).
pub fn run_scenario(src: Endpoint, dst: Endpoint, local_isn: u32, scenario: &Scenario) -> Verdict {
    let socket = match RawSocket::new() {
        Ok(s) => s,
        Err(e) => {
            warn!(error = %e, "failed to acquire raw socket");
            return Verdict::TestFailed;
        }
    };
    let mut seg = SegmentBuffer::new();
    let mut state = ConnState::new();

    if let Err(e) = handshake::open(
        &socket,
        &mut seg,
        src,
        dst,
        &mut state,
        local_isn,
        &scenario.syn_modifier,
        &scenario.syn_ack_checker,
    ) {
        warn!(error = %e, "handshake failed");
        return Verdict::TestFailed;
    }

    let mut failed = false;
    let mut last_recv_len: Option<usize> = None;
    for step in &scenario.steps {
        if let Err(e) = run_step(&socket, &mut seg, src, dst, &mut state, step, &mut last_recv_len) {
            warn!(error = %e, "step failed");
            failed = true;
            break;
        }
    }

    if let Some(n) = last_recv_len {
        let buf = seg.as_slice();
        state.seq_local = tcp_ack_seq(buf);
        state.seq_remote = state.seq_remote.wrapping_add(n as u32);
        crate::headers::build_ack(&mut seg, src, dst, state.seq_local, state.seq_remote);
        let _ = socket.send(&seg, crate::headers::ip_total_len(seg.as_slice()) as usize, dst.addr);
    }

    handshake::close(&socket, &mut seg, src, dst, &mut state);

    if failed {
        Verdict::TestFailed
    } else {
        info!(?src, ?dst, "scenario complete");
        Verdict::TestComplete
    }
}

fn run_step(
    socket: &RawSocket,
    seg: &mut SegmentBuffer,
    src: Endpoint,
    dst: Endpoint,
    state: &mut ConnState,
    step: &Step,
    last_recv_len: &mut Option<usize>,
) -> ProbeResult<()> {
    seg.zero_from_header();
    build_data(seg, src, dst, state.seq_local, state.seq_remote, step.reserved, &[])?;
    apply_modifier(&step.modifier, seg, state)?;

    let len = crate::headers::ip_total_len(seg.as_slice()) as usize;
    socket.send(seg, len, dst.addr)?;

    if !step.expects_response {
        return Ok(());
    }

    socket.recv_one(seg, dst, src)?;
    *last_recv_len = Some(payload_len(seg.as_slice()));
    apply_checker(&step.checker, seg, state)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fire_and_forget_step_has_dummy_checker_and_no_response() {
        let step = Step::fire_and_forget(crate::pipeline::append_data(*b"abc"));
        assert!(!step.expects_response);
    }

    #[test]
    fn new_step_defaults_to_expecting_a_response() {
        let step = Step::new(crate::pipeline::identity(), crate::pipeline::dummy());
        assert!(step.expects_response);
    }
}
