//! Drives a scenario end to end against an in-process loopback peer
//! built from [`raw_tcp_probe::echo::serve`] (spec §4.9, §8 "Concrete
//! scenarios"). The peer side needs no raw socket or privilege; the
//! probe side still opens a `SOCK_RAW` socket (spec §4.5) and is
//! skipped when the process lacks `CAP_NET_RAW`.

use raw_tcp_probe::error::Verdict;
use raw_tcp_probe::scenarios::{run_ack_urg, run_reserved_est};
use raw_tcp_probe::socket::RawSocket;
use std::net::Ipv4Addr;
use tokio::net::TcpListener;
use tokio::runtime::Runtime;

/// Returns `false` (and prints why) when this process can't open a
/// raw socket, so the test skips cleanly on unprivileged runners
/// instead of failing.
fn has_raw_socket_privilege() -> bool {
    match RawSocket::new() {
        Ok(_) => true,
        Err(e) => {
            eprintln!("skipping: raw socket unavailable ({e}), needs CAP_NET_RAW");
            false
        }
    }
}

fn spawn_loopback_peer(rt: &Runtime) -> u16 {
    rt.block_on(async {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(raw_tcp_probe::echo::serve(listener));
        port
    })
}

#[test]
fn ack_urg_reaches_test_complete_against_loopback_peer() {
    if !has_raw_socket_privilege() {
        return;
    }
    let rt = Runtime::new().unwrap();
    let port = spawn_loopback_peer(&rt);

    let verdict = run_ack_urg(Ipv4Addr::LOCALHOST, 34567, Ipv4Addr::LOCALHOST, port);
    assert_eq!(verdict, Verdict::TestComplete);
}

#[test]
fn reserved_est_reaches_test_complete_against_loopback_peer() {
    if !has_raw_socket_privilege() {
        return;
    }
    let rt = Runtime::new().unwrap();
    let port = spawn_loopback_peer(&rt);

    let verdict = run_reserved_est(Ipv4Addr::LOCALHOST, 34569, Ipv4Addr::LOCALHOST, port);
    assert_eq!(verdict, Verdict::TestComplete);
}
