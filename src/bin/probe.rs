//! CLI entry point: runs one named scenario against a peer (spec §6).

use raw_tcp_probe::config::ProbeConfig;
use raw_tcp_probe::error::Verdict;
use raw_tcp_probe::scenarios;
use std::process::ExitCode;
use tracing::{error, info};

fn run(cfg: &ProbeConfig) -> Option<Verdict> {
    let (src_ip, src_port, dst_ip, dst_port) = (cfg.src_ip, cfg.src_port, cfg.dst_ip, cfg.dst_port);
    let verdict = match cfg.scenario.as_str() {
        "ack_only" => scenarios::run_ack_only(src_ip, src_port, dst_ip, dst_port),
        "urg_only" => scenarios::run_urg_only(src_ip, src_port, dst_ip, dst_port),
        "urg_synack_only" => scenarios::run_urg_synack_only(src_ip, src_port, dst_ip, dst_port),
        "ack_urg" => scenarios::run_ack_urg(src_ip, src_port, dst_ip, dst_port),
        "urg_urg" => scenarios::run_urg_urg(src_ip, src_port, dst_ip, dst_port),
        "ack_checksum" => scenarios::run_ack_checksum(src_ip, src_port, dst_ip, dst_port),
        "ack_checksum_incorrect" => scenarios::run_ack_checksum_incorrect(src_ip, src_port, dst_ip, dst_port),
        "urg_checksum_incorrect" => scenarios::run_urg_checksum_incorrect(src_ip, src_port, dst_ip, dst_port),
        "reserved_syn" => scenarios::run_reserved_syn(src_ip, src_port, dst_ip, dst_port),
        "reserved_est" => scenarios::run_reserved_est(src_ip, src_port, dst_ip, dst_port),
        "sack_gap" => scenarios::run_sack_gap(src_ip, src_port, dst_ip, dst_port),
        "timestamping" => scenarios::run_timestamping(src_ip, src_port, dst_ip, dst_port),
        "double_syn" => raw_tcp_probe::double_syn::run_double_syn(src_ip, src_port, dst_ip, dst_port),
        other => {
            error!(scenario = other, "unknown scenario");
            return None;
        }
    };
    Some(verdict)
}

fn main() -> ExitCode {
    tracing_subscriber::fmt::init();

    let args: Vec<String> = std::env::args().collect();
    let cfg = match ProbeConfig::from_args_and_env(&args) {
        Ok(cfg) => cfg,
        Err(msg) => {
            error!("{msg}");
            return ExitCode::FAILURE;
        }
    };

    info!(scenario = %cfg.scenario, dst = %cfg.dst_ip, port = cfg.dst_port, "starting probe");
    match run(&cfg) {
        Some(Verdict::TestComplete) => {
            info!("verdict: test_complete");
            ExitCode::SUCCESS
        }
        Some(Verdict::TestFailed) => {
            info!("verdict: test_failed");
            ExitCode::FAILURE
        }
        None => ExitCode::FAILURE,
    }
}
