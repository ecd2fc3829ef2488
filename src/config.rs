//! Probe configuration, sourced from CLI args and environment
//! variables in the teacher's low-ceremony style — no config file
//! format, just a handful of documented knobs (spec §6 "Entry points").

use std::env;
use std::net::Ipv4Addr;

/// Everything `probe` needs to run one scenario against one peer.
#[derive(Debug, Clone)]
pub struct ProbeConfig {
    pub src_ip: Ipv4Addr,
    pub src_port: u16,
    pub dst_ip: Ipv4Addr,
    pub dst_port: u16,
    pub scenario: String,
}

impl ProbeConfig {
    /// Reads `RTP_SRC_IP`/`RTP_SRC_PORT` from the environment (falling
    /// back to loopback and an ephemeral port) and takes `dst_ip`,
    /// `dst_port`, and `scenario` positionally from `args`.
    pub fn from_args_and_env(args: &[String]) -> Result<Self, String> {
        if args.len() < 3 {
            return Err(format!(
                "usage: {} <dst_ip> <dst_port> <scenario>",
                args.first().map(String::as_str).unwrap_or("probe")
            ));
        }

        let dst_ip: Ipv4Addr = args[1].parse().map_err(|e| format!("invalid dst_ip: {e}"))?;
        let dst_port: u16 = args[2].parse().map_err(|e| format!("invalid dst_port: {e}"))?;
        let scenario = args.get(3).cloned().unwrap_or_else(|| "ack_only".to_string());

        let src_ip: Ipv4Addr = env::var("RTP_SRC_IP")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(Ipv4Addr::new(127, 0, 0, 1));
        let src_port: u16 = env::var("RTP_SRC_PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(49_200);

        Ok(Self {
            src_ip,
            src_port,
            dst_ip,
            dst_port,
            scenario,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_too_few_args() {
        let args = vec!["probe".to_string()];
        assert!(ProbeConfig::from_args_and_env(&args).is_err());
    }

    #[test]
    fn parses_dst_and_scenario() {
        let args = vec![
            "probe".to_string(),
            "10.0.0.5".to_string(),
            "8080".to_string(),
            "urg_only".to_string(),
        ];
        let cfg = ProbeConfig::from_args_and_env(&args).unwrap();
        assert_eq!(cfg.dst_ip, Ipv4Addr::new(10, 0, 0, 5));
        assert_eq!(cfg.dst_port, 8080);
        assert_eq!(cfg.scenario, "urg_only");
    }

    #[test]
    fn defaults_scenario_when_omitted() {
        let args = vec!["probe".to_string(), "10.0.0.5".to_string(), "8080".to_string()];
        let cfg = ProbeConfig::from_args_and_env(&args).unwrap();
        assert_eq!(cfg.scenario, "ack_only");
    }
}
