use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

/// Egress tunnel rotation supervisor - maintains a primary and hot secondary
/// tunnel, rotating the primary on a schedule and failing over on health
/// check failure.
#[derive(Clone, Debug, Parser)]
#[command(version)]
pub struct Cli {
    /// Directory to scan for endpoint configs (<provider>_<country>_all.conf)
    #[arg(long, env = "ROTOR_CONFIG_DIR", default_value = "/etc/openvpn")]
    pub config_dir: PathBuf,

    /// Tunnel client binary invoked to establish a tunnel
    #[arg(long, env = "ROTOR_TUNNEL_CLIENT", default_value = "openvpn")]
    pub tunnel_client: String,

    /// System user whose egress traffic is protected and mark-routed
    #[arg(long, env = "ROTOR_PROTECTED_USER", default_value = "botuser")]
    pub protected_user: String,

    /// How often a planned rotation promotes a fresh endpoint to primary
    #[arg(long, env = "ROTOR_ROTATION_INTERVAL", value_parser = humantime::parse_duration, default_value = "30m")]
    pub rotation_interval: Duration,

    /// How often both active slots are health-checked
    #[arg(long, env = "ROTOR_HEALTH_CHECK_INTERVAL", value_parser = humantime::parse_duration, default_value = "5m")]
    pub health_check_interval: Duration,

    /// How long a failed endpoint is excluded from selection
    #[arg(long, env = "ROTOR_BLACKLIST_TTL", value_parser = humantime::parse_duration, default_value = "24h")]
    pub blacklist_ttl: Duration,

    /// Wall-clock budget for establishing a single tunnel, including liveness polling
    #[arg(long, env = "ROTOR_CONNECT_TIMEOUT", value_parser = humantime::parse_duration, default_value = "30s")]
    pub connect_timeout: Duration,

    /// Log file path; logs are also always written to stdout
    #[arg(long, env = "ROTOR_LOG_FILE", default_value = "/var/log/tunnel_rotor.log")]
    pub log_file: PathBuf,

    /// tracing_subscriber::EnvFilter syntax, e.g. "info" or "rotor_lib=debug"
    #[arg(long, env = "ROTOR_LOG_FILTER", default_value = "info")]
    pub log_filter: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_with_no_arguments_using_defaults() {
        let cli = Cli::try_parse_from(["rotor"]).unwrap();
        assert_eq!(cli.config_dir, PathBuf::from("/etc/openvpn"));
        assert_eq!(cli.tunnel_client, "openvpn");
        assert_eq!(cli.protected_user, "botuser");
        assert_eq!(cli.rotation_interval, Duration::from_secs(30 * 60));
        assert_eq!(cli.health_check_interval, Duration::from_secs(5 * 60));
        assert_eq!(cli.blacklist_ttl, Duration::from_secs(24 * 60 * 60));
        assert_eq!(cli.connect_timeout, Duration::from_secs(30));
    }

    #[test]
    fn accepts_humantime_duration_overrides() {
        let cli = Cli::try_parse_from(["rotor", "--rotation-interval", "1h", "--blacklist-ttl", "2days"]).unwrap();
        assert_eq!(cli.rotation_interval, Duration::from_secs(60 * 60));
        assert_eq!(cli.blacklist_ttl, Duration::from_secs(2 * 24 * 60 * 60));
    }

    #[test]
    fn rejects_malformed_duration() {
        assert!(Cli::try_parse_from(["rotor", "--rotation-interval", "soon"]).is_err());
    }
}
