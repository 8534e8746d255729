//! Command line for the three process roles. Every flag can also be set
//! through the environment variable named next to it.

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::net::{DEFAULT_PEER_TEMPLATE, RetryPolicy};

#[derive(Parser, Debug)]
#[command(name = "sharded-store", about = "Sharded, replicated student record store")]
pub struct Cli {
    #[command(flatten)]
    pub common: CommonArgs,

    #[command(subcommand)]
    pub role: Role,
}

#[derive(Subcommand, Debug)]
pub enum Role {
    /// Client-facing load balancer
    Balancer(BalancerArgs),
    /// Shard manager: election, heartbeat and replica provisioning
    Manager(ManagerArgs),
    /// Replica hosting shards
    Replica(ReplicaArgs),
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Args, Debug, Clone)]
pub struct CommonArgs {
    #[arg(long, env = "BIND_ADDR", default_value = "0.0.0.0:5000", global = true)]
    pub bind: SocketAddr,

    /// tracing filter, e.g. "info" or "sharded_store=debug"
    #[arg(long, env = "RUST_LOG", default_value = "info", global = true)]
    pub log_level: String,

    #[arg(long, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Text, global = true)]
    pub log_format: LogFormat,

    /// URL for servers whose address was never announced; `{name}` is replaced
    #[arg(long, env = "PEER_URL_TEMPLATE", default_value = DEFAULT_PEER_TEMPLATE, global = true)]
    pub peer_url_template: String,

    /// 0 retries until success
    #[arg(long, env = "RETRY_MAX_ATTEMPTS", default_value_t = 0, global = true)]
    pub retry_max_attempts: usize,

    #[arg(long, env = "RETRY_BASE_DELAY_MS", default_value_t = 150, global = true)]
    pub retry_base_delay_ms: u64,

    #[arg(long, env = "RETRY_MAX_DELAY_MS", default_value_t = 1200, global = true)]
    pub retry_max_delay_ms: u64,

    #[arg(long, env = "REQUEST_TIMEOUT_MS", default_value_t = 2000, global = true)]
    pub request_timeout_ms: u64,
}

impl CommonArgs {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::from_flags(
            self.retry_max_attempts,
            self.retry_base_delay_ms,
            self.retry_max_delay_ms,
        )
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

#[derive(Args, Debug, Clone)]
pub struct BalancerArgs {
    #[arg(long, env = "MANAGER_URL", default_value = "http://shard_manager:5000")]
    pub manager_url: String,
}

#[derive(Args, Debug, Clone)]
pub struct ManagerArgs {
    #[arg(long, env = "HEARTBEAT_INTERVAL_SECS", default_value_t = 5)]
    pub heartbeat_interval_secs: u64,

    /// Replica executable; defaults to this binary
    #[arg(long, env = "REPLICA_BIN")]
    pub replica_bin: Option<PathBuf>,

    #[arg(long, env = "DATA_ROOT", default_value = "./data")]
    pub data_root: PathBuf,

    /// First port handed to a provisioned replica
    #[arg(long, env = "BASE_PORT", default_value_t = 5010)]
    pub base_port: u16,

    #[arg(long, env = "REPLICA_HOST", default_value = "127.0.0.1")]
    pub replica_host: String,
}

impl ManagerArgs {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs.max(1))
    }
}

#[derive(Args, Debug, Clone)]
pub struct ReplicaArgs {
    #[arg(long, env = "SERVER_ID")]
    pub name: String,

    /// Where shard logs live; in-memory logs when unset
    #[arg(long, env = "DATA_DIR")]
    pub data_dir: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_replica_flags() {
        let cli = Cli::try_parse_from([
            "sharded-store",
            "replica",
            "--bind",
            "127.0.0.1:5011",
            "--name",
            "s1",
            "--data-dir",
            "/tmp/s1",
        ])
        .unwrap();

        assert_eq!(cli.common.bind.port(), 5011);
        match cli.role {
            Role::Replica(args) => {
                assert_eq!(args.name, "s1");
                assert_eq!(args.data_dir, Some(PathBuf::from("/tmp/s1")));
            }
            other => panic!("unexpected role {:?}", other),
        }
    }

    #[test]
    fn test_defaults() {
        let cli = Cli::try_parse_from(["sharded-store", "manager"]).unwrap();
        assert_eq!(cli.common.retry_policy().max_attempts(), None);
        assert_eq!(cli.common.log_format, LogFormat::Text);
        match cli.role {
            Role::Manager(args) => {
                assert_eq!(args.base_port, 5010);
                assert_eq!(args.heartbeat_interval(), Duration::from_secs(5));
            }
            other => panic!("unexpected role {:?}", other),
        }
    }
}
