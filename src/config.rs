//! Server configuration from command-line flags and environment

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::constants::{DEFAULT_SESSION_PURGE_SECS, DEFAULT_SESSION_TTL_SECS};
use crate::db::StoreOptions;

#[derive(Debug, Clone, Parser)]
#[command(name = "usergate-server", about = "User management and login service", version)]
pub struct Config {
    /// LMDB environment directory
    #[arg(long, short = 'd', env = "USERGATE_DB", default_value = "./data/usergate.mdb")]
    pub db_path: PathBuf,

    #[arg(long, env = "USERGATE_HOST", default_value = "0.0.0.0")]
    pub host: String,

    #[arg(long, short = 'p', env = "PORT", default_value_t = 3000)]
    pub port: u16,

    /// LMDB map size in MiB
    #[arg(long, env = "USERGATE_MAP_SIZE_MB", default_value_t = 1024)]
    pub map_size_mb: usize,

    #[arg(
        long,
        env = "USERGATE_SESSION_TTL_SECS",
        default_value_t = DEFAULT_SESSION_TTL_SECS,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub session_ttl_secs: u64,

    /// Seconds between sweeps of expired sessions
    #[arg(
        long,
        env = "USERGATE_SESSION_PURGE_SECS",
        default_value_t = DEFAULT_SESSION_PURGE_SECS,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub session_purge_secs: u64,

    /// Upper bound on one authentication attempt (lookup + verify)
    #[arg(long, env = "USERGATE_LOOKUP_TIMEOUT_MS", default_value_t = 5000)]
    pub lookup_timeout_ms: u64,

    /// Mark the session cookie `Secure` (HTTPS deployments)
    #[arg(long, env = "USERGATE_COOKIE_SECURE")]
    pub cookie_secure: bool,

    /// Seed an administrator with this email when the store is empty
    #[arg(long, env = "USERGATE_ADMIN_EMAIL", requires = "admin_password")]
    pub admin_email: Option<String>,

    #[arg(long, env = "USERGATE_ADMIN_PASSWORD", hide_env_values = true)]
    pub admin_password: Option<String>,

    #[arg(long, env = "USERGATE_ADMIN_NAME", default_value = "Administrator")]
    pub admin_name: String,
}

impl Config {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn store_options(&self) -> StoreOptions {
        StoreOptions { map_size: self.map_size_mb.saturating_mul(1024 * 1024) }
    }

    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_secs)
    }

    pub fn session_purge_interval(&self) -> Duration {
        Duration::from_secs(self.session_purge_secs)
    }

    pub fn lookup_timeout(&self) -> Duration {
        Duration::from_millis(self.lookup_timeout_ms)
    }
}
