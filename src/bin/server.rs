//! usergate REST API Server
//!
//! Run with: cargo run --features server --bin usergate-server -- --help
//!
//! Endpoints:
//!   GET  /health             - Liveness
//!   POST /users/auth         - Log in, sets the session cookie
//!   POST /users/logout       - Revoke the session
//!   GET  /users/me           - Current principal
//!   GET  /users              - List users (ADMIN)
//!   POST /users              - Register a user (ADMIN)
//!   GET  /users/count        - Number of users
//!   GET  /users/:id          - One user
//!   GET  /users/:id/roles    - Roles and permissions of a user (VIEW_USER_ROLES)

use std::sync::Arc;

use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use usergate::config::Config;
use usergate::server::{serve, spawn_session_sweeper, AppState};
use usergate::{bootstrap_admin, Argon2Hasher, Store};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::parse();
    if let Err(e) = run(config).await {
        error!(error = %e, "server failed");
        std::process::exit(1);
    }
}

async fn run(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let store = Arc::new(Store::open_with(&config.db_path, config.store_options())?);
    info!(path = %config.db_path.display(), "store ready");

    let hasher = Argon2Hasher::new();

    match (&config.admin_email, &config.admin_password) {
        (Some(email), Some(password)) => {
            match bootstrap_admin(&store, &hasher, &config.admin_name, email, password)? {
                Some(admin) => info!(id = admin.id, email = %admin.email, "administrator created"),
                None => info!("store already populated, skipping administrator seed"),
            }
        }
        (None, _) if store.count_users()? == 0 => {
            warn!("store is empty; pass --admin-email/--admin-password to seed an administrator")
        }
        _ => {}
    }

    let sweeper = spawn_session_sweeper(store.clone(), config.session_purge_interval());

    let state = AppState::new(store, hasher)
        .with_session_ttl(config.session_ttl())
        .with_lookup_timeout(config.lookup_timeout())
        .with_cookie_secure(config.cookie_secure);

    let addr = config.addr();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(%addr, version = env!("CARGO_PKG_VERSION"), "usergate-server listening");

    serve(listener, state, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "ctrl-c handler failed");
        }
        info!("shutting down");
    })
    .await?;
    sweeper.abort();
    Ok(())
}
