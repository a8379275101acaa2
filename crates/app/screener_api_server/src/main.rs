//! Screener auth API server binary.
//!
//! Prints `{"port": N}` to stdout once bound so a supervising process can
//! discover the port when started with `--port 0`.

use std::sync::Arc;

use clap::Parser;
use screener_api::config::ApiConfig;
use screener_core::auth::{AuthError, admin};
use screener_core::auth::memory_store::MemoryCredentialStore;
use screener_core::auth::queries::PgCredentialStore;
use screener_core::auth::store::CredentialStore;
use sqlx::postgres::PgPoolOptions;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str = "info,screener_api=debug,screener_core=debug";

/// CLI arguments for the API server.
#[derive(Parser, Debug)]
#[command(name = "screener_api_server", about = "Screener auth API server")]
struct Args {
    /// Port to listen on on 127.0.0.1 (0 = ephemeral). Overrides `BIND_ADDR`.
    #[arg(long)]
    port: Option<u16>,

    /// PostgreSQL connection URL.
    #[arg(
        long,
        env = "DATABASE_URL",
        default_value = "postgres://localhost:5432/screener"
    )]
    database_url: String,

    /// Maximum number of database connections in the pool.
    #[arg(long, default_value_t = 5)]
    max_connections: u32,

    /// Keep principals and sessions in memory instead of PostgreSQL.
    /// Everything is lost on exit.
    #[arg(long, default_value_t = false)]
    memory_store: bool,

    /// Promote the principal with this login key to administrator, then exit.
    #[arg(long, value_name = "LOGIN_KEY")]
    grant_admin: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    // Logs go to stderr; stdout carries the JSON port message.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .init();

    let args = Args::parse();

    let memory = args
        .memory_store
        .then(|| Arc::new(MemoryCredentialStore::new()));
    let store: Arc<dyn CredentialStore> = match &memory {
        Some(memory) => {
            warn!("using in-memory credential store; principals and sessions are not persisted");
            Arc::clone(memory) as Arc<dyn CredentialStore>
        }
        None => Arc::new(connect_pg(&args).await?),
    };

    // Config is resolved only when serving; it may persist a generated JWT secret.
    if let Some(login_key) = &args.grant_admin {
        if args.memory_store {
            warn!("--grant-admin against the in-memory store has no lasting effect");
        }
        grant_admin(store.as_ref(), login_key).await?;
        return Ok(());
    }

    let config = server_config(&args);
    info!(
        access_ttl_secs = config.policy.access_ttl.num_seconds(),
        session_ttl_days = config.policy.session_ttl.num_days(),
        failure_threshold = config.policy.failure_threshold,
        "auth policy"
    );

    let state = screener_api::AppState::new(store, config.clone());
    let guard_cleanup = state.issuer.guard().spawn_cleanup_task();
    let challenge_cleanup = state.issuer.challenges().spawn_cleanup_task();
    let session_cleanup = memory.as_ref().map(|m| m.spawn_cleanup_task());

    let app = screener_api::router(state);
    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    let local_addr = listener.local_addr()?;

    println!("{}", serde_json::json!({"port": local_addr.port()}));
    info!(addr = %local_addr, "REST API listening");

    let shutdown = CancellationToken::new();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("interrupt received, shutting down");
            }
            shutdown.cancel();
        }
    });

    let result = axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await;

    guard_cleanup.abort();
    challenge_cleanup.abort();
    if let Some(task) = session_cleanup {
        task.abort();
    }
    result?;

    Ok(())
}

async fn connect_pg(args: &Args) -> Result<PgCredentialStore, Box<dyn std::error::Error>> {
    info!(
        database_url = %args.database_url,
        max_connections = args.max_connections,
        "configuring connection pool"
    );
    let pool = PgPoolOptions::new()
        .max_connections(args.max_connections)
        .acquire_timeout(std::time::Duration::from_secs(30))
        .connect(&args.database_url)
        .await?;

    info!("running database migrations");
    screener_api::migrate(&pool).await?;
    Ok(PgCredentialStore::new(pool))
}

async fn grant_admin(store: &dyn CredentialStore, login_key: &str) -> Result<(), AuthError> {
    let principal = admin::grant_admin_by_login(store, login_key).await?;
    info!(login_key = %principal.login_key, id = %principal.id, "administrator granted");
    Ok(())
}

/// Environment config with CLI overrides applied.
fn server_config(args: &Args) -> ApiConfig {
    let mut config = ApiConfig::from_env();
    config.pg_connection_url = args.database_url.clone();
    if let Some(port) = args.port {
        config.bind_addr = format!("127.0.0.1:{port}");
    }
    config
}

#[cfg(test)]
mod tests {
    use screener_core::models::auth::NewPrincipal;
    use screener_core::uuid::uuidv7;

    use super::*;

    #[test]
    fn grant_admin_flag_parses() {
        let args = Args::try_parse_from([
            "screener_api_server",
            "--memory-store",
            "--grant-admin",
            "alice",
            "--database-url",
            "postgres://db/screener",
        ])
        .unwrap();
        assert!(args.memory_store);
        assert_eq!(args.grant_admin.as_deref(), Some("alice"));
        assert_eq!(args.port, None);
        assert_eq!(args.max_connections, 5);
    }

    #[tokio::test]
    async fn grant_admin_promotes_existing_principal() {
        let store = MemoryCredentialStore::new();
        let created = store
            .create_principal(NewPrincipal {
                id: uuidv7(),
                login_key: "alice".into(),
                display_name: "alice".into(),
                secret_hash: "hash".into(),
                permitted_paths: vec!["/".into()],
            })
            .await
            .unwrap();

        grant_admin(&store, "alice").await.unwrap();
        let promoted = store.get_principal(created.id).await.unwrap().unwrap();
        assert!(promoted.is_admin);

        let err = grant_admin(&store, "nobody").await.unwrap_err();
        assert!(matches!(err, AuthError::NotFound(_)));
    }
}
