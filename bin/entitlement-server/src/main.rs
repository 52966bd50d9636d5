mod auth;
mod backend;
mod error;
mod routes;
mod state;

use backend::Backend;
use clap::Parser;
use entitlement_config::Config;
use entitlement_payment_verifier::ethers_client::EthersChainClient;
use entitlement_storage::{InMemoryLedgerStore, InMemoryPaymentStore, InMemoryTaskStore};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// The entitlement and payment core's HTTP binary. Configuration is
/// environment-driven per spec.md §6; these flags cover only what is
/// inherently a deployment concern (bind address, database connection).
#[derive(Parser, Debug)]
#[command(name = "entitlement-server", about = "Entitlement & payment core for the tarot-reading service")]
struct Cli {
    #[arg(long, env = "BIND_ADDR", default_value = "0.0.0.0:8080")]
    bind: SocketAddr,

    /// Postgres connection string. When absent, runs against the
    /// in-memory stores — useful for local development and demos, not
    /// for production where durability matters.
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    #[arg(long, env = "DATABASE_MAX_CONNECTIONS", default_value_t = 10)]
    database_max_connections: u32,
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();
    let config = Arc::new(Config::from_env()?);

    let (ledger_store, payment_store, task_store) = match &cli.database_url {
        Some(url) => {
            tracing::info!("connecting to postgres");
            let pool = sqlx::postgres::PgPoolOptions::new()
                .max_connections(cli.database_max_connections)
                .connect(url)
                .await?;
            (
                Backend::Postgres(entitlement_storage::PostgresLedgerStore::new(pool.clone())),
                Backend::Postgres(entitlement_storage::PostgresPaymentStore::new(pool.clone())),
                Backend::Postgres(entitlement_storage::PostgresTaskStore::new(pool)),
            )
        }
        None => {
            tracing::warn!("no DATABASE_URL configured, running against in-memory stores");
            (
                Backend::InMemory(InMemoryLedgerStore::new()),
                Backend::InMemory(InMemoryPaymentStore::new()),
                Backend::InMemory(InMemoryTaskStore::new()),
            )
        }
    };

    let chain_client = EthersChainClient::new(&config.chain_rpc_url)
        .map_err(|err| eyre::eyre!("failed to construct chain client: {err}"))?;

    let app_state = state::AppState::new(
        config.clone(),
        Arc::new(ledger_store),
        Arc::new(payment_store),
        Arc::new(task_store),
        chain_client,
    );

    spawn_scheduler_loop(app_state.clone());
    spawn_task_retention_loop(app_state.clone());
    spawn_pending_payment_recovery_loop(app_state.clone());

    let app = routes::router(app_state).layer(TraceLayer::new_for_http()).layer(CorsLayer::permissive());

    tracing::info!(%cli.bind, "entitlement-server listening");
    let listener = tokio::net::TcpListener::bind(cli.bind).await?;
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;

    Ok(())
}

/// Runs the monthly reset at a fixed interval rather than a real cron —
/// good enough for this core, which treats "00:01 UTC on the 1st" as an
/// external anchor it is triggered at, not a scheduler it implements.
fn spawn_scheduler_loop(state: state::AppState) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(3600));
        loop {
            interval.tick().await;
            let summary = state.scheduler.run(chrono::Utc::now(), state.config.free_turns_default).await;
            tracing::info!(?summary, "scheduled quota reset run complete");
        }
    });
}

fn spawn_task_retention_loop(state: state::AppState) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(24 * 3600));
        loop {
            interval.tick().await;
            let cutoff = chrono::Utc::now() - chrono::Duration::days(state.config.task_retention_days as i64);
            match state.tasks.prune(cutoff).await {
                Ok(removed) => tracing::info!(removed, "pruned completed tasks"),
                Err(err) => tracing::warn!(%err, "task retention sweep failed"),
            }
        }
    });
}

fn spawn_pending_payment_recovery_loop(state: state::AppState) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(300));
        loop {
            interval.tick().await;
            let cutoff = chrono::Utc::now() - chrono::Duration::from_std(state.config.pending_payment_timeout).expect("fits in chrono::Duration");
            match state.credit_applier.recover_pending(cutoff).await {
                Ok(recovered) if recovered > 0 => tracing::info!(recovered, "recovered stale pending payments"),
                Ok(_) => {}
                Err(err) => tracing::warn!(%err, "pending payment recovery sweep failed"),
            }
        }
    });
}
