//! API server entry point.

use api::config::Config;
use contracts::RetrieveImage;
use saga_store::{InMemorySagaRepository, PostgresSagaRepository, SagaRepository};
use sqlx::postgres::PgPoolOptions;
use tokio::signal;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

/// Logs retrieval commands. The worker that fetches resources and reports
/// back through `/images/retrieved` or `/images/failed` runs elsewhere.
async fn drain_retrievals(mut commands: mpsc::Receiver<RetrieveImage>) {
    while let Some(command) = commands.recv().await {
        metrics::counter!("retrieval_commands_issued_total").increment(1);
        tracing::info!(
            correlation_id = %command.correlation_id,
            source_address = %command.source_address,
            "retrieval requested"
        );
    }
}

async fn serve<R: SagaRepository + 'static>(
    config: &Config,
    repository: R,
    storage: &'static str,
    metrics_handle: metrics_exporter_prometheus::PrometheusHandle,
) {
    let (state, commands) =
        api::create_default_state(repository, storage, config.retrieval_queue_capacity);
    let worker = tokio::spawn(drain_retrievals(commands));

    let app = api::create_app(state, metrics_handle);

    let addr = config.addr();
    tracing::info!(%addr, storage, "starting API server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind address");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    worker.abort();
}

#[tokio::main]
async fn main() {
    let config = Config::from_env();

    // 1. Initialize tracing
    tracing_subscriber::registry()
        .with(EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // 2. Install Prometheus metrics recorder
    let metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    // 3. Choose saga storage and serve
    match &config.database_url {
        Some(url) => {
            let pool = PgPoolOptions::new()
                .max_connections(20)
                .connect(url)
                .await
                .expect("failed to connect to PostgreSQL");
            let repository = PostgresSagaRepository::new(pool);
            repository
                .run_migrations()
                .await
                .expect("failed to run migrations");
            serve(&config, repository, "postgres", metrics_handle).await;
        }
        None => {
            tracing::warn!("DATABASE_URL not set, sagas are kept in memory");
            serve(&config, InMemorySagaRepository::new(), "memory", metrics_handle).await;
        }
    }

    tracing::info!("server shut down gracefully");
}
