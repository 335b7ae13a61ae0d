//! API server entry point.

use std::sync::Arc;

use api::config::Config;
use api::routes::sagas::AppState;
use gateway::{
    AppointmentsClient, HttpAppointmentsClient, HttpLawyersClient, HttpUsersClient,
    InMemoryAppointmentsClient, InMemoryLawyersClient, InMemoryUsersClient, LawyersClient,
    UsersClient,
};
use metrics_exporter_prometheus::PrometheusHandle;
use saga_store::{InMemorySagaStore, PostgresSagaStore, SagaStore};
use tokio::signal;
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

async fn serve<S, U, L, A>(
    state: Arc<AppState<S, U, L, A>>,
    metrics_handle: PrometheusHandle,
    config: &Config,
) where
    S: SagaStore + 'static,
    U: UsersClient + 'static,
    L: LawyersClient + 'static,
    A: AppointmentsClient + 'static,
{
    let app = api::create_app(state, metrics_handle);

    let addr = config.addr();
    tracing::info!(%addr, "starting API server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind address");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    tracing::info!("server shut down gracefully");
}

async fn run_with_store<S: SagaStore + 'static>(
    store: Arc<S>,
    metrics_handle: PrometheusHandle,
    config: &Config,
) {
    if let Some((users_url, lawyers_url, appointments_url)) = config.service_urls() {
        let http = reqwest::Client::builder()
            .timeout(config.http_timeout())
            .build()
            .expect("failed to build HTTP client");

        tracing::info!(%users_url, %lawyers_url, %appointments_url, "using HTTP service clients");
        let state = api::create_state(
            store,
            Arc::new(HttpUsersClient::new(users_url, http.clone())),
            Arc::new(HttpLawyersClient::new(lawyers_url, http.clone())),
            Arc::new(HttpAppointmentsClient::new(appointments_url, http)),
        );
        serve(state, metrics_handle, config).await;
    } else {
        tracing::info!("no service URLs configured, using in-memory service clients");
        let state = api::create_state(
            store,
            Arc::new(InMemoryUsersClient::new()),
            Arc::new(InMemoryLawyersClient::new()),
            Arc::new(InMemoryAppointmentsClient::new()),
        );
        serve(state, metrics_handle, config).await;
    }
}

#[tokio::main]
async fn main() {
    let config = Config::from_env();

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.log_level.clone())),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let prometheus_builder = metrics_exporter_prometheus::PrometheusBuilder::new();
    let metrics_handle = prometheus_builder
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    if let Some(database_url) = &config.database_url {
        let pool = sqlx::PgPool::connect(database_url)
            .await
            .expect("failed to connect to database");
        let store = PostgresSagaStore::new(pool);
        store.run_migrations().await.expect("migrations failed");

        tracing::info!("using PostgreSQL saga store");
        run_with_store(Arc::new(store), metrics_handle, &config).await;
    } else {
        tracing::info!("no DATABASE_URL configured, using in-memory saga store");
        run_with_store(Arc::new(InMemorySagaStore::new()), metrics_handle, &config).await;
    }
}
