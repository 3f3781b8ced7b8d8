use axum::{routing::get, Router};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use market_scheduler::{
    app_state::AppState,
    config::AppConfig,
    db,
    handlers::{BackupSettings, HandlerRegistry},
    routes,
    scheduler::{SchedulerManager, SchedulerSettings},
    services::collector::HttpCollectorClient,
    store::PgScheduleStore,
};

#[tokio::main]
async fn main() {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    tracing::info!("Starting market scheduler");

    let config = AppConfig::from_env().expect("Failed to load configuration");

    let prometheus_handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus metrics recorder");
    let prometheus_handle = Arc::new(prometheus_handle);
    routes::metrics::describe_scheduler_metrics();

    tracing::info!("Connecting to PostgreSQL");
    let connect_options = config
        .connect_options()
        .expect("Invalid database configuration");
    let db_pool = db::init_pool(connect_options)
        .await
        .expect("Failed to connect to database");

    db::run_migrations(&db_pool)
        .await
        .expect("Failed to run database migrations");

    tracing::info!(collector = %config.collector_base_url, "Initializing job handlers");
    let collector = HttpCollectorClient::new(
        &config.collector_base_url,
        config.collector_api_token.clone(),
    )
    .expect("Failed to initialize collector client");
    let backup = BackupSettings::from_config(&config).expect("Invalid database configuration");
    let handlers = HandlerRegistry::with_defaults(Arc::new(collector), backup);

    let store = Arc::new(PgScheduleStore::new(db_pool.clone()));
    let manager = Arc::new(SchedulerManager::new(
        store,
        handlers,
        SchedulerSettings::from_config(&config),
    ));

    // Health and metrics for the daemon
    let ops = Router::new()
        .route("/health", get(routes::health::health_check))
        .with_state(AppState::new(db_pool))
        .route(
            "/metrics",
            get(routes::metrics::prometheus_metrics).with_state(prometheus_handle),
        )
        .layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(&config.scheduler_bind_addr)
        .await
        .expect("Failed to bind scheduler health address");
    tracing::info!("Scheduler health endpoint on {}", config.scheduler_bind_addr);

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, ops).await {
            tracing::error!(error = %e, "Health server stopped");
        }
    });

    manager.start().await;
    tracing::info!("Market scheduler exited");
}
