use anyhow::{Context, Result};
use arc_swap::ArcSwap;
use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use sqlx::SqlitePool;
use std::{net::SocketAddr, path::PathBuf, sync::Arc};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::{auth, config::Config, db, handlers, metrics, pipeline::ENDPOINT, signals::setup_signal_handlers};

/// Shared state for every handler
#[derive(Clone)]
pub struct AppState {
    /// Current configuration (swapped on SIGHUP)
    pub config: Arc<ArcSwap<Config>>,
    pub pool: SqlitePool,
    pub http: reqwest::Client,
    pub metrics: Arc<PrometheusHandle>,
}

impl AppState {
    pub fn new(
        config: Arc<ArcSwap<Config>>,
        pool: SqlitePool,
        http: reqwest::Client,
        metrics: Arc<PrometheusHandle>,
    ) -> Self {
        Self {
            config,
            pool,
            http,
            metrics,
        }
    }

    #[cfg(test)]
    pub(crate) async fn for_tests() -> Self {
        Self::new(
            Arc::new(ArcSwap::from_pointee(Config::default())),
            db::connect_in_memory().await.unwrap(),
            reqwest::Client::new(),
            Arc::new(metrics::detached_handle()),
        )
    }
}

/// Start the funnel analysis server
///
/// This function:
/// 1. Initializes metrics
/// 2. Opens the database and runs migrations
/// 3. Sets up signal handlers for graceful shutdown and config reload
/// 4. Binds to the configured address
/// 5. Serves requests with graceful shutdown support
pub async fn start_server(config: Config, config_path: PathBuf) -> Result<()> {
    let metrics_handle = if config.metrics.enabled {
        info!("Initializing Prometheus metrics...");
        metrics::init_metrics()?
    } else {
        metrics::detached_handle()
    };

    let pool = db::connect(&config.database).await?;
    info!(path = %config.database.path, "Database ready");

    // Wrap config in ArcSwap for atomic reload support
    let config_swap = Arc::new(ArcSwap::from_pointee(config.clone()));

    // Setup signal handlers (SIGTERM, SIGINT for shutdown; SIGHUP for reload)
    let (shutdown_tx, signal_handle) = setup_signal_handlers(config_swap.clone(), config_path);
    let mut shutdown_rx = shutdown_tx.subscribe();

    let http_client = reqwest::Client::builder()
        .user_agent(concat!("funnel-analyzer/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("Failed to build HTTP client")?;

    let state = AppState::new(config_swap, pool.clone(), http_client, Arc::new(metrics_handle));
    let app = create_router(state, config.server.max_body_bytes);

    let addr = SocketAddr::from((
        config
            .server
            .host
            .parse::<std::net::IpAddr>()
            .with_context(|| format!("Invalid server.host '{}'", config.server.host))?,
        config.server.port,
    ));

    info!("Starting funnel analyzer on {}", addr);
    info!(
        service = %config.analysis.service_identifier,
        feature = %config.analysis.feature,
        cache_ttl_seconds = config.cache.ttl_seconds,
        plan_tier = config.analysis.use_plan_tier,
        "Configuration loaded"
    );

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown_rx.recv().await;
            info!("Shutdown signal received, draining connections...");
        })
        .await?;

    signal_handle.await?;
    pool.close().await;
    info!("Server stopped gracefully");

    Ok(())
}

/// Create the Axum router with all routes and middleware
pub fn create_router(state: AppState, max_body_bytes: usize) -> Router {
    let auth_routes = Router::new()
        .route(ENDPOINT, post(handlers::funnel_analysis::analyze_funnel))
        .layer(middleware::from_fn_with_state(
            state.pool.clone(),
            auth::auth_middleware,
        ));

    Router::new()
        // Public endpoints (no auth required)
        .route("/health", get(handlers::health::health_check))
        .route("/ready", get(handlers::health::readiness_check))
        .route("/metrics", get(handlers::health::metrics))
        .merge(auth_routes)
        .with_state(state)
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(TraceLayer::new_for_http())
}
