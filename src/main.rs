// Main entry point - Dependency injection and server setup
mod domain;
mod application;
mod infrastructure;
mod presentation;

use std::{net::SocketAddr, sync::Arc, time::Duration};
use axum::{routing::{delete, get}, Router};
use tower_http::{compression::CompressionLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::application::aggregation_service::AggregationService;
use crate::application::fetch_cache::FetchCache;
use crate::application::selection_store::SelectionService;
use crate::domain::metric::MetricCatalog;
use crate::infrastructure::config::load_config;
use crate::infrastructure::http_source::HttpTelemetrySource;
use crate::infrastructure::memory_store::InMemoryKeyValueStore;
use crate::presentation::app_state::AppState;
use crate::presentation::handlers::{
    cache_stats, delete_selection, get_consumption, get_merged_series, get_selection, get_series,
    health_check, invalidate_entity, put_selection,
};

const PURGE_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "meter_insights=info,tower_http=info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = load_config()?;
    let settings = config.aggregation_settings()?;

    // Infrastructure layer
    let source = Arc::new(HttpTelemetrySource::new(
        config.source.host.clone(),
        config.source.token.clone(),
        config.source.path.clone(),
        Duration::from_secs(config.source.request_timeout_secs),
    )?);
    let chart_cache = FetchCache::new("charts", Duration::from_secs(config.cache.chart_ttl_secs));
    let kpi_cache = FetchCache::new("kpis", Duration::from_secs(config.cache.kpi_ttl_secs));

    tracing::info!(
        "Cache TTLs: charts {:?}, kpis {:?}",
        chart_cache.ttl(),
        kpi_cache.ttl()
    );

    let metrics = MetricCatalog::new(config.metric_definitions());
    tracing::info!("Loaded {} metric definitions", metrics.len());

    // Application layer
    let aggregation_service = AggregationService::new(
        source,
        chart_cache.clone(),
        kpi_cache.clone(),
        metrics,
        settings,
    );
    let selection_service = SelectionService::new(Arc::new(InMemoryKeyValueStore::new()));

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(PURGE_INTERVAL);
        loop {
            ticker.tick().await;
            let purged = chart_cache.purge_expired() + kpi_cache.purge_expired();
            if purged > 0 {
                tracing::debug!("Purged {} expired cache entries", purged);
            }
        }
    });

    let state = Arc::new(AppState {
        aggregation_service,
        selection_service,
    });

    // Presentation layer
    let router = Router::new()
        .route("/healthz", get(health_check))
        .route("/series", get(get_series))
        .route("/series/merged", get(get_merged_series))
        .route("/entities/:id/consumption", get(get_consumption))
        .route("/entities/:id/cache", delete(invalidate_entity))
        .route("/cache/stats", get(cache_stats))
        .route(
            "/selection/:key",
            get(get_selection).put(put_selection).delete(delete_selection),
        )
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr: SocketAddr = config.server.bind_address.parse()?;
    tracing::info!("Starting meter-insights service on {}", addr);

    axum::serve(tokio::net::TcpListener::bind(addr).await?, router).await?;

    Ok(())
}
