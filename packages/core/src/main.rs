use std::sync::Arc;

use clap::Parser;
use dotenvy::dotenv;

use flight_aggregator::aggregator::{
    coordinator::{FanOutCoordinator, ProviderTimeouts},
    provider::{FlightProvider, ProviderKind},
    service::FlightSearchService,
};
use flight_aggregator::api::{create_router, AppState};
use flight_aggregator::cache::{HttpQuoteCache, MemoryQuoteCache, QuoteCache, SqliteQuoteCache};
use flight_aggregator::cli::Cli;
use flight_aggregator::config::{CacheBackend, Config};
use flight_aggregator::db::create_pool;
use flight_aggregator::error::AppError;
use flight_aggregator::logging::init_logging;
use flight_aggregator::metrics::AppMetrics;
use flight_aggregator::scheduler::run_cache_pruning;
use flight_aggregator::services::{FlightServiceClient, FlightsSkyClient, GoogleFlightsClient};

#[tokio::main]
async fn main() {
    dotenv().ok();
    init_logging();

    let cli = Cli::parse();
    let config = load_config(&cli).unwrap_or_else(|err| {
        tracing::error!("{}", err);
        std::process::exit(1);
    });

    if let Err(err) = run(config).await {
        tracing::error!("{}", err);
        std::process::exit(1);
    }
}

fn load_config(cli: &Cli) -> Result<Config, AppError> {
    let mut config = Config::from_env().map_err(AppError::Config)?;
    config.apply_cli(cli).map_err(AppError::Config)?;
    Ok(config)
}

async fn run(config: Config) -> Result<(), AppError> {
    let metrics = Arc::new(
        AppMetrics::new().map_err(|err| AppError::Internal(format!("metrics registry: {err}")))?,
    );

    let cache = build_cache(&config).await?;
    let providers = build_providers(&config, &metrics)?;
    if providers.is_empty() {
        tracing::warn!(
            "No providers configured; set RAPIDAPI_KEY or UPSTREAM_SERVICES to get results"
        );
    }

    tracing::info!(
        "Service starting: cache backend {}, ttl {:?}, {} providers",
        cache.backend_name(),
        config.cache_ttl(),
        providers.len()
    );

    let coordinator = FanOutCoordinator::new(
        providers,
        ProviderTimeouts {
            cache: config.cache_timeout(),
            external: config.provider_timeout(),
        },
    )
    .with_metrics(metrics.clone());

    let search = FlightSearchService::new(cache, coordinator)
        .with_ttl(config.cache_ttl())
        .with_cache_timeout(config.cache_timeout())
        .with_max_results(config.max_results)
        .with_metrics(metrics.clone());

    let app = create_router(AppState {
        search: Arc::new(search),
        metrics,
    });

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .map_err(|err| AppError::Internal(format!("failed to bind {}: {}", config.bind_addr, err)))?;
    tracing::info!("Listening on {}", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|err| AppError::Internal(format!("server error: {err}")))?;

    tracing::info!("Server stopped cleanly");
    Ok(())
}

async fn build_cache(config: &Config) -> Result<Arc<dyn QuoteCache>, AppError> {
    match config.cache_backend {
        CacheBackend::Memory => Ok(Arc::new(MemoryQuoteCache::new(config.cache_capacity))),
        CacheBackend::Sqlite => {
            let pool = create_pool(&config.database_url)
                .await
                .map_err(|err| AppError::Config(format!("DATABASE_URL: {err}")))?;
            let cache = Arc::new(SqliteQuoteCache::new(pool));
            if let Some(ttl) = config.cache_ttl() {
                tokio::spawn(run_cache_pruning(cache.clone(), ttl, ttl));
            }
            Ok(cache)
        }
        CacheBackend::Http => {
            let cache = HttpQuoteCache::new(config.cache_url.clone(), config.cache_timeout())
                .map_err(|err| AppError::Internal(format!("cache client: {err}")))?;
            Ok(Arc::new(cache))
        }
    }
}

fn build_providers(
    config: &Config,
    metrics: &Arc<AppMetrics>,
) -> Result<Vec<Arc<dyn FlightProvider>>, AppError> {
    let client_error = |err: reqwest::Error| AppError::Internal(format!("provider client: {err}"));
    let mut providers: Vec<Arc<dyn FlightProvider>> = Vec::new();

    for peer in &config.cached_upstream_services {
        let client = FlightServiceClient::new(
            peer.name.clone(),
            peer.url.clone(),
            ProviderKind::Cache,
            config.cache_timeout(),
        )
        .map_err(client_error)?;
        providers.push(Arc::new(client));
    }

    for peer in &config.upstream_services {
        let client = FlightServiceClient::new(
            peer.name.clone(),
            peer.url.clone(),
            ProviderKind::External,
            config.provider_timeout(),
        )
        .map_err(client_error)?;
        providers.push(Arc::new(client));
    }

    if let Some(api_key) = &config.rapidapi_key {
        let google = GoogleFlightsClient::new(
            config.google_flights.url.clone(),
            config.google_flights.host.clone(),
            api_key.clone(),
            config.provider_timeout(),
        )
        .map_err(client_error)?;
        providers.push(Arc::new(google));

        let sky = FlightsSkyClient::new(
            config.flights_sky.url.clone(),
            config.flights_sky.host.clone(),
            api_key.clone(),
            config.provider_timeout(),
            config.polling_policy(),
        )
        .map_err(client_error)?
        .with_metrics(metrics.clone());
        providers.push(Arc::new(sky));
    }

    Ok(providers)
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", err);
        return;
    }
    tracing::info!("Shutdown signal received");
}
