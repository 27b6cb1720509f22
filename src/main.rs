use lombardy_energy_leads::{
    accumulator::SessionStore,
    config::Config,
    handlers::AppState,
    provider_store::ProviderStore,
    routes,
    services::InferenceService,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_governor::{
    governor::GovernorConfigBuilder, key_extractor::SmartIpKeyExtractor, GovernorLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Sessions idle longer than this are dropped.
const SESSION_IDLE_SECS: u64 = 4 * 60 * 60;
const MAX_SESSIONS: u64 = 10_000;

/// Main entry point for the application.
///
/// Initializes logging, loads configuration and the persisted provider
/// selection, builds the provider clients and the session store, then
/// serves the HTTP API.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "lombardy_energy_leads=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;

    let providers = ProviderStore::open(&config.provider_config_dir).await;

    let inference = InferenceService::new(&config)?;
    tracing::info!(
        "Provider clients ready (timeout {}s)",
        config.provider_timeout_secs
    );

    let sessions = SessionStore::new(Duration::from_secs(SESSION_IDLE_SECS), MAX_SESSIONS);
    tracing::info!(
        "Session store initialized ({}h idle timeout, {} max sessions)",
        SESSION_IDLE_SECS / 3600,
        MAX_SESSIONS
    );

    let app_state = Arc::new(AppState {
        config: config.clone(),
        inference,
        providers,
        sessions,
    });

    // Rate limiting: 10 req/sec per IP, burst of 20. Provider calls are slow
    // and billed, so this mostly guards the quota.
    let governor_conf = Arc::new(
        GovernorConfigBuilder::default()
            .per_second(10)
            .burst_size(20)
            .key_extractor(SmartIpKeyExtractor)
            .finish()
            .ok_or_else(|| anyhow::anyhow!("Invalid rate limiter configuration"))?,
    );

    let api = routes::api_routes().layer(GovernorLayer {
        config: governor_conf,
    });
    let app = routes::build_router(app_state, api);

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
