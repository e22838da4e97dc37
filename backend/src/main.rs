use std::net::SocketAddr;
use std::time::Duration;

use chrono::Utc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use rollcall_backend::{
    build_router,
    config::Config,
    db::{connection::create_pool, redis::create_redis_pool},
    services::rate_limit::RateLimiter,
    state::AppState,
};

fn mask_secret(s: &str) -> String {
    if s.is_empty() {
        return "<empty>".into();
    }
    let prefix = s.chars().take(4).collect::<String>();
    format!("{}*** (len={})", prefix, s.len())
}

/// Periodically drops rate-limit entries that can no longer affect a decision.
fn spawn_rate_limit_gc(limiter: RateLimiter, every: Duration) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        interval.tick().await;
        loop {
            interval.tick().await;
            match limiter.purge(Utc::now()).await {
                Ok(0) => {}
                Ok(removed) => tracing::debug!(removed, "Purged idle rate-limit entries"),
                Err(err) => tracing::warn!(error = %err, "Rate-limit purge failed"),
            }
        }
    });
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rollcall_backend=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::load()?;
    tracing::info!(
        jwt_secret = %mask_secret(&config.jwt_secret),
        time_zone = %config.time_zone,
        bind_addr = %config.bind_addr,
        recorder_timeout_ms = config.recorder_timeout_ms,
        trust_forwarded_for = config.trust_forwarded_for,
        redis = config.redis_url.is_some(),
        "Loaded configuration from environment/.env"
    );

    // Initialize database
    let pool = create_pool(&config.database_url, config.database_max_connections).await?;
    sqlx::migrate!("./migrations").run(pool.as_ref()).await?;

    let redis = create_redis_pool(&config).await?;
    let addr: SocketAddr = config.bind_addr.parse()?;
    let gc_every = Duration::from_secs(config.rate_limit_gc_interval_seconds.max(1));

    let state = AppState::postgres(pool, redis, config);
    spawn_rate_limit_gc(state.rate_limiter.clone(), gc_every);

    let app = build_router(state);

    // Start server
    tracing::info!("Server listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
