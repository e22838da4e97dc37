use std::sync::Arc;

use chrono::{Duration, Utc};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use rollcall_backend::{
    config::Config,
    db::connection::create_pool,
    repositories::ActivityLogRepository,
    services::activity_log::ActivityLogService,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rollcall_backend=info,activity_log_cleanup=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load()?;
    if config.activity_log_retention_days <= 0 {
        tracing::info!("ACTIVITY_LOG_RETENTION_DAYS <= 0, keeping scan activity logs forever");
        return Ok(());
    }

    let pool = create_pool(&config.database_url, 1).await?;
    let service = ActivityLogService::new(Arc::new(ActivityLogRepository::new(pool.clone())));

    let cutoff = Utc::now() - Duration::days(config.activity_log_retention_days);
    let deleted = service.delete_logs_before(cutoff).await?;
    if deleted > 0 {
        tracing::info!(deleted, cutoff = %cutoff, "Deleted expired scan activity logs");
    }

    sqlx::query("VACUUM (ANALYZE) scan_activity_logs")
        .execute(pool.as_ref())
        .await?;

    Ok(())
}
