use crate::config::Config;
use bb8::Pool;
use bb8_redis::{redis::cmd, RedisConnectionManager};
use std::time::Duration;

pub type RedisPool = Pool<RedisConnectionManager>;

/// Builds the shared rate-limit pool when `REDIS_URL` is configured and
/// verifies it answers `PING` before the server starts accepting traffic.
pub async fn create_redis_pool(config: &Config) -> anyhow::Result<Option<RedisPool>> {
    let Some(url) = config.redis_url.as_deref() else {
        tracing::info!("REDIS_URL not set, rate limiting uses the in-process store");
        return Ok(None);
    };

    let manager = RedisConnectionManager::new(url)?;
    let pool = Pool::builder()
        .max_size(config.redis_pool_size)
        .connection_timeout(Duration::from_secs(config.redis_connect_timeout))
        .build(manager)
        .await?;

    {
        let mut conn = pool.get().await?;
        let _: String = cmd("PING").query_async(&mut *conn).await?;
    }

    tracing::info!(
        pool_size = config.redis_pool_size,
        "Redis pool ready for shared rate-limit counters"
    );
    Ok(Some(pool))
}
