use std::sync::Arc;
use std::time::Duration;

use crate::{
    config::Config,
    db::{connection::DbPool, redis::RedisPool},
    repositories::{
        ActivityLogRepository, ActivityLogRepositoryTrait, AttendanceRepository,
        AttendanceRepositoryTrait, InMemoryRepositories, SessionRepository,
        SessionRepositoryTrait, StudentRepository, StudentRepositoryTrait,
    },
    services::{
        activity_log::ActivityLogService,
        attendance_recorder::AttendanceRecorder,
        qr_codec::{QrCodecSettings, QrPayloadCodec},
        rate_limit::RateLimiter,
        rate_limit_store::{MemoryRateLimitStore, RateLimitStore, RedisRateLimitStore},
        scan::ScanService,
        session_window::SessionWindowClassifier,
    },
};

/// Storage handles shared by every request.
#[derive(Clone)]
pub struct Repositories {
    pub sessions: Arc<dyn SessionRepositoryTrait>,
    pub attendance: Arc<dyn AttendanceRepositoryTrait>,
    pub students: Arc<dyn StudentRepositoryTrait>,
    pub activity_logs: Arc<dyn ActivityLogRepositoryTrait>,
}

impl Repositories {
    pub fn postgres(pool: DbPool) -> Self {
        Self {
            sessions: Arc::new(SessionRepository::new(pool.clone())),
            attendance: Arc::new(AttendanceRepository::new(pool.clone())),
            students: Arc::new(StudentRepository::new(pool.clone())),
            activity_logs: Arc::new(ActivityLogRepository::new(pool)),
        }
    }

    pub fn in_memory(store: InMemoryRepositories) -> Self {
        Self {
            sessions: Arc::new(store.clone()),
            attendance: Arc::new(store.clone()),
            students: Arc::new(store.clone()),
            activity_logs: Arc::new(store),
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub repositories: Repositories,
    pub rate_limiter: RateLimiter,
    pub scan_service: ScanService,
    pub classifier: SessionWindowClassifier,
    pub codec: QrPayloadCodec,
}

impl AppState {
    pub fn new(
        config: Config,
        repositories: Repositories,
        rate_limit_store: Arc<dyn RateLimitStore>,
    ) -> Self {
        let storage_timeout = Duration::from_millis(config.recorder_timeout_ms);
        let codec = QrPayloadCodec::new(QrCodecSettings::from(&config));
        let classifier = SessionWindowClassifier::new(config.time_zone);
        let recorder = AttendanceRecorder::new(
            repositories.sessions.clone(),
            repositories.attendance.clone(),
            storage_timeout,
        );
        let scan_service = ScanService::new(
            repositories.sessions.clone(),
            repositories.students.clone(),
            Arc::new(recorder),
            ActivityLogService::new(repositories.activity_logs.clone()),
            codec,
            classifier,
            storage_timeout,
        );
        let rate_limiter = RateLimiter::new(rate_limit_store, &config);

        Self {
            config,
            repositories,
            rate_limiter,
            scan_service,
            classifier,
            codec,
        }
    }

    /// Postgres-backed state; rate-limit counters go to Redis when a pool is
    /// supplied and stay in process otherwise.
    pub fn postgres(pool: DbPool, redis: Option<RedisPool>, config: Config) -> Self {
        let store: Arc<dyn RateLimitStore> = match redis {
            Some(redis) => Arc::new(RedisRateLimitStore::new(redis)),
            None => Arc::new(MemoryRateLimitStore::new()),
        };
        Self::new(config, Repositories::postgres(pool), store)
    }

    pub fn in_memory(config: Config) -> Self {
        Self::new(
            config,
            Repositories::in_memory(InMemoryRepositories::new()),
            Arc::new(MemoryRateLimitStore::new()),
        )
    }

    pub fn storage_timeout(&self) -> Duration {
        Duration::from_millis(self.config.recorder_timeout_ms)
    }
}
