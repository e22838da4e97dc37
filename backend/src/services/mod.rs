pub mod activity_log;
pub mod attendance_recorder;
pub mod qr_codec;
pub mod rate_limit;
pub mod rate_limit_store;
pub mod scan;
pub mod session_window;
