pub mod attendance;
pub mod events;
pub mod health;
pub mod sessions;
pub mod students;
