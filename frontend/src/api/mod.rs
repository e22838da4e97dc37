mod client;
mod types;

pub use client::{scan_result_from, ApiClient};
pub use types::*;
