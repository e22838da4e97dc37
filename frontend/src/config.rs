use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::camera::{CameraSettings, FacingMode};

/// Scanner page settings. Every field has a default so a host page only
/// needs to set what differs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScannerConfig {
    pub api_base_url: String,
    pub facing_mode: FacingMode,
    pub ideal_width: u32,
    pub ideal_height: u32,
    pub permission_timeout_ms: u64,
    pub start_timeout_ms: u64,
    /// `0` disables periodic health checks.
    pub health_interval_ms: u64,
    pub health_grace_ms: u64,
    pub auto_resume: bool,
    /// Repeats of the same code inside this window are not resubmitted.
    pub scan_cooldown_ms: u64,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:3000/api".to_string(),
            facing_mode: FacingMode::Environment,
            ideal_width: 1280,
            ideal_height: 720,
            permission_timeout_ms: 15_000,
            start_timeout_ms: 10_000,
            health_interval_ms: 2_000,
            health_grace_ms: 3_000,
            auto_resume: true,
            scan_cooldown_ms: 3_000,
        }
    }
}

impl ScannerConfig {
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    pub fn camera_settings(&self) -> CameraSettings {
        CameraSettings {
            facing_mode: self.facing_mode,
            ideal_width: self.ideal_width,
            ideal_height: self.ideal_height,
            permission_timeout: Duration::from_millis(self.permission_timeout_ms),
            start_timeout: Duration::from_millis(self.start_timeout_ms),
            health_interval: (self.health_interval_ms > 0)
                .then(|| Duration::from_millis(self.health_interval_ms)),
            health_grace: Duration::from_millis(self.health_grace_ms),
            auto_resume: self.auto_resume,
        }
    }

    pub fn scan_cooldown(&self) -> Duration {
        Duration::from_millis(self.scan_cooldown_ms)
    }

    /// Reads `window.__ROLLCALL_CONFIG = { ... }` if the host page set it.
    #[cfg(target_arch = "wasm32")]
    pub fn from_window() -> Self {
        let Some(window) = web_sys::window() else {
            return Self::default();
        };
        let value = match js_sys::Reflect::get(&window, &"__ROLLCALL_CONFIG".into()) {
            Ok(value) if !value.is_undefined() && !value.is_null() => value,
            _ => return Self::default(),
        };
        let raw = js_sys::JSON::stringify(&value)
            .ok()
            .and_then(|json| json.as_string())
            .unwrap_or_default();
        Self::from_json(&raw).unwrap_or_else(|e| {
            log::warn!("ignoring invalid __ROLLCALL_CONFIG: {}", e);
            Self::default()
        })
    }
}
