use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Failures surfaced by the capture flow. Every one of them is terminal for
/// the current start request; recovery needs an explicit retry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CameraError {
    #[error("camera capture is not supported on this device")]
    NotSupported,
    #[error("camera permission was denied")]
    PermissionDenied,
    #[error("no camera is available")]
    NoDevice,
    #[error("camera {0} is not available")]
    DeviceNotFound(String),
    #[error("the camera rejected the requested constraints")]
    InvalidConstraints,
    #[error("the camera could not be started")]
    StartFailed,
    #[error("the camera did not respond in time")]
    Timeout,
    #[error("the camera controller has shut down")]
    Closed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CameraState {
    Unrequested,
    RequestingPermission,
    PermissionGranted,
    Starting,
    Active,
    Degraded,
    Stopped(Option<CameraError>),
    Unsupported,
}

impl CameraState {
    pub fn is_streaming(&self) -> bool {
        matches!(self, CameraState::Active | CameraState::Degraded)
    }

    pub fn error(&self) -> Option<&CameraError> {
        match self {
            CameraState::Stopped(Some(err)) => Some(err),
            _ => None,
        }
    }

    /// Short label for logs and the JS bridge.
    pub fn label(&self) -> &'static str {
        match self {
            CameraState::Unrequested => "unrequested",
            CameraState::RequestingPermission => "requesting_permission",
            CameraState::PermissionGranted => "permission_granted",
            CameraState::Starting => "starting",
            CameraState::Active => "active",
            CameraState::Degraded => "degraded",
            CameraState::Stopped(_) => "stopped",
            CameraState::Unsupported => "unsupported",
        }
    }
}

impl fmt::Display for CameraState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CameraState::Stopped(Some(err)) => write!(f, "stopped ({})", err),
            other => f.write_str(other.label()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FacingMode {
    /// Rear camera; the usual choice for scanning printed codes.
    #[default]
    Environment,
    User,
}

impl FacingMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            FacingMode::Environment => "environment",
            FacingMode::User => "user",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoDevice {
    pub device_id: String,
    pub label: String,
}

/// What the controller asks the platform for when opening a stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamConstraints {
    pub device_id: Option<String>,
    pub facing_mode: Option<FacingMode>,
    pub ideal_width: Option<u32>,
    pub ideal_height: Option<u32>,
}

impl StreamConstraints {
    pub fn preferred(
        device_id: Option<String>,
        facing_mode: FacingMode,
        ideal_width: u32,
        ideal_height: u32,
    ) -> Self {
        Self {
            facing_mode: device_id.is_none().then_some(facing_mode),
            device_id,
            ideal_width: Some(ideal_width),
            ideal_height: Some(ideal_height),
        }
    }

    /// Fallback after `InvalidConstraints`: keep only the device choice.
    pub fn relaxed(&self) -> Self {
        Self {
            device_id: self.device_id.clone(),
            facing_mode: None,
            ideal_width: None,
            ideal_height: None,
        }
    }

    pub fn is_relaxed(&self) -> bool {
        self.facing_mode.is_none() && self.ideal_width.is_none() && self.ideal_height.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HealthSnapshot {
    pub last_checked: Option<DateTime<Utc>>,
    /// First health check that found the track dead, cleared when it recovers.
    pub dead_since: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Visible,
    Hidden,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preferred_constraints_drop_facing_mode_for_explicit_device() {
        let any = StreamConstraints::preferred(None, FacingMode::Environment, 1280, 720);
        assert_eq!(any.facing_mode, Some(FacingMode::Environment));

        let pinned =
            StreamConstraints::preferred(Some("cam-2".into()), FacingMode::Environment, 1280, 720);
        assert_eq!(pinned.facing_mode, None);
        assert_eq!(pinned.device_id.as_deref(), Some("cam-2"));
    }

    #[test]
    fn relaxed_constraints_keep_only_device() {
        let relaxed = StreamConstraints::preferred(Some("cam-1".into()), FacingMode::User, 640, 480)
            .relaxed();
        assert!(relaxed.is_relaxed());
        assert_eq!(relaxed.device_id.as_deref(), Some("cam-1"));
    }

    #[test]
    fn stopped_state_exposes_error() {
        let state = CameraState::Stopped(Some(CameraError::PermissionDenied));
        assert_eq!(state.error(), Some(&CameraError::PermissionDenied));
        assert_eq!(state.to_string(), "stopped (camera permission was denied)");
        assert!(!state.is_streaming());
    }
}
