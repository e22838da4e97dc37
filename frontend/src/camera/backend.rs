//! Platform seam for the camera controller.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;

use super::types::{CameraError, StreamConstraints, VideoDevice};

#[async_trait(?Send)]
pub trait MediaBackend {
    fn is_supported(&self) -> bool;

    async fn request_permission(&self) -> Result<(), CameraError>;

    /// Video input devices only.
    async fn enumerate_devices(&self) -> Result<Vec<VideoDevice>, CameraError>;

    async fn open_stream(
        &self,
        constraints: &StreamConstraints,
    ) -> Result<Box<dyn MediaTrack>, CameraError>;
}

pub trait MediaTrack {
    fn is_live(&self) -> bool;

    /// Releases the hardware. Must be safe to call more than once.
    fn stop(&self);
}

#[async_trait(?Send)]
pub trait Timer {
    async fn sleep(&self, duration: Duration);

    fn now(&self) -> DateTime<Utc>;
}
