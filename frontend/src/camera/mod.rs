mod backend;
mod controller;
mod pending;
mod types;
#[cfg(target_arch = "wasm32")]
pub mod web;

pub use backend::{MediaBackend, MediaTrack, Timer};
pub use controller::{CameraController, CameraDriver, CameraHandle, CameraSettings};
pub use types::{
    CameraError, CameraState, FacingMode, HealthSnapshot, StreamConstraints, VideoDevice,
    Visibility,
};
