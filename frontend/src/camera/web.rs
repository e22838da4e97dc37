//! Browser implementation of the camera seam (web-sys MediaDevices).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::cell::RefCell;
use std::time::Duration;
use wasm_bindgen::{closure::Closure, JsCast, JsValue};
use wasm_bindgen_futures::JsFuture;
use web_sys::{
    MediaDeviceInfo, MediaDeviceKind, MediaDevices, MediaStream, MediaStreamConstraints,
    MediaStreamTrack, MediaStreamTrackState, VisibilityState,
};

use super::backend::{MediaBackend, MediaTrack, Timer};
use super::controller::CameraHandle;
use super::pending::PendingGrant;
use super::types::{CameraError, StreamConstraints, VideoDevice, Visibility};

#[derive(Default)]
pub struct WebMediaBackend {
    stream: RefCell<Option<MediaStream>>,
}

impl WebMediaBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stream of the last successful open, for attaching to a `<video>`.
    pub fn current_stream(&self) -> Option<MediaStream> {
        self.stream.borrow().clone()
    }

    fn media_devices(&self) -> Result<MediaDevices, CameraError> {
        web_sys::window()
            .ok_or(CameraError::NotSupported)?
            .navigator()
            .media_devices()
            .map_err(|_| CameraError::NotSupported)
    }

    async fn get_user_media(&self, video: &JsValue) -> Result<MediaStream, CameraError> {
        let constraints = MediaStreamConstraints::new();
        constraints.set_video(video);
        constraints.set_audio(&JsValue::FALSE);
        let promise = self
            .media_devices()?
            .get_user_media_with_constraints(&constraints)
            .map_err(|err| map_dom_error(&err))?;
        let (pending, watcher) = PendingGrant::new(stop_stream);
        let watched = promise.clone();
        wasm_bindgen_futures::spawn_local(async move {
            if let Ok(stream) = JsFuture::from(watched).await {
                if let Ok(stream) = stream.dyn_into::<MediaStream>() {
                    watcher.resolved(stream);
                }
            }
        });

        let stream = JsFuture::from(promise)
            .await
            .map_err(|err| map_dom_error(&err))?
            .dyn_into::<MediaStream>()
            .map_err(|_| CameraError::StartFailed)?;
        pending.claim();
        Ok(stream)
    }
}

#[async_trait(?Send)]
impl MediaBackend for WebMediaBackend {
    fn is_supported(&self) -> bool {
        self.media_devices()
            .map(|devices| js_sys::Reflect::has(&devices, &"getUserMedia".into()).unwrap_or(false))
            .unwrap_or(false)
    }

    async fn request_permission(&self) -> Result<(), CameraError> {
        let probe = self.get_user_media(&JsValue::TRUE).await?;
        stop_stream(&probe);
        Ok(())
    }

    async fn enumerate_devices(&self) -> Result<Vec<VideoDevice>, CameraError> {
        let promise = self
            .media_devices()?
            .enumerate_devices()
            .map_err(|err| map_dom_error(&err))?;
        let listed = JsFuture::from(promise)
            .await
            .map_err(|err| map_dom_error(&err))?;
        let devices = js_sys::Array::from(&listed)
            .iter()
            .filter_map(|entry| entry.dyn_into::<MediaDeviceInfo>().ok())
            .filter(|info| info.kind() == MediaDeviceKind::Videoinput)
            .map(|info| VideoDevice {
                device_id: info.device_id(),
                label: info.label(),
            })
            .collect();
        Ok(devices)
    }

    async fn open_stream(
        &self,
        constraints: &StreamConstraints,
    ) -> Result<Box<dyn MediaTrack>, CameraError> {
        let video = video_constraints(constraints);
        let stream = self
            .get_user_media(&video)
            .await
            .map_err(|err| match (err, &constraints.device_id) {
                (CameraError::NoDevice, Some(id)) => CameraError::DeviceNotFound(id.clone()),
                (err, _) => err,
            })?;
        self.stream.replace(Some(stream.clone()));
        Ok(Box::new(WebTrack { stream }))
    }
}

fn video_constraints(constraints: &StreamConstraints) -> JsValue {
    let video = js_sys::Object::new();
    let set = |key: &str, value: JsValue| {
        let _ = js_sys::Reflect::set(&video, &key.into(), &value);
    };
    let ideal = |value: JsValue| {
        let wrapper = js_sys::Object::new();
        let _ = js_sys::Reflect::set(&wrapper, &"ideal".into(), &value);
        JsValue::from(wrapper)
    };

    if let Some(device_id) = &constraints.device_id {
        let exact = js_sys::Object::new();
        let _ = js_sys::Reflect::set(&exact, &"exact".into(), &device_id.into());
        set("deviceId", exact.into());
    }
    if let Some(facing_mode) = constraints.facing_mode {
        set("facingMode", ideal(facing_mode.as_str().into()));
    }
    if let Some(width) = constraints.ideal_width {
        set("width", ideal(width.into()));
    }
    if let Some(height) = constraints.ideal_height {
        set("height", ideal(height.into()));
    }
    video.into()
}

fn map_dom_error(err: &JsValue) -> CameraError {
    let name = js_sys::Reflect::get(err, &"name".into())
        .ok()
        .and_then(|name| name.as_string())
        .unwrap_or_default();
    match name.as_str() {
        "NotAllowedError" | "SecurityError" => CameraError::PermissionDenied,
        "NotFoundError" => CameraError::NoDevice,
        "OverconstrainedError" => CameraError::InvalidConstraints,
        "TypeError" => CameraError::NotSupported,
        _ => {
            log::warn!("getUserMedia failed: {:?}", err);
            CameraError::StartFailed
        }
    }
}

fn stop_stream(stream: &MediaStream) {
    for track in stream.get_tracks().iter() {
        if let Ok(track) = track.dyn_into::<MediaStreamTrack>() {
            track.stop();
        }
    }
}

pub struct WebTrack {
    stream: MediaStream,
}

impl MediaTrack for WebTrack {
    fn is_live(&self) -> bool {
        self.stream
            .get_video_tracks()
            .iter()
            .filter_map(|track| track.dyn_into::<MediaStreamTrack>().ok())
            .any(|track| track.ready_state() == MediaStreamTrackState::Live)
    }

    fn stop(&self) {
        stop_stream(&self.stream);
    }
}

#[derive(Default)]
pub struct WebTimer;

#[async_trait(?Send)]
impl Timer for WebTimer {
    async fn sleep(&self, duration: Duration) {
        gloo_timers::future::sleep(duration).await;
    }

    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Forwards `document.visibilitychange` to the controller until dropped.
pub struct VisibilityListener {
    document: web_sys::Document,
    callback: Closure<dyn FnMut()>,
}

impl VisibilityListener {
    pub fn attach(handle: CameraHandle) -> Result<Self, JsValue> {
        let document = web_sys::window()
            .and_then(|window| window.document())
            .ok_or_else(|| JsValue::from_str("document is not available"))?;
        let watched = document.clone();
        let callback = Closure::<dyn FnMut()>::new(move || {
            let visibility = match watched.visibility_state() {
                VisibilityState::Hidden => Visibility::Hidden,
                _ => Visibility::Visible,
            };
            let handle = handle.clone();
            wasm_bindgen_futures::spawn_local(async move {
                if let Err(err) = handle.set_visibility(visibility).await {
                    log::warn!("visibility change not delivered: {}", err);
                }
            });
        });
        document.add_event_listener_with_callback(
            "visibilitychange",
            callback.as_ref().unchecked_ref(),
        )?;
        Ok(Self { document, callback })
    }
}

impl Drop for VisibilityListener {
    fn drop(&mut self) {
        let _ = self.document.remove_event_listener_with_callback(
            "visibilitychange",
            self.callback.as_ref().unchecked_ref(),
        );
    }
}
