//! JavaScript entry points for the scanner page.
//!
//! The host page owns the `<video>` element and the QR decoding library: it
//! attaches [`WebScanner::stream`] to the video, feeds decoded text back
//! through [`WebScanner::push_code`] and listens with [`WebScanner::on_event`].

use futures::{channel::mpsc, StreamExt};
use serde_json::json;
use std::rc::Rc;
use uuid::Uuid;
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::{future_to_promise, spawn_local};

use crate::api::{ApiClient, ScanResult};
use crate::camera::web::{VisibilityListener, WebMediaBackend, WebTimer};
use crate::camera::{CameraController, CameraError, CameraHandle};
use crate::config::ScannerConfig;
use crate::scanner::{ChannelDecoder, OrganizerScanner, ScanEvent, ScanLoop, ScanSink, SelfScanner};

#[wasm_bindgen]
pub struct WebScanner {
    camera: CameraHandle,
    backend: Rc<WebMediaBackend>,
    codes: mpsc::UnboundedSender<String>,
    events: Option<mpsc::UnboundedReceiver<ScanEvent>>,
    _visibility: VisibilityListener,
}

#[wasm_bindgen]
impl WebScanner {
    /// Organizer station: scans student identity codes into `session_id`.
    pub fn organizer(token: String, session_id: String, organizer_id: String) -> Result<WebScanner, JsValue> {
        let config = ScannerConfig::from_window();
        let client = ApiClient::new(config.api_base_url.clone()).with_token(token);
        let sink = OrganizerScanner::new(client, parse_id(&session_id)?, parse_id(&organizer_id)?);
        Self::build(config, Rc::new(sink))
    }

    /// Student device: scans the projected session code.
    pub fn student(token: String) -> Result<WebScanner, JsValue> {
        let config = ScannerConfig::from_window();
        let client = ApiClient::new(config.api_base_url.clone()).with_token(token);
        Self::build(config, Rc::new(SelfScanner::new(client)))
    }

    /// Resolves once the camera is active; rejects with the error label.
    pub fn start(&self, device_id: Option<String>) -> js_sys::Promise {
        let camera = self.camera.clone();
        future_to_promise(async move {
            let started = match device_id {
                Some(id) => camera.start_with_device(id).await,
                None => camera.start().await,
            };
            started.map(|_| JsValue::UNDEFINED).map_err(error_value)
        })
    }

    pub fn stop(&self) -> js_sys::Promise {
        let camera = self.camera.clone();
        future_to_promise(async move {
            camera.stop().await.map(|_| JsValue::UNDEFINED).map_err(error_value)
        })
    }

    pub fn switch_device(&self, device_id: String) -> js_sys::Promise {
        let camera = self.camera.clone();
        future_to_promise(async move {
            camera
                .switch_device(device_id)
                .await
                .map(|_| JsValue::UNDEFINED)
                .map_err(error_value)
        })
    }

    pub fn retry(&self) -> js_sys::Promise {
        let camera = self.camera.clone();
        future_to_promise(async move {
            camera.retry().await.map(|_| JsValue::UNDEFINED).map_err(error_value)
        })
    }

    pub fn state(&self) -> String {
        self.camera.state().label().to_string()
    }

    pub fn stream(&self) -> Option<web_sys::MediaStream> {
        self.backend.current_stream()
    }

    /// Hands one decoded QR text to the scan loop.
    pub fn push_code(&self, raw: String) {
        if self.codes.unbounded_send(raw).is_err() {
            log::warn!("scan loop is no longer running");
        }
    }

    /// Calls `callback` with a plain object for every scan result. Only the
    /// first registered callback receives events.
    pub fn on_event(&mut self, callback: js_sys::Function) {
        let Some(mut events) = self.events.take() else {
            log::warn!("scan event callback already registered");
            return;
        };
        spawn_local(async move {
            while let Some(event) = events.next().await {
                let payload = event_json(&event).to_string();
                let value = js_sys::JSON::parse(&payload).unwrap_or(JsValue::NULL);
                if let Err(err) = callback.call1(&JsValue::NULL, &value) {
                    log::warn!("scan event callback threw: {:?}", err);
                }
            }
        });
    }
}

impl WebScanner {
    fn build(config: ScannerConfig, sink: Rc<dyn ScanSink>) -> Result<WebScanner, JsValue> {
        let backend = Rc::new(WebMediaBackend::new());
        let timer = Rc::new(WebTimer);
        let (camera, driver) =
            CameraController::new(backend.clone(), timer.clone(), config.camera_settings());
        spawn_local(driver.run());

        let (codes, decoder) = ChannelDecoder::channel();
        let mut scan_loop = ScanLoop::new(Rc::new(decoder), sink, timer, config.scan_cooldown());
        let events = scan_loop.subscribe();
        spawn_local(scan_loop.run());

        let visibility = VisibilityListener::attach(camera.clone())?;
        Ok(WebScanner {
            camera,
            backend,
            codes,
            events: Some(events),
            _visibility: visibility,
        })
    }
}

fn parse_id(raw: &str) -> Result<Uuid, JsValue> {
    Uuid::parse_str(raw.trim()).map_err(|e| JsValue::from_str(&format!("invalid id: {}", e)))
}

fn error_value(err: CameraError) -> JsValue {
    JsValue::from_str(&err.to_string())
}

fn event_json(event: &ScanEvent) -> serde_json::Value {
    match event {
        ScanEvent::Completed(ScanResult::Recorded { scan_kind, record }) => json!({
            "status": "recorded",
            "scan_kind": scan_kind,
            "record": record,
        }),
        ScanEvent::Completed(ScanResult::Duplicate { scan_kind, record }) => json!({
            "status": "duplicate",
            "scan_kind": scan_kind,
            "record": record,
        }),
        ScanEvent::Completed(ScanResult::Rejected { reason, scan_kind }) => json!({
            "status": "rejected",
            "reason": reason,
            "scan_kind": scan_kind,
        }),
        ScanEvent::Failed(err) => json!({
            "status": "error",
            "message": err.to_string(),
            "retryable": err.is_retryable(),
            "retry_after": err.retry_after(),
        }),
    }
}
