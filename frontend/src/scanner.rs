//! Decoded codes in, scan results out.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::{channel::mpsc, lock::Mutex, StreamExt};
use std::rc::Rc;
use std::time::Duration;
use uuid::Uuid;

use crate::api::{ApiClient, ApiError, ScanResult, ScanSubmission};
use crate::camera::Timer;

/// Source of raw QR text. Frame decoding itself happens outside this crate.
#[async_trait(?Send)]
pub trait FrameDecoder {
    /// `None` once the source is closed.
    async fn next_code(&self) -> Option<String>;
}

/// Decoder fed from outside, e.g. by a JS decoding library.
pub struct ChannelDecoder {
    codes: Mutex<mpsc::UnboundedReceiver<String>>,
}

impl ChannelDecoder {
    pub fn channel() -> (mpsc::UnboundedSender<String>, Self) {
        let (tx, rx) = mpsc::unbounded();
        (
            tx,
            Self {
                codes: Mutex::new(rx),
            },
        )
    }
}

#[async_trait(?Send)]
impl FrameDecoder for ChannelDecoder {
    async fn next_code(&self) -> Option<String> {
        self.codes.lock().await.next().await
    }
}

#[async_trait(?Send)]
pub trait ScanSink {
    async fn submit(&self, raw: &str) -> Result<ScanResult, ApiError>;
}

/// Organizer station scanning student identity codes.
pub struct OrganizerScanner {
    client: ApiClient,
    session_id: Uuid,
    organizer_id: Uuid,
}

impl OrganizerScanner {
    pub fn new(client: ApiClient, session_id: Uuid, organizer_id: Uuid) -> Self {
        Self {
            client,
            session_id,
            organizer_id,
        }
    }
}

#[async_trait(?Send)]
impl ScanSink for OrganizerScanner {
    async fn submit(&self, raw: &str) -> Result<ScanResult, ApiError> {
        self.client
            .scan_attendance(&ScanSubmission {
                payload: raw.to_string(),
                session_id: self.session_id,
                organizer_id: self.organizer_id,
            })
            .await
    }
}

/// Student device scanning a projected session code.
pub struct SelfScanner {
    client: ApiClient,
}

impl SelfScanner {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }
}

#[async_trait(?Send)]
impl ScanSink for SelfScanner {
    async fn submit(&self, raw: &str) -> Result<ScanResult, ApiError> {
        self.client.self_scan(raw).await
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ScanEvent {
    Completed(ScanResult),
    Failed(ApiError),
}

pub struct ScanLoop {
    decoder: Rc<dyn FrameDecoder>,
    sink: Rc<dyn ScanSink>,
    timer: Rc<dyn Timer>,
    cooldown: Duration,
    last: Option<(String, DateTime<Utc>)>,
    listeners: Vec<mpsc::UnboundedSender<ScanEvent>>,
}

impl ScanLoop {
    pub fn new(
        decoder: Rc<dyn FrameDecoder>,
        sink: Rc<dyn ScanSink>,
        timer: Rc<dyn Timer>,
        cooldown: Duration,
    ) -> Self {
        Self {
            decoder,
            sink,
            timer,
            cooldown,
            last: None,
            listeners: Vec::new(),
        }
    }

    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<ScanEvent> {
        let (tx, rx) = mpsc::unbounded();
        self.listeners.push(tx);
        rx
    }

    /// Runs until the decoder closes.
    pub async fn run(mut self) {
        while let Some(raw) = self.decoder.next_code().await {
            if let Some(ScanEvent::Failed(ApiError::RateLimited { retry_after })) =
                self.process(&raw).await
            {
                log::warn!("scan submissions throttled, pausing {}s", retry_after);
                self.timer.sleep(Duration::from_secs(retry_after)).await;
            }
        }
        log::debug!("scan loop finished");
    }

    /// Submits one decoded code unless it repeats the previous one inside
    /// the cooldown. Returns the broadcast event, if any.
    pub async fn process(&mut self, raw: &str) -> Option<ScanEvent> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }

        let now = self.timer.now();
        let cooldown =
            chrono::Duration::from_std(self.cooldown).unwrap_or_else(|_| chrono::Duration::zero());
        if let Some((previous, at)) = &self.last {
            if previous == raw && now - *at < cooldown {
                return None;
            }
        }
        self.last = Some((raw.to_string(), now));

        let event = match self.sink.submit(raw).await {
            Ok(result) => ScanEvent::Completed(result),
            Err(err) => {
                log::warn!("scan submission failed: {}", err);
                ScanEvent::Failed(err)
            }
        };
        self.listeners
            .retain(|listener| listener.unbounded_send(event.clone()).is_ok());
        Some(event)
    }
}
