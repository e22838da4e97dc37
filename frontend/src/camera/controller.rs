//! Camera acquisition as an explicit state machine.
//!
//! Every command goes through one FIFO queue drained by a single driver
//! task, so a stop can never interleave with a half-finished start. The
//! driver also owns the only hardware grant: it always releases the current
//! track before opening another one.

use futures::{
    channel::{mpsc, oneshot},
    future::{self, Either},
    pin_mut, select, FutureExt, StreamExt,
};
use std::cell::RefCell;
use std::future::Future;
use std::pin::pin;
use std::rc::Rc;
use std::time::Duration;

use super::backend::{MediaBackend, MediaTrack, Timer};
use super::types::{
    CameraError, CameraState, FacingMode, HealthSnapshot, StreamConstraints, Visibility,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CameraSettings {
    pub facing_mode: FacingMode,
    pub ideal_width: u32,
    pub ideal_height: u32,
    pub permission_timeout: Duration,
    pub start_timeout: Duration,
    /// `None` disables periodic health checks; explicit checks still work.
    pub health_interval: Option<Duration>,
    /// How long a track may stay non-live before the controller degrades.
    pub health_grace: Duration,
    /// Reopen the camera when the page becomes visible again after a
    /// visibility-driven stop.
    pub auto_resume: bool,
}

impl Default for CameraSettings {
    fn default() -> Self {
        Self {
            facing_mode: FacingMode::Environment,
            ideal_width: 1280,
            ideal_height: 720,
            permission_timeout: Duration::from_secs(15),
            start_timeout: Duration::from_secs(10),
            health_interval: Some(Duration::from_secs(2)),
            health_grace: Duration::from_secs(3),
            auto_resume: true,
        }
    }
}

type Reply = oneshot::Sender<CameraState>;

enum Command {
    Start {
        device_id: Option<String>,
        reply: Reply,
    },
    Stop {
        reply: Reply,
    },
    SwitchDevice {
        device_id: String,
        reply: Reply,
    },
    Retry {
        reply: Reply,
    },
    HealthCheck {
        reply: Option<Reply>,
    },
    Visibility {
        visibility: Visibility,
        reply: Reply,
    },
    Subscribe(mpsc::UnboundedSender<CameraState>),
}

/// Cheap, cloneable front door to the controller.
#[derive(Clone)]
pub struct CameraHandle {
    commands: mpsc::UnboundedSender<Command>,
    state: Rc<RefCell<CameraState>>,
}

impl CameraHandle {
    pub fn state(&self) -> CameraState {
        self.state.borrow().clone()
    }

    /// Receives the current state immediately, then every transition.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<CameraState> {
        let (tx, rx) = mpsc::unbounded();
        let _ = self.commands.unbounded_send(Command::Subscribe(tx));
        rx
    }

    pub async fn start(&self) -> Result<(), CameraError> {
        let state = self
            .request(|reply| Command::Start {
                device_id: None,
                reply,
            })
            .await?;
        started(state)
    }

    pub async fn start_with_device(&self, device_id: impl Into<String>) -> Result<(), CameraError> {
        let device_id = Some(device_id.into());
        let state = self
            .request(|reply| Command::Start { device_id, reply })
            .await?;
        started(state)
    }

    pub async fn stop(&self) -> Result<(), CameraError> {
        self.request(|reply| Command::Stop { reply }).await.map(|_| ())
    }

    pub async fn switch_device(&self, device_id: impl Into<String>) -> Result<(), CameraError> {
        let device_id = device_id.into();
        let state = self
            .request(|reply| Command::SwitchDevice { device_id, reply })
            .await?;
        started(state)
    }

    /// Starts again on the last requested device after a failure.
    pub async fn retry(&self) -> Result<(), CameraError> {
        let state = self.request(|reply| Command::Retry { reply }).await?;
        started(state)
    }

    pub async fn check_health(&self) -> Result<CameraState, CameraError> {
        self.request(|reply| Command::HealthCheck { reply: Some(reply) })
            .await
    }

    pub async fn set_visibility(&self, visibility: Visibility) -> Result<CameraState, CameraError> {
        self.request(|reply| Command::Visibility { visibility, reply })
            .await
    }

    async fn request(
        &self,
        build: impl FnOnce(Reply) -> Command,
    ) -> Result<CameraState, CameraError> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .unbounded_send(build(tx))
            .map_err(|_| CameraError::Closed)?;
        rx.await.map_err(|_| CameraError::Closed)
    }
}

fn started(state: CameraState) -> Result<(), CameraError> {
    match state {
        CameraState::Active => Ok(()),
        CameraState::Unsupported => Err(CameraError::NotSupported),
        CameraState::Stopped(Some(err)) => Err(err),
        _ => Err(CameraError::StartFailed),
    }
}

/// The live grant. Dropped only through [`CameraController::release`].
struct CaptureSession {
    track: Box<dyn MediaTrack>,
    health: HealthSnapshot,
}

pub struct CameraController {
    backend: Rc<dyn MediaBackend>,
    timer: Rc<dyn Timer>,
    settings: CameraSettings,
    state: Rc<RefCell<CameraState>>,
    subscribers: Vec<mpsc::UnboundedSender<CameraState>>,
    capture: Option<CaptureSession>,
    device_id: Option<String>,
    restarts_left: u8,
    resume_on_visible: bool,
}

/// Drains the command queue. Spawn `run()` on the local executor.
pub struct CameraDriver {
    controller: CameraController,
    commands: mpsc::UnboundedReceiver<Command>,
}

impl CameraController {
    pub fn new(
        backend: Rc<dyn MediaBackend>,
        timer: Rc<dyn Timer>,
        settings: CameraSettings,
    ) -> (CameraHandle, CameraDriver) {
        let (tx, rx) = mpsc::unbounded();
        let state = Rc::new(RefCell::new(CameraState::Unrequested));
        let controller = Self {
            backend,
            timer,
            settings,
            state: state.clone(),
            subscribers: Vec::new(),
            capture: None,
            device_id: None,
            restarts_left: 0,
            resume_on_visible: false,
        };
        (
            CameraHandle {
                commands: tx,
                state,
            },
            CameraDriver {
                controller,
                commands: rx,
            },
        )
    }

    fn current(&self) -> CameraState {
        self.state.borrow().clone()
    }

    fn transition(&mut self, next: CameraState) -> CameraState {
        let previous = self.state.replace(next.clone());
        if previous != next {
            log::debug!("camera: {} -> {}", previous, next);
            self.subscribers
                .retain(|subscriber| subscriber.unbounded_send(next.clone()).is_ok());
        }
        next
    }

    async fn handle(&mut self, command: Command) {
        match command {
            Command::Start { device_id, reply } => {
                let state = self.start(device_id).await;
                let _ = reply.send(state);
            }
            Command::Stop { reply } => {
                let state = self.stop();
                let _ = reply.send(state);
            }
            Command::SwitchDevice { device_id, reply } => {
                self.stop();
                let state = self.start(Some(device_id)).await;
                let _ = reply.send(state);
            }
            Command::Retry { reply } => {
                let state = self.start(self.device_id.clone()).await;
                let _ = reply.send(state);
            }
            Command::HealthCheck { reply } => {
                self.check_health().await;
                if let Some(reply) = reply {
                    let _ = reply.send(self.current());
                }
            }
            Command::Visibility { visibility, reply } => {
                let state = self.on_visibility(visibility).await;
                let _ = reply.send(state);
            }
            Command::Subscribe(subscriber) => {
                if subscriber.unbounded_send(self.current()).is_ok() {
                    self.subscribers.push(subscriber);
                }
            }
        }
    }

    async fn start(&mut self, device_id: Option<String>) -> CameraState {
        self.release();
        self.resume_on_visible = false;
        self.device_id = device_id.clone();

        if !self.backend.is_supported() {
            return self.transition(CameraState::Unsupported);
        }

        self.transition(CameraState::RequestingPermission);
        let limit = self.settings.permission_timeout;
        if let Err(err) = bounded(&*self.timer, limit, self.backend.request_permission()).await {
            return self.fail(err);
        }
        let devices = match bounded(&*self.timer, limit, self.backend.enumerate_devices()).await {
            Ok(devices) => devices,
            Err(err) => return self.fail(err),
        };
        if devices.is_empty() {
            return self.fail(CameraError::NoDevice);
        }
        if let Some(id) = &device_id {
            if !devices.iter().any(|device| &device.device_id == id) {
                return self.fail(CameraError::DeviceNotFound(id.clone()));
            }
        }

        self.transition(CameraState::PermissionGranted);
        self.restarts_left = 1;
        self.open().await
    }

    async fn open(&mut self) -> CameraState {
        self.transition(CameraState::Starting);
        let constraints = StreamConstraints::preferred(
            self.device_id.clone(),
            self.settings.facing_mode,
            self.settings.ideal_width,
            self.settings.ideal_height,
        );

        let opened = match self.open_stream(&constraints).await {
            Err(CameraError::InvalidConstraints) if !constraints.is_relaxed() => {
                log::warn!("camera rejected preferred constraints, retrying with device only");
                self.open_stream(&constraints.relaxed()).await
            }
            other => other,
        };

        match opened {
            Ok(track) => {
                self.capture = Some(CaptureSession {
                    track,
                    health: HealthSnapshot::default(),
                });
                log::info!("camera active (device: {:?})", self.device_id);
                self.transition(CameraState::Active)
            }
            Err(err) => self.fail(err),
        }
    }

    async fn open_stream(
        &self,
        constraints: &StreamConstraints,
    ) -> Result<Box<dyn MediaTrack>, CameraError> {
        bounded(
            &*self.timer,
            self.settings.start_timeout,
            self.backend.open_stream(constraints),
        )
        .await
    }

    fn fail(&mut self, err: CameraError) -> CameraState {
        self.release();
        log::warn!("camera start failed: {}", err);
        match err {
            CameraError::NotSupported => self.transition(CameraState::Unsupported),
            err => self.transition(CameraState::Stopped(Some(err))),
        }
    }

    fn stop(&mut self) -> CameraState {
        self.release();
        self.resume_on_visible = false;
        self.transition(CameraState::Stopped(None))
    }

    fn release(&mut self) {
        if let Some(capture) = self.capture.take() {
            capture.track.stop();
        }
    }

    async fn check_health(&mut self) {
        if self.current() != CameraState::Active {
            return;
        }
        let now = self.timer.now();
        let grace = chrono::Duration::from_std(self.settings.health_grace)
            .unwrap_or_else(|_| chrono::Duration::zero());
        let Some(capture) = self.capture.as_mut() else {
            return;
        };

        capture.health.last_checked = Some(now);
        if capture.track.is_live() {
            capture.health.dead_since = None;
            return;
        }
        let dead_since = *capture.health.dead_since.get_or_insert(now);
        if now - dead_since >= grace {
            self.degrade().await;
        }
    }

    async fn degrade(&mut self) {
        self.transition(CameraState::Degraded);
        self.release();
        if self.restarts_left == 0 {
            log::warn!("camera track lost again after automatic restart, giving up");
            self.transition(CameraState::Stopped(Some(CameraError::StartFailed)));
            return;
        }
        self.restarts_left -= 1;
        log::info!("camera track lost, restarting on the same device");
        self.open().await;
    }

    async fn on_visibility(&mut self, visibility: Visibility) -> CameraState {
        match visibility {
            Visibility::Hidden => {
                let state = self.current();
                if state.is_streaming() || state == CameraState::Starting {
                    self.release();
                    self.resume_on_visible = self.settings.auto_resume;
                    self.transition(CameraState::Stopped(None));
                }
            }
            Visibility::Visible => {
                if self.resume_on_visible {
                    self.resume_on_visible = false;
                    return self.start(self.device_id.clone()).await;
                }
            }
        }
        self.current()
    }
}

impl CameraDriver {
    pub async fn run(self) {
        let Self {
            mut controller,
            mut commands,
        } = self;

        loop {
            let interval = controller
                .settings
                .health_interval
                .filter(|_| controller.current() == CameraState::Active);
            let next = match interval {
                Some(interval) => {
                    let timer = controller.timer.clone();
                    let tick = async move { timer.sleep(interval).await }.fuse();
                    pin_mut!(tick);
                    select! {
                        command = commands.next() => command,
                        () = tick => Some(Command::HealthCheck { reply: None }),
                    }
                }
                None => commands.next().await,
            };
            match next {
                Some(command) => controller.handle(command).await,
                None => break,
            }
        }

        controller.release();
        log::debug!("camera controller shut down");
    }
}

/// Races `op` against the timer; losing the race is `Timeout`.
async fn bounded<T>(
    timer: &dyn Timer,
    limit: Duration,
    op: impl Future<Output = Result<T, CameraError>>,
) -> Result<T, CameraError> {
    let op = pin!(op);
    match future::select(op, timer.sleep(limit)).await {
        Either::Left((result, _)) => result,
        Either::Right(((), _)) => Err(CameraError::Timeout),
    }
}
