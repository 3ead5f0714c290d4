//! Player Status Monitor
//!
//! Wraps one embedded player: enables the scripting capability on its frame,
//! creates exactly one API player object bound to it, and translates the raw
//! state codes the API pushes into a [`PlayerStatus`]. Every status is shown
//! on the status display element and published on a watch channel.
//!
//! The monitor's completion resolves with the API player on the first
//! `Ready` status and rejects on `Error`. Side-channel hooks fire for
//! `Playing` and `Paused`.

use crate::{
    address::with_capability_flag,
    deferred::{Deferred, DeferredHolder},
    gateway::ApiGateway,
    host::ApiPlayer,
    EmbedConfig, Error, FrameHandle, PlayerEvent, PlayerStatus,
};
use parking_lot::{Mutex, RwLock};
use std::sync::{Arc, Weak};
use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Side-channel callback for playing/paused transitions
pub type StatusHook = Arc<dyn Fn() + Send + Sync>;

/// Map one API event to a status.
///
/// `first_report` is true for the first state-change event since the monitor
/// was last reset. The table:
///
/// | code | `Ready` event | `StateChanged` event |
/// |------|---------------|----------------------|
/// | 1 | Playing | Playing |
/// | 2 | Paused | Paused |
/// | 0 | Ended | Ended |
/// | 3 | Buffering | Buffering |
/// | -1 | **Error** | Unstarted |
/// | query failed | **Error** | n/a |
/// | other | Stopped | Ready if `first_report`, else Stopped |
pub fn status_for_event(event: PlayerEvent, first_report: bool) -> PlayerStatus {
    match event {
        PlayerEvent::Ready(None) | PlayerEvent::Ready(Some(-1)) => PlayerStatus::Error,
        PlayerEvent::Ready(Some(code)) => PlayerStatus::from_code(code).unwrap_or(PlayerStatus::Stopped),
        PlayerEvent::StateChanged(code) => match PlayerStatus::from_code(code) {
            Some(status) => status,
            None if first_report => PlayerStatus::Ready,
            None => PlayerStatus::Stopped,
        },
    }
}

#[derive(Default, Clone)]
pub(crate) struct MonitorHooks {
    pub(crate) on_playing: Option<StatusHook>,
    pub(crate) on_paused: Option<StatusHook>,
}

struct MonitorState {
    frame: FrameHandle,
    player: Option<Arc<dyn ApiPlayer>>,
    pump: Option<JoinHandle<()>>,
    status: PlayerStatus,
    state_reports: u64,
    /// Bumped whenever the API player is torn down; events tagged with an
    /// older epoch are ignored.
    epoch: u64,
}

struct MonitorInner {
    gateway: Arc<ApiGateway>,
    runtime: Handle,
    status_target: String,
    label: String,
    capability_param: String,
    deferred: Deferred<Arc<dyn ApiPlayer>>,
    status_tx: watch::Sender<PlayerStatus>,
    hooks: Arc<RwLock<MonitorHooks>>,
    state: Mutex<MonitorState>,
}

/// Status monitor for one embedded player frame
#[derive(Clone)]
pub struct StatusMonitor {
    inner: Arc<MonitorInner>,
}

impl StatusMonitor {
    /// Create a monitor for `frame` without attaching it.
    ///
    /// # Panics
    ///
    /// Must be called from within a Tokio runtime; event delivery runs on it.
    pub fn new(
        gateway: Arc<ApiGateway>,
        frame: FrameHandle,
        status_target: impl Into<String>,
        config: &EmbedConfig,
    ) -> Self {
        Self::with_hooks(gateway, frame, status_target, config, Arc::default())
    }

    /// Create a monitor whose playing/paused hooks live in `hooks`, shared
    /// with the owner that registers them
    pub(crate) fn with_hooks(
        gateway: Arc<ApiGateway>,
        frame: FrameHandle,
        status_target: impl Into<String>,
        config: &EmbedConfig,
        hooks: Arc<RwLock<MonitorHooks>>,
    ) -> Self {
        let (status_tx, _) = watch::channel(PlayerStatus::Initializing);
        Self {
            inner: Arc::new(MonitorInner {
                gateway,
                runtime: Handle::current(),
                status_target: status_target.into(),
                label: config.status_label.clone(),
                capability_param: config.capability_param.clone(),
                deferred: Deferred::new(),
                status_tx,
                hooks,
                state: Mutex::new(MonitorState {
                    frame,
                    player: None,
                    pump: None,
                    status: PlayerStatus::Initializing,
                    state_reports: 0,
                    epoch: 0,
                }),
            }),
        }
    }

    /// Enable the scripting capability on the frame and start player creation.
    ///
    /// Creates the API player right away if the API has loaded; otherwise
    /// makes sure the API script is on the page and chains creation onto the
    /// gateway's API-ready signal.
    pub fn attach(&self) {
        let frame = self.frame();
        if let Some(src) = with_capability_flag(&frame.src(), &self.inner.capability_param) {
            debug!(frame = frame.id(), src = %src, "Scripting capability enabled");
            frame.set_src(src);
        }

        if self.inner.gateway.is_loaded() {
            self.inner.create_api_player();
            return;
        }

        self.inner.gateway.ensure_script();
        let weak: Weak<MonitorInner> = Arc::downgrade(&self.inner);
        self.inner.gateway.on_api_ready(move || {
            if let Some(inner) = weak.upgrade() {
                inner.create_api_player();
            }
        });
    }

    /// Create the API player if the API has loaded and none exists yet
    pub fn create_api_player(&self) {
        self.inner.create_api_player();
    }

    /// Swap in a new frame: tear down the API player, start a new
    /// completion cycle and attach to `frame`.
    pub fn reset(&self, frame: FrameHandle) {
        self.inner.teardown();
        {
            let mut state = self.inner.state.lock();
            state.frame = frame;
            state.status = PlayerStatus::Initializing;
            state.state_reports = 0;
        }
        self.inner.status_tx.send_replace(PlayerStatus::Initializing);
        self.inner.deferred.reset();
        self.attach();
    }

    /// Destroy the API player. The status display is left as is.
    pub fn destroy(&self) {
        self.inner.teardown();
    }

    /// Record a failure that did not come from the player API, such as a
    /// frame load error, exactly like an `Error` status.
    ///
    /// Ignored once the current cycle has settled.
    pub fn report_failure(&self, error: Error) {
        if self.inner.deferred.is_settled() {
            debug!(error = %error, "Failure after settlement ignored");
            return;
        }
        warn!(error = %error, "Embed failure reported");
        self.inner.publish(PlayerStatus::Error);
        self.inner.deferred.reject(error);
    }

    pub fn on_playing(&self, hook: impl Fn() + Send + Sync + 'static) {
        self.inner.hooks.write().on_playing = Some(Arc::new(hook));
    }

    pub fn on_paused(&self, hook: impl Fn() + Send + Sync + 'static) {
        self.inner.hooks.write().on_paused = Some(Arc::new(hook));
    }

    /// Last computed status
    pub fn status(&self) -> PlayerStatus {
        self.inner.state.lock().status
    }

    /// Subscribe to status changes
    pub fn subscribe_status(&self) -> watch::Receiver<PlayerStatus> {
        self.inner.status_tx.subscribe()
    }

    pub fn frame(&self) -> FrameHandle {
        self.inner.state.lock().frame.clone()
    }

    /// The live API player, if one has been created
    pub fn player(&self) -> Option<Arc<dyn ApiPlayer>> {
        self.inner.state.lock().player.clone()
    }

    pub fn status_target(&self) -> &str {
        &self.inner.status_target
    }
}

impl DeferredHolder<Arc<dyn ApiPlayer>> for StatusMonitor {
    fn deferred(&self) -> &Deferred<Arc<dyn ApiPlayer>> {
        &self.inner.deferred
    }
}

impl std::fmt::Debug for StatusMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("StatusMonitor")
            .field("frame", &state.frame.id())
            .field("status", &state.status)
            .field("has_player", &state.player.is_some())
            .finish()
    }
}

impl MonitorInner {
    fn create_api_player(self: &Arc<Self>) {
        if !self.gateway.is_loaded() {
            return;
        }

        let mut state = self.state.lock();
        if state.player.is_some() {
            return;
        }

        let (tx, rx) = mpsc::unbounded_channel();
        match self.gateway.create_player(state.frame.id(), tx) {
            Ok(player) => {
                info!(frame = state.frame.id(), "API player created");
                let pump = pump_events(Arc::downgrade(self), state.epoch, player.clone(), rx);
                state.pump = Some(self.runtime.spawn(pump));
                state.player = Some(player);
            }
            Err(error) => {
                drop(state);
                warn!(error = %error, "API player creation failed");
                self.publish(PlayerStatus::Error);
                self.deferred.reject(error);
            }
        }
    }

    fn handle_event(&self, epoch: u64, player: &Arc<dyn ApiPlayer>, event: PlayerEvent) {
        let (status, frame_id) = {
            let mut state = self.state.lock();
            if state.epoch != epoch || state.player.is_none() {
                debug!(?event, "Event from a torn-down player ignored");
                return;
            }
            let first_report = match event {
                PlayerEvent::StateChanged(_) => {
                    state.state_reports += 1;
                    state.state_reports == 1
                }
                PlayerEvent::Ready(_) => false,
            };
            (status_for_event(event, first_report), state.frame.id().to_string())
        };

        debug!(frame = %frame_id, ?event, status = %status, "Player status");
        self.publish(status);

        match status {
            PlayerStatus::Ready => {
                self.deferred.resolve(player.clone());
            }
            PlayerStatus::Error => {
                self.deferred.reject(Error::PlaybackFailed { frame: frame_id });
            }
            PlayerStatus::Paused => {
                let hook = self.hooks.read().on_paused.clone();
                if let Some(hook) = hook {
                    hook();
                }
            }
            PlayerStatus::Playing => {
                let hook = self.hooks.read().on_playing.clone();
                if let Some(hook) = hook {
                    hook();
                }
            }
            _ => {}
        }
    }

    /// Show the status on the display element, then record it
    fn publish(&self, status: PlayerStatus) {
        self.gateway
            .host()
            .set_status_text(&self.status_target, &format!("{}{}", self.label, status));
        self.state.lock().status = status;
        self.status_tx.send_replace(status);
    }

    fn teardown(&self) {
        let (player, pump) = {
            let mut state = self.state.lock();
            state.epoch += 1;
            (state.player.take(), state.pump.take())
        };
        if let Some(pump) = pump {
            pump.abort();
        }
        if let Some(player) = player {
            debug!(player = player.target_id(), "API player destroyed");
            player.destroy();
        }
    }
}

async fn pump_events(
    monitor: Weak<MonitorInner>,
    epoch: u64,
    player: Arc<dyn ApiPlayer>,
    mut events: mpsc::UnboundedReceiver<PlayerEvent>,
) {
    while let Some(event) = events.recv().await {
        let Some(inner) = monitor.upgrade() else {
            break;
        };
        inner.handle_event(epoch, &player, event);
    }
}
