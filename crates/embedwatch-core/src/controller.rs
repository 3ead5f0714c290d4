//! Embed Lifecycle Controller
//!
//! Owns the embedded frame, derives its address from the retained identifier
//! set, supervises it with a [`StatusMonitor`] and applies the retry policy
//! when the monitor reports an error.
//!
//! ```text
//! Idle ──load──▶ Loading ──attached──▶ Monitoring ──Ready──▶ Ready
//!                   ▲                      │
//!                   │                    Error
//!                   │                      ▼
//!                   └────── retry ◀── within bound? ──no──▶ Failed
//! ```
//!
//! The controller's completion resolves with [`EmbedReady`] once and rejects
//! after retries are exhausted. Both outcomes are observed through
//! [`DeferredHolder::pending`].

use crate::{
    address::build_address,
    deferred::{Completion, Deferred, DeferredHolder, Pending},
    gateway::ApiGateway,
    host::ApiPlayer,
    monitor::{MonitorHooks, StatusMonitor},
    EmbedConfig, EmbedFrame, Error, FrameHandle, Identifiers, LoadRequest, PlayerStatus, Result,
};
use futures::future::{BoxFuture, FutureExt};
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

/// Value the controller resolves with once the player is usable
#[derive(Clone)]
pub struct EmbedReady {
    pub frame: FrameHandle,
    pub monitor: StatusMonitor,
    pub player: Arc<dyn ApiPlayer>,
}

impl std::fmt::Debug for EmbedReady {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbedReady")
            .field("frame", &self.frame.id())
            .field("player", &self.player.target_id())
            .finish()
    }
}

struct Session {
    /// Identifier set accumulated across loads
    retained: Identifiers,
    frame: Option<FrameHandle>,
    monitor: Option<StatusMonitor>,
    retry_count: u32,
    container: String,
    status_target: String,
    /// Bumped on every fresh load and on destroy; work started under an
    /// older epoch is discarded.
    epoch: u64,
}

struct ControllerInner {
    config: EmbedConfig,
    gateway: Arc<ApiGateway>,
    deferred: Deferred<EmbedReady>,
    session: Mutex<Session>,
    hooks: Arc<RwLock<MonitorHooks>>,
}

/// How a load was started
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoadKind {
    /// Requested by the caller; starts a new completion cycle
    Fresh,
    /// Started by the retry decision taken under `epoch`
    Retry { epoch: u64, include_collection: bool },
}

/// Controller for one embed session
#[derive(Clone)]
pub struct EmbedController {
    inner: Arc<ControllerInner>,
}

impl EmbedController {
    /// Create a controller sharing `gateway` with every other embed on the page
    pub fn new(config: EmbedConfig, gateway: Arc<ApiGateway>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            inner: Arc::new(ControllerInner {
                config,
                gateway,
                deferred: Deferred::new(),
                session: Mutex::new(Session {
                    retained: Identifiers::default(),
                    frame: None,
                    monitor: None,
                    retry_count: 0,
                    container: String::new(),
                    status_target: String::new(),
                    epoch: 0,
                }),
                hooks: Arc::new(RwLock::new(MonitorHooks::default())),
            }),
        })
    }

    /// Start a fresh load.
    ///
    /// Supplied fields of `request` overwrite the retained identifiers. If the
    /// resulting address equals the live frame's address the existing frame is
    /// returned untouched. Otherwise a new frame is mounted in `container`, the
    /// call suspends until the host can discover it, and the status monitor is
    /// attached to it.
    ///
    /// Fails synchronously only on construction errors (no id at all).
    #[instrument(skip(self, request), fields(primary = ?request.primary_id, collection = ?request.collection_id))]
    pub async fn load(
        &self,
        request: LoadRequest,
        container: &str,
        status_target: &str,
    ) -> Result<FrameHandle> {
        self.inner
            .clone()
            .load(request, container.to_string(), status_target.to_string(), LoadKind::Fresh)
            .await
    }

    /// Tear down the monitor and remove the frame.
    ///
    /// The completion is neither resolved nor rejected.
    pub async fn destroy(&self) {
        let mut session = self.inner.session.lock().await;
        session.epoch += 1;
        if let Some(monitor) = &session.monitor {
            monitor.destroy();
            // Releases the supervisor waiting on this monitor.
            monitor.reset_pending();
        }
        if let Some(frame) = session.frame.take() {
            self.inner.gateway.host().unmount(&frame);
            info!(frame = frame.id(), "Embed destroyed");
        }
    }

    /// Hook invoked whenever the player reports `Playing`.
    ///
    /// Hooks are shared with the controller's monitor, so registering one
    /// after a load applies to the live player too.
    pub fn on_playing(&self, hook: impl Fn() + Send + Sync + 'static) {
        self.inner.hooks.write().on_playing = Some(Arc::new(hook));
    }

    /// Hook invoked whenever the player reports `Paused`
    pub fn on_paused(&self, hook: impl Fn() + Send + Sync + 'static) {
        self.inner.hooks.write().on_paused = Some(Arc::new(hook));
    }

    /// Playback failures observed since the last fresh load
    pub async fn retry_count(&self) -> u32 {
        self.inner.session.lock().await.retry_count
    }

    pub async fn frame(&self) -> Option<FrameHandle> {
        self.inner.session.lock().await.frame.clone()
    }

    /// Retained identifier set
    pub async fn identifiers(&self) -> Identifiers {
        self.inner.session.lock().await.retained.clone()
    }

    pub async fn monitor(&self) -> Option<StatusMonitor> {
        self.inner.session.lock().await.monitor.clone()
    }

    /// Status of the current player, `Initializing` before the first load
    pub async fn status(&self) -> PlayerStatus {
        self.monitor()
            .await
            .map(|monitor| monitor.status())
            .unwrap_or(PlayerStatus::Initializing)
    }

    pub fn config(&self) -> &EmbedConfig {
        &self.inner.config
    }
}

impl DeferredHolder<EmbedReady> for EmbedController {
    fn deferred(&self) -> &Deferred<EmbedReady> {
        &self.inner.deferred
    }
}

impl ControllerInner {
    fn load(
        self: Arc<Self>,
        request: LoadRequest,
        container: String,
        status_target: String,
        kind: LoadKind,
    ) -> BoxFuture<'static, Result<FrameHandle>> {
        async move {
            let mut session = self.session.lock().await;

            let include_collection = match kind {
                LoadKind::Fresh => true,
                LoadKind::Retry { epoch, include_collection } => {
                    if session.epoch != epoch {
                        debug!("Retry superseded by a newer load");
                        return Err(Error::Superseded);
                    }
                    include_collection
                }
            };
            let fresh = kind == LoadKind::Fresh;

            let mut retained = session.retained.clone();
            retained.merge(&request);
            let mut effective = retained.clone();
            if !include_collection {
                effective.collection_id = None;
            }
            let address = build_address(&effective, &self.config)?;
            session.retained = retained;

            if let Some(frame) = &session.frame {
                let failed = matches!(self.deferred.peek(), Some(Completion::Rejected(_)));
                if frame.address() == address && !failed {
                    debug!(frame = frame.id(), "Address unchanged, keeping frame");
                    return Ok(frame.clone());
                }
            }

            if fresh {
                session.retry_count = 0;
                session.epoch += 1;
                self.deferred.reset();
            }
            session.container = container.clone();
            session.status_target = status_target.clone();
            let epoch = session.epoch;

            let frame = EmbedFrame::create(&address, &self.config);
            info!(frame = frame.id(), address = %address, fresh, "Loading embed");
            self.gateway.host().mount(&container, frame.clone());
            drop(session);

            self.gateway
                .host()
                .wait_for_selector(&frame.selector(), &container)
                .await;

            let mut session = self.session.lock().await;
            if session.epoch != epoch {
                debug!(frame = frame.id(), "Load superseded while attaching");
                self.gateway.host().unmount(&frame);
                return Err(Error::Superseded);
            }

            if let Some(previous) = session.frame.replace(frame.clone()) {
                if previous.id() != frame.id() {
                    self.gateway.host().unmount(&previous);
                }
            }

            let monitor = match &session.monitor {
                Some(monitor) => {
                    monitor.reset(frame.clone());
                    monitor.clone()
                }
                None => {
                    let monitor = StatusMonitor::with_hooks(
                        self.gateway.clone(),
                        frame.clone(),
                        status_target,
                        &self.config,
                        self.hooks.clone(),
                    );
                    monitor.attach();
                    session.monitor = Some(monitor.clone());
                    monitor
                }
            };
            let outcome = monitor.pending();
            drop(session);

            if self.config.load_failure_is_playback_error {
                self.watch_frame_load(frame.clone(), monitor.clone());
            }

            tokio::spawn(self.clone().supervise(epoch, frame.clone(), monitor, outcome));

            Ok(frame)
        }
        .boxed()
    }

    /// Wait for the monitor's outcome and turn it into a resolution or a
    /// retry decision
    fn supervise(
        self: Arc<Self>,
        epoch: u64,
        frame: FrameHandle,
        monitor: StatusMonitor,
        outcome: Pending<Arc<dyn ApiPlayer>>,
    ) -> BoxFuture<'static, ()> {
        async move {
            match outcome.await {
                Ok(player) => {
                    if !self.is_current(epoch, &frame).await {
                        return;
                    }
                    info!(frame = frame.id(), "Embed ready");
                    self.deferred.resolve(EmbedReady { frame, monitor, player });
                }
                Err(Error::Superseded) => {
                    debug!(frame = frame.id(), "Monitor cycle superseded");
                }
                Err(error) => self.retry(epoch, frame, error).await,
            }
        }
        .boxed()
    }

    /// Retry decision, run on every monitor rejection
    async fn retry(self: Arc<Self>, epoch: u64, failed: FrameHandle, error: Error) {
        let (request, kind, container, status_target) = {
            let mut session = self.session.lock().await;
            let is_live = session.frame.as_ref().map(|frame| frame.id()) == Some(failed.id());
            if session.epoch != epoch || !is_live {
                debug!(frame = failed.id(), "Stale failure ignored");
                return;
            }

            session.retry_count += 1;
            let attempt = session.retry_count;
            let limit = self
                .config
                .retry_limit(session.retained.collection_id.is_some());
            warn!(frame = failed.id(), error = %error, attempt, limit, "Embed playback failed");

            if attempt > limit {
                info!(retries = attempt - 1, "Retries exhausted, giving up");
                self.deferred.reject(Error::RetriesExhausted { retries: attempt - 1 });
                return;
            }

            // The first retry drops the collection. With the default limit of
            // one retry a later attempt, which would restore it, is unreachable.
            let kind = LoadKind::Retry {
                epoch,
                include_collection: attempt != 1,
            };

            if let Some(monitor) = &session.monitor {
                monitor.destroy();
            }
            if let Some(frame) = session.frame.take() {
                self.gateway.host().unmount(&frame);
            }

            let request = LoadRequest {
                primary_id: session.retained.primary_id.clone(),
                ..Default::default()
            };
            (request, kind, session.container.clone(), session.status_target.clone())
        };

        info!(primary = ?request.primary_id, "Retrying embed");
        match self.clone().load(request, container, status_target, kind).await {
            Ok(_) | Err(Error::Superseded) => {}
            Err(error) => {
                warn!(error = %error, "Retry could not be started");
                self.deferred.reject(error);
            }
        }
    }

    async fn is_current(&self, epoch: u64, frame: &FrameHandle) -> bool {
        let session = self.session.lock().await;
        session.epoch == epoch && session.frame.as_ref().map(|f| f.id()) == Some(frame.id())
    }

    /// Map a frame-level load failure onto the monitor
    fn watch_frame_load(&self, frame: FrameHandle, monitor: StatusMonitor) {
        let host = self.gateway.host().clone();
        tokio::spawn(async move {
            if let Err(error) = host.wait_for_load(&frame).await {
                if monitor.frame().id() == frame.id() {
                    monitor.report_failure(error);
                }
            }
        });
    }
}
