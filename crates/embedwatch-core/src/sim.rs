//! In-memory host page and scriptable player API
//!
//! Used by the `embedwatch simulate` command and by tests to drive a full
//! embed session without a browser. Only `#id` selectors are understood.

use crate::{
    host::{ApiPlayer, EmbedHost, PlayerApi},
    EmbedFrame, Error, FrameHandle, PlayerEvent, Result,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Notify};
use tracing::debug;

// =============================================================================
// Host page
// =============================================================================

/// Host page kept entirely in memory
#[derive(Default)]
pub struct MemoryHost {
    containers: Mutex<HashMap<String, Vec<FrameHandle>>>,
    mounted: Mutex<Vec<FrameHandle>>,
    removed: Mutex<Vec<String>>,
    scripts: Mutex<Vec<String>>,
    texts: Mutex<HashMap<String, String>>,
    failing_loads: Mutex<HashSet<String>>,
    fail_all_loads: AtomicBool,
    selector_waits: AtomicUsize,
    changed: Notify,
}

impl MemoryHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Frames currently mounted in a container, in mount order
    pub fn frames(&self, container: &str) -> Vec<FrameHandle> {
        self.containers
            .lock()
            .get(container)
            .cloned()
            .unwrap_or_default()
    }

    /// Every frame mounted so far, in mount order
    pub fn mounted(&self) -> Vec<FrameHandle> {
        self.mounted.lock().clone()
    }

    /// Ids of every frame removed so far
    pub fn removed(&self) -> Vec<String> {
        self.removed.lock().clone()
    }

    pub fn scripts(&self) -> Vec<String> {
        self.scripts.lock().clone()
    }

    pub fn status_text(&self, target: &str) -> Option<String> {
        self.texts.lock().get(target).cloned()
    }

    /// Number of `wait_for_selector` calls made
    pub fn selector_waits(&self) -> usize {
        self.selector_waits.load(Ordering::SeqCst)
    }

    /// Make every subsequent frame fail its load
    pub fn fail_loads(&self, fail: bool) {
        self.fail_all_loads.store(fail, Ordering::SeqCst);
    }

    /// Make the frame with this id fail its load
    pub fn fail_load_of(&self, frame_id: &str) {
        self.failing_loads.lock().insert(frame_id.to_string());
    }

    fn find(&self, selector: &str, root: &str) -> Option<FrameHandle> {
        let id = selector.strip_prefix('#')?;
        self.containers
            .lock()
            .get(root)?
            .iter()
            .find(|frame| frame.id() == id)
            .cloned()
    }
}

#[async_trait]
impl EmbedHost for MemoryHost {
    fn mount(&self, container: &str, frame: FrameHandle) {
        debug!(container, frame = frame.id(), "Frame mounted");
        self.mounted.lock().push(frame.clone());
        self.containers
            .lock()
            .entry(container.to_string())
            .or_default()
            .push(frame);
        self.changed.notify_waiters();
    }

    fn unmount(&self, frame: &EmbedFrame) {
        let mut containers = self.containers.lock();
        for frames in containers.values_mut() {
            frames.retain(|mounted| mounted.id() != frame.id());
        }
        self.removed.lock().push(frame.id().to_string());
    }

    async fn wait_for_selector(&self, selector: &str, root: &str) -> FrameHandle {
        self.selector_waits.fetch_add(1, Ordering::SeqCst);
        loop {
            let notified = self.changed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(frame) = self.find(selector, root) {
                return frame;
            }
            notified.await;
        }
    }

    async fn wait_for_load(&self, frame: &FrameHandle) -> Result<()> {
        if self.fail_all_loads.load(Ordering::SeqCst) || self.failing_loads.lock().contains(frame.id()) {
            return Err(Error::FrameLoad {
                frame: frame.id().to_string(),
                reason: "frame error signal".to_string(),
            });
        }
        Ok(())
    }

    fn set_status_text(&self, target: &str, text: &str) {
        self.texts.lock().insert(target.to_string(), text.to_string());
    }

    fn has_script(&self, src: &str) -> bool {
        self.scripts.lock().iter().any(|script| script == src)
    }

    fn inject_script(&self, src: &str) {
        self.scripts.lock().push(src.to_string());
    }
}

// =============================================================================
// Player API
// =============================================================================

/// Player API whose players replay queued event scripts
#[derive(Default)]
pub struct ScriptedApi {
    available: AtomicBool,
    fail_creation: AtomicBool,
    scripts: Mutex<VecDeque<Vec<PlayerEvent>>>,
    players: Mutex<Vec<Arc<ScriptedPlayer>>>,
}

impl ScriptedApi {
    /// API that has not loaded yet
    pub fn new() -> Self {
        Self::default()
    }

    /// API that is already available
    pub fn loaded() -> Self {
        let api = Self::default();
        api.set_available(true);
        api
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub fn fail_creation(&self, fail: bool) {
        self.fail_creation.store(fail, Ordering::SeqCst);
    }

    /// Queue the events the next created player emits right after construction
    pub fn push_script(&self, events: impl IntoIterator<Item = PlayerEvent>) {
        self.scripts.lock().push_back(events.into_iter().collect());
    }

    /// Every player created so far
    pub fn players(&self) -> Vec<Arc<ScriptedPlayer>> {
        self.players.lock().clone()
    }

    pub fn last_player(&self) -> Option<Arc<ScriptedPlayer>> {
        self.players.lock().last().cloned()
    }
}

impl PlayerApi for ScriptedApi {
    fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    fn create_player(
        &self,
        target_id: &str,
        events: mpsc::UnboundedSender<PlayerEvent>,
    ) -> Result<Arc<dyn ApiPlayer>> {
        if self.fail_creation.load(Ordering::SeqCst) {
            return Err(Error::player_api(format!("cannot bind player to {target_id}")));
        }

        let player = Arc::new(ScriptedPlayer {
            target_id: target_id.to_string(),
            events: Mutex::new(Some(events)),
            destroyed: AtomicBool::new(false),
        });
        if let Some(script) = self.scripts.lock().pop_front() {
            for event in script {
                player.emit(event);
            }
        }
        self.players.lock().push(player.clone());
        Ok(player)
    }
}

/// Player created by [`ScriptedApi`]
#[derive(Debug)]
pub struct ScriptedPlayer {
    target_id: String,
    events: Mutex<Option<mpsc::UnboundedSender<PlayerEvent>>>,
    destroyed: AtomicBool,
}

impl ScriptedPlayer {
    /// Deliver an event; returns false once the player is destroyed
    pub fn emit(&self, event: PlayerEvent) -> bool {
        match self.events.lock().as_ref() {
            Some(tx) => tx.send(event).is_ok(),
            None => false,
        }
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }
}

impl ApiPlayer for ScriptedPlayer {
    fn target_id(&self) -> &str {
        &self.target_id
    }

    fn destroy(&self) {
        self.destroyed.store(true, Ordering::SeqCst);
        self.events.lock().take();
    }
}
