//! External player API gateway
//!
//! One gateway is shared by every monitor on a page. It owns the two
//! process-wide resources of the player API: the script element, injected at
//! most once, and the "API ready" continuation chain, which runs every
//! registrant in registration order.

use crate::{
    host::{ApiPlayer, EmbedHost, PlayerApi},
    PlayerEvent, Result,
};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Continuation run once the player API has loaded
pub type ReadyHook = Box<dyn FnOnce() + Send>;

#[derive(Default)]
struct HookChain {
    fired: bool,
    hooks: Vec<ReadyHook>,
}

/// Shared access point to the third-party player API
pub struct ApiGateway {
    api: Arc<dyn PlayerApi>,
    host: Arc<dyn EmbedHost>,
    script_url: String,
    chain: Mutex<HookChain>,
}

impl ApiGateway {
    pub fn new(
        api: Arc<dyn PlayerApi>,
        host: Arc<dyn EmbedHost>,
        script_url: impl Into<String>,
    ) -> Self {
        Self {
            api,
            host,
            script_url: script_url.into(),
            chain: Mutex::new(HookChain::default()),
        }
    }

    /// The API object and its player constructor are available
    pub fn is_loaded(&self) -> bool {
        self.api.is_available()
    }

    pub fn script_url(&self) -> &str {
        &self.script_url
    }

    /// Inject the API script unless a script element for it already exists.
    ///
    /// Returns true if this call injected it.
    pub fn ensure_script(&self) -> bool {
        if self.host.has_script(&self.script_url) {
            return false;
        }
        self.host.inject_script(&self.script_url);
        info!(src = %self.script_url, "Player API script injected");
        true
    }

    /// Register a continuation for the API-ready signal.
    ///
    /// Earlier registrants are kept and run first. If the signal has already
    /// fired and the API is available the continuation runs immediately.
    pub fn on_api_ready(&self, hook: impl FnOnce() + Send + 'static) {
        let mut chain = self.chain.lock();
        if chain.fired && self.is_loaded() {
            drop(chain);
            hook();
            return;
        }
        chain.hooks.push(Box::new(hook));
        debug!(registered = chain.hooks.len(), "API ready continuation chained");
    }

    /// Signal that the API script finished loading.
    ///
    /// Called by the host integration; runs every chained continuation once.
    /// While the API object is still unavailable the continuations stay
    /// chained for the next signal.
    pub fn notify_api_ready(&self) {
        let hooks = {
            let mut chain = self.chain.lock();
            chain.fired = true;
            if !self.is_loaded() {
                warn!(waiting = chain.hooks.len(), "API ready signalled before the API is available");
                return;
            }
            std::mem::take(&mut chain.hooks)
        };
        info!(continuations = hooks.len(), "Player API ready");
        for hook in hooks {
            hook();
        }
    }

    /// Continuations waiting for the API-ready signal
    pub fn pending_hooks(&self) -> usize {
        self.chain.lock().hooks.len()
    }

    /// Construct an API player bound to `target_id`
    pub fn create_player(
        &self,
        target_id: &str,
        events: mpsc::UnboundedSender<PlayerEvent>,
    ) -> Result<Arc<dyn ApiPlayer>> {
        self.api.create_player(target_id, events)
    }

    pub fn host(&self) -> &Arc<dyn EmbedHost> {
        &self.host
    }
}

impl std::fmt::Debug for ApiGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiGateway")
            .field("script_url", &self.script_url)
            .field("loaded", &self.is_loaded())
            .field("pending_hooks", &self.pending_hooks())
            .finish()
    }
}
