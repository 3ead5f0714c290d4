//! Boundaries to the host page and the third-party player API
//!
//! The core never touches a document or a player script directly. Hosts
//! implement these traits for their environment; [`crate::sim`] provides
//! in-memory implementations.

use crate::{EmbedFrame, FrameHandle, PlayerEvent, Result};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Host page operations used by the controller and the status monitor
#[async_trait]
pub trait EmbedHost: Send + Sync {
    /// Append a frame to the container element
    fn mount(&self, container: &str, frame: FrameHandle);

    /// Remove a frame from wherever it is mounted
    fn unmount(&self, frame: &EmbedFrame);

    /// Suspend until an element matching `selector` exists under `root`.
    ///
    /// Never fails. Each call observes from scratch.
    async fn wait_for_selector(&self, selector: &str, root: &str) -> FrameHandle;

    /// Resolve once the frame finished loading, immediately if it already has.
    /// Fails on the frame's error signal.
    async fn wait_for_load(&self, frame: &FrameHandle) -> Result<()>;

    /// Replace the text of the status display element
    fn set_status_text(&self, target: &str, text: &str);

    /// Whether a script element with this source exists
    fn has_script(&self, src: &str) -> bool;

    /// Append a script element with this source
    fn inject_script(&self, src: &str);
}

/// The third-party player API object
pub trait PlayerApi: Send + Sync {
    /// The API and its player constructor have loaded
    fn is_available(&self) -> bool;

    /// Construct a player bound to the element with id `target_id`.
    ///
    /// The player reports `Ready` once, then `StateChanged` repeatedly, on `events`.
    fn create_player(
        &self,
        target_id: &str,
        events: mpsc::UnboundedSender<PlayerEvent>,
    ) -> Result<Arc<dyn ApiPlayer>>;
}

/// A player object created by [`PlayerApi::create_player`]
pub trait ApiPlayer: Send + Sync + std::fmt::Debug {
    fn target_id(&self) -> &str;

    /// Tear the player down; no events are delivered afterwards
    fn destroy(&self);
}
