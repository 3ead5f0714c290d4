//! Embedded player frame element

use crate::EmbedConfig;
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

/// Shared handle to one live frame
pub type FrameHandle = Arc<EmbedFrame>;

/// One embedded player surface.
///
/// The external player API binds to a frame when its player object is
/// constructed and cannot be rebound, so frames are replaced rather than
/// pointed at a new address.
#[derive(Debug)]
pub struct EmbedFrame {
    id: String,
    address: String,
    src: RwLock<String>,
    allow: String,
    allow_fullscreen: bool,
}

impl EmbedFrame {
    /// Create a frame element for an address with a unique element id
    pub fn create(address: impl Into<String>, config: &EmbedConfig) -> FrameHandle {
        let id = format!("{}-{}", config.frame_id_prefix, Uuid::new_v4().simple());
        Arc::new(Self::with_id(id, address, config))
    }

    pub fn with_id(id: impl Into<String>, address: impl Into<String>, config: &EmbedConfig) -> Self {
        let address = address.into();
        Self {
            id: id.into(),
            src: RwLock::new(address.clone()),
            address,
            allow: config.allow.clone(),
            allow_fullscreen: config.allow_fullscreen,
        }
    }

    /// Element id; also the target the player API binds to
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Selector that discovers this frame in its container
    pub fn selector(&self) -> String {
        format!("#{}", self.id)
    }

    /// Address the frame was created with
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Current source; may carry parameters added after creation
    pub fn src(&self) -> String {
        self.src.read().clone()
    }

    pub fn set_src(&self, src: impl Into<String>) {
        *self.src.write() = src.into();
    }

    pub fn allow(&self) -> &str {
        &self.allow
    }

    pub fn allow_fullscreen(&self) -> bool {
        self.allow_fullscreen
    }

    /// Attribute snapshot for hosts and CLI output
    pub fn snapshot(&self) -> FrameSnapshot {
        FrameSnapshot {
            id: self.id.clone(),
            src: self.src(),
            allow: self.allow.clone(),
            allow_fullscreen: self.allow_fullscreen,
        }
    }
}

/// Serializable view of a frame's attributes
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FrameSnapshot {
    pub id: String,
    pub src: String,
    pub allow: String,
    pub allow_fullscreen: bool,
}
