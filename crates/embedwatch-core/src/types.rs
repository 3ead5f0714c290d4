//! Core types for Embedwatch

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use url::Url;

// =============================================================================
// Identifiers
// =============================================================================

/// The identifier set an embed address is derived from
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identifiers {
    /// Single playable item
    pub primary_id: Option<String>,
    /// Ordered group of items
    pub collection_id: Option<String>,
    /// Playback start offset in seconds
    pub offset_seconds: Option<u32>,
    /// Request the player's scripting capability in the address
    pub api_flag: bool,
}

impl Identifiers {
    /// Identifier set for a single item
    pub fn item(primary_id: impl Into<String>) -> Self {
        Self {
            primary_id: Some(primary_id.into()),
            ..Default::default()
        }
    }

    /// Identifier set for a collection without a starting item
    pub fn collection(collection_id: impl Into<String>) -> Self {
        Self {
            collection_id: Some(collection_id.into()),
            ..Default::default()
        }
    }

    pub fn with_collection(mut self, collection_id: impl Into<String>) -> Self {
        self.collection_id = Some(collection_id.into());
        self
    }

    pub fn with_offset(mut self, seconds: u32) -> Self {
        self.offset_seconds = Some(seconds);
        self
    }

    pub fn with_api_flag(mut self, enabled: bool) -> Self {
        self.api_flag = enabled;
        self
    }

    /// At least one of the two ids is present
    pub fn has_id(&self) -> bool {
        self.primary_id.is_some() || self.collection_id.is_some()
    }

    /// Overwrite retained fields with every supplied value.
    ///
    /// `None` leaves the retained value untouched; it never clears.
    pub fn merge(&mut self, update: &LoadRequest) {
        if let Some(ref id) = update.primary_id {
            self.primary_id = Some(id.clone());
        }
        if let Some(ref id) = update.collection_id {
            self.collection_id = Some(id.clone());
        }
        if let Some(offset) = update.offset_seconds {
            self.offset_seconds = Some(offset);
        }
        if let Some(flag) = update.api_flag {
            self.api_flag = flag;
        }
    }
}

/// Identifier fields supplied to a load; omitted fields keep their retained value
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadRequest {
    pub primary_id: Option<String>,
    pub collection_id: Option<String>,
    pub offset_seconds: Option<u32>,
    pub api_flag: Option<bool>,
}

impl LoadRequest {
    pub fn item(primary_id: impl Into<String>) -> Self {
        Self {
            primary_id: Some(primary_id.into()),
            ..Default::default()
        }
    }

    pub fn collection(collection_id: impl Into<String>) -> Self {
        Self {
            collection_id: Some(collection_id.into()),
            ..Default::default()
        }
    }

    pub fn with_collection(mut self, collection_id: impl Into<String>) -> Self {
        self.collection_id = Some(collection_id.into());
        self
    }

    pub fn with_offset(mut self, seconds: u32) -> Self {
        self.offset_seconds = Some(seconds);
        self
    }

    pub fn with_api_flag(mut self, enabled: bool) -> Self {
        self.api_flag = Some(enabled);
        self
    }
}

impl From<Identifiers> for LoadRequest {
    fn from(ids: Identifiers) -> Self {
        Self {
            primary_id: ids.primary_id,
            collection_id: ids.collection_id,
            offset_seconds: ids.offset_seconds,
            api_flag: Some(ids.api_flag),
        }
    }
}

// =============================================================================
// Player Status
// =============================================================================

/// Semantic player status derived from raw API state codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PlayerStatus {
    /// No event received yet
    Initializing,
    Unstarted,
    Buffering,
    Playing,
    Paused,
    Ended,
    /// Player is usable
    Ready,
    /// Player failed to load
    Error,
    Stopped,
}

impl PlayerStatus {
    /// Raw state code table shared by every event kind
    pub fn from_code(code: i32) -> Option<PlayerStatus> {
        match code {
            1 => Some(PlayerStatus::Playing),
            2 => Some(PlayerStatus::Paused),
            0 => Some(PlayerStatus::Ended),
            3 => Some(PlayerStatus::Buffering),
            -1 => Some(PlayerStatus::Unstarted),
            _ => None,
        }
    }

    /// Ready and Error settle a monitor's completion
    pub fn is_terminal(&self) -> bool {
        matches!(self, PlayerStatus::Ready | PlayerStatus::Error)
    }
}

impl std::fmt::Display for PlayerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlayerStatus::Initializing => write!(f, "Initializing"),
            PlayerStatus::Unstarted => write!(f, "Unstarted"),
            PlayerStatus::Buffering => write!(f, "Buffering"),
            PlayerStatus::Playing => write!(f, "Playing"),
            PlayerStatus::Paused => write!(f, "Paused"),
            PlayerStatus::Ended => write!(f, "Ended"),
            PlayerStatus::Ready => write!(f, "Ready"),
            PlayerStatus::Error => write!(f, "Error"),
            PlayerStatus::Stopped => write!(f, "Stopped"),
        }
    }
}

/// Events pushed by the external player API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlayerEvent {
    /// Fired once after construction, carrying the initial state.
    /// `None` when the initial-state query failed.
    Ready(Option<i32>),
    /// Fired on every state change
    StateChanged(i32),
}

// =============================================================================
// Configuration
// =============================================================================

/// Embed configuration with every recognized field and its default
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbedConfig {
    /// Base of every item path; ids are appended as one path segment
    pub embed_base: String,
    /// Reserved item path used for collection-only embeds
    pub collection_item: String,
    /// Query parameter carrying the collection id
    pub collection_param: String,
    /// Query parameter enabling the scripting capability
    pub capability_param: String,
    /// Query parameter carrying the start offset
    pub offset_param: String,
    /// Script that provides the external player API
    pub api_script_url: String,
    /// Prefix of the status display text
    pub status_label: String,
    /// Prefix for generated frame element ids
    pub frame_id_prefix: String,
    /// Permissions granted to the frame
    pub allow: String,
    pub allow_fullscreen: bool,
    /// Retries granted to a session with a collection id
    pub collection_retry_limit: u32,
    /// Retries granted to a single-item session
    pub single_item_retry_limit: u32,
    /// Treat a frame-level load failure like an `Error` status
    pub load_failure_is_playback_error: bool,
}

impl Default for EmbedConfig {
    fn default() -> Self {
        Self {
            embed_base: "https://www.youtube.com/embed/".to_string(),
            collection_item: "videoseries".to_string(),
            collection_param: "list".to_string(),
            capability_param: "enablejsapi".to_string(),
            offset_param: "start".to_string(),
            api_script_url: "https://www.youtube.com/iframe_api".to_string(),
            status_label: "Video: ".to_string(),
            frame_id_prefix: "youtubePlayer".to_string(),
            allow: "accelerometer; autoplay; clipboard-write; encrypted-media; gyroscope; picture-in-picture"
                .to_string(),
            allow_fullscreen: true,
            collection_retry_limit: 1,
            single_item_retry_limit: 0,
            load_failure_is_playback_error: false,
        }
    }
}

impl EmbedConfig {
    /// Load a configuration from JSON; missing fields take their defaults
    pub fn from_json(json: &str) -> Result<Self> {
        let config: EmbedConfig =
            serde_json::from_str(json).map_err(|e| Error::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check that the address-related fields can produce valid addresses
    pub fn validate(&self) -> Result<()> {
        let base = Url::parse(&self.embed_base)
            .map_err(|e| Error::InvalidConfig(format!("embed_base: {e}")))?;
        if base.cannot_be_a_base() {
            return Err(Error::InvalidConfig("embed_base cannot carry a path".into()));
        }
        for (name, value) in [
            ("collection_item", &self.collection_item),
            ("collection_param", &self.collection_param),
            ("capability_param", &self.capability_param),
            ("offset_param", &self.offset_param),
        ] {
            if value.is_empty() {
                return Err(Error::InvalidConfig(format!("{name} must not be empty")));
            }
        }
        Ok(())
    }

    /// Retry bound for a session
    pub fn retry_limit(&self, has_collection: bool) -> u32 {
        if has_collection {
            self.collection_retry_limit
        } else {
            self.single_item_retry_limit
        }
    }
}
