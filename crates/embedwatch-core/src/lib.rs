//! Embedwatch Core - Embed lifecycle control for third-party video players
//!
//! This crate creates an embedded player frame inside a host page and keeps
//! watch over it:
//! - Embed address derivation from item/collection identifiers
//! - Player status monitoring through the external player API
//! - Bounded, policy-driven retry when the player fails to load
//! - Resettable single-fire completion for "ready" and "failed"
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                       Embedwatch Core                           │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                                                                 │
//! │  ┌──────────────┐        ┌──────────────────────────┐           │
//! │  │   Address    │───────▶│   Embed Lifecycle        │──▶ ready  │
//! │  │   Builder    │        │   Controller (retry)     │   / failed│
//! │  └──────────────┘        └────────────┬─────────────┘           │
//! │                                       │ frame                   │
//! │                          ┌────────────┴─────────────┐           │
//! │                          │   Player Status Monitor  │           │
//! │                          └────────────┬─────────────┘           │
//! │                                       │ events                  │
//! │  ┌──────────────┐        ┌────────────┴─────────────┐           │
//! │  │  Embed Host  │◀──────▶│      API Gateway         │           │
//! │  │ (host page)  │        │ (script + ready chain)   │           │
//! │  └──────────────┘        └──────────────────────────┘           │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod error;
pub mod types;
pub mod address;
pub mod deferred;
pub mod frame;
pub mod host;
pub mod gateway;
pub mod monitor;
pub mod controller;
pub mod sim;

pub use error::{Error, Result};
pub use types::*;
pub use address::build_address;
pub use deferred::{Completion, Deferred, DeferredHolder, Pending};
pub use frame::{EmbedFrame, FrameHandle, FrameSnapshot};
pub use host::{ApiPlayer, EmbedHost, PlayerApi};
pub use gateway::ApiGateway;
pub use monitor::{status_for_event, StatusMonitor};
pub use controller::{EmbedController, EmbedReady};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize the library
pub fn init() {
    tracing::info!(version = VERSION, "Embedwatch Core initialized");
}
