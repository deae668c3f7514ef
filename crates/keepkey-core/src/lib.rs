//! KeepKey Core - Shared types for the KeepKey bridge
//!
//! This crate provides the foundational types used by the bridge daemon,
//! the HTTP surface and the approver CLI.

pub mod error;
pub mod origin;
pub mod state;
pub mod types;

pub use error::{Error, Result};
pub use origin::{ApprovedOrigin, Origin};
pub use state::BridgeState;
pub use types::{Chunk, RequestId};

/// Default TCP port of the local bridge
pub const DEFAULT_BRIDGE_PORT: u16 = 1646;

/// Size of a single KeepKey HID report
pub const CHUNK_SIZE: usize = 64;
