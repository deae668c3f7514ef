//! KeepKey Bridge - Local HTTP surface for web apps
//!
//! Exposes `/status`, `/pair/:code`, `/exchange/device`, `/user`, `/sign`,
//! `/docs` and `/spec/swagger.json` on localhost. Pairing and signing block
//! until the user decides through the approver IPC.

pub mod docs;
pub mod error;
pub mod follow;
pub mod handlers;
pub mod origin;
pub mod router;
pub mod server;

pub use error::ApiError;
pub use follow::DeviceFollower;
pub use router::router;
pub use server::BridgeServer;
