//! KeepKey Daemon - Runtime services behind the local bridge
//!
//! This crate provides:
//! - Pairing and signing approval gates with per-request correlation
//! - The approved-origin document store
//! - Device transport abstraction, attach/detach tracking and the watcher
//! - Bridge status tracking and the approver event bus
//! - The Pioneer API client
//! - IPC server and client for the approver (GUI or CLI)

pub mod config;
pub mod context;
pub mod device;
pub mod error;
pub mod events;
pub mod ipc;
pub mod origin_store;
pub mod pairing;
pub mod pending;
pub mod pioneer;
pub mod signer;
pub mod status;

pub use config::DaemonConfig;
pub use context::{BridgeControl, DaemonContext};
pub use device::{DeviceManager, DeviceWatcher};
pub use error::{DaemonError, Result};
pub use events::{BridgeEvent, EventBus};
pub use ipc::{IpcClient, IpcServer};
pub use origin_store::OriginStore;
pub use pairing::{PairOutcome, PairingGate};
pub use pioneer::{PioneerApi, PioneerClient};
pub use signer::{SignGate, SignOutcome};
pub use status::{BridgeStatus, StatusTracker};
