//! IPC server for approver communication
//!
//! Provides a platform-agnostic interface for the approver (GUI or CLI) to
//! talk to the bridge. Uses Unix domain sockets on Unix-like systems and named
//! pipes on Windows.

mod client;
mod connection;
mod server;
mod types;

#[cfg(unix)]
mod unix;

#[cfg(windows)]
mod windows;

// Public API
pub use client::{IpcClient, IpcSubscription};
pub use server::IpcServer;
pub use types::{IpcRequest, IpcResponse, PendingPair, PendingSign};
