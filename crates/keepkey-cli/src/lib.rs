//! KeepKey CLI - Command-line approver for the local bridge
//!
//! Talks to a running `keepkey-bridge` over its IPC socket to list, approve
//! and reject pairing and signing requests.

pub mod client;
pub mod commands;

pub use client::ApproverClient;
pub use commands::*;
