//! keepkey-bridge: local bridge between web apps and a KeepKey
//!
//! Hosts the HTTP API, the approver IPC socket and the device watcher in one
//! process.

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use keepkey_bridge::{BridgeServer, DeviceFollower};
use keepkey_daemon::device::DeviceConnector;
use keepkey_daemon::{BridgeControl, DaemonConfig, DaemonContext, DeviceWatcher, IpcServer};

#[derive(Parser, Debug)]
#[command(name = "keepkey-bridge")]
#[command(about = "Local HTTP bridge for the KeepKey hardware wallet")]
#[command(version)]
struct Args {
    /// Config file (defaults to $KEEPKEY_BRIDGE_CONFIG or the user config dir)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Host to bind to
    #[arg(long)]
    host: Option<String>,

    /// Port to bind to
    #[arg(short, long)]
    port: Option<u16>,

    /// Path to the approver IPC socket
    #[arg(long)]
    socket_path: Option<PathBuf>,

    /// Don't start the HTTP server until an approver asks for it
    #[arg(long)]
    no_auto_start: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let default_filter = if args.verbose {
        "keepkey_bridge=debug,keepkey_daemon=debug,tower_http=debug"
    } else {
        "keepkey_bridge=info,keepkey_daemon=info"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting keepkey-bridge v{}", env!("CARGO_PKG_VERSION"));

    let config = load_config(&args)?;
    let socket_path = config.ipc_socket_path.clone();
    let auto_start = config.auto_start;
    let poll_interval = config.device_poll_interval();

    let context = DaemonContext::from_config(config)?;

    if let Some(pioneer) = context.pioneer.clone() {
        tokio::spawn(async move {
            match pioneer.status().await {
                Ok(status) => info!("Pioneer online: {}", status),
                Err(e) => warn!("Pioneer unreachable: {}", e),
            }
        });
    }

    let bridge = Arc::new(BridgeServer::new(context.clone()));
    if auto_start {
        if let Err(e) = bridge.start().await {
            error!("Bridge did not start: {}", e);
        }
    } else {
        info!("Auto start disabled; waiting for a device or an approver to start the bridge");
    }

    // Subscribed before the watcher runs so the first attach is seen
    if context.config.follow_device {
        let follower = DeviceFollower::new(&context, Arc::clone(&bridge) as Arc<dyn BridgeControl>);
        tokio::spawn(follower.run());
    }

    // Start device watcher on a dedicated thread
    // (udev types are not Send, so it gets its own runtime)
    let watcher_handle = {
        let watcher = DeviceWatcher::new(Arc::clone(&context.device), connector(), poll_interval);
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();

        thread::spawn(move || {
            match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(rt) => rt.block_on(async {
                    if let Err(e) = watcher.watch().await {
                        error!("Device watcher error: {}", e);
                    }
                }),
                Err(e) => error!("Failed to create device watcher runtime: {}", e),
            }
            let _ = tx.send(());
        });

        rx
    };

    let ipc_server = IpcServer::new(socket_path, context.clone())
        .with_bridge_control(Arc::clone(&bridge) as Arc<dyn BridgeControl>);
    let ipc_handle = tokio::spawn(async move {
        if let Err(e) = ipc_server.run().await {
            error!("IPC server error: {}", e);
        }
    });

    info!("Bridge started successfully");

    // Wait for shutdown signal
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
        }
        _ = watcher_handle => {
            error!("Device watcher exited unexpectedly");
        }
        _ = ipc_handle => {
            error!("IPC server exited unexpectedly");
        }
    }

    info!("Bridge shutting down");
    bridge.stop().await?;

    Ok(())
}

/// Config file, then environment, then command-line flags
fn load_config(args: &Args) -> Result<DaemonConfig> {
    let config_path = args.config.clone().unwrap_or_else(DaemonConfig::default_path);
    let mut config = DaemonConfig::load_or_create(&config_path)?;
    config.apply_env()?;

    if let Some(host) = &args.host {
        config.http.host = host.clone();
    }
    if let Some(port) = args.port {
        config.http.port = port;
    }
    if let Some(path) = &args.socket_path {
        config.ipc_socket_path = path.clone();
    }
    if args.no_auto_start {
        config.auto_start = false;
    }

    config.ensure_directories()?;
    info!("Config: {:?}", config_path);
    Ok(config)
}

#[cfg(feature = "hid")]
fn connector() -> Arc<dyn DeviceConnector> {
    match keepkey_daemon::device::hid::HidConnector::new() {
        Ok(connector) => Arc::new(connector),
        Err(e) => {
            error!("HID unavailable ({}); no device will be detected", e);
            Arc::new(keepkey_daemon::device::MemoryConnector::new())
        }
    }
}

#[cfg(not(feature = "hid"))]
fn connector() -> Arc<dyn DeviceConnector> {
    warn!("Built without the `hid` feature; no device will be detected");
    Arc::new(keepkey_daemon::device::MemoryConnector::new())
}
