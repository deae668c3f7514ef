//! CLI command implementations

use chrono::{DateTime, TimeZone, Utc};
use clap::{Parser, Subcommand};
use keepkey_daemon::events::{BridgeEvent, Resolution};
use keepkey_daemon::DaemonConfig;
use serde_json::Value;
use std::path::PathBuf;

use crate::client::{ApproverClient, ClientError, PendingQueue, Result};

/// KeepKey bridge approver
#[derive(Parser)]
#[command(name = "keepkey")]
#[command(about = "Approve pairing and signing requests for the KeepKey bridge")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to the bridge IPC socket (defaults to the one in the bridge config)
    #[arg(long, global = true)]
    pub socket_path: Option<PathBuf>,

    /// Bridge config file used to find the socket
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show bridge status
    Status,

    /// List pairing and signing requests waiting on you
    Pending,

    /// Approve a pairing request
    Approve {
        /// Request id (a unique prefix is enough)
        id: String,
    },

    /// Reject a pairing request
    Reject {
        /// Request id (a unique prefix is enough)
        id: String,
    },

    /// Answer a signing request with a signed transaction
    Sign {
        /// Request id (a unique prefix is enough)
        id: String,

        /// Signed transaction as JSON
        #[arg(required_unless_present = "file", conflicts_with = "file")]
        signed_tx: Option<String>,

        /// Read the signed transaction JSON from a file
        #[arg(short, long)]
        file: Option<PathBuf>,
    },

    /// Reject a signing request
    SignReject {
        /// Request id (a unique prefix is enough)
        id: String,
    },

    /// List approved origins
    Origins,

    /// Stream bridge events until interrupted
    Watch {
        /// Print raw JSON events
        #[arg(long)]
        json: bool,
    },

    /// Start the HTTP server
    Start,

    /// Stop the HTTP server
    Stop,
}

impl Cli {
    /// Explicit socket path, else the one from the bridge config
    pub fn resolve_socket_path(&self) -> Result<PathBuf> {
        if let Some(path) = &self.socket_path {
            return Ok(path.clone());
        }

        let config_path = self.config.clone().unwrap_or_else(DaemonConfig::default_path);
        let config = if config_path.exists() {
            DaemonConfig::load(&config_path)?
        } else {
            DaemonConfig::default()
        };
        Ok(config.ipc_socket_path)
    }
}

/// Run the CLI
pub async fn run(cli: Cli) -> Result<()> {
    let client = ApproverClient::new(cli.resolve_socket_path()?);

    match cli.command {
        Commands::Status => {
            let version = match client.ping().await {
                Ok(version) => version,
                Err(ClientError::BridgeNotRunning) => {
                    println!("KeepKey bridge is not running");
                    println!("Start it with: keepkey-bridge");
                    return Err(ClientError::BridgeNotRunning);
                }
                Err(e) => return Err(e),
            };
            let status = client.status().await?;

            println!("KeepKey bridge v{}", version);
            println!("  State: {} ({})", status.status, status.state.code());
            println!(
                "  HTTP server: {}",
                if status.bridge_running { "running" } else { "stopped" }
            );
            println!(
                "  Device: {}",
                if status.device_connected {
                    "connected"
                } else {
                    "not connected"
                }
            );
        }

        Commands::Pending => {
            let queue = client.pending().await?;
            print_pending(&queue, Utc::now());
        }

        Commands::Approve { id } => {
            let request_id = client.pending().await?.find_pair(&id)?;
            client.approve_pair(request_id).await?;
            println!("Pairing {} approved", request_id.short());
        }

        Commands::Reject { id } => {
            let request_id = client.pending().await?.find_pair(&id)?;
            client.reject_pair(request_id).await?;
            println!("Pairing {} rejected", request_id.short());
        }

        Commands::Sign {
            id,
            signed_tx,
            file,
        } => {
            let raw = match file {
                Some(path) => std::fs::read_to_string(path)?,
                None => signed_tx.unwrap_or_default(),
            };
            let signed_tx: Value = serde_json::from_str(&raw)?;

            let request_id = client.pending().await?.find_sign(&id)?;
            client.submit_signed_tx(request_id, signed_tx).await?;
            println!("Signed transaction delivered for {}", request_id.short());
        }

        Commands::SignReject { id } => {
            let request_id = client.pending().await?.find_sign(&id)?;
            client.reject_sign(request_id).await?;
            println!("Signing {} rejected", request_id.short());
        }

        Commands::Origins => {
            let origins = client.origins().await?;
            if origins.is_empty() {
                println!("No approved origins");
            }
            for approved in origins {
                println!(
                    "{}  approved {}{}",
                    approved.origin,
                    format_millis(approved.added_at),
                    if approved.is_verified { "  (verified)" } else { "" }
                );
            }
        }

        Commands::Watch { json } => {
            let mut subscription = client.subscribe().await?;
            eprintln!("Watching bridge events (Ctrl+C to stop)");

            loop {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => break,
                    event = subscription.next_event() => match event? {
                        Some(event) if json => println!("{}", serde_json::to_string(&event)?),
                        Some(event) => println!("{}  {}", Utc::now().format("%H:%M:%S"), describe_event(&event)),
                        None => {
                            eprintln!("Bridge closed the event stream");
                            break;
                        }
                    },
                }
            }
        }

        Commands::Start => {
            client.start_bridge().await?;
            println!("HTTP server started");
        }

        Commands::Stop => {
            client.stop_bridge().await?;
            println!("HTTP server stopped");
        }
    }

    Ok(())
}

fn print_pending(queue: &PendingQueue, now: DateTime<Utc>) {
    if queue.is_empty() {
        println!("Nothing pending");
        return;
    }

    if !queue.pairs.is_empty() {
        println!("Pairing requests:");
        for pair in &queue.pairs {
            println!(
                "  {}  {}  code {}  ({})",
                pair.request_id.short(),
                pair.origin,
                pair.code,
                format_age(pair.requested_at, now)
            );
        }
    }

    if !queue.signs.is_empty() {
        println!("Signing requests:");
        for sign in &queue.signs {
            let origin = sign
                .origin
                .as_ref()
                .map(|o| o.to_string())
                .unwrap_or_else(|| "unknown origin".to_string());
            println!(
                "  {}  {}  ({})",
                sign.request_id.short(),
                origin,
                format_age(sign.requested_at, now)
            );
            println!("      {}", sign.payload);
        }
    }
}

/// One-line summary of an event
pub fn describe_event(event: &BridgeEvent) -> String {
    match event {
        BridgeEvent::PairRequested {
            request_id,
            origin,
            code,
        } => format!(
            "pair request {} from {} (code {})",
            request_id.short(),
            origin,
            code
        ),
        BridgeEvent::SignRequested {
            request_id, origin, ..
        } => match origin {
            Some(origin) => format!("sign request {} from {}", request_id.short(), origin),
            None => format!("sign request {}", request_id.short()),
        },
        BridgeEvent::RequestResolved {
            request_id,
            resolution,
        } => format!(
            "request {} {}",
            request_id.short(),
            match resolution {
                Resolution::Approved => "approved",
                Resolution::Rejected => "rejected",
                Resolution::Signed => "signed",
                Resolution::TimedOut => "timed out",
                Resolution::Cancelled => "cancelled",
            }
        ),
        BridgeEvent::StateChanged { state, status } => {
            format!("state {} ({})", status, state.code())
        }
        BridgeEvent::OriginApproved { origin } => format!("origin approved: {}", origin),
        BridgeEvent::DeviceAttached { description } => format!("device attached: {}", description),
        BridgeEvent::DeviceDetached => "device detached".to_string(),
        BridgeEvent::ChunkRead { data } => format!("device -> {} bytes", data.len()),
        BridgeEvent::ChunkWritten { data } => format!("device <- {} bytes", data.len()),
    }
}

fn format_age(at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let secs = (now - at).num_seconds().max(0);
    match secs {
        0..=59 => format!("{}s ago", secs),
        60..=3599 => format!("{}m ago", secs / 60),
        _ => format!("{}h ago", secs / 3600),
    }
}

fn format_millis(millis: i64) -> String {
    match Utc.timestamp_millis_opt(millis).single() {
        Some(at) => at.format("%Y-%m-%d %H:%M UTC").to_string(),
        None => millis.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use keepkey_core::{BridgeState, Chunk, Origin, RequestId};

    #[test]
    fn test_cli_parses_sign_variants() {
        let cli = Cli::try_parse_from(["keepkey", "sign", "ab12", r#"{"txid":"00"}"#]).unwrap();
        assert!(matches!(cli.command, Commands::Sign { signed_tx: Some(_), file: None, .. }));

        let cli = Cli::try_parse_from(["keepkey", "sign", "ab12", "--file", "tx.json"]).unwrap();
        assert!(matches!(cli.command, Commands::Sign { signed_tx: None, file: Some(_), .. }));

        assert!(Cli::try_parse_from(["keepkey", "sign", "ab12"]).is_err());
        assert!(
            Cli::try_parse_from(["keepkey", "sign", "ab12", "{}", "--file", "tx.json"]).is_err()
        );
    }

    #[test]
    fn test_explicit_socket_path_wins() {
        let cli = Cli::try_parse_from(["keepkey", "pending", "--socket-path", "/tmp/kk.sock"])
            .unwrap();
        assert_eq!(cli.resolve_socket_path().unwrap(), PathBuf::from("/tmp/kk.sock"));
    }

    #[test]
    fn test_socket_path_from_config() {
        let dir = tempfile::TempDir::new().unwrap();
        let config_path = dir.path().join("config.json");
        let config = DaemonConfig {
            ipc_socket_path: dir.path().join("custom.sock"),
            ..DaemonConfig::default()
        };
        config.save(&config_path).unwrap();

        let cli = Cli::try_parse_from([
            "keepkey",
            "status",
            "--config",
            config_path.to_str().unwrap(),
        ])
        .unwrap();
        assert_eq!(cli.resolve_socket_path().unwrap(), dir.path().join("custom.sock"));
    }

    #[test]
    fn test_describe_events() {
        let id = RequestId::new();
        let origin = Origin::parse("https://app.example.com").unwrap();

        let line = describe_event(&BridgeEvent::PairRequested {
            request_id: id,
            origin: origin.clone(),
            code: "XYZ".to_string(),
        });
        assert_eq!(
            line,
            format!("pair request {} from https://app.example.com (code XYZ)", id.short())
        );

        let line = describe_event(&BridgeEvent::RequestResolved {
            request_id: id,
            resolution: Resolution::TimedOut,
        });
        assert!(line.ends_with("timed out"));

        let line = describe_event(&BridgeEvent::StateChanged {
            state: BridgeState::BridgeOnline,
            status: "bridge online".to_string(),
        });
        assert_eq!(line, "state bridge online (3)");

        let line = describe_event(&BridgeEvent::ChunkWritten {
            data: Chunk::new(vec![0; 64]),
        });
        assert_eq!(line, "device <- 64 bytes");
    }

    #[test]
    fn test_format_age() {
        let now = Utc::now();
        assert_eq!(format_age(now - Duration::seconds(5), now), "5s ago");
        assert_eq!(format_age(now - Duration::seconds(125), now), "2m ago");
        assert_eq!(format_age(now - Duration::hours(3), now), "3h ago");
        assert_eq!(format_age(now + Duration::seconds(5), now), "0s ago");
    }
}
