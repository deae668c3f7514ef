//! HTTP server lifecycle
//!
//! The server can be started and stopped repeatedly while the process runs
//! (the approver's "start bridge" / "stop bridge" actions). Every transition
//! is reported to the status tracker.

use async_trait::async_trait;
use keepkey_daemon::{BridgeControl, DaemonContext, DaemonError, Result};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::router::router;

/// How long `stop` waits for in-flight requests before dropping them
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

struct Running {
    local_addr: SocketAddr,
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

/// Start/stop wrapper around `axum::serve`
pub struct BridgeServer {
    context: DaemonContext,
    running: Mutex<Option<Running>>,
    is_running: Arc<AtomicBool>,
}

impl BridgeServer {
    pub fn new(context: DaemonContext) -> Self {
        Self {
            context,
            running: Mutex::new(None),
            is_running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Address actually bound, while running
    pub async fn local_addr(&self) -> Option<SocketAddr> {
        self.running.lock().await.as_ref().map(|r| r.local_addr)
    }

    fn bind_addr(&self) -> String {
        let http = &self.context.config.http;
        format!("{}:{}", http.host, http.port)
    }
}

#[async_trait]
impl BridgeControl for BridgeServer {
    async fn start(&self) -> Result<()> {
        let mut running = self.running.lock().await;
        if running.is_some() {
            return Ok(());
        }

        let addr = self.bind_addr();
        let listener = match TcpListener::bind(&addr).await {
            Ok(listener) => listener,
            Err(e) => {
                error!("Failed to bind {}: {}", addr, e);
                self.context.status.server_failed();
                return Err(DaemonError::Bridge(format!("Failed to bind {}: {}", addr, e)));
            }
        };
        let local_addr = listener.local_addr()?;

        let (shutdown, shutdown_rx) = oneshot::channel::<()>();
        let app = router(self.context.clone());
        let status = Arc::clone(&self.context.status);
        let is_running = Arc::clone(&self.is_running);
        self.is_running.store(true, Ordering::SeqCst);
        self.context.status.server_started();

        let task = tokio::spawn(async move {
            let result = axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await;

            is_running.store(false, Ordering::SeqCst);
            match result {
                Ok(()) => status.server_stopped(),
                Err(e) => {
                    error!("Bridge server failed: {}", e);
                    status.server_failed();
                }
            }
        });

        info!("Bridge listening on http://{}", local_addr);

        *running = Some(Running {
            local_addr,
            shutdown,
            task,
        });
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        let Some(running) = self.running.lock().await.take() else {
            return Ok(());
        };

        info!("Stopping bridge on {}", running.local_addr);
        let _ = running.shutdown.send(());

        let mut task = running.task;
        match tokio::time::timeout(SHUTDOWN_GRACE, &mut task).await {
            Ok(joined) => {
                joined.map_err(|e| DaemonError::Bridge(format!("Server task failed: {}", e)))?
            }
            Err(_) => {
                // Long-polling pair/sign requests keep connections open
                warn!("Requests still in flight after {:?}, aborting", SHUTDOWN_GRACE);
                task.abort();
                self.is_running.store(false, Ordering::SeqCst);
                self.context.status.server_stopped();
            }
        }
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.is_running.load(Ordering::SeqCst)
    }
}
