//! End-to-end tests for the KeepKey bridge
//!
//! A live HTTP server and IPC socket are driven the way a web app and the
//! `keepkey` approver would drive them.

#![cfg(unix)]

use async_trait::async_trait;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::task::JoinHandle;

use keepkey_bridge::BridgeServer;
use keepkey_cli::ApproverClient;
use keepkey_core::{BridgeState, Chunk};
use keepkey_daemon::device::MemoryTransport;
use keepkey_daemon::{
    BridgeControl, BridgeEvent, DaemonConfig, DaemonContext, IpcServer, PioneerApi, Result,
};

struct StubPioneer;

#[async_trait]
impl PioneerApi for StubPioneer {
    async fn pair(&self, _code: &str) -> Result<Value> {
        Ok(json!({ "success": true }))
    }

    async fn user(&self) -> Result<Value> {
        Ok(json!({ "username": "e2e" }))
    }

    async fn status(&self) -> Result<Value> {
        Ok(json!({ "online": true }))
    }
}

struct Bridge {
    context: DaemonContext,
    server: Arc<BridgeServer>,
    approver: ApproverClient,
    http: reqwest::Client,
    ipc_task: JoinHandle<()>,
    _dir: TempDir,
}

impl Bridge {
    async fn launch() -> Self {
        let dir = TempDir::new().unwrap();
        let mut config = DaemonConfig {
            origin_store_path: dir.path().join("origins.db"),
            ipc_socket_path: dir.path().join("bridge.sock"),
            ..DaemonConfig::default()
        };
        config.http.host = "127.0.0.1".to_string();
        config.http.port = 0;
        config.pioneer.username = Some("e2e".to_string());
        let socket_path = config.ipc_socket_path.clone();

        let context = DaemonContext::new(config, Some(Arc::new(StubPioneer))).unwrap();
        let server = Arc::new(BridgeServer::new(context.clone()));
        server.start().await.unwrap();

        let ipc = IpcServer::new(socket_path.clone(), context.clone())
            .with_bridge_control(Arc::clone(&server) as Arc<dyn BridgeControl>);
        let ipc_task = tokio::spawn(async move {
            let _ = ipc.run().await;
        });

        let approver = ApproverClient::new(socket_path);
        for _ in 0..100 {
            if approver.ping().await.is_ok() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        Self {
            context,
            server,
            approver,
            http: reqwest::Client::new(),
            ipc_task,
            _dir: dir,
        }
    }

    async fn url(&self, path: &str) -> String {
        let addr: SocketAddr = self.server.local_addr().await.unwrap();
        format!("http://{}{}", addr, path)
    }

    async fn wait_for_pending(&self, pairs: usize, signs: usize) {
        for _ in 0..200 {
            let queue = self.approver.pending().await.unwrap();
            if queue.pairs.len() == pairs && queue.signs.len() == signs {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("pending queue never reached {} pairs / {} signs", pairs, signs);
    }
}

impl Drop for Bridge {
    fn drop(&mut self) {
        self.ipc_task.abort();
    }
}

#[tokio::test]
async fn test_pair_then_auto_approve() {
    let bridge = Bridge::launch().await;

    let status: Value = bridge
        .http
        .get(bridge.url("/status").await)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(status["state"], BridgeState::BridgeOnline.code());
    assert_eq!(status["username"], "e2e");

    let pair_url = bridge.url("/pair/E2E1").await;
    let http = bridge.http.clone();
    let first = tokio::spawn(async move {
        http.get(pair_url)
            .header("Origin", "https://dapp.example")
            .send()
            .await
            .unwrap()
            .json::<Value>()
            .await
            .unwrap()
    });

    bridge.wait_for_pending(1, 0).await;
    let queue = bridge.approver.pending().await.unwrap();
    assert_eq!(queue.pairs[0].code, "E2E1");
    let id = queue.find_pair(&queue.pairs[0].request_id.short()).unwrap();
    bridge.approver.approve_pair(id).await.unwrap();

    let body = first.await.unwrap();
    assert_eq!(body, json!({ "success": true, "username": "e2e", "code": "E2E1" }));

    let origins = bridge.approver.origins().await.unwrap();
    assert_eq!(origins.len(), 1);
    assert_eq!(origins[0].origin.as_str(), "https://dapp.example");

    // Known origin: no prompt
    let body: Value = bridge
        .http
        .get(bridge.url("/pair/E2E2").await)
        .header("Origin", "https://dapp.example")
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["success"], true);
    assert_eq!(body["code"], "E2E2");
    assert!(bridge.approver.pending().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_concurrent_pairs_resolve_independently() {
    let bridge = Bridge::launch().await;

    let mut calls = Vec::new();
    for (code, origin) in [("A1", "https://a.example"), ("B2", "https://b.example")] {
        let http = bridge.http.clone();
        let url = bridge.url(&format!("/pair/{}", code)).await;
        calls.push(tokio::spawn(async move {
            http.get(url)
                .header("Origin", origin)
                .send()
                .await
                .unwrap()
                .json::<Value>()
                .await
                .unwrap()
        }));
    }

    bridge.wait_for_pending(2, 0).await;
    let queue = bridge.approver.pending().await.unwrap();
    let a = queue.pairs.iter().find(|p| p.code == "A1").unwrap().request_id;
    let b = queue.pairs.iter().find(|p| p.code == "B2").unwrap().request_id;

    bridge.approver.reject_pair(b).await.unwrap();
    bridge.approver.approve_pair(a).await.unwrap();

    let b_body = calls.pop().unwrap().await.unwrap();
    let a_body = calls.pop().unwrap().await.unwrap();
    assert_eq!(a_body["success"], true);
    assert_eq!(b_body["success"], false);
    assert_eq!(b_body["msg"], "User rejected pair request!");
}

#[tokio::test]
async fn test_sign_through_subscription() {
    let bridge = Bridge::launch().await;
    let mut events = bridge.approver.subscribe().await.unwrap();

    let tx = json!({ "coin": "ETH", "nonce": 7 });
    let http = bridge.http.clone();
    let url = bridge.url("/sign").await;
    let body = tx.clone();
    let call = tokio::spawn(async move {
        http.post(url)
            .json(&body)
            .send()
            .await
            .unwrap()
            .json::<Value>()
            .await
            .unwrap()
    });

    let request_id = loop {
        match events.next_event().await.unwrap() {
            Some(BridgeEvent::SignRequested {
                request_id,
                payload,
                ..
            }) => {
                assert_eq!(payload, tx);
                break request_id;
            }
            Some(_) => continue,
            None => panic!("event stream closed"),
        }
    };

    let signed = json!({ "serialized": "0xf86b07", "hash": "0xabc" });
    bridge
        .approver
        .submit_signed_tx(request_id, signed.clone())
        .await
        .unwrap();

    let body = call.await.unwrap();
    assert_eq!(body["status"], "signed");
    assert_eq!(body["signedTx"], signed);

    // Spent ids are gone
    assert!(bridge.approver.reject_sign(request_id).await.is_err());
}

#[tokio::test]
async fn test_device_exchange() {
    let bridge = Bridge::launch().await;

    let body: Value = bridge
        .http
        .get(bridge.url("/exchange/device").await)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["success"], false);

    let transport = MemoryTransport::new("mem:e2e");
    bridge
        .context
        .device
        .attach(Box::new(transport.clone()))
        .await;
    assert!(bridge.approver.status().await.unwrap().device_connected);

    let reply = Chunk::new(vec![0x3f, 0x23, 0x23, 0x00, 0x11]);
    let response = bridge
        .http
        .post(bridge.url("/exchange/device").await)
        .json(&json!({ "data": "3f2323" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(transport.written(), vec![Chunk::from_hex("3f2323").unwrap()]);

    // Drain the echo, then read the queued reply
    let _ = bridge
        .http
        .get(bridge.url("/exchange/device").await)
        .send()
        .await
        .unwrap();
    transport.push_response(reply.clone());
    let body: Value = bridge
        .http
        .get(bridge.url("/exchange/device").await)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["data"], reply.to_hex());
}

#[tokio::test]
async fn test_stop_and_start_over_ipc() {
    let bridge = Bridge::launch().await;
    let before = bridge.url("/status").await;

    bridge.approver.stop_bridge().await.unwrap();
    let status = bridge.approver.status().await.unwrap();
    assert!(!status.bridge_running);
    assert_eq!(status.state, BridgeState::NoDevices);
    assert!(bridge.http.get(&before).send().await.is_err());

    bridge.approver.start_bridge().await.unwrap();
    let status = bridge.approver.status().await.unwrap();
    assert!(status.bridge_running);

    let response = bridge
        .http
        .get(bridge.url("/status").await)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
}
