//! Pioneer API client
//!
//! The remote service that records pairings and serves the user profile.
//! Handlers only see the [`PioneerApi`] trait so tests can swap in a stub.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::PioneerConfig;
use crate::error::{DaemonError, Result};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(20);
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Remote pairing and user-profile endpoints
#[async_trait]
pub trait PioneerApi: Send + Sync {
    /// Register a pairing code with the user's account
    async fn pair(&self, code: &str) -> Result<Value>;

    /// Fetch the user profile
    async fn user(&self) -> Result<Value>;

    /// Fetch the service status
    async fn status(&self) -> Result<Value>;
}

/// reqwest-backed [`PioneerApi`]
#[derive(Debug, Clone)]
pub struct PioneerClient {
    http: Client,
    base_url: String,
    query_key: String,
}

impl PioneerClient {
    pub fn new(base_url: &str, query_key: &str) -> Result<Self> {
        let http = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .connect_timeout(DEFAULT_CONNECT_TIMEOUT)
            .build()?;

        Ok(Self {
            http,
            base_url: base_url.trim().trim_end_matches('/').to_owned(),
            query_key: query_key.to_owned(),
        })
    }

    /// Build a client from config, or `None` when no query key is set
    pub fn from_config(config: &PioneerConfig) -> Result<Option<Self>> {
        match config.query_key.as_deref().filter(|k| !k.is_empty()) {
            Some(key) => Self::new(&config.base_url, key).map(Some),
            None => {
                warn!("No Pioneer query key configured; pairing and /user are unavailable");
                Ok(None)
            }
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    async fn read(&self, response: reqwest::Response, what: &str) -> Result<Value> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DaemonError::Pioneer(format!(
                "{} returned {}: {}",
                what, status, body
            )));
        }
        Ok(response.json::<Value>().await?)
    }
}

#[async_trait]
impl PioneerApi for PioneerClient {
    async fn pair(&self, code: &str) -> Result<Value> {
        debug!("Pioneer pair with code {}", code);
        let response = self
            .http
            .post(self.url("pair"))
            .header(reqwest::header::AUTHORIZATION, &self.query_key)
            .json(&json!({ "code": code }))
            .send()
            .await?;
        self.read(response, "pair").await
    }

    async fn user(&self) -> Result<Value> {
        let response = self
            .http
            .get(self.url("user"))
            .header(reqwest::header::AUTHORIZATION, &self.query_key)
            .send()
            .await?;
        self.read(response, "user").await
    }

    async fn status(&self) -> Result<Value> {
        let response = self
            .http
            .get(self.url("status"))
            .header(reqwest::header::AUTHORIZATION, &self.query_key)
            .send()
            .await?;
        self.read(response, "status").await
    }
}
