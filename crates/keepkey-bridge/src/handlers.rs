//! Route handlers

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use keepkey_core::Chunk;
use keepkey_daemon::pairing::PairOutcome;
use keepkey_daemon::signer::SignOutcome;
use keepkey_daemon::{DaemonContext, DaemonError};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use crate::error::ApiError;
use crate::origin::RequestOrigin;

/// Body of `POST /exchange/device`
#[derive(Debug, Deserialize)]
pub struct ExchangeBody {
    /// Hex-encoded report
    pub data: String,
}

/// Success-shaped answer for device calls with nothing attached
fn not_connected() -> Response {
    Json(json!({
        "success": false,
        "msg": DaemonError::NoDeviceConnected.to_string(),
    }))
    .into_response()
}

/// `GET /status`
pub async fn status(State(context): State<DaemonContext>) -> Json<Value> {
    let status = context.status.current();
    Json(json!({
        "success": true,
        "username": context.username(),
        "status": status.status,
        "state": status.state,
    }))
}

/// `GET /pair/:code`
pub async fn pair(
    State(context): State<DaemonContext>,
    Path(code): Path<String>,
    origin: RequestOrigin,
) -> Result<Json<Value>, ApiError> {
    let origin = origin.required()?;
    info!("Pairing code {} from {}", code, origin);

    match context.pairing.request(origin, code).await? {
        PairOutcome::Approved { code } => Ok(Json(json!({
            "success": true,
            "username": context.username(),
            "code": code,
        }))),
        PairOutcome::Rejected => Ok(Json(json!({
            "success": false,
            "username": context.username(),
            "msg": "User rejected pair request!",
        }))),
    }
}

/// `GET /exchange/device`: read one chunk
pub async fn exchange_read(State(context): State<DaemonContext>) -> Result<Response, ApiError> {
    match context.device.read_chunk().await {
        Ok(chunk) => Ok(Json(json!({ "data": chunk.to_hex() })).into_response()),
        Err(DaemonError::NoDeviceConnected) => Ok(not_connected()),
        Err(e) => Err(e.into()),
    }
}

/// `POST /exchange/device`: write one chunk
pub async fn exchange_write(
    State(context): State<DaemonContext>,
    body: Result<Json<ExchangeBody>, JsonRejection>,
) -> Result<Response, ApiError> {
    if !context.device.is_connected().await {
        return Ok(not_connected());
    }

    let Json(body) = body.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let chunk = Chunk::from_hex(&body.data)
        .map_err(|e| ApiError::BadRequest(format!("Invalid chunk: {}", e)))?;

    match context.device.write_chunk(chunk).await {
        Ok(()) => Ok(Json(json!({})).into_response()),
        Err(DaemonError::NoDeviceConnected) => Ok(not_connected()),
        Err(e) => Err(e.into()),
    }
}

/// `GET /user`: Pioneer user profile, passed through
pub async fn user(State(context): State<DaemonContext>) -> Result<Json<Value>, ApiError> {
    let pioneer = context
        .pioneer
        .as_ref()
        .ok_or(DaemonError::PioneerUnavailable)?;
    Ok(Json(pioneer.user().await?))
}

/// `POST /sign`: wait for the approver to sign the payload
pub async fn sign(
    State(context): State<DaemonContext>,
    RequestOrigin(origin): RequestOrigin,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(payload) = payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;

    match context.signer.request(origin, payload).await? {
        SignOutcome::Signed(signed_tx) => Ok(Json(json!({
            "success": true,
            "status": "signed",
            "signedTx": signed_tx,
        }))),
        SignOutcome::Rejected => Ok(Json(json!({
            "success": false,
            "status": "rejected",
        }))),
    }
}
