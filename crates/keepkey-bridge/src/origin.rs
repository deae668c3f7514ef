//! Request origin extraction and the allowlist check

use async_trait::async_trait;
use axum::extract::{FromRequestParts, Request, State};
use axum::http::header::{ORIGIN, REFERER};
use axum::http::request::Parts;
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::Response;
use keepkey_core::Origin;
use keepkey_daemon::DaemonContext;
use std::convert::Infallible;
use tracing::{debug, warn};

use crate::error::ApiError;

/// Origin of the calling web app: the `Origin` header, else the `Referer`
pub fn request_origin(headers: &HeaderMap) -> Option<Origin> {
    [ORIGIN, REFERER]
        .iter()
        .filter_map(|name| headers.get(name))
        .filter_map(|value| value.to_str().ok())
        .find_map(|value| match Origin::parse(value) {
            Ok(origin) => Some(origin),
            Err(e) => {
                debug!("Ignoring unusable origin header {:?}: {}", value, e);
                None
            }
        })
}

/// Extractor for the (optional) request origin
#[derive(Debug, Clone)]
pub struct RequestOrigin(pub Option<Origin>);

impl RequestOrigin {
    /// The origin, or 400 when the request carries none
    pub fn required(self) -> Result<Origin, ApiError> {
        self.0
            .ok_or_else(|| ApiError::BadRequest("Unable to determine origin!".to_string()))
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for RequestOrigin
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self(request_origin(&parts.headers)))
    }
}

/// Reject requests from origins the user never approved
pub async fn require_approved_origin(
    State(context): State<DaemonContext>,
    RequestOrigin(origin): RequestOrigin,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let origin = RequestOrigin(origin).required()?;

    if !context.pairing.is_approved(&origin).await {
        warn!("Refusing {} from unapproved origin {}", request.uri().path(), origin);
        return Err(ApiError::Forbidden(format!(
            "Origin {} is not approved",
            origin
        )));
    }

    Ok(next.run(request).await)
}
