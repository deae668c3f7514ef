//! HTTP routes

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use keepkey_daemon::DaemonContext;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::{docs, handlers, origin};

/// Build the bridge router
///
/// Device, user and sign routes additionally require an approved origin
/// when `enforce_origin_allowlist` is set.
pub fn router(context: DaemonContext) -> Router {
    let mut protected: Router<DaemonContext> = Router::new()
        .route(
            "/exchange/device",
            get(handlers::exchange_read).post(handlers::exchange_write),
        )
        .route("/user", get(handlers::user))
        .route("/sign", post(handlers::sign));

    if context.config.enforce_origin_allowlist {
        protected = protected.route_layer(middleware::from_fn_with_state(
            context.clone(),
            origin::require_approved_origin,
        ));
    }

    // Called from arbitrary web apps
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/status", get(handlers::status))
        .route("/pair/:code", get(handlers::pair))
        .route("/docs", get(docs::docs))
        .route("/spec/swagger.json", get(docs::swagger))
        .merge(protected)
        .with_state(context)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}
