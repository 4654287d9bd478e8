//! HTTP API application wiring (Axum router + service wiring).
//!
//! - `services.rs`: store wiring, job executor, chat hub
//! - `routes/`: HTTP routes + handlers (one file per domain area)
//! - `hub.rs`: per-account realtime channels for the chat relay
//! - `dto.rs`: request/response DTOs and JSON mapping helpers
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use axum::{Extension, Router, routing::get, routing::post};
use tower::ServiceBuilder;

use crate::middleware;

pub mod dto;
pub mod errors;
pub mod hub;
pub mod routes;
pub mod services;

/// Build the full HTTP router (public entrypoint used by `main.rs`).
pub async fn build_app(jwt_secret: String) -> Router {
    let services = Arc::new(services::build_services().await);
    build_app_with_services(jwt_secret, services)
}

/// Router over pre-built services; lets tests inject in-memory stores.
pub fn build_app_with_services(jwt_secret: String, services: Arc<services::AppServices>) -> Router {
    let jwt = Arc::new(mingle_auth::Hs256JwtValidator::new(jwt_secret.into_bytes()));
    let auth_state = middleware::AuthState { jwt };

    // Protected routes: everything that acts as an authenticated account.
    let protected = routes::router()
        .layer(Extension(Arc::clone(&services)))
        .layer(axum::middleware::from_fn_with_state(
            auth_state.clone(),
            middleware::auth_middleware,
        ));

    // Registration is public: a fresh account has no token yet. The websocket
    // route authenticates via a query-parameter token instead of the header
    // middleware, so it sits outside the protected router too.
    Router::new()
        .route("/health", get(routes::system::health))
        .route(
            "/accounts",
            post(routes::accounts::register).layer(Extension(Arc::clone(&services))),
        )
        .route(
            "/chat/ws",
            get(routes::chat::ws)
                .layer::<_, std::convert::Infallible>(Extension(services))
                .layer(Extension(auth_state)),
        )
        .merge(protected)
        .layer(ServiceBuilder::new())
}
