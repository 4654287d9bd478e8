use axum::{Router, routing::get};

pub mod accounts;
pub mod admin;
pub mod chat;
pub mod follows;
pub mod notifications;
pub mod posts;
pub mod system;

/// Router for all authenticated endpoints.
pub fn router() -> Router {
    Router::new()
        .route("/whoami", get(system::whoami))
        .route("/accounts/me", get(accounts::get_me).delete(accounts::delete_me))
        .route("/accounts/:id", get(accounts::get_account))
        .route("/feed", get(posts::feed))
        .nest("/posts", posts::router())
        .nest("/follows", follows::router())
        .nest("/notifications", notifications::router())
        .nest("/chatrooms", chat::rooms_router())
        .nest("/admin", admin::router())
}
