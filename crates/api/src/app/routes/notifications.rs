use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};

use mingle_infra::stores::NotificationStore;

use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::PrincipalContext;

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_notifications))
        .route("/read-all", post(mark_all_read))
}

pub async fn list_notifications(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Query(page): Query<dto::PageQuery>,
) -> axum::response::Response {
    match services
        .notifications
        .for_receiver(principal.account_id(), page.into())
        .await
    {
        Ok(page) => (
            StatusCode::OK,
            Json(dto::page_to_json(&page, dto::notification_to_json)),
        )
            .into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}

pub async fn mark_all_read(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
) -> axum::response::Response {
    match services
        .notifications
        .mark_all_read(principal.account_id())
        .await
    {
        Ok(updated) => (
            StatusCode::OK,
            Json(serde_json::json!({ "updated": updated })),
        )
            .into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}
