use std::sync::Arc;

use axum::{Json, extract::Extension, http::StatusCode, response::IntoResponse};

use mingle_infra::stores::AccountStore;

use crate::app::services::AppServices;
use crate::context::PrincipalContext;

pub async fn health() -> StatusCode {
    StatusCode::OK
}

pub async fn whoami(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
) -> impl IntoResponse {
    let username = match services.accounts.get(principal.account_id()).await {
        Ok(Some(account)) => Some(account.username),
        _ => None,
    };
    Json(serde_json::json!({
        "account_id": principal.account_id().to_string(),
        "username": username,
    }))
}
