use std::sync::Arc;

use axum::{
    Json,
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

use mingle_accounts::Account;
use mingle_core::UserId;
use mingle_infra::jobs::Job;
use mingle_infra::stores::AccountStore;

use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::PrincipalContext;

/// Public: token issuance happens outside this system, so registration cannot
/// require one.
pub async fn register(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<dto::RegisterAccountRequest>,
) -> axum::response::Response {
    let account = match Account::register(body.username, body.display_name) {
        Ok(account) => account,
        Err(e) => return errors::domain_error_to_response(e),
    };

    if let Err(e) = services.accounts.insert(account.clone()).await {
        return errors::store_error_to_response(e);
    }

    (StatusCode::CREATED, Json(dto::account_to_json(&account))).into_response()
}

pub async fn get_me(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
) -> axum::response::Response {
    match services.accounts.get(principal.account_id()).await {
        Ok(Some(account)) => {
            (StatusCode::OK, Json(dto::account_to_json(&account))).into_response()
        }
        Ok(None) => errors::json_error(StatusCode::NOT_FOUND, "not_found", "account not found"),
        Err(e) => errors::store_error_to_response(e),
    }
}

pub async fn get_account(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<Uuid>,
) -> axum::response::Response {
    match services.accounts.get(UserId::from_uuid(id)).await {
        Ok(Some(account)) if account.is_visible() => {
            (StatusCode::OK, Json(dto::account_to_json(&account))).into_response()
        }
        Ok(_) => errors::json_error(StatusCode::NOT_FOUND, "not_found", "account not found"),
        Err(e) => errors::store_error_to_response(e),
    }
}

/// Soft-delete the caller's account and schedule artifact cleanup.
pub async fn delete_me(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
) -> axum::response::Response {
    let account_id = principal.account_id();
    if let Err(e) = services.accounts.mark_deleted(account_id).await {
        return errors::store_error_to_response(e);
    }

    services.enqueue(Job::cleanup_account(account_id));

    (
        StatusCode::ACCEPTED,
        Json(serde_json::json!({ "status": "deletion_scheduled" })),
    )
        .into_response()
}
