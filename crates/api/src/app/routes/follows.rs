use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use uuid::Uuid;

use mingle_core::UserId;
use mingle_follows::Follow;
use mingle_infra::stores::{AccountStore, FollowStore, NotificationStore};
use mingle_notifications::{Notification, NotificationKind};

use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::PrincipalContext;

pub fn router() -> Router {
    Router::new()
        .route("/followers", get(list_followers))
        .route("/following", get(list_following))
        .route("/:followee", post(request_follow).delete(unfollow))
        .route("/:follower/accept", post(accept_follow))
}

pub async fn request_follow(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(followee): Path<Uuid>,
) -> axum::response::Response {
    let follower = principal.account_id();
    let followee = UserId::from_uuid(followee);

    match services.accounts.get(followee).await {
        Ok(Some(account)) if account.is_visible() => {}
        Ok(_) => return errors::json_error(StatusCode::NOT_FOUND, "not_found", "account not found"),
        Err(e) => return errors::store_error_to_response(e),
    }

    let follow = match Follow::request(follower, followee) {
        Ok(follow) => follow,
        Err(e) => return errors::domain_error_to_response(e),
    };

    if let Err(e) = services.follows.request(follow.clone()).await {
        return errors::store_error_to_response(e);
    }

    let notification = Notification::new(follower, followee, NotificationKind::FollowRequest, None);
    if let Err(e) = services.notifications.insert(notification).await {
        tracing::warn!(error = %e, "failed to record follow-request notification");
    }

    (StatusCode::CREATED, Json(dto::follow_to_json(&follow))).into_response()
}

/// The followee accepts a pending request from `follower`.
pub async fn accept_follow(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(follower): Path<Uuid>,
) -> axum::response::Response {
    let followee = principal.account_id();
    let follower = UserId::from_uuid(follower);

    if let Err(e) = services.follows.accept(follower, followee).await {
        return errors::store_error_to_response(e);
    }

    let notification = Notification::new(followee, follower, NotificationKind::FollowAccepted, None);
    if let Err(e) = services.notifications.insert(notification).await {
        tracing::warn!(error = %e, "failed to record follow-accepted notification");
    }

    (StatusCode::OK, Json(serde_json::json!({ "status": "accepted" }))).into_response()
}

pub async fn unfollow(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(followee): Path<Uuid>,
) -> axum::response::Response {
    match services
        .follows
        .remove(principal.account_id(), UserId::from_uuid(followee))
        .await
    {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}

pub async fn list_followers(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
) -> axum::response::Response {
    match services.follows.followers_of(principal.account_id()).await {
        Ok(follows) => {
            let items: Vec<_> = follows.iter().map(dto::follow_to_json).collect();
            (StatusCode::OK, Json(serde_json::json!({ "items": items }))).into_response()
        }
        Err(e) => errors::store_error_to_response(e),
    }
}

pub async fn list_following(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
) -> axum::response::Response {
    match services.follows.following_of(principal.account_id()).await {
        Ok(follows) => {
            let items: Vec<_> = follows.iter().map(dto::follow_to_json).collect();
            (StatusCode::OK, Json(serde_json::json!({ "items": items }))).into_response()
        }
        Err(e) => errors::store_error_to_response(e),
    }
}
