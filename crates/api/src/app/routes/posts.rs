use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post, put},
};
use uuid::Uuid;

use mingle_core::PostId;
use mingle_infra::jobs::Job;
use mingle_infra::stores::{AccountStore, NotificationStore, PostStore};
use mingle_notifications::{Notification, NotificationKind};
use mingle_posts::{Comment, Post, Reaction};

use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::PrincipalContext;

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_post))
        .route("/:id", get(get_post).delete(delete_post))
        .route("/:id/comments", post(create_comment).get(list_comments))
        .route("/:id/reactions", put(put_reaction).delete(delete_reaction))
}

pub async fn create_post(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<dto::CreatePostRequest>,
) -> axum::response::Response {
    let author = principal.account_id();
    match services.accounts.get(author).await {
        Ok(Some(account)) if account.is_active() => {}
        Ok(_) => {
            return errors::json_error(StatusCode::FORBIDDEN, "forbidden", "account is not active");
        }
        Err(e) => return errors::store_error_to_response(e),
    }

    let post = match Post::create(author, body.body, body.media_keys) {
        Ok(post) => post,
        Err(e) => return errors::domain_error_to_response(e),
    };

    if let Err(e) = services.posts.insert(post.clone()).await {
        return errors::store_error_to_response(e);
    }

    // Media processing and follower fan-out both happen off the request path.
    for attachment in &post.media {
        services.enqueue(Job::process_media(post.id, attachment.key.clone()));
    }
    services.enqueue(Job::notify_followers(author, post.id));

    (StatusCode::CREATED, Json(dto::post_to_json(&post))).into_response()
}

pub async fn get_post(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<Uuid>,
) -> axum::response::Response {
    match services.posts.get(PostId::from_uuid(id)).await {
        Ok(Some(post)) if !post.deleted => {
            (StatusCode::OK, Json(dto::post_to_json(&post))).into_response()
        }
        Ok(_) => errors::json_error(StatusCode::NOT_FOUND, "not_found", "post not found"),
        Err(e) => errors::store_error_to_response(e),
    }
}

/// Soft-delete the caller's post and schedule artifact cleanup.
pub async fn delete_post(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<Uuid>,
) -> axum::response::Response {
    let post_id = PostId::from_uuid(id);
    let post = match services.posts.get(post_id).await {
        Ok(Some(post)) if !post.deleted => post,
        Ok(_) => return errors::json_error(StatusCode::NOT_FOUND, "not_found", "post not found"),
        Err(e) => return errors::store_error_to_response(e),
    };

    if post.author != principal.account_id() {
        return errors::json_error(StatusCode::FORBIDDEN, "forbidden", "not the post author");
    }

    if let Err(e) = services.posts.mark_deleted(post_id).await {
        return errors::store_error_to_response(e);
    }
    services.enqueue(Job::cleanup_post(post_id));

    (
        StatusCode::ACCEPTED,
        Json(serde_json::json!({ "status": "deletion_scheduled" })),
    )
        .into_response()
}

/// Timeline of the caller's accepted followees, newest first.
pub async fn feed(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Query(page): Query<dto::PageQuery>,
) -> axum::response::Response {
    match services.posts.feed(principal.account_id(), page.into()).await {
        Ok(page) => (
            StatusCode::OK,
            Json(dto::page_to_json(&page, dto::post_to_json)),
        )
            .into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}

pub async fn create_comment(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<Uuid>,
    Json(body): Json<dto::CreateCommentRequest>,
) -> axum::response::Response {
    let post_id = PostId::from_uuid(id);
    let post = match services.posts.get(post_id).await {
        Ok(Some(post)) if !post.deleted => post,
        Ok(_) => return errors::json_error(StatusCode::NOT_FOUND, "not_found", "post not found"),
        Err(e) => return errors::store_error_to_response(e),
    };

    let commenter = principal.account_id();
    let comment = match Comment::create(post_id, commenter, body.body) {
        Ok(comment) => comment,
        Err(e) => return errors::domain_error_to_response(e),
    };

    if let Err(e) = services.posts.insert_comment(comment.clone()).await {
        return errors::store_error_to_response(e);
    }

    if post.author != commenter {
        let notification = Notification::new(
            commenter,
            post.author,
            NotificationKind::Comment,
            Some(post_id),
        );
        if let Err(e) = services.notifications.insert(notification).await {
            tracing::warn!(error = %e, "failed to record comment notification");
        }
    }

    (StatusCode::CREATED, Json(dto::comment_to_json(&comment))).into_response()
}

pub async fn list_comments(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<Uuid>,
    Query(page): Query<dto::PageQuery>,
) -> axum::response::Response {
    match services
        .posts
        .comments(PostId::from_uuid(id), page.into())
        .await
    {
        Ok(page) => (
            StatusCode::OK,
            Json(dto::page_to_json(&page, dto::comment_to_json)),
        )
            .into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}

/// Set the caller's reaction; reacting again replaces the kind.
pub async fn put_reaction(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<Uuid>,
    Json(body): Json<dto::ReactionRequest>,
) -> axum::response::Response {
    let post_id = PostId::from_uuid(id);
    let post = match services.posts.get(post_id).await {
        Ok(Some(post)) if !post.deleted => post,
        Ok(_) => return errors::json_error(StatusCode::NOT_FOUND, "not_found", "post not found"),
        Err(e) => return errors::store_error_to_response(e),
    };

    let reactor = principal.account_id();
    let reaction = Reaction::new(post_id, reactor, body.kind);
    if let Err(e) = services.posts.upsert_reaction(reaction).await {
        return errors::store_error_to_response(e);
    }

    if post.author != reactor {
        let notification = Notification::new(
            reactor,
            post.author,
            NotificationKind::Reaction,
            Some(post_id),
        );
        if let Err(e) = services.notifications.insert(notification).await {
            tracing::warn!(error = %e, "failed to record reaction notification");
        }
    }

    StatusCode::NO_CONTENT.into_response()
}

pub async fn delete_reaction(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<Uuid>,
) -> axum::response::Response {
    match services
        .posts
        .delete_reaction(PostId::from_uuid(id), principal.account_id())
        .await
    {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}
