//! Chatroom management and the realtime websocket relay.
//!
//! Authentication happens before the upgrade: browsers cannot set headers on
//! a websocket handshake, so the token arrives as a query parameter and a bad
//! token rejects the connection outright. Validation failures after the
//! upgrade (unknown room, non-member, bad body) are delivered as `error`
//! events on the open socket instead of closing it.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{
        Extension, Path, Query, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use chrono::Utc;
use serde::Deserialize;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, warn};
use uuid::Uuid;

use mingle_auth::JwtValidator;
use mingle_chat::{ChatMessage, ChatSendError, Chatroom};
use mingle_core::{ChatroomId, UserId};
use mingle_infra::stores::{AccountStore, ChatStore, NotificationStore};
use mingle_notifications::{Notification, NotificationKind};

use crate::app::hub::{ClientEvent, ServerEvent};
use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::PrincipalContext;
use crate::middleware::AuthState;

pub fn rooms_router() -> Router {
    Router::new()
        .route("/", get(list_chatrooms).post(create_chatroom))
        .route("/:id/messages", get(list_messages))
}

pub async fn create_chatroom(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<dto::CreateChatroomRequest>,
) -> Response {
    for member in &body.member_ids {
        match services.accounts.get(*member).await {
            Ok(Some(account)) if account.is_visible() => {}
            Ok(_) => {
                return errors::json_error(
                    StatusCode::NOT_FOUND,
                    "not_found",
                    format!("account {member} not found"),
                );
            }
            Err(e) => return errors::store_error_to_response(e),
        }
    }

    let room = match Chatroom::create(principal.account_id(), body.member_ids) {
        Ok(room) => room,
        Err(e) => return errors::domain_error_to_response(e),
    };

    if let Err(e) = services.chat.create_chatroom(room.clone()).await {
        return errors::store_error_to_response(e);
    }

    (StatusCode::CREATED, Json(dto::chatroom_to_json(&room))).into_response()
}

pub async fn list_chatrooms(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
) -> Response {
    match services.chat.chatrooms_of(principal.account_id()).await {
        Ok(rooms) => {
            let items: Vec<_> = rooms.iter().map(dto::chatroom_to_json).collect();
            (StatusCode::OK, Json(serde_json::json!({ "items": items }))).into_response()
        }
        Err(e) => errors::store_error_to_response(e),
    }
}

pub async fn list_messages(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<Uuid>,
    Query(page): Query<dto::PageQuery>,
) -> Response {
    let room_id = ChatroomId::from_uuid(id);
    let room = match services.chat.get_chatroom(room_id).await {
        Ok(Some(room)) => room,
        Ok(None) => {
            return errors::json_error(StatusCode::NOT_FOUND, "not_found", "chatroom not found");
        }
        Err(e) => return errors::store_error_to_response(e),
    };
    if !room.is_member(principal.account_id()) {
        return errors::json_error(
            StatusCode::FORBIDDEN,
            "forbidden",
            "not a member of this chatroom",
        );
    }

    match services.chat.messages(room_id, page.into()).await {
        Ok(page) => (
            StatusCode::OK,
            Json(dto::page_to_json(&page, dto::message_to_json)),
        )
            .into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}

#[derive(Debug, Deserialize)]
pub struct WsAuthQuery {
    pub token: String,
}

/// Upgrade to a websocket chat session. The bearer token comes in as a query
/// parameter; an invalid token or inactive account rejects the connection
/// before the upgrade.
pub async fn ws(
    ws: WebSocketUpgrade,
    Extension(services): Extension<Arc<AppServices>>,
    Extension(auth): Extension<AuthState>,
    Query(query): Query<WsAuthQuery>,
) -> Response {
    let claims = match auth.jwt.validate(&query.token, Utc::now()) {
        Ok(claims) => claims,
        Err(_) => {
            return errors::json_error(StatusCode::UNAUTHORIZED, "unauthorized", "invalid token");
        }
    };

    let account = claims.sub;
    match services.accounts.get(account).await {
        Ok(Some(a)) if a.is_active() => {}
        Ok(_) => {
            return errors::json_error(
                StatusCode::UNAUTHORIZED,
                "unauthorized",
                "account is not active",
            );
        }
        Err(e) => return errors::store_error_to_response(e),
    }

    ws.on_upgrade(move |socket| chat_session(socket, services, account))
}

/// One connected socket: relay inbound sends and deliver hub events until
/// either side closes.
async fn chat_session(mut socket: WebSocket, services: Arc<AppServices>, account: UserId) {
    let mut rx = services.hub.subscribe(account);
    debug!(account = %account, "chat session opened");

    loop {
        tokio::select! {
            inbound = socket.recv() => match inbound {
                Some(Ok(Message::Text(text))) => {
                    let event = match serde_json::from_str::<ClientEvent>(&text) {
                        Ok(event) => event,
                        Err(e) => {
                            let err = ServerEvent::error("malformed_event", e.to_string());
                            if send_event(&mut socket, &err).await.is_err() {
                                break;
                            }
                            continue;
                        }
                    };
                    if let Err(err) = handle_client_event(&services, account, event).await {
                        if send_event(&mut socket, &err).await.is_err() {
                            break;
                        }
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {} // ping/pong/binary, nothing to do
                Some(Err(e)) => {
                    debug!(account = %account, error = %e, "chat socket error");
                    break;
                }
            },
            outbound = rx.recv() => match outbound {
                Ok(event) => {
                    if send_event(&mut socket, &event).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(account = %account, skipped, "chat subscriber lagged");
                }
                Err(RecvError::Closed) => break,
            },
        }
    }

    debug!(account = %account, "chat session closed");
}

/// Validate and persist an inbound send, then relay it to every member.
/// Members without a live socket get a message notification instead.
async fn handle_client_event(
    services: &AppServices,
    sender: UserId,
    event: ClientEvent,
) -> Result<(), ServerEvent> {
    let ClientEvent::Send { chatroom_id, body } = event;

    let room_id = chatroom_id
        .parse::<Uuid>()
        .map(ChatroomId::from_uuid)
        .map_err(|_| ServerEvent::error("invalid_chatroom", "chatroom id is not a uuid"))?;

    let room = services
        .chat
        .get_chatroom(room_id)
        .await
        .map_err(|e| ServerEvent::error("storage", e.to_string()))?
        .ok_or_else(|| {
            ServerEvent::error("unknown_chatroom", ChatSendError::UnknownChatroom.to_string())
        })?;

    if !room.is_member(sender) {
        return Err(ServerEvent::error(
            "not_a_member",
            ChatSendError::NotAMember.to_string(),
        ));
    }

    let message = ChatMessage::create(room_id, sender, body).map_err(|e| match e {
        ChatSendError::EmptyBody => ServerEvent::error("empty_body", e.to_string()),
        ChatSendError::BodyTooLong => ServerEvent::error("body_too_long", e.to_string()),
        other => ServerEvent::error("invalid_message", other.to_string()),
    })?;

    services
        .chat
        .append_message(message.clone())
        .await
        .map_err(|e| ServerEvent::error("storage", e.to_string()))?;

    for member in &room.members {
        let delivered = services.hub.publish(*member, ServerEvent::message(&message));
        if !delivered && *member != sender {
            let notification =
                Notification::new(sender, *member, NotificationKind::Message, None);
            if let Err(e) = services.notifications.insert(notification).await {
                warn!(error = %e, "failed to record offline chat notification");
            }
        }
    }

    Ok(())
}

async fn send_event(socket: &mut WebSocket, event: &ServerEvent) -> Result<(), axum::Error> {
    let text = serde_json::to_string(event).unwrap_or_default();
    socket.send(Message::Text(text)).await
}
