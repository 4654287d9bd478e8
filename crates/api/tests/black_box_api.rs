use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use mingle_auth::AuthClaims;
use mingle_core::UserId;
use reqwest::StatusCode;
use serde_json::json;

struct TestServer {
    base_url: String,
    handle: tokio::task::JoinHandle<()>,
    // Holding the handle keeps the background job executor alive.
    _executor: mingle_infra::jobs::JobExecutorHandle,
}

impl TestServer {
    async fn spawn(jwt_secret: &str) -> Self {
        // Same router as prod, in-memory stores, bound to an ephemeral port.
        let services = Arc::new(mingle_api::app::services::build_in_memory_services());
        let executor = services.spawn_executor();
        let app =
            mingle_api::app::build_app_with_services(jwt_secret.to_string(), Arc::clone(&services));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url,
            handle,
            _executor: executor,
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn mint_jwt(jwt_secret: &str, account_id: UserId) -> String {
    let now = Utc::now();
    let claims = AuthClaims {
        sub: account_id,
        iat: now - ChronoDuration::minutes(1),
        exp: now + ChronoDuration::minutes(10),
    };

    jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(jwt_secret.as_bytes()),
    )
    .expect("failed to encode jwt")
}

/// Register an account and return `(id, bearer token)`.
async fn register(
    client: &reqwest::Client,
    base_url: &str,
    jwt_secret: &str,
    username: &str,
) -> (UserId, String) {
    let res = client
        .post(format!("{}/accounts", base_url))
        .json(&json!({ "username": username, "display_name": username }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);

    let body: serde_json::Value = res.json().await.unwrap();
    let id: UserId = body["id"].as_str().unwrap().parse().unwrap();
    let token = mint_jwt(jwt_secret, id);
    (id, token)
}

/// Notification fan-out runs on the background executor; poll briefly until
/// the expected kind shows up in the receiver's list.
async fn wait_for_notification(
    client: &reqwest::Client,
    base_url: &str,
    token: &str,
    kind: &str,
) -> serde_json::Value {
    for _ in 0..100 {
        let res = client
            .get(format!("{}/notifications", base_url))
            .bearer_auth(token)
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);

        let body: serde_json::Value = res.json().await.unwrap();
        if let Some(found) = body["items"]
            .as_array()
            .unwrap()
            .iter()
            .find(|n| n["kind"] == kind)
        {
            return found.clone();
        }

        tokio::time::sleep(std::time::Duration::from_millis(25)).await;
    }

    panic!("notification of kind {kind} did not arrive within timeout");
}

#[tokio::test]
async fn auth_required_for_protected_endpoints() {
    let jwt_secret = "test-secret";
    let srv = TestServer::spawn(jwt_secret).await;

    let client = reqwest::Client::new();
    let res = client
        .get(format!("{}/whoami", srv.base_url))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn whoami_reflects_registered_account() {
    let jwt_secret = "test-secret";
    let srv = TestServer::spawn(jwt_secret).await;

    let client = reqwest::Client::new();
    let (id, token) = register(&client, &srv.base_url, jwt_secret, "alice").await;

    let res = client
        .get(format!("{}/whoami", srv.base_url))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["account_id"].as_str().unwrap(), id.to_string());
    assert_eq!(body["username"], "alice");

    let res = client
        .get(format!("{}/accounts/me", srv.base_url))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let me: serde_json::Value = res.json().await.unwrap();
    assert_eq!(me["id"].as_str().unwrap(), id.to_string());
    assert_eq!(me["status"], "active");
}

#[tokio::test]
async fn duplicate_username_is_rejected() {
    let jwt_secret = "test-secret";
    let srv = TestServer::spawn(jwt_secret).await;

    let client = reqwest::Client::new();
    register(&client, &srv.base_url, jwt_secret, "alice").await;

    let res = client
        .post(format!("{}/accounts", srv.base_url))
        .json(&json!({ "username": "alice", "display_name": "imposter" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn self_follow_is_rejected() {
    let jwt_secret = "test-secret";
    let srv = TestServer::spawn(jwt_secret).await;

    let client = reqwest::Client::new();
    let (id, token) = register(&client, &srv.base_url, jwt_secret, "alice").await;

    let res = client
        .post(format!("{}/follows/{}", srv.base_url, id))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn accepted_follow_puts_posts_in_the_feed() {
    let jwt_secret = "test-secret";
    let srv = TestServer::spawn(jwt_secret).await;

    let client = reqwest::Client::new();
    let (alice_id, alice_token) = register(&client, &srv.base_url, jwt_secret, "alice").await;
    let (bob_id, bob_token) = register(&client, &srv.base_url, jwt_secret, "bob").await;

    // Bob requests to follow Alice.
    let res = client
        .post(format!("{}/follows/{}", srv.base_url, alice_id))
        .bearer_auth(&bob_token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);

    // Pending follow does not expose Alice's posts yet.
    let res = client
        .post(format!("{}/posts", srv.base_url))
        .bearer_auth(&alice_token)
        .json(&json!({ "body": "before accept" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);

    let res = client
        .get(format!("{}/feed", srv.base_url))
        .bearer_auth(&bob_token)
        .send()
        .await
        .unwrap();
    let body: serde_json::Value = res.json().await.unwrap();
    assert!(body["items"].as_array().unwrap().is_empty());

    // Alice accepts; her posts now appear in Bob's feed.
    let res = client
        .post(format!("{}/follows/{}/accept", srv.base_url, bob_id))
        .bearer_auth(&alice_token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = client
        .get(format!("{}/feed", srv.base_url))
        .bearer_auth(&bob_token)
        .send()
        .await
        .unwrap();
    let body: serde_json::Value = res.json().await.unwrap();
    let items = body["items"].as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["body"], "before accept");
}

#[tokio::test]
async fn new_post_fans_out_to_accepted_followers() {
    let jwt_secret = "test-secret";
    let srv = TestServer::spawn(jwt_secret).await;

    let client = reqwest::Client::new();
    let (alice_id, alice_token) = register(&client, &srv.base_url, jwt_secret, "alice").await;
    let (bob_id, bob_token) = register(&client, &srv.base_url, jwt_secret, "bob").await;

    let res = client
        .post(format!("{}/follows/{}", srv.base_url, alice_id))
        .bearer_auth(&bob_token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);

    let res = client
        .post(format!("{}/follows/{}/accept", srv.base_url, bob_id))
        .bearer_auth(&alice_token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = client
        .post(format!("{}/posts", srv.base_url))
        .bearer_auth(&alice_token)
        .json(&json!({ "body": "hello followers" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let post: serde_json::Value = res.json().await.unwrap();

    // Fan-out happens on the job executor, not the request path.
    let notification =
        wait_for_notification(&client, &srv.base_url, &bob_token, "new_post").await;
    assert_eq!(notification["sender_id"], json!(alice_id.to_string()));
    assert_eq!(notification["post_id"], post["id"]);

    // The request itself told Bob the follow was accepted.
    let res = client
        .get(format!("{}/notifications", srv.base_url))
        .bearer_auth(&bob_token)
        .send()
        .await
        .unwrap();
    let body: serde_json::Value = res.json().await.unwrap();
    assert!(
        body["items"]
            .as_array()
            .unwrap()
            .iter()
            .any(|n| n["kind"] == "follow_accepted")
    );

    // Mark-all-read reports how many it flipped.
    let res = client
        .post(format!("{}/notifications/read-all", srv.base_url))
        .bearer_auth(&bob_token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: serde_json::Value = res.json().await.unwrap();
    assert!(body["updated"].as_u64().unwrap() >= 2);
}

#[tokio::test]
async fn comments_and_reactions_notify_the_author() {
    let jwt_secret = "test-secret";
    let srv = TestServer::spawn(jwt_secret).await;

    let client = reqwest::Client::new();
    let (_alice_id, alice_token) = register(&client, &srv.base_url, jwt_secret, "alice").await;
    let (bob_id, bob_token) = register(&client, &srv.base_url, jwt_secret, "bob").await;

    let res = client
        .post(format!("{}/posts", srv.base_url))
        .bearer_auth(&alice_token)
        .json(&json!({ "body": "what a day" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let post: serde_json::Value = res.json().await.unwrap();
    let post_id = post["id"].as_str().unwrap();

    let res = client
        .post(format!("{}/posts/{}/comments", srv.base_url, post_id))
        .bearer_auth(&bob_token)
        .json(&json!({ "body": "agreed!" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);

    let res = client
        .put(format!("{}/posts/{}/reactions", srv.base_url, post_id))
        .bearer_auth(&bob_token)
        .json(&json!({ "kind": "like" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NO_CONTENT);

    let comment = wait_for_notification(&client, &srv.base_url, &alice_token, "comment").await;
    assert_eq!(comment["sender_id"], json!(bob_id.to_string()));
    let reaction = wait_for_notification(&client, &srv.base_url, &alice_token, "reaction").await;
    assert_eq!(reaction["post_id"].as_str().unwrap(), post_id);

    // Comment listing shows the new comment.
    let res = client
        .get(format!("{}/posts/{}/comments", srv.base_url, post_id))
        .bearer_auth(&alice_token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["items"].as_array().unwrap().len(), 1);
    assert_eq!(body["items"][0]["body"], "agreed!");
}

#[tokio::test]
async fn oversized_post_body_is_rejected() {
    let jwt_secret = "test-secret";
    let srv = TestServer::spawn(jwt_secret).await;

    let client = reqwest::Client::new();
    let (_id, token) = register(&client, &srv.base_url, jwt_secret, "alice").await;

    let res = client
        .post(format!("{}/posts", srv.base_url))
        .bearer_auth(&token)
        .json(&json!({ "body": "x".repeat(2001) }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn deleted_post_disappears_and_cleanup_is_scheduled() {
    let jwt_secret = "test-secret";
    let srv = TestServer::spawn(jwt_secret).await;

    let client = reqwest::Client::new();
    let (_alice_id, alice_token) = register(&client, &srv.base_url, jwt_secret, "alice").await;
    let (_bob_id, bob_token) = register(&client, &srv.base_url, jwt_secret, "bob").await;

    let res = client
        .post(format!("{}/posts", srv.base_url))
        .bearer_auth(&alice_token)
        .json(&json!({ "body": "fleeting" }))
        .send()
        .await
        .unwrap();
    let post: serde_json::Value = res.json().await.unwrap();
    let post_id = post["id"].as_str().unwrap();

    // Only the author may delete.
    let res = client
        .delete(format!("{}/posts/{}", srv.base_url, post_id))
        .bearer_auth(&bob_token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    let res = client
        .delete(format!("{}/posts/{}", srv.base_url, post_id))
        .bearer_auth(&alice_token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::ACCEPTED);

    let res = client
        .get(format!("{}/posts/{}", srv.base_url, post_id))
        .bearer_auth(&alice_token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn deactivated_account_vanishes_from_lookups() {
    let jwt_secret = "test-secret";
    let srv = TestServer::spawn(jwt_secret).await;

    let client = reqwest::Client::new();
    let (alice_id, alice_token) = register(&client, &srv.base_url, jwt_secret, "alice").await;
    let (_bob_id, bob_token) = register(&client, &srv.base_url, jwt_secret, "bob").await;

    let res = client
        .delete(format!("{}/accounts/me", srv.base_url))
        .bearer_auth(&alice_token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::ACCEPTED);

    let res = client
        .get(format!("{}/accounts/{}", srv.base_url, alice_id))
        .bearer_auth(&bob_token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn chatroom_membership_gates_message_history() {
    let jwt_secret = "test-secret";
    let srv = TestServer::spawn(jwt_secret).await;

    let client = reqwest::Client::new();
    let (_alice_id, alice_token) = register(&client, &srv.base_url, jwt_secret, "alice").await;
    let (bob_id, bob_token) = register(&client, &srv.base_url, jwt_secret, "bob").await;
    let (_carol_id, carol_token) = register(&client, &srv.base_url, jwt_secret, "carol").await;

    let res = client
        .post(format!("{}/chatrooms", srv.base_url))
        .bearer_auth(&alice_token)
        .json(&json!({ "member_ids": [bob_id.to_string()] }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let room: serde_json::Value = res.json().await.unwrap();
    let room_id = room["id"].as_str().unwrap();
    assert_eq!(room["member_ids"].as_array().unwrap().len(), 2);

    // Members see the room in their listing.
    let res = client
        .get(format!("{}/chatrooms", srv.base_url))
        .bearer_auth(&bob_token)
        .send()
        .await
        .unwrap();
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["items"].as_array().unwrap().len(), 1);

    // Members can read history; outsiders cannot.
    let res = client
        .get(format!("{}/chatrooms/{}/messages", srv.base_url, room_id))
        .bearer_auth(&bob_token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = client
        .get(format!("{}/chatrooms/{}/messages", srv.base_url, room_id))
        .bearer_auth(&carol_token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn single_member_chatroom_is_rejected() {
    let jwt_secret = "test-secret";
    let srv = TestServer::spawn(jwt_secret).await;

    let client = reqwest::Client::new();
    let (_id, token) = register(&client, &srv.base_url, jwt_secret, "alice").await;

    let res = client
        .post(format!("{}/chatrooms", srv.base_url))
        .bearer_auth(&token)
        .json(&json!({ "member_ids": [] }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}
