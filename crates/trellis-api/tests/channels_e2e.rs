//! End-to-end tests for channel access control over HTTP.

use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use serde_json::{Value, json};
use tower::ServiceExt;

use trellis_api::auth::create_token;
use trellis_api::{AppState, AppStateInner, create_router};
use trellis_db::Database;
use trellis_types::models::Role;

struct TestApp {
    app: axum::Router,
    state: AppState,
}

impl TestApp {
    fn new() -> Self {
        let state: AppState = Arc::new(AppStateInner {
            db: Database::open_in_memory().unwrap(),
            jwt_secret: "test-secret".to_string(),
            token_ttl_days: 1,
        });
        Self {
            app: create_router(state.clone()),
            state,
        }
    }

    /// Creates a user directly in the database and returns (id, token).
    fn user(&self, username: &str, role: Role) -> (i64, String) {
        let id = self.state.db.create_user(username, "unused-hash", role).unwrap();
        let token = create_token(&self.state, id, username, role).unwrap();
        (id, token)
    }

    fn private_channel(&self, name: &str, members: &[i64]) -> i64 {
        let members = members.iter().copied().collect();
        self.state.db.create_channel(name, true, false, &members).unwrap().id
    }

    async fn send(
        &self,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {}", token));
        }
        let body = match body {
            Some(value) => {
                builder = builder.header("content-type", "application/json");
                Body::from(value.to_string())
            }
            None => Body::empty(),
        };

        let response = self.app.clone().oneshot(builder.body(body).unwrap()).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    async fn get(&self, uri: &str, token: &str) -> (StatusCode, Value) {
        self.send("GET", uri, Some(token), None).await
    }

    async fn put(&self, uri: &str, token: &str, body: Value) -> (StatusCode, Value) {
        self.send("PUT", uri, Some(token), Some(body)).await
    }

    async fn post(&self, uri: &str, token: &str, body: Value) -> (StatusCode, Value) {
        self.send("POST", uri, Some(token), Some(body)).await
    }
}

fn names(channels: &Value) -> Vec<String> {
    channels
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["name"].as_str().unwrap().to_string())
        .collect()
}

// ==================== Identity ====================

#[tokio::test]
async fn test_requests_without_valid_token_are_unauthenticated() {
    let app = TestApp::new();

    let (status, body) = app.send("GET", "/channels", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "authentication required");

    let (status, _) = app.send("GET", "/channels", Some("not-a-jwt"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_register_and_login() {
    let app = TestApp::new();

    let (status, first) = app
        .send(
            "POST",
            "/auth/register",
            None,
            Some(json!({ "username": "alice", "password": "correct horse" })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(first["role"], "admin");

    let (status, second) = app
        .send(
            "POST",
            "/auth/register",
            None,
            Some(json!({ "username": "bob", "password": "battery staple" })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(second["role"], "member");

    let (status, _) = app
        .send(
            "POST",
            "/auth/register",
            None,
            Some(json!({ "username": "bob", "password": "another one" })),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = app
        .send(
            "POST",
            "/auth/login",
            None,
            Some(json!({ "username": "bob", "password": "wrong password" })),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, login) = app
        .send(
            "POST",
            "/auth/login",
            None,
            Some(json!({ "username": "bob", "password": "battery staple" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(login["username"], "bob");

    let token = login["token"].as_str().unwrap();
    let (status, channels) = app.get("/channels", token).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(names(&channels), vec!["general"]);
}

// ==================== Listing and show ====================

#[tokio::test]
async fn test_listing_hides_private_channels_from_non_members() {
    let app = TestApp::new();
    let (alice, alice_token) = app.user("alice", Role::Member);
    let (_, bob_token) = app.user("bob", Role::Member);
    let (_, manager_token) = app.user("mia", Role::Manager);
    app.private_channel("secret", &[alice]);

    let (_, channels) = app.get("/channels", &alice_token).await;
    assert_eq!(names(&channels), vec!["general", "secret"]);

    let (_, channels) = app.get("/channels", &bob_token).await;
    assert_eq!(names(&channels), vec!["general"]);

    let (_, channels) = app.get("/channels", &manager_token).await;
    assert_eq!(names(&channels), vec!["general", "secret"]);
}

#[tokio::test]
async fn test_show_resolves_existence_before_permission() {
    let app = TestApp::new();
    let (alice, alice_token) = app.user("alice", Role::Member);
    let (_, bob_token) = app.user("bob", Role::Member);
    let secret = app.private_channel("secret", &[alice]);

    let (status, _) = app.get("/channels/999", &bob_token).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = app.get(&format!("/channels/{}", secret), &bob_token).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "forbidden");

    let (status, body) = app.get(&format!("/channels/{}", secret), &alice_token).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["name"], "secret");
    assert_eq!(body["is_private"], true);
    assert_eq!(body["kind"]["type"], "ordinary");
}

// ==================== Members ====================

#[tokio::test]
async fn test_member_listing_is_manager_only() {
    let app = TestApp::new();
    let (alice, alice_token) = app.user("alice", Role::Member);
    let (bob, _) = app.user("bob", Role::Member);
    let (_, admin_token) = app.user("root", Role::Admin);
    let secret = app.private_channel("secret", &[bob, alice]);

    // Even a member of the channel cannot list it.
    let (status, _) = app.get(&format!("/channels/{}/members", secret), &alice_token).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app.get("/channels/999/members", &alice_token).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = app.get(&format!("/channels/{}/members", secret), &admin_token).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["member_ids"], json!([alice, bob]));
}

// ==================== DM channels ====================

#[tokio::test]
async fn test_dm_lifecycle() {
    let app = TestApp::new();
    let (alice, alice_token) = app.user("alice", Role::Member);
    let (bob, bob_token) = app.user("bob", Role::Member);
    let (carol, carol_token) = app.user("carol", Role::Member);

    let (status, dm) = app.post("/dms", &bob_token, json!({ "user_id": alice })).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(dm["name"], format!("dm:{}-{}", alice, bob));
    assert_eq!(dm["is_private"], true);
    assert_eq!(dm["kind"], json!({ "type": "direct_message", "low": alice, "high": bob }));
    let dm_id = dm["id"].as_i64().unwrap();

    // Opening again from the other side returns the same channel.
    let (status, again) = app.post("/dms", &alice_token, json!({ "user_id": bob })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(again["id"], dm_id);

    let (status, _) = app.get(&format!("/channels/{}", dm_id), &carol_token).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (_, channels) = app.get("/channels", &carol_token).await;
    assert_eq!(names(&channels), vec!["general"]);

    let privacy = format!("/channels/{}/privacy", dm_id);

    // Participant re-confirms with members in either order.
    let (status, _) = app
        .put(&privacy, &alice_token, json!({ "is_private": true, "member_ids": [bob, alice] }))
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, body) = app
        .put(
            &privacy,
            &alice_token,
            json!({ "is_private": true, "member_ids": [alice, bob, carol] }),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "forbidden");

    let (status, _) = app
        .put(&privacy, &bob_token, json!({ "is_private": false, "member_ids": [alice, bob] }))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app
        .put(&privacy, &carol_token, json!({ "is_private": true, "member_ids": [alice, bob] }))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let members = app.state.db.list_member_ids(dm_id).unwrap();
    assert_eq!(members.into_iter().collect::<Vec<_>>(), vec![alice, bob]);
}

#[tokio::test]
async fn test_dm_validation() {
    let app = TestApp::new();
    let (alice, alice_token) = app.user("alice", Role::Member);

    let (status, _) = app.post("/dms", &alice_token, json!({ "user_id": alice })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app.post("/dms", &alice_token, json!({ "user_id": 4242 })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

// ==================== Privacy mutation ====================

#[tokio::test]
async fn test_malformed_privacy_body_is_judged_after_authorization() {
    let app = TestApp::new();
    let (_, member_token) = app.user("alice", Role::Member);
    let (_, manager_token) = app.user("mia", Role::Manager);
    let bad = json!({ "is_private": "yes", "member_ids": [] });

    let (status, _) = app.put("/channels/1/privacy", &member_token, bad.clone()).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app.put("/channels/999/privacy", &member_token, bad.clone()).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = app.put("/channels/1/privacy", &manager_token, bad).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_manager_privacy_changes() {
    let app = TestApp::new();
    let (alice, alice_token) = app.user("alice", Role::Member);
    let (_, bob_token) = app.user("bob", Role::Member);
    let (_, manager_token) = app.user("mia", Role::Manager);

    let (status, _) = app
        .put(
            "/channels/1/privacy",
            &manager_token,
            json!({ "is_private": true, "member_ids": [alice], "posting_restricted": true }),
        )
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, body) = app.get("/channels/1", &alice_token).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["posting_restricted"], true);
    let (status, _) = app.get("/channels/1", &bob_token).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = app
        .put(
            "/channels/1/privacy",
            &manager_token,
            json!({ "is_private": true, "member_ids": [alice, 4242] }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("4242"));

    let (status, _) = app
        .put("/channels/1/privacy", &manager_token, json!({ "is_private": false, "member_ids": [alice] }))
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert!(app.state.db.list_member_ids(1).unwrap().is_empty());

    let (status, _) = app.get("/channels/1", &bob_token).await;
    assert_eq!(status, StatusCode::OK);

    // Members may not touch ordinary channels, nor posting_restricted.
    let (status, _) = app
        .put(
            "/channels/1/privacy",
            &alice_token,
            json!({ "is_private": false, "member_ids": [], "posting_restricted": false }),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

// ==================== Messages ====================

#[tokio::test]
async fn test_messages_follow_channel_visibility() {
    let app = TestApp::new();
    let (alice, alice_token) = app.user("alice", Role::Member);
    let (_, bob_token) = app.user("bob", Role::Member);
    let secret = app.private_channel("secret", &[alice]);
    let uri = format!("/channels/{}/messages", secret);

    let (status, message) = app.post(&uri, &alice_token, json!({ "content": "hello" })).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(message["content"], "hello");
    assert_eq!(message["author_username"], "alice");

    let (status, messages) = app.get(&uri, &alice_token).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(messages.as_array().unwrap().len(), 1);

    let (status, _) = app.get(&uri, &bob_token).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = app.post(&uri, &bob_token, json!({ "content": "let me in" })).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app.get("/channels/999/messages", &bob_token).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = app.post(&uri, &alice_token, json!({ "content": "   " })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_posting_restrictions() {
    let app = TestApp::new();
    let (_, member_token) = app.user("alice", Role::Member);
    let (_, viewer_token) = app.user("vic", Role::Viewer);
    let (_, manager_token) = app.user("mia", Role::Manager);
    let restricted = app
        .state
        .db
        .create_channel("announcements", false, true, &Default::default())
        .unwrap()
        .id;

    let (status, _) = app.post("/channels/1/messages", &viewer_token, json!({ "content": "hi" })).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = app.get("/channels/1/messages", &viewer_token).await;
    assert_eq!(status, StatusCode::OK);

    let uri = format!("/channels/{}/messages", restricted);
    let (status, _) = app.post(&uri, &member_token, json!({ "content": "hi" })).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = app.post(&uri, &manager_token, json!({ "content": "release day" })).await;
    assert_eq!(status, StatusCode::CREATED);
}

// ==================== Channel management ====================

#[tokio::test]
async fn test_channel_creation_rules() {
    let app = TestApp::new();
    let (alice, member_token) = app.user("alice", Role::Member);
    let (_, manager_token) = app.user("mia", Role::Manager);

    let (status, _) = app
        .post("/channels", &member_token, json!({ "name": "random" }))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app
        .post("/channels", &manager_token, json!({ "name": "dm:1-2" }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .post("/channels", &manager_token, json!({ "name": "general" }))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = app
        .post(
            "/channels",
            &manager_token,
            json!({ "name": "team", "is_private": true, "member_ids": [4242] }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, channel) = app
        .post(
            "/channels",
            &manager_token,
            json!({ "name": "team", "is_private": true, "member_ids": [alice] }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let id = channel["id"].as_i64().unwrap();

    let (status, _) = app.get(&format!("/channels/{}", id), &member_token).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app
        .send("DELETE", &format!("/channels/{}", id), Some(&member_token), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app
        .send("DELETE", &format!("/channels/{}", id), Some(&manager_token), None)
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = app.get(&format!("/channels/{}", id), &manager_token).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_admin_assigns_roles() {
    let app = TestApp::new();
    let (_, admin_token) = app.user("root", Role::Admin);
    let (bob, bob_token) = app.user("bob", Role::Member);
    let (_, manager_token) = app.user("mia", Role::Manager);

    let (status, _) = app
        .put(&format!("/users/{}/role", bob), &manager_token, json!({ "role": "admin" }))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app
        .put("/users/4242/role", &admin_token, json!({ "role": "manager" }))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, user) = app
        .put(&format!("/users/{}/role", bob), &admin_token, json!({ "role": "manager" }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(user["role"], "manager");

    // The promotion applies to the token bob already holds.
    let (status, _) = app.get("/channels/1/members", &bob_token).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_demotion_applies_to_existing_tokens() {
    let app = TestApp::new();
    let (_, admin_token) = app.user("root", Role::Admin);
    let (mia, mia_token) = app.user("mia", Role::Manager);
    let (bob, _) = app.user("bob", Role::Member);
    let secret = app.private_channel("secret", &[bob]);

    let (status, _) = app.get(&format!("/channels/{}/members", secret), &mia_token).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app
        .put(&format!("/users/{}/role", mia), &admin_token, json!({ "role": "viewer" }))
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app.get(&format!("/channels/{}/members", secret), &mia_token).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = app.get(&format!("/channels/{}", secret), &mia_token).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = app
        .send("DELETE", &format!("/channels/{}", secret), Some(&mia_token), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, channels) = app.get("/channels", &mia_token).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(names(&channels), vec!["general"]);
}

#[tokio::test]
async fn test_token_for_unknown_user_is_unauthenticated() {
    let app = TestApp::new();
    let token = create_token(&app.state, 4242, "ghost", Role::Admin).unwrap();

    let (status, body) = app.get("/channels", &token).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "authentication required");
}

#[tokio::test]
async fn test_malformed_role_body_from_non_admin_is_forbidden() {
    let app = TestApp::new();
    let (bob, bob_token) = app.user("bob", Role::Member);
    let (_, admin_token) = app.user("root", Role::Admin);

    let (status, body) = app
        .put(&format!("/users/{}/role", bob), &bob_token, json!({ "role": "overlord" }))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "forbidden");

    let (status, body) = app
        .put(&format!("/users/{}/role", bob), &admin_token, json!({ "role": "overlord" }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());
}
