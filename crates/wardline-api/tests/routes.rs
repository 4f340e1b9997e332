//! Router-level tests: requests go through the auth middleware and handlers
//! against an in-memory store.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use http_body_util::BodyExt;
use jsonwebtoken::{EncodingKey, Header, encode};
use serde_json::{Value, json};
use tower::ServiceExt;

use wardline_api::{AppStateInner, router};
use wardline_db::Database;
use wardline_types::api::Claims;
use wardline_types::models::StaffProfile;

const SECRET: &str = "test-secret";

fn staff(id: &str, name: &str, role: &str) -> StaffProfile {
    StaffProfile {
        id: id.into(),
        name: name.into(),
        surname: "Test".into(),
        role: role.into(),
    }
}

fn app() -> axum::Router {
    let db = Database::open_in_memory().unwrap();
    db.put_user(&staff("u1", "Alice", "nurse")).unwrap();
    db.put_user(&staff("u2", "Bob", "doctor")).unwrap();
    db.put_user(&staff("admin1", "Ada", "admin")).unwrap();
    router(Arc::new(AppStateInner {
        db: Arc::new(db),
        jwt_secret: SECRET.into(),
    }))
}

fn token(profile: &StaffProfile) -> String {
    let claims = Claims {
        sub: profile.id.clone(),
        name: profile.name.clone(),
        surname: profile.surname.clone(),
        role: profile.role.clone(),
        exp: (chrono::Utc::now() + chrono::Duration::hours(1)).timestamp() as usize,
    };
    encode(&Header::default(), &claims, &EncodingKey::from_secret(SECRET.as_bytes())).unwrap()
}

async fn call(app: &axum::Router, method: &str, uri: &str, user: Option<&StaffProfile>, body: Option<Value>) -> (StatusCode, Value) {
    let mut req = Request::builder().method(method).uri(uri);
    if let Some(user) = user {
        req = req.header(header::AUTHORIZATION, format!("Bearer {}", token(user)));
    }
    let req = match body {
        Some(body) => req
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => req.body(Body::empty()).unwrap(),
    };

    let res = app.clone().oneshot(req).await.unwrap();
    let status = res.status();
    let bytes = res.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap() };
    (status, value)
}

#[tokio::test]
async fn missing_token_is_auth_required() {
    let app = app();
    let (status, body) = call(&app, "GET", "/chats", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "auth_required");
}

#[tokio::test]
async fn hello_then_open() {
    let app = app();
    let alice = staff("u1", "Alice", "nurse");
    let bob = staff("u2", "Bob", "doctor");

    let (status, body) = call(&app, "POST", "/chats", Some(&alice), Some(json!({ "otherId": "u2" }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["chatId"], "u1_u2");

    let (status, sent) = call(&app, "POST", "/chats/u1_u2/messages", Some(&alice), Some(json!({ "text": "Hello" }))).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(sent["text"], "Hello");
    assert_eq!(sent["read"], false);

    let (_, list) = call(&app, "GET", "/chats", Some(&bob), None).await;
    assert_eq!(list[0]["unread"], 1);
    assert_eq!(list[0]["badge"], "1");
    assert_eq!(list[0]["otherId"], "u1");

    let (_, inbox) = call(&app, "GET", "/notifications", Some(&bob), None).await;
    assert_eq!(inbox[0]["type"], "message");
    assert_eq!(inbox[0]["recipientId"], "u2");
    assert_eq!(inbox[0]["link"], "/messages/u1_u2");

    let (status, opened) = call(&app, "POST", "/chats/u1_u2/open", Some(&bob), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(opened["markedRead"], 2);

    let (_, chat) = call(&app, "GET", "/chats/u1_u2", Some(&bob), None).await;
    assert_eq!(chat["unreadCounts"]["u2"], 0);
    assert_eq!(chat["lastMessage"]["read"], true);

    let (_, messages) = call(&app, "GET", "/chats/u1_u2/messages", Some(&bob), None).await;
    assert_eq!(messages[0]["read"], true);
}

#[tokio::test]
async fn blank_message_is_bad_request() {
    let app = app();
    let alice = staff("u1", "Alice", "nurse");
    call(&app, "POST", "/chats", Some(&alice), Some(json!({ "otherId": "u2" }))).await;

    let (status, body) = call(&app, "POST", "/chats/u1_u2/messages", Some(&alice), Some(json!({ "text": "  " }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "empty_message");
}

#[tokio::test]
async fn outsiders_and_unknowns() {
    let app = app();
    let alice = staff("u1", "Alice", "nurse");
    let admin = staff("admin1", "Ada", "admin");

    let (status, _) = call(&app, "POST", "/chats", Some(&alice), Some(json!({ "otherId": "ghost" }))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = call(&app, "POST", "/chats", Some(&alice), Some(json!({ "otherId": "u2_x" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_participants");

    call(&app, "POST", "/chats", Some(&alice), Some(json!({ "otherId": "u2" }))).await;
    let (status, body) = call(&app, "GET", "/chats/u1_u2/messages", Some(&admin), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "not_participant");

    let (status, body) = call(&app, "POST", "/chats/nope/messages", Some(&alice), Some(json!({ "text": "hi" }))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "conversation_not_found");
}

#[tokio::test]
async fn password_change_notifies_admins() {
    let app = app();
    let alice = staff("u1", "Alice", "nurse");
    let admin = staff("admin1", "Ada", "admin");

    let (status, body) = call(&app, "POST", "/security/password-changed", Some(&alice), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["notified"], 1);

    let (_, inbox) = call(&app, "GET", "/notifications", Some(&admin), None).await;
    assert_eq!(inbox[0]["type"], "password_change");
    let id = inbox[0]["id"].as_str().unwrap().to_string();

    let (status, _) = call(&app, "POST", &format!("/notifications/{id}/read"), Some(&alice), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, read) = call(&app, "POST", &format!("/notifications/{id}/read"), Some(&admin), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(read["read"], true);
}
