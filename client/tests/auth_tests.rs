use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    routing::post,
    Json, Router,
};
use club_client::auth::{AuthApi, AuthError, GoTrueAuthClient, Session, SessionStore, SessionUser};
use club_client::beers::BeerEditor;
use club_client::{ClubClient, ClubError, ClubSettings};
use club_storage::beer::Beer;
use club_storage::testing::{CallLog, InMemoryBeerStorage, InMemoryBlobStorage};
use serde_json::{json, Value};
use tempfile::TempDir;

const API_KEY: &str = "anon-key";
const VALID_CODE: &str = "123456";

/// Requests seen by the fake auth server, as `path body`
#[derive(Clone, Default)]
struct Recorded(Arc<Mutex<Vec<(String, Value)>>>);

impl Recorded {
    fn push(&self, path: &str, body: Value) {
        self.0.lock().unwrap().push((path.to_string(), body));
    }

    fn paths(&self) -> Vec<String> {
        self.0.lock().unwrap().iter().map(|(p, _)| p.clone()).collect()
    }

    fn body(&self, index: usize) -> Value {
        self.0.lock().unwrap()[index].1.clone()
    }
}

fn has_api_key(headers: &HeaderMap) -> bool {
    headers.get("apikey").and_then(|v| v.to_str().ok()) == Some(API_KEY)
}

fn token_body(access_token: &str, expires_in: i64) -> Value {
    json!({
        "access_token": access_token,
        "refresh_token": format!("refresh-{access_token}"),
        "expires_in": expires_in,
        "token_type": "bearer",
        "user": { "id": "member-1", "email": "ole@example.com", "aud": "authenticated" }
    })
}

async fn otp(
    State(recorded): State<Recorded>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    if !has_api_key(&headers) {
        return (StatusCode::UNAUTHORIZED, Json(json!({ "msg": "No API key found" })));
    }
    recorded.push("/otp", body);
    (StatusCode::OK, Json(json!({})))
}

async fn verify(
    State(recorded): State<Recorded>,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    recorded.push("/verify", body.clone());
    if body["token"] == VALID_CODE {
        (StatusCode::OK, Json(token_body("first", 3600)))
    } else {
        (
            StatusCode::FORBIDDEN,
            Json(json!({ "code": 403, "error_code": "otp_expired", "msg": "Token has expired or is invalid" })),
        )
    }
}

async fn token(
    State(recorded): State<Recorded>,
    Query(query): Query<HashMap<String, String>>,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    recorded.push("/token", body.clone());
    if query.get("grant_type").map(String::as_str) != Some("refresh_token") {
        return (StatusCode::BAD_REQUEST, Json(json!({ "msg": "bad grant" })));
    }
    if body["refresh_token"] == "refresh-revoked" {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "invalid_grant", "error_description": "Invalid Refresh Token" })),
        );
    }
    (StatusCode::OK, Json(token_body("refreshed", 3600)))
}

async fn logout(State(recorded): State<Recorded>, headers: HeaderMap) -> StatusCode {
    let bearer = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    recorded.push("/logout", json!({ "authorization": bearer }));
    StatusCode::NO_CONTENT
}

async fn spawn_server() -> (String, Recorded) {
    let recorded = Recorded::default();
    let app = Router::new()
        .route("/otp", post(otp))
        .route("/verify", post(verify))
        .route("/token", post(token))
        .route("/logout", post(logout))
        .with_state(recorded.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{addr}/"), recorded)
}

fn client(base_url: &str, dir: &TempDir) -> GoTrueAuthClient {
    GoTrueAuthClient::new(
        base_url,
        API_KEY.to_string(),
        SessionStore::new(dir.path().join("session.json")),
    )
    .unwrap()
}

fn session(access_token: &str, expires_at: i64) -> Session {
    Session {
        access_token: access_token.to_string(),
        refresh_token: format!("refresh-{access_token}"),
        expires_at,
        user: SessionUser {
            id: "member-1".to_string(),
            email: Some("ole@example.com".to_string()),
        },
    }
}

#[tokio::test]
async fn test_request_code_asks_the_server_to_create_the_member() {
    let (url, recorded) = spawn_server().await;
    let dir = tempfile::tempdir().unwrap();

    client(&url, &dir).request_code("  ole@example.com ").await.unwrap();

    assert_eq!(recorded.paths(), vec!["/otp"]);
    assert_eq!(
        recorded.body(0),
        json!({ "email": "ole@example.com", "create_user": true })
    );
}

#[tokio::test]
async fn test_malformed_email_is_rejected_locally() {
    let (url, recorded) = spawn_server().await;
    let dir = tempfile::tempdir().unwrap();

    let err = client(&url, &dir).request_code("not-an-email").await.unwrap_err();

    assert!(matches!(err, AuthError::InvalidEmail(_)));
    assert!(recorded.paths().is_empty());
}

#[tokio::test]
async fn test_verify_normalizes_the_code_and_announces_the_session() {
    let (url, recorded) = spawn_server().await;
    let dir = tempfile::tempdir().unwrap();
    let auth = client(&url, &dir);
    let mut changes = auth.subscribe();

    let session = auth.verify_code("ole@example.com", "123 456").await.unwrap();

    assert_eq!(session.access_token, "first");
    assert_eq!(session.user.email.as_deref(), Some("ole@example.com"));
    assert_eq!(
        recorded.body(0),
        json!({ "type": "email", "email": "ole@example.com", "token": VALID_CODE })
    );

    assert!(changes.has_changed().unwrap());
    assert_eq!(changes.borrow_and_update().clone(), Some(session.clone()));

    // A fresh client picks the session up from the cache
    let restored = client(&url, &dir).restore().await.unwrap();
    assert_eq!(restored, Some(session));
}

#[tokio::test]
async fn test_short_code_never_reaches_the_server() {
    let (url, recorded) = spawn_server().await;
    let dir = tempfile::tempdir().unwrap();

    let err = client(&url, &dir)
        .verify_code("ole@example.com", "12345")
        .await
        .unwrap_err();

    assert!(matches!(err, AuthError::InvalidCode));
    assert!(recorded.paths().is_empty());
}

#[tokio::test]
async fn test_wrong_code_is_rejected_with_the_server_message() {
    let (url, _) = spawn_server().await;
    let dir = tempfile::tempdir().unwrap();
    let auth = client(&url, &dir);

    let err = auth.verify_code("ole@example.com", "654321").await.unwrap_err();

    match err {
        AuthError::Rejected { status, message } => {
            assert_eq!(status, 403);
            assert_eq!(message, "Token has expired or is invalid");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(auth.current_session().await.unwrap(), None);
}

#[tokio::test]
async fn test_expired_session_is_refreshed() {
    let (url, recorded) = spawn_server().await;
    let dir = tempfile::tempdir().unwrap();
    let store = SessionStore::new(dir.path().join("session.json"));
    store.save(&session("stale", 0)).await.unwrap();

    let auth = client(&url, &dir);
    auth.restore().await.unwrap();
    let current = auth.current_session().await.unwrap().unwrap();

    assert_eq!(current.access_token, "refreshed");
    assert_eq!(recorded.paths(), vec!["/token"]);
    assert_eq!(recorded.body(0), json!({ "refresh_token": "refresh-stale" }));
    assert_eq!(store.load().await.unwrap(), Some(current));
}

#[tokio::test]
async fn test_rejected_refresh_signs_out() {
    let (url, _) = spawn_server().await;
    let dir = tempfile::tempdir().unwrap();
    let store = SessionStore::new(dir.path().join("session.json"));
    store.save(&session("revoked", 0)).await.unwrap();

    let auth = client(&url, &dir);
    auth.restore().await.unwrap();

    assert_eq!(auth.current_session().await.unwrap(), None);
    assert_eq!(*auth.subscribe().borrow(), None);
    assert_eq!(store.load().await.unwrap(), None);
}

#[tokio::test]
async fn test_sign_out_revokes_and_clears_the_session() {
    let (url, recorded) = spawn_server().await;
    let dir = tempfile::tempdir().unwrap();
    let auth = client(&url, &dir);
    auth.verify_code("ole@example.com", VALID_CODE).await.unwrap();

    auth.sign_out().await.unwrap();

    assert_eq!(recorded.paths(), vec!["/verify", "/logout"]);
    assert_eq!(recorded.body(1), json!({ "authorization": "Bearer first" }));
    assert_eq!(auth.current_session().await.unwrap(), None);
    assert!(!dir.path().join("session.json").exists());
}

#[tokio::test]
async fn test_sign_out_works_when_the_server_is_gone() {
    let dir = tempfile::tempdir().unwrap();
    let store = SessionStore::new(dir.path().join("session.json"));
    store
        .save(&session("orphan", chrono::Utc::now().timestamp() + 3600))
        .await
        .unwrap();

    // Nothing listens on port 9 of localhost
    let auth = client("http://127.0.0.1:9", &dir);
    auth.restore().await.unwrap();

    auth.sign_out().await.unwrap();
    assert_eq!(auth.current_session().await.unwrap(), None);
}

async fn club_with_expired_session(url: &str, dir: &TempDir) -> (ClubClient, CallLog) {
    let store = SessionStore::new(dir.path().join("session.json"));
    store.save(&session("stale", 0)).await.unwrap();
    let auth = client(url, dir);
    auth.restore().await.unwrap();

    let log = CallLog::default();
    let club = ClubClient::new(
        Arc::new(auth),
        Arc::new(InMemoryBeerStorage::new(log.clone())),
        Arc::new(InMemoryBlobStorage::new(log.clone())),
        ClubSettings {
            club_id: "test-club".to_string(),
            url_ttl: Duration::from_secs(600),
            list_retry_delay: Duration::from_millis(1),
        },
    );
    (club, log)
}

#[tokio::test]
async fn test_invalid_beer_form_does_not_refresh_an_expired_session() {
    let (url, recorded) = spawn_server().await;
    let dir = tempfile::tempdir().unwrap();
    let (club, log) = club_with_expired_session(&url, &dir).await;

    let mut editor = BeerEditor::new();
    editor.name = "   ".to_string();
    let err = club.create_beer(&mut editor).await.unwrap_err();
    assert!(matches!(err, ClubError::Validation(_)));
    assert_eq!(err.user_message(), "Name is required");

    let mut editor = BeerEditor::for_beer(&Beer {
        id: "b1".to_string(),
        club_id: "test-club".to_string(),
        user_id: "member-1".to_string(),
        name: "Bock".to_string(),
        brewery: String::new(),
        style: String::new(),
        color: String::new(),
        price: String::new(),
        rating: 0,
        photo_path: None,
        created_at: 0,
    });
    editor.name = String::new();
    let err = club.update_beer(&mut editor).await.unwrap_err();
    assert!(matches!(err, ClubError::Validation(_)));

    // Not being opened for a beer is caught before the session too
    let mut editor = BeerEditor::new();
    editor.name = "Lager".to_string();
    let err = club.update_beer(&mut editor).await.unwrap_err();
    assert!(matches!(err, ClubError::Validation(_)));

    assert!(recorded.paths().is_empty());
    assert!(log.is_empty());
}

#[tokio::test]
async fn test_valid_beer_form_refreshes_an_expired_session() {
    let (url, recorded) = spawn_server().await;
    let dir = tempfile::tempdir().unwrap();
    let (club, _) = club_with_expired_session(&url, &dir).await;

    let mut editor = BeerEditor::new();
    editor.name = "Lager".to_string();
    let beer = club.create_beer(&mut editor).await.unwrap();

    assert_eq!(beer.user_id, "member-1");
    assert_eq!(recorded.paths(), vec!["/token"]);
}
