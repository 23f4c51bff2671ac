use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::{Method, Request, StatusCode};
use hyper_util::rt::TokioIo;
use serde_json::{json, Value};
use tokio::net::{TcpListener, TcpStream};
use ulid::Ulid;

use frontdesk::auth::TokenIssuer;
use frontdesk::config::{Config, StoreConfig};
use frontdesk::engine::Engine;
use frontdesk::http::{self, AppState};
use frontdesk::store::JsonStore;

// ── Test infrastructure ──────────────────────────────────────

async fn start_test_server() -> (SocketAddr, StoreConfig) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let root = std::env::temp_dir().join(format!("frontdesk_int_test_{}", Ulid::new()));
    let config = Config::default()
        .with_store(StoreConfig::new(root.join("data"), root.join("backups")).with_max_backups(2))
        .with_jwt_secret("integration");
    let store = Arc::new(JsonStore::open(&config.store).unwrap());
    let state = Arc::new(AppState {
        engine: Arc::new(Engine::new(store)),
        tokens: TokenIssuer::from_secret(config.jwt_secret.as_deref(), config.token_ttl),
    });

    tokio::spawn(async move {
        loop {
            let (socket, _) = match listener.accept().await {
                Ok(conn) => conn,
                Err(_) => break,
            };
            let state = state.clone();
            tokio::spawn(async move {
                let _ = http::serve_connection(socket, state).await;
            });
        }
    });

    (addr, config.store)
}

async fn request(addr: SocketAddr, method: Method, path: &str, body: Option<Value>) -> (StatusCode, Value) {
    let stream = TcpStream::connect(addr).await.unwrap();
    let (mut sender, conn) = hyper::client::conn::http1::handshake(TokioIo::new(stream))
        .await
        .unwrap();
    tokio::spawn(async move {
        let _ = conn.await;
    });

    let bytes = body.map_or_else(Bytes::new, |v| Bytes::from(v.to_string()));
    let req = Request::builder()
        .method(method)
        .uri(path)
        .header("host", addr.to_string())
        .header("content-type", "application/json")
        .body(Full::new(bytes))
        .unwrap();
    let response = sender.send_request(req).await.unwrap();
    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    (status, serde_json::from_slice(&body).unwrap())
}

async fn post(addr: SocketAddr, path: &str, body: Value) -> (StatusCode, Value) {
    request(addr, Method::POST, path, Some(body)).await
}

async fn get(addr: SocketAddr, path: &str) -> (StatusCode, Value) {
    request(addr, Method::GET, path, None).await
}

/// Room type, room 101 and one guest, created through the API.
async fn seed(addr: SocketAddr) {
    let (status, _) = post(addr, "/api/room-types", json!({ "type_name": "Double", "price": 120.0 })).await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, room) = post(addr, "/api/rooms", json!({ "room_number": "101", "room_type_id": 1 })).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(room["status"], "Available");
    let (status, _) = post(
        addr,
        "/api/guests",
        json!({ "full_name": "Ada Lovelace", "email": "ada@example.com", "address": "12 St James Sq" }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
}

// ── Tests ────────────────────────────────────────────────────

#[tokio::test]
async fn booking_scenario_over_http() {
    let (addr, config) = start_test_server().await;
    seed(addr).await;

    let booking = |check_in: &str, check_out: &str| {
        json!({ "guest_id": 1, "room_id": 1, "check_in_date": check_in, "check_out_date": check_out })
    };

    let (status, first) = post(addr, "/api/bookings", booking("2024-01-10T14:00Z", "2024-01-12T11:00Z")).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(first["booking_id"], 1);
    assert_eq!(first["status"], "Confirmed");
    assert_eq!(first["check_in_date"], "2024-01-10T14:00:00.000Z");

    let (status, body) = post(addr, "/api/bookings", booking("2024-01-11T10:00Z", "2024-01-13T10:00Z")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("not available"));

    let (status, _) = post(addr, "/api/bookings", booking("2024-01-12T11:00Z", "2024-01-14T11:00Z")).await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, room) = get(addr, "/api/rooms/1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(room["status"], "Occupied");
    assert_eq!(room["room_type"]["type_name"], "Double");

    let (_, availability) = get(
        addr,
        "/api/rooms/1/availability?check_in=2024-01-11T00:00Z&check_out=2024-01-11T12:00Z",
    )
    .await;
    assert_eq!(availability["available"], false);
    assert_eq!(availability["conflicting_booking_id"], 1);

    // persisted as pretty JSON arrays
    let raw = std::fs::read_to_string(config.data_dir.join("bookings.json")).unwrap();
    let stored: Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(stored.as_array().unwrap().len(), 2);
    assert!(raw.contains("\n  {"));
}

#[tokio::test]
async fn guest_cascade_over_http() {
    let (addr, _) = start_test_server().await;
    seed(addr).await;
    let (status, _) = post(
        addr,
        "/api/bookings",
        json!({ "guest_id": 1, "room_id": 1, "check_in_date": "2024-03-01T14:00:00Z", "check_out_date": "2024-03-04T11:00:00Z" }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = request(addr, Method::DELETE, "/api/guests/1", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Guest deleted along with 1 bookings.");

    let (_, bookings) = get(addr, "/api/bookings").await;
    assert_eq!(bookings, json!([]));
    let (_, room) = get(addr, "/api/rooms/1").await;
    assert_eq!(room["status"], "Available");

    let (status, body) = request(addr, Method::DELETE, "/api/guests/1", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Guest not found");
}

#[tokio::test]
async fn auth_and_maintenance_over_http() {
    let (addr, config) = start_test_server().await;
    seed(addr).await;

    let (status, registered) = post(
        addr,
        "/api/auth/register",
        json!({ "username": "admin", "password": "changeme", "role": "Admin" }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let token = registered["token"].as_str().unwrap();
    let claims = TokenIssuer::new("integration", Duration::from_secs(60))
        .verify(token)
        .unwrap();
    assert_eq!(claims.username, "admin");
    assert!(TokenIssuer::new("other", Duration::from_secs(60)).verify(token).is_none());

    let (status, _) = post(addr, "/api/auth/login", json!({ "username": "admin", "password": "nope!!" })).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = request(addr, Method::DELETE, "/api/users/1", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "cannot remove the last admin user");

    let (status, report) = post(addr, "/api/maintenance/reconcile", json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["changes"], json!([]));

    let (status, body) = post(addr, "/api/maintenance/backup", json!({})).await;
    assert_eq!(status, StatusCode::OK);
    let backups = body["backups"].as_array().unwrap();
    assert_eq!(backups.len(), 4);
    for name in backups {
        assert!(config.backup_dir.join(name.as_str().unwrap()).exists());
    }

    let (status, _) = request(addr, Method::PATCH, "/api/users/1", None).await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
}
