//! HTTP/1 front end: one hyper connection per accepted socket, JSON in and out.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::Body;
use hyper::header::{AUTHORIZATION, CONTENT_TYPE, HeaderValue};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tokio::net::TcpStream;
use tracing::{debug, error};

use crate::api::{self, Route, RouteError};
use crate::auth::{self, TokenIssuer};
use crate::engine::{Engine, EngineError};
use crate::limits::MAX_BODY_BYTES;
use crate::model::UserInfo;
use crate::observability;

/// Everything a request handler needs, shared by all connections.
pub struct AppState {
    pub engine: Arc<Engine>,
    pub tokens: TokenIssuer,
}

#[derive(Debug)]
pub enum ApiError {
    Route(RouteError),
    Engine(EngineError),
    /// Body is not valid JSON for the route's payload.
    BadBody(String),
    TooLarge,
    Unauthorized,
    Internal(String),
}

impl From<EngineError> for ApiError {
    fn from(e: EngineError) -> Self {
        ApiError::Engine(e)
    }
}

impl From<RouteError> for ApiError {
    fn from(e: RouteError) -> Self {
        ApiError::Route(e)
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Route(RouteError::NotFound) => StatusCode::NOT_FOUND,
            ApiError::Route(RouteError::MethodNotAllowed) => StatusCode::METHOD_NOT_ALLOWED,
            ApiError::Route(RouteError::BadId(_)) | ApiError::BadBody(_) => StatusCode::BAD_REQUEST,
            ApiError::TooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Engine(e) => match e {
                EngineError::Validation { .. }
                | EngineError::Reference { .. }
                | EngineError::Conflict { .. }
                | EngineError::Duplicate { .. }
                | EngineError::InUse { .. }
                | EngineError::LastAdmin => StatusCode::BAD_REQUEST,
                EngineError::NotFound { .. } => StatusCode::NOT_FOUND,
                EngineError::InvalidCredentials => StatusCode::UNAUTHORIZED,
                EngineError::Unpublished(_) => StatusCode::SERVICE_UNAVAILABLE,
                EngineError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }

    fn body(&self) -> Value {
        match self {
            ApiError::Engine(EngineError::Validation { field, reason }) => json!({
                "error": "Validation failed",
                "details": [{ "field": field, "message": reason }],
            }),
            ApiError::BadBody(reason) => json!({
                "error": "Validation failed",
                "details": [{ "message": reason }],
            }),
            ApiError::Engine(EngineError::NotFound { collection, .. }) => {
                json!({ "error": format!("{} not found", collection.entity()) })
            }
            ApiError::Engine(EngineError::Unpublished(_)) => {
                json!({ "error": "Change saved but not yet visible, retry shortly" })
            }
            ApiError::Engine(EngineError::Storage(_)) | ApiError::Internal(_) => {
                json!({ "error": "Internal server error" })
            }
            ApiError::Engine(e) => json!({ "error": e.to_string() }),
            ApiError::Route(e) => json!({ "error": e.to_string() }),
            ApiError::TooLarge => json!({ "error": "Request body too large" }),
            ApiError::Unauthorized => json!({ "error": "Unauthorized" }),
        }
    }
}

type Reply = (StatusCode, Value);

fn reply<T: Serialize>(status: StatusCode, value: &T) -> Result<Reply, ApiError> {
    serde_json::to_value(value)
        .map(|v| (status, v))
        .map_err(|e| ApiError::Internal(e.to_string()))
}

fn parse_json<T: DeserializeOwned>(body: &Bytes) -> Result<T, ApiError> {
    serde_json::from_slice(body).map_err(|e| ApiError::BadBody(e.to_string()))
}

fn json_response(status: StatusCode, body: &Value) -> Response<Full<Bytes>> {
    let bytes = serde_json::to_vec(body).unwrap_or_else(|_| b"{}".to_vec());
    let mut response = Response::new(Full::new(Bytes::from(bytes)));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}

/// Serve one accepted socket until the client closes it.
pub async fn serve_connection(stream: TcpStream, state: Arc<AppState>) -> Result<(), hyper::Error> {
    let io = TokioIo::new(stream);
    let service = service_fn(move |req| {
        let state = state.clone();
        async move { Ok::<_, Infallible>(handle(&state, req).await) }
    });
    http1::Builder::new().serve_connection(io, service).await
}

pub async fn handle<B>(state: &AppState, req: Request<B>) -> Response<Full<Bytes>>
where
    B: Body<Data = Bytes>,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let start = Instant::now();
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    let route = api::parse_route(&method, &path);
    let label = route.as_ref().map_or("unmatched", observability::route_label);
    let result = match route {
        Ok(route) => dispatch(state, route, req).await,
        Err(e) => Err(ApiError::Route(e)),
    };

    let (status, body) = match result {
        Ok(reply) => reply,
        Err(e) => {
            if let ApiError::Engine(EngineError::Storage(reason) | EngineError::Unpublished(reason))
            | ApiError::Internal(reason) = &e
            {
                error!("{method} {path}: {reason}");
            }
            (e.status(), e.body())
        }
    };

    debug!("{method} {path} -> {}", status.as_u16());
    metrics::counter!(observability::REQUESTS_TOTAL, "route" => label, "status" => status.as_u16().to_string())
        .increment(1);
    metrics::histogram!(observability::REQUEST_DURATION_SECONDS, "route" => label)
        .record(start.elapsed().as_secs_f64());
    json_response(status, &body)
}

async fn read_body<B>(body: B) -> Result<Bytes, ApiError>
where
    B: Body<Data = Bytes>,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    match Limited::new(body, MAX_BODY_BYTES).collect().await {
        Ok(collected) => Ok(collected.to_bytes()),
        Err(e) if e.downcast_ref::<LengthLimitError>().is_some() => Err(ApiError::TooLarge),
        Err(e) => Err(ApiError::BadBody(e.to_string())),
    }
}

async fn dispatch<B>(state: &AppState, route: Route, req: Request<B>) -> Result<Reply, ApiError>
where
    B: Body<Data = Bytes>,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let (parts, body) = req.into_parts();
    let body = read_body(body).await?;
    let engine = state.engine.as_ref();
    let query = parts.uri.query();

    match route {
        Route::ListGuests => reply(StatusCode::OK, &engine.list_guests().await?),
        Route::CreateGuest => reply(StatusCode::CREATED, &engine.create_guest(parse_json(&body)?).await?),
        Route::GetGuest(id) => reply(StatusCode::OK, &engine.get_guest(id).await?),
        Route::UpdateGuest(id) => reply(StatusCode::OK, &engine.update_guest(id, parse_json(&body)?).await?),
        Route::DeleteGuest(id) => {
            let removal = engine.delete_guest(id).await?;
            Ok((
                StatusCode::OK,
                json!({
                    "success": true,
                    "message": format!("Guest deleted along with {} bookings.", removal.bookings_removed),
                    "rooms_freed": removal.rooms_freed,
                }),
            ))
        }

        Route::ListRooms => reply(StatusCode::OK, &engine.list_rooms().await?),
        Route::CreateRoom => reply(StatusCode::CREATED, &engine.create_room(parse_json(&body)?).await?),
        Route::GetRoom(id) => reply(StatusCode::OK, &engine.get_room(id).await?),
        Route::UpdateRoom(id) => reply(StatusCode::OK, &engine.update_room(id, parse_json(&body)?).await?),
        Route::DeleteRoom(id) => {
            engine.delete_room(id).await?;
            Ok((StatusCode::OK, json!({ "success": true })))
        }
        Route::RoomAvailability(id) => {
            let stay = api::parse_stay_query(query)?;
            reply(
                StatusCode::OK,
                &engine.room_availability(id, &stay.check_in, &stay.check_out).await?,
            )
        }
        Route::AvailableRooms => {
            let stay = api::parse_stay_query(query)?;
            reply(
                StatusCode::OK,
                &engine.find_available_rooms(&stay.check_in, &stay.check_out).await?,
            )
        }

        Route::ListRoomTypes => reply(StatusCode::OK, &engine.list_room_types().await?),
        Route::CreateRoomType => reply(
            StatusCode::CREATED,
            &engine.create_room_type(parse_json(&body)?).await?,
        ),
        Route::GetRoomType(id) => reply(StatusCode::OK, &engine.get_room_type(id).await?),
        Route::UpdateRoomType(id) => reply(
            StatusCode::OK,
            &engine.update_room_type(id, parse_json(&body)?).await?,
        ),
        Route::DeleteRoomType(id) => {
            engine.delete_room_type(id).await?;
            Ok((StatusCode::OK, json!({ "success": true })))
        }

        Route::ListBookings => reply(StatusCode::OK, &engine.list_bookings().await?),
        Route::CreateBooking => reply(StatusCode::CREATED, &engine.create_booking(parse_json(&body)?).await?),
        Route::GetBooking(id) => reply(StatusCode::OK, &engine.get_booking(id).await?),
        Route::UpdateBooking(id) => reply(
            StatusCode::OK,
            &engine.update_booking(id, parse_json(&body)?).await?,
        ),
        Route::DeleteBooking(id) => {
            engine.delete_booking(id).await?;
            Ok((StatusCode::OK, json!({ "success": true })))
        }

        Route::ListPayments => reply(StatusCode::OK, &engine.list_payments().await?),
        Route::CreatePayment => reply(StatusCode::CREATED, &engine.create_payment(parse_json(&body)?).await?),
        Route::GetPayment(id) => reply(StatusCode::OK, &engine.get_payment(id).await?),
        Route::UpdatePayment(id) => reply(
            StatusCode::OK,
            &engine.update_payment(id, parse_json(&body)?).await?,
        ),
        Route::DeletePayment(id) => {
            engine.delete_payment(id).await?;
            Ok((StatusCode::OK, json!({ "success": true })))
        }

        Route::ListUsers => reply(StatusCode::OK, &engine.list_users().await?),
        Route::CreateUser => reply(StatusCode::CREATED, &engine.register_user(parse_json(&body)?).await?),
        Route::GetUser(id) => reply(StatusCode::OK, &engine.get_user(id).await?),
        Route::UpdateUser(id) => reply(StatusCode::OK, &engine.update_user(id, parse_json(&body)?).await?),
        Route::DeleteUser(id) => {
            engine.delete_user(id).await?;
            Ok((StatusCode::OK, json!({ "success": true })))
        }

        Route::Register => {
            let user = engine.register_user(parse_json(&body)?).await?;
            with_token(state, StatusCode::CREATED, user)
        }
        Route::Login => {
            let user = engine.login(parse_json(&body)?).await?;
            with_token(state, StatusCode::OK, user)
        }
        Route::WhoAmI => {
            let claims = parts
                .headers
                .get(AUTHORIZATION)
                .and_then(|v| v.to_str().ok())
                .and_then(auth::bearer_token)
                .and_then(|token| state.tokens.verify(token))
                .ok_or(ApiError::Unauthorized)?;
            let user = UserInfo {
                user_id: claims.user_id,
                username: claims.username,
                role: claims.role,
            };
            reply(StatusCode::OK, &user)
        }

        Route::Reconcile => reply(StatusCode::OK, &engine.reconcile_room_statuses().await?),
        Route::Backup => {
            let backups = engine.backup().await?;
            Ok((StatusCode::OK, json!({ "success": true, "backups": backups })))
        }
    }
}

fn with_token(state: &AppState, status: StatusCode, user: UserInfo) -> Result<Reply, ApiError> {
    let token = state.tokens.issue(&user)?;
    Ok((status, json!({ "token": token, "user": user })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use hyper::Method;
    use std::time::Duration;

    fn state() -> AppState {
        AppState {
            engine: Arc::new(Engine::new(Arc::new(MemoryStore::new()))),
            tokens: TokenIssuer::new("test-secret", Duration::from_secs(60)),
        }
    }

    async fn call(state: &AppState, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let bytes = body.map_or_else(Bytes::new, |v| Bytes::from(v.to_string()));
        let req = Request::builder()
            .method(method)
            .uri(uri)
            .body(Full::new(bytes))
            .unwrap();
        let response = handle(state, req).await;
        let status = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn unknown_path_and_method() {
        let state = state();
        let (status, body) = call(&state, Method::GET, "/api/nowhere", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "Not found");

        let (status, _) = call(&state, Method::PATCH, "/api/guests", None).await;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn validation_errors_are_400_with_details() {
        let state = state();
        let (status, body) = call(
            &state,
            Method::POST,
            "/api/guests",
            Some(json!({ "full_name": "", "address": "x" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Validation failed");
        assert_eq!(body["details"][0]["field"], "full_name");

        let (status, body) = call(&state, Method::POST, "/api/guests", Some(json!([1, 2]))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Validation failed");
    }

    #[tokio::test]
    async fn guest_crud_statuses() {
        let state = state();
        let (status, guest) = call(
            &state,
            Method::POST,
            "/api/guests",
            Some(json!({ "full_name": "Ada", "address": "1 Loop Rd" })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(guest["guest_id"], 1);

        let (status, body) = call(&state, Method::GET, "/api/guests/2", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "Guest not found");

        let (status, body) = call(&state, Method::DELETE, "/api/guests/1", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["message"], "Guest deleted along with 0 bookings.");
    }

    #[test]
    fn unpublished_commit_is_503_without_internals() {
        let e = ApiError::Engine(EngineError::Unpublished("commit 01H of [\"payments.json\"]".into()));
        assert_eq!(e.status(), StatusCode::SERVICE_UNAVAILABLE);
        let body = e.body();
        assert_eq!(body["error"], "Change saved but not yet visible, retry shortly");
        assert!(!body.to_string().contains("payments.json"));
    }

    #[tokio::test]
    async fn oversized_body_rejected() {
        let state = state();
        let huge = "x".repeat(MAX_BODY_BYTES + 1);
        let (status, _) = call(
            &state,
            Method::POST,
            "/api/guests",
            Some(json!({ "full_name": huge, "address": "x" })),
        )
        .await;
        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn register_login_and_whoami() {
        let state = state();
        let (status, body) = call(
            &state,
            Method::POST,
            "/api/auth/register",
            Some(json!({ "username": "desk", "password": "secret1", "role": "Receptionist" })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert!(body["user"].get("password").is_none());

        let (status, body) = call(
            &state,
            Method::POST,
            "/api/auth/login",
            Some(json!({ "username": "desk", "password": "wrong12" })),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "invalid credentials");

        let (status, body) = call(
            &state,
            Method::POST,
            "/api/auth/login",
            Some(json!({ "username": "desk", "password": "secret1" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let token = body["token"].as_str().unwrap().to_string();

        let req = Request::builder()
            .method(Method::GET)
            .uri("/api/auth/me")
            .header(AUTHORIZATION, format!("Bearer {token}"))
            .body(Full::new(Bytes::new()))
            .unwrap();
        let response = handle(&state, req).await;
        assert_eq!(response.status(), StatusCode::OK);

        let (status, _) = call(&state, Method::GET, "/api/auth/me", None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }
}
