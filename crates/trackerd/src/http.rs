//! HTTP surface: health, online devices, relay commands and the event stream

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use fleet_core::{ControlCommand, ControlResponse};
use gt06_server::{BroadcastPublisher, ConnectionRegistry, ControlClient, OnlineDevice};
use serde::{Deserialize, Serialize};
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::{Stream, StreamExt};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
    control: Arc<ControlClient>,
    registry: Arc<ConnectionRegistry>,
    events: BroadcastPublisher,
}

impl AppState {
    pub fn new(control: Arc<ControlClient>, registry: Arc<ConnectionRegistry>, events: BroadcastPublisher) -> Self {
        Self {
            control,
            registry,
            events,
        }
    }
}

pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/devices/online", get(online_devices))
        .route("/devices/{imei}/commands", post(send_command))
        .route("/events", get(events))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// API error that converts to an HTTP response
#[derive(Debug)]
pub enum ApiError {
    /// 400 Bad Request
    BadRequest(String),
    /// 404 Not Found
    NotFound(String),
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_type, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg),
        };

        tracing::debug!(error = error_type, %message, "API client error");

        let body = Json(ErrorResponse {
            error: error_type.to_string(),
            message,
        });
        (status, body).into_response()
    }
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    online_devices: usize,
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        online_devices: state.registry.len(),
    })
}

#[derive(Serialize)]
struct OnlineResponse {
    devices: Vec<OnlineDevice>,
}

async fn online_devices(State(state): State<AppState>) -> Json<OnlineResponse> {
    Json(OnlineResponse {
        devices: state.registry.online(),
    })
}

#[derive(Debug, Deserialize)]
pub struct CommandRequest {
    pub command: String,
}

fn valid_imei(imei: &str) -> bool {
    matches!(imei.len(), 15 | 16) && imei.bytes().all(|b| b.is_ascii_digit())
}

/// POST /devices/{imei}/commands
///
/// 200 when the device confirmed the command, 502 with the same body when
/// it refused, timed out or dropped the connection.
async fn send_command(
    State(state): State<AppState>,
    Path(imei): Path<String>,
    Json(request): Json<CommandRequest>,
) -> Result<(StatusCode, Json<ControlResponse>), ApiError> {
    if !valid_imei(&imei) {
        return Err(ApiError::BadRequest(format!("invalid IMEI: {}", imei)));
    }
    let command: ControlCommand = request.command.parse().map_err(ApiError::BadRequest)?;
    if !state.registry.contains(&imei) {
        return Err(ApiError::NotFound(format!("device {} is not connected", imei)));
    }

    let response = state.control.send_command(&imei, command).await;
    let status = if response.success {
        StatusCode::OK
    } else {
        StatusCode::BAD_GATEWAY
    };
    Ok((status, Json(response)))
}

/// GET /events
///
/// Lagged subscribers skip the events they missed.
async fn events(State(state): State<AppState>) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let stream = BroadcastStream::new(state.events.subscribe()).filter_map(|result| match result {
        Ok(event) => Event::default().event(event.kind()).json_data(&event).ok().map(Ok::<_, Infallible>),
        Err(_) => None,
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use gt06_codec::CommandReply;
    use gt06_server::config::ControlConfig;
    use gt06_server::DeviceHandle;
    use tokio::sync::mpsc;
    use tower::ServiceExt;
    use uuid::Uuid;

    const IMEI: &str = "358899051234567";

    fn test_app() -> (Router, Arc<ConnectionRegistry>) {
        let registry = Arc::new(ConnectionRegistry::new());
        let config = ControlConfig {
            reply_timeout_secs: 1,
            ..ControlConfig::default()
        };
        let control = Arc::new(ControlClient::new(registry.clone(), &config));
        let state = AppState::new(control, registry.clone(), BroadcastPublisher::default());
        (create_router(state), registry)
    }

    /// Register a fake connection that answers every command with `reply`
    fn connect_device(registry: &ConnectionRegistry, reply: &'static str) {
        let (tx, mut rx) = mpsc::channel(4);
        registry.insert(DeviceHandle::new(Uuid::new_v4(), IMEI, tx));
        tokio::spawn(async move {
            while let Some(command) = rx.recv().await {
                let _ = command.reply.send(CommandReply {
                    server_flag: command.server_flag,
                    text: reply.to_string(),
                });
            }
        });
    }

    fn command_request(imei: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(format!("/devices/{}/commands", imei))
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn health_reports_online_count() {
        let (app, registry) = test_app();
        connect_device(&registry, "DYD=Success!");

        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["status"], "ok");
        assert_eq!(json["online_devices"], 1);
    }

    #[tokio::test]
    async fn lists_online_devices() {
        let (app, registry) = test_app();
        connect_device(&registry, "DYD=Success!");

        let response = app
            .oneshot(Request::builder().uri("/devices/online").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let json = body_json(response).await;
        assert_eq!(json["devices"][0]["imei"], IMEI);
    }

    #[tokio::test]
    async fn command_to_offline_device_is_not_found() {
        let (app, _) = test_app();
        let response = app
            .oneshot(command_request(IMEI, r#"{"command":"cut-oil"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(response).await["error"], "not_found");
    }

    #[tokio::test]
    async fn unknown_command_is_bad_request() {
        let (app, _) = test_app();
        let response = app
            .oneshot(command_request(IMEI, r#"{"command":"self-destruct"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn malformed_imei_is_bad_request() {
        let (app, _) = test_app();
        let response = app
            .oneshot(command_request("12ab", r#"{"command":"cut-oil"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn confirmed_command_returns_ok() {
        let (app, registry) = test_app();
        connect_device(&registry, "DYD=Success!");

        let response = app
            .oneshot(command_request(IMEI, r#"{"command":"cut-oil"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["success"], true);
        assert_eq!(json["command"], "cut-oil");
        assert_eq!(json["raw_response"], "DYD=Success!");
    }

    #[tokio::test]
    async fn refused_command_returns_bad_gateway() {
        let (app, registry) = test_app();
        connect_device(&registry, "DYD=Speed Limit, Speed 35!");

        let response = app
            .oneshot(command_request(IMEI, r#"{"command":"cut-oil"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        let json = body_json(response).await;
        assert_eq!(json["success"], false);
        assert_eq!(json["imei"], IMEI);
    }
}
