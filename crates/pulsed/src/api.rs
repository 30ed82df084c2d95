use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::body::Bytes;
use axum::extract::Path;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::response::Response;
use axum::routing::get;
use axum::routing::post;
use serde::Deserialize;
use serde::Serialize;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use crate::engine::AlarmCommand;
use crate::engine::CommandError;
use crate::engine::Engine;

/// Response for the /v1/ping endpoint
#[derive(Serialize)]
struct PingResponse {
    status: String,
}

/// Response for the /v1/info endpoint
#[derive(Serialize)]
struct InfoResponse {
    version: String,
    hostname: String,
}

/// Optional body for alarm commands
#[derive(Debug, Default, Deserialize)]
struct AlarmCommandRequest {
    code: Option<String>,
}

/// Response for alarm commands
#[derive(Serialize)]
struct AlarmCommandResponse {
    success: bool,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

fn error_response(status: StatusCode, error: impl ToString) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: error.to_string(),
        }),
    )
        .into_response()
}

/// Shared application state
#[derive(Clone)]
struct AppState {
    version: &'static str,
    engine: Arc<Engine>,
}

/// Handler for GET /v1/ping
#[tracing::instrument]
async fn ping() -> impl IntoResponse {
    tracing::debug!("Handling /v1/ping request");
    (
        StatusCode::OK,
        Json(PingResponse {
            status: "ok".to_string(),
        }),
    )
}

/// Handler for GET /v1/info
#[tracing::instrument(skip(state))]
async fn info(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    tracing::debug!("Handling /v1/info request");

    let hostname = hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "unknown".to_string());

    (
        StatusCode::OK,
        Json(InfoResponse {
            version: state.version.to_string(),
            hostname,
        }),
    )
}

/// Handler for GET /v1/state
#[tracing::instrument(skip(state))]
async fn entity_state(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    tracing::debug!("Handling /v1/state request");
    let snapshot = state.engine.state_snapshot();
    (StatusCode::OK, Json(snapshot.as_ref().clone()))
}

/// Handler for POST /v1/alarm/{entity_id}/{command}
///
/// The body is optional; when present it may carry a `code`.
#[tracing::instrument(skip(state, body))]
async fn alarm_command(
    State(state): State<Arc<AppState>>,
    Path((entity_id, command)): Path<(String, String)>,
    body: Bytes,
) -> Response {
    let command = match AlarmCommand::from_str(&command) {
        Ok(c) => c,
        Err(_) => {
            return error_response(
                StatusCode::BAD_REQUEST,
                format!("Unknown alarm command: {}", command),
            );
        }
    };

    let request: AlarmCommandRequest = if body.is_empty() {
        AlarmCommandRequest::default()
    } else {
        match serde_json::from_slice(&body) {
            Ok(r) => r,
            Err(e) => return error_response(StatusCode::BAD_REQUEST, e),
        }
    };

    match state
        .engine
        .send_alarm_command(entity_id, command, request.code)
        .await
    {
        Ok(success) => (StatusCode::OK, Json(AlarmCommandResponse { success })).into_response(),
        Err(e @ CommandError::UnknownEntity(_)) => error_response(StatusCode::NOT_FOUND, e),
        Err(e) => {
            tracing::warn!("Alarm command failed: {}", e);
            error_response(StatusCode::SERVICE_UNAVAILABLE, e)
        }
    }
}

/// Create the API router with all endpoints
fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/v1/ping", get(ping))
        .route("/v1/info", get(info))
        .route("/v1/state", get(entity_state))
        .route("/v1/alarm/:entity_id/:command", post(alarm_command))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the HTTP API server
///
/// Binds to `listen:port` and serves until `shutdown_rx` fires.
pub async fn serve(
    listen: String,
    port: u16,
    engine: Arc<Engine>,
    shutdown_rx: tokio::sync::oneshot::Receiver<()>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let version = env!("CARGO_PKG_VERSION");

    let state = Arc::new(AppState { version, engine });
    let app = create_router(state);

    let addr: SocketAddr = format!("{}:{}", listen, port).parse()?;
    tracing::info!("Starting HTTP API server on {}", addr);

    let listener = TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            shutdown_rx.await.ok();
            tracing::info!("HTTP API server shutting down gracefully");
        })
        .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    use super::*;

    fn router() -> Router {
        create_router(Arc::new(AppState {
            version: "test",
            engine: Arc::new(Engine::new()),
        }))
    }

    async fn json_body(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_ping() {
        let response = router()
            .oneshot(Request::get("/v1/ping").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["status"], "ok");
    }

    #[tokio::test]
    async fn test_info_reports_version() {
        let response = router()
            .oneshot(Request::get("/v1/info").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["version"], "test");
    }

    #[tokio::test]
    async fn test_empty_state() {
        let response = router()
            .oneshot(Request::get("/v1/state").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["alarm_panels"], serde_json::json!({}));
        assert_eq!(body["binary_sensors"], serde_json::json!({}));
    }

    #[tokio::test]
    async fn test_unknown_alarm_command() {
        let response = router()
            .oneshot(
                Request::post("/v1/alarm/alarm_control_panel.adt_home/arm_night")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_alarm_command_for_unknown_entity() {
        let response = router()
            .oneshot(
                Request::post("/v1/alarm/alarm_control_panel.adt_home/arm_away")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"code": "1234"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_malformed_alarm_body() {
        let response = router()
            .oneshot(
                Request::post("/v1/alarm/alarm_control_panel.adt_home/disarm")
                    .body(Body::from("not json"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
