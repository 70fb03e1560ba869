use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::Path;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::sse::Event as SseEvent;
use axum::response::sse::KeepAlive;
use axum::response::sse::Sse;
use axum::response::IntoResponse;
use axum::response::Response;
use axum::routing::get;
use axum::routing::post;
use axum::Json;
use axum::Router;
use futures_util::stream;
use serde::Deserialize;
use serde::Serialize;
use tokio::net::TcpListener;
use tokio::sync::broadcast::error::RecvError;
use tower_http::trace::TraceLayer;

use crate::engine::ClimateAction;
use crate::engine::Engine;
use crate::engine::EngineError;
use crate::engine::ToIntegrationMessage;

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

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

/// Body of POST /v1/lights/:entity_id
#[derive(Debug, Deserialize)]
struct LightRequest {
    on: bool,
    #[serde(default)]
    brightness: Option<u8>,
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
async fn engine_state(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let snapshot = state.engine.state_snapshot();
    (StatusCode::OK, Json(snapshot.as_ref().clone()))
}

/// Handler for GET /v1/entities
#[tracing::instrument(skip(state))]
async fn entities(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    (StatusCode::OK, Json(state.engine.entities()))
}

/// Handler for GET /v1/devices
#[tracing::instrument(skip(state))]
async fn devices(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    (StatusCode::OK, Json(state.engine.devices()))
}

/// Handler for GET /v1/events
///
/// Streams every engine event as JSON until the client disconnects.
#[tracing::instrument(skip(state))]
async fn events(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    tracing::debug!("Opening event stream");
    let events = stream::unfold(state.engine.subscribe(), |mut events| async move {
        loop {
            match events.recv().await {
                Ok(event) => return Some((SseEvent::default().json_data(&event), events)),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!("Event stream fell behind, {} events dropped", skipped);
                }
                Err(RecvError::Closed) => return None,
            }
        }
    });
    Sse::new(events).keep_alive(KeepAlive::default())
}

/// Answer a command with 202, or with the reason the engine could not route it.
fn accepted(action: &str, result: Result<(), EngineError>) -> Response {
    match result {
        Ok(()) => (
            StatusCode::ACCEPTED,
            Json(PingResponse {
                status: "accepted".to_string(),
            }),
        )
            .into_response(),
        Err(e) => {
            let status = match e {
                EngineError::EntityNotFound(_) => StatusCode::NOT_FOUND,
                EngineError::IntegrationNotFound(_) | EngineError::IntegrationStopped(_) => {
                    StatusCode::SERVICE_UNAVAILABLE
                }
            };
            tracing::warn!("{} rejected: {}", action, e);
            (
                status,
                Json(ErrorResponse {
                    error: e.to_string(),
                }),
            )
                .into_response()
        }
    }
}

/// Handler for POST /v1/entities/:entity_id/refresh
#[tracing::instrument(skip(state))]
async fn refresh(
    State(state): State<Arc<AppState>>,
    Path(entity_id): Path<String>,
) -> Response {
    let result = state
        .engine
        .send_command(ToIntegrationMessage::Refresh { entity_id });
    accepted("Refresh", result)
}

/// Handler for POST /v1/lights/:entity_id
#[tracing::instrument(skip(state))]
async fn light_command(
    State(state): State<Arc<AppState>>,
    Path(entity_id): Path<String>,
    Json(request): Json<LightRequest>,
) -> Response {
    let result = state
        .engine
        .send_light_command(entity_id, request.on, request.brightness);
    accepted("Light command", result)
}

/// Handler for POST /v1/climates/:entity_id
#[tracing::instrument(skip(state))]
async fn climate_command(
    State(state): State<Arc<AppState>>,
    Path(entity_id): Path<String>,
    Json(action): Json<ClimateAction>,
) -> Response {
    accepted(
        "Climate command",
        state.engine.send_climate_command(entity_id, action),
    )
}

/// Create the API router with all endpoints
fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/v1/ping", get(ping))
        .route("/v1/info", get(info))
        .route("/v1/state", get(engine_state))
        .route("/v1/entities", get(entities))
        .route("/v1/devices", get(devices))
        .route("/v1/events", get(events))
        .route("/v1/entities/:entity_id/refresh", post(refresh))
        .route("/v1/lights/:entity_id", post(light_command))
        .route("/v1/climates/:entity_id", post(climate_command))
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
