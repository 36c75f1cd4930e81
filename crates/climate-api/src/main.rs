//! Climate API - HTTP and WebSocket surface of the decision engine

use axum::{
    extract::{Path, State, WebSocketUpgrade},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use climate_core::{
    DeviceId, FactStore, HouseId, InstructionOwner, MemoryStore, RoomId, ScenarioId,
    SensorReading, StoreError, UserId,
};
use decision_engine::{DecisionEngine, EngineConfig, EngineError, EngineEvent};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod websocket;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<DecisionEngine>,
    pub store: Arc<MemoryStore>,
}

impl AppState {
    /// Write the facts snapshot after a mutating call
    async fn persist(&self) {
        if let Err(e) = self.store.save().await {
            tracing::warn!("Failed to save facts snapshot: {}", e);
        }
    }
}

/// API response wrapper using serde_json::Value for flexibility
#[derive(Serialize)]
struct ApiResponse {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl ApiResponse {
    fn success<T: Serialize>(data: T) -> Self {
        Self {
            success: true,
            data: Some(serde_json::to_value(data).unwrap_or(serde_json::Value::Null)),
            error: None,
        }
    }

    fn error(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(msg.into()),
        }
    }
}

type ApiResult = (StatusCode, Json<ApiResponse>);

fn ok<T: Serialize>(data: T) -> ApiResult {
    (StatusCode::OK, Json(ApiResponse::success(data)))
}

fn engine_error(e: EngineError) -> ApiResult {
    let status = match &e {
        EngineError::MissingFact(_) | EngineError::Store(StoreError::NotFound(_)) => {
            StatusCode::NOT_FOUND
        }
        EngineError::EmptyHistory { .. } | EngineError::AmbiguousOpposite(_) => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        EngineError::StoreWriteConflict(_) => StatusCode::CONFLICT,
        EngineError::InvalidTimeFormat(_)
        | EngineError::InvalidCron(_)
        | EngineError::InvalidConfig(_) => StatusCode::BAD_REQUEST,
        EngineError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(ApiResponse::error(e.to_string())))
}

fn not_found(what: impl Into<String>) -> ApiResult {
    (StatusCode::NOT_FOUND, Json(ApiResponse::error(what)))
}

/// System info response
#[derive(Serialize)]
struct SystemInfo {
    name: String,
    version: String,
    freshness: String,
    detection_interval_secs: u64,
}

#[derive(Deserialize)]
struct WeatherRequest {
    temperature: f64,
}

#[derive(Deserialize)]
struct DeviceStateRequest {
    on: bool,
}

#[derive(Deserialize)]
struct AdaptRequest {
    device: DeviceId,
}

/// Get system info
async fn system_info(State(state): State<AppState>) -> impl IntoResponse {
    let config = state.engine.config();
    ok(SystemInfo {
        name: "Climate API".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        freshness: format!("{:?}", config.freshness),
        detection_interval_secs: config.detection_interval_secs,
    })
}

/// List all houses
async fn list_houses(State(state): State<AppState>) -> impl IntoResponse {
    ok(state.store.houses())
}

/// Run the detection cycle of a house now
async fn run_cycle(State(state): State<AppState>, Path(house): Path<String>) -> impl IntoResponse {
    let result = state.engine.run_house_cycle(&HouseId::new(house)).await;
    state.persist().await;
    match result {
        Ok(report) => ok(report),
        Err(e) => engine_error(e),
    }
}

/// Apply an outdoor temperature to weather-dependent devices
async fn apply_weather(
    State(state): State<AppState>,
    Path(house): Path<String>,
    Json(req): Json<WeatherRequest>,
) -> impl IntoResponse {
    if !req.temperature.is_finite() {
        return (
            StatusCode::BAD_REQUEST,
            Json(ApiResponse::error("Temperature must be a finite number")),
        );
    }

    match state
        .engine
        .apply_weather(&HouseId::new(house), req.temperature)
    {
        Ok(update) => {
            state.persist().await;
            ok(update)
        }
        Err(e) => engine_error(e),
    }
}

/// Record a sensor reading
async fn record_reading(
    State(state): State<AppState>,
    Json(reading): Json<SensorReading>,
) -> impl IntoResponse {
    if !reading.value.is_finite() {
        return (
            StatusCode::BAD_REQUEST,
            Json(ApiResponse::error("Reading value must be a finite number")),
        );
    }

    let response = serde_json::json!({
        "sensor": reading.sensor,
        "room": reading.room,
        "parameter": reading.parameter,
    });
    state.engine.record_reading(reading);
    state.persist().await;
    ok(response)
}

/// Get the classified state of a room
async fn room_state(State(state): State<AppState>, Path(room): Path<String>) -> impl IntoResponse {
    match state.store.get_room_state(&RoomId::new(room)) {
        Some(room_state) => ok(room_state),
        None => not_found("Room state not detected yet"),
    }
}

/// Get the final instruction set of a room
async fn room_instructions(
    State(state): State<AppState>,
    Path(room): Path<String>,
) -> impl IntoResponse {
    match state
        .store
        .get_instruction_set(&RoomId::new(room), &InstructionOwner::Final)
    {
        Some(set) => ok(set),
        None => not_found("No final instruction set for room"),
    }
}

/// Arbitrate a room's machine and scenario sets again
async fn finalize_room(
    State(state): State<AppState>,
    Path(room): Path<String>,
) -> impl IntoResponse {
    match state.engine.finalize_room(&RoomId::new(room)).await {
        Ok(outcome) => {
            state.persist().await;
            ok(outcome)
        }
        Err(e) => engine_error(e),
    }
}

/// List all devices
async fn list_devices(State(state): State<AppState>) -> impl IntoResponse {
    ok(state.store.devices())
}

/// Record a device's actual on/off state
async fn set_device_state(
    State(state): State<AppState>,
    Path(device): Path<String>,
    Json(req): Json<DeviceStateRequest>,
) -> impl IntoResponse {
    match state
        .engine
        .set_device_state(&DeviceId::new(device.clone()), req.on)
    {
        Ok(()) => {
            state.persist().await;
            ok(serde_json::json!({
                "device": device,
                "on": req.on
            }))
        }
        Err(e) => engine_error(e),
    }
}

/// List all scenarios
async fn list_scenarios(State(state): State<AppState>) -> impl IntoResponse {
    ok(state.store.scenarios())
}

/// Evaluate a scenario now
async fn evaluate_scenario(
    State(state): State<AppState>,
    Path(scenario): Path<String>,
) -> impl IntoResponse {
    match state
        .engine
        .evaluate_scenario(&ScenarioId::new(scenario))
        .await
    {
        Ok(report) => {
            state.persist().await;
            ok(report)
        }
        Err(e) => engine_error(e),
    }
}

/// Adapt a user's preferred ranges from their history with a device
async fn adapt_preferences(
    State(state): State<AppState>,
    Path(user): Path<String>,
    Json(req): Json<AdaptRequest>,
) -> impl IntoResponse {
    match state
        .engine
        .adapt_preferences(&UserId::new(user), &req.device)
    {
        Ok(outcomes) => {
            state.persist().await;
            ok(outcomes)
        }
        Err(e) => engine_error(e),
    }
}

/// WebSocket upgrade handler
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| websocket::handle_socket(socket, state))
}

/// Health check
async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

/// Save the snapshot whenever a scheduled cycle or tick completes
fn spawn_snapshot_writer(state: AppState) {
    let mut rx = state.engine.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(
                    EngineEvent::HouseCycleFinished { .. }
                    | EngineEvent::ScenarioTickFinished { .. },
                ) => state.persist().await,
                Ok(_) => {}
                Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                    tracing::debug!("Snapshot writer skipped {} events", n);
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/v1/system/info", get(system_info))
        .route("/api/v1/houses", get(list_houses))
        .route("/api/v1/houses/:house/cycle", post(run_cycle))
        .route("/api/v1/houses/:house/weather", post(apply_weather))
        .route("/api/v1/readings", post(record_reading))
        .route("/api/v1/rooms/:room/state", get(room_state))
        .route("/api/v1/rooms/:room/instructions", get(room_instructions))
        .route("/api/v1/rooms/:room/finalize", post(finalize_room))
        .route("/api/v1/devices", get(list_devices))
        .route("/api/v1/devices/:device/state", post(set_device_state))
        .route("/api/v1/scenarios", get(list_scenarios))
        .route(
            "/api/v1/scenarios/:scenario/evaluate",
            post(evaluate_scenario),
        )
        .route(
            "/api/v1/users/:user/preferences/adapt",
            post(adapt_preferences),
        )
        // WebSocket
        .route("/ws", get(ws_handler))
        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "climate_api=debug,decision_engine=debug,climate_core=info,info".into()
            }),
        )
        .init();

    tracing::info!("Starting Climate API server");

    let config = EngineConfig::from_env()?;
    let listen_addr = config.listen_addr.clone();

    let facts_path = config.facts_path();
    tracing::info!("Loading facts from {:?}", facts_path);
    let store = Arc::new(MemoryStore::open(facts_path).await);
    tracing::info!(
        "Loaded {} houses, {} devices, {} scenarios",
        store.houses().len(),
        store.devices().len(),
        store.scenarios().len()
    );

    let engine = Arc::new(DecisionEngine::new(store.clone(), config));
    engine.start()?;

    let state = AppState { engine, store };
    spawn_snapshot_writer(state.clone());

    let app = router(state);

    tracing::info!("Listening on http://{}", listen_addr);
    let listener = tokio::net::TcpListener::bind(&listen_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
