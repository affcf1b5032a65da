use axum::{
    extract::State,
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::error;
use uuid::Uuid;

use crate::registration;
use crate::traits::WatermarkStore;
use crate::trigger::SweepTrigger;
use crate::types::{DispatcherError, FeedRecord, StoreError, SweepSummary};

#[derive(Clone)]
pub struct AppState {
    store: Arc<dyn WatermarkStore>,
    trigger: SweepTrigger,
}

impl AppState {
    pub fn new(store: Arc<dyn WatermarkStore>, trigger: SweepTrigger) -> Self {
        Self { store, trigger }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/feeds", post(register_feed).get(list_feeds))
        .route("/sweep", post(run_sweep))
        .with_state(state)
}

#[derive(Deserialize)]
pub struct RegisterRequest {
    #[serde(default)]
    url: Option<String>,
}

#[derive(Serialize)]
pub struct RegisterResponse {
    id: Uuid,
    url: String,
}

type ApiError = (StatusCode, Json<Value>);

fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (status, Json(json!({ "error": message.into() })))
}

async fn register_feed(
    State(state): State<AppState>,
    Json(body): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<RegisterResponse>), ApiError> {
    let url = body.url.unwrap_or_default();

    match registration::register(state.store.as_ref(), &url).await {
        Ok(id) => Ok((
            StatusCode::CREATED,
            Json(RegisterResponse {
                id,
                url: url.trim().to_string(),
            }),
        )),
        Err(DispatcherError::InvalidInput(message)) => {
            Err(api_error(StatusCode::BAD_REQUEST, message))
        }
        Err(DispatcherError::Store(StoreError::AlreadyRegistered { id })) => Err((
            StatusCode::CONFLICT,
            Json(json!({ "error": "RSS URL already registered", "id": id })),
        )),
        Err(e) => {
            error!("Error adding RSS URL: {}", e);
            Err(api_error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to add RSS URL."))
        }
    }
}

async fn list_feeds(State(state): State<AppState>) -> Result<Json<Vec<FeedRecord>>, ApiError> {
    registration::list_feeds(state.store.as_ref())
        .await
        .map(Json)
        .map_err(|e| {
            error!("Error listing feeds: {}", e);
            api_error(StatusCode::SERVICE_UNAVAILABLE, "Failed to list feeds.")
        })
}

/// Failed feeds are reported in the body; the status only reflects whether a sweep ran.
async fn run_sweep(State(state): State<AppState>) -> Result<Json<SweepSummary>, ApiError> {
    match state.trigger.try_run().await {
        Some(Ok(summary)) => Ok(Json(summary)),
        Some(Err(e)) => {
            error!("Error checking RSS feeds: {}", e);
            Err(api_error(StatusCode::SERVICE_UNAVAILABLE, "Failed to check RSS feeds."))
        }
        None => Err(api_error(StatusCode::CONFLICT, "A sweep is already running.")),
    }
}
