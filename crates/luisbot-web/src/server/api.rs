//! REST API endpoints — the Bot Framework style messaging endpoint.

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use tracing::{error, info, warn};

use luisbot_core::channel::BufferedSink;
use luisbot_core::error::{SetupError, TurnError};
use luisbot_core::handler::TurnHandler;
use luisbot_core::types::Activity;

use super::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/messages", post(post_messages))
        .route("/api/health", get(get_health))
}

enum ApiError {
    Setup(SetupError),
    Turn(TurnError),
}

impl From<SetupError> for ApiError {
    fn from(e: SetupError) -> Self {
        ApiError::Setup(e)
    }
}

impl From<TurnError> for ApiError {
    fn from(e: TurnError) -> Self {
        ApiError::Turn(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Setup(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
            ApiError::Turn(TurnError::Recognizer(e)) => (StatusCode::BAD_GATEWAY, e.to_string()),
            ApiError::Turn(TurnError::Cancelled) => {
                (StatusCode::SERVICE_UNAVAILABLE, TurnError::Cancelled.to_string())
            }
            ApiError::Turn(e @ TurnError::Send(_)) => {
                (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
            }
        };
        error!("Turn failed ({}): {}", status, message);
        (status, Json(json!({"error": message}))).into_response()
    }
}

// --- Messages ---

async fn post_messages(
    State(state): State<Arc<AppState>>,
    Json(activity): Json<Activity>,
) -> Result<Json<Value>, ApiError> {
    let handler = TurnHandler::new(Some(Arc::clone(&state.services)), state.settings.clone())?;
    let sink = BufferedSink::new();
    let cancel = state.shutdown.child_token();

    handler.handle_turn(&activity, &sink, &cancel).await?;

    let replies: Vec<Value> = sink
        .into_messages()
        .into_iter()
        .map(|text| reply_to(&activity, text))
        .collect();
    if replies.is_empty() {
        warn!("{} turn produced no replies", activity.activity_type);
    } else {
        info!("{} turn -> {} replies", activity.activity_type, replies.len());
    }

    Ok(Json(json!({ "activities": replies })))
}

/// Message activity addressed back to the sender of `activity`.
fn reply_to(activity: &Activity, text: String) -> Value {
    json!({
        "type": "message",
        "id": uuid::Uuid::new_v4().to_string(),
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "text": text,
        "from": activity.recipient,
        "recipient": activity.from,
        "conversation": activity.conversation,
        "channelId": activity.channel_id,
        "replyToId": activity.id,
    })
}

// --- Health ---

async fn get_health(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "ok": true,
        "recognizers": state.services.keys(),
    }))
}
