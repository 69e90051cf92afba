//! Thin HTTP layer over [`IrrigationService`].
//!
//! Routes:
//! - `GET  /config`          current configuration (defaults if never saved)
//! - `POST /config`          merge `{humidityMinPercent, wateringIntervalMinutes}`
//! - `POST /sensor`          ingest `{moisturePercent, isIrrigating?, capturedAt?}`
//! - `GET  /sensor/current`  most recent reading, 204 if none yet
//! - `GET  /sensor/readings` history in arrival order, `?limit=N` for the tail
//! - `GET  /events`          server-sent events, one per broker notification
//! - `GET  /healthz`

use crate::broker::Notification;
use crate::error::SyncError;
use crate::model::{ConfigUpdate, Configuration, Reading, ReadingSubmission};
use crate::service::IrrigationService;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures_util::stream::{self, Stream};
use log::{error, info, warn};
use serde::Deserialize;
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;

type AppState = Arc<IrrigationService>;
type ApiError = (StatusCode, String);

pub fn build_router(service: Arc<IrrigationService>) -> Router {
    Router::new()
        .route("/config", get(get_config).post(post_config))
        .route("/sensor", post(post_sensor))
        .route("/sensor/current", get(get_current))
        .route("/sensor/readings", get(get_readings))
        .route("/events", get(events))
        .route("/healthz", get(healthz))
        .layer(CorsLayer::permissive())
        .with_state(service)
}

/// Serve until `cancel` fires.
pub async fn serve(
    addr: SocketAddr,
    service: Arc<IrrigationService>,
    cancel: CancellationToken,
) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("[HTTP] Listening on http://{}", listener.local_addr()?);
    axum::serve(listener, build_router(service))
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await
}

/// Map a core error to a status code: caller mistakes are 400, everything
/// else is a 500 with a generic message.
fn reject(action: &str, err: SyncError) -> ApiError {
    if err.is_client_error() {
        warn!("[HTTP] Rejected request while {}: {}", action, err);
        (StatusCode::BAD_REQUEST, err.to_string())
    } else {
        error!("[HTTP] Failed while {}: {}", action, err);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Internal error while {}.", action),
        )
    }
}

fn malformed(rejection: JsonRejection) -> ApiError {
    reject(
        "parsing request body",
        SyncError::invalid(rejection.body_text()),
    )
}

async fn get_config(State(service): State<AppState>) -> Result<Json<Configuration>, ApiError> {
    service
        .get_config()
        .await
        .map(Json)
        .map_err(|e| reject("fetching configuration", e))
}

async fn post_config(
    State(service): State<AppState>,
    body: Result<Json<ConfigUpdate>, JsonRejection>,
) -> Result<&'static str, ApiError> {
    let Json(update) = body.map_err(malformed)?;
    service
        .update_config(&update)
        .await
        .map_err(|e| reject("saving configuration", e))?;
    Ok("Configuration saved.")
}

async fn post_sensor(
    State(service): State<AppState>,
    body: Result<Json<ReadingSubmission>, JsonRejection>,
) -> Result<&'static str, ApiError> {
    let Json(submission) = body.map_err(malformed)?;
    service
        .ingest(submission)
        .await
        .map_err(|e| reject("processing sensor data", e))?;
    Ok("Sensor data received and processed.")
}

async fn get_current(State(service): State<AppState>) -> Result<Response, ApiError> {
    match service.current_reading().await {
        Ok(Some(reading)) => Ok(Json(reading).into_response()),
        Ok(None) => Ok(StatusCode::NO_CONTENT.into_response()),
        Err(e) => Err(reject("fetching current reading", e)),
    }
}

#[derive(Debug, Deserialize)]
struct HistoryParams {
    limit: Option<usize>,
}

async fn get_readings(
    State(service): State<AppState>,
    Query(params): Query<HistoryParams>,
) -> Result<Json<Vec<Reading>>, ApiError> {
    let mut history = service
        .history()
        .await
        .map_err(|e| reject("fetching reading history", e))?;
    if let Some(limit) = params.limit {
        let skip = history.len().saturating_sub(limit);
        history.drain(..skip);
    }
    Ok(Json(history))
}

fn to_event(notification: &Notification) -> Result<Event, axum::Error> {
    match notification {
        Notification::Snapshot {
            cause,
            config,
            reading,
        } => Event::default().event("snapshot").json_data(json!({
            "cause": cause,
            "config": config.as_ref(),
            "reading": reading.as_deref(),
        })),
        Notification::Config(config) => {
            Event::default().event("config").json_data(config.as_ref())
        }
        Notification::Reading(reading) => {
            Event::default().event("reading").json_data(reading.as_ref())
        }
        Notification::DeliveryFailed => Ok(Event::default().event("delivery-failed").data("{}")),
    }
}

/// One SSE stream per dashboard. The subscription lives inside the stream, so
/// the client going away unsubscribes it.
async fn events(
    State(service): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, axum::Error>>> {
    let subscription = service.subscribe();
    info!("[HTTP] Event stream opened for subscriber {}", subscription.id());
    let stream = stream::unfold(subscription, |mut subscription| async move {
        let notification = subscription.recv().await?;
        Some((to_event(&notification), subscription))
    });
    Sse::new(stream).keep_alive(KeepAlive::default())
}

async fn healthz(State(service): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "subscribers": service.broker().subscriber_count(),
    }))
}
