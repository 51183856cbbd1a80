use crate::broadcast::STREAM_CONTENT_TYPE;
use crate::control::control_socket_handler;
use crate::service::BoothService;
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get};
use axum::{Json, Router};
use bytes::Bytes;
use std::convert::Infallible;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tracing::{info, warn};

/// Shared state for the axum router
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<BoothService>,
}

/// Build the HTTP surface: MJPEG stream, control channel, status and file
/// endpoints, plus static serving of the uploads directory.
pub fn router(service: Arc<BoothService>) -> Router {
    let uploads_dir = service.store().dir().to_path_buf();
    let state = AppState { service };

    Router::new()
        .route("/stream.mjpg", get(mjpeg_stream_handler))
        .route("/health", get(health_handler))
        .route("/api/status", get(status_handler))
        .route("/api/photos", get(photos_list_handler))
        .route("/api/photos/:filename", delete(photo_delete_handler))
        .route("/ws", get(control_socket_handler))
        .nest_service("/uploads", ServeDir::new(uploads_dir))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Never-ending multipart response fed by a broadcaster subscription.
///
/// The subscription guard unregisters the viewer when the client
/// disconnects and the body stream is dropped.
async fn mjpeg_stream_handler(State(state): State<AppState>) -> impl IntoResponse {
    let broadcaster = Arc::clone(state.service.broadcaster());
    let (viewer_id, mut chunks) = broadcaster.subscribe();
    info!("MJPEG viewer {} connected", viewer_id);

    let stream = async_stream::stream! {
        let _guard = ViewerGuard {
            broadcaster,
            viewer_id,
        };
        while let Some(chunk) = chunks.recv().await {
            yield Ok::<Bytes, Infallible>(chunk);
        }
    };

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, STREAM_CONTENT_TYPE)
        .header(header::CACHE_CONTROL, "no-cache, private")
        .header(header::PRAGMA, "no-cache")
        .body(axum::body::Body::from_stream(stream))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

struct ViewerGuard {
    broadcaster: Arc<crate::broadcast::StreamBroadcaster>,
    viewer_id: crate::broadcast::ViewerId,
}

impl Drop for ViewerGuard {
    fn drop(&mut self) {
        self.broadcaster.unsubscribe(self.viewer_id);
    }
}

async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let service = &state.service;
    Json(serde_json::json!({
        "status": "ok",
        "state": service.state(),
        "simulated": service.is_simulated(),
        "viewers": service.broadcaster().viewer_count(),
        "collaborators": service.event_bus().subscriber_count(),
    }))
}

/// Whether the device is currently reachable
async fn status_handler(State(state): State<AppState>) -> impl IntoResponse {
    let service = &state.service;
    Json(serde_json::json!({
        "cameraConnected": !service.is_simulated(),
        "simulated": service.is_simulated(),
        "state": service.state(),
    }))
}

async fn photos_list_handler(State(state): State<AppState>) -> impl IntoResponse {
    match state.service.store().list().await {
        Ok(photos) => Json(serde_json::json!({ "photos": photos })).into_response(),
        Err(e) => {
            warn!("Failed to list photos: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "success": false, "error": e.to_string() })),
            )
                .into_response()
        }
    }
}

async fn photo_delete_handler(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> impl IntoResponse {
    match state.service.store().delete(&filename).await {
        Ok(()) => Json(serde_json::json!({ "success": true })).into_response(),
        Err(e) => {
            warn!("Failed to delete {}: {}", filename, e);
            (
                StatusCode::NOT_FOUND,
                Json(serde_json::json!({ "success": false, "error": e.to_string() })),
            )
                .into_response()
        }
    }
}
