//! Axum REST API handlers

use std::sync::Arc;

use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    response::Json,
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::error;

use crate::engine::FaceAnalyzer;
use crate::service::ExtractService;

use super::dto::{ExtractResponse, StatusResponse};

/// Application state shared across handlers
pub struct AppState<M: FaceAnalyzer> {
    pub service: ExtractService<M>,
}

/// Create the REST API router
pub fn create_rest_router<M: FaceAnalyzer + 'static>(state: Arc<AppState<M>>) -> Router {
    Router::new()
        .route("/", get(status_handler))
        .route("/extract", post(extract_handler::<M>))
        .layer(DefaultBodyLimit::max(50 * 1024 * 1024)) // 50MB limit for large images
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Liveness/readiness check. The router only exists after the model host has
/// finished initializing, so reachability implies readiness.
async fn status_handler() -> Json<StatusResponse> {
    Json(StatusResponse::ok())
}

/// Extract faces from an uploaded image.
///
/// Always answers 200; failures are reported in the body with an empty face
/// list. An empty `faces` array without `error` means zero faces were found.
async fn extract_handler<M: FaceAnalyzer + 'static>(
    State(state): State<Arc<AppState<M>>>,
    mut multipart: Multipart,
) -> Json<ExtractResponse> {
    let mut image_data: Option<Vec<u8>> = None;

    loop {
        match multipart.next_field().await {
            Ok(Some(field)) => {
                let name = field.name().unwrap_or("").to_string();
                if name == "file" || name == "image" {
                    match field.bytes().await {
                        Ok(bytes) => image_data = Some(bytes.to_vec()),
                        Err(e) => return Json(ExtractResponse::failure(e.to_string())),
                    }
                }
            }
            Ok(None) => break,
            Err(e) => return Json(ExtractResponse::failure(e.to_string())),
        }
    }

    let Some(image_data) = image_data else {
        return Json(ExtractResponse::failure("Missing file field"));
    };

    match state.service.extract(&image_data).await {
        Ok(faces) => Json(ExtractResponse::success(faces)),
        Err(e) => {
            error!("Extraction failed: {}", e);
            Json(ExtractResponse::failure(e.to_string()))
        }
    }
}
