use super::registry::ClientRegistry;

use axum::{
    extract::Extension,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use std::sync::Arc;

pub fn router(registry: Arc<ClientRegistry>) -> Router {
    Router::new()
        .route("/configdump", get(handle_config_dump))
        .route("/healthz", get(handle_healthz))
        .layer(Extension(registry))
}

/// Serves the snapshot of every connected client as a JSON array.
pub async fn handle_config_dump(Extension(registry): Extension<Arc<ClientRegistry>>) -> Response {
    let snapshot = registry.snapshot().await;

    match serde_json::to_vec(&snapshot) {
        Ok(body) => {
            tracing::debug!("Serving config dump for {} clients", snapshot.len());
            ([(header::CONTENT_TYPE, "application/json")], body).into_response()
        }
        Err(e) => {
            tracing::error!("Failed to serialize config dump: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

pub async fn handle_healthz() -> &'static str {
    "ok"
}
