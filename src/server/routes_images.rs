//! Artwork proxy routes.
//!
//! `/imgs/movies/{asset_id}/{image}` streams the asset's poster or background
//! straight through from the remote library, keeping the library token off
//! the client.

use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};

use super::AppContext;

/// Proxy poster/background artwork for an asset.
pub async fn artwork(
    State(ctx): State<AppContext>,
    Path((asset_id, image)): Path<(String, String)>,
) -> Response {
    let metadata = match ctx.library.get_metadata(&asset_id).await {
        Ok(metadata) => metadata,
        Err(err) => {
            tracing::error!(asset_id, error = %err, "artwork metadata lookup failed");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({"error": "Error serving image"})),
            )
                .into_response();
        }
    };

    let Some(path) = metadata.artwork_path(&image) else {
        return (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({"error": "Image type not found"})),
        )
            .into_response();
    };

    match ctx.library.fetch_artwork(path).await {
        Ok(upstream) => {
            let content_type = upstream
                .headers()
                .get(reqwest::header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .unwrap_or("image/jpeg")
                .to_string();

            Response::builder()
                .status(StatusCode::OK)
                .header(header::CONTENT_TYPE, content_type)
                .header(header::CACHE_CONTROL, "public, max-age=86400")
                .body(Body::from_stream(upstream.bytes_stream()))
                .unwrap()
        }
        Err(err) => {
            tracing::error!(asset_id, error = %err, "artwork proxy failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({"error": "Error serving image"})),
            )
                .into_response()
        }
    }
}
