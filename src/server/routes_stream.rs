//! Playlist and segment handlers.
//!
//! Thin dispatch onto the active provider plus the error-to-status mapping:
//! malformed names are 400, absent segments 404, anything the provider could
//! not produce in time 503, and everything else an opaque 500.

use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use tokio_util::io::ReaderStream;

use super::AppContext;
use crate::error::Error;
use crate::streaming::SegmentSource;

const MANIFEST_CONTENT_TYPE: &str = "application/vnd.apple.mpegurl";
const SEGMENT_CONTENT_TYPE: &str = "video/mp2t";
const IMMUTABLE_CACHE: &str = "public, max-age=31536000, immutable";

/// Serve the HLS manifest for one asset.
pub async fn playlist(
    State(ctx): State<AppContext>,
    Path(asset_id): Path<String>,
) -> Response {
    match ctx.provider.playlist(&asset_id).await {
        Ok(manifest) => Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, MANIFEST_CONTENT_TYPE)
            .header(header::CACHE_CONTROL, "no-store")
            .body(Body::from(manifest))
            .unwrap(),
        Err(err) => error_response(&asset_id, "playlist", err),
    }
}

/// Serve one MPEG-TS segment.
pub async fn segment(
    State(ctx): State<AppContext>,
    Path((asset_id, segment_name)): Path<(String, String)>,
) -> Response {
    match ctx.provider.segment(&asset_id, &segment_name).await {
        Ok(SegmentSource::File { path, immutable }) => {
            let file = match tokio::fs::File::open(&path).await {
                Ok(file) => file,
                // the sliding window can delete a segment between resolve
                // and open
                Err(_) => return error_response(&asset_id, "segment", Error::NotFound),
            };
            let cache_control = if immutable { IMMUTABLE_CACHE } else { "no-store" };
            Response::builder()
                .status(StatusCode::OK)
                .header(header::CONTENT_TYPE, SEGMENT_CONTENT_TYPE)
                .header(header::CACHE_CONTROL, cache_control)
                .body(Body::from_stream(ReaderStream::new(file)))
                .unwrap()
        }
        Ok(SegmentSource::Stream(stream)) => Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, SEGMENT_CONTENT_TYPE)
            .header(header::CACHE_CONTROL, IMMUTABLE_CACHE)
            .body(Body::from_stream(stream))
            .unwrap(),
        Err(err) => error_response(&asset_id, "segment", err),
    }
}

/// Map a provider error onto the HTTP contract.
pub(super) fn error_response(asset_id: &str, what: &str, err: Error) -> Response {
    let (status, message) = match err.root() {
        Error::InvalidSegmentName => (StatusCode::BAD_REQUEST, "Invalid segment name"),
        Error::InvalidAssetId => (StatusCode::BAD_REQUEST, "Invalid asset id"),
        Error::NotFound => (StatusCode::NOT_FOUND, "Segment not found"),
        Error::NotReady => (StatusCode::SERVICE_UNAVAILABLE, "Stream not ready"),
        _ => {
            tracing::error!(asset_id, what, error = %err, "request failed");
            (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
        }
    };
    (status, Json(serde_json::json!({ "error": message }))).into_response()
}
