//! Upload endpoint dispatch.
//!
//! `POST /api/uploads` creates a session, `HEAD /api/uploads/:id` reports
//! its offset, `PATCH /api/uploads/:id` appends a chunk. Any other method
//! on these paths is answered with 405 by the method routers.

use std::sync::Arc;

use axum::Router;
use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, Path, State};
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{head, post};

use dockhand_commit::{TMP_UPLOAD_DIR, UploadRegistry, UserHandler};
use dockhand_settings::UploadSettings;
use dockhand_store::{Concat, NewUpload, StoreError};

use crate::BASE_PATH;
use crate::context::{RequestContext, RequestUser};
use crate::headers::{
    UPLOAD_CHECKSUM, UPLOAD_CONCAT, UPLOAD_LENGTH, UPLOAD_METADATA, UPLOAD_OFFSET,
    parse_upload_checksum, parse_upload_concat, parse_upload_metadata,
};

/// Extra request-body headroom beyond the configured chunk size, for
/// clients that round their chunks up slightly.
const CHUNK_OVERHEAD: usize = 1024;

/// Shared server state.
#[derive(Clone)]
pub struct AppState {
    pub context: Arc<dyn RequestContext>,
    pub registry: Arc<UploadRegistry>,
    pub settings: UploadSettings,
}

/// Builds the upload router.
pub fn router(state: AppState) -> Router {
    let body_limit = state.settings.chunk_size as usize + CHUNK_OVERHEAD;
    Router::new()
        .route("/api/uploads", post(create_upload))
        .route("/api/uploads/:id", head(head_upload).patch(patch_upload))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}

/// Per-request setup shared by every endpoint: feature gate, user
/// resolution, staging directory, handler lookup.
///
/// The staging directory is (re)created on every request because the
/// completion consumer removes it once the last session finishes.
async fn prepare(
    state: &AppState,
    headers: &HeaderMap,
) -> Result<(RequestUser, Arc<UserHandler>), Response> {
    if !state.settings.enabled {
        return Err(StatusCode::NOT_FOUND.into_response());
    }
    let Some(user) = state.context.resolve(headers) else {
        return Err((StatusCode::UNAUTHORIZED, "authentication required").into_response());
    };

    if let Err(e) = tokio::fs::create_dir_all(user.root.join(TMP_UPLOAD_DIR)).await {
        tracing::error!(user = user.id, error = %e, "failed to create staging directory");
        return Err(StatusCode::INTERNAL_SERVER_ERROR.into_response());
    }

    match state.registry.get_or_create(user.id, &user.root) {
        Ok(handler) => Ok((user, handler)),
        Err(e) => {
            tracing::error!(user = user.id, error = %e, "failed to create upload handler");
            Err(StatusCode::INTERNAL_SERVER_ERROR.into_response())
        }
    }
}

async fn create_upload(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let (user, handler) = match prepare(&state, &headers).await {
        Ok(ok) => ok,
        Err(response) => return response,
    };

    let concat = match header_str(&headers, &UPLOAD_CONCAT) {
        Some(raw) => match parse_upload_concat(raw) {
            Ok(concat) => concat,
            Err(e) => return (StatusCode::BAD_REQUEST, e.to_string()).into_response(),
        },
        None => Concat::None,
    };

    let metadata = match header_str(&headers, &UPLOAD_METADATA) {
        Some(raw) => match parse_upload_metadata(raw) {
            Ok(metadata) => metadata,
            Err(e) => return (StatusCode::BAD_REQUEST, e.to_string()).into_response(),
        },
        None => Default::default(),
    };

    // The declared length is required except for a final concatenation,
    // whose size is the sum of its parts.
    let size = if matches!(concat, Concat::Final { .. }) {
        0
    } else {
        match header_str(&headers, &UPLOAD_LENGTH).and_then(|v| v.parse::<u64>().ok()) {
            Some(size) => size,
            None => {
                return (StatusCode::BAD_REQUEST, "missing or invalid Upload-Length")
                    .into_response();
            }
        }
    };

    match handler
        .store()
        .create(NewUpload {
            size,
            metadata,
            concat,
        })
        .await
    {
        Ok(info) => {
            tracing::debug!(user = user.id, upload = %info.id, "upload session opened");
            // A concat-final session is assembled at creation time.
            let offset = if info.partial_ids.is_empty() { 0 } else { info.size };
            with_headers(
                StatusCode::CREATED,
                vec![
                    (
                        axum::http::header::LOCATION,
                        format!("{BASE_PATH}/{}", info.id),
                    ),
                    (UPLOAD_OFFSET, offset.to_string()),
                ],
            )
        }
        Err(e) => store_response(&e),
    }
}

async fn head_upload(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Response {
    let (_user, handler) = match prepare(&state, &headers).await {
        Ok(ok) => ok,
        Err(response) => return response,
    };

    let info = match handler.store().info(&id).await {
        Ok(info) => info,
        Err(e) => return store_response(&e),
    };
    let offset = match handler.store().offset(&id).await {
        Ok(offset) => offset,
        Err(e) => return store_response(&e),
    };

    with_headers(
        StatusCode::OK,
        vec![
            (UPLOAD_OFFSET, offset.to_string()),
            (UPLOAD_LENGTH, info.size.to_string()),
        ],
    )
}

async fn patch_upload(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let (user, handler) = match prepare(&state, &headers).await {
        Ok(ok) => ok,
        Err(response) => return response,
    };

    let Some(offset) = header_str(&headers, &UPLOAD_OFFSET).and_then(|v| v.parse::<u64>().ok())
    else {
        return (StatusCode::BAD_REQUEST, "missing or invalid Upload-Offset").into_response();
    };

    let checksum = match header_str(&headers, &UPLOAD_CHECKSUM) {
        Some(raw) => match parse_upload_checksum(raw) {
            Ok(hex) => Some(hex),
            Err(e) => return (StatusCode::BAD_REQUEST, e.to_string()).into_response(),
        },
        None => None,
    };

    match handler
        .store()
        .append(&id, offset, &body, checksum.as_deref())
        .await
    {
        Ok(new_offset) => {
            tracing::debug!(
                user = user.id,
                upload = %id,
                offset = new_offset,
                "chunk appended"
            );
            with_headers(
                StatusCode::NO_CONTENT,
                vec![(UPLOAD_OFFSET, new_offset.to_string())],
            )
        }
        Err(e) => store_response(&e),
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &HeaderName) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn with_headers(status: StatusCode, pairs: Vec<(HeaderName, String)>) -> Response {
    let mut response = status.into_response();
    for (name, value) in pairs {
        if let Ok(value) = HeaderValue::from_str(&value) {
            response.headers_mut().insert(name, value);
        }
    }
    response
}

/// Maps a store failure to a response.
fn store_response(error: &StoreError) -> Response {
    let status = match error {
        StoreError::NotFound(_) => StatusCode::NOT_FOUND,
        StoreError::OffsetMismatch { .. } | StoreError::AlreadyComplete(_) => StatusCode::CONFLICT,
        // 460 is the de-facto checksum-mismatch status of the resumable
        // upload protocol.
        StoreError::ChecksumMismatch => {
            StatusCode::from_u16(460).unwrap_or(StatusCode::BAD_REQUEST)
        }
        StoreError::InvalidId(_)
        | StoreError::SizeExceeded { .. }
        | StoreError::PartialIncomplete(_)
        | StoreError::NotPartial(_) => StatusCode::BAD_REQUEST,
        StoreError::Io(_) | StoreError::Json(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };

    if status == StatusCode::INTERNAL_SERVER_ERROR {
        tracing::error!(error = %error, "upload store failure");
        return status.into_response();
    }
    (status, error.to_string()).into_response()
}
