use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::{Extension, Json};

use parley_types::api::{Claims, MarkReadRequest};

use crate::auth::AppState;
use crate::chat;
use crate::error::ApiError;

/// Advance the caller's read cursor in the given chat. Idempotent; the
/// response is 204 whether or not the cursor actually moved.
pub async fn mark_read(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<MarkReadRequest>,
) -> Result<impl IntoResponse, ApiError> {
    chat::mark_read(&state.db, &state.bus, claims.sub, req.chat).await?;
    Ok(StatusCode::NO_CONTENT)
}
