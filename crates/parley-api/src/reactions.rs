use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::{Extension, Json};

use parley_types::api::{Claims, ReactionRequest};

use crate::auth::AppState;
use crate::chat;
use crate::error::ApiError;

/// Add the caller's reaction to a message. A duplicate (emoji already placed
/// by this caller) responds 200 with a null body instead of 201.
pub async fn add_reaction(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(message_id): Path<i64>,
    Json(req): Json<ReactionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let reaction =
        chat::add_reaction(&state.db, &state.bus, claims.sub, message_id, req.emoji).await?;
    let status = if reaction.is_some() {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(reaction)))
}

/// Remove the caller's reaction. Removing one that is not there is still 204.
pub async fn remove_reaction(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(message_id): Path<i64>,
    Json(req): Json<ReactionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    chat::remove_reaction(&state.db, &state.bus, claims.sub, message_id, req.emoji).await?;
    Ok(StatusCode::NO_CONTENT)
}
