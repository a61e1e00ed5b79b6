//! Message routes. Thin wrappers over the chat service; the container kind is
//! fixed by the route, everything else lives in `chat`.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::{Extension, Json};

use parley_types::api::{Claims, SendMessageRequest};
use parley_types::models::ChatRef;

use crate::auth::AppState;
use crate::chat;
use crate::error::ApiError;

pub async fn list_conversation_messages(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let messages = chat::get_messages(&state.db, claims.sub, ChatRef::Direct(id)).await?;
    Ok(Json(messages))
}

pub async fn list_group_messages(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let messages = chat::get_messages(&state.db, claims.sub, ChatRef::Group(id)).await?;
    Ok(Json(messages))
}

pub async fn send_conversation_message(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
    Json(req): Json<SendMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let message = chat::send_message(
        &state.db,
        &state.bus,
        claims.sub,
        ChatRef::Direct(id),
        req.content,
        req.attachments,
        req.reply_to_id,
    )
    .await?;
    Ok((StatusCode::CREATED, Json(message)))
}

pub async fn send_group_message(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
    Json(req): Json<SendMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let message = chat::send_message(
        &state.db,
        &state.bus,
        claims.sub,
        ChatRef::Group(id),
        req.content,
        req.attachments,
        req.reply_to_id,
    )
    .await?;
    Ok((StatusCode::CREATED, Json(message)))
}

pub async fn delete_message(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    chat::delete_message(&state.db, &state.bus, claims.sub, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
