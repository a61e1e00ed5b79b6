//! Direct conversation lifecycle and list view. A conversation holds exactly
//! two members; opening one against a pair that already shares a conversation
//! returns the existing one instead of creating a duplicate.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::{Extension, Json};

use parley_db::Database;
use parley_db::models::{ConversationRow, MemberRow};
use parley_gateway::bus::EventBus;
use parley_types::api::{Claims, CreateConversationRequest};
use parley_types::events::DeliveryEvent;
use parley_types::models::{ChatRef, ConversationSummary, UserSnapshot};

use crate::auth::AppState;
use crate::chat;
use crate::error::ApiError;

pub async fn list_conversations(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let summaries = list_for(&state.db, claims.sub).await?;
    Ok(Json(summaries))
}

pub async fn create_conversation(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateConversationRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let summary = create_for(&state.db, claims.sub, req.user_id).await?;
    Ok((StatusCode::CREATED, Json(summary)))
}

pub async fn delete_conversation(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    delete_for(&state.db, &state.bus, claims.sub, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Most recently active first, each with last message and the caller's
/// derived unread count.
pub(crate) async fn list_for(
    db: &Arc<Database>,
    user_id: i64,
) -> Result<Vec<ConversationSummary>, ApiError> {
    chat::run_blocking({
        let db = db.clone();
        move || {
            db.list_conversations(user_id)?
                .into_iter()
                .map(|row| summary(&db, user_id, row))
                .collect()
        }
    })
    .await
}

pub(crate) async fn create_for(
    db: &Arc<Database>,
    caller: i64,
    other: i64,
) -> Result<ConversationSummary, ApiError> {
    chat::run_blocking({
        let db = db.clone();
        move || {
            if other == caller {
                return Err(ApiError::Validation(
                    "cannot open a conversation with yourself".into(),
                ));
            }
            if db.get_user_by_id(other)?.is_none() {
                return Err(ApiError::NotFound("user"));
            }

            let id = match db.find_direct_conversation(caller, other)? {
                Some(existing) => existing,
                None => db.create_conversation(caller, other)?,
            };
            let row = db
                .get_conversation(id)?
                .ok_or(ApiError::NotFound("conversation"))?;
            summary(&db, caller, row)
        }
    })
    .await
}

/// Either member may delete; the other side learns about it over the bus.
pub(crate) async fn delete_for(
    db: &Arc<Database>,
    bus: &EventBus,
    caller: i64,
    id: i64,
) -> Result<(), ApiError> {
    let member_ids = chat::run_blocking({
        let db = db.clone();
        move || -> Result<Vec<i64>, ApiError> {
            let chat_ref = ChatRef::Direct(id);
            if db.membership(&chat_ref, caller)?.is_none() {
                return Err(ApiError::Forbidden);
            }
            let member_ids = db
                .members_of(&chat_ref)?
                .into_iter()
                .map(|m| m.user_id)
                .collect();
            db.delete_conversation(id)?;
            Ok(member_ids)
        }
    })
    .await?;

    for &uid in &member_ids {
        bus.publish(uid, DeliveryEvent::ConversationDeleted { conversation_id: id })
            .await;
    }
    Ok(())
}

fn summary(
    db: &Database,
    user_id: i64,
    row: ConversationRow,
) -> Result<ConversationSummary, ApiError> {
    let chat_ref = ChatRef::Direct(row.id);
    let members = db
        .members_of(&chat_ref)?
        .into_iter()
        .map(member_snapshot)
        .collect();
    // Preview only: reactions and reply context are left to the full fetch
    let last_message = db
        .last_message(&chat_ref)?
        .map(|m| chat::message_from_row(m, vec![], None));
    let unread_count = db.unread_count(&chat_ref, user_id)?;

    Ok(ConversationSummary {
        id: row.id,
        members,
        last_message,
        unread_count,
        updated_at: chat::parse_ts(&row.updated_at),
    })
}

pub(crate) fn member_snapshot(m: MemberRow) -> UserSnapshot {
    UserSnapshot {
        id: m.user_id,
        username: m.username,
        nickname: m.nickname,
        avatar: m.avatar,
    }
}
