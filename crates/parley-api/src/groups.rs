//! Group chat lifecycle and list view. The creator becomes admin; profile
//! changes and deletion are admin-only, and both fan out to the full member
//! set over the bus.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::{Extension, Json};

use parley_db::Database;
use parley_db::models::GroupRow;
use parley_gateway::bus::EventBus;
use parley_types::api::{Claims, CreateGroupRequest, UpdateGroupRequest};
use parley_types::events::DeliveryEvent;
use parley_types::models::{ChatRef, GroupMember, GroupProfile, GroupSummary, Role};

use crate::auth::AppState;
use crate::chat;
use crate::conversations::member_snapshot;
use crate::error::ApiError;

pub async fn list_groups(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let summaries = list_for(&state.db, claims.sub).await?;
    Ok(Json(summaries))
}

pub async fn create_group(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateGroupRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let summary = create_for(&state.db, claims.sub, req).await?;
    Ok((StatusCode::CREATED, Json(summary)))
}

pub async fn update_group(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
    Json(req): Json<UpdateGroupRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let profile = update_for(&state.db, &state.bus, claims.sub, id, req).await?;
    Ok(Json(profile))
}

pub async fn delete_group(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    delete_for(&state.db, &state.bus, claims.sub, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub(crate) async fn list_for(
    db: &Arc<Database>,
    user_id: i64,
) -> Result<Vec<GroupSummary>, ApiError> {
    chat::run_blocking({
        let db = db.clone();
        move || {
            db.list_groups(user_id)?
                .into_iter()
                .map(|row| summary(&db, user_id, row))
                .collect()
        }
    })
    .await
}

pub(crate) async fn create_for(
    db: &Arc<Database>,
    creator: i64,
    req: CreateGroupRequest,
) -> Result<GroupSummary, ApiError> {
    chat::run_blocking({
        let db = db.clone();
        move || {
            let name = req.name.trim().to_string();
            if name.is_empty() || name.len() > 64 {
                return Err(ApiError::Validation(
                    "group name must be 1-64 characters".into(),
                ));
            }
            for &uid in &req.member_ids {
                if db.get_user_by_id(uid)?.is_none() {
                    return Err(ApiError::NotFound("user"));
                }
            }

            let id = db.create_group(&name, req.description.as_deref(), creator, &req.member_ids)?;
            let row = db.get_group(id)?.ok_or(ApiError::NotFound("group"))?;
            summary(&db, creator, row)
        }
    })
    .await
}

/// Admin-only partial update; the fresh profile is pushed to every member.
pub(crate) async fn update_for(
    db: &Arc<Database>,
    bus: &EventBus,
    caller: i64,
    id: i64,
    req: UpdateGroupRequest,
) -> Result<GroupProfile, ApiError> {
    let (profile, member_ids) = chat::run_blocking({
        let db = db.clone();
        move || -> Result<(GroupProfile, Vec<i64>), ApiError> {
            let chat_ref = ChatRef::Group(id);
            require_admin(&db, &chat_ref, caller)?;

            if let Some(name) = req.name.as_deref() {
                let name = name.trim();
                if name.is_empty() || name.len() > 64 {
                    return Err(ApiError::Validation(
                        "group name must be 1-64 characters".into(),
                    ));
                }
            }
            db.update_group(
                id,
                req.name.as_deref().map(str::trim),
                req.description.as_deref(),
                req.avatar.as_deref(),
            )?;

            let row = db.get_group(id)?.ok_or(ApiError::NotFound("group"))?;
            let member_ids = db
                .members_of(&chat_ref)?
                .into_iter()
                .map(|m| m.user_id)
                .collect();
            Ok((profile_from_row(row), member_ids))
        }
    })
    .await?;

    for &uid in &member_ids {
        bus.publish(
            uid,
            DeliveryEvent::GroupUpdated {
                group: profile.clone(),
            },
        )
        .await;
    }
    Ok(profile)
}

pub(crate) async fn delete_for(
    db: &Arc<Database>,
    bus: &EventBus,
    caller: i64,
    id: i64,
) -> Result<(), ApiError> {
    let member_ids = chat::run_blocking({
        let db = db.clone();
        move || -> Result<Vec<i64>, ApiError> {
            let chat_ref = ChatRef::Group(id);
            require_admin(&db, &chat_ref, caller)?;
            let member_ids = db
                .members_of(&chat_ref)?
                .into_iter()
                .map(|m| m.user_id)
                .collect();
            db.delete_group(id)?;
            Ok(member_ids)
        }
    })
    .await?;

    for &uid in &member_ids {
        bus.publish(uid, DeliveryEvent::GroupDeleted { group_chat_id: id })
            .await;
    }
    Ok(())
}

/// Non-members and plain members both come back `Forbidden`; a missing group
/// is indistinguishable from one the caller cannot see.
fn require_admin(db: &Database, chat_ref: &ChatRef, user_id: i64) -> Result<(), ApiError> {
    let member = db
        .membership(chat_ref, user_id)?
        .ok_or(ApiError::Forbidden)?;
    match member.role.as_deref().and_then(Role::parse) {
        Some(Role::Admin) => Ok(()),
        _ => Err(ApiError::Forbidden),
    }
}

fn summary(db: &Database, user_id: i64, row: GroupRow) -> Result<GroupSummary, ApiError> {
    let chat_ref = ChatRef::Group(row.id);
    let members = db
        .members_of(&chat_ref)?
        .into_iter()
        .map(|m| {
            let role = m.role.as_deref().and_then(Role::parse).unwrap_or(Role::Member);
            GroupMember {
                user: member_snapshot(m),
                role,
            }
        })
        .collect();
    let last_message = db
        .last_message(&chat_ref)?
        .map(|m| chat::message_from_row(m, vec![], None));
    let unread_count = db.unread_count(&chat_ref, user_id)?;

    Ok(GroupSummary {
        group: profile_from_row(row),
        members,
        last_message,
        unread_count,
    })
}

fn profile_from_row(row: GroupRow) -> GroupProfile {
    GroupProfile {
        id: row.id,
        name: row.name,
        description: row.description,
        avatar: row.avatar,
        created_at: chat::parse_ts(&row.created_at),
        updated_at: chat::parse_ts(&row.updated_at),
    }
}
