//! Schedule entry endpoints

use axum::{
    extract::{Query, State},
    Extension, Json,
};

use crate::error::{ApiError, Result};
use crate::models::*;
use crate::routes::auth::AuthenticatedIdentity;
use crate::AppState;

fn to_entries(rows: Vec<DbScheduleEntry>) -> Result<Vec<ScheduleEntry>> {
    rows.iter()
        .map(|row| {
            row.to_entry()
                .map_err(|e| ApiError::Internal(format!("stored entry {}: {}", row.item_key, e)))
        })
        .collect()
}

/// GET /api/schedule
pub async fn list(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedIdentity>,
    Query(query): Query<ScheduleQuery>,
) -> Result<Json<ScheduleListResponse>> {
    let rows = state
        .db
        .list_entries(
            &auth.identity_id,
            query.due_from,
            query.due_until,
            query.prefix.as_deref(),
        )
        .await?;

    Ok(Json(ScheduleListResponse {
        entries: to_entries(rows)?,
    }))
}

/// GET /api/schedule/item?key=
pub async fn get_item(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedIdentity>,
    Query(query): Query<ItemQuery>,
) -> Result<Json<ScheduleEntry>> {
    let row = state
        .db
        .get_entry(&auth.identity_id, &query.key)
        .await?
        .ok_or_else(|| ApiError::NotFound(query.key.clone()))?;

    let entry = row
        .to_entry()
        .map_err(|e| ApiError::Internal(format!("stored entry {}: {}", row.item_key, e)))?;
    Ok(Json(entry))
}

/// PUT /api/schedule
///
/// Idempotent: storing the same entry twice leaves one row.
pub async fn upsert(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedIdentity>,
    Json(entry): Json<ScheduleEntry>,
) -> Result<Json<ScheduleEntry>> {
    if entry.item_key.as_str().trim().is_empty() {
        return Err(ApiError::BadRequest("item_key must not be empty".to_string()));
    }
    entry.validate()?;

    let row = state.db.upsert_entry(&auth.identity_id, &entry).await?;
    tracing::debug!(
        identity_id = %auth.identity_id,
        item_key = %row.item_key,
        "schedule entry stored"
    );

    Ok(Json(row.to_entry()?))
}

/// DELETE /api/schedule/item?key=
pub async fn delete_item(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedIdentity>,
    Query(query): Query<ItemQuery>,
) -> Result<Json<DeleteResponse>> {
    let deleted_count = state.db.delete_entry(&auth.identity_id, &query.key).await?;
    Ok(Json(DeleteResponse { deleted_count }))
}

/// DELETE /api/schedule?prefix=
pub async fn delete_all(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedIdentity>,
    Query(query): Query<PrefixQuery>,
) -> Result<Json<DeleteResponse>> {
    let deleted_count = state
        .db
        .delete_entries(&auth.identity_id, query.prefix.as_deref())
        .await?;

    tracing::info!(
        identity_id = %auth.identity_id,
        prefix = ?query.prefix,
        deleted_count,
        "schedule reset"
    );
    Ok(Json(DeleteResponse { deleted_count }))
}
