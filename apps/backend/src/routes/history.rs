//! History endpoints

use axum::{
    extract::{Query, State},
    Extension, Json,
};

use crate::error::{ApiError, Result};
use crate::models::*;
use crate::routes::auth::AuthenticatedIdentity;
use crate::AppState;

/// POST /api/history
///
/// Records whose id is already stored are skipped.
pub async fn append(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedIdentity>,
    Json(request): Json<AppendHistoryRequest>,
) -> Result<Json<AppendHistoryResponse>> {
    let inserted_count = state
        .db
        .insert_history(&auth.identity_id, &request.records)
        .await?;

    Ok(Json(AppendHistoryResponse { inserted_count }))
}

/// GET /api/history?item_key=&limit=
pub async fn list(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedIdentity>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<HistoryListResponse>> {
    if query.limit.is_some_and(|limit| limit < 0) {
        return Err(ApiError::BadRequest("limit must not be negative".to_string()));
    }

    let rows = state
        .db
        .list_history(&auth.identity_id, query.item_key.as_deref(), query.limit)
        .await?;

    let records = rows
        .iter()
        .map(|row| {
            row.to_record()
                .map_err(|e| ApiError::Internal(format!("stored history {}: {}", row.id, e)))
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(Json(HistoryListResponse { records }))
}

/// DELETE /api/history?prefix=
pub async fn clear(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedIdentity>,
    Query(query): Query<PrefixQuery>,
) -> Result<Json<DeleteResponse>> {
    let deleted_count = state
        .db
        .clear_history(&auth.identity_id, query.prefix.as_deref())
        .await?;

    Ok(Json(DeleteResponse { deleted_count }))
}
