// src/routes/notification_routes.rs
//
// Read side of the notification dispatcher: recipients list their unread
// notifications and mark them read. Writing happens in notify::DbNotifier.

use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use uuid::Uuid;

use crate::{
    error::ApiError,
    middleware::identity::Identity,
    models::{ApiOk, AppState, NotificationRow, OkData, OkResponse},
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/notifications", get(list_unread))
        .route("/notifications/{notification_id}/read", post(mark_read))
}

pub async fn list_unread(
    State(state): State<AppState>,
    identity: Identity,
) -> Result<Json<ApiOk<Vec<NotificationRow>>>, ApiError> {
    let rows = sqlx::query_as::<_, NotificationRow>(
        r#"
        SELECT
          notification_id,
          user_id,
          kind,
          payload,
          read_at,
          created_at
        FROM notification
        WHERE user_id = $1
          AND read_at IS NULL
        ORDER BY created_at DESC
        "#,
    )
    .bind(identity.user_id)
    .fetch_all(&state.db)
    .await
    .map_err(|e| ApiError::Internal(format!("db error: {e}")))?;

    Ok(Json(ApiOk { data: rows }))
}

pub async fn mark_read(
    State(state): State<AppState>,
    identity: Identity,
    Path(notification_id): Path<Uuid>,
) -> Result<Json<OkResponse>, ApiError> {
    let result = sqlx::query(
        r#"
        UPDATE notification
        SET read_at = now()
        WHERE notification_id = $1
          AND user_id = $2
          AND read_at IS NULL
        "#,
    )
    .bind(notification_id)
    .bind(identity.user_id)
    .execute(&state.db)
    .await
    .map_err(|e| ApiError::Internal(format!("db error: {e}")))?;

    if result.rows_affected() == 0 {
        return Err(ApiError::NotFound(
            "NOT_FOUND",
            "notification not found".into(),
        ));
    }

    Ok(Json(OkResponse {
        data: OkData { ok: true },
    }))
}
