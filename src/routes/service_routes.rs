// src/routes/service_routes.rs

use axum::{Json, Router, extract::State, routing::get};

use crate::{
    error::ApiError,
    middleware::identity::Identity,
    models::{AppState, ServiceRow},
};

pub fn router() -> Router<AppState> {
    Router::new().route("/", get(list_services))
}

/// Active services for the booking form.
pub async fn list_services(
    State(state): State<AppState>,
    _identity: Identity,
) -> Result<Json<Vec<ServiceRow>>, ApiError> {
    let rows: Vec<ServiceRow> = sqlx::query_as::<_, ServiceRow>(
        r#"
        SELECT
          service_id,
          name,
          description,
          is_active
        FROM service
        WHERE is_active = true
        ORDER BY name ASC
        "#,
    )
    .fetch_all(&state.db)
    .await
    .map_err(|e| ApiError::Internal(format!("db error: {e}")))?;

    Ok(Json(rows))
}
