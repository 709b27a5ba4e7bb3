// src/routes/doctor_routes.rs

use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use uuid::Uuid;

use crate::{
    error::ApiError,
    middleware::identity::Identity,
    models::{AppState, DoctorRow},
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/doctors", get(list_doctors))
        .route("/doctors/{doctor_id}", get(get_doctor))
}

/// All doctors, for the booking form's dropdown.
pub async fn list_doctors(
    State(state): State<AppState>,
    _identity: Identity,
) -> Result<Json<Vec<DoctorRow>>, ApiError> {
    let rows: Vec<DoctorRow> = sqlx::query_as::<_, DoctorRow>(
        r#"
        SELECT
          doctor_id,
          user_id,
          name,
          specialty,
          email
        FROM doctor
        ORDER BY name ASC
        "#,
    )
    .fetch_all(&state.db)
    .await
    .map_err(|e| ApiError::Internal(format!("db error: {e}")))?;

    Ok(Json(rows))
}

pub async fn get_doctor(
    State(state): State<AppState>,
    _identity: Identity,
    Path(doctor_id): Path<Uuid>,
) -> Result<Json<DoctorRow>, ApiError> {
    let row = sqlx::query_as::<_, DoctorRow>(
        r#"
        SELECT
          doctor_id,
          user_id,
          name,
          specialty,
          email
        FROM doctor
        WHERE doctor_id = $1
        "#,
    )
    .bind(doctor_id)
    .fetch_optional(&state.db)
    .await
    .map_err(|e| ApiError::Internal(format!("db error: {e}")))?;

    row.map(Json)
        .ok_or_else(|| ApiError::NotFound("NOT_FOUND", "doctor not found".into()))
}
