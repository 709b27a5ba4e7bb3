// src/routes/chart_routes.rs
//
// Medical chart records: the patient-history subsystem. Staff write charts
// during or after a consultation; patients can read their own.

use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    error::ApiError,
    middleware::identity::Identity,
    models::{ApiOk, AppState, MedicalChartRow, Role},
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/charts", post(create_chart))
        .route("/charts/{chart_id}", get(get_chart))
        .route("/patients/{user_id}/charts", get(list_charts_for_patient))
}

fn ensure_staff(identity: &Identity) -> Result<(), ApiError> {
    if identity.role.is_staff() {
        Ok(())
    } else {
        Err(ApiError::Forbidden(
            "FORBIDDEN",
            "Only doctors and admins can write medical charts".into(),
        ))
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateChartRequest {
    pub user_id: Uuid,
    pub name: String,
    pub age: i16,
    pub gender: String,
    pub height: String,
    pub weight: String,
    pub bp: String,
    pub allergies: Option<String>,
    pub illness: String,
    pub diagnosis: String,
    pub physical_exam: Option<String>,
    pub plan: Option<String>,
    pub medical_history: Option<String>,
    pub family_history: Option<String>,
    pub social_history: Option<String>,
}

pub async fn create_chart(
    State(state): State<AppState>,
    identity: Identity,
    Json(req): Json<CreateChartRequest>,
) -> Result<Json<ApiOk<MedicalChartRow>>, ApiError> {
    ensure_staff(&identity)?;

    // "required" is the only validation contract for chart fields
    for (field, value) in [
        ("name", req.name.trim()),
        ("gender", req.gender.trim()),
        ("height", req.height.trim()),
        ("weight", req.weight.trim()),
        ("bp", req.bp.trim()),
        ("illness", req.illness.trim()),
        ("diagnosis", req.diagnosis.trim()),
    ] {
        if value.is_empty() {
            return Err(ApiError::BadRequest(
                "VALIDATION_ERROR",
                format!("{field} is required"),
            ));
        }
    }
    if req.age < 0 {
        return Err(ApiError::BadRequest(
            "VALIDATION_ERROR",
            "age must not be negative".into(),
        ));
    }

    let row: MedicalChartRow = sqlx::query_as::<_, MedicalChartRow>(
        r#"
        INSERT INTO medical_chart (
          user_id,
          name,
          age,
          gender,
          height,
          weight,
          bp,
          allergies,
          illness,
          diagnosis,
          physical_exam,
          plan,
          medical_history,
          family_history,
          social_history,
          created_at,
          updated_at
        )
        VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,$15, now(), now())
        RETURNING
          chart_id, user_id, name, age, gender, height, weight, bp,
          allergies, illness, diagnosis, physical_exam, plan,
          medical_history, family_history, social_history,
          created_at, updated_at
        "#,
    )
    .bind(req.user_id)
    .bind(req.name.trim())
    .bind(req.age)
    .bind(req.gender.trim())
    .bind(req.height.trim())
    .bind(req.weight.trim())
    .bind(req.bp.trim())
    .bind(req.allergies.as_deref())
    .bind(req.illness.trim())
    .bind(req.diagnosis.trim())
    .bind(req.physical_exam.as_deref())
    .bind(req.plan.as_deref())
    .bind(req.medical_history.as_deref())
    .bind(req.family_history.as_deref())
    .bind(req.social_history.as_deref())
    .fetch_one(&state.db)
    .await
    .map_err(|e| ApiError::BadRequest("CHART_CREATE_FAILED", format!("{e}")))?;

    Ok(Json(ApiOk { data: row }))
}

pub async fn get_chart(
    State(state): State<AppState>,
    identity: Identity,
    Path(chart_id): Path<Uuid>,
) -> Result<Json<ApiOk<MedicalChartRow>>, ApiError> {
    let row = sqlx::query_as::<_, MedicalChartRow>(
        r#"
        SELECT
          chart_id, user_id, name, age, gender, height, weight, bp,
          allergies, illness, diagnosis, physical_exam, plan,
          medical_history, family_history, social_history,
          created_at, updated_at
        FROM medical_chart
        WHERE chart_id = $1
        "#,
    )
    .bind(chart_id)
    .fetch_optional(&state.db)
    .await
    .map_err(|e| ApiError::Internal(format!("db error: {e}")))?;

    let row = row.ok_or_else(|| ApiError::NotFound("NOT_FOUND", "chart not found".into()))?;

    if identity.role == Role::Patient && row.user_id != identity.user_id {
        return Err(ApiError::Forbidden(
            "FORBIDDEN",
            "Patients can only view their own charts".into(),
        ));
    }

    Ok(Json(ApiOk { data: row }))
}

pub async fn list_charts_for_patient(
    State(state): State<AppState>,
    identity: Identity,
    Path(user_id): Path<Uuid>,
) -> Result<Json<ApiOk<Vec<MedicalChartRow>>>, ApiError> {
    if identity.role == Role::Patient && user_id != identity.user_id {
        return Err(ApiError::Forbidden(
            "FORBIDDEN",
            "Patients can only view their own charts".into(),
        ));
    }

    let rows = sqlx::query_as::<_, MedicalChartRow>(
        r#"
        SELECT
          chart_id, user_id, name, age, gender, height, weight, bp,
          allergies, illness, diagnosis, physical_exam, plan,
          medical_history, family_history, social_history,
          created_at, updated_at
        FROM medical_chart
        WHERE user_id = $1
        ORDER BY created_at DESC
        "#,
    )
    .bind(user_id)
    .fetch_all(&state.db)
    .await
    .map_err(|e| ApiError::Internal(format!("db error: {e}")))?;

    Ok(Json(ApiOk { data: rows }))
}
