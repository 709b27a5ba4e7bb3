// src/routes/appointment_routes.rs

use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    engine::Transition,
    error::ApiError,
    middleware::identity::Identity,
    models::{ApiOk, AppState, AppointmentRow, AppointmentStatus, Page, Role},
    store::NewAppointment,
};

/*
Roles (clinic_user.role):
0 patient
1 admin
2 doctor
*/

fn ensure_staff(identity: &Identity) -> Result<(), ApiError> {
    if identity.role.is_staff() {
        Ok(())
    } else {
        Err(ApiError::Forbidden(
            "FORBIDDEN",
            "Only doctors and admins can manage appointments".into(),
        ))
    }
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/appointments", get(list_appointments).post(create_appointment))
        .route("/appointments/availability", get(get_availability))
        .route("/appointments/confirmed", get(list_confirmed))
        .route("/appointments/history", get(list_history))
        .route("/appointments/cancelled", get(list_cancelled))
        .route(
            "/appointments/{appointment_id}",
            get(get_appointment).delete(delete_appointment),
        )
        .route("/appointments/{appointment_id}/approve", post(approve_appointment))
        .route("/appointments/{appointment_id}/decline", post(decline_appointment))
        .route("/appointments/{appointment_id}/reschedule", post(reschedule_appointment))
        .route("/appointments/{appointment_id}/complete", post(complete_appointment))
        .route("/appointments/{appointment_id}/cancel", post(cancel_appointment))
}

/* ============================================================
   Response DTOs
   ============================================================ */

#[derive(Debug, Serialize)]
pub struct TransitionDto {
    pub appointment: AppointmentRow,
    pub notified: bool,
    pub message: String,
}

impl From<Transition> for TransitionDto {
    fn from(t: Transition) -> Self {
        TransitionDto {
            appointment: t.appointment,
            notified: t.notified,
            message: t.message.to_string(),
        }
    }
}

/// What a role sees on GET /appointments: patients get their own list,
/// staff get the pending request queue.
#[derive(Debug, Serialize)]
#[serde(tag = "view", rename_all = "snake_case")]
pub enum AppointmentListing {
    Patient { appointments: Vec<AppointmentRow> },
    Queue { appointments: Page<AppointmentRow> },
}

#[derive(Debug, Serialize)]
pub struct AvailabilityDto {
    pub existing: Vec<AppointmentRow>,
    pub available_times: Vec<NaiveTime>,
}

/* ============================================================
   Query params
   ============================================================ */

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    pub page: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct AvailabilityQuery {
    // YYYY-MM-DD
    pub date: String,
}

fn parse_date(raw: &str) -> Result<NaiveDate, ApiError> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|_| ApiError::BadRequest("VALIDATION_ERROR", "date must be YYYY-MM-DD".into()))
}

/* ============================================================
   GET /appointments (role dispatch)
   ============================================================ */

pub async fn list_appointments(
    State(state): State<AppState>,
    identity: Identity,
    Query(q): Query<PageQuery>,
) -> Result<Json<ApiOk<AppointmentListing>>, ApiError> {
    let listing = match identity.role {
        Role::Patient => list_for_patient(&state, &identity).await?,
        Role::Admin | Role::Doctor => list_request_queue(&state, q.page.unwrap_or(1)).await?,
    };

    Ok(Json(ApiOk { data: listing }))
}

async fn list_for_patient(
    state: &AppState,
    identity: &Identity,
) -> Result<AppointmentListing, ApiError> {
    let appointments = state.engine.patient_appointments(identity.user_id).await?;
    Ok(AppointmentListing::Patient { appointments })
}

async fn list_request_queue(state: &AppState, page: i64) -> Result<AppointmentListing, ApiError> {
    let appointments = state.engine.queue(AppointmentStatus::Pending, page).await?;
    Ok(AppointmentListing::Queue { appointments })
}

/* ============================================================
   Staff queues: confirmed / history / cancelled
   ============================================================ */

pub async fn list_confirmed(
    State(state): State<AppState>,
    identity: Identity,
    Query(q): Query<PageQuery>,
) -> Result<Json<ApiOk<Page<AppointmentRow>>>, ApiError> {
    ensure_staff(&identity)?;
    let page = state
        .engine
        .queue(AppointmentStatus::Approved, q.page.unwrap_or(1))
        .await?;
    Ok(Json(ApiOk { data: page }))
}

pub async fn list_history(
    State(state): State<AppState>,
    identity: Identity,
    Query(q): Query<PageQuery>,
) -> Result<Json<ApiOk<Page<AppointmentRow>>>, ApiError> {
    ensure_staff(&identity)?;
    let page = state
        .engine
        .queue(AppointmentStatus::Completed, q.page.unwrap_or(1))
        .await?;
    Ok(Json(ApiOk { data: page }))
}

pub async fn list_cancelled(
    State(state): State<AppState>,
    identity: Identity,
    Query(q): Query<PageQuery>,
) -> Result<Json<ApiOk<Page<AppointmentRow>>>, ApiError> {
    ensure_staff(&identity)?;
    let page = state
        .engine
        .queue(AppointmentStatus::Cancelled, q.page.unwrap_or(1))
        .await?;
    Ok(Json(ApiOk { data: page }))
}

/* ============================================================
   GET /appointments/availability
   ============================================================ */

pub async fn get_availability(
    State(state): State<AppState>,
    _identity: Identity,
    Query(q): Query<AvailabilityQuery>,
) -> Result<Json<ApiOk<AvailabilityDto>>, ApiError> {
    let date = parse_date(&q.date)?;
    let day = state.engine.availability(date).await?;

    Ok(Json(ApiOk {
        data: AvailabilityDto {
            existing: day.existing,
            available_times: day.available_times,
        },
    }))
}

/* ============================================================
   GET /appointments/{id}
   ============================================================ */

pub async fn get_appointment(
    State(state): State<AppState>,
    identity: Identity,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<ApiOk<AppointmentRow>>, ApiError> {
    let row = state
        .engine
        .find(appointment_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("NOT_FOUND", "appointment not found".into()))?;

    // Patients may only view their own appointments.
    if identity.role == Role::Patient && row.patient_id != identity.user_id {
        return Err(ApiError::Forbidden(
            "FORBIDDEN",
            "Patients can only view their own appointments".into(),
        ));
    }

    Ok(Json(ApiOk { data: row }))
}

/* ============================================================
   POST /appointments (create request)
   ============================================================ */

#[derive(Debug, Deserialize)]
pub struct CreateAppointmentRequest {
    /// Staff may book on a patient's behalf; patients book for themselves.
    pub patient_id: Option<Uuid>,
    pub doctor_id: Uuid,
    pub service_id: Uuid,
    pub date: NaiveDate,
    pub time: NaiveTime,
}

pub async fn create_appointment(
    State(state): State<AppState>,
    identity: Identity,
    Json(req): Json<CreateAppointmentRequest>,
) -> Result<Json<ApiOk<TransitionDto>>, ApiError> {
    let patient_id = match req.patient_id {
        Some(other) if other != identity.user_id => {
            ensure_staff(&identity)?;
            other
        }
        _ => identity.user_id,
    };

    let transition = state
        .engine
        .request(NewAppointment {
            patient_id,
            doctor_id: req.doctor_id,
            service_id: req.service_id,
            date: req.date,
            time: req.time,
        })
        .await?;

    Ok(Json(ApiOk {
        data: transition.into(),
    }))
}

/* ============================================================
   Status transitions
   ============================================================ */

pub async fn approve_appointment(
    State(state): State<AppState>,
    identity: Identity,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<ApiOk<TransitionDto>>, ApiError> {
    ensure_staff(&identity)?;
    let transition = state.engine.approve(appointment_id).await?;
    Ok(Json(ApiOk {
        data: transition.into(),
    }))
}

pub async fn decline_appointment(
    State(state): State<AppState>,
    identity: Identity,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<ApiOk<TransitionDto>>, ApiError> {
    ensure_staff(&identity)?;
    let transition = state.engine.decline(appointment_id).await?;
    Ok(Json(ApiOk {
        data: transition.into(),
    }))
}

#[derive(Debug, Deserialize)]
pub struct RescheduleRequest {
    pub date: NaiveDate,
    pub time: NaiveTime,
}

pub async fn reschedule_appointment(
    State(state): State<AppState>,
    identity: Identity,
    Path(appointment_id): Path<Uuid>,
    Json(req): Json<RescheduleRequest>,
) -> Result<Json<ApiOk<TransitionDto>>, ApiError> {
    // Patients may move their own appointment; staff may move any.
    if identity.role == Role::Patient {
        let row = state
            .engine
            .find(appointment_id)
            .await?
            .ok_or_else(|| ApiError::NotFound("NOT_FOUND", "appointment not found".into()))?;
        if row.patient_id != identity.user_id {
            return Err(ApiError::Forbidden(
                "FORBIDDEN",
                "Patients can only reschedule their own appointments".into(),
            ));
        }
    }

    let transition = state
        .engine
        .reschedule(appointment_id, req.date, req.time)
        .await?;
    Ok(Json(ApiOk {
        data: transition.into(),
    }))
}

#[derive(Debug, Deserialize)]
pub struct CompleteRequest {
    pub findings: String,
    pub prescription: String,
}

pub async fn complete_appointment(
    State(state): State<AppState>,
    identity: Identity,
    Path(appointment_id): Path<Uuid>,
    Json(req): Json<CompleteRequest>,
) -> Result<Json<ApiOk<TransitionDto>>, ApiError> {
    ensure_staff(&identity)?;
    let transition = state
        .engine
        .complete(appointment_id, &req.findings, &req.prescription)
        .await?;
    Ok(Json(ApiOk {
        data: transition.into(),
    }))
}

pub async fn cancel_appointment(
    State(state): State<AppState>,
    identity: Identity,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<ApiOk<TransitionDto>>, ApiError> {
    // Patients may cancel their own appointment; staff may cancel any.
    if identity.role == Role::Patient {
        let row = state
            .engine
            .find(appointment_id)
            .await?
            .ok_or_else(|| ApiError::NotFound("NOT_FOUND", "appointment not found".into()))?;
        if row.patient_id != identity.user_id {
            return Err(ApiError::Forbidden(
                "FORBIDDEN",
                "Patients can only cancel their own appointments".into(),
            ));
        }
    }

    let transition = state.engine.cancel(appointment_id).await?;
    Ok(Json(ApiOk {
        data: transition.into(),
    }))
}

/* ============================================================
   DELETE /appointments/{id}
   ============================================================ */

pub async fn delete_appointment(
    State(state): State<AppState>,
    identity: Identity,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<ApiOk<String>>, ApiError> {
    // Ownership/role enforcement happens in the engine: owning patient or
    // admin only.
    state
        .engine
        .delete(appointment_id, identity.user_id, identity.role)
        .await?;

    Ok(Json(ApiOk {
        data: "Appointment has been deleted.".to_string(),
    }))
}
