// src/store.rs
//
// Persistence seam for the appointment lifecycle engine. The engine only
// talks to these traits; the Postgres implementations below are the
// production wiring.

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveTime};
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::error::EngineError;
use crate::models::{AppointmentRow, AppointmentStatus, DoctorRow, Page, ServiceRow, UserRow};

/// Fields for a new appointment record. Status is always Pending on insert;
/// findings/prescription start empty.
#[derive(Debug, Clone)]
pub struct NewAppointment {
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    pub service_id: Uuid,
    pub date: NaiveDate,
    pub time: NaiveTime,
}

/// Partial update applied atomically to one appointment. All status-changing
/// operations go through this single contract; the store touches updated_at
/// on every call.
#[derive(Debug, Clone, Default)]
pub struct AppointmentPatch {
    pub date: Option<NaiveDate>,
    pub time: Option<NaiveTime>,
    pub status: Option<AppointmentStatus>,
    pub findings: Option<String>,
    pub prescription: Option<String>,
}

#[async_trait]
pub trait AppointmentStore: Send + Sync {
    async fn create(&self, fields: NewAppointment) -> Result<AppointmentRow, EngineError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<AppointmentRow>, EngineError>;

    /// At most one record per slot is relevant to the conflict policy; ties
    /// are broken by earliest creation.
    async fn find_by_slot(
        &self,
        date: NaiveDate,
        time: NaiveTime,
    ) -> Result<Option<AppointmentRow>, EngineError>;

    /// Staff queue pages, newest first.
    async fn list_by_status(
        &self,
        status: AppointmentStatus,
        page: i64,
        page_size: i64,
    ) -> Result<Page<AppointmentRow>, EngineError>;

    /// Patient view, ordered by status code descending.
    async fn list_by_patient(&self, patient_id: Uuid)
        -> Result<Vec<AppointmentRow>, EngineError>;

    /// All appointments on a calendar day, ordered by time of day.
    async fn list_by_date(&self, date: NaiveDate) -> Result<Vec<AppointmentRow>, EngineError>;

    async fn update_fields(&self, id: Uuid, patch: AppointmentPatch) -> Result<(), EngineError>;

    async fn delete(&self, id: Uuid) -> Result<(), EngineError>;
}

/// Read-only lookups for the reference entities an appointment points at.
#[async_trait]
pub trait Directory: Send + Sync {
    async fn doctor(&self, doctor_id: Uuid) -> Result<Option<DoctorRow>, EngineError>;
    async fn user(&self, user_id: Uuid) -> Result<Option<UserRow>, EngineError>;
    async fn service(&self, service_id: Uuid) -> Result<Option<ServiceRow>, EngineError>;
}

/* ============================================================
   Postgres implementations
   ============================================================ */

#[derive(Clone)]
pub struct PgAppointmentStore {
    pool: PgPool,
}

impl PgAppointmentStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const APPOINTMENT_COLUMNS: &str = r#"
  appointment_id,
  patient_id,
  doctor_id,
  service_id,
  date,
  time,
  findings,
  prescription,
  status,
  created_at,
  updated_at
"#;

#[async_trait]
impl AppointmentStore for PgAppointmentStore {
    async fn create(&self, fields: NewAppointment) -> Result<AppointmentRow, EngineError> {
        let row: AppointmentRow = sqlx::query_as::<_, AppointmentRow>(&format!(
            r#"
            INSERT INTO appointment (patient_id, doctor_id, service_id, date, time, status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, 0, now(), now())
            RETURNING {APPOINTMENT_COLUMNS}
            "#,
        ))
        .bind(fields.patient_id)
        .bind(fields.doctor_id)
        .bind(fields.service_id)
        .bind(fields.date)
        .bind(fields.time)
        .fetch_one(&self.pool)
        .await?;

        Ok(row)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<AppointmentRow>, EngineError> {
        let row = sqlx::query_as::<_, AppointmentRow>(&format!(
            r#"
            SELECT {APPOINTMENT_COLUMNS}
            FROM appointment
            WHERE appointment_id = $1
            "#,
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    async fn find_by_slot(
        &self,
        date: NaiveDate,
        time: NaiveTime,
    ) -> Result<Option<AppointmentRow>, EngineError> {
        let row = sqlx::query_as::<_, AppointmentRow>(&format!(
            r#"
            SELECT {APPOINTMENT_COLUMNS}
            FROM appointment
            WHERE date = $1 AND time = $2
            ORDER BY created_at ASC
            LIMIT 1
            "#,
        ))
        .bind(date)
        .bind(time)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    async fn list_by_status(
        &self,
        status: AppointmentStatus,
        page: i64,
        page_size: i64,
    ) -> Result<Page<AppointmentRow>, EngineError> {
        let total: i64 = sqlx::query(
            r#"
            SELECT COUNT(*) AS n
            FROM appointment
            WHERE status = $1
            "#,
        )
        .bind(status.code())
        .fetch_one(&self.pool)
        .await?
        .try_get("n")
        .map_err(|e| EngineError::Store(format!("row decode error: {e}")))?;

        let items = sqlx::query_as::<_, AppointmentRow>(&format!(
            r#"
            SELECT {APPOINTMENT_COLUMNS}
            FROM appointment
            WHERE status = $1
            ORDER BY created_at DESC
            LIMIT $2 OFFSET $3
            "#,
        ))
        .bind(status.code())
        .bind(page_size)
        .bind((page - 1).max(0) * page_size)
        .fetch_all(&self.pool)
        .await?;

        Ok(Page {
            items,
            page,
            page_size,
            total,
        })
    }

    async fn list_by_patient(
        &self,
        patient_id: Uuid,
    ) -> Result<Vec<AppointmentRow>, EngineError> {
        let rows = sqlx::query_as::<_, AppointmentRow>(&format!(
            r#"
            SELECT {APPOINTMENT_COLUMNS}
            FROM appointment
            WHERE patient_id = $1
            ORDER BY status DESC, updated_at DESC
            "#,
        ))
        .bind(patient_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    async fn list_by_date(&self, date: NaiveDate) -> Result<Vec<AppointmentRow>, EngineError> {
        let rows = sqlx::query_as::<_, AppointmentRow>(&format!(
            r#"
            SELECT {APPOINTMENT_COLUMNS}
            FROM appointment
            WHERE date = $1
            ORDER BY time ASC
            "#,
        ))
        .bind(date)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    async fn update_fields(&self, id: Uuid, patch: AppointmentPatch) -> Result<(), EngineError> {
        let result = sqlx::query(
            r#"
            UPDATE appointment
            SET
              date         = COALESCE($2, date),
              time         = COALESCE($3, time),
              status       = COALESCE($4, status),
              findings     = COALESCE($5, findings),
              prescription = COALESCE($6, prescription),
              updated_at   = now()
            WHERE appointment_id = $1
            "#,
        )
        .bind(id)
        .bind(patch.date)
        .bind(patch.time)
        .bind(patch.status.map(AppointmentStatus::code))
        .bind(patch.findings)
        .bind(patch.prescription)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(EngineError::NotFound("appointment"));
        }
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<(), EngineError> {
        let result = sqlx::query(r#"DELETE FROM appointment WHERE appointment_id = $1"#)
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(EngineError::NotFound("appointment"));
        }
        Ok(())
    }
}

#[derive(Clone)]
pub struct PgDirectory {
    pool: PgPool,
}

impl PgDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Directory for PgDirectory {
    async fn doctor(&self, doctor_id: Uuid) -> Result<Option<DoctorRow>, EngineError> {
        let row = sqlx::query_as::<_, DoctorRow>(
            r#"
            SELECT doctor_id, user_id, name, specialty, email
            FROM doctor
            WHERE doctor_id = $1
            "#,
        )
        .bind(doctor_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    async fn user(&self, user_id: Uuid) -> Result<Option<UserRow>, EngineError> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            SELECT user_id, name, email, role
            FROM clinic_user
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    async fn service(&self, service_id: Uuid) -> Result<Option<ServiceRow>, EngineError> {
        let row = sqlx::query_as::<_, ServiceRow>(
            r#"
            SELECT service_id, name, description, is_active
            FROM service
            WHERE service_id = $1
            "#,
        )
        .bind(service_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }
}
