use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::engine::LifecycleEngine;

#[derive(Clone)]
pub struct AppState {
    pub db: sqlx::PgPool,
    pub engine: LifecycleEngine,
}

/* -------------------------
   Enumerations
--------------------------*/

/// Appointment lifecycle status, stored as smallint:
/// 0 Pending, 1 Approved, 2 Completed, 3 Cancelled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "smallint")]
#[repr(i16)]
pub enum AppointmentStatus {
    Pending = 0,
    Approved = 1,
    Completed = 2,
    Cancelled = 3,
}

impl AppointmentStatus {
    /// Raw smallint encoding. Listing sorts order by this code; nothing else
    /// may compare statuses arithmetically.
    pub fn code(self) -> i16 {
        self as i16
    }
}

/// clinic_user.role: 0 patient, 1 admin, 2 doctor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "smallint")]
#[repr(i16)]
pub enum Role {
    Patient = 0,
    Admin = 1,
    Doctor = 2,
}

impl Role {
    pub fn is_staff(self) -> bool {
        matches!(self, Role::Admin | Role::Doctor)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Patient => "patient",
            Role::Admin => "admin",
            Role::Doctor => "doctor",
        }
    }
}

/* -------------------------
   DB Row Models
--------------------------*/

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct AppointmentRow {
    pub appointment_id: Uuid,
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    pub service_id: Uuid,
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub findings: Option<String>,
    pub prescription: Option<String>,
    pub status: AppointmentStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct DoctorRow {
    pub doctor_id: Uuid,
    /// Login account of the doctor, if one is linked. Notifications for the
    /// doctor are addressed to this user.
    pub user_id: Option<Uuid>,
    pub name: String,
    pub specialty: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct ServiceRow {
    pub service_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct UserRow {
    pub user_id: Uuid,
    pub name: String,
    pub email: Option<String>,
    pub role: Role,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct MedicalChartRow {
    pub chart_id: Uuid,
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
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct NotificationRow {
    pub notification_id: Uuid,
    pub user_id: Uuid,
    pub kind: i16,
    pub payload: serde_json::Value,
    pub read_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/* -------------------------
   Shared API shapes
--------------------------*/

#[derive(Debug, Serialize)]
pub struct ApiOk<T> {
    pub data: T,
}

#[derive(Debug, Serialize)]
pub struct OkResponse {
    pub data: OkData,
}

#[derive(Debug, Serialize)]
pub struct OkData {
    pub ok: bool,
}

/// One page of a staff queue listing.
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: i64,
    pub page_size: i64,
    pub total: i64,
}
