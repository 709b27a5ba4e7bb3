// src/engine.rs
//
// Appointment lifecycle engine. Owns the status state machine, the slot
// conflict policy and the notification trigger points. Web handlers call
// into this; persistence and delivery live behind the store/notifier seams.

use std::sync::Arc;

use chrono::{NaiveDate, NaiveTime};
use tracing::warn;
use uuid::Uuid;

use crate::error::EngineError;
use crate::models::{AppointmentRow, AppointmentStatus, Page, Role};
use crate::notify::{NotificationKind, NotificationPayload, Notifier};
use crate::store::{AppointmentPatch, AppointmentStore, Directory, NewAppointment};

/// Fixed page size for staff queue views.
pub const QUEUE_PAGE_SIZE: i64 = 6;

const MSG_CREATED: &str = "Appointment has been created!";
const MSG_APPROVED: &str = "Appointment has been approved.";
const MSG_DECLINED: &str = "Appointment has been declined.";
const MSG_RESCHEDULED: &str = "Appointment has been rescheduled.";
const MSG_CANCELLED: &str = "Appointment has been cancelled.";
const MSG_COMPLETED: &str = "Appointment has been completed.";
const MSG_NO_DOCTOR: &str = "No doctor associated with this appointment.";
const MSG_NO_PATIENT: &str = "No patient associated with this appointment.";

/// Result of a slot lookup: whether a confirmed appointment already holds
/// the slot, and which record it is. Read-only, no state change.
#[derive(Debug)]
pub struct SlotCheck {
    pub taken: bool,
    pub conflicting: Option<AppointmentRow>,
}

/// Outcome of a lifecycle operation. `notified` reports whether the
/// counterpart was actually reached; the state change itself has already
/// been persisted either way.
#[derive(Debug)]
pub struct Transition {
    pub appointment: AppointmentRow,
    pub notified: bool,
    pub message: &'static str,
}

/// Booked slots and remaining free times for one calendar day.
#[derive(Debug)]
pub struct DayAvailability {
    pub existing: Vec<AppointmentRow>,
    pub available_times: Vec<NaiveTime>,
}

#[derive(Clone)]
pub struct LifecycleEngine {
    store: Arc<dyn AppointmentStore>,
    directory: Arc<dyn Directory>,
    notifier: Arc<dyn Notifier>,
}

impl LifecycleEngine {
    pub fn new(
        store: Arc<dyn AppointmentStore>,
        directory: Arc<dyn Directory>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            store,
            directory,
            notifier,
        }
    }

    /* ============================================================
       Conflict detection
       ============================================================ */

    /// One lookup by (date, time). Only an Approved occupant blocks the
    /// slot; Pending/Completed/Cancelled occupants do not. Deliberately
    /// permissive: the clinic only defends slots it has confirmed.
    pub async fn check_slot(
        &self,
        date: NaiveDate,
        time: NaiveTime,
    ) -> Result<SlotCheck, EngineError> {
        let existing = self.store.find_by_slot(date, time).await?;

        match existing {
            Some(row) if row.status == AppointmentStatus::Approved => Ok(SlotCheck {
                taken: true,
                conflicting: Some(row),
            }),
            _ => Ok(SlotCheck {
                taken: false,
                conflicting: None,
            }),
        }
    }

    /* ============================================================
       Lifecycle operations
       ============================================================ */

    /// Patient-submitted request. Creates the record as Pending and notifies
    /// the assigned doctor.
    pub async fn request(&self, fields: NewAppointment) -> Result<Transition, EngineError> {
        if self.directory.user(fields.patient_id).await?.is_none() {
            return Err(EngineError::NotFound("patient"));
        }
        if self.directory.doctor(fields.doctor_id).await?.is_none() {
            return Err(EngineError::NotFound("doctor"));
        }
        if self.directory.service(fields.service_id).await?.is_none() {
            return Err(EngineError::NotFound("service"));
        }

        let check = self.check_slot(fields.date, fields.time).await?;
        if check.taken {
            return Err(EngineError::SlotConflict);
        }

        let appointment = self.store.create(fields).await?;

        let (notified, soft) = self
            .notify_doctor(&appointment, NotificationKind::RequestCreated)
            .await;

        Ok(Transition {
            appointment,
            notified,
            message: soft.unwrap_or(MSG_CREATED),
        })
    }

    /// Pending -> Approved; notifies the patient.
    pub async fn approve(&self, id: Uuid) -> Result<Transition, EngineError> {
        let appointment = self
            .transition(id, AppointmentPatch {
                status: Some(AppointmentStatus::Approved),
                ..Default::default()
            })
            .await?;

        let (notified, soft) = self
            .notify_patient(&appointment, NotificationKind::Approved)
            .await;

        Ok(Transition {
            appointment,
            notified,
            message: soft.unwrap_or(MSG_APPROVED),
        })
    }

    /// Pending -> Cancelled; notifies the patient.
    pub async fn decline(&self, id: Uuid) -> Result<Transition, EngineError> {
        let appointment = self
            .transition(id, AppointmentPatch {
                status: Some(AppointmentStatus::Cancelled),
                ..Default::default()
            })
            .await?;

        let (notified, soft) = self
            .notify_patient(&appointment, NotificationKind::Declined)
            .await;

        Ok(Transition {
            appointment,
            notified,
            message: soft.unwrap_or(MSG_DECLINED),
        })
    }

    /// Moves the appointment to a new slot and resets status to Pending
    /// regardless of the prior state. The doctor is notified.
    pub async fn reschedule(
        &self,
        id: Uuid,
        date: NaiveDate,
        time: NaiveTime,
    ) -> Result<Transition, EngineError> {
        let check = self.check_slot(date, time).await?;
        if check.taken {
            // Moving an approved appointment onto its own slot is not a
            // conflict with itself.
            let self_conflict = check
                .conflicting
                .as_ref()
                .is_some_and(|c| c.appointment_id == id);
            if !self_conflict {
                return Err(EngineError::SlotConflict);
            }
        }

        let appointment = self
            .transition(id, AppointmentPatch {
                date: Some(date),
                time: Some(time),
                status: Some(AppointmentStatus::Pending),
                ..Default::default()
            })
            .await?;

        let (notified, soft) = self
            .notify_doctor(&appointment, NotificationKind::Rescheduled)
            .await;

        Ok(Transition {
            appointment,
            notified,
            message: soft.unwrap_or(MSG_RESCHEDULED),
        })
    }

    /// Approved -> Completed. Findings and prescription are both required;
    /// no notification is sent.
    pub async fn complete(
        &self,
        id: Uuid,
        findings: &str,
        prescription: &str,
    ) -> Result<Transition, EngineError> {
        let findings = findings.trim();
        let prescription = prescription.trim();
        if findings.is_empty() {
            return Err(EngineError::MissingField("findings"));
        }
        if prescription.is_empty() {
            return Err(EngineError::MissingField("prescription"));
        }

        let appointment = self
            .transition(id, AppointmentPatch {
                status: Some(AppointmentStatus::Completed),
                findings: Some(findings.to_string()),
                prescription: Some(prescription.to_string()),
                ..Default::default()
            })
            .await?;

        Ok(Transition {
            appointment,
            notified: false,
            message: MSG_COMPLETED,
        })
    }

    /// Any state -> Cancelled. The doctor is notified, not the patient;
    /// long-standing behavior, kept as-is pending product confirmation.
    pub async fn cancel(&self, id: Uuid) -> Result<Transition, EngineError> {
        let appointment = self
            .transition(id, AppointmentPatch {
                status: Some(AppointmentStatus::Cancelled),
                ..Default::default()
            })
            .await?;

        let (notified, soft) = self
            .notify_doctor(&appointment, NotificationKind::Cancelled)
            .await;

        Ok(Transition {
            appointment,
            notified,
            message: soft.unwrap_or(MSG_CANCELLED),
        })
    }

    /// Hard delete. Only the owning patient or an admin may remove a record;
    /// no notification is sent.
    pub async fn delete(
        &self,
        id: Uuid,
        caller_id: Uuid,
        caller_role: Role,
    ) -> Result<(), EngineError> {
        let appointment = self
            .store
            .find_by_id(id)
            .await?
            .ok_or(EngineError::NotFound("appointment"))?;

        if caller_role != Role::Admin && appointment.patient_id != caller_id {
            return Err(EngineError::Forbidden(
                "Only the owning patient or an admin can delete an appointment",
            ));
        }

        self.store.delete(id).await
    }

    /* ============================================================
       Listings
       ============================================================ */

    /// Lookup by id, no side effects.
    pub async fn find(&self, id: Uuid) -> Result<Option<AppointmentRow>, EngineError> {
        self.store.find_by_id(id).await
    }

    /// Patient view: own appointments, ordered by status code descending.
    pub async fn patient_appointments(
        &self,
        patient_id: Uuid,
    ) -> Result<Vec<AppointmentRow>, EngineError> {
        self.store.list_by_patient(patient_id).await
    }

    /// Staff queue view: one status, newest first, fixed page size.
    pub async fn queue(
        &self,
        status: AppointmentStatus,
        page: i64,
    ) -> Result<Page<AppointmentRow>, EngineError> {
        self.store
            .list_by_status(status, page.max(1), QUEUE_PAGE_SIZE)
            .await
    }

    /// Booked appointments for a day plus the clinic's remaining free times.
    /// Consistent with the conflict policy: only Approved occupants remove
    /// a time from the grid.
    pub async fn availability(&self, date: NaiveDate) -> Result<DayAvailability, EngineError> {
        let existing = self.store.list_by_date(date).await?;

        let available_times = slot_grid()
            .into_iter()
            .filter(|t| {
                !existing
                    .iter()
                    .any(|a| a.time == *t && a.status == AppointmentStatus::Approved)
            })
            .collect();

        Ok(DayAvailability {
            existing,
            available_times,
        })
    }

    /* ============================================================
       Internals
       ============================================================ */

    /// Single atomic status/field update keyed by appointment id, then a
    /// re-read for the fresh row. Never spans two appointments.
    async fn transition(
        &self,
        id: Uuid,
        patch: AppointmentPatch,
    ) -> Result<AppointmentRow, EngineError> {
        if self.store.find_by_id(id).await?.is_none() {
            return Err(EngineError::NotFound("appointment"));
        }

        self.store.update_fields(id, patch).await?;

        self.store
            .find_by_id(id)
            .await?
            .ok_or(EngineError::NotFound("appointment"))
    }

    /// Best-effort dispatch to the assigned doctor's linked user. A missing
    /// doctor or unlinked account skips delivery with a soft message; a
    /// dispatcher failure is logged and swallowed.
    async fn notify_doctor(
        &self,
        appointment: &AppointmentRow,
        kind: NotificationKind,
    ) -> (bool, Option<&'static str>) {
        let doctor = match self.directory.doctor(appointment.doctor_id).await {
            Ok(d) => d,
            Err(e) => {
                warn!("doctor lookup failed during notification: {e}");
                return (false, None);
            }
        };
        let Some(doctor) = doctor else {
            return (false, Some(MSG_NO_DOCTOR));
        };
        let Some(recipient) = doctor.user_id else {
            return (false, Some(MSG_NO_DOCTOR));
        };

        let payload = self.payload_for(appointment).await;
        match self.notifier.send(recipient, kind, payload).await {
            Ok(()) => (true, None),
            Err(e) => {
                warn!("{e}");
                (false, None)
            }
        }
    }

    /// Best-effort dispatch to the owning patient.
    async fn notify_patient(
        &self,
        appointment: &AppointmentRow,
        kind: NotificationKind,
    ) -> (bool, Option<&'static str>) {
        let patient = match self.directory.user(appointment.patient_id).await {
            Ok(u) => u,
            Err(e) => {
                warn!("patient lookup failed during notification: {e}");
                return (false, None);
            }
        };
        let Some(patient) = patient else {
            return (false, Some(MSG_NO_PATIENT));
        };

        let payload = self.payload_for(appointment).await;
        match self.notifier.send(patient.user_id, kind, payload).await {
            Ok(()) => (true, None),
            Err(e) => {
                warn!("{e}");
                (false, None)
            }
        }
    }

    async fn payload_for(&self, appointment: &AppointmentRow) -> NotificationPayload {
        let doctor = self
            .directory
            .doctor(appointment.doctor_id)
            .await
            .ok()
            .flatten()
            .map(|d| d.name);
        let patient = self
            .directory
            .user(appointment.patient_id)
            .await
            .ok()
            .flatten()
            .map(|u| u.name);
        let service = self
            .directory
            .service(appointment.service_id)
            .await
            .ok()
            .flatten()
            .map(|s| s.name);

        NotificationPayload {
            appointment_id: appointment.appointment_id,
            doctor,
            patient,
            service,
            date: appointment.date,
            time: appointment.time,
        }
    }
}

/// Bookable times for one clinic day: hourly, 09:00 through 16:00.
fn slot_grid() -> Vec<NaiveTime> {
    (9..17)
        .map(|h| NaiveTime::from_hms_opt(h, 0, 0).unwrap())
        .collect()
}

/* ============================================================
   Tests
   ============================================================ */

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DoctorRow, ServiceRow, UserRow};
    use crate::notify::NotifyError;
    use async_trait::async_trait;
    use chrono::{Duration, Utc};
    use std::collections::HashMap;
    use std::sync::Mutex;

    /* ---------- in-memory store ---------- */

    #[derive(Default)]
    struct MemStore {
        rows: Mutex<Vec<AppointmentRow>>,
        seq: Mutex<i64>,
    }

    impl MemStore {
        fn get(&self, id: Uuid) -> Option<AppointmentRow> {
            self.rows
                .lock()
                .unwrap()
                .iter()
                .find(|r| r.appointment_id == id)
                .cloned()
        }

        fn count(&self) -> usize {
            self.rows.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl AppointmentStore for MemStore {
        async fn create(&self, fields: NewAppointment) -> Result<AppointmentRow, EngineError> {
            let mut seq = self.seq.lock().unwrap();
            *seq += 1;
            // strictly increasing created_at so "newest first" is stable
            let created_at = Utc::now() + Duration::seconds(*seq);

            let row = AppointmentRow {
                appointment_id: Uuid::new_v4(),
                patient_id: fields.patient_id,
                doctor_id: fields.doctor_id,
                service_id: fields.service_id,
                date: fields.date,
                time: fields.time,
                findings: None,
                prescription: None,
                status: AppointmentStatus::Pending,
                created_at,
                updated_at: created_at,
            };
            self.rows.lock().unwrap().push(row.clone());
            Ok(row)
        }

        async fn find_by_id(&self, id: Uuid) -> Result<Option<AppointmentRow>, EngineError> {
            Ok(self.get(id))
        }

        async fn find_by_slot(
            &self,
            date: NaiveDate,
            time: NaiveTime,
        ) -> Result<Option<AppointmentRow>, EngineError> {
            Ok(self
                .rows
                .lock()
                .unwrap()
                .iter()
                .filter(|r| r.date == date && r.time == time)
                .min_by_key(|r| r.created_at)
                .cloned())
        }

        async fn list_by_status(
            &self,
            status: AppointmentStatus,
            page: i64,
            page_size: i64,
        ) -> Result<Page<AppointmentRow>, EngineError> {
            let mut matching: Vec<AppointmentRow> = self
                .rows
                .lock()
                .unwrap()
                .iter()
                .filter(|r| r.status == status)
                .cloned()
                .collect();
            matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));

            let total = matching.len() as i64;
            let items = matching
                .into_iter()
                .skip(((page - 1).max(0) * page_size) as usize)
                .take(page_size as usize)
                .collect();

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
            let mut matching: Vec<AppointmentRow> = self
                .rows
                .lock()
                .unwrap()
                .iter()
                .filter(|r| r.patient_id == patient_id)
                .cloned()
                .collect();
            matching.sort_by(|a, b| b.status.code().cmp(&a.status.code()));
            Ok(matching)
        }

        async fn list_by_date(&self, date: NaiveDate) -> Result<Vec<AppointmentRow>, EngineError> {
            let mut matching: Vec<AppointmentRow> = self
                .rows
                .lock()
                .unwrap()
                .iter()
                .filter(|r| r.date == date)
                .cloned()
                .collect();
            matching.sort_by(|a, b| a.time.cmp(&b.time));
            Ok(matching)
        }

        async fn update_fields(
            &self,
            id: Uuid,
            patch: AppointmentPatch,
        ) -> Result<(), EngineError> {
            let mut rows = self.rows.lock().unwrap();
            let row = rows
                .iter_mut()
                .find(|r| r.appointment_id == id)
                .ok_or(EngineError::NotFound("appointment"))?;

            if let Some(date) = patch.date {
                row.date = date;
            }
            if let Some(time) = patch.time {
                row.time = time;
            }
            if let Some(status) = patch.status {
                row.status = status;
            }
            if let Some(findings) = patch.findings {
                row.findings = Some(findings);
            }
            if let Some(prescription) = patch.prescription {
                row.prescription = Some(prescription);
            }
            row.updated_at = Utc::now();
            Ok(())
        }

        async fn delete(&self, id: Uuid) -> Result<(), EngineError> {
            let mut rows = self.rows.lock().unwrap();
            let before = rows.len();
            rows.retain(|r| r.appointment_id != id);
            if rows.len() == before {
                return Err(EngineError::NotFound("appointment"));
            }
            Ok(())
        }
    }

    /* ---------- in-memory directory ---------- */

    #[derive(Default)]
    struct MemDirectory {
        doctors: HashMap<Uuid, DoctorRow>,
        users: HashMap<Uuid, UserRow>,
        services: HashMap<Uuid, ServiceRow>,
    }

    #[async_trait]
    impl Directory for MemDirectory {
        async fn doctor(&self, doctor_id: Uuid) -> Result<Option<DoctorRow>, EngineError> {
            Ok(self.doctors.get(&doctor_id).cloned())
        }

        async fn user(&self, user_id: Uuid) -> Result<Option<UserRow>, EngineError> {
            Ok(self.users.get(&user_id).cloned())
        }

        async fn service(&self, service_id: Uuid) -> Result<Option<ServiceRow>, EngineError> {
            Ok(self.services.get(&service_id).cloned())
        }
    }

    /* ---------- notifier fakes ---------- */

    #[derive(Default)]
    struct RecordingNotifier {
        sent: Mutex<Vec<(Uuid, NotificationKind)>>,
    }

    impl RecordingNotifier {
        fn sent(&self) -> Vec<(Uuid, NotificationKind)> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn send(
            &self,
            recipient: Uuid,
            kind: NotificationKind,
            _payload: NotificationPayload,
        ) -> Result<(), NotifyError> {
            self.sent.lock().unwrap().push((recipient, kind));
            Ok(())
        }
    }

    struct FailingNotifier;

    #[async_trait]
    impl Notifier for FailingNotifier {
        async fn send(
            &self,
            _recipient: Uuid,
            _kind: NotificationKind,
            _payload: NotificationPayload,
        ) -> Result<(), NotifyError> {
            Err(NotifyError("recipient unreachable".into()))
        }
    }

    /* ---------- fixture ---------- */

    struct Fixture {
        engine: LifecycleEngine,
        store: Arc<MemStore>,
        notifier: Arc<RecordingNotifier>,
        patient_id: Uuid,
        doctor_id: Uuid,
        doctor_user_id: Uuid,
        service_id: Uuid,
    }

    fn fixture() -> Fixture {
        let patient_id = Uuid::new_v4();
        let doctor_id = Uuid::new_v4();
        let doctor_user_id = Uuid::new_v4();
        let service_id = Uuid::new_v4();

        let mut directory = MemDirectory::default();
        directory.users.insert(patient_id, UserRow {
            user_id: patient_id,
            name: "Pat Doe".into(),
            email: None,
            role: Role::Patient,
        });
        directory.users.insert(doctor_user_id, UserRow {
            user_id: doctor_user_id,
            name: "Dr. Gray".into(),
            email: None,
            role: Role::Doctor,
        });
        directory.doctors.insert(doctor_id, DoctorRow {
            doctor_id,
            user_id: Some(doctor_user_id),
            name: "Dr. Gray".into(),
            specialty: None,
            email: None,
        });
        directory.services.insert(service_id, ServiceRow {
            service_id,
            name: "Consultation".into(),
            description: None,
            is_active: true,
        });

        let store = Arc::new(MemStore::default());
        let notifier = Arc::new(RecordingNotifier::default());
        let engine = LifecycleEngine::new(
            store.clone(),
            Arc::new(directory),
            notifier.clone(),
        );

        Fixture {
            engine,
            store,
            notifier,
            patient_id,
            doctor_id,
            doctor_user_id,
            service_id,
        }
    }

    fn slot(day: u32, hour: u32) -> (NaiveDate, NaiveTime) {
        (
            NaiveDate::from_ymd_opt(2024, 6, day).unwrap(),
            NaiveTime::from_hms_opt(hour, 0, 0).unwrap(),
        )
    }

    impl Fixture {
        fn new_appointment(&self, date: NaiveDate, time: NaiveTime) -> NewAppointment {
            NewAppointment {
                patient_id: self.patient_id,
                doctor_id: self.doctor_id,
                service_id: self.service_id,
                date,
                time,
            }
        }

        async fn request(&self, date: NaiveDate, time: NaiveTime) -> AppointmentRow {
            self.engine
                .request(self.new_appointment(date, time))
                .await
                .unwrap()
                .appointment
        }
    }

    /* ---------- request + conflict policy ---------- */

    #[tokio::test]
    async fn request_creates_pending_and_notifies_doctor() {
        let fx = fixture();
        let (date, time) = slot(1, 10);

        let t = fx.engine.request(fx.new_appointment(date, time)).await.unwrap();

        assert_eq!(t.appointment.status, AppointmentStatus::Pending);
        assert!(t.notified);
        assert_eq!(t.message, MSG_CREATED);
        assert_eq!(
            fx.notifier.sent(),
            vec![(fx.doctor_user_id, NotificationKind::RequestCreated)]
        );
    }

    #[tokio::test]
    async fn request_against_approved_slot_fails_and_creates_nothing() {
        let fx = fixture();
        let (date, time) = slot(1, 10);

        let first = fx.request(date, time).await;
        fx.engine.approve(first.appointment_id).await.unwrap();

        let result = fx.engine.request(fx.new_appointment(date, time)).await;
        assert!(matches!(result, Err(EngineError::SlotConflict)));
        assert_eq!(fx.store.count(), 1);
    }

    #[tokio::test]
    async fn request_against_pending_completed_or_cancelled_slot_succeeds() {
        let fx = fixture();

        // pending occupant
        let (date, time) = slot(1, 10);
        fx.request(date, time).await;
        fx.engine.request(fx.new_appointment(date, time)).await.unwrap();

        // completed occupant
        let (date, time) = slot(2, 10);
        let a = fx.request(date, time).await;
        fx.engine.approve(a.appointment_id).await.unwrap();
        fx.engine
            .complete(a.appointment_id, "healthy", "rest")
            .await
            .unwrap();
        fx.engine.request(fx.new_appointment(date, time)).await.unwrap();

        // cancelled occupant
        let (date, time) = slot(3, 10);
        let a = fx.request(date, time).await;
        fx.engine.cancel(a.appointment_id).await.unwrap();
        fx.engine.request(fx.new_appointment(date, time)).await.unwrap();
    }

    #[tokio::test]
    async fn request_with_unknown_references_is_rejected() {
        let fx = fixture();
        let (date, time) = slot(1, 10);

        let mut fields = fx.new_appointment(date, time);
        fields.doctor_id = Uuid::new_v4();
        assert!(matches!(
            fx.engine.request(fields).await,
            Err(EngineError::NotFound("doctor"))
        ));

        let mut fields = fx.new_appointment(date, time);
        fields.service_id = Uuid::new_v4();
        assert!(matches!(
            fx.engine.request(fields).await,
            Err(EngineError::NotFound("service"))
        ));

        assert_eq!(fx.store.count(), 0);
    }

    /* ---------- approve / decline ---------- */

    #[tokio::test]
    async fn approve_moves_pending_to_approved_with_one_patient_notification() {
        let fx = fixture();
        let (date, time) = slot(1, 10);
        let a = fx.request(date, time).await;

        let t = fx.engine.approve(a.appointment_id).await.unwrap();

        assert_eq!(t.appointment.status, AppointmentStatus::Approved);
        let patient_sends: Vec<_> = fx
            .notifier
            .sent()
            .into_iter()
            .filter(|(to, _)| *to == fx.patient_id)
            .collect();
        assert_eq!(patient_sends, vec![(fx.patient_id, NotificationKind::Approved)]);
    }

    #[tokio::test]
    async fn decline_moves_pending_to_cancelled_with_one_patient_notification() {
        let fx = fixture();
        let (date, time) = slot(1, 10);
        let a = fx.request(date, time).await;

        let t = fx.engine.decline(a.appointment_id).await.unwrap();

        assert_eq!(t.appointment.status, AppointmentStatus::Cancelled);
        let patient_sends: Vec<_> = fx
            .notifier
            .sent()
            .into_iter()
            .filter(|(to, _)| *to == fx.patient_id)
            .collect();
        assert_eq!(patient_sends, vec![(fx.patient_id, NotificationKind::Declined)]);
    }

    #[tokio::test]
    async fn operations_on_missing_appointment_return_not_found() {
        let fx = fixture();
        let id = Uuid::new_v4();

        assert!(matches!(
            fx.engine.approve(id).await,
            Err(EngineError::NotFound("appointment"))
        ));
        assert!(matches!(
            fx.engine.cancel(id).await,
            Err(EngineError::NotFound("appointment"))
        ));
        assert!(matches!(
            fx.engine.complete(id, "f", "p").await,
            Err(EngineError::NotFound("appointment"))
        ));
    }

    /* ---------- complete ---------- */

    #[tokio::test]
    async fn complete_requires_findings_and_prescription() {
        let fx = fixture();
        let (date, time) = slot(1, 10);
        let a = fx.request(date, time).await;
        fx.engine.approve(a.appointment_id).await.unwrap();

        let r = fx.engine.complete(a.appointment_id, "", "rest").await;
        assert!(matches!(r, Err(EngineError::MissingField("findings"))));

        let r = fx.engine.complete(a.appointment_id, "healthy", "  ").await;
        assert!(matches!(r, Err(EngineError::MissingField("prescription"))));

        // status untouched by the failed attempts
        let row = fx.store.get(a.appointment_id).unwrap();
        assert_eq!(row.status, AppointmentStatus::Approved);
    }

    #[tokio::test]
    async fn complete_persists_clinical_fields_without_notification() {
        let fx = fixture();
        let (date, time) = slot(1, 10);
        let a = fx.request(date, time).await;
        fx.engine.approve(a.appointment_id).await.unwrap();
        let sends_before = fx.notifier.sent().len();

        let t = fx
            .engine
            .complete(a.appointment_id, "mild flu", "fluids and rest")
            .await
            .unwrap();

        assert_eq!(t.appointment.status, AppointmentStatus::Completed);
        assert_eq!(t.appointment.findings.as_deref(), Some("mild flu"));
        assert_eq!(t.appointment.prescription.as_deref(), Some("fluids and rest"));
        assert_eq!(fx.notifier.sent().len(), sends_before);
    }

    /* ---------- reschedule ---------- */

    #[tokio::test]
    async fn reschedule_always_resets_to_pending_and_notifies_doctor() {
        let fx = fixture();
        let (date, time) = slot(1, 10);
        let a = fx.request(date, time).await;
        fx.engine.approve(a.appointment_id).await.unwrap();

        let (new_date, new_time) = slot(2, 11);
        let t = fx
            .engine
            .reschedule(a.appointment_id, new_date, new_time)
            .await
            .unwrap();

        assert_eq!(t.appointment.status, AppointmentStatus::Pending);
        assert_eq!(t.appointment.date, new_date);
        assert_eq!(t.appointment.time, new_time);
        assert_eq!(
            fx.notifier.sent().last(),
            Some(&(fx.doctor_user_id, NotificationKind::Rescheduled))
        );
    }

    #[tokio::test]
    async fn reschedule_into_approved_slot_is_a_conflict() {
        let fx = fixture();
        let (date, time) = slot(1, 10);
        let blocker = fx.request(date, time).await;
        fx.engine.approve(blocker.appointment_id).await.unwrap();

        let (other_date, other_time) = slot(2, 10);
        let moving = fx.request(other_date, other_time).await;

        let r = fx.engine.reschedule(moving.appointment_id, date, time).await;
        assert!(matches!(r, Err(EngineError::SlotConflict)));

        // untouched
        let row = fx.store.get(moving.appointment_id).unwrap();
        assert_eq!(row.date, other_date);
        assert_eq!(row.status, AppointmentStatus::Pending);
    }

    #[tokio::test]
    async fn reschedule_onto_own_approved_slot_is_allowed() {
        let fx = fixture();
        let (date, time) = slot(1, 10);
        let a = fx.request(date, time).await;
        fx.engine.approve(a.appointment_id).await.unwrap();

        let t = fx.engine.reschedule(a.appointment_id, date, time).await.unwrap();
        assert_eq!(t.appointment.status, AppointmentStatus::Pending);
    }

    /* ---------- cancel ---------- */

    #[tokio::test]
    async fn cancel_from_any_status_notifies_doctor_once() {
        let fx = fixture();

        for (day, setup) in [(1u32, "pending"), (2, "approved"), (3, "completed")] {
            let (date, time) = slot(day, 10);
            let a = fx.request(date, time).await;
            if setup != "pending" {
                fx.engine.approve(a.appointment_id).await.unwrap();
            }
            if setup == "completed" {
                fx.engine
                    .complete(a.appointment_id, "ok", "none")
                    .await
                    .unwrap();
            }

            let sends_before = fx.notifier.sent().len();
            let t = fx.engine.cancel(a.appointment_id).await.unwrap();

            assert_eq!(t.appointment.status, AppointmentStatus::Cancelled);
            let new_sends: Vec<_> = fx.notifier.sent().split_off(sends_before);
            assert_eq!(new_sends, vec![(fx.doctor_user_id, NotificationKind::Cancelled)]);
        }
    }

    /* ---------- delete ---------- */

    #[tokio::test]
    async fn delete_is_limited_to_owner_or_admin_and_is_hard() {
        let fx = fixture();
        let (date, time) = slot(1, 10);
        let a = fx.request(date, time).await;

        let stranger = Uuid::new_v4();
        let r = fx.engine.delete(a.appointment_id, stranger, Role::Patient).await;
        assert!(matches!(r, Err(EngineError::Forbidden(_))));

        fx.engine
            .delete(a.appointment_id, fx.patient_id, Role::Patient)
            .await
            .unwrap();
        assert!(fx.store.get(a.appointment_id).is_none());
        assert!(matches!(
            fx.engine.delete(a.appointment_id, fx.patient_id, Role::Admin).await,
            Err(EngineError::NotFound("appointment"))
        ));

        // admin can remove someone else's record
        let b = fx.request(date, time).await;
        fx.engine
            .delete(b.appointment_id, Uuid::new_v4(), Role::Admin)
            .await
            .unwrap();
        assert_eq!(fx.store.count(), 0);
    }

    /* ---------- listings ---------- */

    #[tokio::test]
    async fn queue_pages_are_capped_at_six_newest_first() {
        let fx = fixture();
        for day in 1..=8u32 {
            let (date, time) = slot(day, 10);
            fx.request(date, time).await;
        }

        let first = fx.engine.queue(AppointmentStatus::Pending, 1).await.unwrap();
        assert_eq!(first.items.len(), 6);
        assert_eq!(first.total, 8);
        for pair in first.items.windows(2) {
            assert!(pair[0].created_at >= pair[1].created_at);
        }

        let second = fx.engine.queue(AppointmentStatus::Pending, 2).await.unwrap();
        assert_eq!(second.items.len(), 2);
    }

    #[tokio::test]
    async fn patient_listing_orders_by_status_code_descending() {
        let fx = fixture();

        let (d1, t1) = slot(1, 10);
        let pending = fx.request(d1, t1).await;
        let (d2, t2) = slot(2, 10);
        let approved = fx.request(d2, t2).await;
        fx.engine.approve(approved.appointment_id).await.unwrap();
        let (d3, t3) = slot(3, 10);
        let cancelled = fx.request(d3, t3).await;
        fx.engine.cancel(cancelled.appointment_id).await.unwrap();

        let list = fx.engine.patient_appointments(fx.patient_id).await.unwrap();
        let codes: Vec<i16> = list.iter().map(|a| a.status.code()).collect();
        assert_eq!(codes, vec![3, 1, 0]);
        let _ = pending;
    }

    /* ---------- availability ---------- */

    #[tokio::test]
    async fn availability_excludes_only_approved_times() {
        let fx = fixture();
        let (date, t10) = slot(1, 10);
        let t11 = NaiveTime::from_hms_opt(11, 0, 0).unwrap();

        let approved = fx.request(date, t10).await;
        fx.engine.approve(approved.appointment_id).await.unwrap();
        fx.request(date, t11).await; // stays pending

        let day = fx.engine.availability(date).await.unwrap();
        assert_eq!(day.existing.len(), 2);
        assert!(!day.available_times.contains(&t10));
        assert!(day.available_times.contains(&t11));
    }

    /* ---------- notification robustness ---------- */

    #[tokio::test]
    async fn dispatcher_failure_never_rolls_back_the_transition() {
        let fx = fixture();
        let (date, time) = slot(1, 10);
        let a = fx.request(date, time).await;

        let mut directory = MemDirectory::default();
        directory.users.insert(fx.patient_id, UserRow {
            user_id: fx.patient_id,
            name: "Pat Doe".into(),
            email: None,
            role: Role::Patient,
        });
        let failing = LifecycleEngine::new(
            fx.store.clone(),
            Arc::new(directory),
            Arc::new(FailingNotifier),
        );

        let t = failing.approve(a.appointment_id).await.unwrap();
        assert!(!t.notified);
        assert_eq!(t.appointment.status, AppointmentStatus::Approved);
        assert_eq!(
            fx.store.get(a.appointment_id).unwrap().status,
            AppointmentStatus::Approved
        );
    }

    #[tokio::test]
    async fn missing_counterparty_skips_notification_with_soft_message() {
        let fx = fixture();
        let (date, time) = slot(1, 10);

        // doctor exists but has no linked login user
        let unlinked_doctor = Uuid::new_v4();
        let mut directory = MemDirectory::default();
        directory.users.insert(fx.patient_id, UserRow {
            user_id: fx.patient_id,
            name: "Pat Doe".into(),
            email: None,
            role: Role::Patient,
        });
        directory.doctors.insert(unlinked_doctor, DoctorRow {
            doctor_id: unlinked_doctor,
            user_id: None,
            name: "Dr. Offline".into(),
            specialty: None,
            email: None,
        });
        directory.services.insert(fx.service_id, ServiceRow {
            service_id: fx.service_id,
            name: "Consultation".into(),
            description: None,
            is_active: true,
        });

        let engine = LifecycleEngine::new(
            fx.store.clone(),
            Arc::new(directory),
            fx.notifier.clone(),
        );

        let t = engine
            .request(NewAppointment {
                patient_id: fx.patient_id,
                doctor_id: unlinked_doctor,
                service_id: fx.service_id,
                date,
                time,
            })
            .await
            .unwrap();

        // record created, nothing dispatched, soft message surfaced
        assert_eq!(t.appointment.status, AppointmentStatus::Pending);
        assert!(!t.notified);
        assert_eq!(t.message, MSG_NO_DOCTOR);
        assert!(fx.notifier.sent().is_empty());
    }

    /* ---------- end-to-end booking scenario ---------- */

    #[tokio::test]
    async fn booking_scenario_blocks_slot_only_after_approval() {
        let fx = fixture();
        let (date, time) = slot(1, 10);

        // first patient requests the slot
        let first = fx.engine.request(fx.new_appointment(date, time)).await.unwrap();
        assert_eq!(first.appointment.status, AppointmentStatus::Pending);

        // a second request for the same slot succeeds while the first is pending
        let second = fx.engine.request(fx.new_appointment(date, time)).await.unwrap();
        assert_eq!(second.appointment.status, AppointmentStatus::Pending);

        // doctor approves the first
        fx.engine.approve(first.appointment.appointment_id).await.unwrap();

        // a third request now fails with a conflict
        let third = fx.engine.request(fx.new_appointment(date, time)).await;
        assert!(matches!(third, Err(EngineError::SlotConflict)));
    }
}
