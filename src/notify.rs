// src/notify.rs
//
// Typed notification dispatch. Delivery is attempted once per transition;
// the engine never lets a dispatch failure roll back a state change.

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

/// Notification kinds, stored as smallint:
/// 0 RequestCreated, 1 Approved, 2 Declined, 3 Rescheduled, 4 Cancelled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(i16)]
pub enum NotificationKind {
    RequestCreated = 0,
    Approved = 1,
    Declined = 2,
    Rescheduled = 3,
    Cancelled = 4,
}

impl NotificationKind {
    pub fn code(self) -> i16 {
        self as i16
    }
}

/// Context handed to the dispatcher alongside the kind. Names may be absent
/// when a counterpart record is missing; the message body degrades rather
/// than the dispatch failing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationPayload {
    pub appointment_id: Uuid,
    pub doctor: Option<String>,
    pub patient: Option<String>,
    pub service: Option<String>,
    pub date: NaiveDate,
    pub time: NaiveTime,
}

#[derive(Debug, thiserror::Error)]
#[error("notification dispatch failed: {0}")]
pub struct NotifyError(pub String);

#[async_trait]
pub trait Notifier: Send + Sync {
    /// Attempt delivery once. No retry, no delivery guarantee.
    async fn send(
        &self,
        recipient: Uuid,
        kind: NotificationKind,
        payload: NotificationPayload,
    ) -> Result<(), NotifyError>;
}

/// Stores notifications as rows; recipients read them back through
/// GET /notifications until marked read.
#[derive(Clone)]
pub struct DbNotifier {
    pool: PgPool,
}

impl DbNotifier {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Notifier for DbNotifier {
    async fn send(
        &self,
        recipient: Uuid,
        kind: NotificationKind,
        payload: NotificationPayload,
    ) -> Result<(), NotifyError> {
        let body = serde_json::to_value(&payload).map_err(|e| NotifyError(e.to_string()))?;

        sqlx::query(
            r#"
            INSERT INTO notification (user_id, kind, payload, created_at)
            VALUES ($1, $2, $3, now())
            "#,
        )
        .bind(recipient)
        .bind(kind.code())
        .bind(body)
        .execute(&self.pool)
        .await
        .map_err(|e| NotifyError(e.to_string()))?;

        Ok(())
    }
}
