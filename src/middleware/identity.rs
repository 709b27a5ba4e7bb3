use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use uuid::Uuid;

use crate::error::ApiError;
use crate::models::{AppState, Role, UserRow};

/// Explicit caller identity, resolved per request from the `x-user-id`
/// header against clinic_user. Every operation takes this instead of any
/// ambient "current user" state. Authentication proper (sessions, tokens)
/// is a front-door concern and lives outside this service.
#[derive(Debug, Clone)]
pub struct Identity {
    pub user_id: Uuid,
    pub name: String,
    pub role: Role,
}

impl FromRequestParts<AppState> for Identity {
    type Rejection = ApiError;

    fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> impl std::future::Future<Output = Result<Self, Self::Rejection>> + Send {
        async move {
            let raw = parts
                .headers
                .get("x-user-id")
                .and_then(|v| v.to_str().ok())
                .ok_or_else(|| {
                    ApiError::Unauthorized(
                        "MISSING_IDENTITY",
                        "x-user-id header is required".into(),
                    )
                })?;

            let user_id = Uuid::parse_str(raw.trim()).map_err(|_| {
                ApiError::Unauthorized("MISSING_IDENTITY", "x-user-id must be a UUID".into())
            })?;

            let row: Option<UserRow> = sqlx::query_as::<_, UserRow>(
                r#"
                SELECT user_id, name, email, role
                FROM clinic_user
                WHERE user_id = $1
                "#,
            )
            .bind(user_id)
            .fetch_optional(&state.db)
            .await
            .map_err(|e| ApiError::Internal(format!("db error: {e}")))?;

            let row = row.ok_or_else(|| {
                ApiError::Unauthorized("UNKNOWN_USER", "No such user".into())
            })?;

            Ok(Identity {
                user_id: row.user_id,
                name: row.name,
                role: row.role,
            })
        }
    }
}
