use axum::{Json, Router, extract::State, routing::get};

use crate::error::ApiError;
use crate::middleware::identity::Identity;
use crate::models::AppState;

#[derive(serde::Serialize)]
pub struct HomeResponse {
    pub data: HomeData,
}

#[derive(serde::Serialize)]
pub struct HomeData {
    pub view: String,
    pub display_name: String,
}

pub fn router() -> Router<AppState> {
    Router::new().route("/home", get(home))
}

/// Role-based landing view: patients get the booking view, staff the
/// request queue view.
pub async fn home(
    State(_state): State<AppState>,
    identity: Identity,
) -> Result<Json<HomeResponse>, ApiError> {
    Ok(Json(HomeResponse {
        data: HomeData {
            view: identity.role.as_str().to_string(),
            display_name: identity.name,
        },
    }))
}
