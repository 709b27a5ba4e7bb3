use crate::models::AppState;
use axum::Router;

pub mod appointment_routes;
pub mod chart_routes;
pub mod doctor_routes;
pub mod home_routes;
pub mod notification_routes;
pub mod service_routes;

pub fn router(state: AppState) -> Router {
    Router::new()
        .nest("/api/v1", appointment_routes::router())
        .nest("/api/v1", doctor_routes::router())
        .nest("/api/v1/services", service_routes::router())
        .nest("/api/v1", chart_routes::router())
        .nest("/api/v1", notification_routes::router())
        .merge(home_routes::router())
        .with_state(state)
}
