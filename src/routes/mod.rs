pub mod dashboard;
pub mod detector;
pub mod health;

use axum::Router;

use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .merge(health::router())
        .nest(
            "/api",
            Router::new()
                .merge(dashboard::router())
                .merge(detector::router()),
        )
        .with_state(state)
}
