pub(crate) mod handlers;
pub(crate) mod models;

use crate::state::AppState;
use axum::routing::get;
use axum::Router;

pub(super) fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/authorize",
            get(handlers::authorize).post(handlers::approve),
        )
        .route(
            "/token",
            get(handlers::token)
                .post(handlers::token)
                .put(handlers::token),
        )
}
