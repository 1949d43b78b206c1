use axum::routing::{get, post};
use axum::Router;

use crate::auth::handlers;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/sign_up", post(handlers::sign_up))
        .route("/login", post(handlers::login))
        .route("/api/tables", get(handlers::list_usernames))
}
