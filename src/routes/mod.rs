pub mod auth;
pub mod tickets;

use axum::{
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};

use crate::responses::JsonResponse;
use crate::state::AppState;

pub fn ticket_routes() -> Router<AppState> {
    Router::new()
        .route("/fetch", get(tickets::fetch))
        .route("/save", post(tickets::save))
        .route("/reply", post(tickets::reply))
        .route("/close", post(tickets::close))
        .route("/withdraw", post(tickets::withdraw))
}

/// All routes with state applied. Middleware layers are added by `main`.
pub fn app_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .nest("/api/v1/user/ticket", ticket_routes())
        .with_state(state)
}

/// A simple root route.
async fn root() -> Response {
    JsonResponse::success("Hello, ticketdesk!").into_response()
}
