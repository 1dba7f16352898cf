//! Route definitions for the brokered REST request lifecycle.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::requests;
use crate::state::AppState;

/// Routes mounted at `/proxy`.
///
/// ```text
/// POST   /requests               -> create_request
/// GET    /requests/{id}          -> poll_request
/// POST   /requests/{id}/execute  -> execute_request
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/requests", post(requests::create_request))
        .route("/requests/{id}", get(requests::poll_request))
        .route("/requests/{id}/execute", post(requests::execute_request))
}
