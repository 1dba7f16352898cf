//! Route definitions for the decision-channel callback surface.

use axum::routing::{get, post, put};
use axum::Router;

use crate::handlers::channel;
use crate::state::AppState;

/// Routes mounted at `/channel`. All require the channel bearer token.
///
/// ```text
/// POST   /users                                -> upsert_user
/// POST   /users/{id}/keys                      -> create_key
/// GET    /users/{id}/keys                      -> list_keys
/// PUT    /users/{id}/credentials/{provider}    -> link_credential
/// DELETE /users/{id}/credentials/{provider}    -> revoke_credential
/// GET    /users/{id}/rules                     -> list_rules
///
/// POST   /keys/{id}/rename                     -> rename_key
/// POST   /keys/{id}/revoke                     -> revoke_key
/// POST   /keys/{id}/rotate                     -> rotate_key
/// POST   /rules/{id}/revoke                    -> revoke_rule
///
/// POST   /requests/{id}/decision               -> decide_request
/// GET    /requests/{id}/audit                  -> request_audit
/// POST   /sessions/{id}/decision               -> decide_session
/// GET    /sessions/{id}/audit                  -> session_audit
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/users", post(channel::upsert_user))
        .route(
            "/users/{id}/keys",
            post(channel::create_key).get(channel::list_keys),
        )
        .route(
            "/users/{id}/credentials/{provider}",
            put(channel::link_credential).delete(channel::revoke_credential),
        )
        .route("/users/{id}/rules", get(channel::list_rules))
        .route("/keys/{id}/rename", post(channel::rename_key))
        .route("/keys/{id}/revoke", post(channel::revoke_key))
        .route("/keys/{id}/rotate", post(channel::rotate_key))
        .route("/rules/{id}/revoke", post(channel::revoke_rule))
        .route("/requests/{id}/decision", post(channel::decide_request))
        .route("/requests/{id}/audit", get(channel::request_audit))
        .route("/sessions/{id}/decision", post(channel::decide_session))
        .route("/sessions/{id}/audit", get(channel::session_audit))
}
