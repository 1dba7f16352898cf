//! Route definitions for Git proxy sessions and the smart-HTTP wire.
//!
//! Session management authenticates with a caller API key; the wire
//! endpoints authenticate with the per-session secret embedded in the
//! path, because git itself is the client there.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::{git_proxy, git_sessions};
use crate::state::AppState;

/// Routes mounted at `/git`.
///
/// ```text
/// POST   /sessions                                    -> create_session
/// GET    /sessions/{id}                                -> poll_session
/// GET    /sessions/{id}/remote                         -> get_remote
///
/// GET    /session/{id}/{secret}/info/refs              -> info_refs
/// POST   /session/{id}/{secret}/git-upload-pack        -> upload_pack
/// POST   /session/{id}/{secret}/git-receive-pack       -> receive_pack
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/sessions", post(git_sessions::create_session))
        .route("/sessions/{id}", get(git_sessions::poll_session))
        .route("/sessions/{id}/remote", get(git_sessions::get_remote))
        .route("/session/{id}/{secret}/info/refs", get(git_proxy::info_refs))
        .route(
            "/session/{id}/{secret}/git-upload-pack",
            post(git_proxy::upload_pack),
        )
        .route(
            "/session/{id}/{secret}/git-receive-pack",
            post(git_proxy::receive_pack),
        )
}
