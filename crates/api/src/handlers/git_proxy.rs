//! Smart-HTTP wire handlers.
//!
//! git itself is the client here. Authentication is the session secret
//! embedded in the path, so there is no [`AuthCaller`] extractor; the
//! engine checks the secret hash before anything else.
//!
//! [`AuthCaller`]: crate::middleware::AuthCaller

use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::response::Response;
use drawbridge_core::types::DbId;
use serde::Deserialize;

use crate::engine::git;
use crate::error::AppResult;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct InfoRefsQuery {
    pub service: Option<String>,
}

/// GET /git/session/{id}/{secret}/info/refs?service=...
pub async fn info_refs(
    State(state): State<AppState>,
    Path((id, secret)): Path<(DbId, String)>,
    Query(query): Query<InfoRefsQuery>,
) -> AppResult<Response> {
    git::info_refs(&state, id, &secret, query.service.as_deref()).await
}

/// POST /git/session/{id}/{secret}/git-upload-pack
pub async fn upload_pack(
    State(state): State<AppState>,
    Path((id, secret)): Path<(DbId, String)>,
    body: Body,
) -> AppResult<Response> {
    git::upload_pack(&state, id, &secret, body).await
}

/// POST /git/session/{id}/{secret}/git-receive-pack
pub async fn receive_pack(
    State(state): State<AppState>,
    Path((id, secret)): Path<(DbId, String)>,
    body: Body,
) -> AppResult<Response> {
    git::receive_pack(&state, id, &secret, body).await
}
