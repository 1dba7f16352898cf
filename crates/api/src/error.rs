use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use drawbridge_core::error::CoreError;
use drawbridge_core::pktline::{PushViolation, WireError};
use serde_json::json;

/// Error surface for every handler in the crate.
///
/// Each variant renders as `{"error": ..., "code": ...}` JSON with a
/// status chosen here, so callers can branch on the machine code
/// without parsing prose. Broker outcomes carry their own status and
/// code; everything else is classified in [`IntoResponse`].
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Domain failure raised below the HTTP layer.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Raw sqlx failure from a repository call.
    #[error("database failure: {0}")]
    Database(#[from] sqlx::Error),

    /// Malformed input caught in a handler before the engine runs.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// A lifecycle or upstream outcome with its own status and stable
    /// machine code (`NOT_APPROVED`, `ALREADY_EXECUTED`, `UPSTREAM_TIMEOUT`,
    /// the push gate codes, and friends).
    #[error("{}", .0.message)]
    Broker(BrokerError),

    /// Catch-all for states that should be unreachable.
    #[error("internal failure: {0}")]
    InternalError(String),
}

/// Convenience type alias for handler return values.
pub type AppResult<T> = Result<T, AppError>;

/// A broker outcome that maps one-to-one onto an HTTP response.
#[derive(Debug)]
pub struct BrokerError {
    pub status: StatusCode,
    pub code: String,
    pub message: String,
    /// Emitted as a `Retry-After` header on in-progress states.
    pub retry_after: Option<u64>,
}

impl AppError {
    pub fn broker(
        status: StatusCode,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        AppError::Broker(BrokerError {
            status,
            code: code.into(),
            message: message.into(),
            retry_after: None,
        })
    }

    pub fn broker_retry(
        status: StatusCode,
        code: impl Into<String>,
        message: impl Into<String>,
        retry_after_secs: u64,
    ) -> Self {
        AppError::Broker(BrokerError {
            status,
            code: code.into(),
            message: message.into(),
            retry_after: Some(retry_after_secs),
        })
    }
}

impl From<PushViolation> for AppError {
    fn from(violation: PushViolation) -> Self {
        AppError::broker(StatusCode::FORBIDDEN, violation.code, violation.message)
    }
}

impl From<WireError> for AppError {
    fn from(err: WireError) -> Self {
        AppError::broker(StatusCode::BAD_REQUEST, "VALIDATION_ERROR", err.0)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message, retry_after) = match &self {
            // Domain errors carry enough context to classify directly.
            AppError::Core(core) => match core {
                CoreError::NotFound { entity, id } => (
                    StatusCode::NOT_FOUND,
                    "NOT_FOUND".to_string(),
                    format!("{entity} {id} does not exist"),
                    None,
                ),
                CoreError::Validation(msg) => (
                    StatusCode::BAD_REQUEST,
                    "VALIDATION_ERROR".to_string(),
                    msg.clone(),
                    None,
                ),
                CoreError::Conflict(msg) => (
                    StatusCode::CONFLICT,
                    "CONFLICT".to_string(),
                    msg.clone(),
                    None,
                ),
                CoreError::Unauthorized(msg) => (
                    StatusCode::UNAUTHORIZED,
                    "UNAUTHORIZED".to_string(),
                    msg.clone(),
                    None,
                ),
                CoreError::Forbidden(msg) => (
                    StatusCode::FORBIDDEN,
                    "FORBIDDEN".to_string(),
                    msg.clone(),
                    None,
                ),
                CoreError::Internal(msg) => {
                    tracing::error!(error = %msg, "Unhandled core failure");
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "INTERNAL_ERROR".to_string(),
                        "Something went wrong processing the request".to_string(),
                        None,
                    )
                }
            },

            // Database failures are classified; raw detail stays in the log.
            AppError::Database(err) => {
                let (status, code, message) = classify_sqlx_error(err);
                (status, code.to_string(), message, None)
            }

            // Handler-level outcomes.
            AppError::BadRequest(msg) => (
                StatusCode::BAD_REQUEST,
                "BAD_REQUEST".to_string(),
                msg.clone(),
                None,
            ),
            AppError::Broker(broker) => (
                broker.status,
                broker.code.clone(),
                broker.message.clone(),
                broker.retry_after,
            ),
            AppError::InternalError(msg) => {
                tracing::error!(error = %msg, "Unhandled failure");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR".to_string(),
                    "Something went wrong processing the request".to_string(),
                    None,
                )
            }
        };

        let body = json!({
            "error": message,
            "code": code,
        });

        let mut response = (status, axum::Json(body)).into_response();
        if let Some(secs) = retry_after {
            if let Ok(value) = HeaderValue::from_str(&secs.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}

/// Map a sqlx failure onto a status, machine code, and safe message.
///
/// `RowNotFound` becomes a 404. A 23505 on one of the schema's
/// `uq_`-prefixed constraints becomes a 409. Anything else is a
/// sanitized 500; the raw driver detail goes to the log, never to the
/// caller.
fn classify_sqlx_error(err: &sqlx::Error) -> (StatusCode, &'static str, String) {
    match err {
        sqlx::Error::RowNotFound => (
            StatusCode::NOT_FOUND,
            "NOT_FOUND",
            "No such record".to_string(),
        ),
        sqlx::Error::Database(db_err) => {
            // 23505 is Postgres for unique_violation
            if db_err.code().as_deref() == Some("23505") {
                let constraint = db_err.constraint().unwrap_or("unknown");
                if constraint.starts_with("uq_") {
                    return (
                        StatusCode::CONFLICT,
                        "CONFLICT",
                        format!("Duplicate value for {constraint}"),
                    );
                }
            }
            tracing::error!(error = %db_err, "Database failure");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "Something went wrong processing the request".to_string(),
            )
        }
        other => {
            tracing::error!(error = %other, "Database failure");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "Something went wrong processing the request".to_string(),
            )
        }
    }
}

/// True when a sqlx error is a unique violation on the named constraint.
/// Lets write paths turn a lost insert race into a read of the winner.
pub fn is_unique_violation(err: &sqlx::Error, constraint: &str) -> bool {
    match err {
        sqlx::Error::Database(db_err) => {
            db_err.code().as_deref() == Some("23505")
                && db_err.constraint() == Some(constraint)
        }
        _ => false,
    }
}
