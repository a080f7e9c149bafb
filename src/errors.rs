use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use sqlx::Error as SqlxError;
use thiserror::Error;

/// Infrastructure failures that abort a request. Domain-level rejections
/// (bad credentials, throttling, unparseable messages, ownership misses)
/// are rendered into the relevant view instead and never pass through here.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Database error")]
    DatabaseError(#[from] SqlxError),

    #[error("Template error")]
    TemplateError(#[from] tera::Error),

    #[error("Session error: {0}")]
    SessionError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        StatusCode::INTERNAL_SERVER_ERROR
    }

    fn error_response(&self) -> HttpResponse {
        // Detail stays in the logs, the client only sees the variant label.
        HttpResponse::build(self.status_code()).body(self.to_string())
    }
}

/// Signup outcome distinct from infrastructure failures: a taken username
/// is a user-facing message, not a 500.
#[derive(Debug, Error)]
pub enum RegisterError {
    #[error("Username already exists")]
    DuplicateUsername,

    #[error("Database error")]
    Database(#[from] SqlxError),

    #[error("Password hashing error: {0}")]
    Password(String),
}

/// Rent insertion against a tenant the acting user does not own. Surfaced
/// as a generic denial so existence of other users' tenants never leaks.
#[derive(Debug, Error)]
pub enum RentError {
    #[error("Access denied")]
    UnknownTenant,

    #[error("Database error")]
    Database(#[from] SqlxError),
}
