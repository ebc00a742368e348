use actix_web::{HttpResponse, ResponseError};
use std::fmt;

/// Error taxonomy for the billing domain. Every variant carries a
/// human-readable reason naming the offending entity so the boundary can
/// render a precise message.
#[derive(Debug)]
pub enum ServiceError {
    /// Malformed or out-of-range input.
    InvalidArgument(String),
    /// Referenced entity absent.
    NotFound(String),
    /// Duplicate unique key (code, plan name, active subscription).
    Conflict(String),
    /// Deletion blocked by a referencing active record or usage history.
    InUse(String),
    /// Operation not valid for the current lifecycle state.
    InvalidState(String),
    /// Overage attempted where the plan terms disallow it.
    UsageBlocked(String),
    DatabaseError(String),
    InternalError(String),
}

impl fmt::Display for ServiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceError::InvalidArgument(msg) => write!(f, "Invalid argument: {}", msg),
            ServiceError::NotFound(msg) => write!(f, "Not found: {}", msg),
            ServiceError::Conflict(msg) => write!(f, "Conflict: {}", msg),
            ServiceError::InUse(msg) => write!(f, "In use: {}", msg),
            ServiceError::InvalidState(msg) => write!(f, "Invalid state: {}", msg),
            ServiceError::UsageBlocked(msg) => write!(f, "Usage blocked: {}", msg),
            ServiceError::DatabaseError(msg) => write!(f, "Database error: {}", msg),
            ServiceError::InternalError(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl ResponseError for ServiceError {
    fn error_response(&self) -> HttpResponse {
        match self {
            ServiceError::InvalidArgument(msg) => {
                HttpResponse::BadRequest().json(serde_json::json!({
                    "error": "Invalid argument",
                    "message": msg
                }))
            }
            ServiceError::NotFound(msg) => HttpResponse::NotFound().json(serde_json::json!({
                "error": "Not found",
                "message": msg
            })),
            ServiceError::Conflict(msg) => HttpResponse::Conflict().json(serde_json::json!({
                "error": "Conflict",
                "message": msg
            })),
            ServiceError::InUse(msg) => HttpResponse::Conflict().json(serde_json::json!({
                "error": "In use",
                "message": msg
            })),
            ServiceError::InvalidState(msg) => HttpResponse::Conflict().json(serde_json::json!({
                "error": "Invalid state",
                "message": msg
            })),
            ServiceError::UsageBlocked(msg) => {
                HttpResponse::UnprocessableEntity().json(serde_json::json!({
                    "error": "Usage blocked",
                    "message": msg
                }))
            }
            ServiceError::DatabaseError(msg) => {
                HttpResponse::InternalServerError().json(serde_json::json!({
                    "error": "Database error",
                    "message": msg
                }))
            }
            ServiceError::InternalError(msg) => {
                HttpResponse::InternalServerError().json(serde_json::json!({
                    "error": "Internal server error",
                    "message": msg
                }))
            }
        }
    }
}

impl From<sqlx::Error> for ServiceError {
    fn from(err: sqlx::Error) -> Self {
        ServiceError::DatabaseError(err.to_string())
    }
}

impl ServiceError {
    /// Map a unique-constraint violation to `Conflict`, anything else to
    /// `DatabaseError`. Used where the schema backs a domain uniqueness rule
    /// (active subscription per user/plan, feature code, plan name).
    pub fn from_unique_violation(err: sqlx::Error, conflict_msg: &str) -> Self {
        if let sqlx::Error::Database(ref db_err) = err {
            if db_err.is_unique_violation() {
                return ServiceError::Conflict(conflict_msg.to_string());
            }
        }
        ServiceError::DatabaseError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::http::StatusCode;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (
                ServiceError::InvalidArgument("x".into()),
                StatusCode::BAD_REQUEST,
            ),
            (ServiceError::NotFound("x".into()), StatusCode::NOT_FOUND),
            (ServiceError::Conflict("x".into()), StatusCode::CONFLICT),
            (ServiceError::InUse("x".into()), StatusCode::CONFLICT),
            (ServiceError::InvalidState("x".into()), StatusCode::CONFLICT),
            (
                ServiceError::UsageBlocked("x".into()),
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (
                ServiceError::DatabaseError("x".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, expected) in cases {
            assert_eq!(err.error_response().status(), expected, "{err}");
        }
    }

    #[test]
    fn test_non_unique_violation_stays_database_error() {
        // Only a unique-constraint violation becomes Conflict; any other
        // database failure keeps its 500 classification.
        let err = ServiceError::from_unique_violation(sqlx::Error::RowNotFound, "taken");
        match err {
            ServiceError::DatabaseError(_) => {}
            other => panic!("expected DatabaseError, got {other}"),
        }
    }
}
