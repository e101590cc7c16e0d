use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Domain errors, decoded once at the HTTP boundary.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    /// Wrap an infrastructure failure; the detail is logged, never sent to
    /// the client.
    pub fn internal<E: std::fmt::Display>(e: E) -> Self {
        ApiError::Internal(e.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Validation(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ApiError::Internal(detail) => {
                tracing::error!(error = %detail, "internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        let body = json!({ "success": false, "message": message });
        (status, Json(body)).into_response()
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => ApiError::NotFound("User not found".into()),
            sqlx::Error::Database(db_err) => {
                map_database_error(db_err.code().as_deref(), &db_err.to_string())
            }
            _ => ApiError::Internal(format!("database error: {}", err)),
        }
    }
}

/// 23505: unique violation. users.email is the only unique constraint, so a
/// concurrent duplicate registration lands here.
fn map_database_error(code: Option<&str>, detail: &str) -> ApiError {
    if code == Some("23505") {
        ApiError::Conflict("Email already registered".into())
    } else {
        ApiError::Internal(format!("database error: {}", detail))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_match_taxonomy() {
        let cases = [
            (ApiError::Validation("v".into()), StatusCode::BAD_REQUEST),
            (ApiError::Unauthorized("u".into()), StatusCode::UNAUTHORIZED),
            (ApiError::Forbidden("f".into()), StatusCode::FORBIDDEN),
            (ApiError::NotFound("n".into()), StatusCode::NOT_FOUND),
            (ApiError::Conflict("c".into()), StatusCode::CONFLICT),
            (
                ApiError::Internal("i".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(err.into_response().status(), status);
        }
    }

    #[test]
    fn internal_hides_detail_from_display() {
        // Display carries the detail for the log; the HTTP body does not.
        let err = ApiError::Internal("connection refused".into());
        assert_eq!(err.to_string(), "connection refused");
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn row_not_found_maps_to_not_found() {
        let err: ApiError = sqlx::Error::RowNotFound.into();
        match err {
            ApiError::NotFound(msg) => assert_eq!(msg, "User not found"),
            other => panic!("expected NotFound, got {:?}", other),
        }
    }

    #[test]
    fn unique_violation_maps_to_conflict() {
        // The race branch: a concurrent duplicate registration surfaces as
        // the same 409 the pre-check produces.
        let err = map_database_error(Some("23505"), "duplicate key value");
        match err {
            ApiError::Conflict(msg) => assert!(msg.contains("already registered")),
            other => panic!("expected Conflict, got {:?}", other),
        }
    }

    #[test]
    fn other_database_codes_stay_internal() {
        assert!(matches!(
            map_database_error(Some("23503"), "fk violation"),
            ApiError::Internal(_)
        ));
        assert!(matches!(
            map_database_error(None, "connection reset"),
            ApiError::Internal(_)
        ));
    }
}
