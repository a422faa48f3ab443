//! State and error envelope shared by the console JSON endpoints.

use std::sync::Arc;

use axum::{http::StatusCode, Json};
use serde::Serialize;
use tracing::error;
use uuid::Uuid;

use balcao_core::errors::{ApplicationError, DomainError, InterfaceError};
use balcao_db::{DbPool, RepositoryError};
use balcao_whatsapp::WhatsAppSender;

/// State shared by the console routers.
#[derive(Clone)]
pub struct ConsoleState {
    pub db_pool: DbPool,
    pub sender: Arc<dyn WhatsAppSender>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ApiError {
    pub error: String,
    pub correlation_id: String,
}

pub type ApiFailure = (StatusCode, Json<ApiError>);
pub type ApiResult<T> = Result<Json<T>, ApiFailure>;

pub fn correlation_id() -> String {
    format!("req-{}", Uuid::new_v4().simple())
}

/// Client errors carry their detail; server errors only the generic text.
pub fn interface_error(error: InterfaceError) -> ApiFailure {
    let (status, message) = match &error {
        InterfaceError::BadRequest { message, .. } => (StatusCode::BAD_REQUEST, message.clone()),
        InterfaceError::NotFound { message, .. } => (StatusCode::NOT_FOUND, message.clone()),
        InterfaceError::ServiceUnavailable { .. } => {
            (StatusCode::SERVICE_UNAVAILABLE, error.user_message().to_string())
        }
        InterfaceError::Internal { .. } => {
            (StatusCode::INTERNAL_SERVER_ERROR, error.user_message().to_string())
        }
    };
    (status, Json(ApiError { error: message, correlation_id: error.correlation_id().to_string() }))
}

pub fn repository_error(error: RepositoryError, correlation_id: &str) -> ApiFailure {
    error!(
        event_name = "api.repository.error",
        correlation_id,
        error = %error,
        "console repository error"
    );
    interface_error(ApplicationError::Persistence(error.to_string()).into_interface(correlation_id))
}

pub fn domain_error(error: DomainError, correlation_id: &str) -> ApiFailure {
    interface_error(ApplicationError::Domain(error).into_interface(correlation_id))
}

pub fn bad_request(message: impl Into<String>, correlation_id: &str) -> ApiFailure {
    interface_error(InterfaceError::BadRequest {
        message: message.into(),
        correlation_id: correlation_id.to_string(),
    })
}

pub fn not_found(message: impl Into<String>, correlation_id: &str) -> ApiFailure {
    interface_error(ApplicationError::NotFound(message.into()).into_interface(correlation_id))
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use balcao_db::RepositoryError;

    use super::{bad_request, not_found, repository_error};

    #[test]
    fn client_errors_keep_their_detail() {
        let (status, body) = bad_request("limit must be positive", "req-1");
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body.error, "limit must be positive");
        assert_eq!(body.correlation_id, "req-1");

        let (status, body) = not_found("conversation CONV-9", "req-2");
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body.error, "conversation CONV-9");
    }

    #[test]
    fn repository_errors_hide_internals() {
        let (status, body) =
            repository_error(RepositoryError::Decode("bad column".into()), "req-3");
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert!(!body.error.contains("bad column"));
        assert_eq!(body.correlation_id, "req-3");
    }
}
