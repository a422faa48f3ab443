//! Bearer token check in front of the console routers.

use axum::{
    extract::{Request, State},
    http::{
        header::{AUTHORIZATION, WWW_AUTHENTICATE},
        StatusCode,
    },
    middleware::{self, Next},
    response::{IntoResponse, Response},
    Json, Router,
};
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, warn};

use balcao_whatsapp::constant_time_eq;

use crate::api::{correlation_id, ApiError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthResult {
    Allowed,
    Denied { reason: &'static str },
}

#[derive(Clone)]
pub struct ConsoleAuth {
    token: SecretString,
}

impl ConsoleAuth {
    pub fn new(token: SecretString) -> Self {
        Self { token }
    }

    /// Checks an `Authorization` header value.
    pub fn validate_request(&self, authorization: Option<&str>) -> AuthResult {
        let Some(header) = authorization else {
            return AuthResult::Denied { reason: "missing authorization header" };
        };
        let Some(presented) = header.strip_prefix("Bearer ").map(str::trim) else {
            return AuthResult::Denied { reason: "authorization scheme must be Bearer" };
        };

        let expected = self.token.expose_secret();
        if expected.is_empty() || !constant_time_eq(presented.as_bytes(), expected.as_bytes()) {
            return AuthResult::Denied { reason: "console token mismatch" };
        }

        debug!(event_name = "console.auth.allowed", "console request authenticated");
        AuthResult::Allowed
    }
}

/// Wraps `router` so every route requires the console token.
pub fn protect(router: Router, auth: ConsoleAuth) -> Router {
    router.layer(middleware::from_fn_with_state(auth, require_token))
}

async fn require_token(State(auth): State<ConsoleAuth>, request: Request, next: Next) -> Response {
    let authorization = request.headers().get(AUTHORIZATION).and_then(|value| value.to_str().ok());
    match auth.validate_request(authorization) {
        AuthResult::Allowed => next.run(request).await,
        AuthResult::Denied { reason } => {
            let correlation_id = correlation_id();
            warn!(
                event_name = "console.auth.denied",
                correlation_id = %correlation_id,
                path = %request.uri().path(),
                reason,
                "console request rejected"
            );
            let body = ApiError { error: "missing or invalid console token".to_string(), correlation_id };
            (StatusCode::UNAUTHORIZED, [(WWW_AUTHENTICATE, "Bearer")], Json(body)).into_response()
        }
    }
}
