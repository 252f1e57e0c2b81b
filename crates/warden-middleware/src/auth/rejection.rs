use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::{error, warn};
use warden_core::AuthError;

/// 网关拒绝请求的原因
///
/// 客户端只看到 401 或 503，具体原因只写进日志。
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("missing credential")]
    MissingCredential,

    #[error("malformed authorization header")]
    MalformedHeader,

    #[error("invalid credential: {0}")]
    InvalidCredential(AuthError),

    #[error("session expired or revoked")]
    SessionExpiredOrRevoked,

    #[error("auth service unavailable: {0}")]
    AuthServiceUnavailable(String),

    #[error("session store unavailable: {0}")]
    StoreUnavailable(String),
}

impl Rejection {
    pub fn kind(&self) -> &'static str {
        match self {
            Rejection::MissingCredential => "missing_credential",
            Rejection::MalformedHeader => "malformed_header",
            Rejection::InvalidCredential(err) => err.kind(),
            Rejection::SessionExpiredOrRevoked => "session_expired_or_revoked",
            Rejection::AuthServiceUnavailable(_) => "auth_service_unavailable",
            Rejection::StoreUnavailable(_) => "store_unavailable",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Rejection::AuthServiceUnavailable(_) | Rejection::StoreUnavailable(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            _ => StatusCode::UNAUTHORIZED,
        }
    }
}

impl From<AuthError> for Rejection {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::MissingCredential => Rejection::MissingCredential,
            AuthError::MalformedHeader => Rejection::MalformedHeader,
            AuthError::SessionExpiredOrRevoked => Rejection::SessionExpiredOrRevoked,
            AuthError::VerifierUnavailable(msg) | AuthError::Config(msg) => {
                Rejection::AuthServiceUnavailable(msg)
            }
            AuthError::StoreUnavailable(msg) => Rejection::StoreUnavailable(msg),
            credential @ (AuthError::MalformedToken(_)
            | AuthError::SignatureInvalid(_)
            | AuthError::Expired
            | AuthError::ClaimsRejected(_)) => Rejection::InvalidCredential(credential),
        }
    }
}

impl IntoResponse for Rejection {
    fn into_response(self) -> Response {
        let status = self.status();

        if status == StatusCode::SERVICE_UNAVAILABLE {
            error!(kind = self.kind(), error = %self, "Authentication dependency failed");
            return (status, Json(json!({ "error": "service unavailable" }))).into_response();
        }

        warn!(kind = self.kind(), error = %self, "Request rejected");
        (
            status,
            [(header::WWW_AUTHENTICATE, "Bearer")],
            Json(json!({ "error": "unauthorized" })),
        )
            .into_response()
    }
}
