use thiserror::Error;

/// 认证网关统一错误类型
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("Missing credential")]
    MissingCredential,

    #[error("Malformed authorization header")]
    MalformedHeader,

    #[error("Malformed token: {0}")]
    MalformedToken(String),

    #[error("Signature invalid: {0}")]
    SignatureInvalid(String),

    #[error("Token expired")]
    Expired,

    /// iss / aud 与配置不符
    #[error("Claims rejected: {0}")]
    ClaimsRejected(String),

    #[error("Session expired or revoked")]
    SessionExpiredOrRevoked,

    /// 远程认证服务不可达（可重试）
    #[error("Verifier unavailable: {0}")]
    VerifierUnavailable(String),

    /// 会话存储不可用（可重试）
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl AuthError {
    /// 日志用的稳定错误名
    pub fn kind(&self) -> &'static str {
        match self {
            AuthError::MissingCredential => "missing_credential",
            AuthError::MalformedHeader => "malformed_header",
            AuthError::MalformedToken(_) => "malformed_token",
            AuthError::SignatureInvalid(_) => "signature_invalid",
            AuthError::Expired => "expired",
            AuthError::ClaimsRejected(_) => "claims_rejected",
            AuthError::SessionExpiredOrRevoked => "session_expired_or_revoked",
            AuthError::VerifierUnavailable(_) => "verifier_unavailable",
            AuthError::StoreUnavailable(_) => "store_unavailable",
            AuthError::Config(_) => "config",
        }
    }

    /// 依赖故障（而非凭据问题）
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            AuthError::VerifierUnavailable(_) | AuthError::StoreUnavailable(_)
        )
    }
}

/// Result 类型别名
pub type Result<T> = std::result::Result<T, AuthError>;
