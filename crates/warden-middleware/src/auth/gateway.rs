use axum::{
    async_trait,
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use warden_core::Principal;

use super::{CredentialVerifier, Rejection};
use crate::session::SessionManager;

const DEFAULT_HEARTBEAT_TIMEOUT: Duration = Duration::from_secs(2);

/// 认证网关
///
/// 令牌 → 声明 → 会话 → `Principal`，任何一步失败都直接拒绝。
pub struct AuthGateway {
    verifier: Arc<dyn CredentialVerifier>,
    sessions: Arc<SessionManager>,
    heartbeat_enabled: bool,
    heartbeat_timeout: Duration,
}

impl AuthGateway {
    pub fn new(verifier: Arc<dyn CredentialVerifier>, sessions: Arc<SessionManager>) -> Self {
        Self {
            verifier,
            sessions,
            heartbeat_enabled: true,
            heartbeat_timeout: DEFAULT_HEARTBEAT_TIMEOUT,
        }
    }

    pub fn with_heartbeat(mut self, enabled: bool, timeout: Duration) -> Self {
        self.heartbeat_enabled = enabled;
        self.heartbeat_timeout = timeout;
        self
    }

    pub fn sessions(&self) -> &Arc<SessionManager> {
        &self.sessions
    }

    /// 认证请求头
    pub async fn authenticate(&self, headers: &HeaderMap) -> Result<Principal, Rejection> {
        let token = extract_bearer(headers)?;

        let claims = self.verifier.verify(token).await.map_err(Rejection::from)?;

        let session = self
            .sessions
            .get(&claims.session_id)
            .await
            .map_err(Rejection::from)?
            .ok_or(Rejection::SessionExpiredOrRevoked)?;

        // 令牌不能借用别人的会话
        if session.user_id != claims.user_id {
            warn!(
                session_id = %session.session_id,
                token_user = %claims.user_id,
                "Token subject does not own the session"
            );
            return Err(Rejection::SessionExpiredOrRevoked);
        }

        if self.heartbeat_enabled {
            self.schedule_touch(session.session_id.clone());
        }

        Ok(session.principal())
    }

    /// 后台刷新会话，不阻塞请求
    fn schedule_touch(&self, session_id: String) {
        let sessions = Arc::clone(&self.sessions);
        let timeout = self.heartbeat_timeout;

        tokio::spawn(async move {
            if tokio::time::timeout(timeout, sessions.touch(&session_id))
                .await
                .is_err()
            {
                debug!(session_id = %session_id, "Heartbeat timed out");
            }
        });
    }
}

/// 提取 `Authorization: Bearer <token>`
pub fn extract_bearer(headers: &HeaderMap) -> Result<&str, Rejection> {
    let value = headers
        .get(header::AUTHORIZATION)
        .ok_or(Rejection::MissingCredential)?;

    // 非 ASCII 头直接拒绝
    let value = value.to_str().map_err(|_| Rejection::MalformedHeader)?;

    let (scheme, token) = value
        .trim()
        .split_once(' ')
        .ok_or(Rejection::MalformedHeader)?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return Err(Rejection::MalformedHeader);
    }

    let token = token.trim();
    if token.is_empty() || token.contains(char::is_whitespace) {
        return Err(Rejection::MalformedHeader);
    }
    Ok(token)
}

/// 认证中间件
pub async fn auth_middleware(
    State(gateway): State<Arc<AuthGateway>>,
    mut req: Request,
    next: Next,
) -> Response {
    match gateway.authenticate(req.headers()).await {
        Ok(principal) => {
            // 将 principal 注入到 request extensions
            req.extensions_mut().insert(principal);
            next.run(req).await
        }
        Err(rejection) => rejection.into_response(),
    }
}

/// 已认证的身份
pub struct Authenticated(pub Principal);

#[async_trait]
impl<S> FromRequestParts<S> for Authenticated
where
    S: Send + Sync,
{
    type Rejection = Rejection;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Principal>()
            .cloned()
            .map(Authenticated)
            .ok_or(Rejection::MissingCredential)
    }
}

type MiddlewareFuture = Pin<Box<dyn Future<Output = Response> + Send>>;

/// 角色检查中间件生成器
///
/// 必须挂在 `auth_middleware` 之后。
pub fn require_role(role: &'static str) -> impl Fn(Request, Next) -> MiddlewareFuture + Clone {
    move |req: Request, next: Next| -> MiddlewareFuture {
        Box::pin(async move {
            let allowed = req
                .extensions()
                .get::<Principal>()
                .map(|principal| principal.has_role(role));

            match allowed {
                None => Rejection::MissingCredential.into_response(),
                Some(false) => {
                    warn!(role = role, "Missing required role");
                    (StatusCode::FORBIDDEN, Json(json!({ "error": "forbidden" }))).into_response()
                }
                Some(true) => next.run(req).await,
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(value: &[u8]) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_bytes(value).unwrap());
        headers
    }

    #[test]
    fn test_extract_bearer() {
        assert_eq!(extract_bearer(&headers(b"Bearer abc.def")).unwrap(), "abc.def");
        assert_eq!(extract_bearer(&headers(b"bearer abc")).unwrap(), "abc");
        assert_eq!(extract_bearer(&headers(b"BEARER   abc  ")).unwrap(), "abc");
    }

    #[test]
    fn test_extract_bearer_rejections() {
        assert_eq!(
            extract_bearer(&HeaderMap::new()),
            Err(Rejection::MissingCredential)
        );
        assert_eq!(
            extract_bearer(&headers(b"Basic dXNlcjpwYXNz")),
            Err(Rejection::MalformedHeader)
        );
        assert_eq!(extract_bearer(&headers(b"Bearer")), Err(Rejection::MalformedHeader));
        assert_eq!(extract_bearer(&headers(b"Bearer ")), Err(Rejection::MalformedHeader));
        assert_eq!(
            extract_bearer(&headers(b"Bearer a b")),
            Err(Rejection::MalformedHeader)
        );
        assert_eq!(
            extract_bearer(&headers("Bearer t\u{f6}ken".as_bytes())),
            Err(Rejection::MalformedHeader)
        );
    }
}
