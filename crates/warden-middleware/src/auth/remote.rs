use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};
use warden_core::{system_clock, AuthError, Claims, Result, SharedClock};

use super::verifier::{Audience, CredentialVerifier, RawClaims};

const VALIDATE_PATH: &str = "/api/v1/auth/validate";

#[derive(Debug, Serialize)]
struct ValidateRequest<'a> {
    token: &'a str,
}

/// 远程认证服务的响应
#[derive(Debug, Deserialize)]
struct ValidateResponse {
    valid: bool,
    #[serde(default)]
    user_id: Option<String>,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    session_id: Option<String>,
    #[serde(default)]
    exp: Option<i64>,
    #[serde(default)]
    iat: Option<i64>,
    #[serde(default)]
    iss: Option<String>,
    #[serde(default)]
    aud: Option<Audience>,
    #[serde(default)]
    error: Option<String>,
}

/// 委托远程认证服务校验令牌
///
/// 每次请求都调用远程服务，不缓存结果，也不重试。
pub struct RemoteVerifier {
    client: reqwest::Client,
    validate_url: String,
    clock: SharedClock,
}

impl RemoteVerifier {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AuthError::Config(format!("failed to build http client: {}", e)))?;

        Ok(Self {
            client,
            validate_url: format!("{}{}", base_url.trim_end_matches('/'), VALIDATE_PATH),
            clock: system_clock(),
        })
    }

    pub fn with_clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }

    pub fn validate_url(&self) -> &str {
        &self.validate_url
    }
}

#[async_trait]
impl CredentialVerifier for RemoteVerifier {
    async fn verify(&self, token: &str) -> Result<Claims> {
        let response = self
            .client
            .post(&self.validate_url)
            .json(&ValidateRequest { token })
            .send()
            .await
            .map_err(|e| {
                warn!(url = %self.validate_url, error = %e, "Auth service request failed");
                AuthError::VerifierUnavailable(e.to_string())
            })?;

        let status = response.status();
        if status.is_server_error() {
            return Err(AuthError::VerifierUnavailable(format!(
                "auth service returned {}",
                status
            )));
        }

        let verdict: ValidateResponse = response.json().await.map_err(|e| {
            AuthError::VerifierUnavailable(format!("undecodable auth service response: {}", e))
        })?;

        if verdict.valid && !status.is_success() {
            warn!(status = %status, "Auth service sent a positive verdict with an error status");
            return Err(AuthError::SignatureInvalid(format!(
                "auth service returned {}",
                status
            )));
        }

        if !verdict.valid {
            let code = verdict.error.unwrap_or_default();
            debug!(status = %status, error = %code, "Auth service rejected token");
            return Err(match code.as_str() {
                "expired" => AuthError::Expired,
                "malformed" => AuthError::MalformedToken("rejected by auth service".to_string()),
                _ => AuthError::SignatureInvalid(format!("rejected by auth service: {}", code)),
            });
        }

        RawClaims {
            sub: None,
            user_id: verdict.user_id,
            email: verdict.email,
            session_id: verdict.session_id,
            exp: verdict.exp,
            iat: verdict.iat,
            iss: verdict.iss,
            aud: verdict.aud,
        }
        .into_claims(self.clock.now())
    }

    fn strategy(&self) -> &'static str {
        "delegated"
    }
}
