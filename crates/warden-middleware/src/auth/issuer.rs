use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::Serialize;
use std::time::Duration;
use warden_core::{system_clock, AuthError, Result, SharedClock};

/// 签发的声明
#[derive(Debug, Serialize)]
struct IssuedClaims<'a> {
    sub: &'a str,
    email: &'a str,
    session_id: &'a str,
    iat: i64,
    exp: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    iss: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    aud: Option<&'a str>,
}

/// 令牌签发器
///
/// 登录服务在创建会话后用它签发绑定会话的令牌。
pub struct TokenIssuer {
    key: EncodingKey,
    algorithm: Algorithm,
    issuer: Option<String>,
    audience: Option<String>,
    clock: SharedClock,
}

impl TokenIssuer {
    /// HS256 签发器
    pub fn hs256(secret: &[u8]) -> Self {
        Self::build(EncodingKey::from_secret(secret), Algorithm::HS256)
    }

    pub fn from_secret(secret: &[u8], algorithm: Algorithm) -> Result<Self> {
        match algorithm {
            Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512 => {
                Ok(Self::build(EncodingKey::from_secret(secret), algorithm))
            }
            other => Err(AuthError::Config(format!(
                "{:?} is not a shared-secret algorithm",
                other
            ))),
        }
    }

    /// 从 PEM 私钥创建（RS* / PS* / ES* / EdDSA）
    pub fn from_pem(pem: &[u8], algorithm: Algorithm) -> Result<Self> {
        let key = match algorithm {
            Algorithm::RS256
            | Algorithm::RS384
            | Algorithm::RS512
            | Algorithm::PS256
            | Algorithm::PS384
            | Algorithm::PS512 => EncodingKey::from_rsa_pem(pem),
            Algorithm::ES256 | Algorithm::ES384 => EncodingKey::from_ec_pem(pem),
            Algorithm::EdDSA => EncodingKey::from_ed_pem(pem),
            Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512 => {
                return Err(AuthError::Config(format!(
                    "{:?} is not a public-key algorithm",
                    algorithm
                )))
            }
        }
        .map_err(|e| AuthError::Config(format!("invalid private key: {}", e)))?;

        Ok(Self::build(key, algorithm))
    }

    fn build(key: EncodingKey, algorithm: Algorithm) -> Self {
        Self {
            key,
            algorithm,
            issuer: None,
            audience: None,
            clock: system_clock(),
        }
    }

    pub fn with_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = Some(issuer.into());
        self
    }

    pub fn with_audience(mut self, audience: impl Into<String>) -> Self {
        self.audience = Some(audience.into());
        self
    }

    pub fn with_clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }

    /// 签发令牌
    pub fn issue(&self, user_id: &str, email: &str, session_id: &str, ttl: Duration) -> Result<String> {
        let now = self.clock.now();
        let exp = chrono::Duration::from_std(ttl)
            .ok()
            .and_then(|ttl| now.checked_add_signed(ttl))
            .ok_or_else(|| AuthError::Config(format!("token ttl out of range: {:?}", ttl)))?;

        let claims = IssuedClaims {
            sub: user_id,
            email,
            session_id,
            iat: now.timestamp(),
            exp: exp.timestamp(),
            iss: self.issuer.as_deref(),
            aud: self.audience.as_deref(),
        };

        encode(&Header::new(self.algorithm), &claims, &self.key)
            .map_err(|e| AuthError::Config(format!("failed to sign token: {}", e)))
    }
}
