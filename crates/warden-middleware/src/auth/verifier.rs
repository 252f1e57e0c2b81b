use async_trait::async_trait;
use chrono::{DateTime, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use warden_core::{system_clock, AuthError, Claims, Result, SharedClock};

use crate::session::is_valid_session_id;

/// 凭据校验 trait
///
/// 实现方式由配置决定，而不是由令牌头决定。
#[async_trait]
pub trait CredentialVerifier: Send + Sync {
    /// 校验令牌并返回声明
    async fn verify(&self, token: &str) -> Result<Claims>;

    /// 日志用的策略名
    fn strategy(&self) -> &'static str;
}

/// `aud` 既可以是字符串也可以是数组
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub(crate) enum Audience {
    One(String),
    Many(Vec<String>),
}

impl Audience {
    fn into_vec(self) -> Vec<String> {
        match self {
            Audience::One(aud) => vec![aud],
            Audience::Many(auds) => auds,
        }
    }
}

/// 未经整理的声明
///
/// 旧签发方只带 `user_id`，没有 `sub`。
#[derive(Debug, Default, Deserialize)]
pub(crate) struct RawClaims {
    pub sub: Option<String>,
    pub user_id: Option<String>,
    pub email: Option<String>,
    pub session_id: Option<String>,
    pub exp: Option<i64>,
    pub iat: Option<i64>,
    pub iss: Option<String>,
    pub aud: Option<Audience>,
}

impl RawClaims {
    /// 检查必需声明和过期时间（无宽限）
    pub(crate) fn into_claims(self, now: DateTime<Utc>) -> Result<Claims> {
        let user_id = self
            .sub
            .or(self.user_id)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| AuthError::MalformedToken("missing subject".to_string()))?;
        let exp = self
            .exp
            .ok_or_else(|| AuthError::MalformedToken("missing exp".to_string()))?;
        let session_id = self
            .session_id
            .ok_or_else(|| AuthError::MalformedToken("missing session_id".to_string()))?;
        if !is_valid_session_id(&session_id) {
            return Err(AuthError::MalformedToken("invalid session_id".to_string()));
        }

        if exp <= now.timestamp() {
            return Err(AuthError::Expired);
        }

        Ok(Claims {
            user_id,
            email: self.email.unwrap_or_default(),
            session_id,
            exp,
            iat: self.iat,
            iss: self.iss,
            aud: self.aud.map(Audience::into_vec).unwrap_or_default(),
        })
    }
}

fn map_jwt_error(err: jsonwebtoken::errors::Error) -> AuthError {
    match err.kind() {
        ErrorKind::InvalidSignature
        | ErrorKind::InvalidAlgorithm
        | ErrorKind::InvalidRsaKey(_)
        | ErrorKind::InvalidEcdsaKey
        | ErrorKind::InvalidKeyFormat => AuthError::SignatureInvalid(err.to_string()),
        ErrorKind::ExpiredSignature => AuthError::Expired,
        ErrorKind::InvalidIssuer | ErrorKind::InvalidAudience => {
            AuthError::ClaimsRejected(err.to_string())
        }
        ErrorKind::MissingRequiredClaim(claim) if claim == "iss" || claim == "aud" => {
            AuthError::ClaimsRejected(err.to_string())
        }
        _ => AuthError::MalformedToken(err.to_string()),
    }
}

fn is_hmac(algorithm: Algorithm) -> bool {
    matches!(algorithm, Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512)
}

/// 按算法族从 PEM 解析校验密钥
fn decoding_key_from_pem(pem: &[u8], algorithm: Algorithm) -> Result<DecodingKey> {
    let key = match algorithm {
        Algorithm::RS256
        | Algorithm::RS384
        | Algorithm::RS512
        | Algorithm::PS256
        | Algorithm::PS384
        | Algorithm::PS512 => DecodingKey::from_rsa_pem(pem),
        Algorithm::ES256 | Algorithm::ES384 => DecodingKey::from_ec_pem(pem),
        Algorithm::EdDSA => DecodingKey::from_ed_pem(pem),
        Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512 => {
            return Err(AuthError::Config(format!(
                "{:?} is not a public-key algorithm",
                algorithm
            )))
        }
    };
    key.map_err(|e| AuthError::Config(format!("invalid public key: {}", e)))
}

/// 本地 JWT 校验（对称密钥或公钥）
pub struct JwtVerifier {
    key: DecodingKey,
    algorithm: Algorithm,
    issuer: Option<String>,
    audience: Option<String>,
    clock: SharedClock,
    strategy: &'static str,
}

impl JwtVerifier {
    /// 对称密钥校验（HS256 / HS384 / HS512）
    pub fn shared_secret(secret: &[u8], algorithm: Algorithm) -> Result<Self> {
        if !is_hmac(algorithm) {
            return Err(AuthError::Config(format!(
                "{:?} is not a shared-secret algorithm",
                algorithm
            )));
        }
        if secret.is_empty() {
            return Err(AuthError::Config("shared secret must not be empty".to_string()));
        }

        Ok(Self::build(
            DecodingKey::from_secret(secret),
            algorithm,
            "shared_secret",
        ))
    }

    /// 公钥校验（RS* / PS* / ES* / EdDSA）
    pub fn public_key(pem: &[u8], algorithm: Algorithm) -> Result<Self> {
        let key = decoding_key_from_pem(pem, algorithm)?;
        Ok(Self::build(key, algorithm, "public_key"))
    }

    fn build(key: DecodingKey, algorithm: Algorithm, strategy: &'static str) -> Self {
        Self {
            key,
            algorithm,
            issuer: None,
            audience: None,
            clock: system_clock(),
            strategy,
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

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    fn validation(&self) -> Validation {
        // 只接受配置的算法；exp 由注入的时钟检查
        let mut validation = Validation::new(self.algorithm);
        validation.validate_exp = false;
        validation.leeway = 0;
        validation.required_spec_claims.clear();

        if let Some(issuer) = &self.issuer {
            validation.set_issuer(&[issuer]);
        }
        match &self.audience {
            Some(audience) => validation.set_audience(&[audience]),
            None => validation.validate_aud = false,
        }
        validation
    }

    /// 同步校验
    pub fn verify_sync(&self, token: &str) -> Result<Claims> {
        let data = decode::<RawClaims>(token, &self.key, &self.validation()).map_err(map_jwt_error)?;
        data.claims.into_claims(self.clock.now())
    }
}

#[async_trait]
impl CredentialVerifier for JwtVerifier {
    async fn verify(&self, token: &str) -> Result<Claims> {
        self.verify_sync(token)
    }

    fn strategy(&self) -> &'static str {
        self.strategy
    }
}
