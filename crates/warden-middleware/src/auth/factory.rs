use jsonwebtoken::Algorithm;
use std::str::FromStr;
use std::sync::Arc;
use tracing::info;
use warden_config::{AuthConfig, AuthStrategy};
use warden_core::{AuthError, Result, SharedClock};

use super::{CredentialVerifier, JwtVerifier, RemoteVerifier};

fn parse_algorithm(config: &AuthConfig, default: Algorithm) -> Result<Algorithm> {
    match config.algorithm.as_deref() {
        // jsonwebtoken 只认 "EdDSA" 这一种写法
        Some(name) if name.eq_ignore_ascii_case("eddsa") => Ok(Algorithm::EdDSA),
        Some(name) => Algorithm::from_str(&name.to_ascii_uppercase())
            .map_err(|_| AuthError::Config(format!("unknown signing algorithm: {}", name))),
        None => Ok(default),
    }
}

fn pin_claims(mut verifier: JwtVerifier, config: &AuthConfig) -> JwtVerifier {
    if let Some(issuer) = &config.issuer {
        verifier = verifier.with_issuer(issuer.clone());
    }
    if let Some(audience) = &config.audience {
        verifier = verifier.with_audience(audience.clone());
    }
    verifier
}

/// 按配置构建凭据校验器
pub fn build_verifier(config: &AuthConfig, clock: SharedClock) -> Result<Arc<dyn CredentialVerifier>> {
    let verifier: Arc<dyn CredentialVerifier> = match config.strategy {
        AuthStrategy::SharedSecret => {
            let algorithm = parse_algorithm(config, Algorithm::HS256)?;
            let secret = config
                .secret
                .as_deref()
                .ok_or_else(|| AuthError::Config("auth.secret is not set".to_string()))?;
            let verifier = JwtVerifier::shared_secret(secret.as_bytes(), algorithm)?.with_clock(clock);
            Arc::new(pin_claims(verifier, config))
        }
        AuthStrategy::PublicKey => {
            let algorithm = parse_algorithm(config, Algorithm::RS256)?;
            let pem = config
                .public_key_material()
                .map_err(|e| AuthError::Config(format!("{:#}", e)))?
                .ok_or_else(|| AuthError::Config("auth public key is not set".to_string()))?;
            let verifier = JwtVerifier::public_key(&pem, algorithm)?.with_clock(clock);
            Arc::new(pin_claims(verifier, config))
        }
        AuthStrategy::Delegated => {
            let base_url = config
                .base_url
                .as_deref()
                .ok_or_else(|| AuthError::Config("auth.base_url is not set".to_string()))?;
            Arc::new(RemoteVerifier::new(base_url, config.timeout())?.with_clock(clock))
        }
    };

    info!(strategy = verifier.strategy(), "Credential verifier ready");
    Ok(verifier)
}
