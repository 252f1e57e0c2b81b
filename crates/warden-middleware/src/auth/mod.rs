pub mod factory;
pub mod gateway;
pub mod issuer;
pub mod rejection;
pub mod remote;
pub mod verifier;

pub use factory::build_verifier;
pub use gateway::{auth_middleware, extract_bearer, require_role, AuthGateway, Authenticated};
pub use issuer::TokenIssuer;
pub use rejection::Rejection;
pub use remote::RemoteVerifier;
pub use verifier::{CredentialVerifier, JwtVerifier};
