pub mod auth;
pub mod session;

pub use jsonwebtoken::Algorithm;

pub use auth::{
    auth_middleware, build_verifier, extract_bearer, require_role, AuthGateway, Authenticated,
    CredentialVerifier, JwtVerifier, Rejection, RemoteVerifier, TokenIssuer,
};
pub use session::{
    MemoryRecordStore, NewSession, RecordStore, Session, SessionEvent, SessionManager, StoreError,
    StoreOp,
};

#[cfg(feature = "redis-session")]
pub use session::RedisRecordStore;
