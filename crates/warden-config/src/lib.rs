pub mod app;
pub mod loader;

pub use app::{
    AppConfig, AuthConfig, AuthStrategy, LoggingConfig, ServerConfig, SessionConfig, StoreBackend,
    StoreConfig,
};
pub use loader::{ConfigLoader, DEFAULT_ENV_PREFIX};
