use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// 应用配置
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub session: SessionConfig,
    pub store: StoreConfig,
    pub logging: LoggingConfig,
}

/// HTTP 服务配置
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

impl ServerConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// 凭据校验方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthStrategy {
    /// 对称密钥签名（HS*）
    #[default]
    SharedSecret,
    /// 公钥签名（RS* / PS* / ES*）
    PublicKey,
    /// 交给远程认证服务校验
    Delegated,
}

/// 认证配置
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthConfig {
    pub strategy: AuthStrategy,

    /// 签名算法，为空时 shared_secret 用 HS256，public_key 用 RS256
    pub algorithm: Option<String>,

    pub secret: Option<String>,

    /// PEM 内容，优先于 `public_key_path`
    pub public_key_pem: Option<String>,

    pub public_key_path: Option<PathBuf>,

    /// 远程认证服务地址
    pub base_url: Option<String>,

    /// 远程校验超时（毫秒）
    pub timeout_ms: u64,

    pub issuer: Option<String>,

    pub audience: Option<String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            strategy: AuthStrategy::SharedSecret,
            algorithm: None,
            secret: None,
            public_key_pem: None,
            public_key_path: None,
            base_url: None,
            timeout_ms: 5000,
            issuer: None,
            audience: None,
        }
    }
}

impl AuthConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// 读取公钥 PEM
    pub fn public_key_material(&self) -> Result<Option<Vec<u8>>> {
        if let Some(pem) = self.public_key_pem.as_deref().filter(|p| !p.trim().is_empty()) {
            return Ok(Some(pem.as_bytes().to_vec()));
        }

        match &self.public_key_path {
            Some(path) => std::fs::read(path)
                .map(Some)
                .with_context(|| format!("Failed to read public key {}", path.display())),
            None => Ok(None),
        }
    }
}

/// 会话配置
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SessionConfig {
    /// 默认会话有效期（秒）
    pub default_ttl_secs: u64,

    /// 是否在每次请求后异步刷新最后活跃时间
    pub heartbeat_enabled: bool,

    pub heartbeat_timeout_ms: u64,

    /// 内存存储的清理间隔（秒）
    pub purge_interval_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            default_ttl_secs: 86400,
            heartbeat_enabled: true,
            heartbeat_timeout_ms: 2000,
            purge_interval_secs: 300,
        }
    }
}

impl SessionConfig {
    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.default_ttl_secs)
    }

    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_millis(self.heartbeat_timeout_ms)
    }

    pub fn purge_interval(&self) -> Duration {
        Duration::from_secs(self.purge_interval_secs)
    }
}

/// 会话存储后端
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    #[default]
    Memory,
    Redis,
}

/// 存储配置
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    pub url: Option<String>,
    /// 单次存储操作超时（毫秒）
    pub op_timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Memory,
            url: None,
            op_timeout_ms: 1000,
        }
    }
}

impl StoreConfig {
    pub fn op_timeout(&self) -> Duration {
        Duration::from_millis(self.op_timeout_ms)
    }
}

/// 日志配置
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// pretty / compact / json
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

fn is_blank(value: &Option<String>) -> bool {
    value.as_deref().map_or(true, |v| v.trim().is_empty())
}

impl AppConfig {
    /// 验证配置
    pub fn validate(&self) -> Result<()> {
        match self.auth.strategy {
            AuthStrategy::SharedSecret => {
                if is_blank(&self.auth.secret) {
                    return Err(anyhow!("auth.secret is required for the shared_secret strategy"));
                }
            }
            AuthStrategy::PublicKey => {
                if is_blank(&self.auth.public_key_pem) && self.auth.public_key_path.is_none() {
                    return Err(anyhow!(
                        "auth.public_key_pem or auth.public_key_path is required for the public_key strategy"
                    ));
                }
            }
            AuthStrategy::Delegated => {
                if is_blank(&self.auth.base_url) {
                    return Err(anyhow!("auth.base_url is required for the delegated strategy"));
                }
                if self.auth.timeout_ms == 0 {
                    return Err(anyhow!("auth.timeout_ms must be greater than 0"));
                }
            }
        }

        if self.session.default_ttl_secs == 0 {
            return Err(anyhow!("session.default_ttl_secs must be greater than 0"));
        }
        if self.session.heartbeat_enabled && self.session.heartbeat_timeout_ms == 0 {
            return Err(anyhow!("session.heartbeat_timeout_ms must be greater than 0"));
        }
        if self.session.purge_interval_secs == 0 {
            return Err(anyhow!("session.purge_interval_secs must be greater than 0"));
        }

        if self.store.backend == StoreBackend::Redis && is_blank(&self.store.url) {
            return Err(anyhow!("store.url is required for the redis backend"));
        }
        if self.store.op_timeout_ms == 0 {
            return Err(anyhow!("store.op_timeout_ms must be greater than 0"));
        }

        if !matches!(self.logging.format.as_str(), "pretty" | "compact" | "json") {
            return Err(anyhow!(
                "logging.format must be one of pretty, compact, json (got {})",
                self.logging.format
            ));
        }

        Ok(())
    }
}
