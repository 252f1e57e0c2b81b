use anyhow::{anyhow, Result};
use config::{Config, Environment, File, FileFormat};
use std::path::{Path, PathBuf};

use crate::AppConfig;

/// 环境变量前缀，例如 `WARDEN__AUTH__SECRET`
pub const DEFAULT_ENV_PREFIX: &str = "WARDEN";

/// 配置加载器
///
/// 优先级从低到高：内置默认值、TOML 文件、环境变量。
pub struct ConfigLoader {
    path: Option<PathBuf>,
    env_prefix: String,
}

impl ConfigLoader {
    /// 从配置文件创建加载器（文件不存在时只用默认值和环境变量）
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: Some(path.as_ref().to_path_buf()),
            env_prefix: DEFAULT_ENV_PREFIX.to_string(),
        }
    }

    /// 不读文件
    pub fn without_file() -> Self {
        Self {
            path: None,
            env_prefix: DEFAULT_ENV_PREFIX.to_string(),
        }
    }

    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    /// 加载配置
    pub fn load(&self) -> Result<AppConfig> {
        let mut builder = Config::builder();

        if let Some(path) = &self.path {
            if path.exists() {
                builder = builder.add_source(File::new(
                    path.to_str().ok_or_else(|| anyhow!("Invalid config path"))?,
                    FileFormat::Toml,
                ));
            }
        }

        let config = builder
            .add_source(
                Environment::with_prefix(&self.env_prefix)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(config.try_deserialize()?)
    }

    /// 加载并验证配置
    pub fn validate(&self) -> Result<AppConfig> {
        let config = self.load()?;
        config.validate()?;
        Ok(config)
    }
}
