use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;
use warden_core::AuthError;

/// 存储错误
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("store operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("wrong value type at key {0}")]
    WrongType(String),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

impl From<StoreError> for AuthError {
    fn from(err: StoreError) -> Self {
        AuthError::StoreUnavailable(err.to_string())
    }
}

/// 原子批量操作中的单个写操作
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreOp {
    Set {
        key: String,
        value: Vec<u8>,
        ttl: Duration,
    },
    Delete {
        key: String,
    },
    AddMember {
        key: String,
        member: String,
    },
    RemoveMember {
        key: String,
        member: String,
    },
    /// 重设已有键的 TTL；键不存在时什么也不做
    Expire {
        key: String,
        ttl: Duration,
    },
}

/// 带 TTL 的键值存储 trait
///
/// 只供会话管理器使用。过期的键和不存在的键没有区别。
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// 读取值
    async fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>>;

    /// 写入完整的值和 TTL
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> StoreResult<()>;

    /// 仅在键存在时覆盖值，保留剩余 TTL；键不存在返回 false
    async fn replace_keep_ttl(&self, key: &str, value: Vec<u8>) -> StoreResult<bool>;

    /// 删除键，返回键此前是否存在
    async fn delete(&self, key: &str) -> StoreResult<bool>;

    /// 检查键是否存在
    async fn exists(&self, key: &str) -> StoreResult<bool>;

    /// 剩余 TTL；键不存在或没有过期时间时为 None
    async fn ttl_remaining(&self, key: &str) -> StoreResult<Option<Duration>>;

    /// 按前缀列出键
    ///
    /// 不保证与并发写入一致：键可能被漏掉，也可能在随后读取时已经消失。
    async fn scan_keys(&self, prefix: &str) -> StoreResult<Vec<String>>;

    /// 读取集合成员
    async fn set_members(&self, key: &str) -> StoreResult<Vec<String>>;

    /// 原子地执行一组写操作
    async fn apply(&self, ops: Vec<StoreOp>) -> StoreResult<()>;
}
