use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{FromRedisValue, RedisError};
use std::future::Future;
use std::time::Duration;
use tracing::info;

use super::store::{RecordStore, StoreError, StoreOp, StoreResult};

const SCAN_BATCH: usize = 200;

/// Redis 存储
///
/// 过期交给 Redis 自己处理，`PX` 写入，`KEEPTTL` 覆盖。
#[derive(Clone)]
pub struct RedisRecordStore {
    conn: MultiplexedConnection,
    op_timeout: Duration,
}

impl RedisRecordStore {
    pub async fn connect(redis_url: &str, op_timeout: Duration) -> StoreResult<Self> {
        let client = redis::Client::open(redis_url).map_err(|e| map_redis_error(e, redis_url))?;
        let conn = match tokio::time::timeout(op_timeout, client.get_multiplexed_tokio_connection())
            .await
        {
            Ok(conn) => conn.map_err(|e| map_redis_error(e, redis_url))?,
            Err(_) => return Err(StoreError::Timeout(op_timeout)),
        };

        info!(op_timeout_ms = op_timeout.as_millis() as u64, "Connected to Redis");
        Ok(Self { conn, op_timeout })
    }

    async fn bounded<T, F>(&self, key: &str, fut: F) -> StoreResult<T>
    where
        F: Future<Output = Result<T, RedisError>>,
    {
        match tokio::time::timeout(self.op_timeout, fut).await {
            Ok(result) => result.map_err(|e| map_redis_error(e, key)),
            Err(_) => Err(StoreError::Timeout(self.op_timeout)),
        }
    }

    async fn query<T: FromRedisValue>(&self, key: &str, cmd: redis::Cmd) -> StoreResult<T> {
        let mut conn = self.conn.clone();
        self.bounded(key, async move { cmd.query_async::<_, T>(&mut conn).await })
            .await
    }
}

fn map_redis_error(err: RedisError, key: &str) -> StoreError {
    if err.code() == Some("WRONGTYPE") {
        StoreError::WrongType(key.to_string())
    } else {
        StoreError::Unavailable(err.to_string())
    }
}

fn ttl_millis(ttl: Duration) -> u64 {
    (ttl.as_millis() as u64).max(1)
}

/// 转义 glob 特殊字符，让前缀按字面匹配
fn escape_glob(prefix: &str) -> String {
    let mut escaped = String::with_capacity(prefix.len() + 1);
    for c in prefix.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('*');
    escaped
}

#[async_trait]
impl RecordStore for RedisRecordStore {
    async fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        let mut cmd = redis::cmd("GET");
        cmd.arg(key);
        self.query(key, cmd).await
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> StoreResult<()> {
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(value).arg("PX").arg(ttl_millis(ttl));
        self.query(key, cmd).await
    }

    async fn replace_keep_ttl(&self, key: &str, value: Vec<u8>) -> StoreResult<bool> {
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(value).arg("XX").arg("KEEPTTL");
        let reply: Option<String> = self.query(key, cmd).await?;
        Ok(reply.is_some())
    }

    async fn delete(&self, key: &str) -> StoreResult<bool> {
        let mut cmd = redis::cmd("DEL");
        cmd.arg(key);
        let removed: i64 = self.query(key, cmd).await?;
        Ok(removed > 0)
    }

    async fn exists(&self, key: &str) -> StoreResult<bool> {
        let mut cmd = redis::cmd("EXISTS");
        cmd.arg(key);
        let count: i64 = self.query(key, cmd).await?;
        Ok(count > 0)
    }

    async fn ttl_remaining(&self, key: &str) -> StoreResult<Option<Duration>> {
        let mut cmd = redis::cmd("PTTL");
        cmd.arg(key);
        let millis: i64 = self.query(key, cmd).await?;
        // -2 不存在，-1 无过期时间
        Ok((millis >= 0).then(|| Duration::from_millis(millis as u64)))
    }

    async fn scan_keys(&self, prefix: &str) -> StoreResult<Vec<String>> {
        let pattern = escape_glob(prefix);
        let mut keys = Vec::new();
        let mut cursor: u64 = 0;

        loop {
            let mut cmd = redis::cmd("SCAN");
            cmd.arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH);
            let (next, batch): (u64, Vec<String>) = self.query(prefix, cmd).await?;
            keys.extend(batch);

            if next == 0 {
                break;
            }
            cursor = next;
        }

        // SCAN 可能重复返回同一个键
        keys.sort();
        keys.dedup();
        Ok(keys)
    }

    async fn set_members(&self, key: &str) -> StoreResult<Vec<String>> {
        let mut cmd = redis::cmd("SMEMBERS");
        cmd.arg(key);
        self.query(key, cmd).await
    }

    async fn apply(&self, ops: Vec<StoreOp>) -> StoreResult<()> {
        if ops.is_empty() {
            return Ok(());
        }

        let mut pipe = redis::pipe();
        pipe.atomic();
        for op in &ops {
            match op {
                StoreOp::Set { key, value, ttl } => {
                    pipe.cmd("SET")
                        .arg(key)
                        .arg(value.as_slice())
                        .arg("PX")
                        .arg(ttl_millis(*ttl))
                        .ignore();
                }
                StoreOp::Delete { key } => {
                    pipe.cmd("DEL").arg(key).ignore();
                }
                StoreOp::AddMember { key, member } => {
                    pipe.cmd("SADD").arg(key).arg(member).ignore();
                }
                StoreOp::RemoveMember { key, member } => {
                    pipe.cmd("SREM").arg(key).arg(member).ignore();
                }
                StoreOp::Expire { key, ttl } => {
                    pipe.cmd("PEXPIRE").arg(key).arg(ttl_millis(*ttl)).ignore();
                }
            }
        }

        let mut conn = self.conn.clone();
        self.bounded("batch", async move { pipe.query_async::<_, ()>(&mut conn).await })
            .await
    }
}
