use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info};
use warden_core::{system_clock, SharedClock};

use super::store::{RecordStore, StoreError, StoreOp, StoreResult};

enum Slot {
    Bytes(Vec<u8>),
    Members(BTreeSet<String>),
}

struct Entry {
    slot: Slot,
    expires_at: Option<DateTime<Utc>>,
}

impl Entry {
    fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map_or(true, |at| at > now)
    }
}

/// 内存存储（用于开发和测试）
///
/// 过期由注入的时钟决定：读取时惰性剔除，`purge_expired` 批量清理。
pub struct MemoryRecordStore {
    entries: Arc<RwLock<HashMap<String, Entry>>>,
    clock: SharedClock,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::with_clock(system_clock())
    }

    pub fn with_clock(clock: SharedClock) -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            clock,
        }
    }

    fn expiry(&self, ttl: Duration) -> DateTime<Utc> {
        let ttl =
            chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::days(36_500));
        self.clock
            .now()
            .checked_add_signed(ttl)
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    /// 清理过期键
    pub async fn purge_expired(&self) -> u64 {
        let now = self.clock.now();
        let mut entries = self.entries.write().await;
        let before_count = entries.len();

        entries.retain(|_, entry| entry.is_live(now));

        (before_count - entries.len()) as u64
    }

    /// 启动定期清理任务
    pub fn spawn_purge_task(self: &Arc<Self>, every: Duration) -> JoinHandle<()> {
        let store = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            loop {
                interval.tick().await;

                let removed = store.purge_expired().await;
                if removed > 0 {
                    info!(removed = removed, "Purged expired records");
                } else {
                    debug!("No expired records to purge");
                }
            }
        })
    }

    fn apply_locked(&self, entries: &mut HashMap<String, Entry>, op: StoreOp) {
        let now = self.clock.now();
        match op {
            StoreOp::Set { key, value, ttl } => {
                entries.insert(
                    key,
                    Entry {
                        slot: Slot::Bytes(value),
                        expires_at: Some(self.expiry(ttl)),
                    },
                );
            }
            StoreOp::Delete { key } => {
                entries.remove(&key);
            }
            StoreOp::AddMember { key, member } => {
                let live = entries.get(&key).map_or(false, |e| e.is_live(now));
                if !live {
                    entries.remove(&key);
                }
                let entry = entries.entry(key).or_insert_with(|| Entry {
                    slot: Slot::Members(BTreeSet::new()),
                    expires_at: None,
                });
                if let Slot::Members(members) = &mut entry.slot {
                    members.insert(member);
                }
            }
            StoreOp::RemoveMember { key, member } => {
                let now_empty = match entries.get_mut(&key) {
                    Some(Entry {
                        slot: Slot::Members(members),
                        ..
                    }) => {
                        members.remove(&member);
                        members.is_empty()
                    }
                    _ => false,
                };
                // 空集合不保留
                if now_empty {
                    entries.remove(&key);
                }
            }
            StoreOp::Expire { key, ttl } => {
                let live = entries.get(&key).map(|e| e.is_live(now));
                match live {
                    Some(true) => {
                        let expires_at = self.expiry(ttl);
                        if let Some(entry) = entries.get_mut(&key) {
                            entry.expires_at = Some(expires_at);
                        }
                    }
                    Some(false) => {
                        entries.remove(&key);
                    }
                    None => {}
                }
            }
        }
    }

    /// 按顺序推演整批操作，发现类型冲突时整批拒绝
    fn validate_batch(
        entries: &HashMap<String, Entry>,
        ops: &[StoreOp],
        now: DateTime<Utc>,
    ) -> StoreResult<()> {
        // true 表示字节值，false 表示集合，None 表示不存在
        let mut shadow: HashMap<&str, Option<bool>> = HashMap::new();
        for op in ops {
            let (key, effect) = match op {
                StoreOp::Set { key, .. } => (key, Some(true)),
                StoreOp::Delete { key } => (key, None),
                StoreOp::AddMember { key, .. } | StoreOp::RemoveMember { key, .. } => {
                    (key, Some(false))
                }
                // 不改变值的类型
                StoreOp::Expire { .. } => continue,
            };
            let current = match shadow.get(key.as_str()) {
                Some(kind) => *kind,
                None => entries
                    .get(key)
                    .filter(|e| e.is_live(now))
                    .map(|e| matches!(e.slot, Slot::Bytes(_))),
            };
            if effect == Some(false) && current == Some(true) {
                return Err(StoreError::WrongType(key.clone()));
            }
            shadow.insert(key.as_str(), effect);
        }
        Ok(())
    }
}

impl Default for MemoryRecordStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        let now = self.clock.now();
        let entries = self.entries.read().await;
        match entries.get(key) {
            Some(entry) if entry.is_live(now) => match &entry.slot {
                Slot::Bytes(bytes) => Ok(Some(bytes.clone())),
                Slot::Members(_) => Err(StoreError::WrongType(key.to_string())),
            },
            _ => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> StoreResult<()> {
        let mut entries = self.entries.write().await;
        self.apply_locked(
            &mut entries,
            StoreOp::Set {
                key: key.to_string(),
                value,
                ttl,
            },
        );
        Ok(())
    }

    async fn replace_keep_ttl(&self, key: &str, value: Vec<u8>) -> StoreResult<bool> {
        let now = self.clock.now();
        let mut entries = self.entries.write().await;
        match entries.get(key).map(|e| e.is_live(now)) {
            None => Ok(false),
            Some(false) => {
                entries.remove(key);
                Ok(false)
            }
            Some(true) => match entries.get_mut(key).map(|e| &mut e.slot) {
                Some(Slot::Bytes(bytes)) => {
                    *bytes = value;
                    Ok(true)
                }
                _ => Err(StoreError::WrongType(key.to_string())),
            },
        }
    }

    async fn delete(&self, key: &str) -> StoreResult<bool> {
        let now = self.clock.now();
        let mut entries = self.entries.write().await;
        Ok(entries.remove(key).map_or(false, |e| e.is_live(now)))
    }

    async fn exists(&self, key: &str) -> StoreResult<bool> {
        let now = self.clock.now();
        let entries = self.entries.read().await;
        Ok(entries.get(key).map_or(false, |e| e.is_live(now)))
    }

    async fn ttl_remaining(&self, key: &str) -> StoreResult<Option<Duration>> {
        let now = self.clock.now();
        let entries = self.entries.read().await;
        Ok(entries
            .get(key)
            .filter(|e| e.is_live(now))
            .and_then(|e| e.expires_at)
            .and_then(|at| (at - now).to_std().ok()))
    }

    async fn scan_keys(&self, prefix: &str) -> StoreResult<Vec<String>> {
        let now = self.clock.now();
        let entries = self.entries.read().await;
        Ok(entries
            .iter()
            .filter(|(key, entry)| key.starts_with(prefix) && entry.is_live(now))
            .map(|(key, _)| key.clone())
            .collect())
    }

    async fn set_members(&self, key: &str) -> StoreResult<Vec<String>> {
        let now = self.clock.now();
        let entries = self.entries.read().await;
        match entries.get(key) {
            Some(entry) if entry.is_live(now) => match &entry.slot {
                Slot::Members(members) => Ok(members.iter().cloned().collect()),
                Slot::Bytes(_) => Err(StoreError::WrongType(key.to_string())),
            },
            _ => Ok(Vec::new()),
        }
    }

    async fn apply(&self, ops: Vec<StoreOp>) -> StoreResult<()> {
        let mut entries = self.entries.write().await;

        // 先整体校验，保证要么全部生效要么都不生效
        Self::validate_batch(&entries, &ops, self.clock.now())?;
        for op in ops {
            self.apply_locked(&mut entries, op);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use warden_core::ManualClock;

    fn store_with_clock() -> (MemoryRecordStore, Arc<ManualClock>) {
        let clock = ManualClock::starting_now();
        (MemoryRecordStore::with_clock(clock.clone()), clock)
    }

    #[tokio::test]
    async fn test_memory_store() {
        let (store, _clock) = store_with_clock();

        store
            .set("session:a", b"hello".to_vec(), Duration::from_secs(60))
            .await
            .unwrap();

        assert_eq!(store.get("session:a").await.unwrap(), Some(b"hello".to_vec()));
        assert!(store.exists("session:a").await.unwrap());

        assert!(store.delete("session:a").await.unwrap());
        assert!(!store.exists("session:a").await.unwrap());
        // 删除不存在的键不是错误
        assert!(!store.delete("session:a").await.unwrap());
    }

    #[tokio::test]
    async fn test_expiry_follows_clock() {
        let (store, clock) = store_with_clock();
        store
            .set("k", b"v".to_vec(), Duration::from_secs(10))
            .await
            .unwrap();

        clock.advance(Duration::from_secs(9));
        assert!(store.exists("k").await.unwrap());
        assert_eq!(
            store.ttl_remaining("k").await.unwrap(),
            Some(Duration::from_secs(1))
        );

        clock.advance(Duration::from_secs(1));
        assert_eq!(store.get("k").await.unwrap(), None);
        assert_eq!(store.ttl_remaining("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_replace_keep_ttl() {
        let (store, clock) = store_with_clock();
        store
            .set("k", b"v1".to_vec(), Duration::from_secs(10))
            .await
            .unwrap();
        clock.advance(Duration::from_secs(4));

        assert!(store.replace_keep_ttl("k", b"v2".to_vec()).await.unwrap());
        assert_eq!(store.get("k").await.unwrap(), Some(b"v2".to_vec()));
        assert_eq!(
            store.ttl_remaining("k").await.unwrap(),
            Some(Duration::from_secs(6))
        );

        // 不会复活已过期的键
        clock.advance(Duration::from_secs(6));
        assert!(!store.replace_keep_ttl("k", b"v3".to_vec()).await.unwrap());
        assert!(!store.exists("k").await.unwrap());
    }

    #[tokio::test]
    async fn test_scan_keys_by_prefix() {
        let (store, clock) = store_with_clock();
        let ttl = Duration::from_secs(10);
        store.set("session:1", vec![1], ttl).await.unwrap();
        store.set("session:2", vec![2], Duration::from_secs(1)).await.unwrap();
        store.set("other:3", vec![3], ttl).await.unwrap();

        let mut keys = store.scan_keys("session:").await.unwrap();
        keys.sort();
        assert_eq!(keys, vec!["session:1", "session:2"]);

        clock.advance(Duration::from_secs(2));
        assert_eq!(store.scan_keys("session:").await.unwrap(), vec!["session:1"]);
    }

    #[tokio::test]
    async fn test_members_and_atomic_batch() {
        let (store, _clock) = store_with_clock();
        store
            .apply(vec![
                StoreOp::Set {
                    key: "session:a".to_string(),
                    value: vec![1],
                    ttl: Duration::from_secs(10),
                },
                StoreOp::AddMember {
                    key: "user_sessions:u1".to_string(),
                    member: "a".to_string(),
                },
                StoreOp::AddMember {
                    key: "user_sessions:u1".to_string(),
                    member: "b".to_string(),
                },
            ])
            .await
            .unwrap();

        assert_eq!(
            store.set_members("user_sessions:u1").await.unwrap(),
            vec!["a", "b"]
        );

        store
            .apply(vec![
                StoreOp::RemoveMember {
                    key: "user_sessions:u1".to_string(),
                    member: "a".to_string(),
                },
                StoreOp::RemoveMember {
                    key: "user_sessions:u1".to_string(),
                    member: "b".to_string(),
                },
            ])
            .await
            .unwrap();
        assert!(store.set_members("user_sessions:u1").await.unwrap().is_empty());
        assert!(!store.exists("user_sessions:u1").await.unwrap());
    }

    #[tokio::test]
    async fn test_batch_rejected_as_a_whole_on_wrong_type() {
        let (store, _clock) = store_with_clock();
        store
            .set("session:a", vec![1], Duration::from_secs(10))
            .await
            .unwrap();

        let result = store
            .apply(vec![
                StoreOp::Set {
                    key: "session:b".to_string(),
                    value: vec![2],
                    ttl: Duration::from_secs(10),
                },
                StoreOp::AddMember {
                    key: "session:a".to_string(),
                    member: "x".to_string(),
                },
            ])
            .await;

        assert!(matches!(result, Err(StoreError::WrongType(_))));
        assert!(!store.exists("session:b").await.unwrap());
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let (store, clock) = store_with_clock();
        store.set("a", vec![1], Duration::from_secs(1)).await.unwrap();
        store.set("b", vec![2], Duration::from_secs(100)).await.unwrap();

        clock.advance(Duration::from_secs(2));

        assert_eq!(store.purge_expired().await, 1);
        assert!(store.exists("b").await.unwrap());
    }

    #[tokio::test]
    async fn test_expire_bounds_member_set() {
        let (store, clock) = store_with_clock();
        store
            .apply(vec![
                StoreOp::AddMember {
                    key: "user_sessions:u1".to_string(),
                    member: "a".to_string(),
                },
                StoreOp::Expire {
                    key: "user_sessions:u1".to_string(),
                    ttl: Duration::from_secs(10),
                },
                // 不存在的键不会被创建
                StoreOp::Expire {
                    key: "user_sessions:u2".to_string(),
                    ttl: Duration::from_secs(10),
                },
            ])
            .await
            .unwrap();

        assert_eq!(
            store.ttl_remaining("user_sessions:u1").await.unwrap(),
            Some(Duration::from_secs(10))
        );
        assert!(!store.exists("user_sessions:u2").await.unwrap());

        clock.advance(Duration::from_secs(10));
        assert_eq!(store.purge_expired().await, 1);
        assert!(store.set_members("user_sessions:u1").await.unwrap().is_empty());
    }
}
