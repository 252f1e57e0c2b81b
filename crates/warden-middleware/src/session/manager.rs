use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use warden_core::{system_clock, AuthError, Result, SharedClock};

use super::{
    generate_session_id, session_key, user_index_key, NewSession, RecordStore, Session,
    SessionEvent, StoreOp, SESSION_KEY_PREFIX,
};

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// 会话管理器
///
/// 会话记录存放在 `session:<id>`，用户索引存放在 `user_sessions:<user_id>`，
/// 两者总在同一个原子批次里一起修改。
pub struct SessionManager {
    store: Arc<dyn RecordStore>,
    clock: SharedClock,
    default_ttl: Duration,
    events: broadcast::Sender<SessionEvent>,
}

impl SessionManager {
    /// 创建新的会话管理器
    pub fn new(store: Arc<dyn RecordStore>, default_ttl: Duration) -> Self {
        Self::with_clock(store, default_ttl, system_clock())
    }

    pub fn with_clock(store: Arc<dyn RecordStore>, default_ttl: Duration, clock: SharedClock) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            store,
            clock,
            default_ttl,
            events,
        }
    }

    /// 订阅会话事件
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    fn publish(&self, event: SessionEvent) {
        // 没有订阅者时发送失败，忽略即可
        let _ = self.events.send(event);
    }

    /// 创建新会话，返回会话 ID
    pub async fn create(&self, new: NewSession) -> Result<String> {
        let ttl = new.ttl.unwrap_or(self.default_ttl);
        if ttl.is_zero() {
            return Err(AuthError::Config("session ttl must be greater than zero".to_string()));
        }
        if new.user_id.is_empty() {
            return Err(AuthError::Config("session user_id must not be empty".to_string()));
        }

        let now = self.clock.now();
        let session = Session {
            session_id: generate_session_id(),
            user_id: new.user_id,
            email: new.email,
            name: new.name,
            roles: new.roles,
            created_at: now,
            last_seen: now,
        };
        let value = encode(&session)?;

        let index_key = user_index_key(&session.user_id);
        let mut ops = vec![
            StoreOp::Set {
                key: session_key(&session.session_id),
                value,
                ttl,
            },
            StoreOp::AddMember {
                key: index_key.clone(),
                member: session.session_id.clone(),
            },
        ];
        ops.extend(self.stale_members(&index_key).await?);
        ops.push(self.extend_index(&index_key, ttl).await?);
        self.store.apply(ops).await?;

        info!(
            session_id = %session.session_id,
            user_id = %session.user_id,
            ttl_secs = ttl.as_secs(),
            "Session created"
        );
        self.publish(SessionEvent::Created {
            session_id: session.session_id.clone(),
            user_id: session.user_id,
        });

        Ok(session.session_id)
    }

    /// 获取会话
    ///
    /// 存储里没有这个键就是不存在；无法解码的记录按不存在处理。
    pub async fn get(&self, session_id: &str) -> Result<Option<Session>> {
        let Some(bytes) = self.store.get(&session_key(session_id)).await? else {
            return Ok(None);
        };

        match Session::decode(session_id, &bytes) {
            Ok(session) => Ok(Some(session)),
            Err(e) => {
                warn!(session_id = %session_id, error = %e, "Undecodable session record");
                Ok(None)
            }
        }
    }

    /// 心跳：刷新最后活跃时间，保留剩余 TTL
    ///
    /// 会话已经过期或被撤销时返回 false，且不会重新写入。
    pub async fn try_touch(&self, session_id: &str) -> Result<bool> {
        let Some(mut session) = self.get(session_id).await? else {
            return Ok(false);
        };

        session.touch(self.clock.now());
        let value = encode(&session)?;

        let updated = self
            .store
            .replace_keep_ttl(&session_key(session_id), value)
            .await?;
        Ok(updated)
    }

    /// 尽力而为的心跳，失败只记日志
    pub async fn touch(&self, session_id: &str) {
        match self.try_touch(session_id).await {
            Ok(true) => debug!(session_id = %session_id, "Session touched"),
            Ok(false) => debug!(session_id = %session_id, "Session gone before heartbeat"),
            Err(e) => warn!(session_id = %session_id, kind = e.kind(), error = %e, "Heartbeat failed"),
        }
    }

    /// 以新的 TTL 重写会话；会话不存在时返回 false
    pub async fn renew(&self, session_id: &str, ttl: Duration) -> Result<bool> {
        if ttl.is_zero() {
            return Err(AuthError::Config("session ttl must be greater than zero".to_string()));
        }
        let Some(session) = self.get(session_id).await? else {
            return Ok(false);
        };

        let index_key = user_index_key(&session.user_id);
        self.store
            .apply(vec![
                StoreOp::Set {
                    key: session_key(session_id),
                    value: encode(&session)?,
                    ttl,
                },
                self.extend_index(&index_key, ttl).await?,
            ])
            .await?;

        info!(session_id = %session_id, ttl_secs = ttl.as_secs(), "Session renewed");
        Ok(true)
    }

    /// 会话剩余有效期
    pub async fn remaining_ttl(&self, session_id: &str) -> Result<Option<Duration>> {
        Ok(self.store.ttl_remaining(&session_key(session_id)).await?)
    }

    /// 索引中会话记录已经不存在的成员
    async fn stale_members(&self, index_key: &str) -> Result<Vec<StoreOp>> {
        let mut stale = Vec::new();
        for session_id in self.store.set_members(index_key).await? {
            if !self.store.exists(&session_key(&session_id)).await? {
                stale.push(StoreOp::RemoveMember {
                    key: index_key.to_string(),
                    member: session_id,
                });
            }
        }
        Ok(stale)
    }

    /// 索引的 TTL 不短于其中任何会话的剩余有效期
    async fn extend_index(&self, index_key: &str, ttl: Duration) -> Result<StoreOp> {
        let remaining = self.store.ttl_remaining(index_key).await?.unwrap_or_default();
        Ok(StoreOp::Expire {
            key: index_key.to_string(),
            ttl: remaining.max(ttl),
        })
    }

    async fn index_session(&self, session: &Session) -> Result<()> {
        let index_key = user_index_key(&session.user_id);
        let remaining = self
            .remaining_ttl(&session.session_id)
            .await?
            .unwrap_or(self.default_ttl);
        let expire = self.extend_index(&index_key, remaining).await?;
        self.store
            .apply(vec![
                StoreOp::AddMember {
                    key: index_key,
                    member: session.session_id.clone(),
                },
                expire,
            ])
            .await?;
        Ok(())
    }

    /// 撤销会话（幂等）
    pub async fn revoke(&self, session_id: &str) -> Result<()> {
        let user_id = self.get(session_id).await?.map(|s| s.user_id);
        self.remove(session_id, user_id).await
    }

    async fn remove(&self, session_id: &str, user_id: Option<String>) -> Result<()> {
        let mut ops = vec![StoreOp::Delete {
            key: session_key(session_id),
        }];
        if let Some(user_id) = &user_id {
            ops.push(StoreOp::RemoveMember {
                key: user_index_key(user_id),
                member: session_id.to_string(),
            });
        }
        self.store.apply(ops).await?;

        info!(session_id = %session_id, user_id = ?user_id, "Session revoked");
        self.publish(SessionEvent::Revoked {
            session_id: session_id.to_string(),
            user_id,
        });
        Ok(())
    }

    /// 撤销用户的所有会话，返回成功处理的索引项数量
    ///
    /// 与之并发创建的会话可能不会被撤销。
    pub async fn revoke_all_for_user(&self, user_id: &str) -> Result<usize> {
        let members = self.store.set_members(&user_index_key(user_id)).await?;

        let mut count = 0;
        for session_id in members {
            match self.remove(&session_id, Some(user_id.to_string())).await {
                Ok(()) => count += 1,
                Err(e) => warn!(
                    session_id = %session_id,
                    user_id = %user_id,
                    kind = e.kind(),
                    error = %e,
                    "Failed to revoke session, skipping"
                ),
            }
        }

        info!(user_id = %user_id, count = count, "Revoked all sessions for user");
        self.publish(SessionEvent::UserRevoked {
            user_id: user_id.to_string(),
            count,
        });
        Ok(count)
    }

    /// 列出用户的有效会话，按创建时间排序
    ///
    /// 索引里已过期的成员会被顺带清理。
    pub async fn list_active_for_user(&self, user_id: &str) -> Result<Vec<Session>> {
        let index_key = user_index_key(user_id);
        let members = self.store.set_members(&index_key).await?;

        let mut sessions = Vec::with_capacity(members.len());
        let mut stale = Vec::new();
        for session_id in members {
            match self.store.get(&session_key(&session_id)).await {
                Ok(Some(bytes)) => match Session::decode(&session_id, &bytes) {
                    Ok(session) => sessions.push(session),
                    Err(e) => {
                        warn!(session_id = %session_id, error = %e, "Undecodable session record, skipping")
                    }
                },
                Ok(None) => stale.push(StoreOp::RemoveMember {
                    key: index_key.clone(),
                    member: session_id,
                }),
                Err(e) => {
                    warn!(session_id = %session_id, error = %e, "Failed to read session, skipping")
                }
            }
        }

        if !stale.is_empty() {
            let pruned = stale.len();
            match self.store.apply(stale).await {
                Ok(()) => debug!(user_id = %user_id, pruned = pruned, "Pruned stale index entries"),
                Err(e) => warn!(user_id = %user_id, error = %e, "Failed to prune stale index entries"),
            }
        }

        sessions.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.session_id.cmp(&b.session_id))
        });
        Ok(sessions)
    }

    /// 从现有会话记录重建用户索引，返回写入的索引项数量
    pub async fn rebuild_index(&self) -> Result<usize> {
        let keys = self.store.scan_keys(SESSION_KEY_PREFIX).await?;

        let mut indexed = 0;
        for key in keys {
            let Some(session_id) = key.strip_prefix(SESSION_KEY_PREFIX) else {
                continue;
            };
            let session = match self.get(session_id).await {
                Ok(Some(session)) => session,
                Ok(None) => continue,
                Err(e) => {
                    warn!(key = %key, error = %e, "Failed to read session, skipping");
                    continue;
                }
            };

            match self.index_session(&session).await {
                Ok(()) => indexed += 1,
                Err(e) => warn!(key = %key, error = %e, "Failed to index session, skipping"),
            }
        }

        info!(indexed = indexed, "Session index rebuilt");
        Ok(indexed)
    }
}

fn encode(session: &Session) -> Result<Vec<u8>> {
    session
        .encode()
        .map_err(|e| AuthError::StoreUnavailable(format!("failed to encode session: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::MemoryRecordStore;
    use warden_core::ManualClock;

    struct Fixture {
        store: Arc<MemoryRecordStore>,
        clock: Arc<ManualClock>,
        manager: SessionManager,
    }

    fn fixture() -> Fixture {
        let clock = ManualClock::starting_now();
        let store = Arc::new(MemoryRecordStore::with_clock(clock.clone()));
        let manager =
            SessionManager::with_clock(store.clone(), Duration::from_secs(3600), clock.clone());
        Fixture {
            store,
            clock,
            manager,
        }
    }

    fn alice() -> NewSession {
        NewSession::new("u1")
            .with_email("alice@example.com")
            .with_name("Alice")
            .with_roles(vec!["admin".to_string(), "user".to_string()])
    }

    #[tokio::test]
    async fn test_create_then_get() {
        let f = fixture();
        let id = f.manager.create(alice()).await.unwrap();

        let session = f.manager.get(&id).await.unwrap().unwrap();
        assert_eq!(session.session_id, id);
        assert_eq!(session.user_id, "u1");
        assert_eq!(session.name, "Alice");
        assert_eq!(session.roles, vec!["admin", "user"]);
        assert_eq!(session.last_seen, session.created_at);
        assert_eq!(
            f.manager.remaining_ttl(&id).await.unwrap(),
            Some(Duration::from_secs(3600))
        );
    }

    #[tokio::test]
    async fn test_create_rejects_zero_ttl() {
        let f = fixture();
        let result = f.manager.create(alice().with_ttl(Duration::ZERO)).await;
        assert!(matches!(result, Err(AuthError::Config(_))));
    }

    #[tokio::test]
    async fn test_touch_keeps_remaining_ttl() {
        let f = fixture();
        let id = f
            .manager
            .create(alice().with_ttl(Duration::from_secs(100)))
            .await
            .unwrap();
        let before = f.manager.get(&id).await.unwrap().unwrap();

        f.clock.advance(Duration::from_secs(30));
        assert!(f.manager.try_touch(&id).await.unwrap());

        let after = f.manager.get(&id).await.unwrap().unwrap();
        assert!(after.last_seen > before.last_seen);
        assert_eq!(after.created_at, before.created_at);
        assert_eq!(after.user_id, before.user_id);
        assert_eq!(after.name, before.name);
        assert_eq!(after.roles, before.roles);
        assert_eq!(after.email, before.email);
        assert_eq!(
            f.manager.remaining_ttl(&id).await.unwrap(),
            Some(Duration::from_secs(70))
        );
    }

    #[tokio::test]
    async fn test_touch_strictly_increases_without_clock_movement() {
        let f = fixture();
        let id = f.manager.create(alice()).await.unwrap();

        f.manager.touch(&id).await;
        let first = f.manager.get(&id).await.unwrap().unwrap().last_seen;
        f.manager.touch(&id).await;
        let second = f.manager.get(&id).await.unwrap().unwrap().last_seen;

        assert!(second > first);
    }

    #[tokio::test]
    async fn test_touch_does_not_resurrect() {
        let f = fixture();
        let id = f.manager.create(alice()).await.unwrap();
        f.manager.revoke(&id).await.unwrap();

        assert!(!f.manager.try_touch(&id).await.unwrap());
        assert!(f.manager.get(&id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_revoke_is_idempotent() {
        let f = fixture();
        let id = f.manager.create(alice()).await.unwrap();

        f.manager.revoke(&id).await.unwrap();
        assert!(f.manager.get(&id).await.unwrap().is_none());
        assert!(f
            .store
            .set_members(&user_index_key("u1"))
            .await
            .unwrap()
            .is_empty());

        f.manager.revoke(&id).await.unwrap();
        f.manager.revoke("sess_never_existed").await.unwrap();
    }

    #[tokio::test]
    async fn test_session_expires_after_ttl() {
        let f = fixture();
        let id = f
            .manager
            .create(alice().with_ttl(Duration::from_secs(10)))
            .await
            .unwrap();

        f.clock.advance(Duration::from_secs(9));
        assert!(f.manager.get(&id).await.unwrap().is_some());

        f.clock.advance(Duration::from_secs(1));
        assert!(f.manager.get(&id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_revoke_all_for_user_leaves_others() {
        let f = fixture();
        let a = f.manager.create(alice()).await.unwrap();
        let b = f.manager.create(alice()).await.unwrap();
        let c = f.manager.create(NewSession::new("u2")).await.unwrap();

        assert_eq!(f.manager.revoke_all_for_user("u1").await.unwrap(), 2);

        assert!(f.manager.get(&a).await.unwrap().is_none());
        assert!(f.manager.get(&b).await.unwrap().is_none());
        assert!(f.manager.get(&c).await.unwrap().is_some());
        assert!(f.manager.list_active_for_user("u1").await.unwrap().is_empty());
        assert_eq!(f.manager.list_active_for_user("u2").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_list_sorted_and_prunes_stale() {
        let f = fixture();
        let first = f.manager.create(alice()).await.unwrap();
        f.clock.advance(Duration::from_secs(1));
        let short = f
            .manager
            .create(alice().with_ttl(Duration::from_secs(5)))
            .await
            .unwrap();
        f.clock.advance(Duration::from_secs(1));
        let third = f.manager.create(alice()).await.unwrap();

        let ids: Vec<_> = f
            .manager
            .list_active_for_user("u1")
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.session_id)
            .collect();
        assert_eq!(ids, vec![first.clone(), short.clone(), third.clone()]);

        f.clock.advance(Duration::from_secs(5));
        let ids: Vec<_> = f
            .manager
            .list_active_for_user("u1")
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.session_id)
            .collect();
        assert_eq!(ids, vec![first, third]);

        let members = f.store.set_members(&user_index_key("u1")).await.unwrap();
        assert_eq!(members.len(), 2);
        assert!(!members.contains(&short));
    }

    #[tokio::test]
    async fn test_corrupt_record_reads_as_absent() {
        let f = fixture();
        f.store
            .set(&session_key("sess_bad"), b"not json".to_vec(), Duration::from_secs(60))
            .await
            .unwrap();

        assert!(f.manager.get("sess_bad").await.unwrap().is_none());
        assert!(!f.manager.try_touch("sess_bad").await.unwrap());
    }

    #[tokio::test]
    async fn test_renew_resets_ttl() {
        let f = fixture();
        let id = f
            .manager
            .create(alice().with_ttl(Duration::from_secs(10)))
            .await
            .unwrap();
        f.clock.advance(Duration::from_secs(8));

        assert!(f.manager.renew(&id, Duration::from_secs(60)).await.unwrap());
        assert_eq!(
            f.manager.remaining_ttl(&id).await.unwrap(),
            Some(Duration::from_secs(60))
        );

        f.manager.revoke(&id).await.unwrap();
        assert!(!f.manager.renew(&id, Duration::from_secs(60)).await.unwrap());
    }

    #[tokio::test]
    async fn test_user_index_does_not_outlive_sessions() {
        let f = fixture();
        for _ in 0..100 {
            f.manager
                .create(alice().with_ttl(Duration::from_secs(10)))
                .await
                .unwrap();
            f.clock.advance(Duration::from_secs(11));
        }

        f.store.purge_expired().await;
        assert!(f
            .store
            .set_members(&user_index_key("u1"))
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_create_prunes_expired_index_entries() {
        let f = fixture();
        let long = f.manager.create(alice()).await.unwrap();
        let short = f
            .manager
            .create(alice().with_ttl(Duration::from_secs(5)))
            .await
            .unwrap();
        f.clock.advance(Duration::from_secs(6));

        let latest = f
            .manager
            .create(alice().with_ttl(Duration::from_secs(5)))
            .await
            .unwrap();

        let mut members = f.store.set_members(&user_index_key("u1")).await.unwrap();
        members.sort();
        let mut expected = vec![long, latest];
        expected.sort();
        assert_eq!(members, expected);
        assert!(!members.contains(&short));

        // 较短的新会话不会缩短索引的有效期
        assert_eq!(
            f.store.ttl_remaining(&user_index_key("u1")).await.unwrap(),
            Some(Duration::from_secs(3594))
        );
    }

    #[tokio::test]
    async fn test_rebuild_index() {
        let f = fixture();
        let id = f.manager.create(alice()).await.unwrap();

        // 模拟索引丢失
        f.store
            .apply(vec![StoreOp::Delete {
                key: user_index_key("u1"),
            }])
            .await
            .unwrap();
        assert!(f.manager.list_active_for_user("u1").await.unwrap().is_empty());

        assert_eq!(f.manager.rebuild_index().await.unwrap(), 1);
        let sessions = f.manager.list_active_for_user("u1").await.unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].session_id, id);
    }

    #[tokio::test]
    async fn test_events() {
        let f = fixture();
        let mut events = f.manager.subscribe();

        let id = f.manager.create(alice()).await.unwrap();
        f.manager.revoke_all_for_user("u1").await.unwrap();

        assert_eq!(
            events.recv().await.unwrap(),
            SessionEvent::Created {
                session_id: id.clone(),
                user_id: "u1".to_string(),
            }
        );
        assert_eq!(
            events.recv().await.unwrap(),
            SessionEvent::Revoked {
                session_id: id,
                user_id: Some("u1".to_string()),
            }
        );
        assert_eq!(
            events.recv().await.unwrap(),
            SessionEvent::UserRevoked {
                user_id: "u1".to_string(),
                count: 1,
            }
        );
    }
}
