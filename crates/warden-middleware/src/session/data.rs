use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use warden_core::Principal;

/// 存储中的会话记录（不含会话 ID，ID 在键里）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub user_id: String,
    pub email: String,
    pub name: String,
    pub roles: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

/// 会话数据
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Session {
    /// 会话 ID
    pub session_id: String,

    /// 用户 ID
    pub user_id: String,

    pub email: String,

    /// 显示名
    pub name: String,

    /// 用户角色
    pub roles: Vec<String>,

    /// 创建时间
    pub created_at: DateTime<Utc>,

    /// 最后活跃时间
    pub last_seen: DateTime<Utc>,
}

impl Session {
    pub(crate) fn from_record(session_id: String, record: SessionRecord) -> Self {
        Self {
            session_id,
            user_id: record.user_id,
            email: record.email,
            name: record.name,
            roles: record.roles,
            created_at: record.created_at,
            last_seen: record.last_seen,
        }
    }

    pub(crate) fn to_record(&self) -> SessionRecord {
        SessionRecord {
            user_id: self.user_id.clone(),
            email: self.email.clone(),
            name: self.name.clone(),
            roles: self.roles.clone(),
            created_at: self.created_at,
            last_seen: self.last_seen,
        }
    }

    /// 解码存储中的字节
    pub fn decode(session_id: &str, bytes: &[u8]) -> Result<Self, serde_json::Error> {
        let record: SessionRecord = serde_json::from_slice(bytes)?;
        Ok(Self::from_record(session_id.to_string(), record))
    }

    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(&self.to_record())
    }

    /// 更新最后活跃时间
    ///
    /// `last_seen` 严格递增：时钟没有前进时补 1 微秒。
    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.last_seen = if now > self.last_seen {
            now
        } else {
            self.last_seen + chrono::Duration::microseconds(1)
        };
    }

    pub fn principal(&self) -> Principal {
        Principal {
            user_id: self.user_id.clone(),
            email: self.email.clone(),
            display_name: self.name.clone(),
            roles: self.roles.clone(),
            session_id: self.session_id.clone(),
        }
    }
}

/// 创建会话的入参（由登录服务提供）
#[derive(Debug, Clone, Default)]
pub struct NewSession {
    pub user_id: String,
    pub email: String,
    pub name: String,
    pub roles: Vec<String>,
    /// 为空时使用管理器的默认 TTL
    pub ttl: Option<Duration>,
}

impl NewSession {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            ..Default::default()
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = email.into();
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_roles<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.roles = roles.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> Session {
        let now = Utc::now();
        Session {
            session_id: "sess_abc".to_string(),
            user_id: "user123".to_string(),
            email: "user123@example.com".to_string(),
            name: "User".to_string(),
            roles: vec!["admin".to_string()],
            created_at: now,
            last_seen: now,
        }
    }

    #[test]
    fn test_record_wire_shape() {
        let bytes = session().encode().unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();

        assert_eq!(json["user_id"], "user123");
        assert_eq!(json["name"], "User");
        assert!(json["created_at"].as_str().unwrap().contains('T'));
        assert!(json.get("last_seen").is_some());
        // 会话 ID 只在键里
        assert!(json.get("session_id").is_none());
    }

    #[test]
    fn test_decode_restores_id() {
        let original = session();
        let bytes = original.encode().unwrap();
        let decoded = Session::decode("sess_abc", &bytes).unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn test_touch_strictly_increases() {
        let mut s = session();
        let before = s.last_seen;

        // 时钟未前进
        s.touch(before);
        assert!(s.last_seen > before);

        let later = before + chrono::Duration::seconds(5);
        s.touch(later);
        assert_eq!(s.last_seen, later);

        // 时钟回拨也不会倒退
        s.touch(before);
        assert!(s.last_seen > later);
    }

    #[test]
    fn test_principal_from_session() {
        let p = session().principal();
        assert_eq!(p.user_id, "user123");
        assert_eq!(p.display_name, "User");
        assert_eq!(p.session_id, "sess_abc");
        assert!(p.has_role("admin"));
    }

    #[test]
    fn test_new_session_builder() {
        let new = NewSession::new("u1")
            .with_email("u1@example.com")
            .with_name("U One")
            .with_roles(["viewer", "operator"])
            .with_ttl(Duration::from_secs(10));

        assert_eq!(new.user_id, "u1");
        assert_eq!(new.roles, vec!["viewer", "operator"]);
        assert_eq!(new.ttl, Some(Duration::from_secs(10)));
    }
}
