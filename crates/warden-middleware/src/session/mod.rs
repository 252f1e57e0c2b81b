pub mod data;
pub mod events;
pub mod id;
pub mod manager;
pub mod memory;
#[cfg(feature = "redis-session")]
pub mod redis;
pub mod store;

pub use data::{NewSession, Session, SessionRecord};
pub use events::SessionEvent;
pub use id::{generate_session_id, is_valid_session_id};
pub use manager::SessionManager;
pub use memory::MemoryRecordStore;
pub use store::{RecordStore, StoreError, StoreOp, StoreResult};

#[cfg(feature = "redis-session")]
pub use self::redis::RedisRecordStore;

/// 会话记录键前缀
pub const SESSION_KEY_PREFIX: &str = "session:";

/// 用户 → 会话 二级索引键前缀
pub const USER_INDEX_PREFIX: &str = "user_sessions:";

pub fn session_key(session_id: &str) -> String {
    format!("{}{}", SESSION_KEY_PREFIX, session_id)
}

pub fn user_index_key(user_id: &str) -> String {
    format!("{}{}", USER_INDEX_PREFIX, user_id)
}
