use serde::Serialize;

/// 会话生命周期事件
///
/// 通过 `tokio::sync::broadcast` 分发，没有订阅者时直接丢弃。
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    Created {
        session_id: String,
        user_id: String,
    },
    Revoked {
        session_id: String,
        user_id: Option<String>,
    },
    UserRevoked {
        user_id: String,
        count: usize,
    },
}
