use rand::rngs::OsRng;
use rand::RngCore;

const SESSION_ID_PREFIX: &str = "sess_";
const SESSION_ID_BYTES: usize = 32;

/// 生成会话 ID
///
/// 256 位随机数来自操作系统 CSPRNG，不含时间戳或用户信息。
pub fn generate_session_id() -> String {
    let mut bytes = [0u8; SESSION_ID_BYTES];
    OsRng.fill_bytes(&mut bytes);
    format!("{}{}", SESSION_ID_PREFIX, hex::encode(bytes))
}

/// 会话 ID 字符集检查（令牌里带来的 ID 不可信）
pub fn is_valid_session_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= 128
        && id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
}
