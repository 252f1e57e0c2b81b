use serde::{Deserialize, Serialize};

/// 已验证的令牌声明
///
/// 只在单次请求内用于定位会话，不单独持久化。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub user_id: String,
    pub email: String,
    pub session_id: String,
    /// 过期时间（秒）
    pub exp: i64,
    pub iat: Option<i64>,
    pub iss: Option<String>,
    #[serde(default)]
    pub aud: Vec<String>,
}

/// 请求级身份上下文
///
/// 由网关从会话记录构建（而不是从令牌），请求结束即丢弃。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub user_id: String,
    pub email: String,
    pub display_name: String,
    pub roles: Vec<String>,
    pub session_id: String,
}

impl Principal {
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }

    pub fn has_any_role(&self, roles: &[&str]) -> bool {
        roles.iter().any(|role| self.has_role(role))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn principal() -> Principal {
        Principal {
            user_id: "u1".to_string(),
            email: "u1@example.com".to_string(),
            display_name: "User One".to_string(),
            roles: vec!["viewer".to_string(), "operator".to_string()],
            session_id: "sess_1".to_string(),
        }
    }

    #[test]
    fn test_role_checks() {
        let p = principal();
        assert!(p.has_role("viewer"));
        assert!(!p.has_role("admin"));
        assert!(p.has_any_role(&["admin", "operator"]));
        assert!(!p.has_any_role(&["admin"]));
    }

    #[test]
    fn test_principal_json() {
        let json = serde_json::to_value(principal()).unwrap();
        assert_eq!(json["user_id"], "u1");
        assert_eq!(json["roles"][1], "operator");
    }
}
