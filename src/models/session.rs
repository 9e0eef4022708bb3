//! 会话数据模型
//!
//! Session 是一份可以恢复已登录浏览器上下文的持久化凭据包。
//! `is_valid` 永远在读取时根据 `expires_at` 计算，不落库。

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 持久化的登录会话
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// 会话 ID（uuid v4）
    pub id: String,
    /// 所属用户；None 表示单租户默认用户
    pub user_id: Option<String>,
    /// 不透明凭据包（cookie / localStorage / UA）
    pub session_data: SessionData,
    /// 登录用户名（登录流程捕获）
    pub username: Option<String>,
    /// 过期时间
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// 读取时计算的有效性（expires_at 是否在未来）
    pub is_valid: bool,
}

/// 凭据包的具体内容
///
/// 对存储层而言是一段不透明 JSON；只有浏览器驱动层认识它的结构。
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionData {
    /// 浏览器 cookie 快照
    pub cookies: Vec<SessionCookie>,
    /// localStorage 快照（平台域名下）
    #[serde(default)]
    pub local_storage: HashMap<String, String>,
    /// 捕获会话时使用的 User-Agent
    pub user_agent: Option<String>,
}

/// 单条 cookie 快照
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionCookie {
    pub name: String,
    pub value: String,
    pub domain: String,
    pub path: String,
    /// Unix 秒；None 表示会话 cookie
    pub expires: Option<f64>,
    #[serde(default)]
    pub http_only: bool,
    #[serde(default)]
    pub secure: bool,
}
