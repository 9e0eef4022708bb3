//! 会话存储 - 存储层
//!
//! ## 职责
//!
//! 1. **保存**：登录流程或外部凭据推送写入的会话包
//! 2. **更新**：同一 user_id 只有最近更新的一行是"当前会话"，
//!    更新时就地覆盖；不存在时退化为创建
//! 3. **读取**：有效性在读取时根据 expires_at 计算，从不落库，
//!    也从不主动清理过期行
//! 4. **getData 保证**：调用方绝不会拿到已过期的凭据包

use chrono::{DateTime, Duration, Utc};
use rusqlite::params;
use tokio_rusqlite::Connection;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::AppResult;
use crate::models::{Session, SessionData};
use crate::storage::db::{parse_db_time, to_db_time};

/// 默认会话有效期（小时）
const DEFAULT_TTL_HOURS: i64 = 48;

/// 会话存储
#[derive(Clone)]
pub struct SessionStore {
    conn: Connection,
}

impl SessionStore {
    /// 基于已打开的连接创建存储
    pub fn new(conn: Connection) -> Self {
        Self { conn }
    }

    /// 保存新会话；expires_at 缺省为 now + 48h
    pub async fn store(
        &self,
        session_data: &SessionData,
        username: Option<&str>,
        user_id: Option<&str>,
        expires_at: Option<DateTime<Utc>>,
    ) -> AppResult<Session> {
        let now = Utc::now();
        let expires = expires_at.unwrap_or(now + Duration::hours(DEFAULT_TTL_HOURS));
        let session = Session {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.map(|s| s.to_string()),
            session_data: session_data.clone(),
            username: username.map(|s| s.to_string()),
            expires_at: expires,
            created_at: now,
            updated_at: now,
            is_valid: expires > now,
        };

        let data_json = serde_json::to_string(&session.session_data)?;
        let row = session.clone();
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO sessions (id, user_id, session_data, username, expires_at, \
                     created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
                    params![
                        row.id,
                        row.user_id,
                        data_json,
                        row.username,
                        to_db_time(row.expires_at),
                        to_db_time(row.created_at),
                    ],
                )?;
                Ok(())
            })
            .await?;

        info!(
            "🔑 会话已保存: {} (用户: {})",
            session.id,
            session.username.as_deref().unwrap_or("-")
        );
        Ok(session)
    }

    /// 更新当前会话；不存在时退化为创建
    pub async fn update(
        &self,
        session_data: &SessionData,
        username: Option<&str>,
        user_id: Option<&str>,
        expires_at: Option<DateTime<Utc>>,
    ) -> AppResult<Session> {
        let current = self.get(user_id).await?;
        let Some(mut session) = current else {
            debug!("没有可更新的会话，退化为创建");
            return self.store(session_data, username, user_id, expires_at).await;
        };

        let now = Utc::now();
        session.session_data = session_data.clone();
        if username.is_some() {
            session.username = username.map(|s| s.to_string());
        }
        session.expires_at = expires_at.unwrap_or(now + Duration::hours(DEFAULT_TTL_HOURS));
        session.updated_at = now;
        session.is_valid = session.expires_at > now;

        let data_json = serde_json::to_string(&session.session_data)?;
        let row = session.clone();
        self.conn
            .call(move |conn| {
                conn.execute(
                    "UPDATE sessions SET session_data = ?1, username = ?2, expires_at = ?3, \
                     updated_at = ?4 WHERE id = ?5",
                    params![
                        data_json,
                        row.username,
                        to_db_time(row.expires_at),
                        to_db_time(row.updated_at),
                        row.id,
                    ],
                )?;
                Ok(())
            })
            .await?;

        info!("🔄 会话已更新: {}", session.id);
        Ok(session)
    }

    /// 读取当前会话（同一 user_id 下最近更新的一行），附带计算出的有效性
    pub async fn get(&self, user_id: Option<&str>) -> AppResult<Option<Session>> {
        let user_id = user_id.map(|s| s.to_string());
        let row = self
            .conn
            .call(move |conn| {
                let row = match &user_id {
                    Some(uid) => {
                        let mut stmt = conn.prepare(
                            "SELECT id, user_id, session_data, username, expires_at, \
                             created_at, updated_at FROM sessions WHERE user_id = ?1 \
                             ORDER BY updated_at DESC LIMIT 1",
                        )?;
                        let mut rows = stmt.query_map([uid], session_row)?;
                        match rows.next() {
                            Some(row) => Some(row?),
                            None => None,
                        }
                    }
                    None => {
                        let mut stmt = conn.prepare(
                            "SELECT id, user_id, session_data, username, expires_at, \
                             created_at, updated_at FROM sessions WHERE user_id IS NULL \
                             ORDER BY updated_at DESC LIMIT 1",
                        )?;
                        let mut rows = stmt.query_map([], session_row)?;
                        match rows.next() {
                            Some(row) => Some(row?),
                            None => None,
                        }
                    }
                };
                Ok(row)
            })
            .await?;

        let Some(raw) = row else {
            return Ok(None);
        };
        let session_data: SessionData = serde_json::from_str(&raw.data_json)?;
        let now = Utc::now();
        Ok(Some(Session {
            id: raw.id,
            user_id: raw.user_id,
            session_data,
            username: raw.username,
            expires_at: raw.expires_at,
            created_at: raw.created_at,
            updated_at: raw.updated_at,
            is_valid: raw.expires_at > now,
        }))
    }

    /// 读取凭据包；只有会话存在且当前有效时才返回
    ///
    /// 过期会话返回 None —— 调用方绝不会拿到过期凭据。
    pub async fn get_data(&self, user_id: Option<&str>) -> AppResult<Option<SessionData>> {
        match self.get(user_id).await? {
            Some(session) if session.is_valid => Ok(Some(session.session_data)),
            _ => Ok(None),
        }
    }

    /// 当前会话是否有效
    pub async fn is_valid(&self, user_id: Option<&str>) -> AppResult<bool> {
        Ok(self
            .get(user_id)
            .await?
            .map(|s| s.is_valid)
            .unwrap_or(false))
    }

    /// 删除会话；user_id 缺省时删除全部行。返回删除的行数
    pub async fn delete(&self, user_id: Option<&str>) -> AppResult<usize> {
        let user_id = user_id.map(|s| s.to_string());
        let removed = self
            .conn
            .call(move |conn| {
                let n = match &user_id {
                    Some(uid) => conn.execute("DELETE FROM sessions WHERE user_id = ?1", [uid])?,
                    None => conn.execute("DELETE FROM sessions", [])?,
                };
                Ok(n)
            })
            .await?;
        if removed > 0 {
            info!("🗑️ 已删除 {} 个会话", removed);
        }
        Ok(removed)
    }
}

// ========== 行映射 ==========

/// 原始行（凭据包 JSON 在连接线程外再反序列化）
struct RawSessionRow {
    id: String,
    user_id: Option<String>,
    data_json: String,
    username: Option<String>,
    expires_at: DateTime<Utc>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

fn session_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawSessionRow> {
    let expires: String = row.get(4)?;
    let created: String = row.get(5)?;
    let updated: String = row.get(6)?;
    Ok(RawSessionRow {
        id: row.get(0)?,
        user_id: row.get(1)?,
        data_json: row.get(2)?,
        username: row.get(3)?,
        expires_at: parse_db_time(&expires)?,
        created_at: parse_db_time(&created)?,
        updated_at: parse_db_time(&updated)?,
    })
}
