//! 数据库连接管理 - 存储层
//!
//! 负责打开 SQLite 连接并初始化表结构。
//! 所有时间戳统一以固定宽度的 RFC 3339 字符串落库，
//! 保证字符串排序与时间排序一致。

use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use tokio_rusqlite::Connection;
use tracing::{debug, info};

use crate::error::{AppError, AppResult};

/// 打开文件数据库并初始化表结构
pub async fn open(path: &str) -> AppResult<Connection> {
    info!("正在打开数据库: {}", path);
    let conn = Connection::open(path)
        .await
        .map_err(|e| AppError::db_open_failed(path, e))?;
    init(&conn).await?;
    debug!("数据库初始化完成");
    Ok(conn)
}

/// 打开内存数据库（测试用）
pub async fn open_in_memory() -> AppResult<Connection> {
    let conn = Connection::open_in_memory()
        .await
        .map_err(|e| AppError::db_open_failed(":memory:", e))?;
    init(&conn).await?;
    Ok(conn)
}

async fn init(conn: &Connection) -> AppResult<()> {
    conn.call(|conn| {
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        init_schema(conn)?;
        Ok(())
    })
    .await?;
    Ok(())
}

/// 建表（幂等）
fn init_schema(conn: &rusqlite::Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS jobs (
            id                  TEXT PRIMARY KEY,
            subreddit           TEXT NOT NULL,
            caption             TEXT NOT NULL,
            url                 TEXT,
            flair               TEXT,
            media_id            TEXT,
            scheduled_time      TEXT NOT NULL,
            status              TEXT NOT NULL DEFAULT 'queued',
            post_url            TEXT,
            error_message       TEXT,
            processed_by_client INTEGER NOT NULL DEFAULT 0,
            created_at          TEXT NOT NULL,
            updated_at          TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_jobs_status_time
            ON jobs (status, scheduled_time);

        CREATE TABLE IF NOT EXISTS job_logs (
            id         INTEGER PRIMARY KEY AUTOINCREMENT,
            job_id     TEXT NOT NULL REFERENCES jobs (id) ON DELETE CASCADE,
            event_type TEXT NOT NULL,
            message    TEXT NOT NULL,
            timestamp  TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_job_logs_job
            ON job_logs (job_id);

        CREATE TABLE IF NOT EXISTS sessions (
            id           TEXT PRIMARY KEY,
            user_id      TEXT,
            session_data TEXT NOT NULL,
            username     TEXT,
            expires_at   TEXT NOT NULL,
            created_at   TEXT NOT NULL,
            updated_at   TEXT NOT NULL
        );",
    )
}

// ========== 时间戳辅助函数 ==========

/// 转换为落库格式（固定毫秒宽度，字符串可排序）
pub fn to_db_time(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// 从落库格式解析
pub fn parse_db_time(s: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
        })
}
