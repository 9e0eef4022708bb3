//! 任务队列存储 - 存储层
//!
//! ## 职责
//!
//! 1. **入队**：持久化新任务并追加 "queued" 日志
//! 2. **原子租约**：一个事务内查出全部到期任务并整体置为 processing，
//!    两个并发调用方永远不会租到同一个任务
//! 3. **状态回写**：任务完成后更新状态并追加对应日志
//! 4. **查询/删除**：对外边界需要的任务列表、详情、日志和硬删除
//!
//! 租约是任务进入 processing 的唯一入口；failed 与 posted 是终态，
//! 终态任务不会再次被租约选中。

use chrono::{DateTime, Utc};
use rusqlite::{params, TransactionBehavior};
use tokio_rusqlite::Connection;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{AppError, AppResult, ValidationError};
use crate::models::{Job, JobListing, JobStatus, LogEntry, LogEventType, NewJob};
use crate::storage::db::{parse_db_time, to_db_time};

const JOB_COLUMNS: &str = "id, subreddit, caption, url, flair, media_id, scheduled_time, \
                           status, post_url, error_message, processed_by_client, \
                           created_at, updated_at";

/// 任务队列存储
#[derive(Clone)]
pub struct QueueStore {
    conn: Connection,
}

impl QueueStore {
    /// 基于已打开的连接创建存储
    pub fn new(conn: Connection) -> Self {
        Self { conn }
    }

    /// 入队新任务
    ///
    /// 校验必填字段后落库，status=queued，并在同一事务内追加 "queued" 日志。
    pub async fn enqueue(&self, fields: NewJob) -> AppResult<Job> {
        validate_fields(&fields)?;

        let now = Utc::now();
        let job = Job {
            id: Uuid::new_v4().to_string(),
            subreddit: fields.subreddit,
            caption: fields.caption,
            url: fields.url,
            flair: fields.flair,
            media_id: fields.media_id,
            scheduled_time: fields.scheduled_time,
            status: JobStatus::Queued,
            post_url: None,
            error_message: None,
            processed_by_client: false,
            created_at: now,
            updated_at: now,
        };

        let row = job.clone();
        self.conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                tx.execute(
                    "INSERT INTO jobs (id, subreddit, caption, url, flair, media_id, \
                     scheduled_time, status, post_url, error_message, processed_by_client, \
                     created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, NULL, NULL, 0, ?9, ?9)",
                    params![
                        row.id,
                        row.subreddit,
                        row.caption,
                        row.url,
                        row.flair,
                        row.media_id,
                        to_db_time(row.scheduled_time),
                        JobStatus::Queued.as_str(),
                        to_db_time(row.created_at),
                    ],
                )?;
                append_log(&tx, &row.id, LogEventType::Queued, "任务已入队", row.created_at)?;
                tx.commit()?;
                Ok(())
            })
            .await?;

        info!(
            "📥 任务已入队: {} → r/{} @ {}",
            job.id, job.subreddit, job.scheduled_time
        );
        Ok(job)
    }

    /// 原子租约：取出全部到期任务并整体置为 processing
    ///
    /// 一个事务内完成"读 + 批量更新"，按计划时间升序返回租到的任务。
    /// 事务整体成败：失败时没有任何任务被占用，调用方等待下一个 tick 重试。
    pub async fn lease_due_jobs(&self, now: DateTime<Utc>) -> AppResult<Vec<Job>> {
        let leased = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

                let mut due = {
                    let mut stmt = tx.prepare(&format!(
                        "SELECT {} FROM jobs
                         WHERE status = 'queued' AND scheduled_time <= ?1
                         ORDER BY scheduled_time ASC",
                        JOB_COLUMNS
                    ))?;
                    let rows = stmt.query_map([to_db_time(now)], job_from_row)?;
                    rows.collect::<rusqlite::Result<Vec<Job>>>()?
                };

                for job in &mut due {
                    tx.execute(
                        "UPDATE jobs SET status = 'processing', updated_at = ?1
                         WHERE id = ?2 AND status = 'queued'",
                        params![to_db_time(now), job.id],
                    )?;
                    append_log(&tx, &job.id, LogEventType::Processing, "开始处理", now)?;
                    job.status = JobStatus::Processing;
                    job.updated_at = now;
                }

                tx.commit()?;
                Ok(due)
            })
            .await
            .map_err(AppError::lease_failed)?;

        if !leased.is_empty() {
            debug!("🔒 本次租约占用 {} 个任务", leased.len());
        }
        Ok(leased)
    }

    /// 回写任务终态并追加对应日志
    ///
    /// 日志消息由状态推导：成功带帖子链接，失败带错误原因。
    pub async fn complete_job(
        &self,
        id: &str,
        status: JobStatus,
        post_url: Option<&str>,
        error_message: Option<&str>,
    ) -> AppResult<()> {
        let id = id.to_string();
        let post_url = post_url.map(|s| s.to_string());
        let error_message = error_message.map(|s| s.to_string());
        let now = Utc::now();

        let (event, message) = match status {
            JobStatus::Posted => (
                LogEventType::Posted,
                match &post_url {
                    Some(url) => format!("发布成功: {}", url),
                    None => "发布成功（未检测到帖子链接）".to_string(),
                },
            ),
            JobStatus::Failed => (
                LogEventType::Failed,
                match &error_message {
                    Some(err) => format!("发布失败: {}", err),
                    None => "发布失败".to_string(),
                },
            ),
            other => (
                LogEventType::Milestone,
                format!("状态更新: {}", other.as_str()),
            ),
        };

        self.conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                tx.execute(
                    "UPDATE jobs SET status = ?1, post_url = ?2, error_message = ?3, \
                     updated_at = ?4 WHERE id = ?5",
                    params![status.as_str(), post_url, error_message, to_db_time(now), id],
                )?;
                append_log(&tx, &id, event, &message, now)?;
                tx.commit()?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    /// 硬删除任务，日志级联删除；返回是否确实删除了记录
    pub async fn delete_job(&self, id: &str) -> AppResult<bool> {
        let id = id.to_string();
        let removed = self
            .conn
            .call(move |conn| {
                let n = conn.execute("DELETE FROM jobs WHERE id = ?1", [&id])?;
                Ok(n > 0)
            })
            .await?;
        Ok(removed)
    }

    /// 读取任务日志（最新在前）
    pub async fn read_logs(&self, job_id: &str) -> AppResult<Vec<LogEntry>> {
        let job_id = job_id.to_string();
        let entries = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, job_id, event_type, message, timestamp
                     FROM job_logs WHERE job_id = ?1
                     ORDER BY id DESC",
                )?;
                let rows = stmt.query_map([&job_id], log_from_row)?;
                Ok(rows.collect::<rusqlite::Result<Vec<LogEntry>>>()?)
            })
            .await?;
        Ok(entries)
    }

    /// 查询任务列表（可按更新时间增量拉取）
    pub async fn list_jobs(&self, since: Option<DateTime<Utc>>) -> AppResult<JobListing> {
        let now = Utc::now();
        let jobs = self
            .conn
            .call(move |conn| {
                let mut jobs = Vec::new();
                match since {
                    Some(since) => {
                        let mut stmt = conn.prepare(&format!(
                            "SELECT {} FROM jobs WHERE updated_at > ?1
                             ORDER BY created_at DESC",
                            JOB_COLUMNS
                        ))?;
                        let rows = stmt.query_map([to_db_time(since)], job_from_row)?;
                        for row in rows {
                            jobs.push(row?);
                        }
                    }
                    None => {
                        let mut stmt = conn.prepare(&format!(
                            "SELECT {} FROM jobs ORDER BY created_at DESC",
                            JOB_COLUMNS
                        ))?;
                        let rows = stmt.query_map([], job_from_row)?;
                        for row in rows {
                            jobs.push(row?);
                        }
                    }
                }
                Ok(jobs)
            })
            .await?;
        Ok(JobListing {
            jobs,
            last_updated: now,
        })
    }

    /// 按 ID 查询单个任务
    pub async fn get_job(&self, id: &str) -> AppResult<Option<Job>> {
        let id = id.to_string();
        let job = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {} FROM jobs WHERE id = ?1",
                    JOB_COLUMNS
                ))?;
                let mut rows = stmt.query_map([&id], job_from_row)?;
                match rows.next() {
                    Some(row) => Ok(Some(row?)),
                    None => Ok(None),
                }
            })
            .await?;
        Ok(job)
    }

    /// 下游客户端消费标记（单向闩锁）
    ///
    /// 只有 posted 且尚未标记的任务会被翻转；返回是否确实发生了翻转。
    pub async fn mark_processed(&self, id: &str) -> AppResult<bool> {
        let id = id.to_string();
        let now = Utc::now();
        let flipped = self
            .conn
            .call(move |conn| {
                let n = conn.execute(
                    "UPDATE jobs SET processed_by_client = 1, updated_at = ?1
                     WHERE id = ?2 AND status = 'posted' AND processed_by_client = 0",
                    params![to_db_time(now), id],
                )?;
                Ok(n > 0)
            })
            .await?;
        Ok(flipped)
    }
}

// ========== 行映射与校验 ==========

fn job_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Job> {
    let status: String = row.get(7)?;
    let scheduled: String = row.get(6)?;
    let created: String = row.get(11)?;
    let updated: String = row.get(12)?;
    Ok(Job {
        id: row.get(0)?,
        subreddit: row.get(1)?,
        caption: row.get(2)?,
        url: row.get(3)?,
        flair: row.get(4)?,
        media_id: row.get(5)?,
        scheduled_time: parse_db_time(&scheduled)?,
        status: JobStatus::from_str(&status).unwrap_or(JobStatus::Failed),
        post_url: row.get(8)?,
        error_message: row.get(9)?,
        processed_by_client: row.get(10)?,
        created_at: parse_db_time(&created)?,
        updated_at: parse_db_time(&updated)?,
    })
}

fn log_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<LogEntry> {
    let event: String = row.get(2)?;
    let ts: String = row.get(4)?;
    Ok(LogEntry {
        id: row.get(0)?,
        job_id: row.get(1)?,
        event_type: LogEventType::from_str(&event).unwrap_or(LogEventType::Milestone),
        message: row.get(3)?,
        timestamp: parse_db_time(&ts)?,
    })
}

fn append_log(
    tx: &rusqlite::Transaction<'_>,
    job_id: &str,
    event: LogEventType,
    message: &str,
    at: DateTime<Utc>,
) -> rusqlite::Result<()> {
    tx.execute(
        "INSERT INTO job_logs (job_id, event_type, message, timestamp)
         VALUES (?1, ?2, ?3, ?4)",
        params![job_id, event.as_str(), message, to_db_time(at)],
    )?;
    Ok(())
}

/// 入队前的字段校验：subreddit / caption 非空，URL（若提供）必须合法
fn validate_fields(fields: &NewJob) -> AppResult<()> {
    if fields.subreddit.trim().is_empty() {
        return Err(AppError::Validation(ValidationError::EmptyField {
            field: "subreddit",
        }));
    }
    if fields.caption.trim().is_empty() {
        return Err(AppError::Validation(ValidationError::EmptyField {
            field: "caption",
        }));
    }
    if let Some(url) = &fields.url {
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(AppError::Validation(ValidationError::InvalidUrl {
                url: url.clone(),
            }));
        }
    }
    Ok(())
}
