//! 任务数据模型
//!
//! 定义定时发帖任务（Job）及其事件日志（LogEntry）的结构。
//! 任务状态只允许单向流转：queued → processing → {posted, failed}，
//! failed 是终态，不做自动重试。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 任务状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// 已入队，等待调度
    Queued,
    /// 已被租约占用，正在处理
    Processing,
    /// 发布成功
    Posted,
    /// 发布失败（终态，不自动重试）
    Failed,
}

impl JobStatus {
    /// 获取数据库中存储的字符串表示
    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Processing => "processing",
            JobStatus::Posted => "posted",
            JobStatus::Failed => "failed",
        }
    }

    /// 从数据库字符串解析状态
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "queued" => Some(JobStatus::Queued),
            "processing" => Some(JobStatus::Processing),
            "posted" => Some(JobStatus::Posted),
            "failed" => Some(JobStatus::Failed),
            _ => None,
        }
    }
}

/// 日志事件类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogEventType {
    /// 任务入队
    Queued,
    /// 任务被租约占用
    Processing,
    /// 发布成功
    Posted,
    /// 发布失败
    Failed,
    /// 重试提示
    Retry,
    /// 阶段进度
    Progress,
    /// 里程碑
    Milestone,
}

impl LogEventType {
    pub fn as_str(self) -> &'static str {
        match self {
            LogEventType::Queued => "queued",
            LogEventType::Processing => "processing",
            LogEventType::Posted => "posted",
            LogEventType::Failed => "failed",
            LogEventType::Retry => "retry",
            LogEventType::Progress => "progress",
            LogEventType::Milestone => "milestone",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "queued" => Some(LogEventType::Queued),
            "processing" => Some(LogEventType::Processing),
            "posted" => Some(LogEventType::Posted),
            "failed" => Some(LogEventType::Failed),
            "retry" => Some(LogEventType::Retry),
            "progress" => Some(LogEventType::Progress),
            "milestone" => Some(LogEventType::Milestone),
            _ => None,
        }
    }
}

/// 定时发帖任务
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    /// 任务 ID（uuid v4）
    pub id: String,
    /// 目标 subreddit（不含 r/ 前缀）
    pub subreddit: String,
    /// 帖子标题
    pub caption: String,
    /// 帖子链接（link post 的目标 URL）
    pub url: Option<String>,
    /// 可选 flair 文本
    pub flair: Option<String>,
    /// 媒体引用 ID（由上游系统持有，本系统只透传）
    pub media_id: Option<String>,
    /// 计划发布时间
    pub scheduled_time: DateTime<Utc>,
    /// 当前状态
    pub status: JobStatus,
    /// 发布成功后的帖子链接
    pub post_url: Option<String>,
    /// 失败原因
    pub error_message: Option<String>,
    /// 下游客户端消费标记（单向，只从 false 翻转到 true）
    pub processed_by_client: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// 入队时由调用方提供的任务字段
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewJob {
    pub subreddit: String,
    pub caption: String,
    pub url: Option<String>,
    pub flair: Option<String>,
    pub media_id: Option<String>,
    pub scheduled_time: DateTime<Utc>,
}

/// 任务事件日志条目
///
/// 只追加，不修改；随所属任务级联删除。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub id: i64,
    pub job_id: String,
    pub event_type: LogEventType,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

/// listJobs 的返回结构：任务列表 + 本次读取时间
#[derive(Debug, Clone, Serialize)]
pub struct JobListing {
    pub jobs: Vec<Job>,
    pub last_updated: DateTime<Utc>,
}
