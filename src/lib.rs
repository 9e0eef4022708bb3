//! # Reddit Auto Submit
//!
//! 一个定时驱动真实浏览器向 Reddit 网页端提帖的 Rust 应用程序
//!
//! ## 架构设计
//!
//! 本系统采用分层架构：
//!
//! ### ① 基础设施层（Infrastructure）
//! - `infrastructure/` - 持有稀缺资源（Page），只暴露能力
//! - `JsExecutor` - 唯一的 page owner，提供 eval() / 轮询等待能力
//!
//! ### ② 存储层（Storage）
//! - `storage/` - 任务表与会话表，系统唯一的共享可变状态
//! - `QueueStore` - 入队 / 原子租约 / 状态回写 / 日志
//! - `SessionStore` - 会话保存 / 更新 / 读取时计算有效性
//!
//! ### ③ 平台层与浏览器层（Platform / Browser）
//! - `platform/` - DOM 耦合的站点操作收敛到适配器接口背后
//! - `browser/` - Chromium 进程生命周期、指纹伪装、会话恢复
//!
//! ### ④ 业务能力层（Services）
//! - `services/` - 描述"我能做什么"，只处理单个关注点
//! - `LoginFlow` - 登录状态检查 / 人工登录收割能力
//!
//! ### ⑤ 流程层（Workflow）
//! - `workflow/` - 定义"一个任务"的完整提帖流水线
//! - `PostFlow` - 流程编排（validate → launch → navigate → 限流探测
//!   → ensure-login → submit → 提取结果）
//!
//! ### ⑥ 编排层（Orchestration）
//! - `orchestrator/scheduler` - 定时 tick、租约、串行处理
//! - `orchestrator/app` - 组合根，持有唯一的调度器实例
//!
//! ## 模块结构

pub mod browser;
pub mod config;
pub mod error;
pub mod infrastructure;

pub mod models;
pub mod orchestrator;
pub mod platform;
pub mod services;
pub mod storage;
pub mod utils;
pub mod workflow;

// 重新导出常用类型
pub use config::Config;
pub use error::{AppError, AppResult};
pub use infrastructure::JsExecutor;
pub use models::{Job, JobStatus, LogEntry, NewJob, Session, SessionData};
pub use orchestrator::{App, Scheduler};
pub use platform::{PlatformAdapter, RedditAdapter};
pub use services::{LoginFlow, LoginProgress};
pub use storage::{QueueStore, SessionStore};
pub use workflow::{JobProcessor, PostFlow, PostOutcome, PostProgress};
