//! 应用组合根 - 编排层
//!
//! ## 职责
//!
//! 1. **应用初始化**：打开数据库、创建存储、发帖流程与调度器
//! 2. **资源所有者**：进程内唯一持有调度器实例的模块
//! 3. **生命周期**：启动调度循环，等待退出信号，优雅停止

use std::sync::Arc;

use anyhow::Result;
use tracing::info;

use crate::config::Config;
use crate::orchestrator::scheduler::Scheduler;
use crate::services::LoginFlow;
use crate::storage::{db, QueueStore, SessionStore};
use crate::workflow::PostFlow;

/// 应用主结构
pub struct App {
    config: Config,
    queue: QueueStore,
    sessions: SessionStore,
    scheduler: Arc<Scheduler>,
}

impl App {
    /// 初始化应用
    pub async fn initialize(config: Config) -> Result<Self> {
        log_startup(&config);

        let conn = db::open(&config.db_path).await?;
        let queue = QueueStore::new(conn.clone());
        let sessions = SessionStore::new(conn);

        let flow = PostFlow::new(sessions.clone(), &config);
        let scheduler = Arc::new(Scheduler::new(queue.clone(), Arc::new(flow), &config));

        Ok(Self {
            config,
            queue,
            sessions,
            scheduler,
        })
    }

    /// 运行应用主逻辑：启动调度循环直到收到退出信号
    pub async fn run(&self) -> Result<()> {
        self.scheduler.start();
        info!("💡 按 Ctrl-C 退出");

        tokio::signal::ctrl_c().await?;

        self.scheduler.stop();
        info!("👋 程序退出");
        Ok(())
    }

    /// 任务队列存储（对外边界：入队 / 查询 / 删除）
    pub fn queue(&self) -> &QueueStore {
        &self.queue
    }

    /// 会话存储（对外边界：会话 CRUD）
    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    /// 调度器
    pub fn scheduler(&self) -> &Arc<Scheduler> {
        &self.scheduler
    }

    /// 为运维工具创建独立的登录流程
    pub fn login_flow(&self) -> LoginFlow {
        LoginFlow::new(self.sessions.clone(), &self.config)
    }
}

// ========== 日志辅助函数 ==========

fn log_startup(config: &Config) {
    info!("{}", "=".repeat(60));
    info!("🚀 程序启动 - 定时发帖调度模式");
    info!("📊 轮询间隔: {} 秒", config.tick_interval_secs);
    info!("🗄️ 数据库: {}", config.db_path);
    info!("{}", "=".repeat(60));
}
