//! 登录流程 - 业务能力层
//!
//! 两个入口，通过运行标记互斥：
//! - `check_status`：无头检查当前登录状态，用完即拆浏览器
//! - `perform_login`：可见窗口等待人工完成登录，然后收割会话落库
//!
//! 两者都通过同步回调上报进度（launching_browser → navigating →
//! logging_in → completed | failed）。

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use tokio::time::{sleep, Instant};
use tracing::{info, warn};

use crate::browser::{self, BrowserContext};
use crate::config::Config;
use crate::error::SessionError;
use crate::infrastructure::JsExecutor;
use crate::platform::{PlatformAdapter, RedditAdapter};
use crate::storage::SessionStore;

/// 登录流程进度
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginProgress {
    /// 正在启动浏览器
    LaunchingBrowser,
    /// 正在导航到平台首页
    Navigating,
    /// 等待人工完成登录
    LoggingIn,
    /// 流程完成
    Completed,
    /// 流程失败
    Failed,
}

/// 进度回调（同步、进程内）
pub type LoginProgressCallback = Box<dyn Fn(LoginProgress) + Send + Sync>;

/// checkStatus 的结果
#[derive(Debug, Clone)]
pub struct LoginStatus {
    pub logged_in: bool,
    pub username: Option<String>,
}

/// performLogin 的结果
#[derive(Debug, Clone)]
pub struct LoginReport {
    pub success: bool,
    pub username: Option<String>,
    /// 兜底恢复等降级路径的说明
    pub warning: Option<String>,
}

/// 登录流程
pub struct LoginFlow {
    session_store: SessionStore,
    config: Config,
    running: AtomicBool,
    progress: Option<LoginProgressCallback>,
}

impl LoginFlow {
    /// 创建登录流程
    pub fn new(session_store: SessionStore, config: &Config) -> Self {
        Self {
            session_store,
            config: config.clone(),
            running: AtomicBool::new(false),
            progress: None,
        }
    }

    /// 设置进度回调
    pub fn with_progress(mut self, callback: LoginProgressCallback) -> Self {
        self.progress = Some(callback);
        self
    }

    fn report(&self, progress: LoginProgress) {
        if let Some(callback) = &self.progress {
            callback(progress);
        }
    }

    /// 两个入口互斥：抢不到运行标记直接报错
    fn acquire(&self) -> Result<RunGuard<'_>> {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            bail!(SessionError::AlreadyRunning);
        }
        Ok(RunGuard(&self.running))
    }

    /// 检查当前登录状态
    ///
    /// 无论结果如何，浏览器都会被拆除。
    pub async fn check_status(&self) -> Result<LoginStatus> {
        let _guard = self.acquire()?;
        self.report(LoginProgress::LaunchingBrowser);

        let session = self.session_store.get_data(None).await.unwrap_or(None);
        let mut ctx = browser::initialize(session.as_ref(), &self.config).await?;

        let result = self.inspect(&ctx).await;

        browser::close(&mut ctx).await;

        match result {
            Ok(status) => {
                self.report(LoginProgress::Completed);
                info!(
                    "✓ 登录状态检查完成: {} (用户: {})",
                    if status.logged_in { "已登录" } else { "未登录" },
                    status.username.as_deref().unwrap_or("-")
                );
                Ok(status)
            }
            Err(e) => {
                self.report(LoginProgress::Failed);
                Err(e)
            }
        }
    }

    /// 等待人工完成登录并收割会话
    ///
    /// 强制可见窗口；等待上限由 `login_timeout_secs` 控制（默认 5 分钟）。
    /// 兜底恢复：流程出错但会话已经有效落库时，降级为带警告的成功。
    pub async fn perform_login(&self) -> Result<LoginReport> {
        let _guard = self.acquire()?;
        self.report(LoginProgress::LaunchingBrowser);

        // 人工登录必须看得见窗口
        let mut visible_config = self.config.clone();
        visible_config.headless = false;

        let session = self.session_store.get_data(None).await.unwrap_or(None);
        let mut ctx = browser::initialize(session.as_ref(), &visible_config).await?;

        let result = self.drive_login(&ctx).await;

        browser::close(&mut ctx).await;

        match result {
            Ok(report) => {
                self.report(LoginProgress::Completed);
                Ok(report)
            }
            Err(e) => {
                // 兜底：会话实际上已经有效落库，不丢弃
                if self.session_store.is_valid(None).await.unwrap_or(false) {
                    warn!("⚠️ 登录流程出错但会话已有效落库，降级为成功: {}", e);
                    self.report(LoginProgress::Completed);
                    return Ok(LoginReport {
                        success: true,
                        username: None,
                        warning: Some(format!("登录流程出错但会话已保存: {}", e)),
                    });
                }
                self.report(LoginProgress::Failed);
                Err(e)
            }
        }
    }

    // ========== 内部步骤 ==========

    async fn inspect(&self, ctx: &BrowserContext) -> Result<LoginStatus> {
        let adapter = self.adapter(ctx);
        self.report(LoginProgress::Navigating);
        adapter.open_home().await?;
        adapter.wait_app_shell().await?;

        let logged_in = adapter.is_logged_in().await?;
        let username = if logged_in {
            adapter.extract_username().await?
        } else {
            None
        };
        Ok(LoginStatus {
            logged_in,
            username,
        })
    }

    async fn drive_login(&self, ctx: &BrowserContext) -> Result<LoginReport> {
        let adapter = self.adapter(ctx);
        self.report(LoginProgress::Navigating);
        adapter.open_home().await?;
        adapter.wait_app_shell().await?;

        // 已经是登录态：直接收割
        if adapter.is_logged_in().await? {
            info!("✓ 已处于登录状态，直接保存会话");
            let username = adapter.extract_username().await?;
            self.harvest_session(ctx, username.as_deref()).await?;
            return Ok(LoginReport {
                success: true,
                username,
                warning: None,
            });
        }

        self.report(LoginProgress::LoggingIn);
        info!(
            "🧑 请在浏览器窗口中完成登录（最多等待 {} 秒）...",
            self.config.login_timeout_secs
        );

        let deadline = Instant::now() + Duration::from_secs(self.config.login_timeout_secs);
        loop {
            if adapter.is_logged_in().await.unwrap_or(false) {
                break;
            }
            if Instant::now() >= deadline {
                bail!(SessionError::LoginTimeout {
                    secs: self.config.login_timeout_secs,
                });
            }
            sleep(Duration::from_secs(2)).await;
        }

        let username = adapter.extract_username().await?;
        self.harvest_session(ctx, username.as_deref()).await?;
        info!(
            "✅ 登录完成: {}",
            username.as_deref().unwrap_or("(未识别用户名)")
        );
        Ok(LoginReport {
            success: true,
            username,
            warning: None,
        })
    }

    /// 快照会话、落库并校验
    async fn harvest_session(&self, ctx: &BrowserContext, username: Option<&str>) -> Result<()> {
        let bundle = browser::persist_session(ctx)
            .await
            .context("快照会话失败")?;
        self.session_store
            .update(&bundle, username, None, None)
            .await
            .context("会话落库失败")?;

        // 校验会话确实存在
        if self.session_store.get(None).await?.is_none() {
            bail!("会话落库后校验失败：记录不存在");
        }
        Ok(())
    }

    fn adapter(&self, ctx: &BrowserContext) -> RedditAdapter {
        RedditAdapter::new(
            JsExecutor::new(ctx.page().clone()),
            &self.config.base_url,
            Duration::from_secs(self.config.dom_wait_secs),
        )
    }
}

/// 运行标记的自动释放
struct RunGuard<'a>(&'a AtomicBool);

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}
