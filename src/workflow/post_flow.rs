//! 发帖流程 - 流程层
//!
//! 核心职责：驱动"一个任务"从校验到提帖的完整流水线
//!
//! 流程顺序：
//! 1. validate → 2. launch → 3. navigate → 4. rate-limit 探测
//! → 5. captcha 探测 → 6. ensure-login → 7. submit → 8. 提取结果
//!
//! 失败语义：任何阶段抛错都会被捕获、带任务 ID 记日志，并转成失败结果；
//! 错误信息提到 session / login / auth 时统一改写为哨兵 `session_expired`，
//! 让调用方能区分"需要重新认证"和一般失败。浏览器上下文无论成败都会关闭。

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use tokio::time::{sleep, Instant};
use tracing::{error, info, warn};

use crate::browser;
use crate::config::Config;
use crate::error::{PostingError, ValidationError};
use crate::infrastructure::JsExecutor;
use crate::models::Job;
use crate::platform::{PlatformAdapter, RedditAdapter};
use crate::storage::SessionStore;
use crate::utils::logging::truncate_text;

/// 认证类失败的哨兵错误信息
pub const SESSION_EXPIRED: &str = "session_expired";
/// ensure-login 有界等待超时的哨兵错误信息
pub const NEEDS_INTERACTIVE_LOGIN: &str = "needs_interactive_login";

/// 发帖流程进度
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostProgress {
    /// 校验任务字段
    Validating,
    /// 启动浏览器
    LaunchingBrowser,
    /// 导航到提交页
    Navigating,
    /// 探测频率限制
    CheckingRateLimit,
    /// 确认登录状态
    EnsuringLogin,
    /// 填写并提交
    Submitting,
    /// 提取帖子链接
    ExtractingResult,
    /// 流程完成
    Completed,
    /// 流程失败
    Failed,
}

/// 进度回调（同步、进程内）
pub type PostProgressCallback = Box<dyn Fn(PostProgress) + Send + Sync>;

/// 发帖结果
///
/// `post_url` 为 None 表示软成功：帖子大概率已发出，但页面上没定位到链接。
#[derive(Debug, Clone)]
pub struct PostOutcome {
    pub post_url: Option<String>,
}

/// 阶段间共享的可变状态
#[derive(Debug, Default)]
pub struct StageState {
    /// ensure-login 阶段是否刷新过登录态（刷新过就要保存新会话）
    pub login_refreshed: bool,
    /// 刷新登录后识别到的用户名
    pub username: Option<String>,
}

/// 任务处理器接口
///
/// 调度器依赖这个 seam，测试时可以用假处理器替代真实浏览器流程。
#[async_trait]
pub trait JobProcessor: Send + Sync {
    async fn process(&self, job: &Job) -> Result<PostOutcome>;
}

/// 发帖流程
///
/// 同一个 poster 实例一次只处理一个任务（运行标记互斥）。
pub struct PostFlow {
    session_store: SessionStore,
    config: Config,
    running: AtomicBool,
    progress: Option<PostProgressCallback>,
}

impl PostFlow {
    /// 创建发帖流程
    pub fn new(session_store: SessionStore, config: &Config) -> Self {
        Self {
            session_store,
            config: config.clone(),
            running: AtomicBool::new(false),
            progress: None,
        }
    }

    /// 设置进度回调
    pub fn with_progress(mut self, callback: PostProgressCallback) -> Self {
        self.progress = Some(callback);
        self
    }

    fn report(&self, progress: PostProgress) {
        if let Some(callback) = &self.progress {
            callback(progress);
        }
    }

    /// 处理一个任务的完整流水线
    ///
    /// 返回 Err 时错误信息已经过哨兵归一化，可直接写入任务的 error_message。
    pub async fn run(&self, job: &Job) -> Result<PostOutcome> {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            bail!(PostingError::AlreadyRunning);
        }
        let _guard = RunGuard(&self.running);

        let short = short_id(&job.id);
        info!(
            "[任务 {}] 🚚 开始处理: r/{} | {}",
            short,
            job.subreddit,
            truncate_text(&job.caption, 40)
        );

        match self.execute(job).await {
            Ok(outcome) => {
                self.report(PostProgress::Completed);
                info!("[任务 {}] ✅ 处理完成", short);
                Ok(outcome)
            }
            Err(e) => {
                self.report(PostProgress::Failed);
                let message = normalize_error_message(&e.to_string());
                error!("[任务 {}] ❌ 处理失败: {}", short, message);
                Err(anyhow!(message))
            }
        }
    }

    async fn execute(&self, job: &Job) -> Result<PostOutcome> {
        // ========== 阶段 1: 校验（浏览器尚未启动，快速失败） ==========
        self.report(PostProgress::Validating);
        validate(job)?;

        // ========== 阶段 2: 启动浏览器（带当前有效会话） ==========
        self.report(PostProgress::LaunchingBrowser);
        let session = self.session_store.get_data(None).await.unwrap_or(None);
        let mut ctx = browser::initialize(session.as_ref(), &self.config).await?;

        let adapter = RedditAdapter::new(
            JsExecutor::new(ctx.page().clone()),
            &self.config.base_url,
            Duration::from_secs(self.config.dom_wait_secs),
        );

        let mut state = StageState::default();
        let result = self.run_stages(job, &adapter, &mut state).await;

        // 登录刷新过就保存新会话，流程成败都不浪费这次人工登录
        if state.login_refreshed {
            match browser::persist_session(&ctx).await {
                Ok(bundle) => {
                    if let Err(e) = self
                        .session_store
                        .update(&bundle, state.username.as_deref(), None, None)
                        .await
                    {
                        warn!("⚠️ 保存刷新后的会话失败: {}", e);
                    } else {
                        info!("🔑 已保存刷新后的会话");
                    }
                }
                Err(e) => warn!("⚠️ 快照刷新后的会话失败: {}", e),
            }
        }

        // 清理：无论成败都关闭浏览器
        browser::close(&mut ctx).await;

        result.map(|post_url| PostOutcome { post_url })
    }

    /// 阶段 3-8：导航之后的全部流水线
    ///
    /// 不持有浏览器资源，只依赖适配器接口 —— 可以用假适配器做无浏览器测试。
    pub async fn run_stages(
        &self,
        job: &Job,
        adapter: &dyn PlatformAdapter,
        state: &mut StageState,
    ) -> Result<Option<String>> {
        let short = short_id(&job.id);
        // validate 已确保 url 存在
        let url = job.url.as_deref().unwrap_or_default();

        // ========== 阶段 3: 导航到提交页 ==========
        self.report(PostProgress::Navigating);
        adapter.open_submit_page(&job.subreddit).await?;
        adapter.wait_app_shell().await?;

        // ========== 阶段 4: 频率限制探测 ==========
        self.report(PostProgress::CheckingRateLimit);
        if let Some(wait_secs) = adapter.detect_rate_limit().await? {
            warn!(
                "[任务 {}] ⛔ 命中频率限制，建议等待 {} 秒",
                short, wait_secs
            );
            bail!(PostingError::RateLimited { wait_secs });
        }

        // ========== 阶段 5: 验证码探测 ==========
        if adapter.detect_captcha().await? {
            bail!(PostingError::CaptchaDetected);
        }

        // ========== 阶段 6: ensure-login（有界等待） ==========
        self.report(PostProgress::EnsuringLogin);
        if !adapter.is_logged_in().await? {
            warn!(
                "[任务 {}] 🔐 未检测到登录状态，等待人工登录（上限 {} 秒）",
                short, self.config.interactive_login_timeout_secs
            );
            let deadline =
                Instant::now() + Duration::from_secs(self.config.interactive_login_timeout_secs);
            loop {
                if adapter.is_logged_in().await.unwrap_or(false) {
                    state.login_refreshed = true;
                    state.username = adapter.extract_username().await.unwrap_or(None);
                    info!("[任务 {}] ✓ 登录已恢复", short);
                    break;
                }
                if Instant::now() >= deadline {
                    // 超时转成独立的哨兵分类，不阻塞整个调度循环
                    bail!(NEEDS_INTERACTIVE_LOGIN);
                }
                sleep(Duration::from_secs(2)).await;
            }
        }

        // ========== 阶段 7: 填写并提交 ==========
        self.report(PostProgress::Submitting);
        adapter.fill_submission(&job.caption, url).await?;

        if adapter.flair_required().await? {
            let Some(flair) = job.flair.as_deref().filter(|f| !f.trim().is_empty()) else {
                bail!(PostingError::FlairMissing {
                    subreddit: job.subreddit.clone(),
                });
            };
            adapter.select_flair(flair).await?;
        }

        adapter.submit().await?;
        adapter.wait_app_shell().await?;

        // ========== 阶段 8: 提取结果（定位不到视为软成功） ==========
        self.report(PostProgress::ExtractingResult);
        match adapter.extract_post_url(&job.caption).await? {
            Some(post_url) => {
                info!("[任务 {}] 🔗 帖子链接: {}", short, post_url);
                Ok(Some(post_url))
            }
            None => {
                warn!("[任务 {}] ⚠️ 未检测到帖子链接，按软成功处理", short);
                Ok(None)
            }
        }
    }
}

#[async_trait]
impl JobProcessor for PostFlow {
    async fn process(&self, job: &Job) -> Result<PostOutcome> {
        self.run(job).await
    }
}

// ========== 校验与错误归一化 ==========

/// 阶段 1：必填字段校验
pub fn validate(job: &Job) -> Result<()> {
    if job.subreddit.trim().is_empty() {
        bail!(ValidationError::EmptyField { field: "subreddit" });
    }
    if job.caption.trim().is_empty() {
        bail!(ValidationError::EmptyField { field: "caption" });
    }
    if job.url.as_deref().map(str::trim).unwrap_or_default().is_empty() {
        bail!(ValidationError::EmptyField { field: "url" });
    }
    Ok(())
}

/// 错误信息哨兵归一化
///
/// - `needs_interactive_login` 原样保留（独立分类，便于运维介入）
/// - 提到 session / login / auth（含中文）的统一改写为 `session_expired`
pub fn normalize_error_message(message: &str) -> String {
    if message.contains(NEEDS_INTERACTIVE_LOGIN) {
        return NEEDS_INTERACTIVE_LOGIN.to_string();
    }
    let lower = message.to_lowercase();
    let auth_keywords = ["session", "login", "auth", "登录", "会话", "认证"];
    if auth_keywords.iter().any(|kw| lower.contains(kw)) {
        SESSION_EXPIRED.to_string()
    } else {
        message.to_string()
    }
}

fn short_id(id: &str) -> String {
    id.chars().take(8).collect()
}

/// 运行标记的自动释放
struct RunGuard<'a>(&'a AtomicBool);

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}
