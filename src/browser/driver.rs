//! 浏览器驱动 - 浏览器层
//!
//! 包装真实的 Chromium 进程：启动、伪装指纹、拦截大体积资源、
//! 恢复/快照登录会话、关闭。
//!
//! 会话恢复失败只记日志不报错 —— 流程层的 ensure-login 阶段
//! 仍有机会以未登录状态恢复。

use std::path::Path;
use std::time::Duration;

use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::emulation::SetTimezoneOverrideParams;
use chromiumoxide::cdp::browser_protocol::network::SetUserAgentOverrideParams;
use chromiumoxide::cdp::browser_protocol::fetch::{
    self, ContinueRequestParams, EventRequestPaused, FailRequestParams, RequestPattern,
    RequestStage,
};
use chromiumoxide::cdp::browser_protocol::network::{CookieParam, ErrorReason, ResourceType};
use chromiumoxide::cdp::browser_protocol::page::AddScriptToEvaluateOnNewDocumentParams;
use chromiumoxide::Page;
use futures::StreamExt;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{AppError, AppResult, BrowserError};
use crate::models::{SessionCookie, SessionData};

/// 指纹伪装脚本，在每个文档加载前注入
const STEALTH_JS: &str = r#"
Object.defineProperty(navigator, 'webdriver', { get: () => undefined });
window.chrome = window.chrome || { runtime: {} };
Object.defineProperty(navigator, 'languages', { get: () => ['en-US', 'en'] });
Object.defineProperty(navigator, 'plugins', { get: () => [1, 2, 3, 4, 5] });
"#;

/// 放行关键词：小图标类资源不拦截
const FILTER_ALLOW_KEYWORDS: [&str; 5] = ["icon", "logo", "avatar", "favicon", "sprite"];

/// 浏览器上下文
///
/// 两种模式：
/// - 临时模式：关闭即丢弃，调用方需要先 `persist_session` 快照状态
/// - 持久目录模式：状态随 user_data_dir 保留
pub struct BrowserContext {
    browser: Option<Browser>,
    page: Page,
    handler_task: Option<JoinHandle<()>>,
    filter_task: Option<JoinHandle<()>>,
    /// 是否为持久目录模式
    pub persistent: bool,
}

impl BrowserContext {
    /// 获取唯一页面
    pub fn page(&self) -> &Page {
        &self.page
    }
}

/// 启动浏览器并准备好一个页面
///
/// # 参数
/// - `session`: 可选的持久化会话，存在时恢复到新上下文
/// - `config`: 程序配置（无头开关、可执行路径、持久目录等）
pub async fn initialize(
    session: Option<&SessionData>,
    config: &Config,
) -> AppResult<BrowserContext> {
    info!(
        "🚀 启动浏览器 (headless: {}, 持久目录: {})",
        config.headless,
        config.user_data_dir.as_deref().unwrap_or("无")
    );

    let browser_config = build_browser_config(config)?;

    let (browser, mut handler) = Browser::launch(browser_config)
        .await
        .map_err(AppError::browser_launch_failed)?;
    debug!("浏览器启动成功");

    // 在后台处理浏览器事件
    let handler_task = tokio::spawn(async move {
        while let Some(h) = handler.next().await {
            if h.is_err() {
                break;
            }
        }
    });

    // 添加短暂延迟以等待浏览器状态同步
    sleep(Duration::from_millis(300)).await;

    let page = browser
        .new_page("about:blank")
        .await
        .map_err(|e| AppError::Browser(BrowserError::PageCreationFailed { source: Box::new(e) }))?;

    apply_fingerprint(&page, session, config).await?;
    let filter_task = install_media_filter(&page).await?;

    let ctx = BrowserContext {
        browser: Some(browser),
        page,
        handler_task: Some(handler_task),
        filter_task,
        persistent: config.user_data_dir.is_some(),
    };

    // 恢复会话失败不致命：继续以未登录状态运行
    if let Some(session) = session {
        if let Err(e) = restore_session(&ctx, session, &config.base_url).await {
            warn!("⚠️ 恢复会话失败，将以未登录状态继续: {}", e);
        } else {
            info!("✓ 已恢复持久化会话 ({} 个 cookie)", session.cookies.len());
        }
    }

    Ok(ctx)
}

/// 快照当前 cookie / localStorage / UA 为会话包
///
/// 调用前页面需要停留在平台域名下，否则 localStorage 快照为空。
pub async fn persist_session(ctx: &BrowserContext) -> AppResult<SessionData> {
    let page = ctx.page();

    let cookies = page
        .get_cookies()
        .await?
        .into_iter()
        .map(|c| SessionCookie {
            name: c.name,
            value: c.value,
            domain: c.domain,
            path: c.path,
            expires: if c.session { None } else { Some(c.expires) },
            http_only: c.http_only,
            secure: c.secure,
        })
        .collect::<Vec<_>>();

    let local_storage = page
        .evaluate(
            r#"(() => {
                const out = {};
                try {
                    for (let i = 0; i < localStorage.length; i++) {
                        const key = localStorage.key(i);
                        out[key] = localStorage.getItem(key);
                    }
                } catch (e) {}
                return out;
            })()"#,
        )
        .await?
        .into_value::<std::collections::HashMap<String, String>>()
        .unwrap_or_default();

    let user_agent = page
        .evaluate("navigator.userAgent")
        .await
        .ok()
        .and_then(|v| v.into_value::<String>().ok());

    debug!(
        "会话快照: {} 个 cookie, {} 条 localStorage",
        cookies.len(),
        local_storage.len()
    );

    Ok(SessionData {
        cookies,
        local_storage,
        user_agent,
    })
}

/// 关闭浏览器上下文；对已关闭的上下文重复调用是安全的
pub async fn close(ctx: &mut BrowserContext) {
    if let Some(task) = ctx.filter_task.take() {
        task.abort();
    }
    if let Some(mut browser) = ctx.browser.take() {
        if let Err(e) = browser.close().await {
            debug!("关闭浏览器时出错（忽略）: {}", e);
        }
        let _ = browser.wait().await;
        info!("✓ 浏览器已关闭");
    }
    if let Some(task) = ctx.handler_task.take() {
        task.abort();
    }
}

// ========== 启动配置 ==========

fn build_browser_config(config: &Config) -> AppResult<BrowserConfig> {
    let lang_arg = format!("--lang={}", config.locale);
    let args = vec![
        "--disable-gpu",
        "--no-sandbox",
        "--disable-dev-shm-usage",
        "--disable-blink-features=AutomationControlled",
        "--no-first-run",
        "--no-default-browser-check",
        lang_arg.as_str(),
    ];

    let mut builder = BrowserConfig::builder()
        .window_size(1280, 900)
        .args(args);

    builder = if config.headless {
        builder.new_headless_mode()
    } else {
        builder.with_head()
    };

    if let Some(path) = &config.chrome_executable {
        builder = builder.chrome_executable(Path::new(path));
    }
    if let Some(dir) = &config.user_data_dir {
        builder = builder.user_data_dir(Path::new(dir));
    }

    builder
        .build()
        .map_err(|message| AppError::Browser(BrowserError::ConfigurationFailed { message }))
}

/// 应用 UA / 时区 / 指纹伪装
async fn apply_fingerprint(
    page: &Page,
    session: Option<&SessionData>,
    config: &Config,
) -> AppResult<()> {
    // 优先沿用捕获会话时的 UA，保持指纹一致
    let user_agent = session
        .and_then(|s| s.user_agent.clone())
        .unwrap_or_else(|| config.user_agent.clone());
    page.set_user_agent(SetUserAgentOverrideParams::new(user_agent))
        .await?;

    page.execute(SetTimezoneOverrideParams::new(config.timezone.clone()))
        .await?;

    page.execute(AddScriptToEvaluateOnNewDocumentParams::new(STEALTH_JS))
        .await?;

    debug!("指纹伪装已应用");
    Ok(())
}

/// 安装网络过滤器：中断大体积图片/媒体/字体下载
///
/// 小图标类资源（icon / logo / avatar）放行，避免页面布局崩坏。
async fn install_media_filter(page: &Page) -> AppResult<Option<JoinHandle<()>>> {
    let patterns = [ResourceType::Image, ResourceType::Media, ResourceType::Font]
        .into_iter()
        .map(|resource_type| RequestPattern {
            url_pattern: Some("*".to_string()),
            resource_type: Some(resource_type),
            request_stage: Some(RequestStage::Request),
        })
        .collect::<Vec<_>>();

    page.execute(fetch::EnableParams {
        patterns: Some(patterns),
        handle_auth_requests: None,
    })
    .await?;

    let mut events = page.event_listener::<EventRequestPaused>().await?;
    let page = page.clone();
    let task = tokio::spawn(async move {
        while let Some(event) = events.next().await {
            let url = event.request.url.to_lowercase();
            let allowed = FILTER_ALLOW_KEYWORDS.iter().any(|kw| url.contains(kw));
            let result = if allowed {
                page.execute(ContinueRequestParams::new(event.request_id.clone()))
                    .await
                    .map(|_| ())
            } else {
                page.execute(FailRequestParams::new(
                    event.request_id.clone(),
                    ErrorReason::BlockedByClient,
                ))
                .await
                .map(|_| ())
            };
            if result.is_err() {
                break;
            }
        }
    });

    Ok(Some(task))
}

// ========== 会话恢复 ==========

async fn restore_session(
    ctx: &BrowserContext,
    session: &SessionData,
    base_url: &str,
) -> AppResult<()> {
    let page = ctx.page();

    if !session.cookies.is_empty() {
        let params = session
            .cookies
            .iter()
            .map(cookie_to_param)
            .collect::<Vec<_>>();
        page.set_cookies(params).await.map_err(|e| {
            AppError::Browser(BrowserError::SessionRestoreFailed { source: Box::new(e) })
        })?;
    }

    // localStorage 必须在平台域名下恢复
    if !session.local_storage.is_empty() {
        page.goto(base_url)
            .await
            .map_err(|e| AppError::navigation_failed(base_url, e))?;
        let _ = page.wait_for_navigation().await;

        let data_json = serde_json::to_string(&session.local_storage)?;
        let js = format!(
            r#"(() => {{
                const data = {};
                try {{
                    for (const [key, value] of Object.entries(data)) {{
                        localStorage.setItem(key, value);
                    }}
                }} catch (e) {{}}
                return true;
            }})()"#,
            data_json
        );
        page.evaluate(js).await.map_err(|e| {
            AppError::Browser(BrowserError::SessionRestoreFailed { source: Box::new(e) })
        })?;
    }

    Ok(())
}

fn cookie_to_param(cookie: &SessionCookie) -> CookieParam {
    let mut param = CookieParam::new(cookie.name.clone(), cookie.value.clone());
    param.domain = Some(cookie.domain.clone());
    param.path = Some(cookie.path.clone());
    param.http_only = Some(cookie.http_only);
    param.secure = Some(cookie.secure);
    param
}
