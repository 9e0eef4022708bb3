//! Reddit 适配器 - 平台层
//!
//! 通过 JsExecutor 驱动 Reddit 网页端（不是 API）。
//! 新版 shreddit 与旧版界面的选择器都做了兜底。

use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use regex::Regex;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::error::PostingError;
use crate::infrastructure::JsExecutor;
use crate::platform::adapter::PlatformAdapter;

/// 时间单位 → 秒
static TIME_UNITS: phf::Map<&'static str, u64> = phf::phf_map! {
    "second" => 1,
    "minute" => 60,
    "hour" => 3600,
};

/// 频率限制命中但解析不出时长时的缺省等待（秒）
const DEFAULT_RATE_LIMIT_WAIT: u64 = 60;

/// 应用外壳选择器（新版 / 旧版）
const APP_SHELL_SELECTOR: &str = "shreddit-app, #AppRouter-main-content, #sr-header-area";

/// 登录标记选择器
const LOGGED_IN_SELECTOR: &str =
    "#expand-user-drawer-button, [data-testid=\"reddit-avatar\"], span.user a[href*=\"/user/\"]";

/// Reddit 适配器
pub struct RedditAdapter {
    executor: JsExecutor,
    base_url: String,
    dom_wait: Duration,
}

impl RedditAdapter {
    /// 创建适配器
    ///
    /// # 参数
    /// - `executor`: 持有页面的 JS 执行器
    /// - `base_url`: 平台根地址（如 https://www.reddit.com）
    /// - `dom_wait`: 页面元素等待上限
    pub fn new(executor: JsExecutor, base_url: impl Into<String>, dom_wait: Duration) -> Self {
        Self {
            executor,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            dom_wait,
        }
    }

    async fn goto(&self, url: &str) -> Result<()> {
        debug!("导航到: {}", url);
        self.executor.page().goto(url).await?;
        let _ = self.executor.page().wait_for_navigation().await;
        Ok(())
    }
}

#[async_trait]
impl PlatformAdapter for RedditAdapter {
    async fn open_home(&self) -> Result<()> {
        self.goto(&self.base_url).await
    }

    async fn open_submit_page(&self, subreddit: &str) -> Result<()> {
        let url = format!("{}/r/{}/submit?type=LINK", self.base_url, subreddit);
        self.goto(&url).await
    }

    async fn wait_app_shell(&self) -> Result<()> {
        let js = format!("!!document.querySelector('{}')", APP_SHELL_SELECTOR);
        if !self.executor.wait_until(&js, self.dom_wait).await? {
            bail!("等待应用外壳加载超时");
        }
        Ok(())
    }

    async fn is_logged_in(&self) -> Result<bool> {
        self.executor
            .eval_bool(format!("!!document.querySelector('{}')", LOGGED_IN_SELECTOR))
            .await
    }

    async fn extract_username(&self) -> Result<Option<String>> {
        let username: Option<String> = self
            .executor
            .eval_as(
                r#"(() => {
                    const drawer = document.querySelector('#expand-user-drawer-button');
                    if (drawer) {
                        const label = drawer.getAttribute('aria-label') || '';
                        const m = label.match(/u\/([A-Za-z0-9_-]+)/);
                        if (m) return m[1];
                    }
                    const old = document.querySelector('span.user a[href*="/user/"]');
                    if (old) return old.textContent.trim();
                    return null;
                })()"#,
            )
            .await?;
        Ok(username.filter(|u| !u.is_empty()))
    }

    async fn detect_rate_limit(&self) -> Result<Option<u64>> {
        let text: String = self
            .executor
            .eval_as("document.body ? document.body.innerText.slice(0, 20000) : ''")
            .await?;
        Ok(parse_rate_limit(&text))
    }

    async fn detect_captcha(&self) -> Result<bool> {
        self.executor
            .eval_bool(
                "!!document.querySelector('iframe[src*=\"captcha\"], .g-recaptcha, \
                 [data-testid=\"captcha\"]')",
            )
            .await
    }

    async fn flair_required(&self) -> Result<bool> {
        self.executor
            .eval_bool(
                r#"(() => {
                    const text = document.body ? document.body.innerText : '';
                    if (/flair is required|select flair to post/i.test(text)) return true;
                    const hint = document.querySelector(
                        '[data-testid="flair-required"], shreddit-post-flair-required');
                    return !!hint;
                })()"#,
            )
            .await
    }

    async fn select_flair(&self, flair: &str) -> Result<()> {
        info!("🏷️ 正在选择 flair: {}", flair);
        let js = format!(
            r#"(async () => {{
                const wait = (ms) => new Promise(r => setTimeout(r, ms));
                const byText = (selector, re) =>
                    [...document.querySelectorAll(selector)]
                        .find(el => re.test((el.textContent || '').trim()));

                const trigger = document.querySelector('[aria-label*="flair" i]')
                    || byText('button', /flair/i);
                if (!trigger) return 'flair_button_not_found';
                trigger.click();
                await wait(600);

                const viewAll = byText('button', /view all|show more|see more/i);
                if (viewAll) {{
                    viewAll.click();
                    await wait(400);
                }}

                const target = {target};
                const option = [...document.querySelectorAll(
                        '[role="radio"], [role="option"], label, li, div[aria-checked]')]
                    .find(el => (el.textContent || '').trim() === target);
                if (!option) return 'flair_option_not_found';
                option.click();
                await wait(300);

                const apply = byText('button', /^apply$/i);
                if (apply) {{
                    apply.click();
                    await wait(300);
                }}
                return 'ok';
            }})()"#,
            target = json!(flair),
        );

        let status: String = self.executor.eval_as(js).await?;
        if status != "ok" {
            bail!(PostingError::SubmitFailed {
                message: format!("flair 选择失败: {}", status),
            });
        }
        Ok(())
    }

    async fn fill_submission(&self, caption: &str, url: &str) -> Result<()> {
        let js = format!(
            r#"(() => {{
                const setValue = (el, value) => {{
                    const proto = el.tagName === 'TEXTAREA'
                        ? window.HTMLTextAreaElement.prototype
                        : window.HTMLInputElement.prototype;
                    const setter = Object.getOwnPropertyDescriptor(proto, 'value').set;
                    setter.call(el, value);
                    el.dispatchEvent(new Event('input', {{ bubbles: true }}));
                    el.dispatchEvent(new Event('change', {{ bubbles: true }}));
                }};
                const pick = (selectors) => {{
                    for (const sel of selectors) {{
                        const root = document.querySelector(sel);
                        if (root) return root;
                    }}
                    return null;
                }};

                const title = pick([
                    'textarea[name="title"]',
                    'faceplate-textarea-input[name="title"] textarea',
                    '[data-testid="post-title"] textarea',
                ]);
                if (!title) return 'title_input_not_found';
                setValue(title, {caption});

                const link = pick([
                    'textarea[name="link"]',
                    'input[name="link"]',
                    '[data-testid="link-field"] textarea',
                ]);
                if (!link) return 'link_input_not_found';
                setValue(link, {url});

                return 'ok';
            }})()"#,
            caption = json!(caption),
            url = json!(url),
        );

        let status: String = self.executor.eval_as(js).await?;
        if status != "ok" {
            bail!(PostingError::SubmitFailed {
                message: format!("填写表单失败: {}", status),
            });
        }
        debug!("表单填写完成");
        Ok(())
    }

    async fn submit(&self) -> Result<()> {
        let status: String = self
            .executor
            .eval_as(
                r#"(() => {
                    const button = document.querySelector('#submit-post-button')
                        || document.querySelector('button[type="submit"]')
                        || [...document.querySelectorAll('button')]
                            .find(b => /^post$/i.test((b.textContent || '').trim()));
                    if (!button) return 'submit_button_not_found';
                    if (button.disabled) return 'submit_button_disabled';
                    button.click();
                    return 'ok';
                })()"#,
            )
            .await?;
        if status != "ok" {
            bail!(PostingError::SubmitFailed {
                message: format!("点击提交失败: {}", status),
            });
        }
        info!("📤 已点击提交按钮");
        Ok(())
    }

    async fn extract_post_url(&self, caption: &str) -> Result<Option<String>> {
        let probe = format!(
            r#"(() => {{
                const target = {caption};
                for (const post of document.querySelectorAll('shreddit-post')) {{
                    const title = (post.getAttribute('post-title') || '').trim();
                    if (title === target) return true;
                }}
                for (const a of document.querySelectorAll('a.title')) {{
                    if ((a.textContent || '').trim() === target) return true;
                }}
                return false;
            }})()"#,
            caption = json!(caption),
        );
        if !self.executor.wait_until(&probe, self.dom_wait).await? {
            warn!("未能在页面上定位到新帖，放弃提取链接");
            return Ok(None);
        }

        let permalink: Option<String> = self
            .executor
            .eval_as(format!(
                r#"(() => {{
                    const target = {caption};
                    for (const post of document.querySelectorAll('shreddit-post')) {{
                        const title = (post.getAttribute('post-title') || '').trim();
                        if (title === target) return post.getAttribute('permalink');
                    }}
                    for (const a of document.querySelectorAll('a.title')) {{
                        if ((a.textContent || '').trim() === target) {{
                            const thing = a.closest('.thing');
                            if (thing) return thing.getAttribute('data-permalink');
                            return a.getAttribute('href');
                        }}
                    }}
                    return null;
                }})()"#,
                caption = json!(caption),
            ))
            .await?;

        Ok(permalink.map(|p| {
            if p.starts_with("http") {
                p
            } else {
                format!("{}{}", self.base_url, p)
            }
        }))
    }
}

// ========== 频率限制文本解析 ==========

/// 从页面文本解析频率限制提示
///
/// 命中指示词但解析不出具体时长时返回缺省 60 秒。
pub fn parse_rate_limit(text: &str) -> Option<u64> {
    let lower = text.to_lowercase();
    let indicators = [
        "you've been doing that a lot",
        "you are doing that too much",
        "take a break",
        "rate limit",
    ];
    let hit = indicators.iter().any(|p| lower.contains(p)) || lower.contains("try again in");
    if !hit {
        return None;
    }

    let re = match Regex::new(r"(?:try again|take a break[^.]*?)\D*?(\d+)\s*(second|minute|hour)") {
        Ok(re) => re,
        Err(_) => return Some(DEFAULT_RATE_LIMIT_WAIT),
    };
    let wait = re.captures(&lower).and_then(|caps| {
        let amount: u64 = caps.get(1)?.as_str().parse().ok()?;
        let unit = TIME_UNITS.get(caps.get(2)?.as_str())?;
        Some(amount * unit)
    });
    Some(wait.unwrap_or(DEFAULT_RATE_LIMIT_WAIT))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_rate_limit_minutes() {
        let text = "Looks like you've been doing that a lot. Try again in 9 minutes.";
        assert_eq!(parse_rate_limit(text), Some(540));
    }

    #[test]
    fn test_parse_rate_limit_seconds() {
        let text = "you are doing that too much. try again in 30 seconds.";
        assert_eq!(parse_rate_limit(text), Some(30));
    }

    #[test]
    fn test_parse_rate_limit_without_duration() {
        let text = "You hit a rate limit. Slow down.";
        assert_eq!(parse_rate_limit(text), Some(60));
    }

    #[test]
    fn test_parse_rate_limit_absent() {
        let text = "Welcome to r/rust. Submit your link below.";
        assert_eq!(parse_rate_limit(text), None);
    }
}
