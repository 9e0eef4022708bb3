//! 发帖流程的无浏览器测试：用假适配器驱动阶段流水线

use std::sync::{Arc, Mutex};

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::Utc;
use reddit_auto_submit::models::{Job, JobStatus};
use reddit_auto_submit::platform::PlatformAdapter;
use reddit_auto_submit::storage::{db, SessionStore};
use reddit_auto_submit::workflow::{
    normalize_error_message, PostFlow, PostProgress, StageState, NEEDS_INTERACTIVE_LOGIN,
    SESSION_EXPIRED,
};
use reddit_auto_submit::Config;

/// 假适配器：行为由字段控制，调用顺序记录在 calls 里
struct FakeAdapter {
    logged_in: bool,
    rate_limited: Option<u64>,
    captcha: bool,
    flair_required: bool,
    post_url: Option<String>,
    submit_error: Option<String>,
    calls: Mutex<Vec<String>>,
}

impl FakeAdapter {
    fn happy() -> Self {
        Self {
            logged_in: true,
            rate_limited: None,
            captcha: false,
            flair_required: false,
            post_url: Some("https://www.reddit.com/r/test/comments/abc/hello/".to_string()),
            submit_error: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    fn record(&self, name: &str) {
        self.calls.lock().unwrap().push(name.to_string());
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl PlatformAdapter for FakeAdapter {
    async fn open_home(&self) -> Result<()> {
        self.record("open_home");
        Ok(())
    }

    async fn open_submit_page(&self, subreddit: &str) -> Result<()> {
        self.record(&format!("open_submit:{}", subreddit));
        Ok(())
    }

    async fn wait_app_shell(&self) -> Result<()> {
        self.record("wait_app_shell");
        Ok(())
    }

    async fn is_logged_in(&self) -> Result<bool> {
        self.record("is_logged_in");
        Ok(self.logged_in)
    }

    async fn extract_username(&self) -> Result<Option<String>> {
        Ok(Some("tester".to_string()))
    }

    async fn detect_rate_limit(&self) -> Result<Option<u64>> {
        self.record("detect_rate_limit");
        Ok(self.rate_limited)
    }

    async fn detect_captcha(&self) -> Result<bool> {
        self.record("detect_captcha");
        Ok(self.captcha)
    }

    async fn flair_required(&self) -> Result<bool> {
        self.record("flair_required");
        Ok(self.flair_required)
    }

    async fn select_flair(&self, flair: &str) -> Result<()> {
        self.record(&format!("select_flair:{}", flair));
        Ok(())
    }

    async fn fill_submission(&self, _caption: &str, _url: &str) -> Result<()> {
        self.record("fill_submission");
        Ok(())
    }

    async fn submit(&self) -> Result<()> {
        self.record("submit");
        if let Some(message) = &self.submit_error {
            bail!("{}", message);
        }
        Ok(())
    }

    async fn extract_post_url(&self, _caption: &str) -> Result<Option<String>> {
        self.record("extract_post_url");
        Ok(self.post_url.clone())
    }
}

fn job(subreddit: &str, caption: &str, url: Option<&str>, flair: Option<&str>) -> Job {
    let now = Utc::now();
    Job {
        id: "00000000-feed-beef-0000-000000000001".to_string(),
        subreddit: subreddit.to_string(),
        caption: caption.to_string(),
        url: url.map(|s| s.to_string()),
        flair: flair.map(|s| s.to_string()),
        media_id: None,
        scheduled_time: now,
        status: JobStatus::Processing,
        post_url: None,
        error_message: None,
        processed_by_client: false,
        created_at: now,
        updated_at: now,
    }
}

async fn flow(config: Config) -> PostFlow {
    let conn = db::open_in_memory().await.expect("打开内存数据库失败");
    PostFlow::new(SessionStore::new(conn), &config)
}

fn fast_config() -> Config {
    Config {
        interactive_login_timeout_secs: 0,
        ..Config::default()
    }
}

#[tokio::test]
async fn test_happy_path_returns_post_url() {
    let flow = flow(fast_config()).await;
    let adapter = FakeAdapter::happy();
    let job = job("test", "hello", Some("https://example.com/x"), None);

    let mut state = StageState::default();
    let post_url = flow
        .run_stages(&job, &adapter, &mut state)
        .await
        .expect("流程应当成功");
    assert_eq!(
        post_url.as_deref(),
        Some("https://www.reddit.com/r/test/comments/abc/hello/")
    );
    assert!(!state.login_refreshed);

    let calls = adapter.calls();
    assert_eq!(calls[0], "open_submit:test");
    assert!(calls.contains(&"detect_rate_limit".to_string()));
    assert!(calls.contains(&"submit".to_string()));
}

#[tokio::test]
async fn test_progress_reported_in_stage_order() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let flow = flow(fast_config())
        .await
        .with_progress(Box::new(move |p| sink.lock().unwrap().push(p)));
    let adapter = FakeAdapter::happy();
    let job = job("test", "hello", Some("https://example.com/x"), None);

    flow.run_stages(&job, &adapter, &mut StageState::default())
        .await
        .expect("流程应当成功");

    assert_eq!(
        *seen.lock().unwrap(),
        vec![
            PostProgress::Navigating,
            PostProgress::CheckingRateLimit,
            PostProgress::EnsuringLogin,
            PostProgress::Submitting,
            PostProgress::ExtractingResult,
        ]
    );
}

#[tokio::test]
async fn test_rate_limit_fails_before_submit() {
    let flow = flow(fast_config()).await;
    let adapter = FakeAdapter {
        rate_limited: Some(540),
        ..FakeAdapter::happy()
    };
    let job = job("test", "hello", Some("https://example.com/x"), None);

    let err = flow
        .run_stages(&job, &adapter, &mut StageState::default())
        .await
        .expect_err("应当因限流失败");
    // 失败信息携带等待提示
    assert!(err.to_string().contains("540"));
    // 绝不静默重试，也没走到提交
    assert!(!adapter.calls().contains(&"fill_submission".to_string()));
    assert!(!adapter.calls().contains(&"submit".to_string()));
}

#[tokio::test]
async fn test_captcha_fails_job() {
    let flow = flow(fast_config()).await;
    let adapter = FakeAdapter {
        captcha: true,
        ..FakeAdapter::happy()
    };
    let job = job("test", "hello", Some("https://example.com/x"), None);

    let err = flow
        .run_stages(&job, &adapter, &mut StageState::default())
        .await
        .expect_err("应当因验证码失败");
    assert!(err.to_string().contains("验证码"));
    assert!(!adapter.calls().contains(&"submit".to_string()));
}

#[tokio::test]
async fn test_bounded_login_wait_yields_sentinel() {
    // 等待上限为 0：登录标记一直不出现时立刻转为哨兵失败
    let flow = flow(fast_config()).await;
    let adapter = FakeAdapter {
        logged_in: false,
        ..FakeAdapter::happy()
    };
    let job = job("test", "hello", Some("https://example.com/x"), None);

    let err = flow
        .run_stages(&job, &adapter, &mut StageState::default())
        .await
        .expect_err("应当因登录缺失失败");
    assert_eq!(err.to_string(), NEEDS_INTERACTIVE_LOGIN);
    // 哨兵经过归一化后保持原样，不会被改写成 session_expired
    assert_eq!(
        normalize_error_message(&err.to_string()),
        NEEDS_INTERACTIVE_LOGIN
    );
}

#[tokio::test]
async fn test_auth_errors_normalize_to_session_expired() {
    let flow = flow(fast_config()).await;
    let adapter = FakeAdapter {
        submit_error: Some("login marker disappeared mid-submit".to_string()),
        ..FakeAdapter::happy()
    };
    let job = job("test", "hello", Some("https://example.com/x"), None);

    let err = flow
        .run_stages(&job, &adapter, &mut StageState::default())
        .await
        .expect_err("提交应当失败");
    assert_eq!(normalize_error_message(&err.to_string()), SESSION_EXPIRED);
}

#[tokio::test]
async fn test_flair_selected_when_required() {
    let flow = flow(fast_config()).await;
    let adapter = FakeAdapter {
        flair_required: true,
        ..FakeAdapter::happy()
    };
    let job = job("test", "hello", Some("https://example.com/x"), Some("News"));

    flow.run_stages(&job, &adapter, &mut StageState::default())
        .await
        .expect("流程应当成功");

    let calls = adapter.calls();
    let select_pos = calls.iter().position(|c| c == "select_flair:News");
    let submit_pos = calls.iter().position(|c| c == "submit");
    // flair 在最终提交之前选中
    assert!(select_pos.expect("应当选中 flair") < submit_pos.expect("应当提交"));
}

#[tokio::test]
async fn test_flair_skipped_when_not_required() {
    let flow = flow(fast_config()).await;
    let adapter = FakeAdapter::happy();
    let job = job("test", "hello", Some("https://example.com/x"), Some("News"));

    flow.run_stages(&job, &adapter, &mut StageState::default())
        .await
        .expect("流程应当成功");
    assert!(!adapter
        .calls()
        .iter()
        .any(|c| c.starts_with("select_flair")));
}

#[tokio::test]
async fn test_flair_required_but_missing_fails() {
    let flow = flow(fast_config()).await;
    let adapter = FakeAdapter {
        flair_required: true,
        ..FakeAdapter::happy()
    };
    let job = job("test", "hello", Some("https://example.com/x"), None);

    let err = flow
        .run_stages(&job, &adapter, &mut StageState::default())
        .await
        .expect_err("缺 flair 应当失败");
    assert!(err.to_string().contains("flair"));
    assert!(!adapter.calls().contains(&"submit".to_string()));
}

#[tokio::test]
async fn test_missing_result_element_is_soft_success() {
    let flow = flow(fast_config()).await;
    let adapter = FakeAdapter {
        post_url: None,
        ..FakeAdapter::happy()
    };
    let job = job("test", "hello", Some("https://example.com/x"), None);

    // 定位不到新帖：软成功，不是失败
    let post_url = flow
        .run_stages(&job, &adapter, &mut StageState::default())
        .await
        .expect("软成功不应报错");
    assert!(post_url.is_none());
}

#[tokio::test]
async fn test_validation_fails_fast_without_browser() {
    // run() 的校验阶段在启动浏览器之前，空字段立刻失败
    let flow = flow(fast_config()).await;

    let err = flow
        .run(&job("", "hello", Some("https://example.com/x"), None))
        .await
        .expect_err("空 subreddit 应当失败");
    assert!(err.to_string().contains("subreddit"));

    let err = flow
        .run(&job("test", "", Some("https://example.com/x"), None))
        .await
        .expect_err("空 caption 应当失败");
    assert!(err.to_string().contains("caption"));

    let err = flow
        .run(&job("test", "hello", None, None))
        .await
        .expect_err("缺 url 应当失败");
    assert!(err.to_string().contains("url"));
}
