use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// 程序配置
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// SQLite 数据库路径
    pub db_path: String,
    /// 平台根地址
    pub base_url: String,
    /// 是否无头模式运行浏览器
    pub headless: bool,
    /// 浏览器可执行文件路径（None 时由 chromiumoxide 自动探测）
    pub chrome_executable: Option<String>,
    /// 持久化用户数据目录（Some 时浏览器状态随目录保留）
    pub user_data_dir: Option<String>,
    /// 调度器轮询间隔（秒）
    pub tick_interval_secs: u64,
    /// 两次发帖之间的冷却时间（秒）
    pub post_cooldown_secs: u64,
    /// 交互式登录流程的等待上限（秒）
    pub login_timeout_secs: u64,
    /// 发帖流程中 ensure-login 阶段的等待上限（秒）
    pub interactive_login_timeout_secs: u64,
    /// 页面元素等待上限（秒）
    pub dom_wait_secs: u64,
    /// 会话默认有效期（小时）
    pub session_ttl_hours: i64,
    /// 是否显示详细日志
    pub verbose_logging: bool,
    /// 浏览器 User-Agent
    pub user_agent: String,
    /// 浏览器语言
    pub locale: String,
    /// 浏览器时区
    pub timezone: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: "scheduler.db".to_string(),
            base_url: "https://www.reddit.com".to_string(),
            headless: true,
            chrome_executable: None,
            user_data_dir: None,
            tick_interval_secs: 60,
            post_cooldown_secs: 10,
            login_timeout_secs: 300,
            interactive_login_timeout_secs: 180,
            dom_wait_secs: 30,
            session_ttl_hours: 48,
            verbose_logging: false,
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                         (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36"
                .to_string(),
            locale: "en-US".to_string(),
            timezone: "America/New_York".to_string(),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            db_path: std::env::var("DB_PATH").unwrap_or(default.db_path),
            base_url: std::env::var("BASE_URL").unwrap_or(default.base_url),
            headless: std::env::var("HEADLESS").ok().and_then(|v| v.parse().ok()).unwrap_or(default.headless),
            chrome_executable: std::env::var("CHROME_EXECUTABLE").ok().or(default.chrome_executable),
            user_data_dir: std::env::var("USER_DATA_DIR").ok().or(default.user_data_dir),
            tick_interval_secs: std::env::var("TICK_INTERVAL_SECS").ok().and_then(|v| v.parse().ok()).unwrap_or(default.tick_interval_secs),
            post_cooldown_secs: std::env::var("POST_COOLDOWN_SECS").ok().and_then(|v| v.parse().ok()).unwrap_or(default.post_cooldown_secs),
            login_timeout_secs: std::env::var("LOGIN_TIMEOUT_SECS").ok().and_then(|v| v.parse().ok()).unwrap_or(default.login_timeout_secs),
            interactive_login_timeout_secs: std::env::var("INTERACTIVE_LOGIN_TIMEOUT_SECS").ok().and_then(|v| v.parse().ok()).unwrap_or(default.interactive_login_timeout_secs),
            dom_wait_secs: std::env::var("DOM_WAIT_SECS").ok().and_then(|v| v.parse().ok()).unwrap_or(default.dom_wait_secs),
            session_ttl_hours: std::env::var("SESSION_TTL_HOURS").ok().and_then(|v| v.parse().ok()).unwrap_or(default.session_ttl_hours),
            verbose_logging: std::env::var("VERBOSE_LOGGING").ok().and_then(|v| v.parse().ok()).unwrap_or(default.verbose_logging),
            user_agent: std::env::var("USER_AGENT").unwrap_or(default.user_agent),
            locale: std::env::var("LOCALE").unwrap_or(default.locale),
            timezone: std::env::var("TIMEZONE").unwrap_or(default.timezone),
        }
    }

    /// 从 TOML 配置文件加载
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("无法读取配置文件: {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("无法解析配置文件: {}", path.display()))?;
        Ok(config)
    }

    /// 加载配置：存在 config.toml 时优先使用，否则读取环境变量
    pub async fn load() -> Result<Self> {
        let file = std::env::var("CONFIG_FILE").unwrap_or_else(|_| "config.toml".to_string());
        if Path::new(&file).exists() {
            Self::from_file(&file).await
        } else {
            Ok(Self::from_env())
        }
    }
}
