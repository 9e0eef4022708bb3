use std::fmt;

/// 应用程序错误类型
#[derive(Debug)]
pub enum AppError {
    /// 浏览器相关错误
    Browser(BrowserError),
    /// 存储相关错误
    Storage(StorageError),
    /// 会话相关错误
    Session(SessionError),
    /// 任务字段校验错误
    Validation(ValidationError),
    /// 发帖流程错误
    Posting(PostingError),
    /// 配置错误
    Config(ConfigError),
    /// 其他错误（用于包装第三方库错误）
    Other(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Browser(e) => write!(f, "浏览器错误: {}", e),
            AppError::Storage(e) => write!(f, "存储错误: {}", e),
            AppError::Session(e) => write!(f, "会话错误: {}", e),
            AppError::Validation(e) => write!(f, "校验错误: {}", e),
            AppError::Posting(e) => write!(f, "发帖错误: {}", e),
            AppError::Config(e) => write!(f, "配置错误: {}", e),
            AppError::Other(msg) => write!(f, "错误: {}", msg),
        }
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AppError::Browser(e) => Some(e),
            AppError::Storage(e) => Some(e),
            AppError::Session(e) => Some(e),
            AppError::Validation(e) => Some(e),
            AppError::Posting(e) => Some(e),
            AppError::Config(e) => Some(e),
            AppError::Other(_) => None,
        }
    }
}

/// 浏览器相关错误
#[derive(Debug)]
pub enum BrowserError {
    /// 启动浏览器失败
    LaunchFailed {
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// 浏览器配置失败
    ConfigurationFailed { message: String },
    /// 创建页面失败
    PageCreationFailed {
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// 导航失败
    NavigationFailed {
        url: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// 执行脚本失败
    ScriptExecutionFailed {
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// 恢复会话失败
    SessionRestoreFailed {
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl fmt::Display for BrowserError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BrowserError::LaunchFailed { source } => {
                write!(f, "启动浏览器失败: {}", source)
            }
            BrowserError::ConfigurationFailed { message } => {
                write!(f, "浏览器配置失败: {}", message)
            }
            BrowserError::PageCreationFailed { source } => {
                write!(f, "创建页面失败: {}", source)
            }
            BrowserError::NavigationFailed { url, source } => {
                write!(f, "导航到 {} 失败: {}", url, source)
            }
            BrowserError::ScriptExecutionFailed { source } => {
                write!(f, "执行脚本失败: {}", source)
            }
            BrowserError::SessionRestoreFailed { source } => {
                write!(f, "恢复会话失败: {}", source)
            }
        }
    }
}

impl std::error::Error for BrowserError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BrowserError::LaunchFailed { source }
            | BrowserError::PageCreationFailed { source }
            | BrowserError::NavigationFailed { source, .. }
            | BrowserError::ScriptExecutionFailed { source }
            | BrowserError::SessionRestoreFailed { source } => {
                Some(source.as_ref() as &(dyn std::error::Error + 'static))
            }
            BrowserError::ConfigurationFailed { .. } => None,
        }
    }
}

/// 存储相关错误
#[derive(Debug)]
pub enum StorageError {
    /// 打开数据库失败
    OpenFailed {
        path: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// 查询失败
    QueryFailed {
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// 事务失败（租约等原子操作整体回滚）
    TransactionFailed {
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// 行中存在无法解析的时间戳
    InvalidTimestamp { value: String },
    /// 行不存在
    NotFound { id: String },
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::OpenFailed { path, source } => {
                write!(f, "打开数据库失败 ({}): {}", path, source)
            }
            StorageError::QueryFailed { source } => {
                write!(f, "查询失败: {}", source)
            }
            StorageError::TransactionFailed { source } => {
                write!(f, "事务失败: {}", source)
            }
            StorageError::InvalidTimestamp { value } => {
                write!(f, "无法解析时间戳: {}", value)
            }
            StorageError::NotFound { id } => {
                write!(f, "记录不存在: {}", id)
            }
        }
    }
}

impl std::error::Error for StorageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StorageError::OpenFailed { source, .. }
            | StorageError::QueryFailed { source }
            | StorageError::TransactionFailed { source } => {
                Some(source.as_ref() as &(dyn std::error::Error + 'static))
            }
            _ => None,
        }
    }
}

/// 会话相关错误
#[derive(Debug)]
pub enum SessionError {
    /// 凭据包序列化/反序列化失败
    SerializeFailed {
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// 登录等待超时
    LoginTimeout { secs: u64 },
    /// 登录流程已在运行
    AlreadyRunning,
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::SerializeFailed { source } => {
                write!(f, "凭据包序列化失败: {}", source)
            }
            SessionError::LoginTimeout { secs } => {
                write!(f, "等待登录超时 ({} 秒)", secs)
            }
            SessionError::AlreadyRunning => {
                write!(f, "登录流程已在运行中")
            }
        }
    }
}

impl std::error::Error for SessionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SessionError::SerializeFailed { source } => {
                Some(source.as_ref() as &(dyn std::error::Error + 'static))
            }
            _ => None,
        }
    }
}

/// 任务字段校验错误
#[derive(Debug)]
pub enum ValidationError {
    /// 必填字段为空
    EmptyField { field: &'static str },
    /// URL 格式不合法
    InvalidUrl { url: String },
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::EmptyField { field } => {
                write!(f, "字段 {} 不能为空", field)
            }
            ValidationError::InvalidUrl { url } => {
                write!(f, "URL 格式不合法: {}", url)
            }
        }
    }
}

impl std::error::Error for ValidationError {}

/// 发帖流程错误
#[derive(Debug)]
pub enum PostingError {
    /// 当前 poster 已有任务在处理
    AlreadyRunning,
    /// 平台触发频率限制
    RateLimited { wait_secs: u64 },
    /// 检测到验证码
    CaptchaDetected,
    /// 提交阶段失败
    SubmitFailed { message: String },
    /// flair 必选但任务未提供
    FlairMissing { subreddit: String },
}

impl fmt::Display for PostingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PostingError::AlreadyRunning => {
                write!(f, "已有发帖任务在处理中")
            }
            PostingError::RateLimited { wait_secs } => {
                write!(f, "触发平台频率限制，建议等待 {} 秒", wait_secs)
            }
            PostingError::CaptchaDetected => {
                write!(f, "检测到验证码，无法继续自动提交")
            }
            PostingError::SubmitFailed { message } => {
                write!(f, "提交失败: {}", message)
            }
            PostingError::FlairMissing { subreddit } => {
                write!(f, "r/{} 要求 flair，但任务未提供", subreddit)
            }
        }
    }
}

impl std::error::Error for PostingError {}

/// 配置错误
#[derive(Debug)]
pub enum ConfigError {
    /// 配置文件解析失败
    FileParseFailed {
        path: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// 环境变量解析失败
    EnvVarParseFailed {
        var_name: String,
        value: String,
        expected_type: String,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::FileParseFailed { path, source } => {
                write!(f, "配置文件解析失败 ({}): {}", path, source)
            }
            ConfigError::EnvVarParseFailed {
                var_name,
                value,
                expected_type,
            } => {
                write!(
                    f,
                    "环境变量 {} 解析失败: 值 '{}' 无法转换为 {}",
                    var_name, value, expected_type
                )
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::FileParseFailed { source, .. } => {
                Some(source.as_ref() as &(dyn std::error::Error + 'static))
            }
            _ => None,
        }
    }
}

// ========== 从常见错误类型转换 ==========
// 注意：不需要手动实现 From<AppError> for anyhow::Error，
// 因为 anyhow 已经为所有实现了 std::error::Error 的类型提供了自动实现

impl From<chromiumoxide::error::CdpError> for AppError {
    fn from(err: chromiumoxide::error::CdpError) -> Self {
        AppError::Browser(BrowserError::ScriptExecutionFailed {
            source: Box::new(err),
        })
    }
}

impl From<rusqlite::Error> for AppError {
    fn from(err: rusqlite::Error) -> Self {
        AppError::Storage(StorageError::QueryFailed {
            source: Box::new(err),
        })
    }
}

impl From<tokio_rusqlite::Error> for AppError {
    fn from(err: tokio_rusqlite::Error) -> Self {
        AppError::Storage(StorageError::QueryFailed {
            source: Box::new(err),
        })
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Session(SessionError::SerializeFailed {
            source: Box::new(err),
        })
    }
}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        AppError::Config(ConfigError::FileParseFailed {
            path: String::new(), // TOML错误通常不包含路径信息
            source: Box::new(err),
        })
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Storage(StorageError::OpenFailed {
            path: String::new(),
            source: Box::new(err),
        })
    }
}

// ========== 便捷构造函数 ==========

impl AppError {
    /// 创建浏览器启动错误
    pub fn browser_launch_failed(
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        AppError::Browser(BrowserError::LaunchFailed {
            source: Box::new(source),
        })
    }

    /// 创建导航错误
    pub fn navigation_failed(
        url: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        AppError::Browser(BrowserError::NavigationFailed {
            url: url.into(),
            source: Box::new(source),
        })
    }

    /// 创建数据库打开错误
    pub fn db_open_failed(
        path: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        AppError::Storage(StorageError::OpenFailed {
            path: path.into(),
            source: Box::new(source),
        })
    }

    /// 创建租约事务错误
    pub fn lease_failed(source: impl std::error::Error + Send + Sync + 'static) -> Self {
        AppError::Storage(StorageError::TransactionFailed {
            source: Box::new(source),
        })
    }
}

// ========== Result 类型别名 ==========

/// 应用程序结果类型
pub type AppResult<T> = Result<T, AppError>;
