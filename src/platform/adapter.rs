//! 平台适配器接口 - 平台层
//!
//! 所有与第三方站点 DOM / 选择器耦合的操作都收敛到这个 trait 背后，
//! 站点改版只影响一个实现；流程层可以用假实现做无浏览器测试。

use anyhow::Result;
use async_trait::async_trait;

/// 平台适配器
///
/// 方法粒度对应发帖流程的各个阶段；实现方自行决定用什么选择器。
#[async_trait]
pub trait PlatformAdapter: Send + Sync {
    /// 打开平台首页
    async fn open_home(&self) -> Result<()>;

    /// 打开指定 subreddit 的提交页
    async fn open_submit_page(&self, subreddit: &str) -> Result<()>;

    /// 等待应用外壳渲染完成
    async fn wait_app_shell(&self) -> Result<()>;

    /// 当前是否处于登录状态
    async fn is_logged_in(&self) -> Result<bool>;

    /// 提取登录用户名（未登录时返回 None）
    async fn extract_username(&self) -> Result<Option<String>>;

    /// 探测频率限制；命中时返回建议等待秒数
    async fn detect_rate_limit(&self) -> Result<Option<u64>>;

    /// 探测验证码
    async fn detect_captcha(&self) -> Result<bool>;

    /// 当前提交页是否要求 flair
    async fn flair_required(&self) -> Result<bool>;

    /// 打开 flair 选择器并选中指定文本的 flair
    async fn select_flair(&self, flair: &str) -> Result<()>;

    /// 填写标题与链接
    async fn fill_submission(&self, caption: &str, url: &str) -> Result<()>;

    /// 点击最终提交按钮
    async fn submit(&self) -> Result<()>;

    /// 按标题定位新帖并返回绝对链接；定位不到返回 None
    async fn extract_post_url(&self, caption: &str) -> Result<Option<String>>;
}
