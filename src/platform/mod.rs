//! 平台层（Platform Layer）
//!
//! 把所有与第三方站点 DOM 耦合的操作收敛到一个适配器接口背后。
//! 站点改版只需要改 `reddit` 一个实现；流程层依赖 trait，
//! 可以用假实现做无浏览器测试。

pub mod adapter;
pub mod reddit;

pub use adapter::PlatformAdapter;
pub use reddit::RedditAdapter;
