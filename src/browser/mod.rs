//! 浏览器层（Browser Layer）
//!
//! 管理真实 Chromium 进程的生命周期：启动、指纹伪装、
//! 资源拦截、会话恢复与快照、关闭。

pub mod driver;

pub use driver::{close, initialize, persist_session, BrowserContext};
