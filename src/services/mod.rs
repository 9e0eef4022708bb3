//! 业务能力层（Services Layer）
//!
//! 描述"我能做什么"，不编排流程。

pub mod login_flow;

pub use login_flow::{LoginFlow, LoginProgress, LoginProgressCallback, LoginReport, LoginStatus};
