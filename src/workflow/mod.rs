//! 流程层（Workflow Layer）
//!
//! 定义"一个任务"的完整提帖流水线，只依赖能力接口，不持有浏览器资源。

pub mod post_flow;

pub use post_flow::{
    normalize_error_message, JobProcessor, PostFlow, PostOutcome, PostProgress,
    PostProgressCallback, StageState, NEEDS_INTERACTIVE_LOGIN, SESSION_EXPIRED,
};
