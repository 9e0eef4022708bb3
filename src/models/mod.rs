//! 数据模型层
//!
//! 只定义结构和序列化规则，不包含任何业务逻辑。

pub mod job;
pub mod session;

pub use job::{Job, JobListing, JobStatus, LogEntry, LogEventType, NewJob};
pub use session::{Session, SessionCookie, SessionData};
