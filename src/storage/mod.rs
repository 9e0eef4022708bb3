//! 存储层（Storage Layer）
//!
//! ## 职责
//!
//! 任务表和会话表是整个系统唯一的共享可变状态，
//! 全部通过本层的事务化操作访问。
//!
//! ### `db` - 连接管理
//! - 打开 SQLite 连接、建表、时间戳格式约定
//!
//! ### `queue_store` - 任务队列
//! - 入队 / 原子租约 / 状态回写 / 查询 / 删除
//!
//! ### `session_store` - 会话
//! - 保存 / 更新 / 读取（读取时计算有效性）/ 删除

pub mod db;
pub mod queue_store;
pub mod session_store;

pub use queue_store::QueueStore;
pub use session_store::SessionStore;
