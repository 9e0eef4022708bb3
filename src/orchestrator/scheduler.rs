//! 定时调度器 - 编排层
//!
//! ## 职责
//!
//! 1. **定时轮询**：固定间隔触发一次 tick
//! 2. **租约**：每个 tick 向队列存储原子租约全部到期任务
//! 3. **串行处理**：租到的任务按计划时间升序逐个送入发帖流程，
//!    任务之间留固定冷却时间，绝不并发
//! 4. **错误隔离**：单个任务的异常只记日志，不影响本轮其余任务
//!
//! 所有可变状态都是本实例的字段，由组合根持有唯一实例 ——
//! 没有任何进程级全局状态。stop 只取消后续 tick，
//! 不打断正在处理中的任务。

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio::time::{interval, sleep, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::models::{Job, JobStatus};
use crate::storage::QueueStore;
use crate::workflow::JobProcessor;

/// 定时调度器
pub struct Scheduler {
    queue: QueueStore,
    processor: Arc<dyn JobProcessor>,
    tick_interval: Duration,
    cooldown: Duration,
    /// Some 表示调度循环在运行；发送 true 请求停止
    cancel: Mutex<Option<watch::Sender<bool>>>,
}

impl Scheduler {
    /// 创建调度器
    ///
    /// 调用方（组合根）负责保证进程内只构造一个实例。
    pub fn new(queue: QueueStore, processor: Arc<dyn JobProcessor>, config: &Config) -> Self {
        Self {
            queue,
            processor,
            tick_interval: Duration::from_secs(config.tick_interval_secs),
            cooldown: Duration::from_secs(config.post_cooldown_secs),
            cancel: Mutex::new(None),
        }
    }

    /// 启动调度循环；已在运行时忽略
    pub fn start(&self) {
        let mut guard = self.lock_cancel();
        if guard.is_some() {
            warn!("调度器已在运行，start 忽略");
            return;
        }

        let (tx, mut rx) = watch::channel(false);
        *guard = Some(tx);

        let queue = self.queue.clone();
        let processor = Arc::clone(&self.processor);
        let tick_interval = self.tick_interval;
        let cooldown = self.cooldown;

        tokio::spawn(async move {
            info!("⏱️ 调度器已启动 (轮询间隔 {} 秒)", tick_interval.as_secs());
            let mut timer = interval(tick_interval);
            timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = timer.tick() => {
                        run_tick(&queue, processor.as_ref(), cooldown).await;
                    }
                    changed = rx.changed() => {
                        // 发送端 drop 也视为停止
                        let _ = changed;
                        info!("⏹️ 调度器已停止");
                        break;
                    }
                }
            }
        });
    }

    /// 请求停止；幂等，不等待正在处理中的任务
    pub fn stop(&self) {
        let mut guard = self.lock_cancel();
        match guard.take() {
            Some(tx) => {
                let _ = tx.send(true);
                info!("🛑 已请求停止调度器");
            }
            None => debug!("调度器未在运行，stop 忽略"),
        }
    }

    /// 重启调度循环
    pub fn restart(&self) {
        self.stop();
        self.start();
    }

    /// 调度循环是否在运行
    pub fn is_running(&self) -> bool {
        self.lock_cancel().is_some()
    }

    /// 手动触发一轮 tick（调试与测试用；正常运行由定时器驱动）
    pub async fn tick_once(&self) {
        run_tick(&self.queue, self.processor.as_ref(), self.cooldown).await;
    }

    fn lock_cancel(&self) -> std::sync::MutexGuard<'_, Option<watch::Sender<bool>>> {
        // 锁中毒时接管内部值继续运行
        self.cancel.lock().unwrap_or_else(|e| e.into_inner())
    }
}

// ========== 单轮 tick ==========

/// 一轮 tick：租约全部到期任务后串行处理
async fn run_tick(queue: &QueueStore, processor: &dyn JobProcessor, cooldown: Duration) {
    let now = Utc::now();
    let jobs = match queue.lease_due_jobs(now).await {
        Ok(jobs) => jobs,
        Err(e) => {
            // 租约整体成败，失败时没有任务被占用，下一轮重试
            error!("❌ 租约失败，本轮跳过: {}", e);
            return;
        }
    };
    if jobs.is_empty() {
        return;
    }

    info!("⏰ 本轮租到 {} 个到期任务", jobs.len());
    for (index, job) in jobs.iter().enumerate() {
        if index > 0 {
            info!("😴 冷却 {} 秒后处理下一个任务", cooldown.as_secs());
            sleep(cooldown).await;
        }
        process_one(queue, processor, job).await;
    }
}

/// 处理单个任务并回写终态；异常只记日志，不中断本轮
async fn process_one(queue: &QueueStore, processor: &dyn JobProcessor, job: &Job) {
    match processor.process(job).await {
        Ok(outcome) => {
            if let Err(e) = queue
                .complete_job(
                    &job.id,
                    JobStatus::Posted,
                    outcome.post_url.as_deref(),
                    None,
                )
                .await
            {
                // 状态可能已提交，不回滚，只记日志
                error!("❌ 回写成功状态失败 (任务 {}): {}", job.id, e);
            }
        }
        Err(e) => {
            let message = e.to_string();
            error!("❌ 任务 {} 处理失败: {}", job.id, message);
            if let Err(e2) = queue
                .complete_job(&job.id, JobStatus::Failed, None, Some(&message))
                .await
            {
                error!("❌ 回写失败状态失败 (任务 {}): {}", job.id, e2);
            }
        }
    }
}
