//! 调度器测试：用假任务处理器替代真实浏览器流程

use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::Utc;
use reddit_auto_submit::models::{Job, JobStatus, NewJob};
use reddit_auto_submit::orchestrator::Scheduler;
use reddit_auto_submit::storage::{db, QueueStore};
use reddit_auto_submit::workflow::{JobProcessor, PostOutcome};
use reddit_auto_submit::Config;
use tokio::time::Instant;

/// 假任务处理器：记录处理顺序和时刻，可按 subreddit 触发失败
struct FakeProcessor {
    records: Mutex<Vec<(String, Instant)>>,
    fail_subreddit: Option<String>,
}

impl FakeProcessor {
    fn new() -> Self {
        Self {
            records: Mutex::new(Vec::new()),
            fail_subreddit: None,
        }
    }

    fn failing_on(subreddit: &str) -> Self {
        Self {
            records: Mutex::new(Vec::new()),
            fail_subreddit: Some(subreddit.to_string()),
        }
    }

    fn records(&self) -> Vec<(String, Instant)> {
        self.records.lock().unwrap().clone()
    }
}

#[async_trait]
impl JobProcessor for FakeProcessor {
    async fn process(&self, job: &Job) -> Result<PostOutcome> {
        self.records
            .lock()
            .unwrap()
            .push((job.subreddit.clone(), Instant::now()));
        if self.fail_subreddit.as_deref() == Some(job.subreddit.as_str()) {
            bail!("login marker missing");
        }
        Ok(PostOutcome {
            post_url: Some(format!("https://www.reddit.com/r/{}/comments/x/", job.subreddit)),
        })
    }
}

fn due_job(subreddit: &str, minutes_ago: i64) -> NewJob {
    NewJob {
        subreddit: subreddit.to_string(),
        caption: "hello".to_string(),
        url: Some("https://example.com/x".to_string()),
        flair: None,
        media_id: None,
        scheduled_time: Utc::now() - chrono::Duration::minutes(minutes_ago),
    }
}

fn test_config(cooldown_secs: u64) -> Config {
    Config {
        tick_interval_secs: 1,
        post_cooldown_secs: cooldown_secs,
        ..Config::default()
    }
}

async fn open_queue() -> QueueStore {
    QueueStore::new(db::open_in_memory().await.expect("打开内存数据库失败"))
}

#[tokio::test]
async fn test_tick_processes_due_jobs_in_order_with_cooldown() {
    let queue = open_queue().await;
    queue.enqueue(due_job("second", 1)).await.expect("入队失败");
    queue.enqueue(due_job("first", 10)).await.expect("入队失败");

    let processor = Arc::new(FakeProcessor::new());
    let scheduler = Scheduler::new(queue.clone(), processor.clone(), &test_config(1));

    scheduler.tick_once().await;

    // 按计划时间升序串行处理
    let records = processor.records();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].0, "first");
    assert_eq!(records[1].0, "second");

    // 两个任务之间经过了配置的冷却时间
    let gap = records[1].1.duration_since(records[0].1);
    assert!(gap >= Duration::from_secs(1), "冷却间隔不足: {:?}", gap);

    // 两个任务都回写为 posted
    let listing = queue.list_jobs(None).await.expect("查询失败");
    assert!(listing
        .jobs
        .iter()
        .all(|j| j.status == JobStatus::Posted && j.post_url.is_some()));
}

#[tokio::test]
async fn test_failed_job_does_not_abort_tick() {
    let queue = open_queue().await;
    queue.enqueue(due_job("bad", 10)).await.expect("入队失败");
    queue.enqueue(due_job("good", 1)).await.expect("入队失败");

    let processor = Arc::new(FakeProcessor::failing_on("bad"));
    let scheduler = Scheduler::new(queue.clone(), processor.clone(), &test_config(0));

    scheduler.tick_once().await;

    // 第一个任务失败不影响第二个
    assert_eq!(processor.records().len(), 2);

    let listing = queue.list_jobs(None).await.expect("查询失败");
    let bad = listing.jobs.iter().find(|j| j.subreddit == "bad").expect("任务不存在");
    assert_eq!(bad.status, JobStatus::Failed);
    assert_eq!(bad.error_message.as_deref(), Some("login marker missing"));

    let good = listing.jobs.iter().find(|j| j.subreddit == "good").expect("任务不存在");
    assert_eq!(good.status, JobStatus::Posted);
}

#[tokio::test]
async fn test_processed_jobs_are_not_reprocessed() {
    let queue = open_queue().await;
    queue.enqueue(due_job("once", 1)).await.expect("入队失败");

    let processor = Arc::new(FakeProcessor::new());
    let scheduler = Scheduler::new(queue.clone(), processor.clone(), &test_config(0));

    scheduler.tick_once().await;
    scheduler.tick_once().await;

    // 终态任务不会被第二轮租到
    assert_eq!(processor.records().len(), 1);
}

#[tokio::test]
async fn test_start_stop_restart_lifecycle() {
    let queue = open_queue().await;
    let processor = Arc::new(FakeProcessor::new());
    let scheduler = Scheduler::new(queue, processor, &test_config(0));

    assert!(!scheduler.is_running());

    scheduler.start();
    assert!(scheduler.is_running());
    // 重复 start 是无害的
    scheduler.start();
    assert!(scheduler.is_running());

    scheduler.stop();
    assert!(!scheduler.is_running());
    // stop 幂等
    scheduler.stop();
    assert!(!scheduler.is_running());

    scheduler.restart();
    assert!(scheduler.is_running());
    scheduler.stop();
}

#[tokio::test]
async fn test_running_loop_drains_due_jobs() {
    let queue = open_queue().await;
    queue.enqueue(due_job("loop", 1)).await.expect("入队失败");

    let processor = Arc::new(FakeProcessor::new());
    let scheduler = Scheduler::new(queue.clone(), processor.clone(), &test_config(0));

    scheduler.start();
    // 等待第一轮 tick 完成
    tokio::time::sleep(Duration::from_millis(500)).await;
    scheduler.stop();

    assert_eq!(processor.records().len(), 1);
    let job = &queue.list_jobs(None).await.expect("查询失败").jobs[0];
    assert_eq!(job.status, JobStatus::Posted);
}
