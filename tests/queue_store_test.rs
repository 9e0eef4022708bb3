use chrono::{Duration, Utc};
use reddit_auto_submit::models::{JobStatus, LogEventType, NewJob};
use reddit_auto_submit::storage::{db, QueueStore};

fn due_job(subreddit: &str, minutes_ago: i64) -> NewJob {
    NewJob {
        subreddit: subreddit.to_string(),
        caption: "hello".to_string(),
        url: Some("https://example.com/x".to_string()),
        flair: None,
        media_id: None,
        scheduled_time: Utc::now() - Duration::minutes(minutes_ago),
    }
}

async fn open_store() -> QueueStore {
    QueueStore::new(db::open_in_memory().await.expect("打开内存数据库失败"))
}

#[tokio::test]
async fn test_enqueue_then_lease_once() {
    let store = open_store().await;

    let job = store.enqueue(due_job("test", 1)).await.expect("入队失败");
    assert_eq!(job.status, JobStatus::Queued);
    assert!(!job.processed_by_client);

    // 第一次租约：租到刚才的任务，状态变为 processing
    let leased = store.lease_due_jobs(Utc::now()).await.expect("租约失败");
    assert_eq!(leased.len(), 1);
    assert_eq!(leased[0].id, job.id);
    assert_eq!(leased[0].status, JobStatus::Processing);

    // 立刻再租：空集（processing 不会被再次租到）
    let again = store.lease_due_jobs(Utc::now()).await.expect("租约失败");
    assert!(again.is_empty());
}

#[tokio::test]
async fn test_lease_skips_future_jobs() {
    let store = open_store().await;

    store.enqueue(due_job("due", 5)).await.expect("入队失败");
    store
        .enqueue(due_job("future", -60)) // 一小时后才到期
        .await
        .expect("入队失败");

    let leased = store.lease_due_jobs(Utc::now()).await.expect("租约失败");
    assert_eq!(leased.len(), 1);
    assert_eq!(leased[0].subreddit, "due");
}

#[tokio::test]
async fn test_lease_returns_oldest_first() {
    let store = open_store().await;

    store.enqueue(due_job("newest", 1)).await.expect("入队失败");
    store.enqueue(due_job("oldest", 30)).await.expect("入队失败");
    store.enqueue(due_job("middle", 10)).await.expect("入队失败");

    let leased = store.lease_due_jobs(Utc::now()).await.expect("租约失败");
    let order: Vec<&str> = leased.iter().map(|j| j.subreddit.as_str()).collect();
    assert_eq!(order, vec!["oldest", "middle", "newest"]);
}

#[tokio::test]
async fn test_concurrent_lease_never_overlaps() {
    let store = open_store().await;
    for i in 0..5 {
        store.enqueue(due_job("race", i + 1)).await.expect("入队失败");
    }

    // 两个并发租约：同一个任务绝不会被两边同时租到
    let (a, b) = tokio::join!(
        store.lease_due_jobs(Utc::now()),
        store.lease_due_jobs(Utc::now())
    );
    let a = a.expect("租约失败");
    let b = b.expect("租约失败");

    assert_eq!(a.len() + b.len(), 5);
    for job in &a {
        assert!(!b.iter().any(|other| other.id == job.id));
    }
}

#[tokio::test]
async fn test_terminal_jobs_are_never_released() {
    let store = open_store().await;
    let posted = store.enqueue(due_job("posted", 2)).await.expect("入队失败");
    let failed = store.enqueue(due_job("failed", 1)).await.expect("入队失败");

    let leased = store.lease_due_jobs(Utc::now()).await.expect("租约失败");
    assert_eq!(leased.len(), 2);

    store
        .complete_job(
            &posted.id,
            JobStatus::Posted,
            Some("https://www.reddit.com/r/posted/comments/abc/x/"),
            None,
        )
        .await
        .expect("回写失败");
    store
        .complete_job(&failed.id, JobStatus::Failed, None, Some("boom"))
        .await
        .expect("回写失败");

    // 终态任务不会被再次租到
    let again = store.lease_due_jobs(Utc::now()).await.expect("租约失败");
    assert!(again.is_empty());

    let posted = store.get_job(&posted.id).await.expect("查询失败").expect("任务不存在");
    assert_eq!(posted.status, JobStatus::Posted);
    assert_eq!(
        posted.post_url.as_deref(),
        Some("https://www.reddit.com/r/posted/comments/abc/x/")
    );

    let failed = store.get_job(&failed.id).await.expect("查询失败").expect("任务不存在");
    assert_eq!(failed.status, JobStatus::Failed);
    assert_eq!(failed.error_message.as_deref(), Some("boom"));
}

#[tokio::test]
async fn test_logs_follow_lifecycle_newest_first() {
    let store = open_store().await;
    let job = store.enqueue(due_job("logs", 1)).await.expect("入队失败");
    store.lease_due_jobs(Utc::now()).await.expect("租约失败");
    store
        .complete_job(&job.id, JobStatus::Posted, Some("https://example.com/p"), None)
        .await
        .expect("回写失败");

    let logs = store.read_logs(&job.id).await.expect("读日志失败");
    assert_eq!(logs.len(), 3);
    // 最新在前：posted → processing → queued
    assert_eq!(logs[0].event_type, LogEventType::Posted);
    assert!(logs[0].message.contains("https://example.com/p"));
    assert_eq!(logs[1].event_type, LogEventType::Processing);
    assert_eq!(logs[2].event_type, LogEventType::Queued);
}

#[tokio::test]
async fn test_failed_log_carries_error_message() {
    let store = open_store().await;
    let job = store.enqueue(due_job("logs", 1)).await.expect("入队失败");
    store.lease_due_jobs(Utc::now()).await.expect("租约失败");
    store
        .complete_job(&job.id, JobStatus::Failed, None, Some("session_expired"))
        .await
        .expect("回写失败");

    let logs = store.read_logs(&job.id).await.expect("读日志失败");
    assert_eq!(logs[0].event_type, LogEventType::Failed);
    assert!(logs[0].message.contains("session_expired"));
}

#[tokio::test]
async fn test_delete_cascades_logs() {
    let store = open_store().await;
    let job = store.enqueue(due_job("cascade", 1)).await.expect("入队失败");
    assert!(!store.read_logs(&job.id).await.expect("读日志失败").is_empty());

    assert!(store.delete_job(&job.id).await.expect("删除失败"));
    // 日志随任务级联删除
    assert!(store.read_logs(&job.id).await.expect("读日志失败").is_empty());
    // 再删一次：没有记录可删
    assert!(!store.delete_job(&job.id).await.expect("删除失败"));
}

#[tokio::test]
async fn test_enqueue_validates_fields() {
    let store = open_store().await;

    let mut empty_subreddit = due_job("x", 1);
    empty_subreddit.subreddit = "  ".to_string();
    assert!(store.enqueue(empty_subreddit).await.is_err());

    let mut empty_caption = due_job("x", 1);
    empty_caption.caption = String::new();
    assert!(store.enqueue(empty_caption).await.is_err());

    let mut bad_url = due_job("x", 1);
    bad_url.url = Some("ftp://example.com".to_string());
    assert!(store.enqueue(bad_url).await.is_err());
}

#[tokio::test]
async fn test_mark_processed_is_one_way_latch() {
    let store = open_store().await;
    let job = store.enqueue(due_job("latch", 1)).await.expect("入队失败");

    // queued 任务不能标记
    assert!(!store.mark_processed(&job.id).await.expect("标记失败"));

    store.lease_due_jobs(Utc::now()).await.expect("租约失败");
    store
        .complete_job(&job.id, JobStatus::Posted, None, None)
        .await
        .expect("回写失败");

    // posted 任务第一次标记成功，之后幂等为 false
    assert!(store.mark_processed(&job.id).await.expect("标记失败"));
    assert!(!store.mark_processed(&job.id).await.expect("标记失败"));

    let job = store.get_job(&job.id).await.expect("查询失败").expect("任务不存在");
    assert!(job.processed_by_client);
}

#[tokio::test]
async fn test_list_jobs_with_since_filter() {
    let store = open_store().await;
    store.enqueue(due_job("a", 1)).await.expect("入队失败");
    store.enqueue(due_job("b", 2)).await.expect("入队失败");

    let all = store.list_jobs(None).await.expect("查询失败");
    assert_eq!(all.jobs.len(), 2);

    // 用本次 last_updated 做增量拉取：没有新变化
    let incremental = store
        .list_jobs(Some(all.last_updated))
        .await
        .expect("查询失败");
    assert!(incremental.jobs.is_empty());

    // 状态回写后会重新出现在增量结果里
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    let leased = store.lease_due_jobs(Utc::now()).await.expect("租约失败");
    assert_eq!(leased.len(), 2);
    let incremental = store
        .list_jobs(Some(all.last_updated))
        .await
        .expect("查询失败");
    assert_eq!(incremental.jobs.len(), 2);
}
