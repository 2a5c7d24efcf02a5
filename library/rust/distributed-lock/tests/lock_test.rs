use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

use tonmart_distributed_lock::{InMemoryLockStore, LockError, LockManager, LockOptions};

#[tokio::test(start_paused = true)]
async fn test_critical_sections_never_overlap() {
    let store = Arc::new(InMemoryLockStore::new());
    let intervals: Arc<Mutex<Vec<(Instant, Instant)>>> = Arc::new(Mutex::new(Vec::new()));
    let active = Arc::new(AtomicU32::new(0));
    let max_active = Arc::new(AtomicU32::new(0));

    let mut tasks = Vec::new();
    for i in 0..8 {
        // インスタンスごとに別の LockManager（別プロセス相当）でストアだけを共有する
        let mgr = LockManager::new(store.clone()).with_holder_id(format!("instance-{i}"));
        let intervals = intervals.clone();
        let active = active.clone();
        let max_active = max_active.clone();
        tasks.push(tokio::spawn(async move {
            let options = LockOptions::default().with_wait_timeout(Duration::from_secs(30));
            mgr.with_lock("nft:buy:42", &options, || async {
                let now_active = active.fetch_add(1, Ordering::SeqCst) + 1;
                max_active.fetch_max(now_active, Ordering::SeqCst);
                let start = Instant::now();
                tokio::time::sleep(Duration::from_millis(25)).await;
                let end = Instant::now();
                active.fetch_sub(1, Ordering::SeqCst);
                intervals.lock().await.push((start, end));
                Ok::<_, LockError>(())
            })
            .await
        }));
    }
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    assert_eq!(max_active.load(Ordering::SeqCst), 1);
    let mut intervals = intervals.lock().await.clone();
    assert_eq!(intervals.len(), 8);
    intervals.sort_by_key(|(start, _)| *start);
    for pair in intervals.windows(2) {
        assert!(pair[1].0 >= pair[0].1, "critical sections overlapped");
    }
}

#[tokio::test]
async fn test_different_keys_do_not_block_each_other() {
    let mgr = LockManager::new(Arc::new(InMemoryLockStore::new()));
    let options = LockOptions::default().fail_fast();
    let a = mgr.acquire("nft:buy:1", &options).await.unwrap();
    let b = mgr.acquire("nft:buy:2", &options).await.unwrap();
    assert!(a.is_held());
    assert!(b.is_held());
    a.release().await.unwrap();
    b.release().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_waiter_leaves_nothing_held() {
    let mgr = LockManager::new(Arc::new(InMemoryLockStore::new()));
    let held = mgr.acquire("k", &LockOptions::default()).await.unwrap();

    let waiter = {
        let mgr = mgr.clone();
        tokio::spawn(async move { mgr.acquire("k", &LockOptions::default()).await })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;
    waiter.abort();
    assert!(waiter.await.unwrap_err().is_cancelled());

    held.release().await.unwrap();
    assert!(!mgr.is_locked("k").await.unwrap());
}

#[tokio::test]
async fn test_lock_released_after_panicking_critical_section() {
    let mgr = LockManager::new(Arc::new(InMemoryLockStore::new()));

    let task = {
        let mgr = mgr.clone();
        tokio::spawn(async move {
            let _handle = mgr.acquire("k", &LockOptions::default()).await.unwrap();
            panic!("critical section failed");
        })
    };
    assert!(task.await.unwrap_err().is_panic());

    let options = LockOptions::default().with_wait_timeout(Duration::from_secs(1));
    let handle = mgr.acquire("k", &options).await.unwrap();
    assert!(handle.is_held());
}
