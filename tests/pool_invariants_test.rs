//! Concurrency invariants on the pool itself, driven through its public
//! borrow/release surface.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use browser_control::driver::stub::StubDriverFactory;
use browser_control::session::{PoolConfig, SessionPool};

fn pool(min: usize, max: usize) -> Arc<SessionPool> {
    SessionPool::new(
        PoolConfig {
            min_size: min,
            max_size: max,
            prewarm_count: min,
            borrow_deadline: Duration::from_secs(5),
            health_check_interval: Duration::from_secs(60),
            ..PoolConfig::default()
        },
        Arc::new(StubDriverFactory::new()),
    )
}

#[tokio::test]
async fn no_two_borrowers_ever_hold_the_same_record() {
    let pool = pool(1, 3);
    pool.start().await;

    let held: Arc<Mutex<HashSet<String>>> = Arc::new(Mutex::new(HashSet::new()));
    let violations = Arc::new(Mutex::new(0usize));

    let mut tasks = Vec::new();
    for _ in 0..24 {
        let pool = Arc::clone(&pool);
        let held = Arc::clone(&held);
        let violations = Arc::clone(&violations);
        tasks.push(tokio::spawn(async move {
            let record = pool.borrow().await.expect("borrow");
            let id = record.lock().await.id().to_string();

            if !held.lock().unwrap().insert(id.clone()) {
                *violations.lock().unwrap() += 1;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
            held.lock().unwrap().remove(&id);

            drop(record);
            pool.release(&id, false).await;
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    assert_eq!(*violations.lock().unwrap(), 0, "a record was shared");

    let counts = pool.counts();
    assert_eq!(counts.in_use, 0);
    assert_eq!(counts.total, counts.available + counts.in_use);
    assert!(counts.total <= 3);
}

#[tokio::test]
async fn counts_always_partition_into_available_and_in_use() {
    let pool = pool(2, 4);
    pool.start().await;

    let a = pool.borrow().await.unwrap();
    let counts = pool.counts();
    assert_eq!(counts.total, counts.available + counts.in_use);
    assert_eq!(counts.in_use, 1);

    let a_id = a.lock().await.id().to_string();
    drop(a);
    pool.release(&a_id, false).await;

    let counts = pool.counts();
    assert_eq!(counts.total, counts.available + counts.in_use);
    assert_eq!(counts.in_use, 0);
}

#[tokio::test]
async fn borrow_prefers_the_most_recently_used_record() {
    let pool = pool(2, 4);
    pool.start().await;

    let first = pool.borrow().await.unwrap();
    let second = pool.borrow().await.unwrap();
    let first_id = first.lock().await.id().to_string();
    let second_id = second.lock().await.id().to_string();
    drop(first);
    drop(second);

    pool.release(&first_id, false).await;
    tokio::time::sleep(Duration::from_millis(5)).await;
    pool.release(&second_id, false).await;

    // Warm-cache bias: the later return is the hotter record.
    let reborrowed = pool.borrow().await.unwrap();
    assert_eq!(reborrowed.lock().await.id(), second_id);
}

#[tokio::test]
async fn force_cleanup_destroys_unreachable_records_and_refills() {
    let factory = Arc::new(StubDriverFactory::new());
    let behavior = factory.behavior();
    let pool = SessionPool::new(
        PoolConfig {
            min_size: 2,
            max_size: 4,
            prewarm_count: 2,
            health_check_interval: Duration::from_secs(60),
            ..PoolConfig::default()
        },
        factory.clone(),
    );
    pool.start().await;
    assert_eq!(pool.counts().total, 2);

    behavior.set_dead(true);
    pool.force_cleanup().await;
    behavior.set_dead(false);

    // Dead records were destroyed; the refill task restores the floor.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(factory.closed_count() >= 2);
    assert_eq!(pool.counts().total, 2);
}
