//! Lock service behaviour: single holder, re-entrancy, normalization
//! collisions, expiry, and node reclamation.

mod support;

use chrono::Utc;
use foreman_core::locks::LockConfig;
use std::sync::Arc;
use std::time::Duration;
use support::{harness, harness_with, node_id, register_node};

#[tokio::test]
async fn contended_acquire_has_exactly_one_winner() {
    let h = harness();
    register_node(&h, "n1").await;
    register_node(&h, "n2").await;

    // Same path spelled two ways, raced from two tasks (scenario S1).
    let locks = h.locks.clone();
    let barrier = Arc::new(tokio::sync::Barrier::new(2));

    let a = {
        let locks = locks.clone();
        let barrier = barrier.clone();
        tokio::spawn(async move {
            barrier.wait().await;
            locks
                .try_acquire("C:\\Data\\job.vdb", &node_id("n1"))
                .await
                .unwrap()
        })
    };
    let b = {
        let locks = locks.clone();
        let barrier = barrier.clone();
        tokio::spawn(async move {
            barrier.wait().await;
            locks
                .try_acquire("c:/data/job.vdb", &node_id("n2"))
                .await
                .unwrap()
        })
    };

    let (a, b) = (a.await.unwrap(), b.await.unwrap());
    assert!(a ^ b, "exactly one of the two racers may win (got {a}, {b})");

    // The loser's retry succeeds after the winner releases.
    let (winner, loser) = if a { ("n1", "n2") } else { ("n2", "n1") };
    assert!(
        h.locks
            .release("C:/Data/job.vdb", &node_id(winner))
            .await
            .unwrap()
    );
    assert!(
        h.locks
            .try_acquire("c:\\data\\job.vdb", &node_id(loser))
            .await
            .unwrap()
    );
}

#[tokio::test]
async fn many_concurrent_acquirers_one_winner() {
    let h = harness();
    let barrier = Arc::new(tokio::sync::Barrier::new(16));

    let mut handles = Vec::new();
    for i in 0..16 {
        let locks = h.locks.clone();
        let barrier = barrier.clone();
        handles.push(tokio::spawn(async move {
            barrier.wait().await;
            locks
                .try_acquire("/srv/volumes/batch-9", &node_id(&format!("node-{i}")))
                .await
                .unwrap()
        }));
    }

    let mut winners = 0;
    for handle in handles {
        if handle.await.unwrap() {
            winners += 1;
        }
    }
    assert_eq!(winners, 1);

    let active = h.locks.list().await.unwrap();
    assert_eq!(active.len(), 1);
}

#[tokio::test]
async fn reacquire_by_holder_is_reentrant() {
    let h = harness();
    let n1 = node_id("n1");

    assert!(h.locks.try_acquire("/data/a", &n1).await.unwrap());
    assert!(h.locks.try_acquire("/data/a", &n1).await.unwrap());

    let active = h.locks.list().await.unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].holder_node_id, n1);
}

#[tokio::test]
async fn normalization_variants_collide() {
    let h = harness();
    let n1 = node_id("n1");
    let n2 = node_id("n2");

    assert!(h.locks.try_acquire("C:\\Data\\Job.vdb", &n1).await.unwrap());

    for variant in [
        "c:/data/job.vdb",
        "C:/DATA/JOB.VDB",
        "c:\\data\\\\job.vdb",
        "c:/data/job.vdb/",
        "C:\\Data\\Job.vdb\\\\",
    ] {
        assert!(
            !h.locks.try_acquire(variant, &n2).await.unwrap(),
            "variant {variant:?} should collide with the held lock"
        );
    }
}

#[tokio::test]
async fn expired_lock_can_change_hands() {
    let h = harness_with(
        LockConfig {
            ttl: Duration::from_millis(30),
        },
        Default::default(),
    );
    let n1 = node_id("n1");
    let n2 = node_id("n2");

    assert!(h.locks.try_acquire("/data/vol", &n1).await.unwrap());
    assert!(!h.locks.try_acquire("/data/vol", &n2).await.unwrap());

    tokio::time::sleep(Duration::from_millis(60)).await;

    assert!(h.locks.try_acquire("/data/vol", &n2).await.unwrap());
    let active = h.locks.list().await.unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].holder_node_id, n2);
}

#[tokio::test]
async fn refresh_only_works_for_the_holder() {
    let h = harness();
    let n1 = node_id("n1");
    let n2 = node_id("n2");

    assert!(h.locks.try_acquire("/data/vol", &n1).await.unwrap());
    assert!(h.locks.refresh("/data/vol", &n1).await.unwrap());
    assert!(!h.locks.refresh("/data/vol", &n2).await.unwrap());
    assert!(!h.locks.refresh("/data/other", &n1).await.unwrap());
}

#[tokio::test]
async fn release_only_works_for_the_holder() {
    let h = harness();
    let n1 = node_id("n1");
    let n2 = node_id("n2");

    assert!(h.locks.try_acquire("/data/vol", &n1).await.unwrap());
    assert!(!h.locks.release("/data/vol", &n2).await.unwrap());
    assert!(h.locks.release("/data/vol", &n1).await.unwrap());
    assert!(!h.locks.release("/data/vol", &n1).await.unwrap());
}

#[tokio::test]
async fn sweep_removes_only_expired_rows() {
    let h = harness();
    let n1 = node_id("n1");

    assert!(h.locks.try_acquire("/data/a", &n1).await.unwrap());
    assert!(h.locks.try_acquire("/data/b", &n1).await.unwrap());

    // Nothing has expired yet.
    assert_eq!(h.locks.sweep(Utc::now()).await.unwrap(), 0);

    // From the vantage point of a sweep far in the future, both leases ran out.
    let later = Utc::now() + chrono::Duration::minutes(11);
    assert_eq!(h.locks.sweep(later).await.unwrap(), 2);
    assert!(h.locks.list().await.unwrap().is_empty());
}

#[tokio::test]
async fn reset_all_clears_every_lock() {
    let h = harness();
    assert!(h.locks.try_acquire("/a", &node_id("n1")).await.unwrap());
    assert!(h.locks.try_acquire("/b", &node_id("n2")).await.unwrap());

    assert_eq!(h.locks.reset_all().await.unwrap(), 2);
    assert!(h.locks.list().await.unwrap().is_empty());
}

#[tokio::test]
async fn empty_path_is_rejected() {
    let h = harness();
    let result = h.locks.try_acquire("   ", &node_id("n1")).await;
    assert!(matches!(
        result,
        Err(foreman_core::CoreError::Validation(_))
    ));
}
